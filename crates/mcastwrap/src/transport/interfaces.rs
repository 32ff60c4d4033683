// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network interface enumeration and selection.
//!
//! - Unix: `getifaddrs` (flags + addresses in one pass)
//! - Other: `local_ip_address` crate (no flags, assumed up and multicast-capable)

use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// A host network interface with its addresses and capability flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name (e.g. `eth0`)
    pub name: String,
    /// OS interface index (0 if unknown)
    pub index: u32,
    /// All addresses bound to the interface
    pub addrs: Vec<IpAddr>,
    /// Interface is administratively up
    pub is_up: bool,
    /// Interface supports multicast
    pub is_multicast: bool,
    /// Interface is a loopback device
    pub is_loopback: bool,
}

impl NetworkInterface {
    /// Describe an interface by hand (tests, statically configured hosts).
    pub fn new(name: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        let is_loopback = !addrs.is_empty() && addrs.iter().all(IpAddr::is_loopback);
        Self {
            name: name.into(),
            index: 0,
            addrs,
            is_up: true,
            is_multicast: true,
            is_loopback,
        }
    }

    /// Look up an interface by name.
    pub fn by_name(name: &str) -> io::Result<Option<Self>> {
        Ok(all_network_interfaces()?
            .into_iter()
            .find(|iface| iface.name == name))
    }

    /// First IPv4 address of the interface.
    ///
    /// Used both for `IP_MULTICAST_IF` and as this node's identity when
    /// filtering its own datagrams.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.addrs.iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    /// Whether the interface can carry an IPv4 multicast membership.
    pub fn is_candidate(&self) -> bool {
        self.is_up && self.is_multicast && self.ipv4().is_some()
    }
}

/// Check whether `iface` carries `addr`.
pub fn has_inet_address(iface: &NetworkInterface, addr: &IpAddr) -> bool {
    iface.addrs.contains(addr)
}

/// Interfaces that are up, multicast-capable and carry an IPv4 address.
pub fn list_network_interfaces() -> io::Result<Vec<NetworkInterface>> {
    let candidates: Vec<NetworkInterface> = all_network_interfaces()?
        .into_iter()
        .filter(NetworkInterface::is_candidate)
        .collect();
    log::debug!(
        "[MCAST] Discovered {} multicast-capable interfaces",
        candidates.len()
    );
    Ok(candidates)
}

/// Every interface known to the host, sorted by name.
pub fn all_network_interfaces() -> io::Result<Vec<NetworkInterface>> {
    let mut by_name: BTreeMap<String, NetworkInterface> = BTreeMap::new();
    for entry in system_addresses()? {
        let iface = by_name
            .entry(entry.name.clone())
            .or_insert_with(|| NetworkInterface {
                name: entry.name.clone(),
                index: interface_index(&entry.name),
                addrs: Vec::new(),
                is_up: entry.is_up,
                is_multicast: entry.is_multicast,
                is_loopback: entry.is_loopback,
            });
        if let Some(addr) = entry.addr {
            if !iface.addrs.contains(&addr) {
                iface.addrs.push(addr);
            }
        }
    }
    Ok(by_name.into_values().collect())
}

/// One `getifaddrs` row.
struct SystemAddress {
    name: String,
    addr: Option<IpAddr>,
    is_up: bool,
    is_multicast: bool,
    is_loopback: bool,
}

#[cfg(unix)]
fn system_addresses() -> io::Result<Vec<SystemAddress>> {
    use std::ffi::CStr;

    let mut rows = Vec::new();
    let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY:
    // - `ifaddrs` is a valid pointer to a null pointer, which getifaddrs will populate
    // - The returned list must be freed with freeifaddrs (done at end of function)
    let ret = unsafe { libc::getifaddrs(&mut ifaddrs) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ifa = ifaddrs;
    while !ifa.is_null() {
        // SAFETY:
        // - `ifa` is checked to be non-null in the while condition
        // - The structure remains valid until freeifaddrs is called
        let entry = unsafe { &*ifa };

        // SAFETY:
        // - `entry.ifa_name` is guaranteed non-null and NUL-terminated by getifaddrs
        // - We immediately convert to an owned String
        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();

        let flags = entry.ifa_flags as libc::c_int;
        rows.push(SystemAddress {
            name,
            addr: sockaddr_to_ip(entry.ifa_addr),
            is_up: flags & libc::IFF_UP != 0,
            is_multicast: flags & libc::IFF_MULTICAST != 0,
            is_loopback: flags & libc::IFF_LOOPBACK != 0,
        });

        ifa = entry.ifa_next;
    }

    // SAFETY:
    // - `ifaddrs` is the pointer returned by getifaddrs and has not been freed yet
    unsafe { libc::freeifaddrs(ifaddrs) };

    Ok(rows)
}

#[cfg(unix)]
fn sockaddr_to_ip(addr: *const libc::sockaddr) -> Option<IpAddr> {
    if addr.is_null() {
        return None;
    }
    // SAFETY:
    // - `addr` is checked non-null above and comes from getifaddrs
    // - We only read sa_family to determine the address type
    let family = unsafe { (*addr).sa_family } as i32;
    match family {
        libc::AF_INET => {
            // SAFETY: sa_family == AF_INET guarantees a sockaddr_in structure
            let ip = unsafe { (*(addr as *const libc::sockaddr_in)).sin_addr.s_addr };
            Some(IpAddr::V4(Ipv4Addr::from(u32::from_be(ip))))
        }
        libc::AF_INET6 => {
            // SAFETY: sa_family == AF_INET6 guarantees a sockaddr_in6 structure
            let ip = unsafe { (*(addr as *const libc::sockaddr_in6)).sin6_addr.s6_addr };
            Some(IpAddr::V6(std::net::Ipv6Addr::from(ip)))
        }
        _ => None,
    }
}

#[cfg(unix)]
fn interface_index(name: &str) -> u32 {
    let Ok(c_name) = std::ffi::CString::new(name) else {
        return 0;
    };
    // SAFETY: `c_name` is a valid NUL-terminated string for the duration of the call
    unsafe { libc::if_nametoindex(c_name.as_ptr()) }
}

/// Portable fallback via `local_ip_address`; flags are not available there.
#[cfg(not(unix))]
fn system_addresses() -> io::Result<Vec<SystemAddress>> {
    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    Ok(interfaces
        .into_iter()
        .map(|(name, ip)| SystemAddress {
            name,
            addr: Some(ip),
            is_up: true,
            is_multicast: !ip.is_loopback(),
            is_loopback: ip.is_loopback(),
        })
        .collect())
}

#[cfg(not(unix))]
fn interface_index(_name: &str) -> u32 {
    0
}
