// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! mcastwrap - shell access to a multicast group
//!
//! List candidate interfaces, watch a group, send raw text or a JSON
//! status record.

use chrono::Local;
use clap::{Parser, Subcommand};
use colored::*;
use mcastwrap::invoke::InvocationRequest;
use mcastwrap::transport::{all_network_interfaces, list_network_interfaces};
use mcastwrap::{MulticastTransport, StatusMessage, TransportBuilder, TransportConfig};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_GROUP: &str = "224.0.0.1";
const DEFAULT_PORT: u32 = 14725;

/// Multicast group tool
#[derive(Parser, Debug)]
#[command(name = "mcastwrap")]
#[command(version)]
#[command(about = "Join, watch and talk to a multicast group")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Network interface name (default: first multicast-capable interface)
    #[arg(short, long, global = true)]
    interface: Option<String>,

    /// Multicast group address
    #[arg(short, long, global = true)]
    group: Option<String>,

    /// Group port
    #[arg(short, long, global = true)]
    port: Option<u32>,

    /// TOML configuration file (overridden by MCASTWRAP_* and flags)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List network interfaces usable for multicast
    Interfaces {
        /// Show every interface, not only candidates
        #[arg(long)]
        all: bool,
    },
    /// Print every datagram received on the group until Ctrl+C
    Listen {
        /// Also show datagrams sent from this host
        #[arg(long)]
        include_own: bool,

        /// Dump payloads as hex
        #[arg(long)]
        hex: bool,

        /// Stop after this many datagrams (0 = unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u64,
    },
    /// Send a text payload to the group
    Send {
        /// Payload text
        text: String,

        /// Number of copies to send
        #[arg(short, long, default_value = "1")]
        repeat: u32,

        /// Delay between copies in milliseconds
        #[arg(long, default_value = "100")]
        interval_ms: u64,
    },
    /// Broadcast a JSON status record
    Status {
        /// Machine type stamped on the record (e.g. server, client)
        #[arg(long = "type", default_value = "cli")]
        machine_type: String,

        /// Machine category (e.g. master, slave)
        #[arg(long)]
        category: String,

        /// JSON value carried by the record
        #[arg(long, default_value = "{}")]
        json: String,
    },
}

fn main() {
    // Initialize logger for RUST_LOG-based debug output
    env_logger::init();

    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    match &args.command {
        Command::Interfaces { all } => run_interfaces(*all),
        Command::Listen {
            include_own,
            hex,
            count,
        } => run_listen(args, *include_own, *hex, *count),
        Command::Send {
            text,
            repeat,
            interval_ms,
        } => run_send(args, text, *repeat, *interval_ms),
        Command::Status {
            machine_type,
            category,
            json,
        } => run_status(args, machine_type, category, json),
    }
}

/// File config, then environment, then command-line flags.
fn load_config(args: &Args) -> mcastwrap::Result<TransportConfig> {
    let base = match &args.config {
        Some(path) => TransportConfig::from_file(path)?,
        None => TransportConfig::default(),
    };
    let mut config = base.apply_env();
    if let Some(name) = &args.interface {
        config.interface = Some(name.clone());
    }
    if let Some(group) = &args.group {
        config.group = Some(group.clone());
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    config.group.get_or_insert_with(|| DEFAULT_GROUP.to_string());
    config.port.get_or_insert(DEFAULT_PORT);
    Ok(config)
}

fn configured_builder(args: &Args) -> mcastwrap::Result<(TransportConfig, TransportBuilder)> {
    let config = load_config(args)?;
    let builder = config.builder()?;
    Ok((config, builder))
}

fn run_interfaces(all: bool) -> Result<(), Box<dyn std::error::Error>> {
    let interfaces = if all {
        all_network_interfaces()?
    } else {
        list_network_interfaces()?
    };

    if interfaces.is_empty() {
        println!("{}", "No interfaces found".yellow());
        return Ok(());
    }

    for iface in interfaces {
        let flags = [
            (iface.is_up, "UP"),
            (iface.is_multicast, "MULTICAST"),
            (iface.is_loopback, "LOOPBACK"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(",");
        let addrs = iface
            .addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        let name = if iface.is_candidate() {
            iface.name.green().bold()
        } else {
            iface.name.dimmed()
        };
        println!("{:<12} idx={:<3} <{}> {}", name, iface.index, flags, addrs);
    }
    Ok(())
}

fn run_listen(
    args: &Args,
    include_own: bool,
    hex: bool,
    max_count: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let received = Arc::new(AtomicU64::new(0));
    let received_cb = received.clone();
    let running_cb = running.clone();

    let (config, builder) = configured_builder(args)?;
    let transport = builder
        .ignore_own_messages(!include_own)
        .callback(move |msg| {
            let n = received_cb.fetch_add(1, Ordering::SeqCst) + 1;
            if max_count > 0 && n > max_count {
                return;
            }
            print_datagram(n, &msg, hex);
            let _ = io::stdout().flush();
            if max_count > 0 && n >= max_count {
                running_cb.store(false, Ordering::SeqCst);
            }
        })
        .build()?;

    eprintln!(
        "{} listening on {}:{} via {} ({}){}",
        "---".dimmed(),
        transport.group(),
        transport.port(),
        transport.interface().name,
        transport.local_ipv4(),
        if include_own { "" } else { ", own datagrams hidden" }
    );
    log::debug!("[CLI] effective config: {:?}", config);

    transport.launch_consumer()?;
    while running.load(Ordering::SeqCst) {
        if !transport.is_consuming() {
            eprintln!("{}: receive loop stopped", "Warning".yellow());
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    transport.close()?;

    let total = received.load(Ordering::SeqCst);
    eprintln!(
        "\n{} Received {} datagram(s)",
        "---".dimmed(),
        if max_count > 0 { total.min(max_count) } else { total }
    );
    Ok(())
}

fn print_datagram(n: u64, msg: &[u8], hex: bool) {
    let ts = Local::now().format("%H:%M:%S%.3f");
    let header = format!("[{}] #{} {} bytes", ts, n, msg.len());

    if hex {
        println!("{}", header.cyan());
        for (i, chunk) in msg.chunks(16).enumerate() {
            let bytes = chunk
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            println!("  {:04x}  {}", i * 16, bytes);
        }
        return;
    }

    if let Ok(request) = InvocationRequest::decode(msg) {
        println!(
            "{} {} {}::{}({})",
            header.cyan(),
            "invoke".magenta(),
            request.class,
            request.method,
            request.param_types().join(", ")
        );
    } else if let Ok(status) = StatusMessage::from_bytes(msg) {
        println!(
            "{} {} type={} category={} ip={} value={}",
            header.cyan(),
            "status".blue(),
            status.machine_type.as_deref().unwrap_or("-"),
            status.machine_category.as_deref().unwrap_or("-"),
            status.machine_ip.as_deref().unwrap_or("-"),
            status.json_value.as_deref().unwrap_or("-")
        );
    } else {
        println!("{} {}", header.cyan(), String::from_utf8_lossy(msg));
    }
}

fn send_only_transport(args: &Args) -> mcastwrap::Result<MulticastTransport> {
    let (_, builder) = configured_builder(args)?;
    builder.build()
}

fn run_send(
    args: &Args,
    text: &str,
    repeat: u32,
    interval_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = send_only_transport(args)?;
    for i in 0..repeat {
        if i > 0 {
            std::thread::sleep(Duration::from_millis(interval_ms));
        }
        transport.send(text.as_bytes())?;
    }
    println!(
        "{} sent {} x {} bytes to {}:{}",
        "OK".green().bold(),
        repeat,
        text.len(),
        transport.group(),
        transport.port()
    );
    transport.close()?;
    Ok(())
}

fn run_status(
    args: &Args,
    machine_type: &str,
    category: &str,
    json: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = send_only_transport(args)?;
    let mut status = StatusMessage::new(category, json);
    transport.send_status(&mut status, machine_type)?;
    println!(
        "{} status sent to {}:{} as {} ({})",
        "OK".green().bold(),
        transport.group(),
        transport.port(),
        machine_type,
        transport.local_ipv4()
    );
    transport.close()?;
    Ok(())
}
