// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary codec for invocation requests.
//!
//! # Frame layout (little-endian)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | magic `MCIV` |
//! | 4 | 1 | version |
//! | 5 | 3 | reserved (zero) |
//! | 8 | 4 | body length |
//! | 12 | 4 | CRC-32 of body |
//! | 16 | n | body |
//!
//! Body: `str class`, `str method`, `u32 argc`, then `argc` times
//! `str declared_type`, `blob value`. `str`/`blob` are a `u32` length
//! followed by the bytes. Each value blob is self-contained: one tag byte
//! plus the kind's payload, lists nesting further tagged values.

use super::value::{TypedArg, Value};
use crate::error::{Error, Result};
use flate2::Crc;

const MAGIC: [u8; 4] = *b"MCIV";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 16;

/// Nesting limit for list values.
const MAX_DEPTH: usize = 32;

const TAG_UNIT: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_I32: u8 = 0x02;
const TAG_I64: u8 = 0x03;
const TAG_U32: u8 = 0x04;
const TAG_U64: u8 = 0x05;
const TAG_F64: u8 = 0x06;
const TAG_STR: u8 = 0x07;
const TAG_BYTES: u8 = 0x08;
const TAG_LIST: u8 = 0x09;

/// One argument as carried on the wire: declared type and encoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArg {
    pub type_name: String,
    pub value: Vec<u8>,
}

/// A remote call: target class, method name and ordered arguments.
///
/// Argument values stay encoded until dispatch so that class resolution
/// happens before any value is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub class: String,
    pub method: String,
    pub args: Vec<EncodedArg>,
}

impl InvocationRequest {
    /// Build a request, serializing each argument independently.
    pub fn new(class: impl Into<String>, method: impl Into<String>, args: Vec<TypedArg>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
            args: args
                .into_iter()
                .map(|arg| EncodedArg {
                    type_name: arg.type_name,
                    value: encode_value(&arg.value),
                })
                .collect(),
        }
    }

    /// Declared parameter types, in order.
    pub fn param_types(&self) -> Vec<String> {
        self.args.iter().map(|a| a.type_name.clone()).collect()
    }

    /// Decode every argument value.
    pub fn decode_values(&self) -> Result<Vec<Value>> {
        self.args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                decode_value(&arg.value).map_err(|e| {
                    Error::deserialization(format!("argument {} ({}): {}", i, arg.type_name, e))
                })
            })
            .collect()
    }

    /// Serialize into a framed wire message.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Writer::default();
        body.put_str(&self.class)?;
        body.put_str(&self.method)?;
        body.put_len(self.args.len())?;
        for arg in &self.args {
            body.put_str(&arg.type_name)?;
            body.put_blob(&arg.value)?;
        }
        let body = body.into_inner();

        let mut crc = Crc::new();
        crc.update(&body);

        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.extend_from_slice(&MAGIC);
        frame.push(VERSION);
        frame.extend_from_slice(&[0u8; 3]);
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc.sum().to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Parse a framed wire message. Values are left encoded.
    pub fn decode(message: &[u8]) -> Result<Self> {
        let mut header = Reader::new(message);
        let magic = header.take(4)?;
        if magic != MAGIC {
            return Err(Error::deserialization(format!(
                "bad magic {:02x?}",
                magic
            )));
        }
        let version = header.read_u8()?;
        if version != VERSION {
            return Err(Error::deserialization(format!(
                "unsupported version {}",
                version
            )));
        }
        let reserved = header.take(3)?;
        if reserved.iter().any(|&b| b != 0) {
            return Err(Error::deserialization(format!(
                "reserved header bytes must be zero, got {:02x?}",
                reserved
            )));
        }
        let body_len = header.read_u32()? as usize;
        let expected_crc = header.read_u32()?;
        let body = header.take(body_len)?;
        header.finish()?;

        let mut crc = Crc::new();
        crc.update(body);
        if crc.sum() != expected_crc {
            return Err(Error::deserialization(format!(
                "checksum mismatch: expected {:08x}, computed {:08x}",
                expected_crc,
                crc.sum()
            )));
        }

        let mut reader = Reader::new(body);
        let class = reader.read_str()?;
        let method = reader.read_str()?;
        let argc = reader.read_len()?;
        let mut args = Vec::with_capacity(argc.min(reader.remaining()));
        for _ in 0..argc {
            let type_name = reader.read_str()?;
            let value = reader.read_blob()?.to_vec();
            args.push(EncodedArg { type_name, value });
        }
        reader.finish()?;

        Ok(Self {
            class,
            method,
            args,
        })
    }
}

/// Build and frame a request in one step.
pub fn encode_request(
    class: impl Into<String>,
    method: impl Into<String>,
    args: Vec<TypedArg>,
) -> Result<Vec<u8>> {
    InvocationRequest::new(class, method, args).encode()
}

/// Parse a framed request.
pub fn decode_request(message: &[u8]) -> Result<InvocationRequest> {
    InvocationRequest::decode(message)
}

/// Encode one value into its self-contained representation.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

/// Decode one self-contained value; trailing bytes are an error.
pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    let mut reader = Reader::new(bytes);
    let value = read_value(&mut reader, 0)?;
    reader.finish()?;
    Ok(value)
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Unit => out.push(TAG_UNIT),
        Value::Bool(v) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*v));
        }
        Value::I32(v) => {
            out.push(TAG_I32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::I64(v) => {
            out.push(TAG_I64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::U32(v) => {
            out.push(TAG_U32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::U64(v) => {
            out.push(TAG_U64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::F64(v) => {
            out.push(TAG_F64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Str(s) => {
            out.push(TAG_STR);
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            out.extend_from_slice(&(b.len() as u32).to_le_bytes());
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(TAG_LIST);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                write_value(out, item);
            }
        }
    }
}

fn read_value(reader: &mut Reader<'_>, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(Error::deserialization("value nesting too deep"));
    }
    let offset = reader.offset();
    let value = match reader.read_u8()? {
        TAG_UNIT => Value::Unit,
        TAG_BOOL => match reader.read_u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => {
                return Err(Error::deserialization(format!(
                    "invalid bool byte {} at offset {}",
                    other, offset
                )))
            }
        },
        TAG_I32 => Value::I32(reader.read_i32()?),
        TAG_I64 => Value::I64(reader.read_i64()?),
        TAG_U32 => Value::U32(reader.read_u32()?),
        TAG_U64 => Value::U64(reader.read_u64()?),
        TAG_F64 => Value::F64(reader.read_f64()?),
        TAG_STR => Value::Str(reader.read_str()?),
        TAG_BYTES => Value::Bytes(reader.read_blob()?.to_vec()),
        TAG_LIST => {
            let count = reader.read_len()?;
            // Every item needs at least its tag byte.
            if count > reader.remaining() {
                return Err(Error::deserialization(format!(
                    "list of {} items exceeds remaining {} bytes",
                    count,
                    reader.remaining()
                )));
            }
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_value(reader, depth + 1)?);
            }
            Value::List(items)
        }
        tag => {
            return Err(Error::deserialization(format!(
                "unknown value tag 0x{:02x} at offset {}",
                tag, offset
            )))
        }
    };
    Ok(value)
}

/// Growable little-endian writer for the frame body.
#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn put_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| Error::Serialization(format!("length {} exceeds u32", len)))?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        Ok(())
    }

    fn put_blob(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn put_str(&mut self, s: &str) -> Result<()> {
        self.put_blob(s.as_bytes())
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Generate bounds-checked little-endian read methods.
macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        fn $name(&mut self) -> Result<$type> {
            let bytes = self.take($size)?;
            let mut raw = [0u8; $size];
            raw.copy_from_slice(bytes);
            Ok(<$type>::from_le_bytes(raw))
        }
    };
}

/// Bounds-checked reader over a received buffer.
struct Reader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::deserialization(format!(
                "read failed at offset {}: unexpected end of buffer (need {}, have {})",
                self.offset,
                len,
                self.remaining()
            )));
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    impl_read_le!(read_u32, u32, 4);
    impl_read_le!(read_u64, u64, 8);
    impl_read_le!(read_i32, i32, 4);
    impl_read_le!(read_i64, i64, 8);
    impl_read_le!(read_f64, f64, 8);

    fn read_len(&mut self) -> Result<usize> {
        Ok(self.read_u32()? as usize)
    }

    fn read_blob(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.take(len)
    }

    fn read_str(&mut self) -> Result<String> {
        let offset = self.offset;
        let bytes = self.read_blob()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            Error::deserialization(format!("invalid UTF-8 string at offset {}", offset))
        })
    }

    fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::deserialization(format!(
                "{} trailing bytes at offset {}",
                self.remaining(),
                self.offset
            )));
        }
        Ok(())
    }
}
