// src/core/protocol/wire.rs

//! Low-level readers and writers for the primitive field types of the game protocol.
//!
//! Every read is bounds-checked against the remaining input; truncated or malformed
//! fields surface as `ProxyError::Protocol` and never panic.

use crate::core::ProxyError;
use bytes::{BufMut, BytesMut};

/// The largest string (in UTF-16 code units) a protocol string field may carry.
pub const MAX_STRING_UNITS: usize = i16::MAX as usize;

/// A forward-only cursor over a packet body.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Takes exactly `n` bytes off the front of the buffer.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ProxyError> {
        if self.buf.len() < n {
            return Err(ProxyError::Protocol(format!(
                "truncated field: needed {n} bytes, {} available",
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProxyError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProxyError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ProxyError> {
        Ok(i8::from_be_bytes(self.read_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, ProxyError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, ProxyError> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, ProxyError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ProxyError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Reads a protocol string: an i16 count of UTF-16 code units, then UTF-16BE data.
    pub fn read_string(&mut self) -> Result<String, ProxyError> {
        let units = self.read_i16()?;
        if units < 0 {
            return Err(ProxyError::Protocol(format!(
                "negative string length {units}"
            )));
        }
        let raw = self.read_bytes(units as usize * 2)?;
        let decoded: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(String::from_utf16(&decoded)?)
    }

    /// Reads a u16-length-prefixed UTF-8 string, as used inside plugin message payloads.
    pub fn read_utf(&mut self) -> Result<String, ProxyError> {
        let len = self.read_u16()? as usize;
        let raw = self.read_bytes(len)?;
        Ok(String::from_utf8(raw.to_vec())?)
    }

    /// Reads an i16-length-prefixed byte array.
    pub fn read_short_bytes(&mut self) -> Result<&'a [u8], ProxyError> {
        let len = self.read_i16()?;
        if len < 0 {
            return Err(ProxyError::Protocol(format!(
                "negative byte array length {len}"
            )));
        }
        self.read_bytes(len as usize)
    }
}

/// Writes a protocol string (i16 UTF-16 unit count followed by UTF-16BE data).
pub fn put_string(dst: &mut BytesMut, value: &str) -> Result<(), ProxyError> {
    let units: Vec<u16> = value.encode_utf16().collect();
    if units.len() > MAX_STRING_UNITS {
        return Err(ProxyError::Protocol(format!(
            "string of {} units exceeds protocol limit",
            units.len()
        )));
    }
    dst.reserve(2 + units.len() * 2);
    dst.put_i16(units.len() as i16);
    for unit in units {
        dst.put_u16(unit);
    }
    Ok(())
}

/// Writes a u16-length-prefixed UTF-8 string.
pub fn put_utf(dst: &mut BytesMut, value: &str) -> Result<(), ProxyError> {
    let len = u16::try_from(value.len()).map_err(|_| {
        ProxyError::Protocol(format!("UTF-8 string of {} bytes is too long", value.len()))
    })?;
    dst.put_u16(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}

/// Writes an i16-length-prefixed byte array.
pub fn put_short_bytes(dst: &mut BytesMut, data: &[u8]) -> Result<(), ProxyError> {
    let len = i16::try_from(data.len()).map_err(|_| {
        ProxyError::Protocol(format!("byte array of {} bytes is too long", data.len()))
    })?;
    dst.put_i16(len);
    dst.put_slice(data);
    Ok(())
}
