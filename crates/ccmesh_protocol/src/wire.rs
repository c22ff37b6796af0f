//! Inner length-prefixed encodings used *within* a packet payload.
//!
//! This is distinct from the outer frame length-prefix that `ccmesh_net::PacketConn`
//! puts around an entire payload (see its `0xFE`/`0xFF` escapes). Here, a single
//! payload buffer built by a packet codec (`WorkerAdvert`, `WorkerAssignment`, ...)
//! embeds variable-length byte strings using a cheaper one-byte length prefix,
//! escaping to an 8-byte length only when a field is unusually large:
//!
//! `u8 L; if L < 0xFF { L bytes } else { u64 N (little-endian), then N bytes }`
//!
//! All multi-byte integers in this crate are little-endian, matching the outer
//! frame's extended-length and magic/version fields (§4.1, §6 of the spec don't
//! specify endianness for inner fields, so the outer convention is carried inward).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::error::{ProtocolError, Result};

/// Appends a length-prefixed byte string to `buf`.
pub fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    if data.len() < 0xFF {
        buf.push(data.len() as u8);
    } else {
        buf.push(0xFF);
        buf.write_u64::<LittleEndian>(data.len() as u64).unwrap();
    }
    buf.extend_from_slice(data);
}

/// Reads a length-prefixed byte string from `cur`.
pub fn read_bytes(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let l = read_u8(cur)?;
    let len = if l < 0xFF {
        l as u64
    } else {
        read_u64(cur)?
    };
    let len = usize::try_from(len).map_err(|_| ProtocolError::FrameTooLarge(len))?;
    let start = cur.position() as usize;
    let slice = cur.get_ref();
    if start + len > slice.len() {
        return Err(ProtocolError::Truncated {
            expected: start + len,
            got: slice.len(),
        });
    }
    let out = slice[start..start + len].to_vec();
    cur.set_position((start + len) as u64);
    Ok(out)
}

pub fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.write_u16::<LittleEndian>(v).unwrap();
}

pub fn read_u16(cur: &mut Cursor<&[u8]>) -> Result<u16> {
    cur.read_u16::<LittleEndian>().map_err(|_| ProtocolError::Truncated {
        expected: cur.position() as usize + 2,
        got: cur.get_ref().len(),
    })
}

pub fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.write_u64::<LittleEndian>(v).unwrap();
}

pub fn read_u64(cur: &mut Cursor<&[u8]>) -> Result<u64> {
    cur.read_u64::<LittleEndian>().map_err(|_| ProtocolError::Truncated {
        expected: cur.position() as usize + 8,
        got: cur.get_ref().len(),
    })
}

fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8> {
    cur.read_u8().map_err(|_| ProtocolError::Truncated {
        expected: cur.position() as usize + 1,
        got: cur.get_ref().len(),
    })
}

/// Writes a float64 in the representation used for `avail_slots` reports.
pub fn write_f64(buf: &mut Vec<u8>, v: f64) {
    let mut w = Vec::with_capacity(8);
    byteorder::WriteBytesExt::write_f64::<LittleEndian>(&mut w, v).unwrap();
    buf.extend_from_slice(&w);
}

pub fn read_f64(cur: &mut Cursor<&[u8]>) -> Result<f64> {
    byteorder::ReadBytesExt::read_f64::<LittleEndian>(cur).map_err(|_| ProtocolError::Truncated {
        expected: cur.position() as usize + 8,
        got: cur.get_ref().len(),
    })
}

/// Convenience: build a payload buffer with a writer closure.
pub fn build(f: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut buf = Vec::new();
    f(&mut buf);
    buf
}

#[allow(dead_code)]
fn _assert_write_impl(_w: &mut dyn Write) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_roundtrip_short() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, b"hello");
        let mut cur = Cursor::new(buf.as_slice());
        assert_eq!(read_bytes(&mut cur).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn bytes_roundtrip_long() {
        let data = vec![7u8; 300];
        let mut buf = Vec::new();
        write_bytes(&mut buf, &data);
        assert_eq!(buf[0], 0xFF);
        let mut cur = Cursor::new(buf.as_slice());
        assert_eq!(read_bytes(&mut cur).unwrap(), data);
    }

    #[test]
    fn truncated_read_errors() {
        let buf = vec![5u8, 1, 2];
        let mut cur = Cursor::new(buf.as_slice());
        assert!(read_bytes(&mut cur).is_err());
    }
}
