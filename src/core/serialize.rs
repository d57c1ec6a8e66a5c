// Deterministic byte codec for blocks, transactions and UTXO entries

use crate::core::Hash256;
use crate::error::{LedgerError, Result};
use std::io::{self, Read};

/// Upper bound on a single length-prefixed field; anything larger is corruption
pub const MAX_VAR_BYTES: u64 = 1 << 20;

/// Trait for types with a canonical byte encoding
pub trait Serializable {
    fn serialize(&self) -> Vec<u8>;
    fn deserialize(data: &[u8]) -> Result<Self> where Self: Sized;
}

/// Write a variable-length integer (VarInt)
pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => buf.push(value as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x10000..=0xffffffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Read a variable-length integer (VarInt)
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> io::Result<u64> {
    let mut first_byte = [0u8; 1];
    reader.read_exact(&mut first_byte)?;

    match first_byte[0] {
        0..=0xfc => Ok(first_byte[0] as u64),
        0xfd => {
            let mut bytes = [0u8; 2];
            reader.read_exact(&mut bytes)?;
            Ok(u16::from_le_bytes(bytes) as u64)
        }
        0xfe => {
            let mut bytes = [0u8; 4];
            reader.read_exact(&mut bytes)?;
            Ok(u32::from_le_bytes(bytes) as u64)
        }
        0xff => {
            let mut bytes = [0u8; 8];
            reader.read_exact(&mut bytes)?;
            Ok(u64::from_le_bytes(bytes))
        }
    }
}

/// Write bytes with length prefix (VarInt length + data)
pub fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Read bytes with length prefix
pub fn read_var_bytes<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_varint(reader)?;
    if len > MAX_VAR_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("length prefix {} exceeds limit", len),
        ));
    }
    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;
    Ok(data)
}

/// Optional hash: empty field for `None`, 32 bytes otherwise
pub fn write_opt_hash(buf: &mut Vec<u8>, hash: Option<&Hash256>) {
    match hash {
        Some(h) => write_var_bytes(buf, h.as_bytes()),
        None => write_varint(buf, 0),
    }
}

pub fn read_opt_hash<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Hash256>> {
    let bytes = read_var_bytes(reader).map_err(corrupted)?;
    if bytes.is_empty() {
        Ok(None)
    } else {
        Hash256::from_slice(&bytes).map(Some)
    }
}

pub fn read_array<const N: usize, R: Read + ?Sized>(reader: &mut R) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes).map_err(corrupted)?;
    Ok(bytes)
}

/// Count prefix for a repeated field, bounded by `MAX_VAR_BYTES`
pub fn read_count<R: Read + ?Sized>(reader: &mut R) -> Result<usize> {
    let count = read_varint(reader).map_err(corrupted)?;
    if count > MAX_VAR_BYTES {
        return Err(LedgerError::Corrupted(format!("item count {} exceeds limit", count)));
    }
    Ok(count as usize)
}

pub fn corrupted(err: io::Error) -> LedgerError {
    LedgerError::Corrupted(err.to_string())
}
