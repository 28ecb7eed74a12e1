pub mod handshake;
pub mod record;

use thiserror::Error;

/// Wire-level decode failures. These never abort a scan; the probe layer
/// folds them into per-suite outcomes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed record: {0}")]
    MalformedRecord(&'static str),
    #[error("malformed handshake: {0}")]
    MalformedHandshake(&'static str),
    #[error("connection closed mid-message")]
    Truncated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub(crate) fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_u24(buf: &mut Vec<u8>, value: usize) {
    buf.push((value >> 16) as u8);
    buf.push((value >> 8) as u8);
    buf.push(value as u8);
}

pub(crate) fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    let bytes = buf.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
