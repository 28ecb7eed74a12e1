//! TLS record framing: 1 byte content type, 2 bytes version, 2 bytes length,
//! then the payload.

use super::CodecError;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const CONTENT_ALERT: u8 = 21;
pub const CONTENT_HANDSHAKE: u8 = 22;

/// Upper bound on a plausible record payload. The protocol caps plaintext at
/// 2^14 plus expansion; anything larger means we are not talking to TLS.
pub const MAX_RECORD_LEN: usize = 18 * 1024;

const HEADER_LEN: usize = 5;

#[derive(Debug, Clone)]
pub struct RawRecord {
    pub content_type: u8,
    pub version: [u8; 2],
    pub payload: Vec<u8>,
}

pub fn encode_record(content_type: u8, version: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(content_type);
    out.extend_from_slice(&version);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Reads one full record, blocking until the header and the declared payload
/// length have arrived. A peer close mid-message surfaces as `Truncated`.
pub async fn read_record<R>(stream: &mut R) -> Result<RawRecord, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    read_exact_or_truncated(stream, &mut header).await?;

    let length = u16::from_be_bytes([header[3], header[4]]) as usize;
    if length == 0 {
        return Err(CodecError::MalformedRecord("zero-length record"));
    }
    if length > MAX_RECORD_LEN {
        return Err(CodecError::MalformedRecord("record length exceeds bound"));
    }

    let mut payload = vec![0u8; length];
    read_exact_or_truncated(stream, &mut payload).await?;

    Ok(RawRecord {
        content_type: header[0],
        version: [header[1], header[2]],
        payload,
    })
}

async fn read_exact_or_truncated<R>(stream: &mut R, buf: &mut [u8]) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin,
{
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Err(CodecError::Truncated),
        Err(err) => Err(CodecError::Io(err)),
    }
}
