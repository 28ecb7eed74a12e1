//! Handshake message codec: builds single-suite ClientHello records and
//! parses whatever the server sends back.
//!
//! Off-the-shelf TLS clients negotiate: offer everything, let the stack pick.
//! That hides which parameters the server would accept individually. Here the
//! hello offers exactly one suite at one version, so the reply is
//! attributable to that pair.

use super::record::{encode_record, RawRecord, CONTENT_ALERT, CONTENT_HANDSHAKE};
use super::{put_u16, put_u24, read_u16, CodecError};
use crate::model::ProtocolVersion;
use rand::{thread_rng, Rng};

const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const HANDSHAKE_SERVER_HELLO: u8 = 0x02;

/// Signaling suite advertising secure-renegotiation support (RFC 5746).
const SCSV_RENEGOTIATION_INFO: u16 = 0x00ff;

const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_SUPPORTED_GROUPS: u16 = 0x000a;
const EXT_EC_POINT_FORMATS: u16 = 0x000b;
const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000d;
const EXT_SUPPORTED_VERSIONS: u16 = 0x002b;
const EXT_KEY_SHARE: u16 = 0x0033;

const GROUP_X25519: u16 = 0x001d;
const GROUP_SECP256R1: u16 = 0x0017;
const GROUP_SECP384R1: u16 = 0x0018;

pub const ALERT_HANDSHAKE_FAILURE: u8 = 40;
pub const ALERT_PROTOCOL_VERSION: u8 = 70;
pub const ALERT_INSUFFICIENT_SECURITY: u8 = 71;

/// Fixed ServerHello.random that marks a HelloRetryRequest (RFC 8446 §4.1.3).
const HELLO_RETRY_RANDOM: [u8; 32] = [
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8,
    0x91, 0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8,
    0x33, 0x9c,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    ServerHello {
        version: [u8; 2],
        cipher_suite: u16,
        session_id: Vec<u8>,
    },
    HelloRetryRequest {
        cipher_suite: u16,
    },
    Alert {
        level: u8,
        description: u8,
    },
    Unrecognized,
}

pub fn alert_name(description: u8) -> &'static str {
    match description {
        0 => "close_notify",
        10 => "unexpected_message",
        ALERT_HANDSHAKE_FAILURE => "handshake_failure",
        42 => "bad_certificate",
        47 => "illegal_parameter",
        ALERT_PROTOCOL_VERSION => "protocol_version",
        ALERT_INSUFFICIENT_SECURITY => "insufficient_security",
        80 => "internal_error",
        109 => "missing_extension",
        112 => "unrecognized_name",
        _ => "other",
    }
}

/// Builds the full record bytes of a ClientHello offering exactly one cipher
/// suite at `version`. Session id is empty; compression is null only.
pub fn build_client_hello(
    version: ProtocolVersion,
    suite_id: u16,
    random: [u8; 32],
    server_name: &str,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(256);

    // TLS1.3 keeps the legacy version field at 0x0303 and moves the real
    // version into supported_versions.
    let client_version = match version {
        ProtocolVersion::Tls13 => ProtocolVersion::Tls12.wire_bytes(),
        other => other.wire_bytes(),
    };
    body.extend_from_slice(&client_version);
    body.extend_from_slice(&random);
    body.push(0); // empty session id

    let mut suites: Vec<u16> = vec![suite_id];
    if version != ProtocolVersion::Tls13 {
        suites.push(SCSV_RENEGOTIATION_INFO);
    }
    put_u16(&mut body, (suites.len() * 2) as u16);
    for id in suites {
        put_u16(&mut body, id);
    }

    body.push(1); // one compression method
    body.push(0); // null

    // SSL3.0 predates hello extensions; servers of that era may choke on
    // the trailing block, so it is omitted entirely.
    if version != ProtocolVersion::Ssl30 {
        let extensions = build_extensions(version, server_name);
        put_u16(&mut body, extensions.len() as u16);
        body.extend_from_slice(&extensions);
    }

    let mut handshake = Vec::with_capacity(body.len() + 4);
    handshake.push(HANDSHAKE_CLIENT_HELLO);
    put_u24(&mut handshake, body.len());
    handshake.extend_from_slice(&body);

    encode_record(CONTENT_HANDSHAKE, version.record_bytes(), &handshake)
}

fn build_extensions(version: ProtocolVersion, server_name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);

    // SNI carries hostnames only, never IP literals.
    if !server_name.is_empty() && server_name.parse::<std::net::IpAddr>().is_err() {
        let name = server_name.as_bytes();
        let mut data = Vec::with_capacity(name.len() + 5);
        put_u16(&mut data, (name.len() + 3) as u16); // server_name_list
        data.push(0); // host_name
        put_u16(&mut data, name.len() as u16);
        data.extend_from_slice(name);
        put_extension(&mut out, EXT_SERVER_NAME, &data);
    }

    let mut groups = Vec::new();
    put_u16(&mut groups, 6);
    put_u16(&mut groups, GROUP_X25519);
    put_u16(&mut groups, GROUP_SECP256R1);
    put_u16(&mut groups, GROUP_SECP384R1);
    put_extension(&mut out, EXT_SUPPORTED_GROUPS, &groups);

    if version != ProtocolVersion::Tls13 {
        put_extension(&mut out, EXT_EC_POINT_FORMATS, &[1, 0]); // uncompressed
    }

    if matches!(version, ProtocolVersion::Tls12 | ProtocolVersion::Tls13) {
        let algs: [u16; 9] = [
            0x0403, 0x0503, 0x0603, // ecdsa
            0x0804, 0x0805, 0x0806, // rsa-pss
            0x0401, 0x0501, 0x0601, // rsa-pkcs1
        ];
        let mut data = Vec::with_capacity(algs.len() * 2 + 2);
        put_u16(&mut data, (algs.len() * 2) as u16);
        for alg in algs {
            put_u16(&mut data, alg);
        }
        put_extension(&mut out, EXT_SIGNATURE_ALGORITHMS, &data);
    }

    if version == ProtocolVersion::Tls13 {
        // Offer only 0x0304 so acceptance cannot come from a downgrade.
        let data = [2, 0x03, 0x04];
        put_extension(&mut out, EXT_SUPPORTED_VERSIONS, &data);

        // A syntactically valid x25519 share. The point is random, not a
        // real keypair; it only has to get the server past key-share
        // validation far enough to commit to (or retry on) the suite.
        let mut share = [0u8; 32];
        thread_rng().fill(&mut share);
        let mut data = Vec::with_capacity(40);
        put_u16(&mut data, 36); // client_shares length
        put_u16(&mut data, GROUP_X25519);
        put_u16(&mut data, 32);
        data.extend_from_slice(&share);
        put_extension(&mut out, EXT_KEY_SHARE, &data);
    }

    out
}

fn put_extension(buf: &mut Vec<u8>, id: u16, data: &[u8]) {
    put_u16(buf, id);
    put_u16(buf, data.len() as u16);
    buf.extend_from_slice(data);
}

/// Interprets the first server record of the handshake. Unknown message and
/// content types are `Unrecognized`; only structurally broken input fails.
pub fn parse_server_response(record: &RawRecord) -> Result<ServerMessage, CodecError> {
    match record.content_type {
        CONTENT_ALERT => parse_alert(&record.payload),
        CONTENT_HANDSHAKE => parse_handshake(&record.payload),
        _ => Ok(ServerMessage::Unrecognized),
    }
}

fn parse_alert(payload: &[u8]) -> Result<ServerMessage, CodecError> {
    if payload.len() < 2 {
        return Err(CodecError::MalformedHandshake("short alert"));
    }
    Ok(ServerMessage::Alert {
        level: payload[0],
        description: payload[1],
    })
}

fn parse_handshake(payload: &[u8]) -> Result<ServerMessage, CodecError> {
    if payload.len() < 4 {
        return Err(CodecError::MalformedHandshake("short handshake header"));
    }
    let msg_type = payload[0];
    let declared = ((payload[1] as usize) << 16) | ((payload[2] as usize) << 8) | payload[3] as usize;
    let body = &payload[4..];
    // Servers routinely coalesce ServerHello, Certificate and the rest of
    // their flight into one record; only the first message matters here.
    if declared > body.len() {
        return Err(CodecError::MalformedHandshake("handshake length overruns record"));
    }
    if msg_type != HANDSHAKE_SERVER_HELLO {
        return Ok(ServerMessage::Unrecognized);
    }
    parse_server_hello(&body[..declared])
}

fn parse_server_hello(body: &[u8]) -> Result<ServerMessage, CodecError> {
    if body.len() < 35 {
        return Err(CodecError::MalformedHandshake("short server hello"));
    }
    let mut version = [body[0], body[1]];
    let random = &body[2..34];
    let session_id_len = body[34] as usize;
    if session_id_len > 32 {
        return Err(CodecError::MalformedHandshake("session id too long"));
    }
    let cipher_at = 35 + session_id_len;
    let cipher_suite = read_u16(body, cipher_at)
        .ok_or(CodecError::MalformedHandshake("server hello cut before cipher"))?;
    let session_id = body[35..cipher_at].to_vec();

    // TLS1.3 hides its version in supported_versions; the legacy field says
    // 0x0303 either way.
    let ext_at = cipher_at + 3; // cipher(2) + compression(1)
    if let Some(negotiated) = negotiated_version_ext(body, ext_at) {
        version = negotiated;
    }

    if random == HELLO_RETRY_RANDOM {
        return Ok(ServerMessage::HelloRetryRequest { cipher_suite });
    }

    Ok(ServerMessage::ServerHello {
        version,
        cipher_suite,
        session_id,
    })
}

fn negotiated_version_ext(body: &[u8], ext_at: usize) -> Option<[u8; 2]> {
    let total = read_u16(body, ext_at)? as usize;
    let mut pos = ext_at + 2;
    let end = (pos + total).min(body.len());
    while pos + 4 <= end {
        let ext_type = read_u16(body, pos)?;
        let ext_len = read_u16(body, pos + 2)? as usize;
        let data_at = pos + 4;
        if data_at + ext_len > end {
            return None;
        }
        if ext_type == EXT_SUPPORTED_VERSIONS && ext_len >= 2 {
            return Some([body[data_at], body[data_at + 1]]);
        }
        pos = data_at + ext_len;
    }
    None
}
