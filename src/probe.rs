//! Probe Session: one fresh connection, one ClientHello, one classified
//! response.
//!
//! TLS handshake state is connection-scoped, so a connection is never reused
//! across probes; the transport is owned by the session and dropped on every
//! exit path.

use crate::codec::handshake::{
    build_client_hello, parse_server_response, ServerMessage, ALERT_HANDSHAKE_FAILURE,
    ALERT_INSUFFICIENT_SECURITY, ALERT_PROTOCOL_VERSION,
};
use crate::codec::record::read_record;
use crate::codec::CodecError;
use crate::model::{CipherSuite, ErrorReason, ProbeOutcome, ProtocolVersion, RejectReason, TargetSpec};
use crate::transport::Connector;
use rand::{thread_rng, Rng};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::debug;

/// Runs one handshake attempt for (version, suite) and classifies the reply.
/// Never returns an error: every failure mode is a `ProbeOutcome`.
pub async fn probe_suite(
    connector: &dyn Connector,
    target: &TargetSpec,
    version: ProtocolVersion,
    suite: CipherSuite,
    probe_timeout: Duration,
) -> ProbeOutcome {
    let outcome = match timeout(probe_timeout, run(connector, target, version, suite)).await {
        Ok(outcome) => outcome,
        Err(_) => ProbeOutcome::Error {
            reason: ErrorReason::Timeout,
        },
    };
    debug!(target = %target, version = %version, suite = %suite.name, ?outcome, "probe finished");
    outcome
}

async fn run(
    connector: &dyn Connector,
    target: &TargetSpec,
    version: ProtocolVersion,
    suite: CipherSuite,
) -> ProbeOutcome {
    let mut conn = match connector.connect(target).await {
        Ok(conn) => conn,
        Err(err) => return io_outcome(err),
    };

    let mut random = [0u8; 32];
    thread_rng().fill(&mut random);
    let hello = build_client_hello(version, suite.id, random, &target.host);

    if let Err(err) = conn.write_all(&hello).await {
        return io_outcome(err);
    }

    let record = match read_record(&mut conn).await {
        Ok(record) => record,
        Err(err) => return codec_outcome(err),
    };

    let message = match parse_server_response(&record) {
        Ok(message) => message,
        Err(err) => return codec_outcome(err),
    };

    classify(version, suite, message)
}

fn classify(version: ProtocolVersion, suite: CipherSuite, message: ServerMessage) -> ProbeOutcome {
    match message {
        ServerMessage::ServerHello {
            version: negotiated,
            cipher_suite,
            ..
        } if cipher_suite == suite.id && negotiated == version.wire_bytes() => {
            ProbeOutcome::Accepted { suite }
        }
        // Acceptance must be attributable to the probed version. A server
        // that answers a TLS1.1 offer with a downgraded TLS1.0 ServerHello
        // accepted the suite at some other version, not this one.
        ServerMessage::ServerHello {
            version: negotiated,
            cipher_suite,
            ..
        } if cipher_suite == suite.id => {
            debug!(
                probed = %version,
                negotiated_major = negotiated[0],
                negotiated_minor = negotiated[1],
                suite = suite.name,
                "server negotiated a different protocol version"
            );
            ProbeOutcome::Error {
                reason: ErrorReason::UnexpectedMessage,
            }
        }
        // We offered one suite; a hello naming any other cannot be credited
        // to this probe.
        ServerMessage::ServerHello { cipher_suite, .. } => {
            debug!(
                version = %version,
                offered = suite.name,
                chosen = cipher_suite,
                "server answered with a suite we did not offer"
            );
            ProbeOutcome::Error {
                reason: ErrorReason::UnexpectedMessage,
            }
        }
        // Single round trip only: no key-share renegotiation. The server got
        // far enough to ask for a retry, which still signals it would not
        // settle for this exact offer as-is.
        ServerMessage::HelloRetryRequest { .. } => ProbeOutcome::Rejected {
            reason: RejectReason::RetryRequested,
        },
        ServerMessage::Alert { description, .. } => match description {
            ALERT_HANDSHAKE_FAILURE => ProbeOutcome::Rejected {
                reason: RejectReason::HandshakeFailure,
            },
            ALERT_PROTOCOL_VERSION => ProbeOutcome::Rejected {
                reason: RejectReason::ProtocolVersion,
            },
            ALERT_INSUFFICIENT_SECURITY => ProbeOutcome::Rejected {
                reason: RejectReason::InsufficientSecurity,
            },
            other => {
                debug!(alert = crate::codec::handshake::alert_name(other), code = other, "non-rejection alert");
                ProbeOutcome::Error {
                    reason: ErrorReason::UnexpectedMessage,
                }
            }
        },
        ServerMessage::Unrecognized => ProbeOutcome::Error {
            reason: ErrorReason::UnexpectedMessage,
        },
    }
}

fn codec_outcome(err: CodecError) -> ProbeOutcome {
    let reason = match err {
        CodecError::MalformedRecord(_) | CodecError::MalformedHandshake(_) => ErrorReason::Malformed,
        CodecError::Truncated => ErrorReason::ConnectionReset,
        CodecError::Io(io) => return io_outcome(io),
    };
    ProbeOutcome::Error { reason }
}

fn io_outcome(err: std::io::Error) -> ProbeOutcome {
    use std::io::ErrorKind;
    let reason = match err.kind() {
        ErrorKind::ConnectionRefused => ErrorReason::ConnectionRefused,
        ErrorKind::TimedOut => ErrorReason::Timeout,
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => ErrorReason::ConnectionReset,
        // Anything else (name resolution, permission, ...) is terminal;
        // labelling it a reset would also trigger a pointless retry.
        _ => ErrorReason::ConnectionFailed,
    };
    ProbeOutcome::Error { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::record::{encode_record, CONTENT_ALERT};
    use crate::transport::{Conn, Connector};
    use async_trait::async_trait;
    use std::io::ErrorKind;

    const SUITE: CipherSuite = CipherSuite {
        id: 0xc02f,
        name: "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    };

    /// Connector whose connections replay a canned response and discard
    /// writes.
    struct Scripted {
        response: Vec<u8>,
    }

    #[async_trait]
    impl Connector for Scripted {
        async fn connect(&self, _target: &TargetSpec) -> std::io::Result<Box<dyn Conn>> {
            let (client, mut server) = tokio::io::duplex(8192);
            let response = self.response.clone();
            tokio::spawn(async move {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut sink = [0u8; 1024];
                let _ = server.read(&mut sink).await;
                let _ = server.write_all(&response).await;
            });
            Ok(Box::new(client))
        }
    }

    struct Refused;

    #[async_trait]
    impl Connector for Refused {
        async fn connect(&self, _target: &TargetSpec) -> std::io::Result<Box<dyn Conn>> {
            Err(std::io::Error::new(ErrorKind::ConnectionRefused, "refused"))
        }
    }

    fn target() -> TargetSpec {
        TargetSpec {
            host: "example.com".into(),
            port: 443,
        }
    }

    fn server_hello_bytes(version: [u8; 2], suite_id: u16, tls13: bool) -> Vec<u8> {
        let mut body = version.to_vec();
        body.extend_from_slice(&[9u8; 32]);
        body.push(0);
        body.extend_from_slice(&suite_id.to_be_bytes());
        body.push(0);
        if tls13 {
            // supported_versions -> 0x0304
            body.extend_from_slice(&[0x00, 0x06, 0x00, 0x2b, 0x00, 0x02, 0x03, 0x04]);
        }
        let mut payload = vec![0x02, 0, 0, body.len() as u8];
        payload.extend_from_slice(&body);
        encode_record(22, [0x03, 0x03], &payload)
    }

    #[tokio::test]
    async fn matching_server_hello_is_accepted() {
        let connector = Scripted {
            response: server_hello_bytes([0x03, 0x03], SUITE.id, false),
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls12,
            SUITE,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome, ProbeOutcome::Accepted { suite: SUITE });
    }

    #[tokio::test]
    async fn downgraded_server_hello_is_not_accepted() {
        // server only speaks TLS1.0 and answers a TLS1.1 offer with a
        // downgraded hello naming the offered suite
        let legacy = CipherSuite {
            id: 0xc013,
            name: "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
        };
        let connector = Scripted {
            response: server_hello_bytes([0x03, 0x01], legacy.id, false),
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls11,
            legacy,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Error {
                reason: ErrorReason::UnexpectedMessage
            }
        );
    }

    #[tokio::test]
    async fn tls13_acceptance_requires_supported_versions() {
        let suite13 = CipherSuite {
            id: 0x1301,
            name: "TLS_AES_128_GCM_SHA256",
        };
        // legacy-shaped hello without the extension is not a 1.3 answer
        let connector = Scripted {
            response: server_hello_bytes([0x03, 0x03], suite13.id, false),
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls13,
            suite13,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Error {
                reason: ErrorReason::UnexpectedMessage
            }
        );

        // with supported_versions -> 0x0304 the same hello is a real accept
        let connector = Scripted {
            response: server_hello_bytes([0x03, 0x03], suite13.id, true),
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls13,
            suite13,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome, ProbeOutcome::Accepted { suite: suite13 });
    }

    #[tokio::test]
    async fn mismatched_suite_is_unexpected_message() {
        let connector = Scripted {
            response: server_hello_bytes([0x03, 0x03], 0x009c, false),
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls12,
            SUITE,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Error {
                reason: ErrorReason::UnexpectedMessage
            }
        );
    }

    #[tokio::test]
    async fn handshake_failure_alert_is_rejected() {
        let connector = Scripted {
            response: encode_record(CONTENT_ALERT, [0x03, 0x03], &[2, ALERT_HANDSHAKE_FAILURE]),
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls12,
            SUITE,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Rejected {
                reason: RejectReason::HandshakeFailure
            }
        );
    }

    #[tokio::test]
    async fn protocol_version_alert_is_rejected() {
        let connector = Scripted {
            response: encode_record(CONTENT_ALERT, [0x03, 0x03], &[2, 70]),
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Ssl30,
            SUITE,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Rejected {
                reason: RejectReason::ProtocolVersion
            }
        );
    }

    #[tokio::test]
    async fn insufficient_security_alert_is_rejected() {
        let connector = Scripted {
            response: encode_record(CONTENT_ALERT, [0x03, 0x03], &[2, 71]),
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls12,
            SUITE,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Rejected {
                reason: RejectReason::InsufficientSecurity
            }
        );
    }

    #[tokio::test]
    async fn unclassified_io_error_is_connection_failed() {
        struct NoSuchHost;

        #[async_trait]
        impl Connector for NoSuchHost {
            async fn connect(&self, _target: &TargetSpec) -> std::io::Result<Box<dyn Conn>> {
                Err(std::io::Error::new(
                    ErrorKind::Other,
                    "failed to lookup address information",
                ))
            }
        }

        let outcome = probe_suite(
            &NoSuchHost,
            &target(),
            ProtocolVersion::Tls12,
            SUITE,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Error {
                reason: ErrorReason::ConnectionFailed
            }
        );
    }

    #[tokio::test]
    async fn other_alert_is_unexpected_message() {
        let connector = Scripted {
            response: encode_record(CONTENT_ALERT, [0x03, 0x03], &[2, 80]), // internal_error
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls12,
            SUITE,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Error {
                reason: ErrorReason::UnexpectedMessage
            }
        );
    }

    #[tokio::test]
    async fn close_before_response_is_connection_reset() {
        let connector = Scripted {
            response: Vec::new(),
        };
        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls12,
            SUITE,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Error {
                reason: ErrorReason::ConnectionReset
            }
        );
    }

    #[tokio::test]
    async fn refused_connect_is_connection_refused() {
        let outcome = probe_suite(
            &Refused,
            &target(),
            ProtocolVersion::Tls12,
            SUITE,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Error {
                reason: ErrorReason::ConnectionRefused
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        struct Silent;

        #[async_trait]
        impl Connector for Silent {
            async fn connect(&self, _target: &TargetSpec) -> std::io::Result<Box<dyn Conn>> {
                let (client, server) = tokio::io::duplex(8192);
                tokio::spawn(async move {
                    // hold the peer open without ever answering
                    let _server = server;
                    std::future::pending::<()>().await;
                });
                Ok(Box::new(client))
            }
        }

        let outcome = probe_suite(
            &Silent,
            &target(),
            ProtocolVersion::Tls12,
            SUITE,
            Duration::from_millis(200),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Error {
                reason: ErrorReason::Timeout
            }
        );
    }

    #[tokio::test]
    async fn hello_retry_request_is_rejected_with_retry() {
        let hrr_random: [u8; 32] = [
            0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65,
            0xb8, 0x91, 0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2,
            0xc8, 0xa8, 0x33, 0x9c,
        ];
        let suite13 = CipherSuite {
            id: 0x1301,
            name: "TLS_AES_128_GCM_SHA256",
        };
        let mut body = vec![0x03, 0x03];
        body.extend_from_slice(&hrr_random);
        body.push(0);
        body.extend_from_slice(&suite13.id.to_be_bytes());
        body.push(0);
        let mut payload = vec![0x02, 0, 0, body.len() as u8];
        payload.extend_from_slice(&body);
        let connector = Scripted {
            response: encode_record(22, [0x03, 0x03], &payload),
        };

        let outcome = probe_suite(
            &connector,
            &target(),
            ProtocolVersion::Tls13,
            suite13,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            outcome,
            ProbeOutcome::Rejected {
                reason: RejectReason::RetryRequested
            }
        );
    }
}
