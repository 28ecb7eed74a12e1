//! Byte-stream transport boundary. The scanner only needs "give me a fresh
//! connection to the target"; injecting the connector keeps the engine
//! testable against scripted peers.

use crate::model::TargetSpec;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub trait Conn: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Conn for T {}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &TargetSpec) -> std::io::Result<Box<dyn Conn>>;
}

/// Production connector: plain TCP, DNS via the runtime's resolver.
#[derive(Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, target: &TargetSpec) -> std::io::Result<Box<dyn Conn>> {
        let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
