//! Plain TCP transport
//!
//! Opens a socket to the host's SSH port and watches it for closure. It does
//! not speak SSH, so remote commands are unsupported: component checks report
//! `Error` and environment checks are skipped.

use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use ibmiconn_core::{
    CommandOutput, Credentials, RemoteChannel, Transport, TransportError, TransportResult,
};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::debug;

/// Transport that opens raw TCP connections
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, credentials: &Credentials) -> TransportResult<Arc<dyn RemoteChannel>> {
        let address = (credentials.host.as_str(), credentials.effective_port());
        let stream = TcpStream::connect(address).await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => TransportError::AuthFailed(e.to_string()),
            _ => TransportError::Unreachable(format!("{}: {e}", credentials.host)),
        })?;
        debug!(host = %credentials.host, "TCP connection opened");
        Ok(Arc::new(TcpChannel::new(stream)))
    }

    fn transport_id(&self) -> &'static str {
        "tcp"
    }
}

/// An open TCP socket
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    open: watch::Sender<bool>,
}

impl TcpChannel {
    fn new(stream: TcpStream) -> Self {
        let (open, _) = watch::channel(true);
        Self { stream, open }
    }
}

#[async_trait]
impl RemoteChannel for TcpChannel {
    async fn run(&self, _command: &str) -> TransportResult<CommandOutput> {
        Err(TransportError::Unsupported(
            "remote commands need an SSH transport".to_string(),
        ))
    }

    async fn closed(&self) {
        let mut closed_locally = self.open.subscribe();
        let mut buf = [0_u8; 512];
        loop {
            tokio::select! {
                _ = closed_locally.wait_for(|open| !*open) => return,
                readable = self.stream.readable() => {
                    if readable.is_err() {
                        break;
                    }
                    match self.stream.try_read(&mut buf) {
                        // Server banner and keepalives are discarded
                        Ok(n) if n > 0 => {}
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                        _ => break,
                    }
                }
            }
        }
        self.open.send_replace(false);
    }

    async fn close(&self) -> TransportResult<()> {
        // The socket itself closes when the last reference is dropped
        self.open.send_replace(false);
        Ok(())
    }
}
