//! UDP listener for the rewrite server

use super::rewrite::DnsRewriter;
use crate::error::{Error, Result};
use hickory_proto::op::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{debug, error, info, trace};

const MAX_DATAGRAM: usize = 65535;

/// DNS rewrite server bound to a local UDP port
pub struct DnsRewriteServer {
    socket: Arc<UdpSocket>,
    rewriter: Arc<DnsRewriter>,
}

impl DnsRewriteServer {
    /// Bind the listening socket
    ///
    /// A bind failure is a fatal resource error.
    pub async fn bind(addr: SocketAddr, rewriter: DnsRewriter) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::resource("dns listener", format!("bind {addr}: {e}")))?;
        Ok(Self {
            socket: Arc::new(socket),
            rewriter: Arc::new(rewriter),
        })
    }

    /// Address the server listens on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve requests forever, one task per datagram
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "DNS rewrite server listening");
        let mut buffer = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    error!("DNS receive error: {}", e);
                    time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };
            trace!(%peer, len, "DNS request");

            let request = match Message::from_vec(&buffer[..len]) {
                Ok(message) => message,
                Err(e) => {
                    debug!(%peer, "Dropping unparseable request: {}", e);
                    continue;
                }
            };

            let socket = Arc::clone(&self.socket);
            let rewriter = Arc::clone(&self.rewriter);
            tokio::spawn(async move {
                let response = rewriter.handle(&request).await;
                match response.to_vec() {
                    Ok(bytes) => {
                        if let Err(e) = socket.send_to(&bytes, peer).await {
                            debug!(%peer, "DNS send error: {}", e);
                        }
                    }
                    Err(e) => error!("DNS response encode error: {}", e),
                }
            });
        }
    }
}
