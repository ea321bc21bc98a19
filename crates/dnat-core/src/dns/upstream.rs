//! Upstream resolver client

use super::rewrite::Resolution;
use crate::error::{Error, Result};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::trace;

const RECV_BUFFER_SIZE: usize = 4096;

/// Plain UDP client for one recursive resolver
#[derive(Debug, Clone)]
pub struct UdpUpstream {
    server: SocketAddr,
    timeout: Duration,
}

impl UdpUpstream {
    /// Create a client for `server`
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    /// Resolver address
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Resolve the A records of `name` and classify the outcome
    pub async fn resolve(&self, name: &Name) -> Resolution {
        match self.query(name).await {
            Ok(reply) => Resolution::from_reply(name, &reply),
            Err(e) => Resolution::Failed(e.to_string()),
        }
    }

    /// Send one A query and wait for the matching reply
    pub async fn query(&self, name: &Name) -> Result<Message> {
        let id: u16 = rand::random();
        let mut request = Message::new();
        request
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(name.clone(), RecordType::A));
        let bytes = request.to_vec()?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect(self.server).await?;
        socket.send(&bytes).await?;

        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        let len = timeout(self.timeout, socket.recv(&mut buffer))
            .await
            .map_err(|_| Error::upstream(name.to_string(), format!("no reply within {:?}", self.timeout)))??;

        let reply = Message::from_vec(&buffer[..len])
            .map_err(|e| Error::upstream(name.to_string(), format!("malformed reply: {e}")))?;
        trace!(%name, server = %self.server, answers = reply.answer_count(), "Upstream reply");

        if reply.id() != id {
            return Err(Error::upstream(
                name.to_string(),
                format!("reply id {} does not match query id {}", reply.id(), id),
            ));
        }
        if reply.message_type() != MessageType::Response {
            return Err(Error::upstream(name.to_string(), "reply is not a response"));
        }

        Ok(reply)
    }
}
