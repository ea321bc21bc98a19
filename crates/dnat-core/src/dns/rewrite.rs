//! Client reply construction

use super::upstream::UdpUpstream;
use super::SetSink;
use crate::table::DynamicTable;
use hickory_proto::op::{Header, Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, CNAME};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest alias chain followed before giving up on the rest
pub const MAX_CHAIN_DEPTH: usize = 16;

/// Upstream answer reduced to what the rewriter needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChain {
    /// (alias, canonical) hops starting at the question name
    pub aliases: Vec<(Name, Name)>,
    /// Name the addresses belong to
    pub canonical: Name,
    /// Real addresses, in answer order
    pub addresses: Vec<Ipv4Addr>,
    /// Minimum TTL over every hop and address
    pub ttl: u32,
}

/// Classified upstream outcome for one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// At least one address
    Answer(ResolvedChain),
    /// NXDOMAIN
    NotFound,
    /// NOERROR without addresses
    NoData,
    /// Anything else; the reason is for logging
    Failed(String),
}

impl Resolution {
    /// Classify the upstream reply to an A query for `qname`
    pub fn from_reply(qname: &Name, reply: &Message) -> Self {
        match reply.response_code() {
            ResponseCode::NoError => {}
            ResponseCode::NXDomain => return Self::NotFound,
            other => return Self::Failed(format!("upstream answered {other}")),
        }

        let mut aliases = Vec::new();
        let mut ttl = u32::MAX;
        let mut current = qname.clone();

        for _ in 0..MAX_CHAIN_DEPTH {
            let next = reply.answers().iter().find_map(|record| match record.data() {
                Some(RData::CNAME(CNAME(target))) if record.name() == &current => {
                    Some((target.clone(), record.ttl()))
                }
                _ => None,
            });
            let Some((target, hop_ttl)) = next else { break };
            if target == current {
                break;
            }
            ttl = ttl.min(hop_ttl);
            aliases.push((current, target.clone()));
            current = target;
        }

        let mut addresses = Vec::new();
        for record in reply.answers() {
            if let Some(RData::A(A(addr))) = record.data() {
                if record.name() == &current {
                    ttl = ttl.min(record.ttl());
                    addresses.push(*addr);
                }
            }
        }

        if addresses.is_empty() {
            return Self::NoData;
        }

        Self::Answer(ResolvedChain {
            aliases,
            canonical: current,
            addresses,
            ttl,
        })
    }
}

/// Rewrites upstream answers into logical addresses
pub struct DnsRewriter {
    upstream: UdpUpstream,
    table: Arc<DynamicTable>,
    sink: Arc<dyn SetSink>,
}

impl DnsRewriter {
    /// Create a rewriter allocating from `table`
    pub fn new(upstream: UdpUpstream, table: Arc<DynamicTable>, sink: Arc<dyn SetSink>) -> Self {
        Self { upstream, table, sink }
    }

    /// Build the reply to one client request
    pub async fn handle(&self, request: &Message) -> Message {
        let mut response = Message::new();
        response.set_header(Header::response_from_request(request.header()));
        response.set_recursion_available(true);
        response.add_queries(request.queries().iter().cloned());

        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            response.set_response_code(ResponseCode::NotImp);
            return response;
        }

        let mut rcode = ResponseCode::NoError;
        for query in request.queries() {
            if query.query_class() != DNSClass::IN || query.query_type() != RecordType::A {
                debug!(name = %query.name(), qtype = %query.query_type(), "Unsupported question");
                rcode = ResponseCode::NXDomain;
                continue;
            }

            match self.upstream.resolve(query.name()).await {
                Resolution::NotFound => rcode = ResponseCode::NXDomain,
                Resolution::NoData => rcode = ResponseCode::NoError,
                Resolution::Failed(reason) => {
                    warn!(name = %query.name(), "Upstream resolution failed: {}", reason);
                    rcode = ResponseCode::ServFail;
                    break;
                }
                Resolution::Answer(chain) => self.add_answers(&mut response, &chain),
            }
        }

        response.set_response_code(rcode);
        response
    }

    fn add_answers(&self, response: &mut Message, chain: &ResolvedChain) {
        for (alias, canonical) in &chain.aliases {
            response.add_answer(Record::from_rdata(
                alias.clone(),
                chain.ttl,
                RData::CNAME(CNAME(canonical.clone())),
            ));
        }

        for &real in &chain.addresses {
            let logical = self.table.reverse_lookup_or_allocate(real);
            self.sink.add(real);
            debug!(name = %chain.canonical, %real, %logical, "Rewriting answer");
            response.add_answer(Record::from_rdata(
                chain.canonical.clone(),
                chain.ttl,
                RData::A(A(logical)),
            ));
        }
    }
}
