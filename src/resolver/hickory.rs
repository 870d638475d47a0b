//! SRV resolver built on [`hickory_resolver`]'s DNS message types.
//!
//! Queries are sent straight to the configured nameservers and the whole
//! response is kept: SRV records in answer order and every A/AAAA record of
//! the additional section. Hickory's caching lookup keeps only the glue of one
//! SRV target, which is not enough to resolve the first of several targets.

use super::SrvResolver;
use crate::{
    config::{ResolverConfig, DEFAULT_DNS_PORT},
    gate::SrvGate,
    record::{GlueRecord, SrvAnswer, SrvTarget},
    SrvRecord,
};
use async_trait::async_trait;
use hickory_resolver::{
    proto::{
        op::{Message, MessageType, OpCode, Query, ResponseCode},
        rr::{rdata::SRV, RData, RecordType},
        ProtoError,
    },
    system_conf::read_system_conf,
    Name, ResolveError,
};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
};

/// Largest UDP response accepted; anything bigger arrives truncated and is
/// fetched again over TCP.
const MAX_UDP_PAYLOAD: usize = 4096;

/// Errors encountered by a [`DnsResolver`].
#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    /// The DNS message could not be encoded or decoded
    #[error("DNS message: {0}")]
    Proto(#[from] ProtoError),
    /// Sending or receiving failed
    #[error("DNS transport: {0}")]
    Io(#[from] io::Error),
    /// The nameserver did not answer in time
    #[error("DNS query to {0} timed out")]
    Timeout(SocketAddr),
    /// The nameserver answered with an error code, e.g. NXDOMAIN
    #[error("DNS server answered {0}")]
    Response(ResponseCode),
    /// A TCP response did not belong to the query
    #[error("DNS response id does not match the query")]
    Mismatch,
    /// There was no nameserver to ask
    #[error("no nameservers configured")]
    NoNameservers,
}

/// Sends SRV queries to a list of nameservers, trying them in order until one
/// answers.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    nameservers: Vec<SocketAddr>,
    timeout: Duration,
}

impl DnsResolver {
    /// Creates a resolver asking `nameservers`, waiting at most `timeout` for
    /// each of them.
    pub fn new(nameservers: Vec<SocketAddr>, timeout: Duration) -> Self {
        Self {
            nameservers,
            timeout,
        }
    }

    /// Gets the nameservers queries are sent to.
    pub fn nameservers(&self) -> &[SocketAddr] {
        &self.nameservers
    }

    async fn exchange(&self, nameserver: SocketAddr, query: &Query) -> Result<Message, DnsError> {
        let mut request = Message::new();
        request
            .set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(query.clone());
        let bytes = request.to_vec()?;

        tokio::time::timeout(self.timeout, exchange(nameserver, &bytes, request.id()))
            .await
            .map_err(|_| DnsError::Timeout(nameserver))?
    }
}

#[async_trait]
impl SrvResolver for DnsResolver {
    type Error = DnsError;

    async fn query_srv(&self, name: &str) -> Result<SrvAnswer, Self::Error> {
        let mut name = Name::from_utf8(name)?;
        name.set_fqdn(true);
        let query = Query::query(name, RecordType::SRV);

        let mut last = DnsError::NoNameservers;
        for &nameserver in &self.nameservers {
            match self.exchange(nameserver, &query).await {
                Ok(response) if response.response_code() == ResponseCode::NoError => {
                    return Ok(answer_from_response(&response));
                }
                Ok(response) => return Err(DnsError::Response(response.response_code())),
                Err(e) => {
                    #[cfg(feature = "log")]
                    tracing::trace!(%nameserver, error = %e, "Nameserver did not answer");
                    last = e;
                }
            }
        }
        Err(last)
    }
}

/// Asks over UDP, then again over TCP if the answer was truncated.
async fn exchange(nameserver: SocketAddr, request: &[u8], id: u16) -> Result<Message, DnsError> {
    let response = exchange_udp(nameserver, request, id).await?;
    if response.truncated() {
        exchange_tcp(nameserver, request, id).await
    } else {
        Ok(response)
    }
}

async fn exchange_udp(
    nameserver: SocketAddr,
    request: &[u8],
    id: u16,
) -> Result<Message, DnsError> {
    let local: SocketAddr = match nameserver {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(nameserver).await?;
    socket.send(request).await?;

    let mut buf = vec![0; MAX_UDP_PAYLOAD];
    loop {
        let len = socket.recv(&mut buf).await?;
        // Stray datagrams for other ids are dropped.
        let response = Message::from_vec(&buf[..len])?;
        if response.id() == id {
            return Ok(response);
        }
    }
}

async fn exchange_tcp(
    nameserver: SocketAddr,
    request: &[u8],
    id: u16,
) -> Result<Message, DnsError> {
    let mut stream = TcpStream::connect(nameserver).await?;
    stream
        .write_all(&(request.len() as u16).to_be_bytes())
        .await?;
    stream.write_all(request).await?;

    let mut len = [0; 2];
    stream.read_exact(&mut len).await?;
    let mut buf = vec![0; u16::from_be_bytes(len) as usize];
    stream.read_exact(&mut buf).await?;

    let response = Message::from_vec(&buf)?;
    if response.id() != id {
        return Err(DnsError::Mismatch);
    }
    Ok(response)
}

impl SrvRecord for SRV {
    type Target = Name;

    fn target(&self) -> &Self::Target {
        self.target()
    }

    fn port(&self) -> u16 {
        self.port()
    }

    fn priority(&self) -> u16 {
        self.priority()
    }

    fn weight(&self) -> u16 {
        self.weight()
    }
}

/// Collects the SRV records of the answer section, in order, and the A/AAAA
/// records of the additional section.
///
/// The answer is valid for the smallest TTL among the collected records.
pub fn answer_from_response(response: &Message) -> SrvAnswer {
    let mut ttl = None::<u32>;
    let mut records = Vec::new();
    for record in response.answers() {
        if let RData::SRV(srv) = record.data() {
            records.push(SrvTarget::from_record(srv));
            ttl = Some(ttl.map_or(record.ttl(), |ttl| ttl.min(record.ttl())));
        }
    }

    let mut additional = Vec::new();
    for record in response.additionals() {
        let address: IpAddr = match record.data() {
            RData::A(a) => a.0.into(),
            RData::AAAA(aaaa) => aaaa.0.into(),
            _ => continue,
        };
        additional.push(GlueRecord {
            name: record.name().to_string(),
            address,
        });
        ttl = Some(ttl.map_or(record.ttl(), |ttl| ttl.min(record.ttl())));
    }

    let ttl = Duration::from_secs(ttl.unwrap_or(0).into());
    SrvAnswer::new(records, additional, Instant::now() + ttl)
}

impl ResolverConfig {
    /// Builds a resolver honoring the nameserver and timeout settings.
    ///
    /// Without a nameserver override the system configuration (e.g.
    /// `/etc/resolv.conf`) supplies the nameservers; a port override then
    /// applies to each of them.
    pub fn build_resolver(&self) -> Result<DnsResolver, ResolveError> {
        let nameservers = match (self.nameserver_override(), self.nameserver_port_override()) {
            (Some(ip), port) => vec![SocketAddr::new(ip, port.unwrap_or(DEFAULT_DNS_PORT))],
            (None, port) => {
                let mut nameservers = Vec::<SocketAddr>::new();
                for addr in system_nameservers()? {
                    let addr = port.map_or(addr, |port| SocketAddr::new(addr.ip(), port));
                    if !nameservers.contains(&addr) {
                        nameservers.push(addr);
                    }
                }
                nameservers
            }
        };
        Ok(DnsResolver::new(nameservers, self.query_timeout()))
    }
}

fn system_nameservers() -> Result<Vec<SocketAddr>, ResolveError> {
    let (system, _) = read_system_conf()?;
    Ok(system
        .name_servers()
        .iter()
        .map(|ns| ns.socket_addr)
        .collect())
}

impl SrvGate<DnsResolver> {
    /// Creates a gate that queries DNS as configured by `config`.
    pub fn from_config(config: ResolverConfig) -> Result<Self, ResolveError> {
        let resolver = config.build_resolver()?;
        Ok(Self::new_with_resolver(config, resolver))
    }
}
