//! Hooking SRV resolution into connection establishment.

use crate::{
    gate::{QueryError, SrvGate},
    policy::{self, FirstRecord},
    resolver::SrvResolver,
};
use async_trait::async_trait;
use std::{fmt::Debug, io, sync::Arc};
use tokio::net::TcpStream;

/// Represents the ability to open a new connection to a host and port.
#[async_trait]
pub trait Connect: Send + Sync {
    /// Connection produced on success.
    type Connection: Send;

    /// Errors encountered while connecting.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens a new connection to `host:port`.
    async fn new_connection(&self, host: &str, port: u16)
        -> Result<Self::Connection, Self::Error>;

    /// Whether this connector already resolves hosts through SRV records.
    ///
    /// Wrappers around a connector should forward this so that
    /// [`install_resolution_hook`] can refuse to hook twice.
    fn is_hooked(&self) -> bool {
        false
    }
}

/// Opens plain TCP connections with tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connect for TcpConnector {
    type Connection = TcpStream;
    type Error = io::Error;

    async fn new_connection(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        TcpStream::connect((host, port)).await
    }
}

/// Errors encountered by a [`Hooked`] connector.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError<Lookup: Debug, Dial: Debug> {
    /// The host matched but could not be resolved via SRV; nothing was dialed
    #[error("resolving host via SRV")]
    Resolve(#[source] QueryError<Lookup>),
    /// The underlying connector failed
    #[error("opening connection")]
    Connect(#[source] Dial),
}

/// Errors encountered while installing the resolution hook.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// The host pattern is not a valid regular expression
    #[error("invalid host pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    /// The connector already resolves hosts through SRV records
    #[error("SRV resolution hook is already installed on this connector")]
    AlreadyInstalled,
    /// The DNS resolver could not be created
    #[cfg(feature = "hickory")]
    #[error("creating DNS resolver: {0}")]
    Resolver(#[from] hickory_resolver::ResolveError),
}

/// A connector that runs every host through a [`SrvGate`] before dialing.
#[derive(Debug)]
pub struct Hooked<C, Resolver, Policy: policy::Policy = FirstRecord> {
    inner: C,
    gate: Arc<SrvGate<Resolver, Policy>>,
}

impl<C, Resolver, Policy: policy::Policy> Hooked<C, Resolver, Policy> {
    /// Gets the gate hosts are resolved through.
    pub fn gate(&self) -> &Arc<SrvGate<Resolver, Policy>> {
        &self.gate
    }

    /// Gets the wrapped connector.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Removes the hook, returning the wrapped connector.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C, Resolver, Policy> Connect for Hooked<C, Resolver, Policy>
where
    C: Connect,
    Resolver: SrvResolver,
    Policy: policy::Policy,
{
    type Connection = C::Connection;
    type Error = ConnectError<Resolver::Error, C::Error>;

    async fn new_connection(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Self::Connection, Self::Error> {
        let (host, port) = self
            .gate
            .resolve(host, port)
            .await
            .map_err(ConnectError::Resolve)?;
        self.inner
            .new_connection(&host, port)
            .await
            .map_err(ConnectError::Connect)
    }

    fn is_hooked(&self) -> bool {
        true
    }
}

/// Wraps `connector` so that every connection first goes through `gate`.
///
/// Fails with [`InstallError::AlreadyInstalled`] if `connector` is already
/// hooked, since resolving twice would query DNS for an IP address.
pub fn install_resolution_hook<C, Resolver, Policy>(
    connector: C,
    gate: impl Into<Arc<SrvGate<Resolver, Policy>>>,
) -> Result<Hooked<C, Resolver, Policy>, InstallError>
where
    C: Connect,
    Policy: policy::Policy,
{
    if connector.is_hooked() {
        return Err(InstallError::AlreadyInstalled);
    }
    Ok(Hooked {
        inner: connector,
        gate: gate.into(),
    })
}

/// Hooks `connector` to resolve hosts matching `host_pattern` through SRV
/// records, querying `dns_host:dns_port` or the system's nameservers.
///
/// ```ignore
/// let connector = srv_hook::install_srv_hook(
///     TcpConnector,
///     r"service\.consul$",
///     Some("127.0.0.1".parse()?),
///     Some(8600),
/// )?;
/// ```
#[cfg(feature = "hickory")]
pub fn install_srv_hook<C: Connect>(
    connector: C,
    host_pattern: &str,
    dns_host: Option<std::net::IpAddr>,
    dns_port: Option<u16>,
) -> Result<Hooked<C, crate::resolver::hickory::DnsResolver>, InstallError> {
    use crate::config::{MatchRule, ResolverConfig};

    let mut config = ResolverConfig::new(MatchRule::new(host_pattern)?);
    if let Some(dns_host) = dns_host {
        config = config.nameserver(dns_host);
    }
    if let Some(dns_port) = dns_port {
        config = config.nameserver_port(dns_port);
    }
    install_resolution_hook(connector, SrvGate::from_config(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{MatchRule, ResolverConfig},
        record::{GlueRecord, SrvAnswer, SrvTarget},
    };
    use std::{net::Ipv4Addr, sync::Mutex, time::Instant};
    use tokio::net::TcpListener;

    #[derive(Debug)]
    struct OneTarget {
        port: u16,
        glued: bool,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("unreachable")]
    struct Never;

    #[async_trait]
    impl SrvResolver for OneTarget {
        type Error = Never;

        async fn query_srv(&self, _name: &str) -> Result<SrvAnswer, Never> {
            let additional = if self.glued {
                vec![GlueRecord::new("app1.service.consul.", Ipv4Addr::LOCALHOST)]
            } else {
                vec![]
            };
            Ok(SrvAnswer::new(
                vec![SrvTarget::new(1, 1, self.port, "app1.service.consul.")],
                additional,
                Instant::now(),
            ))
        }
    }

    /// Records dialed addresses instead of connecting.
    #[derive(Debug, Default)]
    struct Recorder {
        dialed: Mutex<Vec<(String, u16)>>,
        hooked: bool,
    }

    #[async_trait]
    impl Connect for Recorder {
        type Connection = ();
        type Error = io::Error;

        async fn new_connection(&self, host: &str, port: u16) -> io::Result<()> {
            self.dialed.lock().unwrap().push((host.to_owned(), port));
            Ok(())
        }

        fn is_hooked(&self) -> bool {
            self.hooked
        }
    }

    fn gate(port: u16, glued: bool) -> SrvGate<OneTarget> {
        SrvGate::new_with_resolver(
            ResolverConfig::new(MatchRule::new(r"service\.consul$").unwrap()),
            OneTarget { port, glued },
        )
    }

    #[tokio::test]
    async fn dials_srv_target() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = install_resolution_hook(TcpConnector, gate(port, true)).unwrap();

        let (stream, accepted) = tokio::join!(
            connector.new_connection("svc.service.consul", 80),
            listener.accept()
        );
        let stream = stream.unwrap();
        let (_, peer) = accepted.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
        assert_eq!(stream.local_addr().unwrap(), peer);
    }

    #[tokio::test]
    async fn passes_other_hosts_through() {
        let connector = install_resolution_hook(Recorder::default(), gate(9000, true)).unwrap();
        connector.new_connection("example.com", 443).await.unwrap();
        connector
            .new_connection("svc.service.consul", 80)
            .await
            .unwrap();
        assert_eq!(
            *connector.inner().dialed.lock().unwrap(),
            vec![
                ("example.com".to_owned(), 443),
                ("127.0.0.1".to_owned(), 9000)
            ]
        );
    }

    #[tokio::test]
    async fn failed_resolution_dials_nothing() {
        let connector = install_resolution_hook(Recorder::default(), gate(9000, false)).unwrap();
        let err = connector
            .new_connection("svc.service.consul", 80)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Resolve(ref e) if e.is_record_not_found()));
        assert!(connector.inner().dialed.lock().unwrap().is_empty());
    }

    #[test]
    fn refuses_double_installation() {
        let once = install_resolution_hook(Recorder::default(), gate(9000, true)).unwrap();
        assert!(matches!(
            install_resolution_hook(once, gate(9000, true)),
            Err(InstallError::AlreadyInstalled)
        ));

        let forwarded = Recorder {
            hooked: true,
            ..Default::default()
        };
        assert!(matches!(
            install_resolution_hook(forwarded, gate(9000, true)),
            Err(InstallError::AlreadyInstalled)
        ));
    }

    #[test]
    fn shared_gate() {
        let gate = Arc::new(gate(9000, true));
        let a = install_resolution_hook(Recorder::default(), gate.clone()).unwrap();
        let b = install_resolution_hook(TcpConnector, gate.clone()).unwrap();
        assert!(Arc::ptr_eq(a.gate(), b.gate()));
        assert!(a.is_hooked());
    }

    #[cfg(feature = "hickory")]
    #[test]
    fn invalid_pattern() {
        assert!(matches!(
            install_srv_hook(TcpConnector, "(unclosed", None, None),
            Err(InstallError::InvalidPattern(_))
        ));
    }
}
