//! Which hosts get SRV resolution, and how to reach the DNS server.

use regex::Regex;
use std::{fmt, net::IpAddr, str::FromStr, time::Duration};

/// Default bound on a single SRV query.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Port used when only a nameserver address is configured.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// A pattern deciding whether a host is resolved through SRV records.
///
/// The pattern is searched for anywhere in the host, so anchor it (e.g.
/// `service\.consul$`) to match only a suffix.
#[derive(Clone)]
pub struct MatchRule {
    pattern: Regex,
}

impl MatchRule {
    /// Compiles a match rule.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Whether `host` should be resolved through SRV records.
    pub fn is_match(&self, host: &str) -> bool {
        self.pattern.is_match(host)
    }

    /// The source pattern.
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl FromStr for MatchRule {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MatchRule").field(&self.as_str()).finish()
    }
}

/// Settings shared by every resolution a gate performs.
///
/// Built once with the setter methods and never changed afterwards; a gate
/// takes ownership of it.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    rule: MatchRule,
    nameserver: Option<IpAddr>,
    nameserver_port: Option<u16>,
    timeout: Duration,
    cache: bool,
}

impl ResolverConfig {
    /// Creates a configuration that resolves hosts matching `rule` using the
    /// system's DNS settings.
    pub fn new(rule: MatchRule) -> Self {
        Self {
            rule,
            nameserver: None,
            nameserver_port: None,
            timeout: DEFAULT_TIMEOUT,
            cache: false,
        }
    }

    /// Sets the nameserver SRV queries are sent to.
    pub fn nameserver(self, nameserver: IpAddr) -> Self {
        Self {
            nameserver: Some(nameserver),
            ..self
        }
    }

    /// Sets the port of the nameserver.
    pub fn nameserver_port(self, port: u16) -> Self {
        Self {
            nameserver_port: Some(port),
            ..self
        }
    }

    /// Sets the bound on a single SRV query.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Enables caching resolved endpoints until their records' TTL expires.
    ///
    /// Off by default: every matching connection re-queries DNS. With the
    /// cache on, a moved service is only noticed once the TTL has elapsed.
    pub fn cache(self, cache: bool) -> Self {
        Self { cache, ..self }
    }

    /// Gets the match rule.
    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    /// Gets the nameserver override, if any.
    pub fn nameserver_override(&self) -> Option<IpAddr> {
        self.nameserver
    }

    /// Gets the nameserver port override, if any.
    pub fn nameserver_port_override(&self) -> Option<u16> {
        self.nameserver_port
    }

    /// Gets the query timeout.
    pub fn query_timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether resolved endpoints are cached.
    pub fn caches(&self) -> bool {
        self.cache
    }
}
