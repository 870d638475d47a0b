//! SRV records and the answers they arrive in.

use std::{
    cmp::Reverse,
    fmt::{self, Display},
    net::{IpAddr, SocketAddr},
    time::Instant,
};

use rand::Rng;

/// Representation of types that contain the fields of a SRV record.
pub trait SrvRecord {
    /// Type representing the SRV record's target. Must implement `Display` so
    /// it can be compared against the owner names of glue records.
    type Target: Display + ?Sized;

    /// Gets a SRV record's target.
    fn target(&self) -> &Self::Target;

    /// Gets a SRV record's port.
    fn port(&self) -> u16;

    /// Gets a SRV record's priority.
    fn priority(&self) -> u16;

    /// Gets a SRV record's weight.
    fn weight(&self) -> u16;

    /// Generates a key to sort a SRV record by priority and weight per RFC 2782.
    fn sort_key(&self, rng: impl Rng) -> (u16, Reverse<u32>) {
        sort_key(self.priority(), self.weight(), rng)
    }
}

/// Generates a key to sort a SRV record by priority and weight per RFC 2782.
pub(crate) fn sort_key(priority: u16, weight: u16, mut rng: impl Rng) -> (u16, Reverse<u32>) {
    // Sort ascending by priority, then descending (hence `Reverse`) by randomized weight
    let rand = rng.random::<u16>() as u32;
    (priority, Reverse(weight as u32 * rand))
}

/// A SRV record detached from any particular DNS library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    /// Lower values are tried first under RFC 2782 ordering.
    pub priority: u16,
    /// Relative weight among records of equal priority.
    pub weight: u16,
    /// Port the service listens on.
    pub port: u16,
    /// Host name of the machine providing the service.
    pub target: String,
}

impl SrvTarget {
    /// Creates a SRV target.
    pub fn new(priority: u16, weight: u16, port: u16, target: impl ToString) -> Self {
        Self {
            priority,
            weight,
            port,
            target: target.to_string(),
        }
    }

    /// Copies the fields of any [`SrvRecord`].
    pub fn from_record<R: SrvRecord + ?Sized>(record: &R) -> Self {
        Self::new(
            record.priority(),
            record.weight(),
            record.port(),
            record.target(),
        )
    }
}

impl SrvRecord for SrvTarget {
    type Target = str;

    fn target(&self) -> &str {
        &self.target
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn priority(&self) -> u16 {
        self.priority
    }

    fn weight(&self) -> u16 {
        self.weight
    }
}

/// An A or AAAA record from the additional section of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlueRecord {
    /// Owner name of the record.
    pub name: String,
    /// Address the owner name resolves to.
    pub address: IpAddr,
}

impl GlueRecord {
    /// Creates a glue record.
    pub fn new(name: impl ToString, address: impl Into<IpAddr>) -> Self {
        Self {
            name: name.to_string(),
            address: address.into(),
        }
    }

    /// Whether this record is owned by `name`.
    pub fn owned_by(&self, name: &str) -> bool {
        same_name(&self.name, name)
    }
}

/// DNS names are case-insensitive, and a single trailing root label is
/// insignificant when both names come from one response.
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    fn trim(name: &str) -> &str {
        name.strip_suffix('.').unwrap_or(name)
    }
    trim(a).eq_ignore_ascii_case(trim(b))
}

/// The SRV records of one response together with its glue records.
///
/// Record order is preserved exactly as the DNS primitive returned it.
#[derive(Debug, Clone)]
pub struct SrvAnswer {
    /// SRV records in response order.
    pub records: Vec<SrvTarget>,
    /// A/AAAA records from the additional section.
    pub additional: Vec<GlueRecord>,
    /// The time the answer stops being valid, derived from record TTLs.
    pub valid_until: Instant,
}

impl SrvAnswer {
    /// Creates an answer that is valid until `valid_until`.
    pub fn new(records: Vec<SrvTarget>, additional: Vec<GlueRecord>, valid_until: Instant) -> Self {
        Self {
            records,
            additional,
            valid_until,
        }
    }

    /// Finds the address of the first glue record owned by `target`.
    pub fn glue_for(&self, target: &str) -> Option<IpAddr> {
        self.additional
            .iter()
            .find(|glue| glue.owned_by(target))
            .map(|glue| glue.address)
    }
}

/// Address a connection should be opened to instead of the original host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedEndpoint {
    /// Address of the SRV target.
    pub ip: IpAddr,
    /// Port from the SRV record.
    pub port: u16,
}

impl ResolvedEndpoint {
    /// Creates an endpoint.
    pub fn new(ip: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// The endpoint as a socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.socket_addr().fmt(f)
    }
}
