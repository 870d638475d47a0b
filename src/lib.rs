#![deny(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

/*!
Transparently route connections for service-discovery hosts to the address
advertised by their DNS SRV records.

# Introduction

SRV Records, as defined in [RFC 2782](https://tools.ietf.org/html/rfc2782),
advertise the host and port a service runs on. Service registries such as
Consul answer SRV queries for names like `web.service.consul` and glue the
address of each target into the additional section of the same response:

```text
;; ANSWER SECTION:
web.service.consul.   0 IN SRV 1 1 9000 app1.node.dc1.consul.
;; ADDITIONAL SECTION:
app1.node.dc1.consul. 0 IN A   10.0.0.5
```

A client wanting to talk to `web.service.consul` should therefore dial
`10.0.0.5:9000`, whatever port it was originally given.

`srv-hook` makes that substitution right before a connection is opened. A
[`SrvGate`] is built once from a [`ResolverConfig`] holding a pattern of hosts
to resolve. For every connection, [`SrvGate::resolve`] passes non-matching
hosts through untouched and replaces matching ones with the address of the
first SRV record's target, taken from the additional section. Connectors
implementing [`Connect`] can be wrapped with [`install_resolution_hook`] so the
gate runs implicitly on every dial.

Failures never fall back to the original host: a matching host that cannot be
resolved through SRV yields a [`QueryError`].

# Alternative Resolvers and Target Selection Policies

The DNS query itself is made through a [`SrvResolver`]. The `hickory` feature
(on by default) provides [`DnsResolver`], which exchanges
[`hickory_resolver`] DNS messages with the configured nameservers and keeps
every glue record of the response; tests and other DNS libraries can provide
their own.

The first record of an answer is used as returned by the DNS server. RFC 2782
priority and weight ordering is available as the opt-in
[`PriorityWeight`](policy::PriorityWeight) policy, set with
[`SrvGate::policy`].

[`SrvResolver`]: resolver::SrvResolver
[`DnsResolver`]: resolver::hickory::DnsResolver
*/

mod compose;
pub use compose::ComposeError;

pub mod config;
pub use config::{MatchRule, ResolverConfig};

mod connect;
#[cfg(feature = "hickory")]
pub use connect::install_srv_hook;
pub use connect::{
    install_resolution_hook, Connect, ConnectError, Hooked, InstallError, TcpConnector,
};

mod gate;
pub use gate::{QueryError, SrvGate, UriError};

pub mod policy;

mod record;
pub use record::{GlueRecord, ResolvedEndpoint, SrvAnswer, SrvRecord, SrvTarget};

pub mod resolver;
