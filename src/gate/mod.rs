//! Deciding, per connection, whether a host is swapped for its SRV target.

use crate::{
    compose::ComposeError,
    config::ResolverConfig,
    policy,
    record::ResolvedEndpoint,
    resolver::SrvResolver,
};
use http::{uri::Authority, Uri};
use std::{borrow::Cow, fmt::Debug, time::Duration};

mod cache;
use cache::Cache;

/// Errors encountered while resolving a host through SRV records.
///
/// Every variant means the host could not be resolved via SRV; the original
/// host is never used as a fallback.
#[derive(Debug, thiserror::Error)]
pub enum QueryError<Lookup: Debug> {
    /// The DNS query itself failed (server failure, NXDOMAIN, transport error)
    #[error("SRV query failed: {0}")]
    Lookup(Lookup),
    /// The DNS query did not finish in time
    #[error("SRV query timed out after {0:?}")]
    Timeout(Duration),
    /// The answer could not be turned into an endpoint
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

impl<Lookup: Debug> QueryError<Lookup> {
    /// Whether the answer lacked an address for its SRV target.
    pub fn is_record_not_found(&self) -> bool {
        matches!(
            self,
            QueryError::Compose(ComposeError::RecordNotFound { .. })
        )
    }
}

/// Errors encountered by [`SrvGate::resolve_uri`].
#[derive(Debug, thiserror::Error)]
pub enum UriError<Lookup: Debug> {
    /// The URI has no host to resolve
    #[error("URI has no host")]
    MissingHost,
    /// SRV resolution of the host failed
    #[error(transparent)]
    Resolve(#[from] QueryError<Lookup>),
    /// The rewritten URI could not be assembled
    #[error("building URI from resolved endpoint: {0}")]
    Build(#[from] http::Error),
}

/// Decides whether a host is resolved through SRV records and performs the
/// resolution.
///
/// # Usage
///
/// A gate is created once from a [`ResolverConfig`] by [`SrvGate::from_config`]
/// (with the `hickory` feature) or [`SrvGate::new_with_resolver`], then shared
/// (e.g. in an `Arc`) by everything that opens connections. Right before
/// dialing, the caller passes its `(host, port)` to [`resolve`] and dials
/// whatever comes back.
///
/// Hosts that do not match the configured [`MatchRule`] are returned as is
/// without touching the network. Matching hosts are queried for SRV records;
/// the record chosen by the gate's [`Policy`] (by default, the first one) is
/// resolved through the additional section of the same response.
///
/// [`resolve`]: SrvGate::resolve()
/// [`MatchRule`]: crate::config::MatchRule
#[derive(Debug)]
pub struct SrvGate<Resolver, Policy: policy::Policy = policy::FirstRecord> {
    config: ResolverConfig,
    resolver: Resolver,
    policy: Policy,
    cache: Option<Cache>,
}

impl<Resolver, Policy: policy::Policy + Default> SrvGate<Resolver, Policy> {
    /// Creates a gate that queries SRV records with `resolver`.
    pub fn new_with_resolver(config: ResolverConfig, resolver: Resolver) -> Self {
        let cache = config.caches().then(Cache::default);
        Self {
            config,
            resolver,
            policy: Default::default(),
            cache,
        }
    }
}

impl<Resolver: SrvResolver, Policy: policy::Policy> SrvGate<Resolver, Policy> {
    /// Resolves the host and port a connection to `host:port` should dial.
    ///
    /// Non-matching hosts come back unchanged and borrowed. Matching hosts come
    /// back as the SRV target's IP address and the SRV record's port.
    pub async fn resolve<'a>(
        &self,
        host: &'a str,
        port: u16,
    ) -> Result<(Cow<'a, str>, u16), QueryError<Resolver::Error>> {
        if !self.matches(host) {
            #[cfg(feature = "log")]
            tracing::debug!(host, "Host did not match SRV pattern, ignoring");
            return Ok((Cow::Borrowed(host), port));
        }

        #[cfg(feature = "log")]
        tracing::debug!(host, "Host matched SRV pattern, resolving");
        let endpoint = self.resolve_endpoint(host).await?;
        Ok((Cow::Owned(endpoint.ip.to_string()), endpoint.port))
    }

    /// Resolves a matching host to the endpoint of its SRV target, ignoring
    /// the match rule.
    pub async fn resolve_endpoint(
        &self,
        host: &str,
    ) -> Result<ResolvedEndpoint, QueryError<Resolver::Error>> {
        if let Some(endpoint) = self.cache.as_ref().and_then(|cache| cache.get(host)) {
            #[cfg(feature = "log")]
            tracing::trace!(host, %endpoint, "Using cached SRV resolution");
            return Ok(endpoint);
        }

        let timeout = self.config.query_timeout();
        let answer = match tokio::time::timeout(timeout, self.resolver.query_srv(host)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                #[cfg(feature = "log")]
                tracing::debug!(host, error = %e, "SRV query failed");
                return Err(QueryError::Lookup(e));
            }
            Err(_) => {
                #[cfg(feature = "log")]
                tracing::debug!(host, ?timeout, "SRV query timed out");
                return Err(QueryError::Timeout(timeout));
            }
        };

        let endpoint = answer.compose_with(&self.policy).inspect_err(|_e| {
            #[cfg(feature = "log")]
            tracing::debug!(host, error = %_e, "Failed to compose SRV answer");
        })?;

        #[cfg(feature = "log")]
        tracing::debug!(host, %endpoint, "Resolved SRV record");

        if let Some(cache) = &self.cache {
            cache.insert(host, endpoint, answer.valid_until);
        }
        Ok(endpoint)
    }

    /// Rewrites the authority of an HTTP URI to the resolved address and port.
    ///
    /// URIs whose host does not match are returned unchanged. IPv6 results are
    /// bracketed and userinfo (`user:password@`) is kept.
    pub async fn resolve_uri(&self, uri: &Uri) -> Result<Uri, UriError<Resolver::Error>> {
        let host = uri.host().ok_or(UriError::MissingHost)?;
        if !self.matches(host) {
            return Ok(uri.clone());
        }

        let endpoint = self.resolve_endpoint(host).await?;
        let authority = match uri
            .authority()
            .and_then(|authority| authority.as_str().rsplit_once('@'))
        {
            Some((userinfo, _)) => format!("{userinfo}@{endpoint}"),
            None => endpoint.to_string(),
        };
        let authority = Authority::try_from(authority).map_err(http::Error::from)?;

        let mut parts = uri.clone().into_parts();
        parts.authority = Some(authority);
        Ok(Uri::from_parts(parts).map_err(http::Error::from)?)
    }

    /// Whether `host` is subject to SRV resolution.
    pub fn matches(&self, host: &str) -> bool {
        self.config.rule().is_match(host)
    }
}

impl<Resolver, Policy: policy::Policy> SrvGate<Resolver, Policy> {
    /// Sets the resolver of the gate, discarding cached resolutions.
    pub fn resolver<R>(self, resolver: R) -> SrvGate<R, Policy> {
        SrvGate {
            resolver,
            cache: self.config.caches().then(Cache::default),
            config: self.config,
            policy: self.policy,
        }
    }

    /// Sets the target selection policy of the gate, discarding cached
    /// resolutions.
    ///
    /// The default, [`FirstRecord`](policy::FirstRecord), uses the first record
    /// the DNS server returned.
    pub fn policy<P: policy::Policy>(self, policy: P) -> SrvGate<Resolver, P> {
        SrvGate {
            policy,
            cache: self.config.caches().then(Cache::default),
            config: self.config,
            resolver: self.resolver,
        }
    }

    /// Gets the configuration of the gate.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }
}
