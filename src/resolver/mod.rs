//! SRV resolvers.

use crate::record::SrvAnswer;
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(feature = "hickory")]
pub mod hickory;

/// Represents the ability to act as a SRV resolver.
///
/// Implementations perform exactly one query per call and return the answer
/// untouched: records stay in response order and nothing is retried.
#[async_trait]
pub trait SrvResolver: Send + Sync {
    /// Errors encountered during SRV resolution.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Queries the SRV records of `name` along with the additional-section
    /// A/AAAA records of the same response.
    async fn query_srv(&self, name: &str) -> Result<SrvAnswer, Self::Error>;
}

#[async_trait]
impl<R> SrvResolver for Arc<R>
where
    R: SrvResolver + ?Sized,
{
    type Error = R::Error;

    async fn query_srv(&self, name: &str) -> Result<SrvAnswer, Self::Error> {
        (**self).query_srv(name).await
    }
}
