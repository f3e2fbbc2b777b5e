//! Shared online/offline source-resolution strategy.
//!
//! Session restoration and message fetch share the same shape: prefer the
//! network when reachable, optionally substitute cached data when it is not.
//! Only connectivity errors are ever substituted, never crypto or identity
//! failures.

use std::future::Future;

use crate::error::ClientError;

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Network,
    Cache,
}

/// Resolve a value from the network or the local cache.
///
/// `prefer_cache` short-circuits to the cache (explicit offline);
/// `cache_miss` supplies the error for an empty cache on that path. When
/// fetching, a connectivity failure falls back to the cache if
/// `allow_fallback` is set and the cache has a value; any other error, and a
/// connectivity error with an empty cache, propagates unchanged.
pub(crate) async fn resolve<T, Fut>(
    prefer_cache: bool,
    allow_fallback: bool,
    fetch: impl FnOnce() -> Fut,
    lookup: impl Fn() -> Result<Option<T>, ClientError>,
    cache_miss: impl FnOnce() -> ClientError,
) -> Result<(T, Source), ClientError>
where
    Fut: Future<Output = Result<T, ClientError>>,
{
    if prefer_cache {
        return match lookup()? {
            Some(value) => Ok((value, Source::Cache)),
            None => Err(cache_miss()),
        };
    }
    match fetch().await {
        Ok(value) => Ok((value, Source::Network)),
        Err(err) if allow_fallback && err.is_connectivity() => match lookup()? {
            Some(value) => Ok((value, Source::Cache)),
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}
