//! Session restoration.
//!
//! Re-establishes the in-memory UMK for an authenticated session, preferring
//! the server's device record and falling back to the locally cached wrap
//! when the server cannot be reached. Only connectivity failures trigger the
//! fallback; identity mismatches and unwrap failures always surface.

use chrono::Utc;
use tracing::{debug, info};

use keysync_core::cache::CachedDeviceWrap;
use keysync_core::keys::unwrap_umk;

use crate::api::Directory;
use crate::client::SyncClient;
use crate::error::ClientError;
use crate::resolve::{resolve, Source};
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy)]
pub struct RestoreOptions {
    /// Substitute the cached wrap when the server is unreachable.
    pub offline_fallback: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            offline_fallback: true,
        }
    }
}

/// How a restoration concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The session already held its key; nothing was done.
    AlreadyPresent,
    /// The key was unwrapped from the given source.
    Restored(Source),
}

impl<D: Directory> SyncClient<D> {
    /// Restore the UMK into `ctx`.
    ///
    /// Requires a persisted device id and the local KEK; without either the
    /// caller must go back through login. The wrap comes from the server's
    /// device record when reachable (refreshing the cache on the way), from
    /// the cache otherwise.
    pub async fn restore_session(
        &self,
        ctx: &mut SessionContext,
        options: RestoreOptions,
    ) -> Result<RestoreOutcome, ClientError> {
        if ctx.has_umk() {
            return Ok(RestoreOutcome::AlreadyPresent);
        }
        let user_id = ctx.user_id().to_string();
        let device_id = self
            .device_ids
            .get()?
            .ok_or(ClientError::DeviceIdMissing)?;
        let kek = self
            .kek_vault
            .load(&user_id)?
            .ok_or(ClientError::LocalKeyMissing)?;

        let (wrapped, source) = resolve(
            self.is_offline(),
            options.offline_fallback,
            || async {
                let device = self.directory.get_device(&device_id).await?;
                if device.user_id != user_id {
                    return Err(ClientError::DeviceUserMismatch);
                }
                self.wrap_cache.insert(CachedDeviceWrap {
                    device_id: device_id.clone(),
                    user_id: user_id.clone(),
                    wrapped_umk: device.wrapped_umk.clone(),
                    cached_at: Utc::now(),
                })?;
                Ok(device.wrapped_umk)
            },
            || match self.wrap_cache.get(&device_id) {
                Some(cached) if cached.user_id == user_id => Ok(Some(cached.wrapped_umk)),
                Some(_) => Err(ClientError::CacheUserMismatch),
                None => Ok(None),
            },
            || ClientError::NoCachedWrap,
        )
        .await?;

        let umk = unwrap_umk(&wrapped, &kek, &user_id)?;
        ctx.store_umk(umk);
        info!(%user_id, %device_id, ?source, "session key restored");
        Ok(RestoreOutcome::Restored(source))
    }

    /// Resume the server session on this device: fetch the authenticated
    /// identity from the session cookie, then restore the key for it.
    pub async fn resume(&self, options: RestoreOptions) -> Result<SessionContext, ClientError> {
        let info = self.directory.get_session().await?;
        debug!(user_id = %info.user_id, "server session resumed");
        let mut ctx = SessionContext::new(info);
        self.restore_session(&mut ctx, options).await?;
        Ok(ctx)
    }
}
