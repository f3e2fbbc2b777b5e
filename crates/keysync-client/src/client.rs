//! Client handle tying the flows to their collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use keysync_core::cache::{DeviceIdStore, DeviceWrapCache, MessageCache};
use keysync_core::kek_vault::KekVault;
use keysync_core::StoreError;

use crate::api::Directory;
use crate::error::ClientError;
use crate::session::SessionContext;

/// One logical device's view of the sync system: the directory service, the
/// local KEK vault and the offline caches. All flows hang off this handle.
pub struct SyncClient<D: Directory> {
    pub(crate) directory: D,
    pub(crate) kek_vault: Arc<dyn KekVault>,
    pub(crate) device_ids: DeviceIdStore,
    pub(crate) wrap_cache: DeviceWrapCache,
    pub(crate) message_cache: MessageCache,
    simulated_offline: AtomicBool,
}

impl<D: Directory> SyncClient<D> {
    /// Open the local stores under `store_root` and bind them to `directory`.
    pub fn new(
        directory: D,
        kek_vault: Arc<dyn KekVault>,
        store_root: &Path,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            directory,
            kek_vault,
            device_ids: DeviceIdStore::open(store_root),
            wrap_cache: DeviceWrapCache::open(store_root)?,
            message_cache: MessageCache::open(store_root)?,
            simulated_offline: AtomicBool::new(false),
        })
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Force the offline code paths regardless of actual reachability.
    pub fn set_simulated_offline(&self, offline: bool) {
        self.simulated_offline.store(offline, Ordering::Relaxed);
    }

    /// True when offline behavior was requested explicitly. Real outages are
    /// detected per call, via connectivity errors on the network step.
    pub fn is_offline(&self) -> bool {
        self.simulated_offline.load(Ordering::Relaxed)
    }

    /// End the server session and drop the in-memory UMK. The key is cleared
    /// even when the server round-trip fails.
    pub async fn logout(&self, ctx: &mut SessionContext) -> Result<(), ClientError> {
        let result = self.directory.logout().await;
        ctx.clear();
        info!(user_id = %ctx.user_id(), "session cleared");
        result.map_err(Into::into)
    }

    /// Remove this device's trust material for `user_id`: the local KEK, the
    /// cached device wraps, the message mirror and the persisted device id.
    /// The server-side device record is untouched; revoking it is the
    /// directory's job.
    pub fn forget_device(&self, user_id: &str) -> Result<(), ClientError> {
        self.kek_vault.delete(user_id)?;
        self.wrap_cache.remove_for_user(user_id)?;
        self.message_cache.remove_for_user(user_id)?;
        self.device_ids.clear()?;
        info!(%user_id, "local device trust material removed");
        Ok(())
    }
}
