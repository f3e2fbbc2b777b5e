//! Device trust state machine.
//!
//! Decides, per login attempt, whether this device already holds trust
//! material for the account, needs passphrase-based recovery, or has hit a
//! dead end. A new device is never trusted merely for presenting a username;
//! it must prove ownership through the recovery passphrase before the
//! directory will hold a wrap for it.

use chrono::Utc;
use tracing::{debug, info};

use keysync_core::cache::CachedDeviceWrap;
use keysync_core::keys::{unwrap_umk, wrap_umk};
use keysync_core::{LocalKek, RecoveryPayload, UserMasterKey};

use crate::api::{Directory, SessionInfo};
use crate::client::SyncClient;
use crate::error::ClientError;
use crate::session::SessionContext;

pub const MIN_PASSPHRASE_LEN: usize = 8;

/// Result of a login attempt.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(SessionContext),
    /// The device is unknown or lost its local key; the account's recovery
    /// payload has been fetched and awaits the passphrase.
    RecoveryRequired(PendingDeviceRecovery),
}

/// Login state carried between the recovery prompt and its completion.
/// Holds only ciphertext; safe to keep around across passphrase retries.
#[derive(Debug)]
pub struct PendingDeviceRecovery {
    info: SessionInfo,
    recovery: RecoveryPayload,
}

impl PendingDeviceRecovery {
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }
}

fn validate_passphrase(passphrase: &str) -> Result<(), ClientError> {
    if passphrase.trim().chars().count() < MIN_PASSPHRASE_LEN {
        return Err(ClientError::PassphraseTooShort);
    }
    Ok(())
}

impl<D: Directory> SyncClient<D> {
    /// Register a new account on this device.
    ///
    /// Generates the UMK and this device's local KEK, wraps the UMK under
    /// the KEK (AAD-bound to the new user id), builds the passphrase
    /// recovery envelope and finalizes registration with both. The device id
    /// is persisted only after the server has accepted the registration.
    pub async fn register(
        &self,
        username: &str,
        passphrase: &str,
        confirm: &str,
    ) -> Result<SessionContext, ClientError> {
        validate_passphrase(passphrase)?;
        if passphrase != confirm {
            return Err(ClientError::PassphraseMismatch);
        }

        let init = self.directory.register_init(username).await?;
        debug!(user_id = %init.user_id, "registration initialized");

        let kek = LocalKek::generate()?;
        self.kek_vault.store(&init.user_id, &kek)?;

        let umk = UserMasterKey::generate();
        let wrapped = wrap_umk(&umk, &kek, &init.user_id)?;
        let recovery = RecoveryPayload::create(passphrase, &umk)?;

        let completed = self.directory.register_finalize(&wrapped, &recovery).await?;
        self.device_ids.save(&completed.device_id)?;
        info!(
            user_id = %completed.user_id,
            device_id = %completed.device_id,
            "account registered on this device"
        );

        Ok(SessionContext::with_umk(
            SessionInfo {
                user_id: completed.user_id,
                username: completed.username,
            },
            umk,
        ))
    }

    /// Attempt to log in on this device.
    pub async fn login(&self, username: &str) -> Result<LoginOutcome, ClientError> {
        let stored_device_id = self.device_ids.get()?;
        let response = self
            .directory
            .login(username, stored_device_id.as_deref())
            .await?;
        let info = SessionInfo {
            user_id: response.user_id,
            username: response.username,
        };

        // Server does not know (or no longer trusts) this device.
        if response.requires_device_registration {
            if stored_device_id.is_some() {
                self.device_ids.clear()?;
            }
            if !response.recovery_available {
                return Err(ClientError::NoRecoveryAvailable);
            }
            return self.begin_device_recovery(info).await;
        }

        let device_id = match stored_device_id.or(response.device_id) {
            Some(id) => id,
            None if response.recovery_available => {
                return self.begin_device_recovery(info).await;
            }
            None => return Err(ClientError::DeviceIdMissing),
        };

        // Device id is known but local storage may have been cleared.
        let kek = match self.kek_vault.load(&info.user_id)? {
            Some(kek) => kek,
            None if response.recovery_available => {
                self.device_ids.clear()?;
                return self.begin_device_recovery(info).await;
            }
            None => return Err(ClientError::LocalKeyMissing),
        };

        let device = self.directory.get_device(&device_id).await?;
        let umk = unwrap_umk(&device.wrapped_umk, &kek, &info.user_id)?;
        self.wrap_cache.insert(CachedDeviceWrap {
            device_id: device_id.clone(),
            user_id: info.user_id.clone(),
            wrapped_umk: device.wrapped_umk,
            cached_at: Utc::now(),
        })?;
        self.device_ids.save(&device_id)?;
        info!(user_id = %info.user_id, %device_id, "login unwrapped the master key");

        Ok(LoginOutcome::Authenticated(SessionContext::with_umk(
            info, umk,
        )))
    }

    /// Complete device registration by proving ownership with the recovery
    /// passphrase. A wrong passphrase leaves `pending` reusable for a retry.
    pub async fn recover_device(
        &self,
        pending: &PendingDeviceRecovery,
        passphrase: &str,
    ) -> Result<SessionContext, ClientError> {
        validate_passphrase(passphrase)?;
        let umk = pending.recovery.recover(passphrase)?;
        let user_id = &pending.info.user_id;
        debug!(%user_id, "master key recovered from passphrase");

        let kek = LocalKek::generate()?;
        self.kek_vault.store(user_id, &kek)?;
        let wrapped = wrap_umk(&umk, &kek, user_id)?;

        let registered = self.directory.register_device(&wrapped).await?;
        self.wrap_cache.insert(CachedDeviceWrap {
            device_id: registered.device_id.clone(),
            user_id: user_id.clone(),
            wrapped_umk: wrapped,
            cached_at: Utc::now(),
        })?;
        self.device_ids.save(&registered.device_id)?;
        info!(%user_id, device_id = %registered.device_id, "new device registered");

        Ok(SessionContext::with_umk(pending.info.clone(), umk))
    }

    async fn begin_device_recovery(
        &self,
        info: SessionInfo,
    ) -> Result<LoginOutcome, ClientError> {
        let recovery = self.directory.get_recovery().await?;
        debug!(user_id = %info.user_id, "recovery payload fetched for device registration");
        Ok(LoginOutcome::RecoveryRequired(PendingDeviceRecovery {
            info,
            recovery,
        }))
    }
}
