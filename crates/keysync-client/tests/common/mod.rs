#![allow(dead_code)]

//! In-memory directory-service fake shared by the integration tests. Each
//! `TestDevice` gets its own store root and KEK vault, so several of them
//! against one `FakeDirectory` model several physical devices of one account.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use keysync_client::api::{
    DebugInfo, DebugUser, DeviceRecord, DeviceRegistrationResponse, EncryptedMessage,
    LoginResponse, RegisterInitResponse, RegisterResponse,
};
use keysync_client::{Directory, DirectoryError, SessionInfo, SyncClient};
use keysync_core::kek_vault::MemoryKekVault;
use keysync_core::RecoveryPayload;

struct UserRecord {
    id: String,
    username: String,
    recovery: Option<RecoveryPayload>,
}

#[derive(Default)]
struct State {
    users: Vec<UserRecord>,
    devices: Vec<DeviceRecord>,
    messages: Vec<EncryptedMessage>,
    session: Option<SessionInfo>,
    pending_registration: Option<(String, String)>,
    unreachable: bool,
}

impl State {
    fn session(&self) -> Result<SessionInfo, DirectoryError> {
        self.session.clone().ok_or(DirectoryError::Status {
            code: 401,
            message: "not authenticated".to_string(),
        })
    }
}

fn not_found(what: &str) -> DirectoryError {
    DirectoryError::Status {
        code: 404,
        message: format!("{what} not found"),
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<State>,
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Simulate an account that never set a recovery passphrase.
    pub fn clear_recovery(&self, username: &str) {
        let mut state = self.state.lock();
        if let Some(user) = state.users.iter_mut().find(|u| u.username == username) {
            user.recovery = None;
        }
    }

    /// Reassign a device record to another user, corrupting the trust link.
    pub fn reassign_device(&self, device_id: &str, user_id: &str) {
        let mut state = self.state.lock();
        if let Some(device) = state.devices.iter_mut().find(|d| d.id == device_id) {
            device.user_id = user_id.to_string();
        }
    }

    pub fn delete_device(&self, device_id: &str) {
        self.state.lock().devices.retain(|d| d.id != device_id);
    }

    pub fn tamper_message(&self, message_id: &str) {
        let mut state = self.state.lock();
        if let Some(message) = state.messages.iter_mut().find(|m| m.id == message_id) {
            message.encrypted_content = "dGFtcGVyZWQgY2lwaGVydGV4dA==".to_string();
        }
    }

    pub fn delete_message(&self, message_id: &str) {
        self.state.lock().messages.retain(|m| m.id != message_id);
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .devices
            .iter()
            .map(|d| d.id.clone())
            .collect()
    }

    fn check_reachable(&self) -> Result<(), DirectoryError> {
        if self.state.lock().unreachable {
            Err(DirectoryError::Unreachable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn register_init(
        &self,
        username: &str,
    ) -> Result<RegisterInitResponse, DirectoryError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        if state.users.iter().any(|u| u.username == username) {
            return Err(DirectoryError::Status {
                code: 409,
                message: "username taken".to_string(),
            });
        }
        let user_id = Uuid::new_v4().to_string();
        state.pending_registration = Some((user_id.clone(), username.to_string()));
        Ok(RegisterInitResponse {
            user_id,
            username: username.to_string(),
        })
    }

    async fn register_finalize(
        &self,
        wrapped_umk: &str,
        recovery: &RecoveryPayload,
    ) -> Result<RegisterResponse, DirectoryError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        let (user_id, username) = state
            .pending_registration
            .take()
            .ok_or_else(|| not_found("pending registration"))?;
        state.users.push(UserRecord {
            id: user_id.clone(),
            username: username.clone(),
            recovery: Some(recovery.clone()),
        });
        let device_id = Uuid::new_v4().to_string();
        state.devices.push(DeviceRecord {
            id: device_id.clone(),
            user_id: user_id.clone(),
            wrapped_umk: wrapped_umk.to_string(),
            created_at: Utc::now(),
        });
        state.session = Some(SessionInfo {
            user_id: user_id.clone(),
            username: username.clone(),
        });
        Ok(RegisterResponse {
            user_id,
            username,
            device_id,
        })
    }

    async fn register_device(
        &self,
        wrapped_umk: &str,
    ) -> Result<DeviceRegistrationResponse, DirectoryError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        let session = state.session()?;
        let created_at = Utc::now();
        let device_id = Uuid::new_v4().to_string();
        state.devices.push(DeviceRecord {
            id: device_id.clone(),
            user_id: session.user_id,
            wrapped_umk: wrapped_umk.to_string(),
            created_at,
        });
        Ok(DeviceRegistrationResponse {
            device_id,
            created_at,
        })
    }

    async fn login(
        &self,
        username: &str,
        device_id: Option<&str>,
    ) -> Result<LoginResponse, DirectoryError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        let (user_id, recovery_available) = state
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| (u.id.clone(), u.recovery.is_some()))
            .ok_or_else(|| not_found("user"))?;
        state.session = Some(SessionInfo {
            user_id: user_id.clone(),
            username: username.to_string(),
        });

        let known_device = device_id.and_then(|id| {
            state
                .devices
                .iter()
                .find(|d| d.id == id && d.user_id == user_id)
        });
        match known_device {
            Some(device) => Ok(LoginResponse {
                user_id,
                username: username.to_string(),
                device_id: Some(device.id.clone()),
                wrapped_umk: Some(device.wrapped_umk.clone()),
                device_verified: true,
                requires_device_registration: false,
                recovery_available,
            }),
            None => Ok(LoginResponse {
                user_id,
                username: username.to_string(),
                device_id: None,
                wrapped_umk: None,
                device_verified: false,
                requires_device_registration: true,
                recovery_available,
            }),
        }
    }

    async fn get_device(&self, device_id: &str) -> Result<DeviceRecord, DirectoryError> {
        self.check_reachable()?;
        let state = self.state.lock();
        state
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
            .ok_or_else(|| not_found("device"))
    }

    async fn get_recovery(&self) -> Result<RecoveryPayload, DirectoryError> {
        self.check_reachable()?;
        let state = self.state.lock();
        let session = state.session()?;
        state
            .users
            .iter()
            .find(|u| u.id == session.user_id)
            .and_then(|u| u.recovery.clone())
            .ok_or_else(|| not_found("recovery payload"))
    }

    async fn get_session(&self) -> Result<SessionInfo, DirectoryError> {
        self.check_reachable()?;
        self.state.lock().session()
    }

    async fn logout(&self) -> Result<(), DirectoryError> {
        self.check_reachable()?;
        self.state.lock().session = None;
        Ok(())
    }

    async fn get_messages(&self) -> Result<Vec<EncryptedMessage>, DirectoryError> {
        self.check_reachable()?;
        let state = self.state.lock();
        let session = state.session()?;
        let mut messages: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.user_id == session.user_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn post_message(
        &self,
        encrypted_content: &str,
        nonce: &str,
    ) -> Result<EncryptedMessage, DirectoryError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        let session = state.session()?;
        let message = EncryptedMessage {
            id: Uuid::new_v4().to_string(),
            user_id: session.user_id,
            encrypted_content: encrypted_content.to_string(),
            nonce: nonce.to_string(),
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn debug_info(&self) -> Result<DebugInfo, DirectoryError> {
        self.check_reachable()?;
        let state = self.state.lock();
        Ok(DebugInfo {
            users: state
                .users
                .iter()
                .map(|u| DebugUser {
                    id: u.id.clone(),
                    username: u.username.clone(),
                    recovery_wrapped_umk: u.recovery.as_ref().map(|r| r.wrapped_umk.clone()),
                    recovery_salt: u.recovery.as_ref().map(|r| r.salt.clone()),
                    recovery_nonce: u.recovery.as_ref().map(|r| r.nonce.clone()),
                })
                .collect(),
            sessions: Vec::new(),
            devices: state.devices.clone(),
            messages: state.messages.clone(),
        })
    }
}

/// One simulated physical device: its own store root and KEK vault bound to
/// the shared directory.
pub struct TestDevice {
    pub client: SyncClient<Arc<FakeDirectory>>,
    pub vault: Arc<MemoryKekVault>,
    pub store: TempDir,
}

pub fn device(directory: &Arc<FakeDirectory>) -> TestDevice {
    let store = tempfile::tempdir().unwrap();
    let vault = Arc::new(MemoryKekVault::new());
    let client = SyncClient::new(directory.clone(), vault.clone(), store.path()).unwrap();
    TestDevice {
        client,
        vault,
        store,
    }
}

/// Rebuild the client over the same store root and vault, as a process
/// restart would.
pub fn reopen(directory: &Arc<FakeDirectory>, device: TestDevice) -> TestDevice {
    let client =
        SyncClient::new(directory.clone(), device.vault.clone(), device.store.path()).unwrap();
    TestDevice {
        client,
        vault: device.vault,
        store: device.store,
    }
}
