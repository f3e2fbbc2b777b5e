//! Directory-service interface.
//!
//! The directory owns identity (users, sessions, device records, recovery
//! payloads) and encrypted message storage. It never sees plaintext keys or
//! messages: every binary field it stores is AEAD ciphertext, base64-encoded.
//! Session identity rides on an opaque server cookie held by the HTTP client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use keysync_core::RecoveryPayload;

use crate::error::DirectoryError;

/// Authentication identity, independent of key material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInitResponse {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub username: String,
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub wrapped_umk: Option<String>,
    #[serde(default)]
    pub device_verified: bool,
    pub requires_device_registration: bool,
    pub recovery_available: bool,
}

/// Server-owned device record: the authoritative source of wrap material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub user_id: String,
    pub wrapped_umk: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistrationResponse {
    pub device_id: String,
    pub created_at: DateTime<Utc>,
}

/// A message as the server stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub id: String,
    pub user_id: String,
    pub encrypted_content: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

/// The decrypted view handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugUser {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_wrapped_umk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_nonce: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugSession {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Server-state snapshot from the introspection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub users: Vec<DebugUser>,
    pub sessions: Vec<DebugSession>,
    pub devices: Vec<DeviceRecord>,
    pub messages: Vec<EncryptedMessage>,
}

#[derive(Debug, Serialize)]
struct RegisterInitRequest<'a> {
    username: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterFinalizeRequest<'a> {
    wrapped_umk: &'a str,
    recovery_payload: &'a RecoveryPayload,
}

#[derive(Debug, Serialize)]
struct RegisterDeviceRequest<'a> {
    wrapped_umk: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    content: &'a str,
    nonce: &'a str,
}

/// The directory service as the flows consume it. `HttpDirectory` is the
/// production implementation; tests drive the flows against an in-memory
/// fake implementing the same trait.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn register_init(&self, username: &str)
        -> Result<RegisterInitResponse, DirectoryError>;
    async fn register_finalize(
        &self,
        wrapped_umk: &str,
        recovery: &RecoveryPayload,
    ) -> Result<RegisterResponse, DirectoryError>;
    async fn register_device(
        &self,
        wrapped_umk: &str,
    ) -> Result<DeviceRegistrationResponse, DirectoryError>;
    async fn login(
        &self,
        username: &str,
        device_id: Option<&str>,
    ) -> Result<LoginResponse, DirectoryError>;
    async fn get_device(&self, device_id: &str) -> Result<DeviceRecord, DirectoryError>;
    async fn get_recovery(&self) -> Result<RecoveryPayload, DirectoryError>;
    async fn get_session(&self) -> Result<SessionInfo, DirectoryError>;
    async fn logout(&self) -> Result<(), DirectoryError>;
    async fn get_messages(&self) -> Result<Vec<EncryptedMessage>, DirectoryError>;
    async fn post_message(
        &self,
        encrypted_content: &str,
        nonce: &str,
    ) -> Result<EncryptedMessage, DirectoryError>;
    async fn debug_info(&self) -> Result<DebugInfo, DirectoryError>;
}

#[async_trait]
impl<T: Directory + ?Sized> Directory for Arc<T> {
    async fn register_init(
        &self,
        username: &str,
    ) -> Result<RegisterInitResponse, DirectoryError> {
        (**self).register_init(username).await
    }

    async fn register_finalize(
        &self,
        wrapped_umk: &str,
        recovery: &RecoveryPayload,
    ) -> Result<RegisterResponse, DirectoryError> {
        (**self).register_finalize(wrapped_umk, recovery).await
    }

    async fn register_device(
        &self,
        wrapped_umk: &str,
    ) -> Result<DeviceRegistrationResponse, DirectoryError> {
        (**self).register_device(wrapped_umk).await
    }

    async fn login(
        &self,
        username: &str,
        device_id: Option<&str>,
    ) -> Result<LoginResponse, DirectoryError> {
        (**self).login(username, device_id).await
    }

    async fn get_device(&self, device_id: &str) -> Result<DeviceRecord, DirectoryError> {
        (**self).get_device(device_id).await
    }

    async fn get_recovery(&self) -> Result<RecoveryPayload, DirectoryError> {
        (**self).get_recovery().await
    }

    async fn get_session(&self) -> Result<SessionInfo, DirectoryError> {
        (**self).get_session().await
    }

    async fn logout(&self) -> Result<(), DirectoryError> {
        (**self).logout().await
    }

    async fn get_messages(&self) -> Result<Vec<EncryptedMessage>, DirectoryError> {
        (**self).get_messages().await
    }

    async fn post_message(
        &self,
        encrypted_content: &str,
        nonce: &str,
    ) -> Result<EncryptedMessage, DirectoryError> {
        (**self).post_message(encrypted_content, nonce).await
    }

    async fn debug_info(&self) -> Result<DebugInfo, DirectoryError> {
        (**self).debug_info().await
    }
}

/// HTTP client for the directory service.
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
    pub fn new(base_url: &str) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .user_agent("keysync-client/0.1")
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map non-2xx responses to `DirectoryError::Status`, pulling the error
    /// message out of the JSON body when the server provides one.
    async fn check(response: Response) -> Result<Response, DirectoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("request failed")
                .to_string(),
            Err(_) => "request failed".to_string(),
        };
        Err(DirectoryError::Status {
            code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn register_init(
        &self,
        username: &str,
    ) -> Result<RegisterInitResponse, DirectoryError> {
        let response = self
            .client
            .post(self.url("/register/init"))
            .json(&RegisterInitRequest { username })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn register_finalize(
        &self,
        wrapped_umk: &str,
        recovery: &RecoveryPayload,
    ) -> Result<RegisterResponse, DirectoryError> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(&RegisterFinalizeRequest {
                wrapped_umk,
                recovery_payload: recovery,
            })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn register_device(
        &self,
        wrapped_umk: &str,
    ) -> Result<DeviceRegistrationResponse, DirectoryError> {
        let response = self
            .client
            .post(self.url("/devices"))
            .json(&RegisterDeviceRequest { wrapped_umk })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn login(
        &self,
        username: &str,
        device_id: Option<&str>,
    ) -> Result<LoginResponse, DirectoryError> {
        let response = self
            .client
            .post(self.url("/login"))
            .json(&LoginRequest {
                username,
                device_id,
            })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get_device(&self, device_id: &str) -> Result<DeviceRecord, DirectoryError> {
        let response = self
            .client
            .get(self.url(&format!("/devices/{device_id}")))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get_recovery(&self) -> Result<RecoveryPayload, DirectoryError> {
        let response = self.client.get(self.url("/recovery")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get_session(&self) -> Result<SessionInfo, DirectoryError> {
        let response = self.client.get(self.url("/session")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn logout(&self) -> Result<(), DirectoryError> {
        let response = self.client.post(self.url("/logout")).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_messages(&self) -> Result<Vec<EncryptedMessage>, DirectoryError> {
        let response = self.client.get(self.url("/messages")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_message(
        &self,
        encrypted_content: &str,
        nonce: &str,
    ) -> Result<EncryptedMessage, DirectoryError> {
        let response = self
            .client
            .post(self.url("/messages"))
            .json(&CreateMessageRequest {
                content: encrypted_content,
                nonce,
            })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn debug_info(&self) -> Result<DebugInfo, DirectoryError> {
        let response = self.client.get(self.url("/debug")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
