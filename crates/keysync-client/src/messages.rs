//! Encrypted message send/fetch and the offline mirror.
//!
//! Content is sealed under the session UMK with a fresh nonce per message,
//! AAD-bound to the owning user id; the server only ever sees base64
//! ciphertext. Every successful online fetch reconciles the local mirror to
//! exactly the server's set, so deletions propagate.

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use tracing::{debug, warn};

use keysync_core::cache::CachedMessageRecord;
use keysync_core::{CryptoError, UserMasterKey};

use crate::api::{Directory, EncryptedMessage, Message};
use crate::client::SyncClient;
use crate::error::ClientError;
use crate::resolve::{resolve, Source};
use crate::session::SessionContext;

/// A fetched message list, tagged with where it came from.
#[derive(Debug)]
pub struct MessageFetchResult {
    pub messages: Vec<Message>,
    pub source: Source,
}

fn open_content(
    umk: &UserMasterKey,
    user_id: &str,
    message: &EncryptedMessage,
) -> Result<String, ClientError> {
    let ciphertext = general_purpose::STANDARD
        .decode(&message.encrypted_content)
        .map_err(|_| CryptoError::Unwrap)?;
    let nonce = general_purpose::STANDARD
        .decode(&message.nonce)
        .map_err(|_| CryptoError::Unwrap)?;
    let plaintext = umk.open_detached(&ciphertext, &nonce, user_id.as_bytes())?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Unwrap.into())
}

fn to_message(record: CachedMessageRecord) -> Message {
    Message {
        id: record.id,
        user_id: record.user_id,
        content: record.content,
        created_at: record.created_at,
    }
}

impl<D: Directory> SyncClient<D> {
    /// Encrypt `content` under the session key and store it on the server.
    pub async fn send_message(
        &self,
        ctx: &SessionContext,
        content: &str,
    ) -> Result<Message, ClientError> {
        let umk = ctx.umk().ok_or(ClientError::MissingKey)?;
        let (ciphertext, nonce) = umk.seal_detached(content.as_bytes(), ctx.user_id().as_bytes())?;
        let stored = self
            .directory
            .post_message(
                &general_purpose::STANDARD.encode(ciphertext),
                &general_purpose::STANDARD.encode(nonce),
            )
            .await?;
        debug!(message_id = %stored.id, "message stored on server");
        Ok(Message {
            id: stored.id,
            user_id: stored.user_id,
            content: content.to_string(),
            created_at: stored.created_at,
        })
    }

    /// Fetch and decrypt the session's messages, oldest first.
    ///
    /// Online, the local mirror is reconciled to the server's set; a record
    /// that fails to decrypt is skipped with a warning rather than failing
    /// the batch, and drops out of the mirror. Explicit offline serves the
    /// mirror as-is, even when empty; a connectivity failure substitutes it
    /// only when it has content. Without a session key the mirror is the
    /// only option, and an empty mirror reports the missing key.
    pub async fn fetch_messages(
        &self,
        ctx: &SessionContext,
    ) -> Result<MessageFetchResult, ClientError> {
        let user_id = ctx.user_id();
        if self.is_offline() {
            return Ok(MessageFetchResult {
                messages: self.cached_messages(user_id),
                source: Source::Cache,
            });
        }
        let umk = match ctx.umk() {
            Some(umk) => umk,
            None => {
                let messages = self.cached_messages(user_id);
                if messages.is_empty() {
                    return Err(ClientError::MissingKey);
                }
                return Ok(MessageFetchResult {
                    messages,
                    source: Source::Cache,
                });
            }
        };

        let (messages, source) = resolve(
            false,
            true,
            || async {
                let encrypted = self.directory.get_messages().await?;
                Ok(self.decrypt_and_reconcile(user_id, umk, encrypted)?)
            },
            || {
                let messages = self.cached_messages(user_id);
                Ok((!messages.is_empty()).then_some(messages))
            },
            || ClientError::MissingKey,
        )
        .await?;

        Ok(MessageFetchResult { messages, source })
    }

    fn cached_messages(&self, user_id: &str) -> Vec<Message> {
        self.message_cache
            .records_for_user(user_id)
            .into_iter()
            .map(to_message)
            .collect()
    }

    fn decrypt_and_reconcile(
        &self,
        user_id: &str,
        umk: &UserMasterKey,
        encrypted: Vec<EncryptedMessage>,
    ) -> Result<Vec<Message>, ClientError> {
        let now = Utc::now();
        let mut records = Vec::with_capacity(encrypted.len());
        for message in encrypted {
            if message.user_id != user_id {
                warn!(message_id = %message.id, "skipping message for a different user");
                continue;
            }
            match open_content(umk, user_id, &message) {
                Ok(content) => records.push(CachedMessageRecord {
                    id: message.id,
                    user_id: message.user_id,
                    encrypted_content: message.encrypted_content,
                    nonce: message.nonce,
                    content,
                    created_at: message.created_at,
                    cached_at: now,
                }),
                Err(err) => {
                    warn!(message_id = %message.id, %err, "skipping undecryptable message");
                }
            }
        }
        self.message_cache.replace_for_user(user_id, records)?;
        Ok(self.cached_messages(user_id))
    }
}
