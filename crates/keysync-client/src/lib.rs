//! Client-side key custody and encrypted message sync.
//!
//! Builds on `keysync-core` (key hierarchy, KEK vault, local caches) and a
//! directory service to provide the device-facing flows: registration, the
//! device trust decision at login, passphrase recovery onto new devices,
//! session restoration with offline fallback, and message send/fetch with a
//! reconciled local mirror.

pub mod api;
mod client;
mod error;
mod login;
mod messages;
mod resolve;
mod restore;
mod session;

pub use api::{Directory, HttpDirectory, Message, SessionInfo};
pub use client::SyncClient;
pub use error::{ClientError, DirectoryError};
pub use login::{LoginOutcome, PendingDeviceRecovery, MIN_PASSPHRASE_LEN};
pub use messages::MessageFetchResult;
pub use resolve::Source;
pub use restore::{RestoreOptions, RestoreOutcome};
pub use session::SessionContext;
