//! Explicitly owned session state.
//!
//! The unwrapped UMK lives here for the lifetime of a session instead of in
//! a process-wide singleton: every operation that needs the key takes the
//! context, and logout tears it down.

use keysync_core::UserMasterKey;

use crate::api::SessionInfo;

pub struct SessionContext {
    info: SessionInfo,
    umk: Option<UserMasterKey>,
}

impl SessionContext {
    /// A session with identity but no key yet (pre-restoration).
    pub fn new(info: SessionInfo) -> Self {
        Self { info, umk: None }
    }

    pub(crate) fn with_umk(info: SessionInfo, umk: UserMasterKey) -> Self {
        Self {
            info,
            umk: Some(umk),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn user_id(&self) -> &str {
        &self.info.user_id
    }

    pub fn username(&self) -> &str {
        &self.info.username
    }

    pub fn has_umk(&self) -> bool {
        self.umk.is_some()
    }

    pub(crate) fn umk(&self) -> Option<&UserMasterKey> {
        self.umk.as_ref()
    }

    pub(crate) fn store_umk(&mut self, umk: UserMasterKey) {
        self.umk = Some(umk);
    }

    /// Drop the key material. Called on logout; the identity stays readable
    /// so callers can still report who logged out.
    pub fn clear(&mut self) {
        self.umk = None;
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user_id", &self.info.user_id)
            .field("username", &self.info.username)
            .field("umk", &self.umk.is_some())
            .finish()
    }
}
