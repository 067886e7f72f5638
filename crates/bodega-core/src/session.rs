//! # Session
//!
//! The authenticated actor, passed explicitly to every privileged operation.
//!
//! ## Lifecycle
//! ```text
//! ┌────────────┐  authenticate()  ┌──────────────┐  set_actor()  ┌─────────────┐
//! │ credentials│ ───────────────► │   Session    │ ────────────► │  ActorSlot  │
//! └────────────┘                  │ worker, role │               │ (app root)  │
//!                                 │ permissions  │ ◄──────────── │ current()   │
//!                                 └──────────────┘  clear_actor  └─────────────┘
//! ```
//!
//! There is no process-global actor: the front-end owns an `ActorSlot`
//! and hands `&Session` to each call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permissions::{PermissionChecker, PermissionSet, PermissionToken};
use crate::DEFAULT_AUDIT_IP;

/// An authenticated worker with the permissions of its role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub worker_id: i64,
    /// `name surname`, recorded as the audit actor.
    pub display_name: String,
    pub username: String,
    pub role_id: i64,
    pub permissions: PermissionSet,
    /// Originating address hint for audit entries.
    pub ip: String,
    pub logged_in_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        worker_id: i64,
        display_name: impl Into<String>,
        username: impl Into<String>,
        role_id: i64,
        permissions: PermissionSet,
        logged_in_at: DateTime<Utc>,
    ) -> Self {
        Session {
            session_id: Uuid::new_v4(),
            worker_id,
            display_name: display_name.into(),
            username: username.into(),
            role_id,
            permissions,
            ip: DEFAULT_AUDIT_IP.to_string(),
            logged_in_at,
        }
    }

    /// Sets the originating IP. Blank input keeps loopback.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        let ip = ip.into();
        if !ip.trim().is_empty() {
            self.ip = ip.trim().to_string();
        }
        self
    }

    /// Replaces the permission set after a role change.
    pub fn replace_permissions(&mut self, role_id: i64, permissions: PermissionSet) {
        self.role_id = role_id;
        self.permissions = permissions;
    }
}

impl PermissionChecker for Session {
    fn has_permission(&self, token: PermissionToken) -> bool {
        self.permissions.contains(token)
    }
}

// =============================================================================
// Actor Slot
// =============================================================================

/// Holder of the current actor for a single interactive front-end.
///
/// Owned by the application root; one actor at a time.
#[derive(Debug, Default)]
pub struct ActorSlot {
    current: Option<Session>,
}

impl ActorSlot {
    pub fn new() -> Self {
        ActorSlot { current: None }
    }

    pub fn current_actor(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn current_actor_mut(&mut self) -> Option<&mut Session> {
        self.current.as_mut()
    }

    /// Installs a session, returning the one it replaced.
    pub fn set_actor(&mut self, session: Session) -> Option<Session> {
        self.current.replace(session)
    }

    pub fn clear_actor(&mut self) -> Option<Session> {
        self.current.take()
    }

    /// `false` when nobody is logged in.
    pub fn has_permission(&self, token: PermissionToken) -> bool {
        self.current
            .as_ref()
            .map(|s| s.has_permission(token))
            .unwrap_or(false)
    }
}
