//! Identity display resolution and the caller's session credential.
//!
//! An identity is only a string handle; nothing is registered for it. What
//! an identity looks like on screen comes from its [`ProfileOverride`] when
//! one exists, and otherwise from whatever label/avatar the caller embedded
//! in the content being rendered. Because resolution happens on every read,
//! editing a profile repaints all of that identity's past posts, comments
//! and notifications without rewriting any of them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::{keys, read_record, write_record, KeyValueStore, StorageError};

/// Self-reported profile. At most one per identity; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverride {
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

/// Resolved presentation of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Display {
    pub label: String,
    pub avatar: Option<String>,
}

/// Label used when nothing better is known: the handle's local part.
pub fn default_label(identity: &str) -> &str {
    identity.split('@').next().unwrap_or(identity)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn KeyValueStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn profile(&self, identity: &str) -> Result<Option<ProfileOverride>, StorageError> {
        read_record(self.store.as_ref(), &keys::profile(identity))
    }

    /// Create or overwrite `identity`'s profile.
    ///
    /// A blank display name leaves the stored profile untouched and returns
    /// `None`. A blank avatar is stored as no avatar.
    pub fn set_profile(
        &self,
        identity: &str,
        display_name: &str,
        avatar_ref: Option<&str>,
    ) -> Result<Option<ProfileOverride>, StorageError> {
        let display_name = display_name.trim();
        if identity.is_empty() || display_name.is_empty() {
            return Ok(None);
        }
        let profile = ProfileOverride {
            display_name: display_name.to_string(),
            avatar_ref: non_blank(avatar_ref),
        };
        write_record(self.store.as_ref(), &keys::profile(identity), &profile)?;
        crate::tlog!(
            "profile: {} is now shown as {:?}",
            crate::logging::identity(identity),
            profile.display_name
        );
        Ok(Some(profile))
    }

    /// Resolve how `identity` should be shown.
    ///
    /// The override's fields win unconditionally, including an override
    /// without an avatar. Without an override the caller's fallbacks are
    /// returned as given.
    pub fn resolve_display(
        &self,
        identity: &str,
        fallback_label: &str,
        fallback_avatar: Option<&str>,
    ) -> Result<Display, StorageError> {
        if let Some(profile) = self.profile(identity)? {
            return Ok(Display {
                label: profile.display_name,
                avatar: profile.avatar_ref,
            });
        }
        Ok(Display {
            label: fallback_label.to_string(),
            avatar: non_blank(fallback_avatar),
        })
    }

    /// Resolve with the default label and no avatar as fallbacks.
    pub fn display_for(&self, identity: &str) -> Result<Display, StorageError> {
        self.resolve_display(identity, default_label(identity), None)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The credential the caller already holds. Issuance happens elsewhere;
/// the token is stored and returned verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    pub token: String,
}

impl Session {
    /// Persist `identity`/`token` as the active session. Returns `None` for
    /// an empty identity.
    pub fn login(
        store: &dyn KeyValueStore,
        identity: &str,
        token: &str,
    ) -> Result<Option<Session>, StorageError> {
        if identity.trim().is_empty() {
            return Ok(None);
        }
        let session = Session {
            identity: identity.to_string(),
            token: token.to_string(),
        };
        write_record(store, keys::SESSION, &session)?;
        crate::tlog!("session: logged in as {}", crate::logging::identity(identity));
        Ok(Some(session))
    }

    pub fn current(store: &dyn KeyValueStore) -> Result<Option<Session>, StorageError> {
        read_record(store, keys::SESSION)
    }

    /// Forget the active session. Returns whether one existed.
    pub fn logout(store: &dyn KeyValueStore) -> Result<bool, StorageError> {
        store.remove(keys::SESSION)
    }
}
