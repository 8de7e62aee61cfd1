//! Authenticated session: the current user and their tokens.
//!
//! The session is mirrored into [`LocalStore`] under the `user`, `token` and
//! `refresh_token` keys so a restarted client stays logged in. Tokens are
//! kept as [`SecretString`] in memory and never appear in `Debug` output.

use std::sync::{Arc, RwLock};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::api::types::User;
use crate::storage::{LocalStore, StorageError, keys};

/// Access and refresh tokens.
#[derive(Clone)]
pub struct AuthTokens {
    pub access: SecretString,
    pub refresh: Option<SecretString>,
}

impl AuthTokens {
    /// Wrap raw token strings.
    #[must_use]
    pub fn new(access: String, refresh: Option<String>) -> Self {
        Self {
            access: SecretString::from(access),
            refresh: refresh.map(SecretString::from),
        }
    }
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access", &"[REDACTED]")
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone)]
struct SessionData {
    user: User,
    tokens: AuthTokens,
}

/// Shared handle to the current session.
///
/// Cheaply cloneable; clones observe the same login state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: LocalStore,
    data: RwLock<Option<SessionData>>,
}

impl Session {
    /// Restore the session persisted in `store`, if any.
    ///
    /// A partially persisted session (user without token or the reverse) is
    /// treated as logged out. A saved session that no longer decodes is
    /// removed from storage and the client starts logged out.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage lock is poisoned.
    pub fn restore(store: LocalStore) -> Result<Self, StorageError> {
        let data = match read_saved(&store) {
            Ok(data) => data,
            Err(StorageError::InvalidValue { key, source }) => {
                warn!(key = %key, error = %source, "Discarding unreadable saved session");
                if let Err(e) = store.remove_all(&keys::SESSION) {
                    warn!(error = %e, "Failed to remove unreadable session");
                }
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(data) = &data {
            debug!(user_id = %data.user.id, "Restored session");
        }

        Ok(Self {
            inner: Arc::new(SessionInner {
                store,
                data: RwLock::new(data),
            }),
        })
    }

    /// Record a fresh login.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted.
    pub fn establish(&self, user: User, tokens: AuthTokens) -> Result<(), StorageError> {
        let store = &self.inner.store;
        store.set(keys::USER, &user)?;
        store.set(keys::TOKEN, tokens.access.expose_secret())?;
        match &tokens.refresh {
            Some(refresh) => store.set(keys::REFRESH_TOKEN, refresh.expose_secret())?,
            None => store.remove(keys::REFRESH_TOKEN)?,
        }

        *self.write()? = Some(SessionData { user, tokens });
        Ok(())
    }

    /// Replace the tokens after a refresh. A `None` refresh token keeps the
    /// existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no session or it cannot be persisted.
    pub fn update_tokens(
        &self,
        access: SecretString,
        refresh: Option<SecretString>,
    ) -> Result<(), StorageError> {
        let mut guard = self.write()?;
        let Some(data) = guard.as_mut() else {
            return Ok(());
        };

        self.inner.store.set(keys::TOKEN, access.expose_secret())?;
        if let Some(refresh) = &refresh {
            self.inner.store.set(keys::REFRESH_TOKEN, refresh.expose_secret())?;
        }

        data.tokens.access = access;
        if refresh.is_some() {
            data.tokens.refresh = refresh;
        }
        Ok(())
    }

    /// Replace the cached profile (after `GET /auth/me` or a profile update).
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be persisted.
    pub fn update_user(&self, user: User) -> Result<(), StorageError> {
        let mut guard = self.write()?;
        if let Some(data) = guard.as_mut() {
            self.inner.store.set(keys::USER, &user)?;
            data.user = user;
        }
        Ok(())
    }

    /// Forget the user and tokens. The cart is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be updated.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.inner.store.remove_all(&keys::SESSION)?;
        *self.write()? = None;
        Ok(())
    }

    /// Whether a user is logged in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.data.read().is_ok_and(|data| data.is_some())
    }

    /// The logged-in user.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner
            .data
            .read()
            .ok()
            .and_then(|data| data.as_ref().map(|d| d.user.clone()))
    }

    /// Current access token.
    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.inner
            .data
            .read()
            .ok()
            .and_then(|data| data.as_ref().map(|d| d.tokens.access.clone()))
    }

    /// Current refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.inner
            .data
            .read()
            .ok()
            .and_then(|data| data.as_ref().and_then(|d| d.tokens.refresh.clone()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Option<SessionData>>, StorageError> {
        self.inner.data.write().map_err(|_| StorageError::Poisoned)
    }
}

fn read_saved(store: &LocalStore) -> Result<Option<SessionData>, StorageError> {
    let user = store.get::<User>(keys::USER)?;
    let access = store.get::<String>(keys::TOKEN)?;
    let refresh = store.get::<String>(keys::REFRESH_TOKEN)?;

    Ok(match (user, access) {
        (Some(user), Some(access)) => Some(SessionData {
            user,
            tokens: AuthTokens::new(access, refresh),
        }),
        _ => None,
    })
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
