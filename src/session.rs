//! Authentication state for the running client.
//!
//! [`SessionStore`] is the only writer: it runs the bootstrap check and the
//! sign-in/sign-out transitions. Everything else holds a [`SessionView`] and
//! reads snapshots, which may change on the next check.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::api::Api;
use crate::error::AppResult;
use crate::local_store::{has_prior_session, LocalStore, COOKIE_FALLBACK_KEY};
use crate::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthStatus {
    /// Not checked yet, or a check is in flight.
    Unknown,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub user: User,
    pub status: AuthStatus,
    pub is_loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: User::default(),
            status: AuthStatus::Unknown,
            is_loading: false,
        }
    }
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }
}

/// Where the caller should route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    /// Session check still running: show a neutral state.
    Loading,
    SignIn,
    Home,
}

pub struct SessionStore {
    api: Api,
    local: Arc<dyn LocalStore>,
    state: watch::Sender<SessionState>,
}

impl SessionStore {
    pub fn new(api: Api, local: Arc<dyn LocalStore>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { api, local, state }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state.subscribe(),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Landing to show before the check resolves: sign-in right away when no
    /// earlier session left a marker, otherwise a loading state.
    pub fn initial_landing(&self) -> Landing {
        if has_prior_session(self.local.as_ref()) {
            Landing::Loading
        } else {
            Landing::SignIn
        }
    }

    /// Run once per application load. Callers show [`Self::initial_landing`]
    /// while this is pending.
    pub async fn bootstrap(&self) -> Landing {
        if self.check_auth_user().await {
            Landing::Home
        } else {
            Landing::SignIn
        }
    }

    /// Ask the remote who is signed in. Always resolves to a definite answer
    /// and always leaves `is_loading` cleared.
    pub async fn check_auth_user(&self) -> bool {
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.status = AuthStatus::Unknown;
        });

        match self.api.get_current_user().await {
            Ok(user) => {
                tracing::info!("Authenticated as {} ({})", user.username, user.id);
                self.state.send_modify(|state| {
                    state.user = user;
                    state.status = AuthStatus::Authenticated;
                    state.is_loading = false;
                });
                true
            }
            Err(e) => {
                tracing::info!("Not authenticated: {}", e);
                self.state.send_modify(|state| {
                    state.user = User::default();
                    state.status = AuthStatus::Unauthenticated;
                    state.is_loading = false;
                });
                false
            }
        }
    }

    pub fn set_user(&self, user: User) {
        self.state.send_modify(|state| state.user = user);
    }

    pub fn set_is_authenticated(&self, authenticated: bool) {
        self.state.send_modify(|state| {
            state.status = if authenticated {
                AuthStatus::Authenticated
            } else {
                AuthStatus::Unauthenticated
            };
        });
    }

    /// Sign in and re-run the check. Returns whether a matching user was found.
    /// A failed sign-in leaves no user behind, since any earlier session was
    /// already ended.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<bool> {
        if let Err(e) = self.api.sign_in_account(email, password).await {
            self.state.send_modify(|state| {
                state.user = User::default();
                state.status = AuthStatus::Unauthenticated;
                state.is_loading = false;
            });
            return Err(e);
        }
        Ok(self.check_auth_user().await)
    }

    /// Sign out. The local session ends even if the remote call fails.
    pub async fn sign_out(&self) -> AppResult<()> {
        let result = self.api.sign_out_account().await;

        self.state.send_modify(|state| {
            state.user = User::default();
            state.status = AuthStatus::Unauthenticated;
            state.is_loading = false;
        });
        if let Err(e) = self.local.remove(COOKIE_FALLBACK_KEY) {
            tracing::warn!("Could not clear session marker: {}", e);
        }

        result
    }
}

/// Read-only handle on the session state.
#[derive(Clone)]
pub struct SessionView {
    state: watch::Receiver<SessionState>,
}

impl SessionView {
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn user(&self) -> User {
        self.state.borrow().user.clone()
    }

    /// Wait for the next change. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }
}
