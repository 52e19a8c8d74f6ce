//! Session State and Teardown
//!
//! Client-side cache of the backend's authentication truth. The state
//! machine has three positions: `Unknown` until the first who-am-I query,
//! `Authenticated` while the session cookie is valid, `Unauthenticated`
//! after teardown.
//!
//! All mutation goes through [`SessionHandle`] - there is no ambient
//! singleton. The handle is cloned into every component that needs it
//! (transport, exchange, UI), each clone sharing the same state. Teardown is
//! idempotent: the first `expire` transitions, clears registered caches and
//! emits one event; later or concurrent calls are no-ops.
//!
//! UI surfaces subscribe to [`SessionEvent`]s; `Expired` and `LoggedOut`
//! both mean "return to the login screen".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::models::AuthUser;

/// Authentication state as last observed from the backend
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AuthState {
    /// No who-am-I query has completed yet
    #[default]
    Unknown,
    /// The backend confirmed the session
    Authenticated(AuthUser),
    /// The session is gone; the UI should be at the login screen
    Unauthenticated,
}

impl AuthState {
    /// Whether a confirmed user is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The confirmed user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Events emitted on session transitions
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The who-am-I query confirmed the session.
    Authenticated {
        /// The confirmed user
        user: AuthUser,
    },
    /// The session was torn down (401 or failed who-am-I); caches have been
    /// cleared and the UI should return to the login screen.
    Expired,
    /// Explicit logout finished; the UI should return to the login screen.
    LoggedOut,
}

type TeardownHook = Box<dyn Fn() + Send + Sync>;

struct SessionInner {
    state: RwLock<AuthState>,
    /// Bumped on every teardown so in-flight work can detect staleness.
    epoch: AtomicU64,
    teardown_hooks: Mutex<Vec<TeardownHook>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Shared handle to the session state
///
/// Cheap to clone; all clones observe and mutate the same state. The single
/// mutation entry points are [`authenticate`](Self::authenticate),
/// [`expire`](Self::expire) and the logout path on the client facade.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    /// Create a session handle and the receiver for its events.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let handle = Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(AuthState::Unknown),
                epoch: AtomicU64::new(0),
                teardown_hooks: Mutex::new(Vec::new()),
                events,
            }),
        };
        (handle, rx)
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.inner.state.read().clone()
    }

    /// Whether the session is currently confirmed.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.read().is_authenticated()
    }

    /// The confirmed user, if any.
    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.inner.state.read().user().cloned()
    }

    /// Teardown generation counter.
    ///
    /// Work started before a teardown observes a different epoch afterward
    /// and must discard its result.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    /// Register a hook to run once per teardown (cache clears).
    pub fn on_teardown(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.teardown_hooks.lock().push(Box::new(hook));
    }

    /// Record a confirmed who-am-I result.
    pub fn authenticate(&self, user: AuthUser) {
        *self.inner.state.write() = AuthState::Authenticated(user.clone());
        tracing::debug!(user = %user.email, "session authenticated");
        self.emit(SessionEvent::Authenticated { user });
    }

    /// Tear the session down after a 401 or a failed who-am-I query.
    ///
    /// Idempotent: only the first call (the write lock serializes racers)
    /// transitions the state, bumps the epoch, runs teardown hooks and emits
    /// [`SessionEvent::Expired`].
    pub fn expire(&self) {
        if self.teardown() {
            tracing::info!("session expired");
            self.emit(SessionEvent::Expired);
        }
    }

    /// Fail with [`ClientError::Unauthorized`] unless authenticated.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` when the state is `Unknown` or
    /// `Unauthenticated`.
    pub fn require_authenticated(&self) -> Result<AuthUser, ClientError> {
        self.user().ok_or(ClientError::Unauthorized)
    }

    /// Clear local state without emitting `Expired` (the logout path emits
    /// `LoggedOut` itself, after the best-effort backend notify).
    pub(crate) fn clear_for_logout(&self) {
        self.teardown();
    }

    /// Emit the logout event.
    pub(crate) fn emit_logged_out(&self) {
        self.emit(SessionEvent::LoggedOut);
    }

    /// Transition to `Unauthenticated`. Returns whether this call did the
    /// transition (false when already torn down).
    fn teardown(&self) -> bool {
        {
            let mut state = self.inner.state.write();
            if *state == AuthState::Unauthenticated {
                return false;
            }
            *state = AuthState::Unauthenticated;
            self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        }
        for hook in self.inner.teardown_hooks.lock().iter() {
            hook();
        }
        true
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine; events are advisory.
        let _ = self.inner.events.send(event);
    }
}
