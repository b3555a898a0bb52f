use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::note::{Note, NoteDraft};

mod local;

pub use local::LocalGateway;

/// One inbound change pushed by the backend, or returned from a mutation.
/// The reconciler treats both sources identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    Created(Note),
    Updated(Note),
    Deleted { id: String },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("note {id} not found")]
    NotFound { id: String },
    #[error("not authenticated")]
    Unauthenticated,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// The authenticated identity subscriptions are scoped to. Session and token
/// lifecycle belong entirely to the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
}

pub trait Authenticator {
    fn current_user(&self) -> GatewayResult<UserIdentity>;
}

/// Fixed identity, for configurations without a real auth provider.
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    identity: UserIdentity,
}

impl StaticAuthenticator {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            identity: UserIdentity {
                username: username.into(),
            },
        }
    }
}

impl Authenticator for StaticAuthenticator {
    fn current_user(&self) -> GatewayResult<UserIdentity> {
        Ok(self.identity.clone())
    }
}

/// The backend-as-a-service seam: authenticated CRUD plus three owner-scoped
/// push streams. The backend assigns `id` and `owner` on creation and is
/// authoritative for all note state; implementations own their transport,
/// retries, and reconnection entirely.
pub trait RemoteGateway: Send + Sync {
    fn list_notes(&self) -> GatewayResult<Vec<Note>>;
    fn create_note(&self, draft: &NoteDraft) -> GatewayResult<Note>;
    fn update_note(&self, id: &str, draft: &NoteDraft) -> GatewayResult<Note>;
    /// Returns the id of the deleted note.
    fn delete_note(&self, id: &str) -> GatewayResult<String>;
    fn on_create(&self, owner: &str) -> GatewayResult<Subscription>;
    fn on_update(&self, owner: &str) -> GatewayResult<Subscription>;
    fn on_delete(&self, owner: &str) -> GatewayResult<Subscription>;
}

/// Live-push stream handle. Events queue in the channel until drained;
/// dropping the handle (or calling [`Subscription::unsubscribe`]) deregisters
/// the stream so nothing is delivered into a torn-down session.
pub struct Subscription {
    receiver: Receiver<NoteEvent>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(receiver: Receiver<NoteEvent>, cancel: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            receiver,
            cancel: Some(cancel),
        }
    }

    /// Next pending event, if any. Never blocks; the session's event loop
    /// polls this on its own schedule.
    pub fn try_next(&self) -> Option<NoteEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.cancel_inner();
    }

    fn cancel_inner(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_inner();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pending", &self.receiver.len())
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
