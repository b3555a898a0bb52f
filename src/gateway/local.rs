use std::sync::Arc;

use crossbeam_channel::{unbounded, Sender};
use indexmap::IndexMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    Authenticator, GatewayError, GatewayResult, NoteEvent, RemoteGateway, Subscription,
    UserIdentity,
};
use crate::note::{Note, NoteDraft};

/// In-process reference backend.
///
/// Behaves like the hosted service from a client's point of view: assigns
/// ids and owners on creation, rejects mutations against unknown ids, and
/// echoes every mutation on the matching owner-scoped push stream. Cloning
/// yields another authenticated client handle onto the same service, which
/// is how multi-client sync is exercised in tests and in the shell's peer
/// mode.
#[derive(Clone)]
pub struct LocalGateway {
    username: String,
    shared: Arc<Mutex<Shared>>,
}

#[derive(Default)]
struct Shared {
    notes: IndexMap<String, Note>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
}

struct Subscriber {
    id: u64,
    kind: StreamKind,
    owner: String,
    sender: Sender<NoteEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Create,
    Update,
    Delete,
}

impl LocalGateway {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Installs pre-existing server-side notes for the authenticated user.
    /// No events are emitted; seeds are visible through `list_notes` only,
    /// like any state that predates the session.
    pub fn seed<I, S>(&self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut shared = self.shared.lock();
        for text in texts {
            let note = Note::new(Uuid::new_v4().to_string(), text, self.username.clone());
            shared.notes.insert(note.id.clone(), note);
        }
    }

    /// Another authenticated client of the same service, e.g. the same user
    /// on a second device.
    pub fn client_for(&self, username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            shared: Arc::clone(&self.shared),
        }
    }

    fn subscribe(&self, kind: StreamKind, owner: &str) -> Subscription {
        let (sender, receiver) = unbounded();
        let id = {
            let mut shared = self.shared.lock();
            let id = shared.next_subscriber;
            shared.next_subscriber += 1;
            shared.subscribers.push(Subscriber {
                id,
                kind,
                owner: owner.to_string(),
                sender,
            });
            id
        };
        let shared = Arc::clone(&self.shared);
        Subscription::new(
            receiver,
            Box::new(move || {
                shared.lock().subscribers.retain(|s| s.id != id);
            }),
        )
    }
}

impl Shared {
    fn broadcast(&mut self, kind: StreamKind, owner: &str, event: &NoteEvent) {
        // A failed send means the receiver is gone; prune it on the spot.
        self.subscribers.retain(|sub| {
            if sub.kind != kind || sub.owner != owner {
                return true;
            }
            sub.sender.send(event.clone()).is_ok()
        });
    }
}

impl RemoteGateway for LocalGateway {
    fn list_notes(&self) -> GatewayResult<Vec<Note>> {
        Ok(self.shared.lock().notes.values().cloned().collect())
    }

    fn create_note(&self, draft: &NoteDraft) -> GatewayResult<Note> {
        if draft.text.trim().is_empty() {
            return Err(GatewayError::InvalidInput("note text is empty".into()));
        }
        let note = Note::new(
            Uuid::new_v4().to_string(),
            draft.text.clone(),
            self.username.clone(),
        );
        let mut shared = self.shared.lock();
        shared.notes.insert(note.id.clone(), note.clone());
        let event = NoteEvent::Created(note.clone());
        shared.broadcast(StreamKind::Create, &note.owner, &event);
        tracing::debug!(id = %note.id, owner = %note.owner, "created note");
        Ok(note)
    }

    fn update_note(&self, id: &str, draft: &NoteDraft) -> GatewayResult<Note> {
        if draft.text.trim().is_empty() {
            return Err(GatewayError::InvalidInput("note text is empty".into()));
        }
        let mut shared = self.shared.lock();
        let note = match shared.notes.get_mut(id) {
            Some(note) => {
                note.text = draft.text.clone();
                note.clone()
            }
            None => {
                return Err(GatewayError::NotFound { id: id.to_string() });
            }
        };
        let event = NoteEvent::Updated(note.clone());
        shared.broadcast(StreamKind::Update, &note.owner, &event);
        tracing::debug!(id = %note.id, "updated note");
        Ok(note)
    }

    fn delete_note(&self, id: &str) -> GatewayResult<String> {
        let mut shared = self.shared.lock();
        let note = shared
            .notes
            .shift_remove(id)
            .ok_or_else(|| GatewayError::NotFound { id: id.to_string() })?;
        let event = NoteEvent::Deleted {
            id: note.id.clone(),
        };
        shared.broadcast(StreamKind::Delete, &note.owner, &event);
        tracing::debug!(id = %note.id, "deleted note");
        Ok(note.id)
    }

    fn on_create(&self, owner: &str) -> GatewayResult<Subscription> {
        Ok(self.subscribe(StreamKind::Create, owner))
    }

    fn on_update(&self, owner: &str) -> GatewayResult<Subscription> {
        Ok(self.subscribe(StreamKind::Update, owner))
    }

    fn on_delete(&self, owner: &str) -> GatewayResult<Subscription> {
        Ok(self.subscribe(StreamKind::Delete, owner))
    }
}

impl Authenticator for LocalGateway {
    fn current_user(&self) -> GatewayResult<UserIdentity> {
        Ok(UserIdentity {
            username: self.username.clone(),
        })
    }
}
