use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::gateway::{Authenticator, RemoteGateway, Subscription};
use crate::note::{Note, NoteDraft};
use crate::store::NoteStore;

/// What the note form currently represents: an unsaved note, or an edit of
/// an existing one. Submission branches on this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Composing,
    Editing(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(Note),
    Updated(Note),
}

/// One client session: the cached note list, the form state, and the three
/// live-push streams. All store mutations happen on the owning thread, on
/// dispatch of a submit, a delete, or a `pump` of pending events.
///
/// Dropping the session tears the subscriptions down, so the backend never
/// delivers into a dead store.
pub struct NoteSession {
    gateway: Arc<dyn RemoteGateway>,
    store: NoteStore,
    username: String,
    form_text: String,
    selected: Option<String>,
    streams: Vec<Subscription>,
}

impl NoteSession {
    /// Resolves the authenticated identity, registers the owner-scoped
    /// subscriptions with it, then loads the initial note list. The identity
    /// lookup happens immediately before registration so the scope is fresh,
    /// and the streams are registered before the list fetch so no event can
    /// fall between the two.
    pub fn start(
        gateway: Arc<dyn RemoteGateway>,
        authenticator: &dyn Authenticator,
    ) -> Result<Self> {
        let identity = authenticator
            .current_user()
            .context("resolving authenticated user")?;
        let username = identity.username;

        let streams = vec![
            gateway
                .on_create(&username)
                .context("subscribing to note creations")?,
            gateway
                .on_update(&username)
                .context("subscribing to note updates")?,
            gateway
                .on_delete(&username)
                .context("subscribing to note deletions")?,
        ];

        let notes = gateway.list_notes().context("fetching initial note list")?;
        let mut store = NoteStore::new();
        store.load_all(notes);
        tracing::debug!(user = %username, count = store.len(), "session started");

        Ok(Self {
            gateway,
            store,
            username,
            form_text: String::new(),
            selected: None,
            streams,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.store.iter()
    }

    pub fn text(&self) -> &str {
        &self.form_text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.form_text = text.into();
    }

    /// Loads an existing note into the form. Returns false (and leaves the
    /// form alone) if the id is not in the store.
    pub fn select_note(&mut self, id: &str) -> bool {
        match self.store.get(id) {
            Some(note) => {
                self.form_text = note.text.clone();
                self.selected = Some(note.id.clone());
                true
            }
            None => false,
        }
    }

    /// Explicit "new note": clears the selection and the form text.
    pub fn start_new(&mut self) {
        self.selected = None;
        self.form_text.clear();
    }

    /// True only if the current selection still refers to a note in the
    /// store. A note deleted by another actor mid-edit fails this guard.
    pub fn has_existing_note(&self) -> bool {
        self.selected
            .as_deref()
            .is_some_and(|id| self.store.contains(id))
    }

    pub fn mode(&self) -> FormMode {
        match &self.selected {
            Some(id) if self.store.contains(id) => FormMode::Editing(id.clone()),
            _ => FormMode::Composing,
        }
    }

    /// Submits the form: update when editing a note that still exists,
    /// create otherwise. The mutation response is applied to the store
    /// immediately and the form clears on success; on gateway failure the
    /// form and selection are left as they were.
    ///
    /// A selection whose note has vanished from the store degrades to a
    /// create rather than attempting an update the backend would reject.
    pub fn submit(&mut self) -> Result<SubmitOutcome> {
        if self.form_text.trim().is_empty() {
            bail!("note text is empty");
        }
        let draft = NoteDraft::new(self.form_text.clone());

        if let Some(id) = self.selected.clone() {
            if self.store.contains(&id) {
                let note = self
                    .gateway
                    .update_note(&id, &draft)
                    .with_context(|| format!("updating note {id}"))?;
                self.store.apply_update(note.clone());
                self.selected = None;
                self.form_text.clear();
                return Ok(SubmitOutcome::Updated(note));
            }
            tracing::debug!(id, "edited note no longer exists; degrading to create");
            self.selected = None;
        }

        let note = self
            .gateway
            .create_note(&draft)
            .context("creating note")?;
        self.store.apply_create(note.clone());
        self.form_text.clear();
        Ok(SubmitOutcome::Created(note))
    }

    /// Deletes a note remotely and mirrors the removal locally. If the
    /// deleted note was loaded in the form, the session returns to
    /// composing.
    pub fn delete_note(&mut self, id: &str) -> Result<()> {
        self.gateway
            .delete_note(id)
            .with_context(|| format!("deleting note {id}"))?;
        self.store.apply_delete(id);
        if self.selected.as_deref() == Some(id) {
            self.start_new();
        }
        Ok(())
    }

    /// Drains every pending subscription event into the store, in receipt
    /// order. Never touches the form text: the reconciler owns the list,
    /// the user owns the form. Returns the number of events applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        for stream in &self.streams {
            while let Some(event) = stream.try_next() {
                self.store.apply(event);
                applied += 1;
            }
        }
        if applied > 0 {
            tracing::debug!(applied, "reconciled subscription events");
        }
        applied
    }

    /// Explicit teardown: unsubscribes all streams. Dropping the session
    /// does the same.
    pub fn close(mut self) {
        for stream in self.streams.drain(..) {
            stream.unsubscribe();
        }
    }
}
