use indexmap::IndexMap;

use crate::gateway::NoteEvent;
use crate::note::Note;

/// Locally cached view of the server's note list.
///
/// The store is a cache, not a source of truth: every inbound event patches
/// it to match the backend, and conflicting arrivals resolve as
/// last-write-wins in receipt order. Keys are note ids, so uniqueness is
/// structural; `IndexMap` keeps insertion order, so reconciliation never
/// reorders notes it does not touch.
#[derive(Debug, Clone, Default)]
pub struct NoteStore {
    notes: IndexMap<String, Note>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the store wholesale with the result of the initial list
    /// fetch. Duplicate ids in the fetch keep their first position and take
    /// their last content.
    pub fn load_all<I>(&mut self, notes: I)
    where
        I: IntoIterator<Item = Note>,
    {
        self.notes.clear();
        for note in notes {
            self.notes.insert(note.id.clone(), note);
        }
    }

    /// Inserts a freshly created note, or overwrites in place if the id is
    /// already present (the optimistic mutation response and the
    /// subscription echo race; whichever lands second is a harmless
    /// overwrite).
    pub fn apply_create(&mut self, note: Note) {
        self.upsert(note);
    }

    /// Replaces the note's content in place, keeping its list position. An
    /// update for an id we have never seen degrades to an insert: the
    /// backend is authoritative, so the store is patched to match rather
    /// than rejecting the event.
    pub fn apply_update(&mut self, note: Note) {
        self.upsert(note);
    }

    /// Removes the note if present. Deleting an absent id is a no-op, not an
    /// error — a delete can legitimately arrive before the create it follows
    /// under weak event ordering.
    pub fn apply_delete(&mut self, id: &str) -> bool {
        self.notes.shift_remove(id).is_some()
    }

    /// Applies one inbound event in receipt order. Total: never fails,
    /// regardless of what the store currently holds.
    pub fn apply(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::Created(note) => self.apply_create(note),
            NoteEvent::Updated(note) => self.apply_update(note),
            NoteEvent::Deleted { id } => {
                self.apply_delete(&id);
            }
        }
    }

    fn upsert(&mut self, note: Note) {
        self.notes.insert(note.id.clone(), note);
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.notes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn to_vec(&self) -> Vec<Note> {
        self.notes.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, text: &str) -> Note {
        Note::new(id, text, "alice")
    }

    fn ids(store: &NoteStore) -> Vec<&str> {
        store.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn load_all_replaces_store_wholesale() {
        let mut store = NoteStore::new();
        store.apply_create(note("stale", "gone after load"));

        store.load_all(vec![note("1", "a")]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").unwrap().text, "a");
        assert!(!store.contains("stale"));
    }

    #[test]
    fn load_all_dedups_by_id_last_content_wins() {
        let mut store = NoteStore::new();
        store.load_all(vec![note("1", "first"), note("2", "b"), note("1", "second")]);
        assert_eq!(store.len(), 2);
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert_eq!(store.get("1").unwrap().text, "second");
    }

    #[test]
    fn create_appends_new_note() {
        let mut store = NoteStore::new();
        store.load_all(vec![note("1", "a")]);
        store.apply_create(note("2", "b"));
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert_eq!(store.get("2").unwrap().text, "b");
    }

    #[test]
    fn create_is_idempotent() {
        let mut store = NoteStore::new();
        store.apply_create(note("1", "a"));
        let once = store.to_vec();
        store.apply_create(note("1", "a"));
        assert_eq!(store.to_vec(), once);
    }

    #[test]
    fn create_for_existing_id_overwrites_without_duplicating() {
        let mut store = NoteStore::new();
        store.apply_create(note("1", "optimistic"));
        store.apply_create(note("1", "echoed"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").unwrap().text, "echoed");
    }

    #[test]
    fn update_replaces_text_in_place() {
        let mut store = NoteStore::new();
        store.load_all(vec![note("1", "a"), note("2", "b")]);
        store.apply_update(note("1", "A"));
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert_eq!(store.get("1").unwrap().text, "A");
        assert_eq!(store.get("2").unwrap().text, "b");
    }

    #[test]
    fn update_for_unknown_id_degrades_to_insert() {
        let mut store = NoteStore::new();
        store.load_all(vec![note("1", "a")]);
        store.apply_update(note("ghost", "materialised"));
        assert!(store.contains("ghost"));
        assert_eq!(ids(&store), vec!["1", "ghost"]);
    }

    #[test]
    fn update_does_not_reorder_untouched_notes() {
        let mut store = NoteStore::new();
        store.load_all(vec![note("1", "a"), note("2", "b"), note("3", "c")]);
        store.apply_update(note("2", "B"));
        assert_eq!(ids(&store), vec!["1", "2", "3"]);
    }

    #[test]
    fn delete_removes_and_preserves_remaining_order() {
        let mut store = NoteStore::new();
        store.load_all(vec![note("1", "a"), note("2", "b"), note("3", "c")]);
        assert!(store.apply_delete("2"));
        assert_eq!(ids(&store), vec!["1", "3"]);
    }

    #[test]
    fn delete_of_absent_id_is_a_no_op() {
        let mut store = NoteStore::new();
        store.load_all(vec![note("1", "a")]);
        assert!(store.apply_delete("1"));
        assert!(store.is_empty());
        // Replayed delete: still empty, still not an error.
        assert!(!store.apply_delete("1"));
        assert!(store.is_empty());
    }

    #[test]
    fn out_of_order_delete_then_create_readds_the_note() {
        let mut store = NoteStore::new();
        store.apply(NoteEvent::Deleted { id: "1".into() });
        assert!(store.is_empty());
        store.apply(NoteEvent::Created(note("1", "late arrival")));
        assert!(store.contains("1"));
    }

    #[test]
    fn arbitrary_event_sequences_keep_ids_unique() {
        let mut store = NoteStore::new();
        let events = vec![
            NoteEvent::Created(note("1", "a")),
            NoteEvent::Updated(note("1", "a2")),
            NoteEvent::Created(note("2", "b")),
            NoteEvent::Created(note("1", "a3")),
            NoteEvent::Deleted { id: "3".into() },
            NoteEvent::Updated(note("3", "c")),
            NoteEvent::Created(note("2", "b2")),
            NoteEvent::Deleted { id: "1".into() },
            NoteEvent::Created(note("1", "a4")),
        ];
        for event in events {
            store.apply(event);
            let mut seen = std::collections::HashSet::new();
            assert!(
                store.iter().all(|n| seen.insert(n.id.clone())),
                "duplicate id after event"
            );
        }
        assert_eq!(store.get("1").unwrap().text, "a4");
        assert_eq!(store.get("2").unwrap().text, "b2");
        assert_eq!(store.get("3").unwrap().text, "c");
    }
}
