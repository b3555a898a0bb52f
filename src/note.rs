use serde::{Deserialize, Serialize};

/// A user-authored text record. `id` and `owner` are assigned by the backend
/// on creation; two notes with the same `id` are the same logical entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub text: String,
    pub owner: String,
}

impl Note {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            owner: owner.into(),
        }
    }
}

/// Client-supplied input for a create or update mutation. The backend fills
/// in everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub text: String,
}

impl NoteDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
