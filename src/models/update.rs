use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Engine-assigned identity of an update.
///
/// Two updates with the same `update_id` are the same logical update; the
/// revision distinguishes re-published metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateIdentity {
    pub update_id: Uuid,
    pub revision: u32,
}

/// An update as reported by the search capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub identity: UpdateIdentity,
    pub title: String,

    #[serde(default)]
    pub kb_article_ids: Vec<String>,

    #[serde(default)]
    pub is_downloaded: bool,

    #[serde(default)]
    pub is_installed: bool,

    #[serde(default)]
    pub max_download_size: u64,
}

impl Update {
    /// Create a not-yet-downloaded update with a fresh identity at revision 1.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            identity: UpdateIdentity {
                update_id: Uuid::new_v4(),
                revision: 1,
            },
            title: title.into(),
            kb_article_ids: Vec::new(),
            is_downloaded: false,
            is_installed: false,
            max_download_size: 0,
        }
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.identity.revision = revision;
        self
    }

    pub fn with_kb(mut self, kb: impl Into<String>) -> Self {
        self.kb_article_ids.push(kb.into());
        self
    }

    pub fn downloaded(mut self) -> Self {
        self.is_downloaded = true;
        self
    }

    pub fn id(&self) -> Uuid {
        self.identity.update_id
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}
