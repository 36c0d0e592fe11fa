//! Ordered, append-only conversation log shown to the operator.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// What an entry represents. Only `Progress` entries may be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Message,
    Progress,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub kind: EntryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub screenshots: Vec<String>,
}

impl TranscriptEntry {
    fn new(role: Role, kind: EntryKind, content: impl Into<String>) -> Self {
        Self {
            role,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            screenshots: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, EntryKind::Message, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, EntryKind::Message, content)
    }

    pub fn progress(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, EntryKind::Progress, content)
    }

    pub fn terminal(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, EntryKind::Terminal, content)
    }

    pub fn with_screenshots(mut self, screenshots: Vec<String>) -> Self {
        self.screenshots = screenshots;
        self
    }

    pub fn is_progress_narration(&self) -> bool {
        self.role == Role::Assistant && self.kind == EntryKind::Progress
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("transcript is empty")]
    Empty,
    #[error("only assistant progress entries can be replaced")]
    NotProgress,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    screenshots: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// Every screenshot reference seen since the last clear.
    pub fn screenshots(&self) -> &[String] {
        &self.screenshots
    }

    pub fn append(&mut self, entry: TranscriptEntry) {
        self.screenshots.extend(entry.screenshots.iter().cloned());
        self.entries.push(entry);
    }

    /// Rewrite the trailing progress narration in place. Reserved for progress
    /// coalescing; every other update must append.
    pub(crate) fn replace_last(&mut self, entry: TranscriptEntry) -> Result<(), TranscriptError> {
        let last = self.entries.last_mut().ok_or(TranscriptError::Empty)?;
        if !last.is_progress_narration() || !entry.is_progress_narration() {
            return Err(TranscriptError::NotProgress);
        }
        self.screenshots.extend(entry.screenshots.iter().cloned());
        *last = entry;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.screenshots.clear();
    }
}
