#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailEntry {
    pub level: TrailLevel,
    pub message: String,
}

/// Append-only record of what happened during a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticTrail {
    entries: Vec<TrailEntry>,
}

impl DiagnosticTrail {
    pub(crate) fn push(&mut self, level: TrailLevel, message: impl Into<String>) {
        self.entries.push(TrailEntry {
            level,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[TrailEntry] {
        &self.entries
    }

    /// Entries appended after the first `seen` ones; lets a renderer print
    /// only what is new since its last pass.
    pub fn since(&self, seen: usize) -> &[TrailEntry] {
        self.entries.get(seen..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
