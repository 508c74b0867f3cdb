//! Run-scoped bookkeeping of which Jira issue became which GitLab issue.

use std::collections::HashMap;

use tracing::warn;

use crate::models::{IssueIid, SourceIssueId};

/// Import state of one source issue. An id without a state is unvisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    /// Visited; its dependencies are being imported.
    InProgress,
    /// Created as the given destination issue.
    Done(IssueIid),
    /// Creation failed; not retried during this run.
    Failed,
}

/// Source id -> [`ImportState`].
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    states: HashMap<SourceIssueId, ImportState>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: SourceIssueId) -> Option<ImportState> {
        self.states.get(&id).copied()
    }

    pub fn is_visited(&self, id: SourceIssueId) -> bool {
        self.states.contains_key(&id)
    }

    /// Mark `id` in progress. Returns `false` if it was already visited.
    pub fn begin(&mut self, id: SourceIssueId) -> bool {
        if self.is_visited(id) {
            return false;
        }
        self.states.insert(id, ImportState::InProgress);
        true
    }

    /// Record the created destination issue. A `Done` entry is never
    /// overwritten.
    pub fn complete(&mut self, id: SourceIssueId, iid: IssueIid) {
        self.set_terminal(id, ImportState::Done(iid));
    }

    pub fn fail(&mut self, id: SourceIssueId) {
        self.set_terminal(id, ImportState::Failed);
    }

    fn set_terminal(&mut self, id: SourceIssueId, state: ImportState) {
        match self.states.get(&id) {
            Some(ImportState::Done(existing)) => {
                warn!(id, existing, ?state, "issue already imported, keeping existing mapping");
            }
            _ => {
                self.states.insert(id, state);
            }
        }
    }

    /// Destination iid of `id` if it was imported.
    pub fn resolved(&self, id: SourceIssueId) -> Option<IssueIid> {
        match self.state(id) {
            Some(ImportState::Done(iid)) => Some(iid),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn done_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, ImportState::Done(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_visits_once() {
        let mut mapping = IdMapping::new();
        assert!(!mapping.is_visited(7));
        assert!(mapping.begin(7));
        assert!(!mapping.begin(7));
        assert_eq!(mapping.state(7), Some(ImportState::InProgress));
        assert_eq!(mapping.resolved(7), None);
    }

    #[test]
    fn test_done_is_never_overwritten() {
        let mut mapping = IdMapping::new();
        mapping.begin(7);
        mapping.complete(7, 12);
        mapping.complete(7, 99);
        mapping.fail(7);
        assert_eq!(mapping.resolved(7), Some(12));
        assert_eq!(mapping.done_count(), 1);
    }

    #[test]
    fn test_failed_is_unresolved() {
        let mut mapping = IdMapping::new();
        mapping.begin(3);
        mapping.fail(3);
        assert!(mapping.is_visited(3));
        assert!(!mapping.begin(3));
        assert_eq!(mapping.resolved(3), None);
        assert_eq!(mapping.len(), 1);
    }
}
