use std::collections::HashMap;

use log::trace;

use super::{Notice, Severity};

/// Key of a speculative parser branch. Notices buffered under a branch
/// are committed only if that branch survives pruning.
pub type BranchKey = u32;

/// Ordered store of diagnostics for one session.
///
/// Committed notices are kept in emission order. During speculative
/// parsing, notices raised under a decision node go into a tentative
/// buffer keyed by the branch; the parser commits or drops the buffer
/// when the branch is resolved.
#[derive(Debug, Default)]
pub struct NoticeStore {
    committed: Vec<Notice>,
    tentative: HashMap<BranchKey, Vec<Notice>>,
}

impl NoticeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, notice: Notice) {
        trace!(
            "notice {}: {}",
            notice.code.as_str(),
            notice.message
        );
        self.committed.push(notice);
    }

    /// Buffer a notice under a speculative branch.
    pub fn add_tentative(&mut self, branch: BranchKey, notice: Notice) {
        self.tentative.entry(branch).or_default().push(notice);
    }

    /// The branch survived: move its buffered notices into the committed
    /// sequence.
    pub fn commit_branch(&mut self, branch: BranchKey) {
        if let Some(notices) = self.tentative.remove(&branch) {
            self.committed.extend(notices);
        }
    }

    /// The branch was pruned: its buffered notices are gone for good.
    pub fn drop_branch(&mut self, branch: BranchKey) {
        self.tentative.remove(&branch);
    }

    pub fn tentative_count(&self, branch: BranchKey) -> usize {
        self.tentative.get(&branch).map(Vec::len).unwrap_or(0)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.committed
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    /// Withdraw notices committed after `mark`. Used by generator
    /// probes that try an interpretation and fall back on failure.
    pub fn truncate(&mut self, mark: usize) {
        self.committed.truncate(mark);
    }

    pub fn has_errors(&self) -> bool {
        self.committed
            .iter()
            .any(|notice| notice.severity >= Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.committed
            .iter()
            .filter(|notice| notice.severity >= Severity::Error)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use crate::basic::SourceLocation;
    use crate::notices::{Notice, NoticeCode};

    use super::NoticeStore;

    fn syntax_notice(message: &str) -> Notice {
        Notice::new(NoticeCode::SyntaxError, SourceLocation::default(), message)
    }

    #[test]
    fn test_committed_order() {
        let mut store = NoticeStore::new();
        store.add(syntax_notice("first"));
        store.add(syntax_notice("second"));

        let messages: Vec<_> = store.notices().iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_dropped_branch_leaves_no_trace() {
        let mut store = NoticeStore::new();
        store.add_tentative(1, syntax_notice("speculative"));
        store.drop_branch(1);

        assert!(store.notices().is_empty());
        assert!(!store.has_errors());
    }

    #[test]
    fn test_committed_branch_appends() {
        let mut store = NoticeStore::new();
        store.add(syntax_notice("before"));
        store.add_tentative(7, syntax_notice("surviving"));
        store.commit_branch(7);

        let messages: Vec<_> = store.notices().iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["before", "surviving"]);
        assert!(store.has_errors());
    }
}
