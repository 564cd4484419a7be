use std::collections::BTreeMap;

use crate::*;

/// The authority of a collaborative session.
///
/// The server keeps the one history every client converges to. Each
/// submission is rebased onto whatever got committed since the point of
/// history it starts at, and the result is appended to history and returned
/// so that it can be broadcast to every client, submitter included.
///
/// Clients don't wait for a submission to be echoed back before sending the
/// next one, so a submission can start at a point of history that only
/// exists on its author's side, after transactions the server has since
/// rebased. For each author the server keeps the committed transactions
/// that author hasn't seen, transposed to apply after its own ones, and
/// rebases the next submission onto those.
///
/// When part of a submission conflicts with history it's rejected, and the
/// server remembers how many transactions it dropped. The submitting client
/// finds the same conflict once it receives the change it conflicted with,
/// and acknowledges the rejection by sending that count as the `backtrack`
/// of its next submission. Until it does, everything it sends is rejected.
#[derive(Debug, Clone, Default)]
pub struct RebaseServer {
    history: Vec<Transaction>,
    selections: BTreeMap<AuthorId, Selection>,
    rejections: BTreeMap<AuthorId, usize>,
    unseen: BTreeMap<AuthorId, Change>,
}

impl RebaseServer {
    /// Commits a submission, returning the change to broadcast.
    ///
    /// # Errors
    ///
    /// Fails if `backtrack` is greater than the number of transactions
    /// rejected for `author`, or if the change doesn't start at a point of
    /// history the author could have reached.
    pub fn apply_change(
        &mut self,
        author: AuthorId,
        backtrack: usize,
        change: &Change,
    ) -> Result<Change, ServerError> {
        let rejections = self.rejections.get(&author).copied().unwrap_or(0);

        if rejections > backtrack {
            let rejections = rejections - backtrack + change.len();
            tracing::debug!(
                %author,
                backtrack,
                rejections,
                "rejected submission with unacknowledged rejections"
            );
            self.rejections.insert(author, rejections);
            return Ok(Change::empty(self.history.len()));
        }

        if rejections < backtrack {
            return Err(ServerError::Backtrack {
                author,
                backtrack,
                rejections,
            });
        }

        self.rejections.remove(&author);

        let committed = self.committed_since(author, change.start())?;

        let Rebase { rebased, rejected, transposed_history } =
            Change::rebase_uncommitted_change(&committed, change)?;

        if let Some(rejected) = rejected {
            tracing::debug!(
                %author,
                from = rejected.start(),
                rejected = rejected.len(),
                "rejected conflicting transactions"
            );
            self.rejections.insert(author, rejected.len());
        }

        self.history.extend(rebased.transactions().iter().cloned());
        self.unseen.insert(author, transposed_history);

        for (&author, &selection) in rebased.selections() {
            self.selections.insert(author, selection);
        }

        tracing::trace!(
            %author,
            start = rebased.start(),
            len = rebased.len(),
            "committed change"
        );

        Ok(rebased)
    }

    /// Returns the committed transactions from `start` onwards.
    ///
    /// # Errors
    ///
    /// Fails if `start` is past the end of history.
    pub fn change_since(&self, start: usize) -> Result<Change, ChangeError> {
        if start > self.history.len() {
            return Err(ChangeError::NotAdjacent {
                expected: self.history.len(),
                actual: start,
            });
        }

        Ok(Change::new(
            start,
            self.history[start..].to_vec(),
            BTreeMap::new(),
        ))
    }

    /// Returns what `author` has to be rebased onto when its history is
    /// `start` transactions long.
    ///
    /// Up to the end of the transactions the author hasn't seen, its history
    /// and the server's may differ, and the unseen ones are used instead.
    /// From there on both histories agree.
    fn committed_since(
        &self,
        author: AuthorId,
        start: usize,
    ) -> Result<Change, ServerError> {
        let Some(unseen) = self.unseen.get(&author) else {
            return Ok(self.change_since(start)?);
        };

        let end = unseen.start() + unseen.len();

        if start >= end {
            return Ok(self.change_since(start)?);
        }

        if start < unseen.start() {
            return Err(ChangeError::StartMismatch {
                committed: unseen.start(),
                uncommitted: start,
            }
            .into());
        }

        let mut transactions =
            unseen.transactions()[start - unseen.start()..].to_vec();
        transactions.extend_from_slice(&self.history[end..]);

        Ok(Change::new(start, transactions, BTreeMap::new()))
    }

    /// Returns every committed transaction.
    #[inline]
    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    /// Creates a server with an empty history.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of transactions rejected for `author` that it
    /// hasn't backtracked yet.
    #[inline]
    pub fn rejections(&self, author: AuthorId) -> usize {
        self.rejections.get(&author).copied().unwrap_or(0)
    }

    /// Returns the last selection committed for each author.
    #[inline]
    pub fn selections(&self) -> &BTreeMap<AuthorId, Selection> {
        &self.selections
    }
}
