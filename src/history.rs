use crate::*;

/// A batch of transactions undone and redone as a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    transactions: Vec<Transaction>,
    selection: Selection,
}

impl HistoryEntry {
    /// Returns the sum of the length differences of the batch.
    #[inline]
    pub fn length_difference(&self) -> isize {
        self.transactions.iter().map(Transaction::length_difference).sum()
    }

    /// Returns the selection at the time the batch was closed.
    #[inline]
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Returns the batch's transactions, in the order they were applied.
    #[inline]
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }
}

/// The undo/redo stacks of a [`Surface`](crate::Surface).
///
/// Transactions from local edits accumulate in the small stack until a
/// breakpoint moves them into a new entry of the big stack. Undoing only
/// moves `undo_index` (the number of entries undone, counted from the top),
/// so nothing is lost until a new edit discards the redo tail.
#[derive(Debug, Clone, Default)]
pub(crate) struct UndoStack {
    big: Vec<HistoryEntry>,
    small: Vec<Transaction>,
    undo_index: usize,
    max_steps: usize,
}

impl UndoStack {
    #[inline]
    pub fn big(&self) -> &[HistoryEntry] {
        &self.big
    }

    /// Closes the current batch, returning `false` if there was nothing to
    /// close.
    ///
    /// No-op transactions are left out of the closed batch, and a batch made
    /// only of no-ops is dropped. A no-op still spans the document length it
    /// was built for, so it can't be reversed once that length changed.
    pub fn breakpoint(&mut self, selection: Selection) -> bool {
        let mut transactions = core::mem::take(&mut self.small);

        transactions.retain(|tx| !tx.is_no_op());

        if transactions.is_empty() {
            return false;
        }

        let entry = HistoryEntry { transactions, selection };
        let at = self.big.len() - self.undo_index;
        self.big.insert(at, entry);

        let applied = self.big.len() - self.undo_index;
        if applied > self.max_steps {
            self.big.drain(..applied - self.max_steps);
        }

        true
    }

    /// No-ops in the current batch don't count as edits.
    #[inline]
    pub fn can_redo(&self) -> bool {
        self.undo_index > 0 && self.small.iter().all(Transaction::is_no_op)
    }

    #[inline]
    pub fn can_undo(&self) -> bool {
        self.big.len() > self.undo_index
            || !self.small.iter().all(Transaction::is_no_op)
    }

    #[inline]
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps, ..Self::default() }
    }

    /// Marks the `steps` most recently undone entries as applied again.
    #[inline]
    pub fn redone(&mut self, steps: usize) {
        debug_assert!(steps <= self.undo_index);
        self.undo_index -= steps;
    }

    /// Returns up to `steps` undone entries, the next one to redo first.
    #[inline]
    pub fn to_redo(
        &self,
        steps: usize,
    ) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.big[self.big.len() - self.undo_index..].iter().take(steps)
    }

    /// Returns up to `steps` applied entries, the most recent first.
    #[inline]
    pub fn to_undo(
        &self,
        steps: usize,
    ) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.big[..self.big.len() - self.undo_index].iter().rev().take(steps)
    }

    /// Marks the `steps` most recently applied entries as undone.
    #[inline]
    pub fn undone(&mut self, steps: usize) {
        debug_assert!(self.undo_index + steps <= self.big.len());
        self.undo_index += steps;
    }

    /// Removes `tx` if it's the most recently applied local transaction,
    /// returning whether it was.
    pub fn pop_applied(&mut self, tx: &Transaction) -> bool {
        if !self.small.is_empty() {
            if self.small.last() == Some(tx) {
                self.small.pop();
                return true;
            }
            return false;
        }

        if self.undo_index > 0 {
            return false;
        }

        let Some(entry) = self.big.last_mut() else {
            return false;
        };

        if entry.transactions.last() != Some(tx) {
            return false;
        }

        entry.transactions.pop();
        if entry.transactions.is_empty() {
            self.big.pop();
        }
        true
    }

    /// Records a transaction from a local edit.
    ///
    /// Anything other than a no-op discards the redo tail.
    pub fn push(&mut self, tx: Transaction) {
        if !tx.is_no_op() && self.undo_index > 0 {
            tracing::debug!(
                discarded = self.undo_index,
                "new edit discards redo history"
            );
            self.big.truncate(self.big.len() - self.undo_index);
            self.undo_index = 0;
        }
        self.small.push(tx);
    }

    /// Transforms every entry so that it stays applicable after `remote`,
    /// a transaction that didn't come from a local edit, has been applied
    /// to the current document.
    ///
    /// Entries that conflict with `remote` can't be undone (or redone)
    /// anymore and are discarded, together with the ones that depend on
    /// them.
    pub fn rebase_over(&mut self, remote: &Transaction) {
        if remote.is_no_op() {
            return;
        }

        let applied = self.big.len() - self.undo_index;

        // Undone entries apply forwards starting from the current document,
        // the next one to redo first.
        let mut forward = remote.clone();
        let mut kept = self.big.len();

        'redo: for idx in applied..self.big.len() {
            let entry = &mut self.big[idx];
            for tx in entry.transactions.iter_mut() {
                let Some((rebased, next)) = rebase_transactions(tx, &forward)
                else {
                    kept = idx;
                    break 'redo;
                };
                *tx = rebased;
                forward = next;
            }
            entry.selection =
                entry.selection.translate_by_transaction(&forward, true);
        }

        if kept < self.big.len() {
            tracing::debug!(
                discarded = self.big.len() - kept,
                "redo history conflicts with remote edit"
            );
            self.big.truncate(kept);
            self.undo_index = kept - applied;
        }

        // Applied transactions are walked backwards, moving `remote` before
        // each of them.
        let mut backward = remote.clone();

        for idx in (0..self.small.len()).rev() {
            let Some((rebased, prev)) =
                rebase_before(&self.small[idx], &backward)
            else {
                tracing::debug!("undo history conflicts with remote edit");
                self.small.drain(..=idx);
                self.big.drain(..applied);
                return;
            };
            self.small[idx] = rebased;
            backward = prev;
        }

        for idx in (0..applied).rev() {
            let entry = &mut self.big[idx];
            entry.selection =
                entry.selection.translate_by_transaction(&backward, true);

            for tx in entry.transactions.iter_mut().rev() {
                let Some((rebased, prev)) = rebase_before(tx, &backward) else {
                    tracing::debug!(
                        discarded = idx + 1,
                        "undo history conflicts with remote edit"
                    );
                    self.big.drain(..=idx);
                    return;
                };
                *tx = rebased;
                backward = prev;
            }
        }
    }

    #[inline]
    pub fn small(&self) -> &[Transaction] {
        &self.small
    }

    #[inline]
    pub fn undo_index(&self) -> usize {
        self.undo_index
    }
}

/// Given an applied transaction `tx` and a transaction `remote` applied right
/// after it, returns `tx` transformed to apply after `remote` has been moved
/// before it, together with the moved `remote`.
#[inline]
fn rebase_before(
    tx: &Transaction,
    remote: &Transaction,
) -> Option<(Transaction, Transaction)> {
    let (inverse, moved) = rebase_transactions(&tx.reversed(), remote)?;
    Some((inverse.reversed(), moved))
}
