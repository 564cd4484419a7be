use std::collections::BTreeMap;

use crate::author::takes_priority;
use crate::transaction::Edge;
use crate::*;

/// A contiguous slice of edit history.
///
/// A change bundles the transactions applied between two points of a
/// document's history together with the selections of the authors involved.
/// `start` is the number of transactions in history before the change, and
/// applying `transactions` in order to the document state at `start`
/// produces the state at `start + len()`.
///
/// Changes are what collaborating clients exchange: local edits are bundled
/// into a change and submitted, and the server broadcasts committed changes
/// that every client then [rebases](Change::rebase_uncommitted_change) its
/// own pending work onto.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct Change {
    start: usize,

    transactions: Vec<Transaction>,

    #[serde(default)]
    selections: BTreeMap<AuthorId, Selection>,
}

/// The outcome of [`Change::rebase_uncommitted_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebase {
    /// The part of the uncommitted change that could be rebased, transformed
    /// to apply after the committed change.
    pub rebased: Change,

    /// The tail of the uncommitted change that conflicted with the committed
    /// change. It has to be undone locally.
    pub rejected: Option<Change>,

    /// The committed change transformed to apply after the part of the
    /// uncommitted change that was kept.
    pub transposed_history: Change,
}

impl Change {
    fn check_well_formed(&self) -> Result<(), ChangeError> {
        for (index, tx) in self.transactions.iter().enumerate() {
            tx.check_well_formed()
                .map_err(|source| ChangeError::Transaction { index, source })?;
        }
        Ok(())
    }

    /// Concatenates `other`, which must start where `self` ends, after
    /// `self`.
    ///
    /// Changes without transactions are identities and can be composed with
    /// any change. The selections of `self` are mapped through `other`, and
    /// the ones in `other` take precedence.
    pub fn compose(&self, other: &Change) -> Result<Change, ChangeError> {
        let end = self.start + self.len();

        if !self.transactions.is_empty()
            && !other.transactions.is_empty()
            && other.start != end
        {
            return Err(ChangeError::NotAdjacent {
                expected: end,
                actual: other.start,
            });
        }

        let start = if self.transactions.is_empty() {
            other.start
        } else {
            self.start
        };

        let mut selections = self
            .selections
            .iter()
            .map(|(&author, selection)| {
                (author, selection.translate_by_change(other, author))
            })
            .collect::<BTreeMap<_, _>>();

        selections.extend(other.selections.iter().map(|(&a, &s)| (a, s)));

        let transactions = self
            .transactions
            .iter()
            .chain(other.transactions.iter())
            .cloned()
            .collect();

        Ok(Change { start, transactions, selections })
    }

    /// Creates a change with no transactions and no selections starting at
    /// the given point in history.
    #[inline]
    pub fn empty(start: usize) -> Self {
        Self { start, transactions: Vec::new(), selections: BTreeMap::new() }
    }

    /// Returns the author of the first authored transaction, or failing that
    /// the first author with a selection.
    #[inline]
    pub fn first_author(&self) -> Option<AuthorId> {
        self.transactions
            .iter()
            .find_map(Transaction::author)
            .or_else(|| self.selections.keys().next().copied())
    }

    /// Decodes a change from its JSON wire format.
    ///
    /// Every transaction is checked to be well formed, so a malformed payload
    /// is rejected as a whole before it can reach any history.
    pub fn from_json(json: &str) -> Result<Self, ChangeError> {
        let change = serde_json::from_str::<Self>(json)?;
        change.check_well_formed()?;
        Ok(change)
    }

    /// Returns `true` if the change has neither transactions nor
    /// selections.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.selections.is_empty()
    }

    /// Returns the number of transactions in the change.
    ///
    /// This is a length in history units, not in document items.
    #[inline]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Returns the part of the change starting at the given point in
    /// history.
    ///
    /// The selections are kept since they describe the state at the end of
    /// the change.
    #[inline]
    pub fn most_recent(&self, start: usize) -> Self {
        let start = start.clamp(self.start, self.start + self.len());
        Self {
            start,
            transactions: self.transactions[start - self.start..].to_vec(),
            selections: self.selections.clone(),
        }
    }

    /// Creates a new change.
    #[inline]
    pub fn new(
        start: usize,
        transactions: Vec<Transaction>,
        selections: BTreeMap<AuthorId, Selection>,
    ) -> Self {
        Self { start, transactions, selections }
    }

    /// Rebases the local `uncommitted` change onto the `committed` change
    /// received from the server, where both start at the same point in
    /// history.
    ///
    /// Every uncommitted transaction is transformed through every committed
    /// one. Edits touching disjoint parts of the document are just shifted
    /// past each other. When two edits touch the same offset the one with the
    /// lower author id is placed first, and if the ids are equal or missing
    /// the committed one is. Edits with overlapping active ranges (e.g. an
    /// insertion inside text somebody else removed) conflict: the first
    /// uncommitted transaction that conflicts and all the ones after it are
    /// returned as [`rejected`](Rebase::rejected).
    ///
    /// If `committed` is just the server echoing the first part of
    /// `uncommitted` back, nothing is transformed.
    pub fn rebase_uncommitted_change(
        committed: &Change,
        uncommitted: &Change,
    ) -> Result<Rebase, ChangeError> {
        if committed.start != uncommitted.start {
            return Err(ChangeError::StartMismatch {
                committed: committed.start,
                uncommitted: uncommitted.start,
            });
        }

        if committed.is_echo_of(uncommitted) {
            tracing::trace!(
                start = committed.start,
                len = committed.len(),
                "committed change is an echo of uncommitted work"
            );

            let mut transposed_history =
                Change::empty(uncommitted.start + uncommitted.len());

            transposed_history.selections = committed
                .selections
                .iter()
                .filter(|(author, _)| {
                    !uncommitted.selections.contains_key(*author)
                })
                .map(|(&author, &selection)| (author, selection))
                .collect();

            let end = committed.start + committed.len();

            return Ok(Rebase {
                rebased: uncommitted.most_recent(end),
                rejected: None,
                transposed_history,
            });
        }

        let mut transactions_a = committed.transactions.clone();
        let mut transactions_b = uncommitted.transactions.clone();
        let mut selections_a = committed.selections.clone();
        let mut selections_b = uncommitted.selections.clone();
        let mut rejected = None;

        // Rebasing b onto a1, a2, .., an means rebasing it onto a1, then
        // rebasing the result onto a2, and so on. Each ai gets rebased onto b
        // along the way, and those become the transposed history the next b
        // is rebased onto.
        'uncommitted: for idx_b in 0..transactions_b.len() {
            let mut b = transactions_b[idx_b].clone();
            let mut next_a = transactions_a.clone();

            for a in next_a.iter_mut() {
                let rebased = if takes_priority(a.author(), b.author()) {
                    rebase_transactions(a, &b)
                } else {
                    rebase_transactions(&b, a).map(|(b, a)| (a, b))
                };

                let Some((rebased_a, rebased_b)) = rebased else {
                    tracing::debug!(
                        at = uncommitted.start + idx_b,
                        rejected = transactions_b.len() - idx_b,
                        "uncommitted transaction conflicts with history"
                    );
                    let from = uncommitted.start + idx_b;
                    rejected = Some(uncommitted.most_recent(from));
                    transactions_b.truncate(idx_b);
                    selections_b.clear();
                    break 'uncommitted;
                };

                *a = rebased_a;
                b = rebased_b;
            }

            transactions_a = next_a;
            transactions_b[idx_b] = b;
        }

        let mut rebased = Change::new(
            uncommitted.start + transactions_a.len(),
            transactions_b,
            BTreeMap::new(),
        );

        let mut transposed_history = Change::new(
            committed.start + rebased.len(),
            transactions_a,
            BTreeMap::new(),
        );

        for (author, selection) in selections_b {
            selections_a.remove(&author);
            let selection =
                selection.translate_by_change(&transposed_history, author);
            rebased.selections.insert(author, selection);
        }

        for (author, selection) in selections_a {
            let selection = selection.translate_by_change(&rebased, author);
            transposed_history.selections.insert(author, selection);
        }

        Ok(Rebase { rebased, rejected, transposed_history })
    }

    /// Removes the selection of the given author.
    #[inline]
    pub fn remove_selection(&mut self, author: AuthorId) -> Option<Selection> {
        self.selections.remove(&author)
    }

    /// Returns the change that undoes this one.
    ///
    /// It starts where this change ends, its transactions are the reversed
    /// transactions in reverse order, and it carries no selections.
    #[inline]
    pub fn reversed(&self) -> Self {
        Self {
            start: self.start + self.len(),
            transactions: self
                .transactions
                .iter()
                .rev()
                .map(Transaction::reversed)
                .collect(),
            selections: BTreeMap::new(),
        }
    }

    /// Returns the selections of the authors involved in the change.
    #[inline]
    pub fn selections(&self) -> &BTreeMap<AuthorId, Selection> {
        &self.selections
    }

    /// Sets the selection of the given author.
    #[inline]
    pub fn set_selection(&mut self, author: AuthorId, selection: Selection) {
        self.selections.insert(author, selection);
    }

    /// Returns the point in history where the change starts.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Encodes the change in its JSON wire format.
    #[inline]
    pub fn to_json(&self) -> Result<String, ChangeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the change's transactions.
    #[inline]
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Returns the first `len` transactions of the change.
    ///
    /// The selections are only kept if nothing is cut off.
    #[inline]
    pub fn truncate(&self, len: usize) -> Self {
        let len = len.min(self.len());
        Self {
            start: self.start,
            transactions: self.transactions[..len].to_vec(),
            selections: if len == self.len() {
                self.selections.clone()
            } else {
                BTreeMap::new()
            },
        }
    }

    #[inline]
    fn is_echo_of(&self, uncommitted: &Change) -> bool {
        !self.transactions.is_empty()
            && self.first_author().is_some()
            && self.first_author() == uncommitted.first_author()
            && uncommitted.transactions.starts_with(&self.transactions)
    }
}

/// Transforms two transactions that apply to the same document so that each
/// can be applied after the other.
///
/// Returns `(a', b')`, where `a'` is `a` rebased onto `b` and `b'` is `b`
/// rebased onto `a`, so that applying `a` then `b'` gives the same document
/// as applying `b` then `a'`. When both insert at the same offset `a` is
/// placed first.
///
/// Returns `None` if the parts of the document the two transactions change
/// overlap.
pub fn rebase_transactions(
    a: &Transaction,
    b: &Transaction,
) -> Option<(Transaction, Transaction)> {
    let mut rebased_a = a.clone();
    let mut rebased_b = b.clone();

    match (a.active_range(), b.active_range()) {
        (Some(range_a), Some(range_b)) => {
            if range_a.end <= range_b.start {
                rebased_b.adjust_retain(Edge::Start, range_a.diff);
                rebased_a.adjust_retain(Edge::End, range_b.diff);
            } else if range_b.end <= range_a.start {
                rebased_a.adjust_retain(Edge::Start, range_b.diff);
                rebased_b.adjust_retain(Edge::End, range_a.diff);
            } else {
                return None;
            }
        },

        // At least one of the two is a no-op, which only needs its length
        // adjusted.
        (range_a, range_b) => {
            let diff_a = range_a.map_or(0, |range| range.diff);
            let diff_b = range_b.map_or(0, |range| range.diff);
            rebased_a.adjust_retain(Edge::Start, diff_b);
            rebased_b.adjust_retain(Edge::Start, diff_a);
        },
    }

    Some((rebased_a, rebased_b))
}
