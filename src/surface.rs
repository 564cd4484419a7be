use std::collections::BTreeMap;
use std::sync::mpsc;
use std::time::Duration;

use unicode_segmentation::UnicodeSegmentation;
use web_time::Instant;

use crate::history::UndoStack;
use crate::*;

/// Tunables of a [`Surface`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct SurfaceOptions {
    /// The maximum number of batches that can be undone.
    pub max_undo_steps: usize,

    /// How long edits keep accumulating in the same batch before
    /// [`Surface::breakpoint_if_due`] closes it.
    #[serde(rename = "breakpoint_interval_ms", deserialize_with = "millis")]
    pub breakpoint_interval: Duration,
}

impl Default for SurfaceOptions {
    #[inline]
    fn default() -> Self {
        Self {
            max_undo_steps: 100,
            breakpoint_interval: Duration::from_millis(750),
        }
    }
}

#[inline]
fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <u64 as serde::Deserialize>::deserialize(deserializer)
        .map(Duration::from_millis)
}

/// A notification sent to the receivers returned by [`Surface::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The document's items changed.
    DocumentChanged,

    /// The local selection changed.
    SelectionChanged(Selection),

    /// What can be undone or redone changed.
    HistoryChanged,
}

/// The editing state of one user: a document, their selection and their
/// undo/redo history.
///
/// Every transaction applied to the document, whether it comes from a local
/// edit, an undo, a redo or a collaborator, is appended to the complete
/// history returned by [`history`](Self::history). That's what a
/// [`RebaseClient`](crate::RebaseClient) reads from and rewrites through the
/// [`ChangeHost`] implementation.
///
/// Local edits are also recorded in the undo stacks. They accumulate in the
/// current batch until a [breakpoint](Self::breakpoint) closes it, and
/// [`undo`](Self::undo) and [`redo`](Self::redo) work on whole batches.
#[derive(Debug)]
pub struct Surface {
    author: AuthorId,
    document: LinearDocument,
    selection: Selection,
    history: Vec<Transaction>,
    author_selections: BTreeMap<AuthorId, Selection>,
    submitted_selection: Selection,
    undo_stack: UndoStack,
    options: SurfaceOptions,
    last_breakpoint: Instant,
    insertion_annotations: Vec<AnnotationHash>,
    annotations_in_progress: bool,
    subscribers: Vec<mpsc::Sender<SurfaceEvent>>,
}

impl Surface {
    /// Returns the author id of the local user.
    #[inline]
    pub fn author(&self) -> AuthorId {
        self.author
    }

    /// Returns the last known selections of the other authors editing the
    /// document.
    #[inline]
    pub fn author_selections(&self) -> &BTreeMap<AuthorId, Selection> {
        &self.author_selections
    }

    /// Returns the closed batches of the undo history, oldest first.
    #[inline]
    pub fn big_stack(&self) -> &[HistoryEntry] {
        self.undo_stack.big()
    }

    /// Closes the current batch of edits, making it a single undo step.
    ///
    /// Returns `false` if there was nothing to close.
    pub fn breakpoint(&mut self) -> bool {
        let closed = self.undo_stack.breakpoint(self.selection);
        if closed {
            tracing::trace!(steps = self.big_stack().len(), "breakpoint");
            self.emit(SurfaceEvent::HistoryChanged);
        }
        closed
    }

    /// Calls [`breakpoint`](Self::breakpoint) if the configured interval
    /// has passed since the last time this did.
    pub fn breakpoint_if_due(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_breakpoint);
        if elapsed < self.options.breakpoint_interval {
            return false;
        }
        self.last_breakpoint = now;
        self.breakpoint()
    }

    /// Returns `true` if there's something to redo.
    #[inline]
    pub fn can_redo(&self) -> bool {
        self.undo_stack.can_redo()
    }

    /// Returns `true` if there's something to undo.
    #[inline]
    pub fn can_undo(&self) -> bool {
        self.undo_stack.can_undo()
    }

    /// Applies local edits and/or moves the selection.
    ///
    /// Transactions without an author are attributed to the local user. If
    /// `selection` is `None` the current selection is mapped through the
    /// transactions.
    ///
    /// A change that only moves the selection stops any insertion
    /// annotations toggled with
    /// [`toggle_insertion_annotation`](Self::toggle_insertion_annotation)
    /// and picks them up again from the text before the cursor.
    ///
    /// # Errors
    ///
    /// Fails if any of the transactions doesn't apply to the document, in
    /// which case none of them are applied and the selection isn't moved.
    pub fn change<I>(
        &mut self,
        transactions: I,
        selection: Option<Selection>,
    ) -> Result<(), TransactionError>
    where
        I: IntoIterator<Item = Transaction>,
    {
        let transactions = transactions
            .into_iter()
            .map(|mut tx| {
                if tx.author().is_none() {
                    tx.set_author(Some(self.author));
                }
                tx
            })
            .collect::<Vec<_>>();

        TransactionProcessor::commit_all(&mut self.document, &transactions)?;

        let previous = self.selection;
        let edited = !transactions.is_empty();

        for tx in transactions {
            self.translate_selections(&tx);
            self.history.push(tx.clone());
            self.undo_stack.push(tx);
        }

        if edited {
            self.emit(SurfaceEvent::DocumentChanged);
            self.emit(SurfaceEvent::HistoryChanged);
        } else {
            self.annotations_in_progress = false;
        }

        self.select(previous, selection);

        Ok(())
    }

    /// Returns the document.
    #[inline]
    pub fn document(&self) -> &LinearDocument {
        &self.document
    }

    /// Returns the complete history of transactions applied to the
    /// document.
    #[inline]
    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    /// Replaces the selected items with the graphemes of `text`, annotated
    /// with the current [insertion
    /// annotations](Self::insertion_annotations), and moves the cursor
    /// after them.
    ///
    /// Does nothing if nothing is selected.
    pub fn insert_text(&mut self, text: &str) -> Result<(), TransactionError> {
        let Some(range) = self.selection.range() else {
            return Ok(());
        };

        let items = text
            .graphemes(true)
            .map(|g| Item::annotated(g, self.insertion_annotations.clone()))
            .collect::<Vec<_>>();

        let cursor = range.start() + items.len();

        let tx =
            Transaction::replacement(&self.document, range.to_std(), items);

        self.change([tx], Some(Selection::cursor(cursor)))
    }

    /// Returns the annotations given to newly typed text.
    #[inline]
    pub fn insertion_annotations(&self) -> &[AnnotationHash] {
        &self.insertion_annotations
    }

    /// Creates a new surface editing `document` on behalf of `author`.
    ///
    /// # Errors
    ///
    /// Fails if the document isn't well structured according to `registry`.
    pub fn new(
        document: LinearDocument,
        registry: &ModelRegistry,
        author: impl Into<AuthorId>,
        options: SurfaceOptions,
    ) -> Result<Self, DocumentError> {
        document.check_structure(registry)?;

        Ok(Self {
            author: author.into(),
            document,
            selection: Selection::Null,
            history: Vec::new(),
            author_selections: BTreeMap::new(),
            submitted_selection: Selection::Null,
            undo_stack: UndoStack::new(options.max_undo_steps),
            options,
            last_breakpoint: Instant::now(),
            insertion_annotations: Vec::new(),
            annotations_in_progress: false,
            subscribers: Vec::new(),
        })
    }

    /// Returns the options the surface was created with.
    #[inline]
    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    /// Redoes up to `steps` batches, returning the selection at the end of
    /// the last one, or `None` if there was nothing to redo.
    ///
    /// # Errors
    ///
    /// Fails if the batches don't apply to the document anymore, in which
    /// case nothing is redone.
    pub fn redo(
        &mut self,
        steps: usize,
    ) -> Result<Option<Selection>, TransactionError> {
        let mut transactions = Vec::new();
        let mut restored = None;
        let mut redone = 0;

        for entry in self.undo_stack.to_redo(steps) {
            transactions.extend(entry.transactions().iter().cloned());
            restored = Some(entry.selection());
            redone += 1;
        }

        self.apply_history_transactions(transactions)?;
        self.undo_stack.redone(redone);

        self.finish_history_walk(restored, "redo");

        Ok(restored)
    }

    /// Returns the local selection.
    #[inline]
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Moves the local selection.
    ///
    /// This is the same as a [`change`](Self::change) without transactions.
    #[inline]
    pub fn set_selection(&mut self, selection: Selection) {
        self.annotations_in_progress = false;
        self.select(self.selection, Some(selection));
    }

    /// Returns the transactions of the batch that hasn't been closed yet.
    #[inline]
    pub fn small_stack(&self) -> &[Transaction] {
        self.undo_stack.small()
    }

    /// Returns a receiver for the surface's notifications.
    ///
    /// Dropping the receiver unsubscribes it.
    #[inline]
    pub fn subscribe(&mut self) -> mpsc::Receiver<SurfaceEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    /// Adds `annotation` to the insertion annotations, or removes it if it's
    /// already there.
    ///
    /// The insertion annotations then stay as they are until the selection
    /// is moved.
    pub fn toggle_insertion_annotation(&mut self, annotation: AnnotationHash) {
        let existing =
            self.insertion_annotations.iter().position(|h| *h == annotation);

        match existing {
            Some(idx) => {
                self.insertion_annotations.remove(idx);
            },
            None => {
                self.insertion_annotations.push(annotation);
            },
        }
        self.annotations_in_progress = true;
    }

    /// Undoes up to `steps` batches, after closing the current one.
    ///
    /// Returns the selection to restore, i.e. the selection at the end of
    /// the last undone batch mapped back through its transactions, or
    /// `None` if there was nothing to undo.
    ///
    /// # Errors
    ///
    /// Fails if the batches can't be reverted on the document, in which case
    /// nothing is undone.
    pub fn undo(
        &mut self,
        steps: usize,
    ) -> Result<Option<Selection>, TransactionError> {
        self.breakpoint();

        let mut inverses = Vec::new();
        let mut restored = None;
        let mut undone = 0;

        for entry in self.undo_stack.to_undo(steps) {
            let mut selection = entry.selection();

            for tx in entry.transactions().iter().rev() {
                let inverse = tx.reversed();
                selection = selection.translate_by_transaction(&inverse, false);
                inverses.push(inverse);
            }

            restored = Some(selection);
            undone += 1;
        }

        self.apply_history_transactions(inverses)?;
        self.undo_stack.undone(undone);

        self.finish_history_walk(restored, "undo");

        Ok(restored)
    }

    /// Returns the number of batches that have been undone and can be
    /// redone.
    #[inline]
    pub fn undo_index(&self) -> usize {
        self.undo_stack.undo_index()
    }

    #[inline]
    fn annotations_before_cursor(&self) -> Vec<AnnotationHash> {
        match self.selection.range() {
            Some(range) if range.start() > 0 => {
                self.document.annotations_at(range.start() - 1).to_vec()
            },
            _ => Vec::new(),
        }
    }

    /// Commits the transactions produced by undo or redo. They go into the
    /// complete history so collaborators get them, but not in the undo
    /// stacks.
    #[inline]
    fn apply_history_transactions(
        &mut self,
        transactions: Vec<Transaction>,
    ) -> Result<(), TransactionError> {
        TransactionProcessor::commit_all(&mut self.document, &transactions)?;
        for tx in transactions {
            self.translate_selections(&tx);
            self.history.push(tx);
        }
        Ok(())
    }

    /// Checks that `change` ends at the end of history.
    #[inline]
    fn check_tail(&self, change: &Change) -> Result<(), ClientError> {
        let end = change.start() + change.len();

        if end != self.history.len() {
            return Err(ClientError::HistoryMismatch {
                expected: self.history.len(),
                actual: end,
            });
        }

        Ok(())
    }

    #[inline]
    fn emit(&mut self, event: SurfaceEvent) {
        self.subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn finish_history_walk(&mut self, restored: Option<Selection>, op: &str) {
        let Some(selection) = restored else {
            return;
        };

        tracing::debug!(
            op,
            undo_index = self.undo_stack.undo_index(),
            "walked history"
        );

        self.selection = selection.normalize(self.document.len());
        self.annotations_in_progress = false;
        self.insertion_annotations = self.annotations_before_cursor();

        self.emit(SurfaceEvent::DocumentChanged);
        self.emit(SurfaceEvent::SelectionChanged(self.selection));
        self.emit(SurfaceEvent::HistoryChanged);
    }

    /// Settles the selection after an edit, `previous` being the one before
    /// it.
    fn select(&mut self, previous: Selection, selection: Option<Selection>) {
        if let Some(selection) = selection {
            self.selection = selection.normalize(self.document.len());
        }

        if self.selection != previous {
            self.emit(SurfaceEvent::SelectionChanged(self.selection));
        }

        if !self.annotations_in_progress {
            self.insertion_annotations = self.annotations_before_cursor();
        }
    }

    /// Maps every known selection through a transaction just applied to the
    /// document.
    #[inline]
    fn translate_selections(&mut self, tx: &Transaction) {
        let own = tx.author() == Some(self.author);

        self.selection = self.selection.translate_by_transaction(tx, !own);

        for (&author, selection) in self.author_selections.iter_mut() {
            let exclude_insertion = tx.author() != Some(author);
            *selection =
                selection.translate_by_transaction(tx, exclude_insertion);
        }
    }
}

impl ChangeHost for Surface {
    fn change_since(&mut self, start: usize, mark_sent: bool) -> Change {
        let start = start.min(self.history.len());

        let mut selections = BTreeMap::new();
        if self.selection != self.submitted_selection {
            selections.insert(self.author, self.selection);
        }

        if mark_sent {
            self.submitted_selection = self.selection;
        }

        Change::new(start, self.history[start..].to_vec(), selections)
    }

    fn apply_change(&mut self, change: &Change) -> Result<(), ClientError> {
        TransactionProcessor::commit_all(
            &mut self.document,
            change.transactions(),
        )?;

        let previous = self.selection;

        for tx in change.transactions() {
            self.translate_selections(tx);
            self.undo_stack.rebase_over(tx);
            self.history.push(tx.clone());
        }

        let len = self.document.len();

        for (&author, &selection) in change.selections() {
            if author != self.author {
                self.author_selections.insert(author, selection.normalize(len));
            }
        }

        if !change.transactions().is_empty() {
            if !self.annotations_in_progress {
                self.insertion_annotations = self.annotations_before_cursor();
            }
            self.emit(SurfaceEvent::DocumentChanged);
            self.emit(SurfaceEvent::HistoryChanged);
        }

        if self.selection != previous {
            self.emit(SurfaceEvent::SelectionChanged(self.selection));
        }

        Ok(())
    }

    fn check_replacement(
        &self,
        tail: &Change,
        change: &Change,
    ) -> Result<(), ClientError> {
        self.check_tail(tail)?;

        let mut scratch = self.document.clone();
        for tx in tail.reversed().transactions() {
            TransactionProcessor::commit(&mut scratch, tx)?;
        }
        for tx in change.transactions() {
            TransactionProcessor::commit(&mut scratch, tx)?;
        }

        Ok(())
    }

    fn unapply_change(&mut self, change: &Change) -> Result<(), ClientError> {
        self.check_tail(change)?;

        let reversed = change.reversed();
        TransactionProcessor::commit_all(
            &mut self.document,
            reversed.transactions(),
        )?;

        for (tx, inverse) in
            change.transactions().iter().rev().zip(reversed.transactions())
        {
            self.translate_selections(inverse);
            if !self.undo_stack.pop_applied(tx) {
                self.undo_stack.rebase_over(inverse);
            }
            self.history.pop();
        }

        if !change.transactions().is_empty() {
            self.emit(SurfaceEvent::DocumentChanged);
            self.emit(SurfaceEvent::HistoryChanged);
        }

        Ok(())
    }

    fn add_to_history(&mut self, change: &Change) -> Result<(), ClientError> {
        if change.start() != self.history.len() {
            return Err(ClientError::UnexpectedStart {
                expected: self.history.len(),
                actual: change.start(),
            });
        }
        self.history.extend(change.transactions().iter().cloned());
        Ok(())
    }

    fn remove_from_history(
        &mut self,
        change: &Change,
    ) -> Result<(), ClientError> {
        self.check_tail(change)?;
        self.history.truncate(change.start());
        Ok(())
    }
}
