use crate::*;

/// A span of a document between two offsets.
///
/// The direction is preserved: `from` is where the selection was started
/// and `to` is where it ends up, so `from` can be greater than `to`.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Range {
    /// Where the range was anchored.
    pub from: usize,

    /// Where the range extends to.
    pub to: usize,
}

impl core::fmt::Debug for Range {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{:?}..{:?}", self.from, self.to)
    }
}

impl From<core::ops::Range<usize>> for Range {
    #[inline]
    fn from(range: core::ops::Range<usize>) -> Self {
        Range { from: range.start, to: range.end }
    }
}

impl Range {
    /// Clamps both ends of the range to a document of the given length.
    #[inline]
    pub fn clamp(self, len: usize) -> Self {
        Range { from: self.from.min(len), to: self.to.min(len) }
    }

    /// Creates an empty range at the given offset.
    #[inline]
    pub fn collapsed(offset: usize) -> Self {
        Range { from: offset, to: offset }
    }

    /// Returns the greater of the two ends.
    #[inline]
    pub fn end(&self) -> usize {
        self.from.max(self.to)
    }

    /// Returns `true` if `to` comes before `from`.
    #[inline]
    pub fn is_backwards(&self) -> bool {
        self.to < self.from
    }

    /// Returns `true` if the range is empty.
    #[inline]
    pub fn is_collapsed(&self) -> bool {
        self.from == self.to
    }

    /// Returns the number of items covered by the range.
    #[inline]
    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    /// Creates a new range.
    #[inline]
    pub fn new(from: usize, to: usize) -> Self {
        Range { from, to }
    }

    /// Returns the lesser of the two ends.
    #[inline]
    pub fn start(&self) -> usize {
        self.from.min(self.to)
    }

    /// Returns the range as a standard library range, from start to end.
    #[inline]
    pub fn to_std(&self) -> core::ops::Range<usize> {
        self.start()..self.end()
    }

    /// Maps the range through a transaction.
    ///
    /// See [`Transaction::translate_offset`] for how `exclude_insertion`
    /// is used.
    #[inline]
    pub fn translate(self, tx: &Transaction, exclude_insertion: bool) -> Self {
        Range {
            from: tx.translate_offset(self.from, exclude_insertion),
            to: tx.translate_offset(self.to, exclude_insertion),
        }
    }
}

/// What a user has selected in a document.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Selection {
    /// Nothing is selected, e.g. because the editor doesn't have focus.
    #[default]
    Null,

    /// A (possibly collapsed) range of the linear document.
    Linear(Range),
}

impl From<Range> for Selection {
    #[inline]
    fn from(range: Range) -> Self {
        Selection::Linear(range)
    }
}

impl Selection {
    /// Creates a collapsed selection, i.e. a cursor, at the given offset.
    #[inline]
    pub fn cursor(offset: usize) -> Self {
        Selection::Linear(Range::collapsed(offset))
    }

    /// Returns `true` if nothing is selected.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Selection::Null)
    }

    /// Creates a selection from `from` to `to`.
    #[inline]
    pub fn linear(from: usize, to: usize) -> Self {
        Selection::Linear(Range::new(from, to))
    }

    /// Clamps the selection to a document of the given length.
    #[inline]
    pub fn normalize(self, len: usize) -> Self {
        match self {
            Selection::Null => Selection::Null,
            Selection::Linear(range) => Selection::Linear(range.clamp(len)),
        }
    }

    /// Returns the selected range, if any.
    #[inline]
    pub fn range(&self) -> Option<Range> {
        match self {
            Selection::Null => None,
            Selection::Linear(range) => Some(*range),
        }
    }

    /// Maps the selection through every transaction of a change.
    ///
    /// Insertions made by `author` itself push the selection forward, the
    /// ones made by anybody else don't.
    pub fn translate_by_change(
        self,
        change: &Change,
        author: AuthorId,
    ) -> Self {
        change.transactions().iter().fold(self, |selection, tx| {
            let exclude_insertion = tx.author() != Some(author);
            selection.translate_by_transaction(tx, exclude_insertion)
        })
    }

    /// Maps the selection through a transaction.
    #[inline]
    pub fn translate_by_transaction(
        self,
        tx: &Transaction,
        exclude_insertion: bool,
    ) -> Self {
        match self {
            Selection::Null => Selection::Null,
            Selection::Linear(range) => {
                Selection::Linear(range.translate(tx, exclude_insertion))
            },
        }
    }
}
