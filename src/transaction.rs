use std::collections::HashMap;
use std::ops::Range;

use serde_json::Value;

use crate::*;

/// An atomic, invertible edit of a [`LinearDocument`].
///
/// A transaction is an ordered list of [`Operation`]s whose input lengths sum
/// to the length of the document it was built for. It never changes after
/// it's created: rebasing and inverting produce new transactions.
///
/// A transaction with no operations at all is the identity on every
/// document.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct Transaction {
    operations: Vec<Operation>,

    #[serde(rename = "authorId", default)]
    author: Option<AuthorId>,
}

/// The span of a transaction that actually changes something, in the
/// coordinates of the document the transaction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveRange {
    /// The offset of the first change.
    pub start: usize,

    /// The offset just after the last change.
    pub end: usize,

    /// The transaction's length difference.
    pub diff: isize,
}

/// Which retain of a transaction [`Transaction::adjust_retain`] grows or
/// shrinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    Start,
    End,
}

impl Transaction {
    /// Returns the span this transaction changes, or `None` if it only
    /// retains.
    ///
    /// An attribute change counts as changing the open marker it applies
    /// to.
    pub fn active_range(&self) -> Option<ActiveRange> {
        let mut offset = 0;
        let mut diff = 0isize;
        let mut range: Option<(usize, usize)> = None;

        for op in &self.operations {
            let start = offset;

            match op {
                Operation::Retain { length } => {
                    offset += length;
                    continue;
                },
                Operation::Replace { remove, insert } => {
                    offset += remove.len();
                    diff += insert.len() as isize - remove.len() as isize;
                },
                Operation::Annotate { .. } => {},
                Operation::Attribute { .. } => {},
            }

            let end = match op {
                Operation::Attribute { .. } => offset + 1,
                _ => offset,
            };

            range = Some(match range {
                Some((first, last)) => (first, last.max(end)),
                None => (start, end),
            });
        }

        range.map(|(start, end)| ActiveRange { start, end, diff })
    }

    /// Grows (or shrinks, if `diff` is negative) the first or last retain of
    /// the transaction, adding one if there isn't one.
    ///
    /// This is how a transaction is moved past another one that doesn't
    /// overlap with it.
    pub(crate) fn adjust_retain(&mut self, edge: Edge, diff: isize) {
        if diff == 0 || self.operations.is_empty() {
            return;
        }

        let idx = match edge {
            Edge::Start => 0,
            Edge::End => self.operations.len() - 1,
        };

        if let Operation::Retain { length } = &mut self.operations[idx] {
            let new_length = *length as isize + diff;
            debug_assert!(new_length >= 0);
            if new_length > 0 {
                *length = new_length as usize;
            } else {
                self.operations.remove(idx);
            }
            return;
        }

        debug_assert!(diff > 0, "no retain to shrink by {diff}");

        if diff > 0 {
            let retain = Operation::Retain { length: diff as usize };
            match edge {
                Edge::Start => self.operations.insert(0, retain),
                Edge::End => self.operations.push(retain),
            }
        }
    }

    /// Creates a transaction that sets or clears an annotation over a range
    /// of `doc`.
    ///
    /// Structural items and text that already is in the requested state are
    /// left out of the annotated spans, so the resulting transaction always
    /// applies cleanly to `doc`.
    pub fn annotation(
        doc: &LinearDocument,
        range: Range<usize>,
        method: AnnotationMethod,
        annotation: AnnotationHash,
    ) -> Self {
        let len = doc.len();
        let start = range.start.min(len);
        let end = range.end.clamp(start, len);

        let mut ops = Vec::new();
        ops.push(Operation::Retain { length: start });

        let mut annotating = false;

        for item in doc.data_in(start..end) {
            let applies = item.is_text()
                && match method {
                    AnnotationMethod::Set => !item.has_annotation(&annotation),
                    AnnotationMethod::Clear => item.has_annotation(&annotation),
                };

            if applies != annotating {
                let bias = if applies {
                    AnnotationBias::Start
                } else {
                    AnnotationBias::End
                };
                ops.push(Operation::Annotate {
                    method,
                    bias,
                    annotation: annotation.clone(),
                });
                annotating = applies;
            }

            ops.push(Operation::Retain { length: 1 });
        }

        if annotating {
            ops.push(Operation::Annotate {
                method,
                bias: AnnotationBias::End,
                annotation,
            });
        }

        ops.push(Operation::Retain { length: len - end });

        Self::from_operations(ops)
    }

    /// Creates a transaction that changes an attribute of the element whose
    /// open marker is at `offset`. `None` and `null` both remove it.
    pub fn attribute_change<K: Into<String>>(
        doc: &LinearDocument,
        offset: usize,
        key: K,
        to: Option<Value>,
    ) -> Result<Self, TransactionError> {
        let key = key.into();

        let element = doc
            .data()
            .get(offset)
            .and_then(Item::element)
            .ok_or(TransactionError::NotAnElement { offset })?;

        let from = element.attribute(&key).cloned();
        let to = to.filter(|value| !value.is_null());

        Ok(Self::from_operations([
            Operation::Retain { length: offset },
            Operation::Attribute { key, from, to },
            Operation::Retain { length: doc.len() - offset },
        ]))
    }

    /// Returns the author of the transaction, if any.
    #[inline]
    pub fn author(&self) -> Option<AuthorId> {
        self.author
    }

    /// Checks that every annotated span is opened and closed exactly once.
    ///
    /// This only looks at the transaction itself; whether it fits a given
    /// document is checked when it's committed.
    pub fn check_well_formed(&self) -> Result<(), TransactionError> {
        let mut open = HashMap::<&AnnotationHash, AnnotationMethod>::new();

        for op in &self.operations {
            let Operation::Annotate { method, bias, annotation } = op else {
                continue;
            };

            let balanced = match bias {
                AnnotationBias::Start => {
                    open.insert(annotation, *method).is_none()
                },
                AnnotationBias::End => {
                    open.remove(annotation) == Some(*method)
                },
            };

            if !balanced {
                return Err(TransactionError::UnbalancedAnnotation {
                    annotation: annotation.clone(),
                });
            }
        }

        match open.into_keys().next() {
            Some(annotation) => Err(TransactionError::UnbalancedAnnotation {
                annotation: annotation.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Creates a transaction from a list of operations.
    ///
    /// Adjacent retains are merged, while empty retains and empty
    /// replacements are dropped.
    pub fn from_operations<I>(ops: I) -> Self
    where
        I: IntoIterator<Item = Operation>,
    {
        let mut operations = Vec::<Operation>::new();

        for op in ops {
            match op {
                Operation::Retain { length: 0 } => {},

                Operation::Retain { length } => {
                    if let Some(Operation::Retain { length: last }) =
                        operations.last_mut()
                    {
                        *last += length;
                    } else {
                        operations.push(Operation::Retain { length });
                    }
                },

                Operation::Replace { remove, insert }
                    if remove.is_empty() && insert.is_empty() => {},

                op => operations.push(op),
            }
        }

        Self { operations, author: None }
    }

    /// Returns the number of items of the document this transaction applies
    /// to.
    #[inline]
    pub fn input_length(&self) -> usize {
        self.operations.iter().map(Operation::input_length).sum()
    }

    /// Creates a transaction inserting `items` at `offset` in `doc`.
    ///
    /// The offset is clamped to the document's length.
    pub fn insertion<I>(doc: &LinearDocument, offset: usize, items: I) -> Self
    where
        I: IntoIterator<Item = Item>,
    {
        let len = doc.len();
        let offset = offset.min(len);
        Self::from_operations([
            Operation::Retain { length: offset },
            Operation::Replace {
                remove: Vec::new(),
                insert: items.into_iter().collect(),
            },
            Operation::Retain { length: len - offset },
        ])
    }

    /// Returns `true` if the transaction doesn't change the document.
    #[inline]
    pub fn is_no_op(&self) -> bool {
        self.operations.iter().all(Operation::is_retain)
    }

    /// Returns the difference between the lengths of the document after and
    /// before applying the transaction.
    #[inline]
    pub fn length_difference(&self) -> isize {
        self.output_length() as isize - self.input_length() as isize
    }

    /// Returns the transaction's operations.
    #[inline]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns the number of items of the document after the transaction is
    /// applied.
    #[inline]
    pub fn output_length(&self) -> usize {
        self.operations.iter().map(Operation::output_length).sum()
    }

    /// Creates a transaction removing the items in `range` from `doc`.
    ///
    /// The range is clamped to the document's length.
    #[inline]
    pub fn removal(doc: &LinearDocument, range: Range<usize>) -> Self {
        Self::replacement(doc, range, Vec::new())
    }

    /// Creates a transaction replacing the items in `range` with `items`.
    ///
    /// The range is clamped to the document's length.
    pub fn replacement<I>(
        doc: &LinearDocument,
        range: Range<usize>,
        items: I,
    ) -> Self
    where
        I: IntoIterator<Item = Item>,
    {
        let len = doc.len();
        let start = range.start.min(len);
        let end = range.end.clamp(start, len);
        Self::from_operations([
            Operation::Retain { length: start },
            Operation::Replace {
                remove: doc.slice(start..end),
                insert: items.into_iter().collect(),
            },
            Operation::Retain { length: len - end },
        ])
    }

    /// Returns the transaction that undoes this one.
    ///
    /// Replacements swap what they remove and insert, annotations swap
    /// setting and clearing, and attribute changes swap their values. The
    /// author is preserved.
    #[inline]
    pub fn reversed(&self) -> Self {
        Self {
            operations: self
                .operations
                .iter()
                .map(Operation::reversed)
                .collect(),
            author: self.author,
        }
    }

    /// Sets the author of the transaction.
    #[inline]
    pub fn set_author(&mut self, author: Option<AuthorId>) {
        self.author = author;
    }

    /// Maps an offset in the document before the transaction to the
    /// corresponding offset after it.
    ///
    /// An offset right where something is inserted ends up after the
    /// insertion, unless `exclude_insertion` is set. An offset inside a
    /// removed span collapses to the start of the replacement (or to its end
    /// if `exclude_insertion` is not set).
    pub fn translate_offset(
        &self,
        offset: usize,
        exclude_insertion: bool,
    ) -> usize {
        let mut cursor = 0;
        let mut adjustment = 0isize;

        let shift =
            |offset: usize, by: isize| (offset as isize + by).max(0) as usize;

        for op in &self.operations {
            match op {
                Operation::Retain { length } => {
                    if offset < cursor + length {
                        return shift(offset, adjustment);
                    }
                    cursor += length;
                },

                Operation::Replace { remove, insert } => {
                    let removed = remove.len();
                    let inserted = insert.len();

                    if offset < cursor {
                        return shift(offset, adjustment);
                    }

                    if offset == cursor && (removed > 0 || exclude_insertion) {
                        return shift(cursor, adjustment);
                    }

                    if offset == cursor || offset < cursor + removed {
                        let past = if exclude_insertion { 0 } else { inserted };
                        return shift(cursor, adjustment) + past;
                    }

                    adjustment += inserted as isize - removed as isize;
                    cursor += removed;
                },

                _ => {},
            }
        }

        shift(offset, adjustment)
    }

    /// Sets the author of the transaction, returning the updated
    /// transaction.
    #[inline]
    pub fn with_author(mut self, author: impl Into<AuthorId>) -> Self {
        self.author = Some(author.into());
        self
    }
}
