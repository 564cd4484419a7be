use crate::*;

/// Applies [`Transaction`]s to [`LinearDocument`]s.
///
/// Every transaction is checked against the document before anything is
/// mutated, so a transaction that doesn't fit leaves the document exactly as
/// it was. Once the checks pass applying it cannot fail.
pub struct TransactionProcessor;

impl TransactionProcessor {
    /// Mutates `doc` by applying `tx` to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the operations don't span the whole document, if
    /// a replacement removes items that aren't there, if an attribute change
    /// doesn't find the expected value, or if an annotation is set on text
    /// which already has it (or cleared from text which doesn't).
    pub fn commit(
        doc: &mut LinearDocument,
        tx: &Transaction,
    ) -> Result<(), TransactionError> {
        Self::check(doc, tx)?;

        tracing::trace!(
            operations = tx.operations().len(),
            diff = tx.length_difference(),
            "committing transaction"
        );

        Self::apply(doc, tx);
        Ok(())
    }

    /// Commits every transaction in order, or none of them.
    ///
    /// The transactions are applied to a copy of `doc` that replaces it
    /// once they all went through.
    pub fn commit_all<'a, I>(
        doc: &mut LinearDocument,
        transactions: I,
    ) -> Result<(), TransactionError>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut transactions = transactions.into_iter().peekable();

        let Some(first) = transactions.next() else {
            return Ok(());
        };

        if transactions.peek().is_none() {
            return Self::commit(doc, first);
        }

        let mut scratch = doc.clone();
        Self::commit(&mut scratch, first)?;
        for tx in transactions {
            Self::commit(&mut scratch, tx)?;
        }

        *doc = scratch;
        Ok(())
    }

    /// Undoes `tx`, which must be the last transaction committed to `doc`.
    ///
    /// This commits the [reversed](Transaction::reversed) transaction, so a
    /// commit followed by a rollback restores the exact same items.
    #[inline]
    pub fn rollback(
        doc: &mut LinearDocument,
        tx: &Transaction,
    ) -> Result<(), TransactionError> {
        Self::commit(doc, &tx.reversed())
    }

    fn check(
        doc: &LinearDocument,
        tx: &Transaction,
    ) -> Result<(), TransactionError> {
        if tx.operations().is_empty() {
            return Ok(());
        }

        let input_length = tx.input_length();

        if input_length != doc.len() {
            return Err(TransactionError::LengthMismatch {
                expected: doc.len(),
                actual: input_length,
            });
        }

        tx.check_well_formed()?;

        let items = doc.data();
        let mut cursor = 0;
        let mut annotating = Vec::<(AnnotationMethod, &AnnotationHash)>::new();

        for op in tx.operations() {
            match op {
                Operation::Retain { length } => {
                    if !annotating.is_empty() {
                        let retained = &items[cursor..cursor + length];
                        for (idx, item) in retained.iter().enumerate() {
                            check_annotations(item, cursor + idx, &annotating)?;
                        }
                    }
                    cursor += length;
                },

                Operation::Replace { remove, .. } => {
                    let end = cursor + remove.len();
                    if items[cursor..end] != remove[..] {
                        return Err(TransactionError::RemovalMismatch {
                            offset: cursor,
                        });
                    }
                    cursor = end;
                },

                Operation::Annotate { method, bias, annotation } => {
                    match bias {
                        AnnotationBias::Start => {
                            annotating.push((*method, annotation))
                        },
                        AnnotationBias::End => {
                            annotating.retain(|(_, hash)| *hash != annotation)
                        },
                    }
                },

                Operation::Attribute { key, from, .. } => {
                    let element = items
                        .get(cursor)
                        .and_then(Item::element)
                        .ok_or(TransactionError::NotAnElement {
                            offset: cursor,
                        })?;

                    if element.attribute(key) != from.as_ref() {
                        return Err(TransactionError::AttributeMismatch {
                            offset: cursor,
                            key: key.clone(),
                        });
                    }
                },
            }
        }

        Ok(())
    }

    fn apply(doc: &mut LinearDocument, tx: &Transaction) {
        let mut cursor = 0;
        let mut annotating = Vec::<(AnnotationMethod, &AnnotationHash)>::new();

        for op in tx.operations() {
            match op {
                Operation::Retain { length } => {
                    if !annotating.is_empty() {
                        for offset in cursor..cursor + length {
                            let Some(item) = doc.item_mut(offset) else {
                                break;
                            };
                            for &(method, hash) in &annotating {
                                match method {
                                    AnnotationMethod::Set => {
                                        item.set_annotation(hash)
                                    },
                                    AnnotationMethod::Clear => {
                                        item.clear_annotation(hash)
                                    },
                                };
                            }
                        }
                    }
                    cursor += length;
                },

                Operation::Replace { remove, insert } => {
                    doc.splice(cursor, remove.len(), insert.iter().cloned());
                    cursor += insert.len();
                },

                Operation::Annotate { method, bias, annotation } => {
                    match bias {
                        AnnotationBias::Start => {
                            annotating.push((*method, annotation))
                        },
                        AnnotationBias::End => {
                            annotating.retain(|(_, hash)| *hash != annotation)
                        },
                    }
                },

                Operation::Attribute { key, to, .. } => {
                    if let Some(element) =
                        doc.item_mut(cursor).and_then(Item::element_mut)
                    {
                        element.set_attribute(key, to.clone());
                    }
                },
            }
        }
    }
}

/// Checks that the annotations being set or cleared over a retained item
/// can be applied to it. Structural items are skipped.
#[inline]
fn check_annotations(
    item: &Item,
    offset: usize,
    annotating: &[(AnnotationMethod, &AnnotationHash)],
) -> Result<(), TransactionError> {
    if !item.is_text() {
        return Ok(());
    }

    for &(method, hash) in annotating {
        let is_set = item.has_annotation(hash);

        match method {
            AnnotationMethod::Set if is_set => {
                return Err(TransactionError::AnnotationAlreadySet {
                    offset,
                    annotation: hash.clone(),
                })
            },
            AnnotationMethod::Clear if !is_set => {
                return Err(TransactionError::AnnotationNotSet {
                    offset,
                    annotation: hash.clone(),
                })
            },
            _ => {},
        }
    }

    Ok(())
}
