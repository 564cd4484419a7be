use std::ops::Range;

use crate::*;

/// A document as a flat sequence of [`Item`]s plus the [`AnnotationStore`]
/// its text refers to.
///
/// Addressing is tolerant: every offset and range passed to a
/// `LinearDocument` is clamped to the document's bounds instead of
/// panicking.
///
/// The items should only be mutated through a
/// [`TransactionProcessor`](crate::TransactionProcessor). The low-level
/// [`splice`](Self::splice) is exposed for it and for hosts that build
/// documents, not for editing logic.
#[derive(Debug, Clone, Default)]
pub struct LinearDocument {
    items: Vec<Item>,
    store: AnnotationStore,
}

impl PartialEq for LinearDocument {
    /// Two documents are equal if they contain the same items, regardless of
    /// what's in their stores.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl LinearDocument {
    /// Returns the annotations open at the given offset.
    ///
    /// Structural items have no annotations. The offset is clamped to the
    /// last item.
    #[inline]
    pub fn annotations_at(&self, offset: usize) -> &[AnnotationHash] {
        if self.items.is_empty() {
            return &[];
        }
        let offset = offset.min(self.items.len() - 1);
        self.items[offset].annotations()
    }

    /// Checks that the open and close markers are balanced and properly
    /// nested, and that text only appears directly inside elements which the
    /// registry says can contain content.
    pub fn check_structure(
        &self,
        registry: &ModelRegistry,
    ) -> Result<(), DocumentError> {
        let mut stack = Vec::<&str>::new();

        for (offset, item) in self.items.iter().enumerate() {
            match item {
                Item::Open(element) => stack.push(&element.kind),

                Item::Close(kind) => match stack.pop() {
                    Some(open) if open == kind => {},
                    Some(open) => {
                        return Err(DocumentError::MismatchedClose {
                            offset,
                            expected: open.to_owned(),
                            found: kind.clone(),
                        })
                    },
                    None => {
                        return Err(DocumentError::UnexpectedClose {
                            offset,
                            kind: kind.clone(),
                        })
                    },
                },

                Item::Text { .. } => {
                    let in_content = stack
                        .last()
                        .is_some_and(|kind| registry.can_contain_content(kind));

                    if !in_content {
                        return Err(DocumentError::ContentOutsideElement {
                            offset,
                        });
                    }
                },
            }
        }

        match stack.pop() {
            Some(kind) => {
                Err(DocumentError::UnclosedElement { kind: kind.to_owned() })
            },
            None => Ok(()),
        }
    }

    /// Returns all the items.
    #[inline]
    pub fn data(&self) -> &[Item] {
        &self.items
    }

    /// Returns the items in the given range, clamped to the document.
    #[inline]
    pub fn data_in(&self, range: Range<usize>) -> &[Item] {
        let range = self.clamp(range);
        &self.items[range]
    }

    #[inline]
    fn clamp(&self, range: Range<usize>) -> Range<usize> {
        let start = range.start.min(self.items.len());
        let end = range.end.clamp(start, self.items.len());
        start..end
    }

    /// Creates a document from its items and an empty store.
    #[inline]
    pub fn from_items<I: IntoIterator<Item = Item>>(items: I) -> Self {
        Self {
            items: items.into_iter().collect(),
            store: AnnotationStore::new(),
        }
    }

    /// Creates a document holding a single paragraph with the given text.
    #[inline]
    pub fn from_text(text: &str) -> Self {
        let mut items = vec![Item::open("paragraph")];
        items.extend(Item::from_str_graphemes(text));
        items.push(Item::close("paragraph"));
        Self::from_items(items)
    }

    /// Returns `true` if the document has no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub(crate) fn item_mut(&mut self, offset: usize) -> Option<&mut Item> {
        self.items.get_mut(offset)
    }

    /// Returns the number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns owned copies of the items in the given range, clamped to the
    /// document.
    #[inline]
    pub fn slice(&self, range: Range<usize>) -> Vec<Item> {
        self.data_in(range).to_vec()
    }

    /// Removes `remove` items starting at `offset` and inserts `insert` in
    /// their place, returning the removed items.
    ///
    /// Both the offset and the number of removed items are clamped to the
    /// document.
    pub fn splice<I>(
        &mut self,
        offset: usize,
        remove: usize,
        insert: I,
    ) -> Vec<Item>
    where
        I: IntoIterator<Item = Item>,
    {
        let range = self.clamp(offset..offset.saturating_add(remove));
        self.items.splice(range, insert).collect()
    }

    /// Returns the document's annotation store.
    #[inline]
    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// Returns the document's annotation store.
    #[inline]
    pub fn store_mut(&mut self) -> &mut AnnotationStore {
        &mut self.store
    }

    /// Returns the concatenation of every text item, ignoring structure and
    /// annotations.
    #[inline]
    pub fn text(&self) -> String {
        self.items.iter().filter_map(Item::grapheme).collect()
    }
}
