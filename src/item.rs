use std::collections::BTreeMap;

use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::AnnotationHash;

/// One unit of linear document data.
///
/// A document is a flat sequence of items: text graphemes, possibly
/// annotated, framed by balanced open and close markers of structural
/// elements. For example the paragraph "hi" is the five items
/// `[Open(paragraph), "h", "i", Close(paragraph)]`, so the offset of each
/// grapheme is also its position in the sequence.
///
/// Two text items are equal if they have the same grapheme and the same
/// annotations, in whatever order.
#[derive(Debug, Clone)]
pub enum Item {
    /// A single grapheme with the annotations covering it.
    ///
    /// Annotations are listed from the outermost to the innermost, without
    /// duplicates. A newly set annotation becomes the innermost one.
    Text {
        /// The grapheme itself.
        grapheme: String,

        /// The annotations applied to the grapheme.
        annotations: Vec<AnnotationHash>,
    },

    /// The opening marker of a structural element.
    Open(Element),

    /// The closing marker of a structural element of the given type.
    Close(String),
}

impl Item {
    /// Returns the grapheme's annotations, or an empty slice for structural
    /// markers.
    #[inline]
    pub fn annotations(&self) -> &[AnnotationHash] {
        match self {
            Item::Text { annotations, .. } => annotations,
            _ => &[],
        }
    }

    /// Creates an annotated text item, the annotations going from the
    /// outermost to the innermost. Repeated annotations are only kept once.
    pub fn annotated<G, I>(grapheme: G, annotations: I) -> Self
    where
        G: Into<String>,
        I: IntoIterator<Item = AnnotationHash>,
    {
        let mut deduped = Vec::<AnnotationHash>::new();
        for hash in annotations {
            if !deduped.contains(&hash) {
                deduped.push(hash);
            }
        }
        Item::Text { grapheme: grapheme.into(), annotations: deduped }
    }

    /// Creates the closing marker of an element of the given type.
    #[inline]
    pub fn close<K: Into<String>>(kind: K) -> Self {
        Item::Close(kind.into())
    }

    /// Returns the element if this is an opening marker.
    #[inline]
    pub fn element(&self) -> Option<&Element> {
        match self {
            Item::Open(element) => Some(element),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Item::Open(element) => Some(element),
            _ => None,
        }
    }

    /// Returns the grapheme if this is a text item.
    #[inline]
    pub fn grapheme(&self) -> Option<&str> {
        match self {
            Item::Text { grapheme, .. } => Some(grapheme),
            _ => None,
        }
    }

    /// Returns `true` if this is a text item carrying the given annotation.
    #[inline]
    pub fn has_annotation(&self, hash: &AnnotationHash) -> bool {
        self.annotations().contains(hash)
    }

    /// Returns `true` if this is a text item.
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Item::Text { .. })
    }

    /// Creates the opening marker of an element with no attributes.
    #[inline]
    pub fn open<K: Into<String>>(kind: K) -> Self {
        Item::Open(Element::new(kind))
    }

    /// Adds an annotation, returning `false` if it was already there or if
    /// this is not a text item.
    pub(crate) fn set_annotation(&mut self, hash: &AnnotationHash) -> bool {
        let Item::Text { annotations, .. } = self else {
            return false;
        };
        if annotations.contains(hash) {
            return false;
        }
        annotations.push(hash.clone());
        true
    }

    /// Removes an annotation, returning `false` if it wasn't there or if
    /// this is not a text item.
    pub(crate) fn clear_annotation(&mut self, hash: &AnnotationHash) -> bool {
        let Item::Text { annotations, .. } = self else {
            return false;
        };
        let Some(idx) = annotations.iter().position(|h| h == hash) else {
            return false;
        };
        annotations.remove(idx);
        true
    }

    /// Creates a plain text item.
    #[inline]
    pub fn text<G: Into<String>>(grapheme: G) -> Self {
        Item::Text { grapheme: grapheme.into(), annotations: Vec::new() }
    }

    /// Splits a string into one plain text item per extended grapheme
    /// cluster.
    #[inline]
    pub fn from_str_graphemes(s: &str) -> Vec<Self> {
        s.graphemes(true).map(Item::text).collect()
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Item::Text { grapheme: lhs, annotations: lhs_set },
                Item::Text { grapheme: rhs, annotations: rhs_set },
            ) => {
                lhs == rhs
                    && lhs_set.len() == rhs_set.len()
                    && lhs_set.iter().all(|hash| rhs_set.contains(hash))
            },
            (Item::Open(lhs), Item::Open(rhs)) => lhs == rhs,
            (Item::Close(lhs), Item::Close(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl Eq for Item {}

impl From<char> for Item {
    #[inline]
    fn from(ch: char) -> Self {
        Item::text(ch.to_string())
    }
}

/// A structural element, e.g. a paragraph or a heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// The element's type, e.g. `"paragraph"`.
    pub kind: String,

    /// The element's attributes, e.g. the `level` of a heading.
    ///
    /// An attribute set to `null` is the same as an absent one, so `null`
    /// values are never stored.
    pub attributes: BTreeMap<String, Value>,
}

impl Element {
    /// Returns the value of the given attribute.
    #[inline]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Creates a new element of the given type with no attributes.
    #[inline]
    pub fn new<K: Into<String>>(kind: K) -> Self {
        Self { kind: kind.into(), attributes: BTreeMap::new() }
    }

    /// Sets or removes an attribute.
    #[inline]
    pub(crate) fn set_attribute(&mut self, key: &str, value: Option<Value>) {
        match value.filter(|value| !value.is_null()) {
            Some(value) => {
                self.attributes.insert(key.to_owned(), value);
            },
            None => {
                self.attributes.remove(key);
            },
        }
    }

    /// Sets an attribute, returning the updated element. Setting it to
    /// `null` removes it.
    #[inline]
    pub fn with_attribute<K: Into<String>>(
        mut self,
        key: K,
        value: Value,
    ) -> Self {
        let key = key.into();
        self.set_attribute(&key, Some(value));
        self
    }
}
