use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// The number of hex digits of the SHA-256 digest kept in an
/// [`AnnotationHash`].
const HASH_DIGITS: usize = 16;

const NAME: &str = "name";
const ATTRIBUTES: &str = "attributes";
const ORIGINAL: &str = "original";

/// An immutable styling or semantic marker applied to a run of text, e.g.
/// bold, italic or a link with an `href`.
///
/// Annotations are never mutated in place. They're interned in an
/// [`AnnotationStore`] and referenced from the document by their
/// [`AnnotationHash`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Annotation {
    /// The kind of annotation, e.g. `"textStyle/bold"` or `"link"`.
    name: String,

    /// Semantic attributes, e.g. the `href` of a link.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,

    /// An incidental rendering snapshot (e.g. the original markup the
    /// annotation was parsed from). It's part of the value's identity but
    /// it's ignored when checking whether two annotations are comparable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original: Option<Value>,
}

impl Annotation {
    /// Creates a new annotation with the given name and no attributes.
    #[inline]
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self { name: name.into(), attributes: BTreeMap::new(), original: None }
    }

    /// Returns the annotation's attributes.
    #[inline]
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Computes the content hash that identifies this annotation inside an
    /// [`AnnotationStore`].
    ///
    /// The hash is taken over the canonical JSON of the whole value: compact,
    /// with the keys of every object sorted. Two annotations have the same
    /// hash if and only if they're equal, including their
    /// [`original`](Self::original) snapshot.
    pub fn hash(&self) -> AnnotationHash {
        let digest = Sha256::digest(self.canonical_json().as_bytes());

        let mut hash = String::with_capacity(HASH_DIGITS + 1);
        hash.push('h');
        for byte in digest.iter().take(HASH_DIGITS / 2) {
            hash.push_str(&format!("{byte:02x}"));
        }
        AnnotationHash(hash)
    }

    /// `serde_json`'s maps are sorted by key, so printing a [`Value`] built
    /// from the annotation is canonical.
    fn canonical_json(&self) -> String {
        let mut object = Map::new();

        object.insert(NAME.to_owned(), Value::String(self.name.clone()));

        if !self.attributes.is_empty() {
            let attributes = self
                .attributes
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            object.insert(ATTRIBUTES.to_owned(), Value::Object(attributes));
        }

        if let Some(original) = &self.original {
            object.insert(ORIGINAL.to_owned(), original.clone());
        }

        Value::Object(object).to_string()
    }

    /// Returns `true` if both annotations represent the same semantic style,
    /// i.e. they only differ in their rendering snapshot.
    #[inline]
    pub fn is_comparable_to(&self, other: &Self) -> bool {
        self.name == other.name && self.attributes == other.attributes
    }

    /// Returns the annotation's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the rendering snapshot, if any.
    #[inline]
    pub fn original(&self) -> Option<&Value> {
        self.original.as_ref()
    }

    /// Sets an attribute, returning the updated annotation.
    #[inline]
    pub fn with_attribute<K: Into<String>>(
        mut self,
        key: K,
        value: Value,
    ) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Sets the rendering snapshot, returning the updated annotation.
    #[inline]
    pub fn with_original(mut self, original: Value) -> Self {
        self.original = Some(original);
        self
    }
}

/// A reference to an [`Annotation`] by content hash.
///
/// On the wire this is a bare string such as `"h5b8a1e0c29f7d3a4"`.
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct AnnotationHash(String);

impl core::fmt::Debug for AnnotationHash {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnnotationHash {
    #[inline]
    fn from(hash: &str) -> Self {
        Self(hash.to_owned())
    }
}

impl AnnotationHash {
    /// Returns the hash as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An arena of [`Annotation`]s.
///
/// Every annotation is stored once and can be addressed either by its
/// content hash or by the small index it got when it was first inserted.
/// Indices are stable for the lifetime of the store.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    values: Vec<Annotation>,
    hashes: Vec<AnnotationHash>,
    indices: HashMap<AnnotationHash, usize>,
}

impl AnnotationStore {
    /// Returns the first stored annotation that is
    /// [comparable](Annotation::is_comparable_to) to `annotation`.
    #[inline]
    pub fn find_comparable(
        &self,
        annotation: &Annotation,
    ) -> Option<&AnnotationHash> {
        self.values
            .iter()
            .position(|stored| stored.is_comparable_to(annotation))
            .map(|idx| &self.hashes[idx])
    }

    /// Returns the annotation with the given hash.
    #[inline]
    pub fn get(&self, hash: &AnnotationHash) -> Option<&Annotation> {
        self.indices.get(hash).map(|&idx| &self.values[idx])
    }

    /// Returns the annotation stored at the given index.
    #[inline]
    pub fn get_by_index(&self, idx: usize) -> Option<&Annotation> {
        self.values.get(idx)
    }

    /// Returns the index of the annotation with the given hash.
    #[inline]
    pub fn index_of(&self, hash: &AnnotationHash) -> Option<usize> {
        self.indices.get(hash).copied()
    }

    /// Interns an annotation, returning its hash.
    ///
    /// Inserting an annotation that is already in the store is a no-op.
    pub fn insert(&mut self, annotation: Annotation) -> AnnotationHash {
        let hash = annotation.hash();
        if !self.indices.contains_key(&hash) {
            self.indices.insert(hash.clone(), self.values.len());
            self.values.push(annotation);
            self.hashes.push(hash.clone());
        }
        hash
    }

    /// Returns `true` if the store has no annotations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns an iterator over the stored annotations and their hashes, in
    /// insertion order.
    #[inline]
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&AnnotationHash, &Annotation)> + '_ {
        self.hashes.iter().zip(self.values.iter())
    }

    /// Returns the number of stored annotations.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Interns every annotation of `other` into this store.
    #[inline]
    pub fn merge(&mut self, other: &AnnotationStore) {
        for (_, annotation) in other.iter() {
            self.insert(annotation.clone());
        }
    }

    /// Creates a new, empty store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}
