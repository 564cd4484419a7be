use serde_json::Value;

use crate::{AnnotationHash, Item};

/// A single step of a [`Transaction`](crate::Transaction).
///
/// Operations are addressed purely by relative position: each one consumes
/// some number of items from the document (its input length) starting where
/// the previous one stopped.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    /// Skip over `length` items without changing them.
    Retain {
        /// The number of items to skip.
        length: usize,
    },

    /// Remove the next `remove.len()` items and insert `insert` in their
    /// place.
    Replace {
        /// The items being removed, exactly as they are in the document.
        remove: Vec<Item>,
        /// The items being inserted.
        insert: Vec<Item>,
    },

    /// Start or end setting or clearing an annotation over the items
    /// retained in between.
    Annotate {
        /// Whether the annotation is being set or cleared.
        method: AnnotationMethod,
        /// Whether this marks the start or the end of the annotated span.
        bias: AnnotationBias,
        /// The annotation.
        annotation: AnnotationHash,
    },

    /// Change an attribute of the element whose open marker is at the
    /// current offset. `None` means the attribute is absent, and is written
    /// as `null` on the wire.
    Attribute {
        /// The attribute's key.
        key: String,
        /// The current value.
        #[serde(deserialize_with = "nullable")]
        from: Option<Value>,
        /// The new value.
        #[serde(deserialize_with = "nullable")]
        to: Option<Value>,
    },
}

impl Operation {
    /// Returns the number of document items this operation consumes.
    #[inline]
    pub fn input_length(&self) -> usize {
        match self {
            Operation::Retain { length } => *length,
            Operation::Replace { remove, .. } => remove.len(),
            _ => 0,
        }
    }

    /// Returns `true` if this operation leaves the document unchanged.
    #[inline]
    pub fn is_retain(&self) -> bool {
        matches!(self, Operation::Retain { .. })
    }

    /// Returns the number of items this operation produces.
    #[inline]
    pub fn output_length(&self) -> usize {
        match self {
            Operation::Retain { length } => *length,
            Operation::Replace { insert, .. } => insert.len(),
            _ => 0,
        }
    }

    /// Returns the operation that undoes this one.
    pub fn reversed(&self) -> Self {
        match self {
            Operation::Retain { length } => {
                Operation::Retain { length: *length }
            },

            Operation::Replace { remove, insert } => Operation::Replace {
                remove: insert.clone(),
                insert: remove.clone(),
            },

            Operation::Annotate { method, bias, annotation } => {
                Operation::Annotate {
                    method: method.reversed(),
                    bias: *bias,
                    annotation: annotation.clone(),
                }
            },

            Operation::Attribute { key, from, to } => Operation::Attribute {
                key: key.clone(),
                from: to.clone(),
                to: from.clone(),
            },
        }
    }
}

/// Requires the key to be present, reading `null` as an absent attribute.
#[inline]
fn nullable<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = <Value as serde::Deserialize>::deserialize(deserializer)?;
    Ok(Some(value).filter(|value| !value.is_null()))
}

/// Whether an [`Annotate`](Operation::Annotate) operation sets or clears its
/// annotation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationMethod {
    /// Add the annotation.
    Set,

    /// Remove the annotation.
    Clear,
}

impl AnnotationMethod {
    /// Returns the opposite method.
    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            AnnotationMethod::Set => AnnotationMethod::Clear,
            AnnotationMethod::Clear => AnnotationMethod::Set,
        }
    }
}

/// Whether an [`Annotate`](Operation::Annotate) operation opens or closes
/// the annotated span.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationBias {
    /// The annotated span starts here.
    Start,

    /// The annotated span ends here.
    End,
}
