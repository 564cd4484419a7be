//! Error types.

use thiserror::Error;

use crate::{AnnotationHash, AuthorId};

/// The structure of a document is not well formed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DocumentError {
    /// A close marker doesn't match the innermost open element.
    #[error("close marker {found:?} at offset {offset} doesn't match {expected:?}")]
    MismatchedClose {
        /// The offset of the close marker.
        offset: usize,
        /// The type of the innermost open element.
        expected: String,
        /// The type of the close marker.
        found: String,
    },

    /// A close marker was found with no element open.
    #[error("close marker {kind:?} at offset {offset} has no open element")]
    UnexpectedClose {
        /// The offset of the close marker.
        offset: usize,
        /// The type of the close marker.
        kind: String,
    },

    /// An element was never closed.
    #[error("element {kind:?} is never closed")]
    UnclosedElement {
        /// The type of the unclosed element.
        kind: String,
    },

    /// Text was found outside of a content-capable element.
    #[error("text at offset {offset} is not inside a content element")]
    ContentOutsideElement {
        /// The offset of the misplaced text.
        offset: usize,
    },
}

/// A transaction can't be applied to a document.
///
/// These are programmer errors: the transaction was built for a different
/// document state. A transaction that fails to apply leaves the document
/// untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransactionError {
    /// The operations don't span the whole document.
    #[error("transaction spans {actual} items but the document has {expected}")]
    LengthMismatch {
        /// The length of the document.
        expected: usize,
        /// The input length of the transaction.
        actual: usize,
    },

    /// The items a replacement removes are not the ones in the document.
    #[error("removed items at offset {offset} don't match the document")]
    RemovalMismatch {
        /// The offset of the replacement.
        offset: usize,
    },

    /// An attribute change doesn't point at an open marker.
    #[error("no element to change at offset {offset}")]
    NotAnElement {
        /// The offset of the attribute change.
        offset: usize,
    },

    /// An attribute change expects a different current value.
    #[error("attribute {key:?} at offset {offset} doesn't have the expected value")]
    AttributeMismatch {
        /// The offset of the element.
        offset: usize,
        /// The attribute's key.
        key: String,
    },

    /// An annotation is set on text that already has it.
    #[error("annotation {annotation:?} is already set at offset {offset}")]
    AnnotationAlreadySet {
        /// The offset of the text item.
        offset: usize,
        /// The annotation.
        annotation: AnnotationHash,
    },

    /// An annotation is cleared from text that doesn't have it.
    #[error("annotation {annotation:?} is not set at offset {offset}")]
    AnnotationNotSet {
        /// The offset of the text item.
        offset: usize,
        /// The annotation.
        annotation: AnnotationHash,
    },

    /// An annotate operation has no matching start or end.
    #[error("annotate operations for {annotation:?} are unbalanced")]
    UnbalancedAnnotation {
        /// The annotation.
        annotation: AnnotationHash,
    },
}

/// A change can't be decoded, composed or rebased.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChangeError {
    /// The payload is not a valid serialized change.
    #[error("malformed change payload: {0}")]
    Json(#[from] serde_json::Error),

    /// One of the transactions is not well formed.
    #[error("transaction {index} is malformed: {source}")]
    Transaction {
        /// The index of the transaction inside the change.
        index: usize,
        /// The underlying error.
        #[source]
        source: TransactionError,
    },

    /// Two changes don't follow each other in history.
    #[error("change starting at {actual} doesn't follow one ending at {expected}")]
    NotAdjacent {
        /// Where the second change should have started.
        expected: usize,
        /// Where it actually starts.
        actual: usize,
    },

    /// The committed and uncommitted changes of a rebase don't start at the
    /// same point in history.
    #[error("committed change starts at {committed}, uncommitted at {uncommitted}")]
    StartMismatch {
        /// The start of the committed change.
        committed: usize,
        /// The start of the uncommitted change.
        uncommitted: usize,
    },
}

/// The client side of the rebase protocol hit an invariant violation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// A change couldn't be decoded or rebased.
    #[error(transparent)]
    Change(#[from] ChangeError),

    /// A transaction couldn't be applied to the local document.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// A committed change doesn't start where the client's committed
    /// history ends.
    #[error("committed change starts at {actual}, expected {expected}")]
    UnexpectedStart {
        /// The client's commit length.
        expected: usize,
        /// The start of the committed change.
        actual: usize,
    },

    /// The transport can't deliver submissions anymore.
    #[error("the transport is disconnected")]
    Disconnected,

    /// A change removed from history is not the tail of the history.
    #[error("change ending at {actual} is not the tail of a history of length {expected}")]
    HistoryMismatch {
        /// The length of the history.
        expected: usize,
        /// Where the change ends.
        actual: usize,
    },
}

/// The server rejected a submission.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServerError {
    /// The client backtracked more transactions than the server rejected.
    #[error("author {author} backtracked {backtrack} but only {rejections} were rejected")]
    Backtrack {
        /// The submitting author.
        author: AuthorId,
        /// The backtrack count sent by the client.
        backtrack: usize,
        /// The number of rejections the server knows of.
        rejections: usize,
    },

    /// The submission couldn't be rebased.
    #[error(transparent)]
    Change(#[from] ChangeError),
}
