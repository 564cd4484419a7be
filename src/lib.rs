//! tandem is the collaborative core of a rich-text editor: a linear document
//! model, invertible transactions over it, and the rebase protocol that keeps
//! the documents of several users editing at the same time in sync.
//!
//! # The document
//!
//! A [`LinearDocument`] is a flat sequence of [`Item`]s. Text is one item per
//! grapheme, structure is a pair of open and close markers around it:
//!
//! ```text
//! <paragraph> h e l l o </paragraph>
//!      0      1 2 3 4 5      6
//! ```
//!
//! Annotations (bold, links, etc.) are stored once in the document's
//! [`AnnotationStore`] and referenced by content hash from the text they
//! cover.
//!
//! # Transactions
//!
//! Every edit is a [`Transaction`]: a list of [`Operation`]s walking over the
//! whole document, retaining, replacing, annotating or changing attributes as
//! they go. The [`TransactionProcessor`] checks a transaction against a
//! document before applying it, and since every transaction can be
//! [reversed](Transaction::reversed) a commit can always be rolled back
//! exactly.
//!
//! ```
//! # use tandem::{LinearDocument, Item, Transaction, TransactionProcessor};
//! let mut doc = LinearDocument::from_text("ab");
//!
//! let tx = Transaction::insertion(&doc, 2, [Item::from('X')]).with_author(1);
//!
//! TransactionProcessor::commit(&mut doc, &tx).unwrap();
//! assert_eq!(doc.text(), "aXb");
//!
//! TransactionProcessor::rollback(&mut doc, &tx).unwrap();
//! assert_eq!(doc.text(), "ab");
//! ```
//!
//! # Collaborating
//!
//! A [`Surface`] holds one user's document, selection and undo history.
//! Its transactions are bundled into [`Change`]s which a [`RebaseClient`]
//! submits to a [`RebaseServer`]. The server orders the submissions and
//! broadcasts what it commits, and every client
//! [rebases](Change::rebase_uncommitted_change) its own pending work onto
//! it. Edits that can't be reconciled with the committed history are rolled
//! back on the client that made them.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::module_inception)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

mod annotation;
mod author;
mod change;
mod client;
mod document;
mod error;
mod history;
mod item;
mod operation;
mod processor;
mod registry;
mod selection;
mod server;
mod surface;
mod transaction;
mod wire;

pub use annotation::{Annotation, AnnotationHash, AnnotationStore};
pub use author::AuthorId;
pub use change::{rebase_transactions, Change, Rebase};
pub use client::{
    ChangeHost,
    ChannelTransport,
    RebaseClient,
    Submission,
    Transport,
};
pub use document::LinearDocument;
pub use error::{
    ChangeError,
    ClientError,
    DocumentError,
    ServerError,
    TransactionError,
};
pub use history::HistoryEntry;
pub use item::{Element, Item};
pub use operation::{AnnotationBias, AnnotationMethod, Operation};
pub use processor::TransactionProcessor;
pub use registry::ModelRegistry;
pub use selection::{Range, Selection};
pub use server::RebaseServer;
pub use surface::{Surface, SurfaceEvent, SurfaceOptions};
pub use transaction::{ActiveRange, Transaction};
