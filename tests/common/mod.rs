#![allow(dead_code)]

use std::collections::VecDeque;
use std::fmt::Debug;
use std::ops::Range;

use rand::Rng;
use tandem::{
    Annotation,
    AnnotationHash,
    AnnotationMethod,
    AuthorId,
    Change,
    Item,
    LinearDocument,
    ModelRegistry,
    RebaseClient,
    RebaseServer,
    Surface,
    SurfaceOptions,
    Transaction,
    TransactionProcessor,
};

/// A user editing a single paragraph, connected to a server through an
/// outbox.
pub struct Peer {
    pub client: RebaseClient<Surface, Vec<(usize, Change)>>,
}

impl Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("author", &self.client.author())
            .field("text", &self.text())
            .field("commit_length", &self.client.commit_length())
            .field("sent_length", &self.client.sent_length())
            .finish()
    }
}

impl PartialEq<Peer> for Peer {
    fn eq(&self, rhs: &Peer) -> bool {
        self.document() == rhs.document()
    }
}

impl PartialEq<&str> for Peer {
    fn eq(&self, rhs: &&str) -> bool {
        self.text() == *rhs
    }
}

impl PartialEq<Peer> for &str {
    fn eq(&self, rhs: &Peer) -> bool {
        rhs.text() == *self
    }
}

impl Peer {
    /// Sets or clears bold over the graphemes in `range` of the paragraph's
    /// text.
    pub fn annotate(
        &mut self,
        range: Range<usize>,
        method: AnnotationMethod,
    ) -> Transaction {
        let doc = self.document();
        let range = range.start + 1..range.end + 1;
        let tx = Transaction::annotation(doc, range, method, bold());
        self.surface_mut().change([tx.clone()], None).unwrap();
        tx
    }

    pub fn author(&self) -> AuthorId {
        self.client.author()
    }

    /// Removes the graphemes in `range` of the paragraph's text.
    pub fn delete(&mut self, range: Range<usize>) -> Transaction {
        let doc = self.document();
        let tx = Transaction::removal(doc, range.start + 1..range.end + 1);
        self.surface_mut().change([tx.clone()], None).unwrap();
        tx
    }

    pub fn document(&self) -> &LinearDocument {
        self.surface().document()
    }

    pub fn edit(&mut self, edit: RandomEdit) -> Transaction {
        match edit {
            RandomEdit::Insertion(offset, text) => self.insert(offset, &text),
            RandomEdit::Deletion(range) => self.delete(range),
        }
    }

    /// Inserts `text` at the given offset of the paragraph's text.
    pub fn insert(&mut self, offset: usize, text: &str) -> Transaction {
        let doc = self.document();
        let items = Item::from_str_graphemes(text);
        let tx = Transaction::insertion(doc, offset + 1, items);
        self.surface_mut().change([tx.clone()], None).unwrap();
        tx
    }

    /// Returns the number of graphemes in the paragraph.
    pub fn len(&self) -> usize {
        self.document().len() - 2
    }

    pub fn new(author: u64, text: &str) -> Self {
        let surface = Surface::new(
            LinearDocument::from_text(text),
            &ModelRegistry::default(),
            author,
            SurfaceOptions::default(),
        )
        .unwrap();

        Self { client: RebaseClient::new(author, surface, Vec::new()) }
    }

    pub fn random_delete(
        &self,
        rng: &mut impl Rng,
        max_len: usize,
    ) -> Range<usize> {
        assert!(self.len() > 0);
        let start = rng.random_range(0..self.len());
        let len = rng.random_range(1..=max_len);
        start..(start + len).min(self.len())
    }

    /// Returns a possibly empty range of the paragraph's text.
    pub fn random_span(
        &self,
        rng: &mut impl Rng,
        max_len: usize,
    ) -> Range<usize> {
        let start = rng.random_range(0..=self.len());
        let len = rng.random_range(0..=max_len);
        start..(start + len).min(self.len())
    }

    pub fn random_edit(
        &self,
        rng: &mut impl Rng,
        max_insertion_len: usize,
        max_deletion_len: usize,
    ) -> RandomEdit {
        if rng.random_bool(0.6) || self.len() == 0 {
            let (offset, text) = self.random_insert(rng, max_insertion_len);
            RandomEdit::Insertion(offset, text)
        } else {
            RandomEdit::Deletion(self.random_delete(rng, max_deletion_len))
        }
    }

    pub fn random_insert(
        &self,
        rng: &mut impl Rng,
        max_len: usize,
    ) -> (usize, String) {
        assert!(max_len > 0);
        let offset = rng.random_range(0..=self.len());
        let text_len = rng.random_range(1..=max_len);
        let letter = rng.random_range('a'..='z');
        let text = (0..text_len).map(|_| letter).collect::<String>();
        (offset, text)
    }

    pub fn surface(&self) -> &Surface {
        self.client.host()
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        self.client.host_mut()
    }

    /// Takes everything the client has sent so far.
    pub fn take_outbox(&mut self) -> Vec<(usize, Change)> {
        std::mem::take(self.client.transport_mut())
    }

    pub fn text(&self) -> String {
        self.document().text()
    }
}

pub fn bold() -> AnnotationHash {
    Annotation::new("textStyle/bold").hash()
}

pub enum RandomEdit {
    Insertion(usize, String),
    Deletion(Range<usize>),
}

/// A server and its peers, with the committed changes each peer has yet to
/// receive.
pub struct Session {
    pub base: LinearDocument,
    pub server: RebaseServer,
    pub peers: Vec<Peer>,
    inboxes: Vec<VecDeque<Change>>,
}

impl Session {
    /// Delivers the oldest committed change `peer` hasn't received yet,
    /// returning `false` if there's none.
    pub fn deliver(&mut self, peer: usize) -> bool {
        let Some(change) = self.inboxes[peer].pop_front() else {
            return false;
        };
        self.peers[peer].client.accept_change(&change).unwrap();
        true
    }

    pub fn deliver_all(&mut self, peer: usize) {
        while self.deliver(peer) {}
    }

    pub fn new(text: &str, num_peers: u64) -> Self {
        Self {
            base: LinearDocument::from_text(text),
            server: RebaseServer::new(),
            peers: (1..=num_peers).map(|id| Peer::new(id, text)).collect(),
            inboxes: (0..num_peers).map(|_| VecDeque::new()).collect(),
        }
    }

    /// Returns the base document with the server's history applied to it.
    pub fn server_document(&self) -> LinearDocument {
        let mut doc = self.base.clone();
        for tx in self.server.history() {
            TransactionProcessor::commit(&mut doc, tx).unwrap();
        }
        doc
    }

    /// Submits and delivers everything until no peer has anything left to
    /// send or receive.
    pub fn settle(&mut self) {
        loop {
            let mut progress = false;

            for peer in 0..self.peers.len() {
                progress |= self.submit(peer);
            }

            for peer in 0..self.peers.len() {
                while self.deliver(peer) {
                    progress = true;
                }
            }

            if !progress {
                break;
            }
        }
    }

    /// Lets `peer` submit its unsent work and broadcasts what the server
    /// commits, returning `false` if nothing was sent.
    pub fn submit(&mut self, peer: usize) -> bool {
        let author = self.peers[peer].author();

        if !self.peers[peer].client.submit_change().unwrap() {
            return false;
        }

        for (backtrack, change) in self.peers[peer].take_outbox() {
            let committed =
                self.server.apply_change(author, backtrack, &change).unwrap();
            for inbox in &mut self.inboxes {
                inbox.push_back(committed.clone());
            }
        }

        true
    }
}

#[macro_export]
macro_rules! assert_convergence {
    ($slice:expr) => {{
        for peer in $slice[1..].iter() {
            if &$slice[0] != peer {
                panic!("left: {:#?}\nright: {:#?}", &$slice[0], peer);
            }
        }
    }};

    ($one:expr, $two:expr) => {{
        if $one != $two {
            panic!("left: {:#?}\nright: {:#?}", $one, $two);
        }
    }};

    ($one:expr, $two:expr, $three:expr) => {{
        assert_eq!($one, $two, "{:#?} vs {:#?}", $one, $two);
        assert_eq!($two, $three, "{:#?} vs {:#?}", $two, $three);
    }};
}
