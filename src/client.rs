use std::sync::mpsc;

use crate::*;

/// The document and history a [`RebaseClient`] works on.
///
/// [`Surface`](crate::Surface) is the implementation used by editors, but
/// any host keeping a document and the complete list of transactions
/// applied to it can take part in a collaborative session.
pub trait ChangeHost {
    /// Returns the transactions in history from `start` onwards, together
    /// with the local selection if it changed since it was last sent.
    ///
    /// If `mark_sent` is set the returned selection counts as sent.
    fn change_since(&mut self, start: usize, mark_sent: bool) -> Change;

    /// Applies a change to the document and appends it to history.
    ///
    /// Either the whole change is applied or, on error, nothing is.
    fn apply_change(&mut self, change: &Change) -> Result<(), ClientError>;

    /// Checks, without changing anything, that `tail` is the tail of history
    /// and that `change` would apply once `tail` is rolled back.
    fn check_replacement(
        &self,
        tail: &Change,
        change: &Change,
    ) -> Result<(), ClientError>;

    /// Rolls back a change, which must be the tail of history, and removes
    /// it from history.
    ///
    /// Either the whole change is rolled back or, on error, nothing is.
    fn unapply_change(&mut self, change: &Change) -> Result<(), ClientError>;

    /// Appends a change to history without touching the document.
    fn add_to_history(&mut self, change: &Change) -> Result<(), ClientError>;

    /// Removes a change, which must be the tail of history, from history
    /// without touching the document.
    fn remove_from_history(
        &mut self,
        change: &Change,
    ) -> Result<(), ClientError>;
}

/// Where a [`RebaseClient`] sends its submissions.
pub trait Transport {
    /// Sends a change together with the number of previously sent
    /// transactions the server should discard.
    fn send_change(
        &mut self,
        backtrack: usize,
        change: &Change,
    ) -> Result<(), ClientError>;
}

/// A transport that just collects what's sent, e.g. to be drained by an
/// event loop.
impl Transport for Vec<(usize, Change)> {
    #[inline]
    fn send_change(
        &mut self,
        backtrack: usize,
        change: &Change,
    ) -> Result<(), ClientError> {
        self.push((backtrack, change.clone()));
        Ok(())
    }
}

/// A change submitted to a [`RebaseServer`](crate::RebaseServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// The submitting author.
    pub author: AuthorId,

    /// The number of previously sent transactions to discard.
    pub backtrack: usize,

    /// The submitted change.
    pub change: Change,
}

/// A transport sending [`Submission`]s over a channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    author: AuthorId,
    sender: mpsc::Sender<Submission>,
}

impl ChannelTransport {
    /// Creates a transport sending the submissions of `author`.
    #[inline]
    pub fn new(
        author: impl Into<AuthorId>,
        sender: mpsc::Sender<Submission>,
    ) -> Self {
        Self { author: author.into(), sender }
    }
}

impl Transport for ChannelTransport {
    #[inline]
    fn send_change(
        &mut self,
        backtrack: usize,
        change: &Change,
    ) -> Result<(), ClientError> {
        let submission = Submission {
            author: self.author,
            backtrack,
            change: change.clone(),
        };
        self.sender.send(submission).map_err(|_| ClientError::Disconnected)
    }
}

/// The client side of the rebase protocol.
///
/// The client tracks three numbers about the history of its host:
///
/// - `commit_length`: how many transactions have been committed by the
///   server, i.e. the length of the prefix every client agrees on;
///
/// - `sent_length`: how many transactions have been committed or sent;
///
/// - `backtrack`: how many sent transactions got rejected while rebasing and
///   must be discarded by the server.
///
/// Submitting with [`submit_change`](Self::submit_change) and receiving
/// committed changes with [`accept_change`](Self::accept_change) are
/// independent and can be interleaved in any order. A submission doesn't
/// have to wait for the previous one to be echoed back: the server keeps
/// track of what each author has seen of its history.
///
/// A change that fails to apply leaves the client and its host as they
/// were.
#[derive(Debug)]
pub struct RebaseClient<H, T> {
    author: AuthorId,
    host: H,
    transport: T,
    commit_length: usize,
    sent_length: usize,
    backtrack: usize,
}

impl<H: ChangeHost, T: Transport> RebaseClient<H, T> {
    /// Handles a change committed by the server.
    ///
    /// The local uncommitted work is rebased onto it, and whatever part of
    /// it conflicts is rolled back. History is rewritten so that it
    /// matches the server's: the committed change followed by what's left of
    /// the uncommitted work.
    ///
    /// Changes without an author are ignored.
    pub fn accept_change(
        &mut self,
        committed: &Change,
    ) -> Result<(), ClientError> {
        let Some(author) = committed.first_author() else {
            tracing::trace!(
                start = committed.start(),
                "ignoring anonymous change"
            );
            return Ok(());
        };

        if committed.start() != self.commit_length {
            return Err(ClientError::UnexpectedStart {
                expected: self.commit_length,
                actual: committed.start(),
            });
        }

        if author == self.author
            && committed.start() + committed.len() <= self.sent_length
        {
            tracing::trace!(
                start = committed.start(),
                len = committed.len(),
                "accepted own change"
            );
            self.commit_length += committed.len();
            return Ok(());
        }

        let mut uncommitted = self.host.change_since(self.commit_length, false);

        let Rebase { rebased, rejected, mut transposed_history } =
            Change::rebase_uncommitted_change(committed, &uncommitted)?;

        // The live local selection wins over the one the server echoes.
        transposed_history.remove_selection(self.author);

        let mut sent_length = self.sent_length;
        let mut backtrack = self.backtrack;

        if let Some(rejected) = rejected {
            self.host.check_replacement(&rejected, &transposed_history)?;
            self.host.unapply_change(&rejected)?;

            uncommitted =
                uncommitted.truncate(rejected.start() - uncommitted.start());

            if sent_length > rejected.start() {
                backtrack += sent_length - rejected.start();
            }

            sent_length = sent_length.min(rejected.start());

            tracing::debug!(
                from = rejected.start(),
                rejected = rejected.len(),
                backtrack,
                "rolled back rejected transactions"
            );
        }

        self.host.apply_change(&transposed_history)?;
        self.host.remove_from_history(&transposed_history)?;
        self.host.remove_from_history(&uncommitted)?;
        self.host.add_to_history(committed)?;
        self.host.add_to_history(&rebased)?;

        self.backtrack = backtrack;
        self.sent_length = sent_length + committed.len();
        self.commit_length += committed.len();

        tracing::trace!(
            %author,
            commit_length = self.commit_length,
            sent_length = self.sent_length,
            "accepted change"
        );

        Ok(())
    }

    /// Decodes a committed change and [accepts](Self::accept_change) it.
    ///
    /// A payload that can't be decoded is dropped without touching the
    /// client or its host.
    pub fn accept_json(&mut self, json: &str) -> Result<(), ClientError> {
        let committed = match Change::from_json(json) {
            Ok(committed) => committed,
            Err(err) => {
                tracing::warn!(%err, "dropping malformed change");
                return Err(err.into());
            },
        };
        self.accept_change(&committed)
    }

    /// Returns the local author.
    #[inline]
    pub fn author(&self) -> AuthorId {
        self.author
    }

    /// Returns the number of rejected transactions that the next submission
    /// will tell the server to discard.
    #[inline]
    pub fn backtrack(&self) -> usize {
        self.backtrack
    }

    /// Returns the length of the history committed by the server.
    #[inline]
    pub fn commit_length(&self) -> usize {
        self.commit_length
    }

    /// Returns the client's host.
    #[inline]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Returns the client's host.
    #[inline]
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Returns `true` if some submitted transactions haven't been echoed
    /// back by the server yet.
    #[inline]
    pub fn is_awaiting_ack(&self) -> bool {
        self.sent_length > self.commit_length
    }

    /// Creates a client for a host whose history is empty.
    #[inline]
    pub fn new(author: impl Into<AuthorId>, host: H, transport: T) -> Self {
        Self {
            author: author.into(),
            host,
            transport,
            commit_length: 0,
            sent_length: 0,
            backtrack: 0,
        }
    }

    /// Returns the length of the history that has been committed or sent.
    #[inline]
    pub fn sent_length(&self) -> usize {
        self.sent_length
    }

    /// Sends the part of history that hasn't been sent yet, together with
    /// the outstanding backtrack.
    ///
    /// Returns `false` if there was nothing to send.
    pub fn submit_change(&mut self) -> Result<bool, ClientError> {
        let unsent = self.host.change_since(self.sent_length, true);

        if unsent.is_empty() && self.backtrack == 0 {
            return Ok(false);
        }

        self.transport.send_change(self.backtrack, &unsent)?;

        tracing::trace!(
            start = unsent.start(),
            len = unsent.len(),
            backtrack = self.backtrack,
            "submitted change"
        );

        self.backtrack = 0;
        self.sent_length += unsent.len();

        Ok(true)
    }

    /// Returns the client's transport.
    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the client's transport.
    #[inline]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
