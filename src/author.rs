/// A unique identifier for the author of a [`Transaction`](crate::Transaction).
///
/// Internally this is a newtype around a 64-bit integer and can be created
/// via its [`From<u64>`](AuthorId#impl-From<u64>-for-AuthorId)
/// implementation.
///
/// Author ids do more than label edits: when two authors insert at the exact
/// same offset the one with the lower id is placed first, so every client in
/// the same session must agree on who is who. Guaranteeing uniqueness is up
/// to you, usually by letting the server hand out ids as peers join.
#[derive(
    Copy,
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
pub struct AuthorId(u64);

impl core::fmt::Debug for AuthorId {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "AuthorId({})", self.0)
    }
}

impl core::fmt::Display for AuthorId {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AuthorId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl AuthorId {
    /// Returns the id as a plain integer.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Returns `true` if `left` should be placed before `right` when both edit
/// the same offset.
///
/// The lower author id wins. When either side has no author, or both have
/// the same one, `left` wins, so callers put the already committed side on
/// the left.
#[inline]
pub(crate) fn takes_priority(
    left: Option<AuthorId>,
    right: Option<AuthorId>,
) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => left <= right,
        _ => true,
    }
}
