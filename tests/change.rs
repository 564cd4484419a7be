use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tandem::{
    rebase_transactions,
    AuthorId,
    Change,
    ChangeError,
    Item,
    LinearDocument,
    Rebase,
    Selection,
    Transaction,
    TransactionProcessor,
};

fn plain(text: &str) -> LinearDocument {
    LinearDocument::from_items(Item::from_str_graphemes(text))
}

fn apply(doc: &LinearDocument, change: &Change) -> LinearDocument {
    let mut doc = doc.clone();
    for tx in change.transactions() {
        TransactionProcessor::commit(&mut doc, tx).unwrap();
    }
    doc
}

fn insert(
    doc: &LinearDocument,
    offset: usize,
    c: char,
    author: u64,
) -> Transaction {
    Transaction::insertion(doc, offset, [Item::from(c)]).with_author(author)
}

fn change(start: usize, transactions: Vec<Transaction>) -> Change {
    Change::new(start, transactions, BTreeMap::new())
}

/// Two users insert at different offsets of "ab" at the same time, and both
/// end up with "aXbY".
#[test]
fn concurrent_insertions_converge() {
    let base = plain("ab");

    let t_a = insert(&base, 1, 'X', 1);
    let t_b = insert(&base, 2, 'Y', 2);

    let at_a = apply(&base, &change(0, vec![t_a.clone()]));
    let at_b = apply(&base, &change(0, vec![t_b.clone()]));

    assert_eq!(at_a.text(), "aXb");
    assert_eq!(at_b.text(), "abY");

    // A receives B's committed change.
    let Rebase { rebased, rejected, transposed_history } =
        Change::rebase_uncommitted_change(
            &change(0, vec![t_b]),
            &change(0, vec![t_a]),
        )
        .unwrap();

    assert!(rejected.is_none());
    assert_eq!(rebased.start(), 1);
    assert_eq!(transposed_history.start(), 1);

    let at_a = apply(&at_a, &transposed_history);
    let at_b = apply(&at_b, &rebased);

    assert_eq!(at_a.text(), "aXbY");
    assert_eq!(at_b.text(), "aXbY");
}

#[test]
fn insertions_at_same_offset_order_by_author() {
    let base = plain("ab");

    let by_1 = insert(&base, 1, '1', 1);
    let by_2 = insert(&base, 1, '2', 2);

    for (committed, uncommitted) in [(&by_1, &by_2), (&by_2, &by_1)] {
        let rebase = Change::rebase_uncommitted_change(
            &change(0, vec![committed.clone()]),
            &change(0, vec![uncommitted.clone()]),
        )
        .unwrap();

        let mut doc = base.clone();
        TransactionProcessor::commit(&mut doc, uncommitted).unwrap();
        let local = apply(&doc, &rebase.transposed_history);

        let mut doc = base.clone();
        TransactionProcessor::commit(&mut doc, committed).unwrap();
        let remote = apply(&doc, &rebase.rebased);

        assert_eq!(local.text(), "a12b");
        assert_eq!(remote.text(), "a12b");
    }
}

#[test]
fn overlapping_edits_are_rejected() {
    let base = plain("abcdef");

    // Author 2 removes "bcd", author 1 inserts inside it and then types at
    // the end.
    let removal = Transaction::removal(&base, 1..4).with_author(2);
    let inside = insert(&base, 2, 'X', 1);

    let mut doc = base.clone();
    TransactionProcessor::commit(&mut doc, &inside).unwrap();
    let at_end = insert(&doc, doc.len(), '!', 1);

    let uncommitted = change(0, vec![inside, at_end]);

    let committed = change(0, vec![removal]);

    let Rebase { rebased, rejected, transposed_history } =
        Change::rebase_uncommitted_change(&committed, &uncommitted).unwrap();

    let rejected = rejected.unwrap();
    assert_eq!(rejected.start(), 0);
    assert_eq!(rejected.transactions(), uncommitted.transactions());
    assert!(rebased.transactions().is_empty());
    assert_eq!(rebased.start(), 1);

    // Nothing was kept, so the committed change applies as is.
    assert_eq!(transposed_history.start(), 0);
    assert_eq!(apply(&base, &transposed_history).text(), "aef");
}

#[test]
fn rejection_keeps_the_rebased_prefix() {
    let base = plain("abcdef");

    let removal = Transaction::removal(&base, 3..6).with_author(2);

    let first = insert(&base, 0, '>', 1);
    let mut doc = base.clone();
    TransactionProcessor::commit(&mut doc, &first).unwrap();

    // ">abcdef", inserting between "e" and "f".
    let second = insert(&doc, 6, 'X', 1);

    let uncommitted = change(4, vec![first, second]);
    let committed = change(4, vec![removal]);

    let rebase =
        Change::rebase_uncommitted_change(&committed, &uncommitted).unwrap();

    let rejected = rebase.rejected.unwrap();
    assert_eq!(rejected.start(), 5);
    assert_eq!(rejected.len(), 1);

    assert_eq!(rebase.rebased.start(), 5);
    assert_eq!(rebase.rebased.len(), 1);
    assert_eq!(rebase.transposed_history.start(), 5);

    // Locally: apply the kept transaction, then the transposed history.
    let mut local = base.clone();
    TransactionProcessor::commit(&mut local, &uncommitted.transactions()[0])
        .unwrap();
    let local = apply(&local, &rebase.transposed_history);

    let remote = apply(&apply(&base, &committed), &rebase.rebased);

    assert_eq!(local.text(), ">abc");
    assert_eq!(remote, local);
}

#[test]
fn echo_is_not_rebased() {
    let base = plain("ab");

    let t1 = insert(&base, 0, 'x', 7);
    let mut doc = base.clone();
    TransactionProcessor::commit(&mut doc, &t1).unwrap();
    let t2 = insert(&doc, 0, 'y', 7);

    let uncommitted = change(3, vec![t1.clone(), t2.clone()]);
    let committed = change(3, vec![t1]);

    let rebase =
        Change::rebase_uncommitted_change(&committed, &uncommitted).unwrap();

    assert!(rebase.rejected.is_none());
    assert!(rebase.transposed_history.transactions().is_empty());
    assert_eq!(rebase.transposed_history.start(), 5);
    assert_eq!(rebase.rebased.start(), 4);
    assert_eq!(rebase.rebased.transactions(), &[t2]);
}

#[test]
fn empty_uncommitted_gets_committed_as_is() {
    let base = plain("ab");
    let tx = Transaction::removal(&base, 0..1).with_author(3);
    let committed = change(2, vec![tx]);

    let uncommitted = Change::empty(2);

    let rebase =
        Change::rebase_uncommitted_change(&committed, &uncommitted).unwrap();

    assert!(rebase.rebased.transactions().is_empty());
    assert_eq!(
        rebase.transposed_history.transactions(),
        committed.transactions()
    );
}

#[test]
fn start_mismatch_is_an_error() {
    let err = Change::rebase_uncommitted_change(
        &Change::empty(1),
        &Change::empty(2),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ChangeError::StartMismatch { committed: 1, uncommitted: 2 }
    ));
}

#[test]
fn selections_are_translated() {
    let base = plain("abcd");
    let me = AuthorId::from(1);
    let other = AuthorId::from(2);

    let remote = insert(&base, 0, '>', 2);
    let local = Transaction::removal(&base, 2..3).with_author(1);

    let mut committed = change(0, vec![remote]);
    committed.set_selection(other, Selection::cursor(1));

    let mut uncommitted = change(0, vec![local]);
    uncommitted.set_selection(me, Selection::linear(1, 2));

    let rebase =
        Change::rebase_uncommitted_change(&committed, &uncommitted).unwrap();

    // The local selection moves past the remote insertion.
    assert_eq!(rebase.rebased.selections()[&me], Selection::linear(2, 3));

    // The remote cursor stays before the local removal.
    assert_eq!(
        rebase.transposed_history.selections()[&other],
        Selection::cursor(1)
    );
}

#[test]
fn compose_then_truncate() {
    let base = plain("hello");

    let t1 = insert(&base, 5, '!', 1);
    let mut doc = base.clone();
    TransactionProcessor::commit(&mut doc, &t1).unwrap();
    let t2 = Transaction::removal(&doc, 0..1).with_author(1);
    TransactionProcessor::commit(&mut doc, &t2).unwrap();
    let t3 = insert(&doc, 0, 'J', 2);

    let a = change(10, vec![t1, t2]);
    let mut b = change(12, vec![t3]);
    b.set_selection(AuthorId::from(2), Selection::cursor(1));

    let composed = a.compose(&b).unwrap();

    assert_eq!(composed.start(), 10);
    assert_eq!(composed.len(), 3);
    assert_eq!(apply(&base, &composed).text(), "Jello!");
    assert_eq!(composed.selections(), b.selections());

    assert_eq!(composed.truncate(a.len()), a);
    assert_eq!(composed.most_recent(12).transactions(), b.transactions());
}

#[test]
fn compose_non_adjacent_fails() {
    let base = plain("hello");
    let tx = Transaction::removal(&base, 0..1);

    let a = change(0, vec![tx.clone()]);
    let b = change(3, vec![tx]);

    assert!(matches!(
        a.compose(&b),
        Err(ChangeError::NotAdjacent { expected: 1, actual: 3 })
    ));
}

#[test]
fn reversed_change_undoes() {
    let base = plain("hello");

    let t1 = Transaction::insertion(&base, 5, [Item::from('!')]);
    let mut doc = base.clone();
    TransactionProcessor::commit(&mut doc, &t1).unwrap();
    let t2 = Transaction::removal(&doc, 0..2);

    let forward = change(0, vec![t1, t2]);
    let edited = apply(&base, &forward);
    assert_eq!(edited.text(), "llo!");

    let backward = forward.reversed();
    assert_eq!(backward.start(), 2);
    assert_eq!(apply(&edited, &backward), base);
}

/// Edits by different authors touching disjoint parts of the document
/// converge whichever side is rebased.
#[test]
fn random_non_overlapping_changes_converge() {
    let seed = rand::random::<u64>();
    println!("seed: {seed}");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    for _ in 0..200 {
        test_non_overlapping(&mut rng);
    }
}

fn test_non_overlapping(rng: &mut impl Rng) {
    let base = plain("the quick brown fox jumps over the lazy dog");
    let split = rng.random_range(1..base.len());

    // Author 1 only touches the left part, author 2 the right one.
    let left = random_edits(&base, 0..split, 1, rng);
    let right = random_edits(&base, split..base.len(), 2, rng);

    let x = change(0, left);
    let y = change(0, right);

    let x_over_y = Change::rebase_uncommitted_change(&y, &x).unwrap();
    let y_over_x = Change::rebase_uncommitted_change(&x, &y).unwrap();

    assert!(x_over_y.rejected.is_none());
    assert!(y_over_x.rejected.is_none());

    let one = apply(&apply(&base, &y), &x_over_y.rebased);
    let two = apply(&apply(&base, &x), &y_over_x.rebased);
    let three = apply(&apply(&base, &x), &x_over_y.transposed_history);

    assert_eq!(one, two);
    assert_eq!(two, three);
}

/// Builds up to three sequential edits by `author` which only touch the
/// items originally in `bounds`.
fn random_edits(
    base: &LinearDocument,
    bounds: std::ops::Range<usize>,
    author: u64,
    rng: &mut impl Rng,
) -> Vec<Transaction> {
    let mut doc = base.clone();
    let mut bounds = bounds;
    let mut edits = Vec::new();

    for _ in 0..rng.random_range(1..=3) {
        let tx = if rng.random_bool(0.5) || bounds.is_empty() {
            let offset = rng.random_range(bounds.start..=bounds.end);
            Transaction::insertion(&doc, offset, [Item::from('+')])
        } else {
            let start = rng.random_range(bounds.clone());
            let end = rng.random_range(start + 1..=bounds.end);
            Transaction::removal(&doc, start..end)
        };

        let diff = tx.length_difference();
        TransactionProcessor::commit(&mut doc, &tx).unwrap();
        bounds.end = (bounds.end as isize + diff) as usize;
        edits.push(tx.with_author(author));
    }

    edits
}

/// Whenever two transactions can be rebased over each other, both orders
/// give the same document.
#[test]
fn random_rebase_transactions_commute() {
    let seed = rand::random::<u64>();
    println!("seed: {seed}");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let base = plain("abcdefghij");

    for _ in 0..1000 {
        let a = random_transaction(&base, &mut rng);
        let b = random_transaction(&base, &mut rng);

        let Some((a_over_b, b_over_a)) = rebase_transactions(&a, &b) else {
            continue;
        };

        let mut one = base.clone();
        TransactionProcessor::commit(&mut one, &a).unwrap();
        TransactionProcessor::commit(&mut one, &b_over_a).unwrap();

        let mut two = base.clone();
        TransactionProcessor::commit(&mut two, &b).unwrap();
        TransactionProcessor::commit(&mut two, &a_over_b).unwrap();

        assert_eq!(one, two, "a: {a:?}\nb: {b:?}");
    }
}

fn random_transaction(
    doc: &LinearDocument,
    rng: &mut impl Rng,
) -> Transaction {
    let len = doc.len();
    if rng.random_bool(0.5) {
        let offset = rng.random_range(0..=len);
        let letter = rng.random_range('A'..='Z');
        Transaction::insertion(doc, offset, [Item::from(letter)])
    } else {
        let start = rng.random_range(0..len);
        let end = rng.random_range(start + 1..=len.min(start + 3));
        Transaction::removal(doc, start..end)
    }
}
