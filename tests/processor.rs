use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use tandem::{
    Annotation,
    AnnotationBias,
    AnnotationHash,
    AnnotationMethod,
    Item,
    LinearDocument,
    Operation,
    Transaction,
    TransactionError,
    TransactionProcessor,
};

fn two_paragraphs() -> LinearDocument {
    let mut items = vec![Item::open("heading")];
    items.extend(Item::from_str_graphemes("Title"));
    items.push(Item::close("heading"));
    items.push(Item::open("paragraph"));
    items.extend(Item::from_str_graphemes("Hello world"));
    items.push(Item::close("paragraph"));
    LinearDocument::from_items(items)
}

fn bold(doc: &mut LinearDocument) -> AnnotationHash {
    doc.store_mut().insert(Annotation::new("textStyle/bold"))
}

fn set(
    doc: &LinearDocument,
    range: std::ops::Range<usize>,
    hash: &AnnotationHash,
) -> Transaction {
    Transaction::annotation(doc, range, AnnotationMethod::Set, hash.clone())
}

/// Sets the `level` attribute of the element opening at offset 0.
fn level(
    doc: &LinearDocument,
    value: Option<serde_json::Value>,
) -> Transaction {
    Transaction::attribute_change(doc, 0, "level", value).unwrap()
}

#[test]
fn insertion_round_trip() {
    let mut doc = LinearDocument::from_text("ab");
    let original = doc.clone();

    let tx = Transaction::insertion(&doc, 2, Item::from_str_graphemes("XY"));

    TransactionProcessor::commit(&mut doc, &tx).unwrap();
    assert_eq!(doc.text(), "aXYb");
    assert_eq!(doc.len(), tx.output_length());

    TransactionProcessor::rollback(&mut doc, &tx).unwrap();
    assert_eq!(doc, original);
}

#[test]
fn removal_across_elements_round_trip() {
    let mut doc = two_paragraphs();
    let original = doc.clone();

    // From the "l" of "Title" to the "H" of "Hello", markers included.
    let tx = Transaction::removal(&doc, 4..9);

    TransactionProcessor::commit(&mut doc, &tx).unwrap();
    assert_eq!(doc.text(), "Titello world");

    TransactionProcessor::rollback(&mut doc, &tx).unwrap();
    assert_eq!(doc, original);
}

#[test]
fn annotation_round_trip() {
    let mut doc = LinearDocument::from_text("Hello");
    let hash = bold(&mut doc);
    let original = doc.clone();

    let tx = Transaction::annotation(
        &doc,
        0..4,
        AnnotationMethod::Set,
        hash.clone(),
    );

    TransactionProcessor::commit(&mut doc, &tx).unwrap();

    // The paragraph's open marker is skipped.
    assert!(!doc.data()[0].has_annotation(&hash));
    assert!(doc.data()[1].has_annotation(&hash));
    assert!(doc.data()[3].has_annotation(&hash));
    assert!(!doc.data()[4].has_annotation(&hash));

    TransactionProcessor::rollback(&mut doc, &tx).unwrap();
    assert_eq!(doc, original);
}

#[test]
fn annotation_skips_already_annotated_text() {
    let mut doc = LinearDocument::from_text("Hello");
    let hash = bold(&mut doc);

    let first = set(&doc, 2..4, &hash);
    TransactionProcessor::commit(&mut doc, &first).unwrap();

    let before = doc.clone();

    let second = set(&doc, 1..6, &hash);
    TransactionProcessor::commit(&mut doc, &second).unwrap();

    assert!((1..6).all(|offset| doc.data()[offset].has_annotation(&hash)));

    // Rolling back only clears what the second transaction set.
    TransactionProcessor::rollback(&mut doc, &second).unwrap();
    assert_eq!(doc, before);
}

#[test]
fn annotations_nest_from_the_outside_in() {
    let mut doc = LinearDocument::from_text("Hi");
    let bold = bold(&mut doc);
    let italic = doc.store_mut().insert(Annotation::new("textStyle/italic"));

    for hash in [&italic, &bold] {
        let tx = set(&doc, 1..3, hash);
        TransactionProcessor::commit(&mut doc, &tx).unwrap();
    }

    assert_eq!(doc.annotations_at(1), [italic.clone(), bold.clone()]);

    let nested = doc.clone();

    let clear = Transaction::annotation(
        &doc,
        1..2,
        AnnotationMethod::Clear,
        italic.clone(),
    );
    TransactionProcessor::commit(&mut doc, &clear).unwrap();
    assert_eq!(doc.annotations_at(1), [bold.clone()]);

    // Setting it back makes it the innermost one, which still compares
    // equal.
    TransactionProcessor::rollback(&mut doc, &clear).unwrap();
    assert_eq!(doc.annotations_at(1), [bold, italic]);
    assert_eq!(doc, nested);
}

#[test]
fn commit_all_is_all_or_nothing() {
    let mut doc = LinearDocument::from_text("ab");
    let original = doc.clone();

    let insertion = Transaction::insertion(&doc, 1, [Item::from('X')]);

    // Built for the document before the insertion.
    let stale = Transaction::insertion(&doc, 3, [Item::from('Y')]);

    let err = TransactionProcessor::commit_all(&mut doc, [&insertion, &stale])
        .unwrap_err();
    assert_eq!(
        err,
        TransactionError::LengthMismatch { expected: 5, actual: 4 }
    );
    assert_eq!(doc, original);

    let mut inserted = original.clone();
    TransactionProcessor::commit(&mut inserted, &insertion).unwrap();
    let next = Transaction::insertion(&inserted, 3, [Item::from('Y')]);

    TransactionProcessor::commit_all(&mut doc, [&insertion, &next]).unwrap();
    assert_eq!(doc.text(), "XaYb");
}

#[test]
fn attribute_round_trip() {
    let mut doc = two_paragraphs();
    let original = doc.clone();

    let tx = level(&doc, Some(json!(2)));

    TransactionProcessor::commit(&mut doc, &tx).unwrap();
    let heading = doc.data()[0].element().unwrap();
    assert_eq!(heading.attribute("level"), Some(&json!(2)));

    TransactionProcessor::rollback(&mut doc, &tx).unwrap();
    assert_eq!(doc, original);
    assert_eq!(doc.data()[0].element().unwrap().attribute("level"), None);
}

#[test]
fn attribute_change_on_text_fails() {
    let doc = two_paragraphs();
    let err =
        Transaction::attribute_change(&doc, 1, "level", None).unwrap_err();
    assert_eq!(err, TransactionError::NotAnElement { offset: 1 });
}

#[test]
fn length_mismatch_leaves_document_untouched() {
    let short = LinearDocument::from_text("ab");
    let mut doc = LinearDocument::from_text("abc");
    let original = doc.clone();

    let tx = Transaction::insertion(&short, 1, [Item::from('X')]);

    let err = TransactionProcessor::commit(&mut doc, &tx).unwrap_err();
    assert_eq!(
        err,
        TransactionError::LengthMismatch { expected: 5, actual: 4 }
    );
    assert_eq!(doc, original);
}

#[test]
fn removal_mismatch_leaves_document_untouched() {
    let other = LinearDocument::from_text("xyz");
    let mut doc = LinearDocument::from_text("abc");
    let original = doc.clone();

    // Inserts first, so the mismatch is only found after a valid operation.
    let tx = Transaction::from_operations([
        Operation::Retain { length: 1 },
        Operation::Replace { remove: vec![], insert: vec![Item::from('!')] },
        Operation::Replace {
            remove: other.slice(1..3),
            insert: vec![],
        },
        Operation::Retain { length: 2 },
    ]);

    let err = TransactionProcessor::commit(&mut doc, &tx).unwrap_err();
    assert_eq!(err, TransactionError::RemovalMismatch { offset: 1 });
    assert_eq!(doc, original);
}

#[test]
fn setting_annotation_twice_fails() {
    let mut doc = LinearDocument::from_text("Hello");
    let hash = bold(&mut doc);

    let tx = set(&doc, 1..3, &hash);

    TransactionProcessor::commit(&mut doc, &tx).unwrap();
    let annotated = doc.clone();

    let err = TransactionProcessor::commit(&mut doc, &tx).unwrap_err();
    assert_eq!(
        err,
        TransactionError::AnnotationAlreadySet { offset: 1, annotation: hash }
    );
    assert_eq!(doc, annotated);
}

#[test]
fn clearing_missing_annotation_fails() {
    let mut doc = LinearDocument::from_text("Hello");
    let hash = bold(&mut doc);

    let tx = Transaction::from_operations([
        Operation::Retain { length: 1 },
        Operation::Annotate {
            method: AnnotationMethod::Clear,
            bias: AnnotationBias::Start,
            annotation: hash.clone(),
        },
        Operation::Retain { length: 2 },
        Operation::Annotate {
            method: AnnotationMethod::Clear,
            bias: AnnotationBias::End,
            annotation: hash.clone(),
        },
        Operation::Retain { length: 4 },
    ]);

    let err = TransactionProcessor::commit(&mut doc, &tx).unwrap_err();
    assert_eq!(
        err,
        TransactionError::AnnotationNotSet { offset: 1, annotation: hash }
    );
}

#[test]
fn unbalanced_annotation_fails() {
    let mut doc = LinearDocument::from_text("Hello");
    let hash = bold(&mut doc);
    let original = doc.clone();

    let tx = Transaction::from_operations([
        Operation::Retain { length: 1 },
        Operation::Annotate {
            method: AnnotationMethod::Set,
            bias: AnnotationBias::Start,
            annotation: hash.clone(),
        },
        Operation::Retain { length: 6 },
    ]);

    let err = TransactionProcessor::commit(&mut doc, &tx).unwrap_err();
    assert_eq!(
        err,
        TransactionError::UnbalancedAnnotation { annotation: hash }
    );
    assert_eq!(doc, original);
}

#[test]
fn attribute_mismatch_fails() {
    let mut doc = two_paragraphs();

    let tx = level(&doc, Some(json!(1)));

    TransactionProcessor::commit(&mut doc, &tx).unwrap();

    let err = TransactionProcessor::commit(&mut doc, &tx).unwrap_err();
    assert_eq!(
        err,
        TransactionError::AttributeMismatch { offset: 0, key: "level".into() }
    );
}

#[test]
fn empty_transaction_is_identity() {
    let mut doc = LinearDocument::from_text("abc");
    let original = doc.clone();
    TransactionProcessor::commit(&mut doc, &Transaction::default()).unwrap();
    assert_eq!(doc, original);
}

#[test]
fn random_round_trips() {
    let seed = rand::random::<u64>();
    println!("seed: {seed}");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    test_random_round_trips(&mut rng, 500);
}

fn test_random_round_trips(rng: &mut impl Rng, iterations: usize) {
    let mut doc = two_paragraphs();
    let hashes = [bold(&mut doc), {
        let italic = Annotation::new("textStyle/italic");
        doc.store_mut().insert(italic)
    }];

    for _ in 0..iterations {
        let tx = random_transaction(&doc, &hashes, rng);
        let before = doc.clone();

        TransactionProcessor::commit(&mut doc, &tx).unwrap();
        assert_eq!(doc.len(), tx.output_length());

        let after = doc.clone();

        TransactionProcessor::rollback(&mut doc, &tx).unwrap();
        assert_eq!(doc, before);

        // Keep going from the edited document.
        TransactionProcessor::commit(&mut doc, &tx).unwrap();
        assert_eq!(doc, after);
    }
}

fn random_transaction(
    doc: &LinearDocument,
    hashes: &[AnnotationHash],
    rng: &mut impl Rng,
) -> Transaction {
    let len = doc.len();

    let random_range = |rng: &mut dyn rand::RngCore| {
        let start = rng.random_range(0..=len);
        let end = rng.random_range(start..=(start + 4).min(len));
        start..end
    };

    match rng.random_range(0..4) {
        0 => {
            let offset = rng.random_range(0..=len);
            let letter = rng.random_range('a'..='z');
            let text = (0..rng.random_range(1..4)).map(|_| letter);
            let items = text.map(Item::from).collect::<Vec<_>>();
            Transaction::insertion(doc, offset, items)
        },
        1 => Transaction::removal(doc, random_range(rng)),
        2 => {
            let items = Item::from_str_graphemes("~");
            Transaction::replacement(doc, random_range(rng), items)
        },
        _ => {
            let hash = hashes[rng.random_range(0..hashes.len())].clone();
            let method = if rng.random_bool(0.5) {
                AnnotationMethod::Set
            } else {
                AnnotationMethod::Clear
            };
            Transaction::annotation(doc, random_range(rng), method, hash)
        },
    }
}
