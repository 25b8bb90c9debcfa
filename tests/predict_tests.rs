mod common;

use common::{config, EOS, PAD};
use laint_lib::decoder::{predict_step, DecodeConfig, TableScorer};
use laint_lib::eval::{
    make_batch, pad_examples, read_id_lines, translate_corpus, EvalError, EvalExample, Vocab,
};
use laint_lib::AppError;
use ndarray::{array, Array2};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn temp_file(name: &str, content: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("laint-{}-{name}", std::process::id()));
    std::fs::write(&path, content).unwrap();
    path
}

fn copy_scorer(vocab: usize) -> TableScorer {
    TableScorer::new(Array2::zeros((vocab, vocab)), 5.0, PAD, EOS).unwrap()
}

fn test_vocab() -> Vocab {
    Vocab::new(
        ["<pad>", "<unk>", "</s>", " the", " cat", " sat"]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        vec![PAD, EOS],
    )
}

#[test]
fn copy_scorer_reproduces_sources() {
    init_logger();
    let mut scorer = copy_scorer(6);
    let inputs = make_batch(&[vec![3, 4, 5], vec![5, 3], vec![4]], PAD);
    let out = predict_step(&mut scorer, inputs.view(), &config(2, 5)).unwrap();

    assert_eq!(
        out.tokens,
        array![[3, 4, 5, 2, 0], [5, 3, 2, 0, 0], [4, 2, 0, 0, 0]]
    );
    assert!(out.finished.iter().all(|&f| f));
    assert!(out.scores.iter().all(|s| s.is_finite() && *s < 0.0));
}

#[test]
fn translate_corpus_drops_padding_rows() {
    init_logger();
    let examples = vec![
        EvalExample {
            source: vec![3, 4, 5],
            target: vec![3, 4, 5, EOS],
        },
        EvalExample {
            source: vec![4, 5],
            target: vec![4, 5, EOS],
        },
        EvalExample {
            source: vec![3],
            target: vec![3, EOS],
        },
    ];
    let cfg = DecodeConfig {
        batch_size: 2,
        ..config(2, 5)
    };

    let report = translate_corpus(&mut copy_scorer(6), &examples, &test_vocab(), &cfg).unwrap();

    assert_eq!(report.predictions, vec!["the cat sat", "cat sat", "the"]);
    assert_eq!(report.predictions, report.references);
    assert_eq!(report.sources, report.references);
    assert_eq!(report.stats.translation_length, 6);
    assert!((report.bleu - 100.0).abs() < 1e-3);
}

#[test]
fn translate_corpus_of_nothing_is_empty() {
    let report = translate_corpus(&mut copy_scorer(6), &[], &test_vocab(), &config(2, 5)).unwrap();
    assert!(report.predictions.is_empty());
    assert_eq!(report.bleu, 0.0);
}

#[test]
fn pad_examples_repeats_last_row() {
    let x = array![[1, 2], [3, 4]];
    let padded = pad_examples(x.view(), 4);
    assert_eq!(padded, array![[1, 2], [3, 4], [3, 4], [3, 4]]);

    assert_eq!(pad_examples(x.view(), 2), x);
    assert_eq!(pad_examples(x.view(), 1), x);
}

#[test]
fn make_batch_pads_on_the_right() {
    let batch = make_batch(&[vec![1], vec![2, 3, 4], vec![]], 9);
    assert_eq!(batch, array![[1, 9, 9], [2, 3, 4], [9, 9, 9]]);
}

#[test]
fn id_lines_parse_and_report_bad_tokens() {
    let path = temp_file("ids.txt", "3 4 5\n4  5\n\n");
    let rows = read_id_lines(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(rows, vec![vec![3, 4, 5], vec![4, 5], vec![]]);

    let path = temp_file("bad-ids.txt", "1 2\n3 x\n");
    let err = read_id_lines(&path).unwrap_err();
    std::fs::remove_file(&path).ok();
    match err {
        EvalError::Parse { line, token } => {
            assert_eq!(line, 2);
            assert_eq!(token, "x");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn vocab_file_round_trips_pieces() {
    let path = temp_file(
        "vocab.txt",
        "<pad> 0\n<unk> 1\n</s> 2\n\u{2581}the 3\n\u{2581}cat 4\ns 5\n",
    );
    let vocab = Vocab::load(&path, vec![PAD, EOS]).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(vocab.len(), 6);
    assert_eq!(vocab.piece(3), Some(" the"));
    assert_eq!(vocab.piece(42), None);
    assert_eq!(vocab.detokenize(&[3, 4, 5, EOS, PAD]), "the cats");
}

#[test]
fn empty_vocab_file_is_rejected() {
    let path = temp_file("empty-vocab.txt", "\n\n");
    let err = Vocab::load(&path, vec![]).unwrap_err();
    std::fs::remove_file(&path).ok();
    assert!(matches!(err, EvalError::EmptyVocab(_)));
}

#[test]
fn vocab_ids_beyond_entry_count_are_rejected() {
    for (name, content, bad_id) in [
        ("huge-id-vocab.txt", "<pad> 0\nx 18446744073709551615\n", usize::MAX),
        ("sparse-vocab.txt", "<pad> 0\n</s> 2\nx 1000000000000\n", 1_000_000_000_000),
    ] {
        let path = temp_file(name, content);
        let err = Vocab::load(&path, vec![PAD]).unwrap_err();
        std::fs::remove_file(&path).ok();
        match err {
            EvalError::VocabId { id, entries } => {
                assert_eq!(id, bad_id);
                assert_eq!(entries, content.lines().count());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

#[test]
fn table_model_loads_from_json() {
    let path = temp_file(
        "model.json",
        r#"{ "transitions": [[0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]],
             "source_bonus": 5.0 }"#,
    );
    let mut scorer = TableScorer::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(scorer.vocab_size(), 4);

    let out = predict_step(&mut scorer, array![[3, 1]].view(), &config(2, 4)).unwrap();
    assert_eq!(out.tokens.row(0).to_vec(), vec![3, 1, EOS, PAD]);
}

#[test]
fn ragged_table_is_rejected() {
    let path = temp_file("ragged.json", r#"{ "transitions": [[0, 0, 0], [0, 0]] }"#);
    let result = TableScorer::from_json_file(&path);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}

#[test]
fn app_errors_keep_user_messages() {
    let err = AppError::from(EvalError::LineCount {
        references: 3,
        hypotheses: 2,
    });
    assert!(err.user_message().contains("same number of lines"));
    assert!(err.to_string().contains("3 references but 2 hypotheses"));
}
