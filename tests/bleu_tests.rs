use laint_lib::eval::{bleu_partial, complete_bleu, corpus_bleu, BleuStats, EvalError};

#[test]
fn identical_corpus_scores_hundred() {
    let refs = ["the cat sat on the mat .", "a dog barked loudly today"];
    let bleu = corpus_bleu(&refs, &refs).unwrap();
    assert!((bleu - 100.0).abs() < 1e-3);
}

#[test]
fn empty_hypotheses_score_zero() {
    let refs = ["the cat sat on the mat"];
    let hyps = [""];
    assert_eq!(corpus_bleu(&refs, &hyps).unwrap(), 0.0);
}

#[test]
fn short_hypothesis_gets_brevity_penalty() {
    let refs = ["a b c d e f g h"];
    let hyps = ["a b c d"];
    let bleu = corpus_bleu(&refs, &hyps).unwrap();
    assert!((bleu - 36.788).abs() < 0.01, "bleu = {bleu}");

    let stats = bleu_partial(&refs, &hyps, false).unwrap();
    assert!((complete_bleu(&stats, false) - 100.0).abs() < 1e-3);
}

#[test]
fn missing_orders_are_smoothed() {
    let refs = ["a b c d"];
    let hyps = ["a b x y"];
    let stats = bleu_partial(&refs, &hyps, false).unwrap();
    assert_eq!(stats.matches_by_order, [2, 1, 0, 0]);
    assert_eq!(stats.possible_matches_by_order, [4, 3, 2, 1]);

    // (1/2 * 1/3 * 1/4 * 1/4) ^ (1/4)
    let bleu = complete_bleu(&stats, true);
    assert!((bleu - 31.947).abs() < 0.01, "bleu = {bleu}");
}

#[test]
fn clipped_counts_limit_repeated_words() {
    let stats = bleu_partial(&["the cat"], &["the the the"], false).unwrap();
    assert_eq!(stats.matches_by_order[0], 1);
    assert_eq!(stats.possible_matches_by_order[0], 3);
    assert_eq!(stats.translation_length, 3);
    assert_eq!(stats.reference_length, 2);
}

#[test]
fn shard_statistics_sum_to_corpus_statistics() {
    let refs = [
        "the quick brown fox",
        "jumps over the lazy dog",
        "hello , world !",
        "one two three four five",
    ];
    let hyps = [
        "the quick fox",
        "jumps over a lazy dog",
        "hello world !",
        "one two three four five six",
    ];
    let whole = bleu_partial(&refs, &hyps, false).unwrap();

    let first = bleu_partial(&refs[..1], &hyps[..1], false).unwrap();
    let second = bleu_partial(&refs[1..3], &hyps[1..3], false).unwrap();
    let third = bleu_partial(&refs[3..], &hyps[3..], false).unwrap();

    let summed: BleuStats = [third, first, second].into_iter().sum();
    assert_eq!(summed, whole);
    assert_eq!(first + second + third, whole);
    assert_eq!(complete_bleu(&summed, true), complete_bleu(&whole, true));
}

#[test]
fn default_scoring_ignores_case() {
    let refs = ["The Cat Sat"];
    let hyps = ["the cat sat"];
    assert!((corpus_bleu(&refs, &hyps).unwrap() - 100.0).abs() < 1e-3);

    let sensitive = bleu_partial(&refs, &hyps, true).unwrap();
    assert_eq!(sensitive.matches_by_order[0], 0);
}

#[test]
fn punctuation_is_scored_as_separate_tokens() {
    let stats = bleu_partial(&["stop."], &["stop ."], false).unwrap();
    assert_eq!(stats.reference_length, 2);
    assert_eq!(stats.matches_by_order[1], 1);
}

#[test]
fn mismatched_line_counts_are_rejected() {
    let err = corpus_bleu(&["a", "b"], &["a"]).unwrap_err();
    assert!(matches!(
        err,
        EvalError::LineCount {
            references: 2,
            hypotheses: 1
        }
    ));
    assert!(err.user_message().contains("same number of lines"));
}

#[test]
fn stats_serialize_for_aggregation() {
    let stats = bleu_partial(&["a b"], &["a b"], false).unwrap();
    let json = serde_json::to_string(&stats).unwrap();
    let back: BleuStats = serde_json::from_str(&json).unwrap();
    assert_eq!(back, stats);
}
