//! Bound-join batching, correlation and fallback behavior against stub
//! endpoints.

mod support;

use fedra_exec::{BoundJoinEvaluator, FedError, ROW_INDEX_VAR};
use fedra_model::{BindingSet, RdfTerm};
use support::*;

#[tokio::test]
async fn test_twenty_bindings_split_into_blocks_of_fifteen_and_five() {
    let fctx = fctx();
    let endpoint = StubEndpoint::linear("ep", 20);
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint.clone());

    let left = left_stream((0..20).map(subject).collect());
    let mut exec = evaluator.evaluate(fctx.begin_query(), name_operand(), left, None);
    let rows = exec.collect_rows().await.unwrap();

    assert_eq!(rows.len(), 20);
    for (n, row) in rows.iter().enumerate() {
        assert_eq!(row.get("s"), Some(&iri(&format!("s{n}"))));
        assert_eq!(row.get("v"), Some(&iri(&format!("v{n}"))));
        assert_eq!(row.get(ROW_INDEX_VAR), None);
    }

    let queries = endpoint.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].matches("(<").count(), 15);
    assert_eq!(queries[1].matches("(<").count(), 5);
}

#[tokio::test]
async fn test_batched_and_naive_paths_produce_identical_rows() {
    let pairs: Vec<_> = (0..8)
        .map(|n| (format!("{EX}s{n}"), format!("{EX}v{n}")))
        .collect();

    let batched_ep = StubEndpoint::new("batched", pairs.clone());
    let naive_ep = StubEndpoint::rejecting_values("naive", pairs);

    let fctx = fctx();
    let mut batched = BoundJoinEvaluator::new(fctx.clone(), batched_ep.clone()).evaluate(
        fctx.begin_query(),
        name_operand(),
        left_stream((0..8).map(subject).collect()),
        None,
    );
    let mut naive = BoundJoinEvaluator::new(fctx.clone(), naive_ep.clone()).evaluate(
        fctx.begin_query(),
        name_operand(),
        left_stream((0..8).map(subject).collect()),
        None,
    );

    let batched_rows = batched.collect_rows().await.unwrap();
    let naive_rows = naive.collect_rows().await.unwrap();
    assert_eq!(batched_rows, naive_rows);
    assert_eq!(batched_rows.len(), 8);

    // The rejected VALUES request was retried one plain request per binding.
    assert_eq!(batched_ep.values_query_count(), 1);
    assert_eq!(naive_ep.values_query_count(), 1);
    assert_eq!(naive_ep.queries().len(), 9);
}

#[tokio::test]
async fn test_malformed_retry_runs_even_for_silent_operand() {
    let fctx = fctx();
    let endpoint = StubEndpoint::rejecting_values(
        "ep",
        vec![(format!("{EX}s0"), format!("{EX}v0")), (format!("{EX}s1"), format!("{EX}v1"))],
    );
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint);

    let left = left_stream(vec![subject(0), subject(1)]);
    let mut exec = evaluator.evaluate(fctx.begin_query(), name_operand().silent(), left, None);
    let rows = exec.collect_rows().await.unwrap();

    // Real rows, not silent pass-through: the rejection is retried.
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("v"), Some(&iri("v0")));
}

#[tokio::test]
async fn test_unparsable_row_index_is_a_hard_error_despite_silent() {
    let fctx = fctx();
    let endpoint = ScriptedEndpoint::new(
        "ep",
        vec![Script::Rows(vec![BindingSet::from_pairs([
            ("v", iri("v0")),
            (ROW_INDEX_VAR, RdfTerm::literal("not-a-number")),
        ])])],
    );
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint);

    let left = left_stream(vec![subject(0), subject(1)]);
    let mut exec = evaluator.evaluate(fctx.begin_query(), name_operand().silent(), left, None);
    let err = exec.collect_rows().await.unwrap_err();
    assert!(matches!(err.primary(), FedError::ProtocolViolation(_)));
}

#[tokio::test]
async fn test_out_of_range_row_index_is_a_hard_error() {
    let fctx = fctx();
    let endpoint = ScriptedEndpoint::new(
        "ep",
        vec![Script::Rows(vec![BindingSet::from_pairs([
            ("v", iri("v0")),
            (ROW_INDEX_VAR, RdfTerm::literal("7")),
        ])])],
    );
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint);

    let left = left_stream(vec![subject(0), subject(1)]);
    let mut exec = evaluator.evaluate(fctx.begin_query(), name_operand(), left, None);
    let err = exec.collect_rows().await.unwrap_err();
    assert!(matches!(err.primary(), FedError::ProtocolViolation(_)));
}

#[tokio::test]
async fn test_disjoint_block_evaluates_as_cross_product() {
    let fctx = fctx();
    let endpoint = StubEndpoint::linear("ep", 3);
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint.clone());

    // Block variable ?x shares nothing with the operand (?s, ?v).
    let left = left_stream(
        (0..4)
            .map(|n| BindingSet::singleton("x", iri(&format!("x{n}"))))
            .collect(),
    );
    let mut exec = evaluator.evaluate(fctx.begin_query(), name_operand(), left, None);
    let rows = exec.collect_rows().await.unwrap();

    assert_eq!(rows.len(), 12);
    for row in &rows {
        assert!(row.get("x").is_some());
        assert!(row.get("s").is_some());
        assert!(row.get("v").is_some());
    }
    // One unbound request, no VALUES.
    assert_eq!(endpoint.queries().len(), 1);
    assert_eq!(endpoint.values_query_count(), 0);
}

#[tokio::test]
async fn test_single_binding_block_uses_plain_bound_request() {
    let fctx = fctx();
    let endpoint = StubEndpoint::linear("ep", 1);
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint.clone());

    let mut exec = evaluator.evaluate(
        fctx.begin_query(),
        name_operand(),
        left_stream(vec![subject(0)]),
        None,
    );
    let rows = exec.collect_rows().await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("v"), Some(&iri("v0")));
    let queries = endpoint.queries();
    assert_eq!(queries.len(), 1);
    assert!(!queries[0].contains("VALUES"));
    assert!(queries[0].starts_with("SELECT ?v "));
}

#[tokio::test]
async fn test_fully_bound_single_binding_uses_ask() {
    let fctx = fctx();
    let endpoint = StubEndpoint::new(
        "ep",
        vec![(format!("{EX}s0"), format!("{EX}v0"))],
    );
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint.clone());

    let present = BindingSet::from_pairs([("s", iri("s0")), ("v", iri("v0"))]);
    let absent = BindingSet::from_pairs([("s", iri("s0")), ("v", iri("nope"))]);

    let mut exec = evaluator.evaluate(
        fctx.begin_query(),
        name_operand(),
        left_stream(vec![present.clone()]),
        None,
    );
    assert_eq!(exec.collect_rows().await.unwrap(), vec![present]);

    let mut exec = evaluator.evaluate(
        fctx.begin_query(),
        name_operand(),
        left_stream(vec![absent]),
        None,
    );
    assert!(exec.collect_rows().await.unwrap().is_empty());

    let queries = endpoint.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries.iter().all(|q| q.starts_with("ASK")));
}

#[tokio::test]
async fn test_silent_operand_passes_block_through_on_remote_failure() {
    let fctx = fctx();
    let endpoint = StubEndpoint::failing("ep", FailureKind::Remote);
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint);

    let input: Vec<_> = (0..3).map(subject).collect();
    let mut exec = evaluator.evaluate(
        fctx.begin_query(),
        name_operand().silent(),
        left_stream(input.clone()),
        None,
    );
    assert_eq!(exec.collect_rows().await.unwrap(), input);
}

#[tokio::test]
async fn test_remote_failure_surfaces_when_not_silent() {
    let fctx = fctx();
    let endpoint = StubEndpoint::failing("ep", FailureKind::Unavailable);
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint);

    let mut exec = evaluator.evaluate(
        fctx.begin_query(),
        name_operand(),
        left_stream((0..3).map(subject).collect()),
        None,
    );
    let err = exec.collect_rows().await.unwrap_err();
    assert!(matches!(err.primary(), FedError::RemoteUnavailable { .. }));
}

#[tokio::test]
async fn test_original_binding_values_win_over_returned_values() {
    let fctx = fctx();
    let endpoint = ScriptedEndpoint::new(
        "ep",
        vec![Script::Rows(vec![BindingSet::from_pairs([
            ("v", iri("remote-v")),
            (ROW_INDEX_VAR, RdfTerm::literal("0")),
        ])])],
    );
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint);

    let first = BindingSet::from_pairs([("s", iri("s0")), ("v", iri("original-v"))]);
    let left = left_stream(vec![first, subject(1)]);
    let mut exec = evaluator.evaluate(fctx.begin_query(), name_operand(), left, None);
    let rows = exec.collect_rows().await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("v"), Some(&iri("original-v")));
}

#[tokio::test]
async fn test_left_join_emits_unmatched_bindings_unchanged() {
    let fctx = fctx();
    // Data only for s0; s1 has no match.
    let endpoint = StubEndpoint::linear("ep", 1);
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint);

    let left = left_stream(vec![subject(0), subject(1)]);
    let mut exec = evaluator.evaluate_left(fctx.begin_query(), name_operand(), left, None);
    let rows = exec.collect_rows().await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("s"), Some(&iri("s0")));
    assert_eq!(rows[0].get("v"), Some(&iri("v0")));
    assert_eq!(rows[1], subject(1));
}

#[tokio::test]
async fn test_block_size_zero_packs_everything_into_one_request() {
    let fctx = fctx_with(
        fedra_exec::FederationConfig::default()
            .with_max_query_time(None)
            .with_block_size(0),
    );
    let endpoint = StubEndpoint::linear("ep", 40);
    let evaluator = BoundJoinEvaluator::new(fctx.clone(), endpoint.clone());

    let left = left_stream((0..40).map(subject).collect());
    let mut exec = evaluator.evaluate(fctx.begin_query(), name_operand(), left, None);
    let rows = exec.collect_rows().await.unwrap();

    assert_eq!(rows.len(), 40);
    assert_eq!(endpoint.queries().len(), 1);
}
