//! End-to-end pipeline runs over the offline collaborator hub

use caseflow_pipeline::RunOptions;
use caseflow_steps::Behavior;
use caseflow_store::{EntityKey, PipelineStatus, WriteOp};
use caseflow_test_utils::{
    offline_orchestrator, tax_sale_item, temp_store, unknown_key_item, windowed_options,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn windowed_run_enriches_every_discovered_case() {
    let (store, _dir) = temp_store();
    let hub = caseflow_steps::OfflineHub::shared();
    hub.seed_case(tax_sale_item("CASE-100"));
    hub.seed_case(tax_sale_item("CASE-200"));

    let orchestrator = offline_orchestrator(&store, &hub, windowed_options());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.status_counts.completed, 2);

    // Every item carries all twelve step flags.
    for item in store.reader().claimable_items(3, true, None).unwrap() {
        panic!("nothing should remain claimable, found {}", item.item_id);
    }
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn second_run_touches_no_collaborator() {
    let (store, _dir) = temp_store();
    let hub = caseflow_steps::OfflineHub::shared();
    hub.seed_case(tax_sale_item("CASE-300"));

    let orchestrator = offline_orchestrator(&store, &hub, windowed_options());
    orchestrator.run().await.unwrap();
    assert!(hub.total_calls() > 0);

    // Same backlog, no window: everything is terminal, nothing is claimed,
    // and no external service hears from us.
    hub.reset_counts();
    let again = offline_orchestrator(&store, &hub, RunOptions::default());
    let summary = again.run().await.unwrap();
    assert_eq!(summary.claimed, 0);
    assert_eq!(hub.total_calls(), 0);
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn one_failing_step_leaves_sibling_results_in_place() {
    let (store, _dir) = temp_store();
    let hub = caseflow_steps::OfflineHub::shared();
    hub.seed_case(tax_sale_item("CASE-400"));
    hub.set_behavior("tax_status", Behavior::Fail("tax portal down".to_string()));

    let orchestrator = offline_orchestrator(&store, &hub, windowed_options());
    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 0);

    let items = store.reader().claimable_items(3, false, None).unwrap();
    assert_eq!(items.len(), 1);
    let status = store
        .reader()
        .get_status(items[0].item_id)
        .unwrap()
        .unwrap();
    assert_eq!(status.pipeline_status, PipelineStatus::Failed);
    assert_eq!(status.error_step, Some(1));
    assert!(status.last_error.unwrap().contains("tax_status"));

    // Siblings ran and flagged; only step 1 is missing.
    let flags = store.reader().step_flags(items[0].item_id).unwrap();
    assert_eq!(flags.len(), 11);
    assert!(flags.iter().all(|flag| flag.step_number != 1));
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn retry_after_outage_calls_only_the_missing_step() {
    let (store, _dir) = temp_store();
    let hub = caseflow_steps::OfflineHub::shared();
    hub.seed_case(tax_sale_item("CASE-500"));
    hub.set_behavior("tax_status", Behavior::Fail("tax portal down".to_string()));

    offline_orchestrator(&store, &hub, windowed_options())
        .run()
        .await
        .unwrap();

    hub.set_behavior("tax_status", Behavior::Fixture);
    hub.reset_counts();
    let summary = offline_orchestrator(&store, &hub, RunOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(hub.calls("tax_status"), 1);
    assert_eq!(hub.calls("listings"), 0);
    assert_eq!(hub.calls("index_documents"), 0);
    assert_eq!(hub.calls("chain_of_title"), 0);
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn retry_cap_parks_a_persistently_failing_item() {
    let (store, _dir) = temp_store();
    let hub = caseflow_steps::OfflineHub::shared();
    hub.seed_case(tax_sale_item("CASE-600"));
    hub.set_behavior("tax_status", Behavior::Fail("tax portal down".to_string()));

    offline_orchestrator(&store, &hub, windowed_options())
        .run()
        .await
        .unwrap();
    for _ in 0..2 {
        offline_orchestrator(&store, &hub, RunOptions::default())
            .run()
            .await
            .unwrap();
    }

    // Three failures against max_retries = 3: parked.
    let parked = offline_orchestrator(&store, &hub, RunOptions::default())
        .run()
        .await
        .unwrap();
    assert_eq!(parked.claimed, 0);

    // The override reclaims it anyway.
    let forced = offline_orchestrator(
        &store,
        &hub,
        RunOptions {
            retry_failed: true,
            ..RunOptions::default()
        },
    )
    .run()
    .await
    .unwrap();
    assert_eq!(forced.claimed, 1);
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn sentinel_key_skips_without_touching_services() {
    let (store, _dir) = temp_store();
    let hub = caseflow_steps::OfflineHub::shared();

    let item = unknown_key_item();
    let item_id = item.item_id;
    store
        .queue()
        .enqueue(WriteOp::InsertWorkItem(item))
        .unwrap();
    store.queue().flush().await.unwrap();

    let summary = offline_orchestrator(&store, &hub, RunOptions::default())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.skipped, 1);

    let status = store.reader().get_status(item_id).unwrap().unwrap();
    assert_eq!(status.pipeline_status, PipelineStatus::Skipped);
    assert!(status.last_error.unwrap().contains("invalid"));

    // One fallback probe, zero enrichment calls.
    assert_eq!(hub.calls("search_by_parties"), 1);
    assert_eq!(hub.total_calls(), 1);

    // Skipped is terminal: a later run ignores the item entirely.
    let later = offline_orchestrator(&store, &hub, RunOptions::default())
        .run()
        .await
        .unwrap();
    assert_eq!(later.claimed, 0);
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn fallback_search_rescues_an_invalid_key() {
    let (store, _dir) = temp_store();
    let hub = caseflow_steps::OfflineHub::shared();
    hub.set_fallback_key(EntityKey::new("CASE-REAL"));
    hub.seed_case(tax_sale_item("N/A"));

    let summary = offline_orchestrator(&store, &hub, windowed_options())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.skipped, 0);

    // Results accumulated under the resolved key, not the sentinel.
    let entity = store
        .reader()
        .entity(&EntityKey::new("CASE-REAL"))
        .unwrap()
        .unwrap();
    assert!(entity.tax.is_some());
    assert!(store
        .reader()
        .entity(&EntityKey::new("N/A"))
        .unwrap()
        .is_none());
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn shared_entity_analysis_runs_once_across_items() {
    let (store, _dir) = temp_store();
    let hub = caseflow_steps::OfflineHub::shared();

    hub.seed_case(tax_sale_item("CASE-700"));
    offline_orchestrator(&store, &hub, windowed_options())
        .run()
        .await
        .unwrap();
    assert_eq!(hub.calls("chain_of_title"), 1);

    // A later sale against the same entity: documents are unchanged, so
    // the entity-scoped analyses short-circuit.
    let resale = caseflow_store::WorkItem::new(
        "CASE-700",
        chrono::NaiveDate::from_ymd_opt(2026, 7, 20).unwrap(),
        "tax_sale",
    );
    store
        .queue()
        .enqueue(WriteOp::InsertWorkItem(resale))
        .unwrap();
    store.queue().flush().await.unwrap();

    hub.reset_counts();
    let summary = offline_orchestrator(&store, &hub, RunOptions::default())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(hub.calls("chain_of_title"), 0);
    assert_eq!(hub.calls("lien_survival"), 0);
    // Valuation is derived fresh each item.
    assert_eq!(hub.calls("valuation"), 1);
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn dry_run_reports_without_claiming() {
    let (store, _dir) = temp_store();
    let hub = caseflow_steps::OfflineHub::shared();
    hub.seed_case(tax_sale_item("CASE-800"));

    let options = RunOptions {
        dry_run: true,
        ..windowed_options()
    };
    let summary = offline_orchestrator(&store, &hub, options)
        .run()
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.status_counts.total(), 0);
    assert_eq!(hub.calls("discover"), 1);
    assert_eq!(hub.total_calls(), 1);
    store.shutdown().await.unwrap();
}
