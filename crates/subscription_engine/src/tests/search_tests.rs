use super::*;
use crate::testing::{bilibili_result, weibo_result, FakeRemoteApi, Op};

fn catalog_api() -> Arc<FakeRemoteApi> {
    Arc::new(FakeRemoteApi::new().with_catalog(vec![bilibili_result(), weibo_result()]))
}

fn orchestrator(
    api: &Arc<FakeRemoteApi>,
) -> (Arc<SearchOrchestrator>, broadcast::Receiver<EngineEvent>) {
    let (events, rx) = broadcast::channel(256);
    let orchestrator = SearchOrchestrator::new(api.clone(), DEFAULT_DEBOUNCE, events);
    (Arc::new(orchestrator), rx)
}

fn spawn_search(
    orchestrator: &Arc<SearchOrchestrator>,
    text: &str,
) -> tokio::task::JoinHandle<SearchOutcome> {
    let orchestrator = Arc::clone(orchestrator);
    let text = text.to_string();
    tokio::spawn(async move { orchestrator.search(&text).await })
}

/// Counts `is_loading` false -> true transitions seen on the event channel.
fn loading_starts(rx: &mut broadcast::Receiver<EngineEvent>) -> usize {
    let mut starts = 0;
    let mut loading = false;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::SearchChanged(snapshot) = event {
            if snapshot.is_loading && !loading {
                starts += 1;
            }
            loading = snapshot.is_loading;
        }
    }
    starts
}

async fn type_keystrokes(
    orchestrator: &Arc<SearchOrchestrator>,
    keystrokes: &[&str],
    gap: Duration,
) -> Vec<tokio::task::JoinHandle<SearchOutcome>> {
    let mut handles = Vec::new();
    for text in keystrokes {
        handles.push(spawn_search(orchestrator, text));
        tokio::time::sleep(gap).await;
    }
    handles
}

#[tokio::test(start_paused = true)]
async fn rapid_keystrokes_issue_one_request_with_final_text() {
    let api = catalog_api();
    let (orchestrator, mut rx) = orchestrator(&api);

    let handles = type_keystrokes(
        &orchestrator,
        &["b", "bi", "bil", "bili", "bilib", "bilibi", "bilibil", "bilibili"],
        Duration::from_millis(80),
    )
    .await;

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("join"));
    }

    assert_eq!(api.search_calls(), vec!["bilibili".to_string()]);
    let (last, earlier) = outcomes.split_last().expect("outcomes");
    assert!(earlier
        .iter()
        .all(|outcome| *outcome == SearchOutcome::Superseded));
    assert_eq!(last.results().len(), 1);
    assert_eq!(loading_starts(&mut rx), 1);
}

#[tokio::test(start_paused = true)]
async fn bilibili_then_bilibilihub_scenario() {
    let api = catalog_api();
    let (orchestrator, _rx) = orchestrator(&api);

    let outcome = orchestrator.search("bilibili").await;
    assert_eq!(outcome.results().len(), 1);
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(snapshot.results[0].id.as_str(), "bilibili_user_videos");

    let handles = type_keystrokes(
        &orchestrator,
        &["bilibilih", "bilibilihu", "bilibilihub"],
        Duration::from_millis(50),
    )
    .await;
    for handle in handles {
        handle.await.expect("join");
    }

    assert_eq!(
        api.search_calls(),
        vec!["bilibili".to_string(), "bilibilihub".to_string()]
    );
    assert!(orchestrator.snapshot().is_empty_result());
}

#[tokio::test(start_paused = true)]
async fn older_response_never_overwrites_newer_results() {
    let api = catalog_api();
    api.delay_search("bili", Duration::from_secs(1));
    let (orchestrator, _rx) = orchestrator(&api);

    let slow = spawn_search(&orchestrator, "bili");
    tokio::time::sleep(Duration::from_millis(350)).await;
    let fast = orchestrator.search("weibo").await;

    assert_eq!(fast.results().len(), 1);
    assert_eq!(slow.await.expect("join"), SearchOutcome::Superseded);

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.results, vec![weibo_result()]);
    assert!(!snapshot.is_loading);
    assert_eq!(
        api.search_calls(),
        vec!["bili".to_string(), "weibo".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn blank_input_clears_immediately_and_cancels_pending_window() {
    let api = catalog_api();
    let (orchestrator, mut rx) = orchestrator(&api);

    let pending = spawn_search(&orchestrator, "bili");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(orchestrator.search("   ").await, SearchOutcome::Cleared);
    assert_eq!(pending.await.expect("join"), SearchOutcome::Superseded);

    assert!(api.search_calls().is_empty());
    let snapshot = orchestrator.snapshot();
    assert!(snapshot.results.is_empty());
    assert!(!snapshot.show_results);
    assert_eq!(loading_starts(&mut rx), 0);
}

#[tokio::test(start_paused = true)]
async fn blank_input_discards_in_flight_response() {
    let api = catalog_api();
    api.delay_search("bili", Duration::from_secs(1));
    let (orchestrator, _rx) = orchestrator(&api);

    let in_flight = spawn_search(&orchestrator, "bili");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(orchestrator.snapshot().is_loading);

    orchestrator.search("").await;
    assert!(!orchestrator.snapshot().is_loading);

    assert_eq!(in_flight.await.expect("join"), SearchOutcome::Superseded);
    assert!(orchestrator.snapshot().results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn duplicate_query_keeps_results_without_new_request() {
    let api = catalog_api();
    let (orchestrator, mut rx) = orchestrator(&api);

    orchestrator.search("weibo").await;
    let outcome = orchestrator.search("  weibo ").await;

    assert_eq!(outcome, SearchOutcome::Unchanged(vec![weibo_result()]));
    assert_eq!(api.search_calls().len(), 1);
    assert_eq!(loading_starts(&mut rx), 1);
    assert_eq!(
        orchestrator.last_issued().map(|query| query.text),
        Some("weibo".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn failed_search_shows_no_results_and_does_not_retry() {
    let api = catalog_api();
    api.fail(Op::Search);
    let (orchestrator, _rx) = orchestrator(&api);

    let outcome = orchestrator.search("bili").await;

    assert_eq!(outcome, SearchOutcome::Results(Vec::new()));
    assert!(orchestrator.snapshot().is_empty_result());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(api.search_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn select_resets_search_so_same_query_is_issued_again() {
    let api = catalog_api();
    let (orchestrator, _rx) = orchestrator(&api);

    let outcome = orchestrator.search("bili").await;
    let chosen = orchestrator.select(&outcome.results()[0]);

    assert_eq!(chosen, bilibili_result());
    assert_eq!(orchestrator.snapshot(), SearchSnapshot::default());

    orchestrator.search("bili").await;
    assert_eq!(api.search_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_query_while_in_flight_leaves_delivery_to_first_call() {
    let api = catalog_api();
    api.delay_search("bili", Duration::from_secs(1));
    let (orchestrator, _rx) = orchestrator(&api);

    let first = spawn_search(&orchestrator, "bili");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(orchestrator.snapshot().is_loading);

    let repeated = orchestrator.search("bili ").await;

    assert_eq!(repeated, SearchOutcome::Superseded);
    assert_eq!(
        first.await.expect("join"),
        SearchOutcome::Results(vec![bilibili_result()])
    );
    assert_eq!(orchestrator.snapshot().results, vec![bilibili_result()]);
    assert_eq!(api.search_calls(), vec!["bili".to_string()]);
}
