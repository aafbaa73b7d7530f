use crate::orchestrator::test_helpers::*;
use crate::types::{CategoryNode, Event};
use std::sync::atomic::Ordering;
use tempfile::tempdir;

fn to_download(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::ToDownload { episode } => Some(episode.name.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nothing_selected_finishes_the_search_at_once() {
    let dir = tempdir().unwrap();
    let fakes = Fakes::new(FakeProvider::offering(&["Ep1"]));
    let (orchestrator, _db) = create_test_orchestrator(test_config(&dir), &fakes).await;
    let mut rx = orchestrator.subscribe();

    let unselected = CategoryNode::new(CHANNEL, "42", "ShowX").downloadable();
    let handles = orchestrator.start_search(vec![unselected]).unwrap();

    assert!(handles.is_empty());
    let events = drain_events(&mut rx);
    assert!(matches!(events[0], Event::SearchStarting { plugin_count: 0 }));
    assert!(matches!(events[1], Event::AllSearchDone));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_channel_is_skipped() {
    let dir = tempdir().unwrap();
    let fakes = Fakes::new(FakeProvider::offering(&["Ep1"]));
    let (orchestrator, _db) = create_test_orchestrator(test_config(&dir), &fakes).await;

    let foreign = CategoryNode::new("gone", "1", "Gone").downloadable().selected();
    assert!(orchestrator.start_search(vec![foreign]).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_retrieves_new_episodes_only() {
    let dir = tempdir().unwrap();
    let fakes = Fakes::new(FakeProvider::offering(&["Ep1", "Ep2"]));
    let (orchestrator, _db) = create_test_orchestrator(test_config(&dir), &fakes).await;
    orchestrator.set_downloaded(&episode("Ep2")).await.unwrap();
    let mut rx = orchestrator.subscribe();

    let container = CategoryNode::new(CHANNEL, "root", "Arte").with_child(show());
    for handle in orchestrator.start_search(vec![container]).unwrap() {
        handle.wait_end_of_treatment().await.unwrap();
    }
    wait_for_event(&mut rx, |e| matches!(e, Event::AllRetrieveDone)).await;

    let downloaded = orchestrator
        .find_downloaded(&show().category_ref())
        .await
        .unwrap();
    assert!(downloaded.contains("Ep1") && downloaded.contains("Ep2"));
    assert_eq!(fakes.downloader.downloads.load(Ordering::SeqCst), 1);

    // a second round finds nothing new
    let mut rx = orchestrator.subscribe();
    for handle in orchestrator.start_search(vec![show()]).unwrap() {
        handle.wait_end_of_treatment().await.unwrap();
    }
    let events = drain_events(&mut rx);
    assert!(to_download(&events).is_empty());
    assert!(events.iter().any(|e| matches!(e, Event::SearchDone { plugin } if plugin == CHANNEL)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn category_filters_apply() {
    let dir = tempdir().unwrap();
    let fakes = Fakes::new(FakeProvider::offering(&["Ep1", "Ep2 (trailer)", "Bonus"]));
    let (orchestrator, _db) = create_test_orchestrator(test_config(&dir), &fakes).await;
    let mut rx = orchestrator.subscribe();

    let mut filtered = show();
    filtered.include = vec!["^ep".into()];
    filtered.exclude = vec!["trailer".into()];
    for handle in orchestrator.start_search(vec![filtered]).unwrap() {
        handle.wait_end_of_treatment().await.unwrap();
    }

    assert_eq!(to_download(&drain_events(&mut rx)), vec!["Ep1".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_search_only_indexes() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    config.download.index_on_first_search = true;
    let fakes = Fakes::new(FakeProvider::offering(&["Ep1", "Ep2"]));
    let (orchestrator, _db) = create_test_orchestrator(config, &fakes).await;
    let mut rx = orchestrator.subscribe();

    for handle in orchestrator.start_search(vec![show()]).unwrap() {
        handle.wait_end_of_treatment().await.unwrap();
    }
    let events = drain_events(&mut rx);
    let indexed = events
        .iter()
        .filter(|e| matches!(e, Event::Indexed { .. }))
        .count();
    assert_eq!(indexed, 2);
    assert!(to_download(&events).is_empty());
    assert_eq!(
        orchestrator
            .find_downloaded(&show().category_ref())
            .await
            .unwrap()
            .len(),
        2
    );

    // later searches grab what appeared since
    fakes.provider.episodes.lock().unwrap().push(episode("Ep3"));
    for handle in orchestrator.start_search(vec![show()]).unwrap() {
        handle.wait_end_of_treatment().await.unwrap();
    }
    wait_for_event(&mut rx, |e| matches!(e, Event::Ready { episode } if episode.name == "Ep3")).await;
    assert_eq!(fakes.downloader.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn category_discovery_reports_each_provider() {
    let dir = tempdir().unwrap();
    let fakes = Fakes::new(FakeProvider::default());
    let (orchestrator, _db) = create_test_orchestrator(test_config(&dir), &fakes).await;
    let mut rx = orchestrator.subscribe();

    let results = orchestrator.find_categories().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].categories[0].children[0].name, "ShowX");
    assert!(drain_events(&mut rx).iter().any(
        |e| matches!(e, Event::CategoriesBuilt { channel, count: 1 } if channel == CHANNEL)
    ));

    fakes.provider.fail_categories.store(true, Ordering::SeqCst);
    let results = orchestrator.find_categories().await.unwrap();
    assert!(!results[0].success);
    assert!(results[0].categories.is_empty());
    assert!(drain_events(&mut rx).iter().any(|e| matches!(e, Event::CategoriesFailed { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn find_episodes_asks_the_provider() {
    let dir = tempdir().unwrap();
    let fakes = Fakes::new(FakeProvider::offering(&["Ep1", "Ep2"]));
    let (orchestrator, _db) = create_test_orchestrator(test_config(&dir), &fakes).await;

    let episodes = orchestrator.find_episodes(&show()).await.unwrap();
    assert_eq!(episodes.len(), 2);
    assert!(orchestrator.find_episodes(&CategoryNode::new("gone", "1", "Gone")).await.is_err());
}
