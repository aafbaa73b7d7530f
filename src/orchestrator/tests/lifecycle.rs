use crate::config::ExportDefinition;
use crate::db::ExportStateStore;
use crate::error::Error;
use crate::orchestrator::test_helpers::*;
use crate::types::Event;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::sync::Semaphore;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_work_and_refuses_more() {
    let dir = tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let fakes = Fakes::new(FakeProvider::default().gated(gate));
    let (orchestrator, _db) = create_test_orchestrator(test_config(&dir), &fakes).await;
    let mut rx = orchestrator.subscribe();
    let ep = episode("Ep1");

    let handle = orchestrator
        .restart(ep.clone(), false)
        .await
        .unwrap()
        .into_handle()
        .unwrap();
    orchestrator.shutdown().await.unwrap();

    assert!(orchestrator.is_shut_down());
    assert!(matches!(handle.wait_end_of_treatment().await, Err(Error::Canceled)));
    wait_for_event(&mut rx, |e| matches!(e, Event::Shutdown)).await;
    assert!(matches!(
        orchestrator.restart(ep.clone(), false).await,
        Err(Error::ShuttingDown)
    ));
    assert!(!orchestrator.is_retrieving(&ep));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_keeps_the_export_in_flight_resumable() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    config.export.exporters = vec![ExportDefinition::new("copy", "cp #EPISODE#")];
    let gate = Arc::new(Semaphore::new(0));
    let mut fakes = Fakes::new(FakeProvider::default());
    fakes.exporter = Arc::new(FakeExporter {
        gate: Some(gate),
        ..FakeExporter::default()
    });
    let (orchestrator, db) = create_test_orchestrator(config, &fakes).await;
    let mut rx = orchestrator.subscribe();

    let _handle = orchestrator
        .restart(episode("Ep1"), false)
        .await
        .unwrap();
    wait_for_event(&mut rx, |e| matches!(e, Event::ExportStarting { .. })).await;
    orchestrator.shutdown().await.unwrap();

    let records = db.load_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].step, 0);
}
