//! End-to-end pipeline tests: submission through supply hand-off, shutdown
//! without item loss, delivery exclusivity under concurrent pull callers.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::observe::test_support::{init_tracing, RecordingObserver};
use crate::pipeline::batch::FlushReason;
use crate::pipeline::orchestrator::Pipeline;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn config(max_items: usize, max_wait: Duration, workers: usize) -> PipelineConfig {
    PipelineConfig::new()
        .with_max_items(max_items)
        .with_max_wait(max_wait)
        .with_worker_pool_size(workers)
}

#[tokio::test]
async fn test_count_trigger_end_to_end() {
    // MaxItems=3: submitting C,D,E flushes the instant the third arrives.
    let pipeline: Pipeline<&str> =
        Pipeline::new(config(3, Duration::from_secs(60), 2)).unwrap();
    pipeline.start().unwrap();

    pipeline.submit("c").await.unwrap();
    pipeline.submit("d").await.unwrap();
    pipeline.submit("e").await.unwrap();

    let batch = pipeline
        .request_supply_timeout(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(batch.reason(), FlushReason::Count);
    assert_eq!(batch.ids(), vec![1, 2, 3]);
    let payloads: Vec<_> = batch.items().iter().map(|i| i.payload).collect();
    assert_eq!(payloads, vec!["c", "d", "e"]);
}

#[tokio::test(start_paused = true)]
async fn test_time_trigger_end_to_end() {
    init_tracing();
    // MaxItems=3, MaxWait=50ms: A,B wait out the window and flush together.
    let pipeline: Pipeline<&str> =
        Pipeline::new(config(3, Duration::from_millis(50), 2)).unwrap();
    pipeline.start().unwrap();

    pipeline.submit("a").await.unwrap();
    pipeline.submit("b").await.unwrap();

    let batch = pipeline.request_supply().await.unwrap();
    assert_eq!(batch.reason(), FlushReason::Time);
    assert_eq!(batch.ids(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_submit_suspends_on_full_ingest_queue() {
    init_tracing();
    // Single-slot queues throughout and no pull caller: the lone worker
    // holds batch 1, the routing queue holds batch 2, the assembler blocks
    // flushing batch 3 and item 4 fills the ingest queue.
    let cfg = PipelineConfig::new()
        .with_max_items(1)
        .with_max_wait(Duration::from_secs(60))
        .with_worker_pool_size(1)
        .with_ingest_buffer(1)
        .with_flush_buffer(1);
    let pipeline: Arc<Pipeline<u32>> = Arc::new(Pipeline::new(cfg).unwrap());
    pipeline.start().unwrap();

    for i in 1..=4 {
        pipeline.submit(i).await.unwrap();
    }

    // The fifth submit must suspend on queue capacity, not fail or drop.
    let saturated = pipeline.clone();
    let mut pending = tokio::spawn(async move { saturated.submit(5).await });
    assert!(
        tokio::time::timeout(Duration::from_millis(50), &mut pending)
            .await
            .is_err(),
        "submit returned despite a full ingest queue"
    );

    // Pulling one batch frees the chain and the suspended submit completes.
    let first = pipeline.request_supply().await.unwrap();
    assert_eq!(first.ids(), vec![1]);

    let id = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("submit stayed suspended after capacity freed")
        .unwrap()
        .unwrap();
    assert_eq!(id, 5);
}

#[tokio::test]
async fn test_batch_size_bound() {
    let pipeline: Pipeline<u32> =
        Pipeline::new(config(4, Duration::from_secs(60), 3)).unwrap();
    pipeline.start().unwrap();

    for i in 0..20 {
        pipeline.submit(i).await.unwrap();
    }

    for _ in 0..5 {
        let batch = pipeline
            .request_supply_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert!(batch.len() <= 4);
        assert_eq!(batch.reason(), FlushReason::Count);
    }
}

#[tokio::test]
async fn test_unique_ids_under_concurrent_submit() {
    let pipeline: Arc<Pipeline<usize>> =
        Arc::new(Pipeline::new(config(1000, Duration::from_secs(60), 2)).unwrap());
    pipeline.start().unwrap();

    let mut submitters = Vec::new();
    for task in 0..8 {
        let pipeline = pipeline.clone();
        submitters.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for i in 0..50 {
                ids.push(pipeline.submit(task * 100 + i).await.unwrap());
            }
            ids
        }));
    }

    let mut all_ids: Vec<u64> = Vec::new();
    for submitter in submitters {
        let ids = submitter.await.unwrap();
        // Per-task ids are strictly increasing.
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        all_ids.extend(ids);
    }

    all_ids.sort_unstable();
    let expected: Vec<u64> = (1..=400).collect();
    assert_eq!(all_ids, expected);
}

#[tokio::test]
async fn test_no_item_loss_under_graceful_shutdown() {
    // k items with max_items = k+5, so no window ever auto-flushes by count;
    // everything must arrive through the forced drain flush.
    let k = 7u32;
    let pipeline: Pipeline<u32> =
        Pipeline::new(config(k as usize + 5, Duration::from_secs(60), 4)).unwrap();
    pipeline.start().unwrap();

    for i in 0..k {
        pipeline.submit(i).await.unwrap();
    }
    pipeline.close().await.unwrap();

    let mut delivered: Vec<u32> = Vec::new();
    loop {
        match pipeline.request_supply_timeout(Duration::from_secs(5)).await {
            Ok(batch) => {
                delivered.extend(batch.into_items().into_iter().map(|i| i.payload));
            }
            Err(PipelineError::SupplyClosed) => break,
            Err(e) => panic!("unexpected supply error: {}", e),
        }
    }

    delivered.sort_unstable();
    let expected: Vec<u32> = (0..k).collect();
    assert_eq!(delivered, expected, "each item exactly once");
}

#[tokio::test]
async fn test_at_most_one_delivery_with_racing_pullers() {
    let pipeline: Arc<Pipeline<u64>> =
        Arc::new(Pipeline::new(config(5, Duration::from_secs(60), 4)).unwrap());
    pipeline.start().unwrap();

    for i in 0..60 {
        pipeline.submit(i).await.unwrap();
    }
    pipeline.close().await.unwrap();

    let mut pullers = Vec::new();
    for _ in 0..12 {
        let pipeline = pipeline.clone();
        pullers.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            loop {
                match pipeline.request_supply_timeout(Duration::from_secs(5)).await {
                    Ok(batch) => ids.extend(batch.ids()),
                    Err(_) => break,
                }
            }
            ids
        }));
    }

    let mut seen: HashSet<u64> = HashSet::new();
    for puller in pullers {
        for id in puller.await.unwrap() {
            assert!(seen.insert(id), "id {} delivered to two callers", id);
        }
    }
    assert_eq!(seen.len(), 60);
}

#[tokio::test]
async fn test_idempotent_close() {
    let pipeline: Pipeline<u32> =
        Pipeline::new(config(10, Duration::from_secs(60), 2)).unwrap();
    pipeline.start().unwrap();
    pipeline.submit(1).await.unwrap();

    pipeline.close().await.unwrap();
    assert_eq!(pipeline.close().await, Err(PipelineError::AlreadyClosed));
    assert_eq!(pipeline.close().await, Err(PipelineError::AlreadyClosed));
}

#[tokio::test]
async fn test_concurrent_close_calls_serialize() {
    let pipeline: Arc<Pipeline<u32>> =
        Arc::new(Pipeline::new(config(10, Duration::from_secs(60), 2)).unwrap());
    pipeline.start().unwrap();
    pipeline.submit(1).await.unwrap();

    let mut closers = Vec::new();
    for _ in 0..4 {
        let pipeline = pipeline.clone();
        closers.push(tokio::spawn(async move { pipeline.close().await }));
    }

    let mut ok = 0;
    let mut already = 0;
    for closer in closers {
        match closer.await.unwrap() {
            Ok(()) => ok += 1,
            Err(PipelineError::AlreadyClosed) => already += 1,
            Err(e) => panic!("unexpected close error: {}", e),
        }
    }
    assert_eq!(ok, 1, "exactly one close wins");
    assert_eq!(already, 3);
}

#[tokio::test]
async fn test_drain_is_observed() {
    let observer = Arc::new(RecordingObserver::default());
    let pipeline: Pipeline<u32> = Pipeline::with_observer(
        config(10, Duration::from_secs(60), 2),
        observer.clone(),
    )
    .unwrap();
    pipeline.start().unwrap();
    pipeline.submit(1).await.unwrap();
    pipeline.submit(2).await.unwrap();
    pipeline.close().await.unwrap();

    let events: Vec<String> = observer
        .recorded()
        .into_iter()
        .map(|(_, event)| event)
        .collect();
    assert!(events.iter().any(|e| e == "assembler_drain"));
    assert!(events.iter().any(|e| e == "drain_complete"));
}

#[tokio::test]
async fn test_metrics_account_for_flushes_and_deliveries() {
    let pipeline: Pipeline<u32> =
        Pipeline::new(config(2, Duration::from_secs(60), 2)).unwrap();
    pipeline.start().unwrap();

    for i in 0..5 {
        pipeline.submit(i).await.unwrap();
    }
    pipeline.close().await.unwrap();

    let mut batches = 0;
    while pipeline
        .request_supply_timeout(Duration::from_secs(5))
        .await
        .is_ok()
    {
        batches += 1;
    }
    assert_eq!(batches, 3); // two count flushes plus the forced drain flush

    let snapshot = pipeline.metrics();
    assert_eq!(snapshot.items_submitted, 5);
    assert_eq!(snapshot.count_flushes, 2);
    assert_eq!(snapshot.forced_flushes, 1);
    assert_eq!(snapshot.batches_delivered, 3);
}

#[tokio::test]
async fn test_stop_consumer_reports_rather_than_strands() {
    let pipeline: Pipeline<u32> =
        Pipeline::new(config(2, Duration::from_secs(60), 2)).unwrap();
    pipeline.start().unwrap();

    for i in 0..8 {
        pipeline.submit(i).await.unwrap();
    }
    pipeline.stop().await;

    // Every flushed batch ends up delivered or explicitly abandoned.
    loop {
        match pipeline
            .request_supply_timeout(Duration::from_millis(50))
            .await
        {
            Err(PipelineError::SupplyClosed) => break,
            _ => continue,
        }
    }

    let snapshot = pipeline.metrics();
    assert_eq!(
        snapshot.batches_delivered + snapshot.batches_abandoned,
        snapshot.batches_flushed()
    );
}
