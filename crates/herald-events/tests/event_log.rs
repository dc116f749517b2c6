//! Concurrency behaviour of the event log: slow consumers, concurrent
//! producers, and replay/feed continuity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use herald_events::{Actor, CONTAINER_EVENT_TYPE, EventLog, EventLogConfig, Filter, NO_REPLAY};
use herald_telemetry::{LogConfig, LogFormat, setup_logging};

fn init_logging() {
    // Only the first test to run installs the subscriber.
    let _ = setup_logging(
        &LogConfig::new("herald_events=debug")
            .with_format(LogFormat::Compact)
            .without_ansi(),
    );
}

fn seq(id: &str) -> usize {
    id.trim_start_matches('e').parse().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_consumer_does_not_block_others_or_producer() {
    init_logging();
    let config = EventLogConfig::default()
        .with_publish_timeout(Duration::from_millis(50))
        .with_subscriber_buffer(1);
    let log = Arc::new(EventLog::with_config(&config));

    let stalled = log.subscribe();
    let mut healthy = log.subscribe();

    let reader = tokio::spawn(async move {
        let mut seen = Vec::new();
        while seen.len() < 5 {
            let event = healthy.feed.recv().await.unwrap();
            seen.push(event.actor().id.clone());
        }
        seen
    });

    let started = Instant::now();
    for i in 0..5 {
        tokio::time::timeout(
            Duration::from_secs(2),
            log.log("start", CONTAINER_EVENT_TYPE, Actor::new(format!("e{i}"))),
        )
        .await
        .expect("log blocked on a stalled subscriber");
    }
    // The stalled feed costs at most one timeout per event.
    assert!(started.elapsed() < Duration::from_secs(2));

    let seen = tokio::time::timeout(Duration::from_secs(2), reader)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, ["e0", "e1", "e2", "e3", "e4"]);

    // The stalled subscriber only holds what fit in its buffer.
    let mut stalled_feed = stalled.feed;
    assert_eq!(stalled_feed.try_recv().unwrap().actor().id, "e0");
    assert!(stalled_feed.try_recv().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_respect_capacity_and_count() {
    init_logging();
    let config = EventLogConfig::default().with_history_capacity(16);
    let log = Arc::new(EventLog::with_config(&config));
    let mut subscribed = log.subscribe();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                for i in 0..25 {
                    log.log("create", CONTAINER_EVENT_TYPE, Actor::new(format!("p{p}-{i}")))
                        .await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    let received = std::iter::from_fn(|| subscribed.feed.try_recv()).count();
    assert_eq!(received, 100);

    let (replay, _feed) = log.subscribe_topic(0, 0, Filter::new());
    assert_eq!(replay.len(), 16);
    assert_eq!(log.subscribers_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_publish_in_append_order() {
    init_logging();
    const PER_PRODUCER: usize = 250;
    const TOTAL: usize = 4 * PER_PRODUCER;
    let config = EventLogConfig::default()
        .with_history_capacity(TOTAL)
        .with_subscriber_buffer(TOTAL);
    let log = Arc::new(EventLog::with_config(&config));
    let mut subscribed = log.subscribe();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                for i in 0..PER_PRODUCER {
                    log.log("create", CONTAINER_EVENT_TYPE, Actor::new(format!("p{p}-{i}")))
                        .await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    let appended: Vec<String> = log
        .subscribe()
        .history
        .iter()
        .map(|e| e.actor().id.clone())
        .collect();
    let fed: Vec<String> = std::iter::from_fn(|| subscribed.feed.try_recv())
        .map(|e| e.actor().id.clone())
        .collect();

    assert_eq!(appended.len(), TOTAL);
    assert_eq!(fed, appended);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_during_logging_never_loses_events() {
    init_logging();
    const TOTAL: usize = 300;
    let config = EventLogConfig::default().with_history_capacity(TOTAL);
    let log = Arc::new(EventLog::with_config(&config));

    let producer = {
        let log = Arc::clone(&log);
        tokio::spawn(async move {
            for i in 0..TOTAL {
                log.log("create", CONTAINER_EVENT_TYPE, Actor::new(format!("e{i}")))
                    .await;
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    // Subscribe somewhere in the middle of the stream.
    tokio::time::sleep(Duration::from_millis(1)).await;
    let mut subscribed = log.subscribe();
    producer.await.unwrap();

    let replayed: Vec<usize> = subscribed
        .history
        .iter()
        .map(|e| seq(&e.actor().id))
        .collect();
    assert_eq!(replayed, (0..replayed.len()).collect::<Vec<_>>());

    let mut live = Vec::new();
    while let Some(event) = subscribed.feed.try_recv() {
        live.push(seq(&event.actor().id));
    }

    // Every event after the replay shows up live, in order. The first live
    // event may repeat the end of the replay.
    let first_missing = replayed.len();
    let tail: Vec<usize> = live.into_iter().filter(|&s| s >= first_missing).collect();
    assert_eq!(tail, (first_missing..TOTAL).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_filtered_subscription_with_no_replay() {
    init_logging();
    let log = EventLog::new();
    log.log("die", CONTAINER_EVENT_TYPE, Actor::new("old")).await;

    let filter = Filter::parse(["event=die", "label=tier=web"]).unwrap();
    let (replay, mut feed) = log.subscribe_topic(NO_REPLAY, 0, filter);
    assert!(replay.is_empty());

    log.log("die", CONTAINER_EVENT_TYPE, Actor::new("db").with_attribute("tier", "db"))
        .await;
    log.log("die", CONTAINER_EVENT_TYPE, Actor::new("web").with_attribute("tier", "web"))
        .await;

    let event = feed.recv().await.unwrap();
    assert_eq!(event.actor().id, "web");
    assert!(feed.try_recv().is_none());

    assert!(log.evict(feed.id()));
    assert_eq!(feed.recv().await, None);
}
