// Queue hand-off, sinks and the consumer loop

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{book, book_message, create_test_config, CollectingSink};
use futures_util::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use trade_impact_sim::clients::{BookFeedClient, ConnectionState};
use trade_impact_sim::config::FeedConfig;
use trade_impact_sim::runner::{consume_queue, watch_connection};
use trade_impact_sim::{
    ChannelSink, EstimateSink, FeedItem, SimulationPipeline, SimulatorError, SnapshotQueue,
};

fn feed_config(ws_url: String, max_reconnect_attempts: u32) -> FeedConfig {
    FeedConfig {
        ws_url,
        reconnect_delay_secs: 0,
        max_reconnect_attempts,
        ..FeedConfig::default()
    }
}

#[tokio::test]
async fn test_queue_hands_off_between_tasks() {
    let queue = Arc::new(SnapshotQueue::new(1000));
    let producer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            for seq in 1..=50 {
                queue.push(FeedItem { epoch: 1, snapshot: book(seq, 100.0) });
                tokio::task::yield_now().await;
            }
            queue.close();
        })
    };

    let mut received = Vec::new();
    while let Some(item) = queue.pop().await {
        received.push(item.snapshot.sequence());
    }
    producer.await.expect("producer finished");

    assert_eq!(received, (1..=50).collect::<Vec<_>>());
    assert_eq!(queue.dropped(), 0);
}

#[tokio::test]
async fn test_slow_consumer_loses_oldest() {
    let queue = SnapshotQueue::new(3);
    for seq in 1..=5 {
        queue.push(FeedItem { epoch: 1, snapshot: book(seq, 100.0) });
    }
    queue.close();

    let mut received = Vec::new();
    while let Some(item) = queue.pop().await {
        received.push(item.snapshot.sequence());
    }
    assert_eq!(received, vec![3, 4, 5]);
    assert_eq!(queue.dropped(), 2);
}

#[tokio::test]
async fn test_epoch_change_resets_pipeline() {
    let queue = SnapshotQueue::new(100);
    for seq in 1..=4 {
        queue.push(FeedItem { epoch: 1, snapshot: book(seq, 100.0) });
    }
    // Reconnected: sequence numbers restart
    for seq in 1..=3 {
        queue.push(FeedItem { epoch: 2, snapshot: book(seq, 101.0) });
    }
    queue.close();

    let mut pipeline = SimulationPipeline::new("BTC-USDT-SWAP", &create_test_config());
    let sink = CollectingSink::default();
    consume_queue(&mut pipeline, &queue, &sink).await;

    let stats = pipeline.stats();
    assert_eq!(stats.resets, 1);
    assert_eq!(stats.out_of_order, 0);
    // 3 estimates before the reconnect, 2 after
    assert_eq!(sink.collected().len(), 5);
}

#[tokio::test]
async fn test_channel_sink_drops_when_full() {
    let (sink, mut rx) = ChannelSink::channel(2);
    let mut pipeline = SimulationPipeline::new("BTC-USDT-SWAP", &create_test_config());

    let mut emitted = 0;
    for seq in 1..=6 {
        if let Ok(estimate) = pipeline.on_snapshot(book(seq, 100.0)) {
            sink.emit(&estimate);
            emitted += 1;
        }
    }

    assert_eq!(emitted, 5);
    assert_eq!(sink.dropped(), 3);
    let first = rx.recv().await.expect("buffered estimate");
    assert_eq!(first.sequence, 2);
}

async fn serve_books(stream: TcpStream) {
    let mut ws = accept_async(stream).await.expect("handshake");
    for seq in 1..=3 {
        ws.send(Message::Text(book_message(seq, 95000.0 + seq as f64)))
            .await
            .expect("send");
    }
    let _ = ws.close(None).await;
}

#[tokio::test]
async fn test_feed_gives_up_after_max_attempts() {
    let queue = Arc::new(SnapshotQueue::new(10));
    let config = feed_config("ws://127.0.0.1:1".to_string(), 2);
    let client = BookFeedClient::new(&config, "BTC-USDT-SWAP", Arc::clone(&queue));
    let state = client.subscribe_state();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = tokio::time::timeout(Duration::from_secs(10), client.run(shutdown_rx))
        .await
        .expect("feed gave up in time");

    assert!(matches!(result, Err(SimulatorError::Transport(_))));
    assert_eq!(*state.borrow(), ConnectionState::GaveUp);
    assert!(queue.is_closed());
    assert!(queue.pop().await.is_none());
}

#[tokio::test]
async fn test_reconnect_starts_new_epoch_and_resets_window() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));

    // Two connections, each restarting sequence numbers at 1, then refuse
    let server = tokio::spawn(async move {
        let (first, _) = listener.accept().await.expect("accept");
        serve_books(first).await;
        let (second, _) = listener.accept().await.expect("accept");
        drop(listener);
        serve_books(second).await;
    });

    let queue = Arc::new(SnapshotQueue::new(100));
    let client = BookFeedClient::new(&feed_config(url, 2), "BTC-USDT-SWAP", Arc::clone(&queue));
    let feed_stats = client.stats();
    let watcher = tokio::spawn(watch_connection("BTC-USDT-SWAP".to_string(), client.subscribe_state()));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = tokio::time::timeout(Duration::from_secs(10), client.run(shutdown_rx))
        .await
        .expect("feed finished in time");
    assert!(matches!(result, Err(SimulatorError::Transport(_))));
    server.await.expect("server finished");
    watcher.await.expect("watcher finished");

    assert_eq!(feed_stats.reconnects.load(std::sync::atomic::Ordering::Relaxed), 1);
    assert_eq!(feed_stats.snapshots(), 6);

    let mut pipeline = SimulationPipeline::new("BTC-USDT-SWAP", &create_test_config());
    let sink = CollectingSink::default();
    consume_queue(&mut pipeline, &queue, &sink).await;

    let stats = pipeline.stats();
    assert_eq!(stats.resets, 1);
    assert_eq!(stats.out_of_order, 0);
    // 2 estimates per connection
    assert_eq!(sink.collected().len(), 4);
}
