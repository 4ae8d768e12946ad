use bytes::Bytes;
use futures::StreamExt;

use super::FanOut;

fn chunk(s: &'static str) -> Bytes {
    Bytes::from_static(s.as_bytes())
}

#[tokio::test]
async fn test_every_consumer_sees_every_chunk_in_order() {
    let fanout = FanOut::new();
    let mut consumers: Vec<_> = (0..3).map(|_| fanout.register()).collect();

    for c in ["a", "bb", "ccc", "dddd"] {
        fanout.dispatch(&chunk(c));
    }
    fanout.close_all();

    for consumer in consumers.iter_mut() {
        let got: Vec<Bytes> = consumer.collect().await;
        assert_eq!(got, vec![chunk("a"), chunk("bb"), chunk("ccc"), chunk("dddd")]);
    }
}

#[tokio::test]
async fn test_late_registration_sees_no_backfill() {
    let fanout = FanOut::new();
    let early = fanout.register();

    fanout.dispatch(&chunk("first"));
    let late = fanout.register();
    fanout.dispatch(&chunk("second"));
    fanout.close_all();

    assert_eq!(early.collect::<Vec<_>>().await, vec![chunk("first"), chunk("second")]);
    assert_eq!(late.collect::<Vec<_>>().await, vec![chunk("second")]);
}

#[tokio::test]
async fn test_close_all_ends_each_stream_once() {
    let fanout = FanOut::new();
    let mut a = fanout.register();
    let mut b = fanout.register();

    assert_eq!(fanout.close_all(), 2);
    assert!(fanout.is_empty());

    assert!(a.next().await.is_none());
    assert!(b.recv().await.is_none());
    // Stays terminated.
    assert!(a.next().await.is_none());

    // Nothing reaches a closed consumer afterwards.
    fanout.dispatch(&chunk("after"));
    assert!(b.recv().await.is_none());
}

#[tokio::test]
async fn test_dropped_consumer_does_not_affect_peers() {
    let fanout = FanOut::new();
    let dropped = fanout.register();
    let mut kept = fanout.register();
    drop(dropped);

    fanout.dispatch(&chunk("x"));
    assert_eq!(fanout.len(), 1);
    assert_eq!(kept.recv().await, Some(chunk("x")));
}

#[tokio::test]
async fn test_slow_consumer_does_not_block_dispatch() {
    let fanout = FanOut::new();
    let _slow = fanout.register();
    let mut fast = fanout.register();

    for i in 0..10_000u32 {
        fanout.dispatch(&Bytes::from(i.to_be_bytes().to_vec()));
    }

    let first = fast.recv().await.unwrap();
    assert_eq!(first.as_ref(), &0u32.to_be_bytes());
}
