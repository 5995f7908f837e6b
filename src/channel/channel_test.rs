use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use super::*;
use crate::ChannelConfig;
use crate::Error;

fn channel_with_capacity(capacity: usize) -> BroadcastChannel {
    BroadcastChannel::new(&ChannelConfig {
        topic: "test-topic".to_string(),
        capacity,
    })
}

#[tokio::test]
async fn test_publish_fans_out_to_every_subscriber() {
    let channel = channel_with_capacity(16);
    let mut a = channel.subscribe().await.unwrap();
    let mut b = channel.subscribe().await.unwrap();

    let receivers = channel.publish(Bytes::from_static(b"hello")).await.unwrap();

    assert_eq!(receivers, 2);
    assert_eq!(a.next().await, Some(Delivery::Message(Bytes::from_static(b"hello"))));
    assert_eq!(b.next().await, Some(Delivery::Message(Bytes::from_static(b"hello"))));
    assert_eq!(a.topic(), "test-topic");
}

#[tokio::test]
async fn test_publish_without_subscribers_is_dropped_not_failed() {
    let channel = channel_with_capacity(16);

    let receivers = channel.publish(Bytes::from_static(b"lost")).await.unwrap();
    assert_eq!(receivers, 0);

    // a late subscriber never sees it
    let mut late = channel.subscribe().await.unwrap();
    assert!(timeout(Duration::from_millis(50), late.next()).await.is_err());
}

#[tokio::test]
async fn test_slow_subscriber_is_told_how_much_it_missed() {
    let channel = channel_with_capacity(2);
    let mut slow = channel.subscribe().await.unwrap();

    for i in 0..5u8 {
        channel.publish(Bytes::from(vec![i])).await.unwrap();
    }

    assert_eq!(slow.next().await, Some(Delivery::Lagged(3)));
    assert_eq!(slow.next().await, Some(Delivery::Message(Bytes::from(vec![3u8]))));
    assert_eq!(slow.next().await, Some(Delivery::Message(Bytes::from(vec![4u8]))));
}

#[tokio::test]
async fn test_close_ends_subscriptions_and_rejects_new_calls() {
    let channel = channel_with_capacity(16);
    let mut sub = channel.subscribe().await.unwrap();
    assert_eq!(channel.subscriber_count(), 1);

    channel.close();

    assert_eq!(sub.next().await, None);
    assert!(matches!(
        channel.publish(Bytes::from_static(b"x")).await,
        Err(Error::Channel(crate::ChannelError::Closed(_)))
    ));
    assert!(channel.subscribe().await.is_err());
    assert_eq!(channel.subscriber_count(), 0);
}
