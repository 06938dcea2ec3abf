//! Live-server tests for pub/sub delivery.

mod common;

use std::time::Duration;

use zero_redis::tokio::{Client, Subscriber};
use zero_redis::{Commands, Value};

#[tokio::test]
async fn published_messages_are_delivered() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let mut publisher = Client::open(opts.clone()).await.unwrap();
    let mut subscriber = Subscriber::open(opts).await.unwrap();

    let ack = subscriber.subscribe(["zr:chan"]).await.unwrap();
    let ack = ack.into_array().unwrap();
    assert_eq!(ack[0], Value::String("subscribe".into()));
    assert_eq!(ack[1], Value::String("zr:chan".into()));

    publisher.publish("zr:chan", "hello").await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), subscriber.next_message())
        .await
        .expect("no message within 5s")
        .expect("stream closed");
    assert_eq!(message.channel, "zr:chan");
    assert_eq!(message.pattern, None);
    assert_eq!(message.payload, Value::String("hello".into()));

    subscriber.disconnect().await.unwrap();
    publisher.disconnect().await.unwrap();
}

#[tokio::test]
async fn pattern_subscriptions_carry_the_pattern() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let mut publisher = Client::open(opts.clone()).await.unwrap();
    let mut subscriber = Subscriber::open(opts).await.unwrap();

    subscriber.psubscribe(["zr:p.*"]).await.unwrap();
    publisher.publish("zr:p.news", "item").await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), subscriber.next_message())
        .await
        .expect("no message within 5s")
        .expect("stream closed");
    assert_eq!(message.pattern.as_deref(), Some("zr:p.*"));
    assert_eq!(message.channel, "zr:p.news");
    assert_eq!(message.payload, Value::String("item".into()));

    subscriber.disconnect().await.unwrap();
    publisher.disconnect().await.unwrap();
}
