//! Live-server tests for basic operations, keyspace iteration, and pool
//! behavior under blocking commands.

mod common;

use std::time::{Duration, Instant};

use zero_redis::tokio::Client;
use zero_redis::{Commands, Value};

#[tokio::test]
async fn set_get_round_trip() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let mut db = Client::open(opts).await.unwrap();

    db.set("zr:test:k", "v").await.unwrap();
    assert_eq!(db.get("zr:test:k").await.unwrap(), Value::String("v".into()));

    db.del(["zr:test:k"]).await.unwrap();
    assert_eq!(db.get("zr:test:k").await.unwrap(), Value::Nil);

    db.disconnect().await.unwrap();
}

#[tokio::test]
async fn mget_reports_holes_as_nil() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let mut db = Client::open(opts).await.unwrap();

    db.mset([("zr:test:a", 1), ("zr:test:b", 2)]).await.unwrap();
    let values = db
        .mget(["zr:test:a", "zr:test:notset", "zr:test:b"])
        .await
        .unwrap();
    assert_eq!(
        values,
        Value::Array(vec![Value::Int(1), Value::Nil, Value::Int(2)])
    );

    db.del(["zr:test:a", "zr:test:b"]).await.unwrap();
    db.disconnect().await.unwrap();
}

#[tokio::test]
async fn counters_and_hashes() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let mut db = Client::open(opts).await.unwrap();

    db.del(["zr:test:ctr", "zr:test:h"]).await.unwrap();
    assert_eq!(db.incr("zr:test:ctr").await.unwrap(), Value::Int(1));
    assert_eq!(db.incrby("zr:test:ctr", 9).await.unwrap(), Value::Int(10));

    db.hmset("zr:test:h", [("f1", "v1"), ("f2", "v2")]).await.unwrap();
    let map = db.hgetall("zr:test:h").await.unwrap().into_map().unwrap();
    assert_eq!(map.get("f1"), Some(&Value::String("v1".into())));
    assert_eq!(map.get("f2"), Some(&Value::String("v2".into())));

    db.del(["zr:test:ctr", "zr:test:h"]).await.unwrap();
    db.disconnect().await.unwrap();
}

#[tokio::test]
async fn scan_accumulates_the_matching_set() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let mut db = Client::open(opts).await.unwrap();

    let mut expected = std::collections::HashSet::new();
    for i in 0..100 {
        let key = format!("zr:scan:{}", i);
        db.set(&key, i).await.unwrap();
        expected.insert(key);
    }

    let mut found = std::collections::HashSet::new();
    let mut cursor = 0u64;
    loop {
        let reply = db
            .scan(cursor, Some("zr:scan:*"), Some(10))
            .await
            .unwrap();
        let mut parts = reply.into_array().unwrap().into_iter();
        cursor = match parts.next() {
            Some(Value::Int(n)) => n as u64,
            Some(Value::String(s)) => s.parse().unwrap(),
            other => panic!("unexpected cursor: {:?}", other),
        };
        if let Some(Value::Array(keys)) = parts.next() {
            for key in keys {
                if let Value::String(s) = key {
                    found.insert(s);
                }
            }
        }
        if cursor == 0 {
            break;
        }
    }
    assert_eq!(found, expected);

    let keys: Vec<String> = expected.into_iter().collect();
    db.del(keys).await.unwrap();
    db.disconnect().await.unwrap();
}

/// A blocking command must not starve the rest of the pool.
#[tokio::test]
async fn blocking_command_does_not_starve_the_pool() {
    let Some(mut opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    opts.poolsize = 2;
    let db = Client::open(opts).await.unwrap();

    let mut blocker = db.clone();
    let blocked = tokio::spawn(async move {
        // nothing pushes to this queue; blocks server-side until timeout
        blocker.brpop(["zr:test:emptyq"], 3).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let mut db2 = db.clone();
    db2.set("zr:test:parallel", "v").await.unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "SET had to wait for the blocked connection"
    );

    let reply = blocked.await.unwrap().unwrap();
    assert!(reply.is_nil(), "queue unexpectedly non-empty: {:?}", reply);

    let mut db3 = db.clone();
    db3.del(["zr:test:parallel"]).await.unwrap();
    db.disconnect().await.unwrap();
}

#[tokio::test]
async fn lazy_connection_becomes_ready() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let db = Client::open_lazy(opts);
    db.wait_connected().await.unwrap();
    let mut db2 = db.clone();
    assert!(db2.ping().await.unwrap().as_text() == Some("PONG"));
    db.disconnect().await.unwrap();
}
