//! Live-server tests for the EVAL/EVALSHA path and its digest cache.

mod common;

use zero_redis::tokio::Client;
use zero_redis::{Commands, Error, Value};

const SCRIPT: &str = "return redis.call('SET', KEYS[1], ARGV[1])";

#[tokio::test]
async fn eval_runs_and_caches_the_digest() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let mut db = Client::open(opts).await.unwrap();

    let reply = db
        .eval(SCRIPT, ["zr:script:k"], ["stored"])
        .await
        .unwrap();
    assert!(reply.is_ok());
    assert_eq!(
        db.get("zr:script:k").await.unwrap(),
        Value::String("stored".into())
    );

    // second run goes through EVALSHA on a warm connection
    let reply = db.eval(SCRIPT, ["zr:script:k"], ["again"]).await.unwrap();
    assert!(reply.is_ok());

    db.del(["zr:script:k"]).await.unwrap();
    db.disconnect().await.unwrap();
}

#[tokio::test]
async fn evalsha_of_an_unknown_script_fails() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let db = Client::open(opts).await.unwrap();

    let err = db
        .evalsha("0000000000000000000000000000000000000000", ["k"], ["v"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ScriptDoesNotExist(_)));

    db.disconnect().await.unwrap();
}

#[tokio::test]
async fn script_exists_reports_booleans() {
    let Some(opts) = common::redis_opts() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let db = Client::open(opts).await.unwrap();

    let digest = db.script_load(SCRIPT).await.unwrap();
    let digest = digest.as_text().expect("digest should be text").to_string();

    let flags = db
        .script_exists([
            digest.as_str(),
            "0000000000000000000000000000000000000000",
        ])
        .await
        .unwrap();
    assert_eq!(
        flags,
        Value::Array(vec![Value::Int(1), Value::Int(0)])
    );

    db.disconnect().await.unwrap();
}
