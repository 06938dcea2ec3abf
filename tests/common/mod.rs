//! Shared harness for the live-server integration tests.
//!
//! The tests run against the server named by `REDIS_URL`
//! (e.g. `redis://localhost:6379/0`) and are skipped when it is unset.

use zero_redis::Opts;

pub fn redis_opts() -> Option<Opts> {
    let url = std::env::var("REDIS_URL").ok()?;
    Some(Opts::try_from(url.as_str()).expect("invalid REDIS_URL"))
}
