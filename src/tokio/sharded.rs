//! Client-side sharding across multiple endpoints.
//!
//! Each endpoint's handler contributes virtual nodes to a consistent-hash
//! ring keyed by its endpoint string. Commands route by their first
//! argument (with `{hash-tag}` override); only simple per-key operations
//! are shardable. `MGET` is aggregated: keys are grouped per owner, the
//! per-node fetches run in parallel, and the results are reassembled in
//! the caller's input order.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::command::{Arg, Command, IntoArg};
use crate::commands::{Commands, PostProc};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::ring::{self, HashRing};
use crate::value::Value;

use super::client::Client;
use super::pipeline::Pipeline;

/// Commands that operate on a single key and may be routed to a shard.
const SHARDABLE_COMMANDS: &[&str] = &[
    "DECR",
    "DECRBY",
    "DEL",
    "EXISTS",
    "EXPIRE",
    "GET",
    "GETSET",
    "HDEL",
    "HEXISTS",
    "HGET",
    "HGETALL",
    "HINCRBY",
    "HKEYS",
    "HLEN",
    "HMGET",
    "HMSET",
    "HSET",
    "HVALS",
    "INCR",
    "INCRBY",
    "LINDEX",
    "LLEN",
    "LPOP",
    "LPUSH",
    "LRANGE",
    "LREM",
    "LSET",
    "LTRIM",
    "PERSIST",
    "PUBLISH",
    "RENAME",
    "RPOP",
    "RPUSH",
    "SADD",
    "SCARD",
    "SET",
    "SETEX",
    "SETNX",
    "SISMEMBER",
    "SMEMBERS",
    "SREM",
    "TTL",
    "TYPE",
    "ZADD",
    "ZCARD",
    "ZCOUNT",
    "ZINCRBY",
    "ZRANGE",
    "ZRANGEBYSCORE",
    "ZRANK",
    "ZREM",
    "ZREMRANGEBYRANK",
    "ZREMRANGEBYSCORE",
    "ZREVRANGE",
    "ZREVRANGEBYSCORE",
    "ZREVRANK",
    "ZSCORE",
];

/// Handler that routes commands across shards.
#[derive(Clone)]
pub struct ShardedClient {
    ring: Arc<HashRing<Client>>,
}

impl ShardedClient {
    /// Connect one sub-handler per endpoint. Endpoints with `lazy` unset
    /// are awaited before the handler is returned.
    pub async fn open(configs: Vec<Opts>) -> Result<Self> {
        if configs.is_empty() {
            return Err(Error::InvalidUsage("no shard endpoints given".into()));
        }
        let mut nodes = Vec::with_capacity(configs.len());
        let mut wait = Vec::new();
        for opts in configs {
            let lazy = opts.lazy;
            let endpoint = opts.endpoint();
            let node = Client::spawn_pool(opts);
            if !lazy {
                wait.push(node.clone());
            }
            nodes.push((endpoint, node));
        }
        for node in wait {
            node.wait_connected().await?;
        }
        Ok(Self {
            ring: Arc::new(HashRing::with_nodes(nodes)),
        })
    }

    /// Pipelining requires a single connection; shards are disjoint by key.
    pub fn pipeline(&self) -> Result<Pipeline> {
        Err(Error::InvalidUsage(
            "Pipelining is not supported across shards".into(),
        ))
    }

    pub async fn disconnect(&self) -> Result<()> {
        for node in self.ring.nodes() {
            node.disconnect().await?;
        }
        Ok(())
    }

    /// Aggregated multi-get: one MGET per owning shard, run in parallel,
    /// results reassembled in the caller's key order.
    pub async fn mget(
        &self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Value> {
        let keys: Vec<Arg> = keys.into_iter().map(IntoArg::into_arg).collect();
        if keys.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        let mut groups: BTreeMap<usize, (Vec<usize>, Vec<Arg>)> = BTreeMap::new();
        for (position, arg) in keys.iter().enumerate() {
            let Some(key) = arg.as_text() else {
                return Err(Error::InvalidUsage(
                    "mget requires textual keys".into(),
                ));
            };
            let node = self
                .ring
                .node_index(ring::shard_key(key))
                .ok_or_else(Error::not_connected)?;
            let group = groups.entry(node).or_default();
            group.0.push(position);
            group.1.push(arg.clone());
        }

        let mut results = vec![Value::Nil; keys.len()];
        let mut tasks = JoinSet::new();
        for (node, (positions, args)) in groups {
            let mut client = self.ring.nodes()[node].clone();
            tasks.spawn(async move {
                let value = client.mget(args).await?;
                Ok::<(Vec<usize>, Value), Error>((positions, value))
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let (positions, value) =
                joined.map_err(|e| Error::Connection(format!("mget task failed: {}", e)))??;
            let values = value
                .into_array()
                .ok_or_else(|| Error::InvalidData("expected an array reply from MGET".into()))?;
            for (position, v) in positions.into_iter().zip(values) {
                results[position] = v;
            }
        }
        Ok(Value::Array(results))
    }
}

impl Commands for ShardedClient {
    type Output = Value;

    async fn dispatch(&mut self, cmd: Command, post: Option<PostProc>) -> Result<Value> {
        if !SHARDABLE_COMMANDS.contains(&cmd.name()) {
            return Err(Error::InvalidUsage(format!(
                "command '{}' cannot be sharded",
                cmd.name()
            )));
        }
        let Some(key) = cmd.first_arg().and_then(Arg::as_text) else {
            return Err(Error::InvalidUsage(format!(
                "command '{}' requires a textual key as its first argument",
                cmd.name()
            )));
        };
        let mut node = self
            .ring
            .node_for(ring::shard_key(key))
            .cloned()
            .ok_or_else(Error::not_connected)?;
        node.dispatch(cmd, post).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dead_node(port: u16) -> (String, Client) {
        let opts = Opts {
            host: "127.0.0.1".into(),
            port,
            reconnect: false,
            ..Opts::default()
        };
        (opts.endpoint(), Client::spawn_pool(opts))
    }

    fn sharded() -> ShardedClient {
        ShardedClient {
            ring: Arc::new(HashRing::with_nodes([dead_node(1), dead_node(2)])),
        }
    }

    #[tokio::test]
    async fn non_whitelisted_commands_are_rejected() {
        let mut db = sharded();
        let err = db.keys("*").await.unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
        let err = db.flushdb().await.unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
        let err = db.blpop(["q"], 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[tokio::test]
    async fn pipelining_is_rejected() {
        let db = sharded();
        let err = db.pipeline().unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[tokio::test]
    async fn first_argument_must_be_a_textual_key() {
        let mut db = sharded();
        let err = db
            .dispatch(Command::new("GET").arg(b"\xff".as_slice()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[tokio::test]
    async fn shardable_commands_reach_the_owning_pool() {
        let mut db = sharded();
        // routing succeeds; the dead pool then refuses the lease
        let err = db.set("k", "v").await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
