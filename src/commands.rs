//! The command catalogue.
//!
//! Every convenience method is a thin projection over the generic
//! [`Commands::dispatch`] contract: build the frame, forward it, optionally
//! attach a post-processing callback. The same catalogue is implemented by
//! the plain client (resolving to values), the sharded client, and the
//! pinned transaction and pipeline handles (resolving to queued
//! acknowledgements).

use std::sync::Arc;

use crate::command::{Arg, Command, IntoArg};
use crate::error::{Error, Result};
use crate::value::{Value, pairs_to_map};

/// Callback applied to a reply on resolution. In a transaction it is stored
/// positionally and applied to the matching element of the EXEC array.
pub type PostProc = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Modifiers for [`Commands::set_with`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// EX seconds
    pub expire: Option<u64>,
    /// PX milliseconds
    pub pexpire: Option<u64>,
    /// NX
    pub only_if_not_exists: bool,
    /// XX
    pub only_if_exists: bool,
}

/// Bitwise operation for [`Commands::bitop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

impl BitOp {
    fn wire_name(self) -> &'static str {
        match self {
            BitOp::And => "AND",
            BitOp::Or => "OR",
            BitOp::Xor => "XOR",
            BitOp::Not => "NOT",
        }
    }
}

/// Options for [`Commands::sort`].
#[derive(Debug, Clone, Default)]
pub struct SortSpec {
    pub by: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub get: Vec<String>,
    pub desc: bool,
    pub alpha: bool,
    pub store: Option<String>,
}

fn scan_args(mut cmd: Command, cursor: u64, pattern: Option<&str>, count: Option<u64>) -> Command {
    cmd = cmd.arg(cursor);
    if let Some(pattern) = pattern {
        cmd = cmd.arg("MATCH").arg(pattern);
    }
    if let Some(count) = count {
        cmd = cmd.arg("COUNT").arg(count);
    }
    cmd
}

fn info_to_map(value: Value) -> Value {
    let text = match value {
        Value::Status(s) | Value::String(s) => s,
        other => return other,
    };
    let mut map = std::collections::HashMap::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once(':') {
            map.insert(k.to_string(), Value::String(v.to_string()));
        }
    }
    Value::Map(map)
}

/// The full command surface.
///
/// `Output` is [`Value`] for handlers that resolve replies directly and
/// `()` for pinned handles that buffer or queue commands.
pub trait Commands {
    type Output;

    /// Forward one command, optionally with a post-processing callback.
    fn dispatch(
        &mut self,
        cmd: Command,
        post: Option<PostProc>,
    ) -> impl Future<Output = Result<Self::Output>>;

    // === Connection ===

    fn ping(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("PING"), None)
    }

    fn auth(&mut self, password: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("AUTH").arg(password), None)
    }

    fn select(&mut self, index: u16) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SELECT").arg(index), None)
    }

    fn echo(&mut self, message: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ECHO").arg(message), None)
    }

    // === Keys ===

    fn exists(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("EXISTS").arg(key), None)
    }

    fn del(
        &mut self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("DEL").args(keys), None)
    }

    fn key_type(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("TYPE").arg(key), None)
    }

    fn keys(&mut self, pattern: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("KEYS").arg(pattern), None)
    }

    fn scan(
        &mut self,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(scan_args(Command::new("SCAN"), cursor, pattern, count), None)
    }

    fn randomkey(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("RANDOMKEY"), None)
    }

    fn rename(
        &mut self,
        oldkey: impl IntoArg,
        newkey: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("RENAME").arg(oldkey).arg(newkey), None)
    }

    fn renamenx(
        &mut self,
        oldkey: impl IntoArg,
        newkey: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("RENAMENX").arg(oldkey).arg(newkey), None)
    }

    fn dbsize(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("DBSIZE"), None)
    }

    fn expire(
        &mut self,
        key: impl IntoArg,
        seconds: u64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("EXPIRE").arg(key).arg(seconds), None)
    }

    fn persist(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("PERSIST").arg(key), None)
    }

    fn ttl(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("TTL").arg(key), None)
    }

    fn move_key(
        &mut self,
        key: impl IntoArg,
        dbindex: u16,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("MOVE").arg(key).arg(dbindex), None)
    }

    fn flushdb(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("FLUSHDB"), None)
    }

    fn flushall(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("FLUSHALL"), None)
    }

    fn time(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("TIME"), None)
    }

    // === Strings ===

    fn set(
        &mut self,
        key: impl IntoArg,
        value: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SET").arg(key).arg(value), None)
    }

    fn set_with(
        &mut self,
        key: impl IntoArg,
        value: impl IntoArg,
        options: SetOptions,
    ) -> impl Future<Output = Result<Self::Output>> {
        async move {
            if options.only_if_not_exists && options.only_if_exists {
                return Err(Error::InvalidUsage(
                    "only_if_not_exists and only_if_exists cannot be true simultaneously".into(),
                ));
            }
            let mut cmd = Command::new("SET").arg(key).arg(value);
            if let Some(ex) = options.expire {
                cmd = cmd.arg("EX").arg(ex);
            }
            if let Some(px) = options.pexpire {
                cmd = cmd.arg("PX").arg(px);
            }
            if options.only_if_not_exists {
                cmd = cmd.arg("NX");
            }
            if options.only_if_exists {
                cmd = cmd.arg("XX");
            }
            self.dispatch(cmd, None).await
        }
    }

    fn get(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("GET").arg(key), None)
    }

    fn getset(
        &mut self,
        key: impl IntoArg,
        value: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("GETSET").arg(key).arg(value), None)
    }

    fn mget(
        &mut self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("MGET").args(keys), None)
    }

    fn setnx(
        &mut self,
        key: impl IntoArg,
        value: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SETNX").arg(key).arg(value), None)
    }

    fn setex(
        &mut self,
        key: impl IntoArg,
        seconds: u64,
        value: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SETEX").arg(key).arg(seconds).arg(value), None)
    }

    fn mset(
        &mut self,
        items: impl IntoIterator<Item = (impl IntoArg, impl IntoArg)>,
    ) -> impl Future<Output = Result<Self::Output>> {
        let mut cmd = Command::new("MSET");
        for (k, v) in items {
            cmd = cmd.arg(k).arg(v);
        }
        self.dispatch(cmd, None)
    }

    fn msetnx(
        &mut self,
        items: impl IntoIterator<Item = (impl IntoArg, impl IntoArg)>,
    ) -> impl Future<Output = Result<Self::Output>> {
        let mut cmd = Command::new("MSETNX");
        for (k, v) in items {
            cmd = cmd.arg(k).arg(v);
        }
        self.dispatch(cmd, None)
    }

    fn append(
        &mut self,
        key: impl IntoArg,
        value: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("APPEND").arg(key).arg(value), None)
    }

    fn strlen(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("STRLEN").arg(key), None)
    }

    fn getrange(
        &mut self,
        key: impl IntoArg,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("GETRANGE").arg(key).arg(start).arg(end), None)
    }

    fn incr(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("INCR").arg(key), None)
    }

    fn incrby(
        &mut self,
        key: impl IntoArg,
        amount: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("INCRBY").arg(key).arg(amount), None)
    }

    fn decr(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("DECR").arg(key), None)
    }

    fn decrby(
        &mut self,
        key: impl IntoArg,
        amount: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("DECRBY").arg(key).arg(amount), None)
    }

    fn getbit(
        &mut self,
        key: impl IntoArg,
        offset: u64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("GETBIT").arg(key).arg(offset), None)
    }

    fn setbit(
        &mut self,
        key: impl IntoArg,
        offset: u64,
        value: bool,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            Command::new("SETBIT").arg(key).arg(offset).arg(u32::from(value)),
            None,
        )
    }

    fn bitcount(
        &mut self,
        key: impl IntoArg,
        range: Option<(i64, i64)>,
    ) -> impl Future<Output = Result<Self::Output>> {
        let mut cmd = Command::new("BITCOUNT").arg(key);
        if let Some((start, end)) = range {
            cmd = cmd.arg(start).arg(end);
        }
        self.dispatch(cmd, None)
    }

    /// Bitwise operation between source keys, stored in `destination`.
    /// `Not` takes exactly one source key.
    fn bitop(
        &mut self,
        operation: BitOp,
        destination: impl IntoArg,
        sources: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        async move {
            let sources: Vec<Arg> = sources.into_iter().map(IntoArg::into_arg).collect();
            if sources.is_empty() {
                return Err(Error::InvalidUsage("no source keys specified".into()));
            }
            if operation == BitOp::Not && sources.len() > 1 {
                return Err(Error::InvalidUsage(
                    "NOT takes a single source key".into(),
                ));
            }
            self.dispatch(
                Command::new("BITOP")
                    .arg(operation.wire_name())
                    .arg(destination)
                    .args(sources),
                None,
            )
            .await
        }
    }

    // === Lists ===

    fn lpush(
        &mut self,
        key: impl IntoArg,
        values: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("LPUSH").arg(key).args(values), None)
    }

    fn rpush(
        &mut self,
        key: impl IntoArg,
        values: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("RPUSH").arg(key).args(values), None)
    }

    fn llen(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("LLEN").arg(key), None)
    }

    fn lrange(
        &mut self,
        key: impl IntoArg,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("LRANGE").arg(key).arg(start).arg(end), None)
    }

    fn ltrim(
        &mut self,
        key: impl IntoArg,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("LTRIM").arg(key).arg(start).arg(end), None)
    }

    fn lindex(
        &mut self,
        key: impl IntoArg,
        index: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("LINDEX").arg(key).arg(index), None)
    }

    fn lset(
        &mut self,
        key: impl IntoArg,
        index: i64,
        value: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("LSET").arg(key).arg(index).arg(value), None)
    }

    fn lrem(
        &mut self,
        key: impl IntoArg,
        count: i64,
        value: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("LREM").arg(key).arg(count).arg(value), None)
    }

    fn lpop(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("LPOP").arg(key), None)
    }

    fn rpop(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("RPOP").arg(key), None)
    }

    fn rpoplpush(
        &mut self,
        source: impl IntoArg,
        destination: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("RPOPLPUSH").arg(source).arg(destination), None)
    }

    /// Blocks server-side for up to `timeout` seconds (0 = forever) and
    /// occupies the connection for the whole wait.
    fn blpop(
        &mut self,
        keys: impl IntoIterator<Item = impl IntoArg>,
        timeout: u64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("BLPOP").args(keys).arg(timeout), None)
    }

    fn brpop(
        &mut self,
        keys: impl IntoIterator<Item = impl IntoArg>,
        timeout: u64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("BRPOP").args(keys).arg(timeout), None)
    }

    fn brpoplpush(
        &mut self,
        source: impl IntoArg,
        destination: impl IntoArg,
        timeout: u64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            Command::new("BRPOPLPUSH").arg(source).arg(destination).arg(timeout),
            None,
        )
    }

    // === Sets ===

    fn sadd(
        &mut self,
        key: impl IntoArg,
        members: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SADD").arg(key).args(members), None)
    }

    fn srem(
        &mut self,
        key: impl IntoArg,
        members: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SREM").arg(key).args(members), None)
    }

    fn spop(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SPOP").arg(key), None)
    }

    fn smove(
        &mut self,
        source: impl IntoArg,
        destination: impl IntoArg,
        member: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            Command::new("SMOVE").arg(source).arg(destination).arg(member),
            None,
        )
    }

    fn scard(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SCARD").arg(key), None)
    }

    fn sismember(
        &mut self,
        key: impl IntoArg,
        member: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SISMEMBER").arg(key).arg(member), None)
    }

    fn sinter(
        &mut self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SINTER").args(keys), None)
    }

    fn sinterstore(
        &mut self,
        destination: impl IntoArg,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SINTERSTORE").arg(destination).args(keys), None)
    }

    fn sunion(
        &mut self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SUNION").args(keys), None)
    }

    fn sunionstore(
        &mut self,
        destination: impl IntoArg,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SUNIONSTORE").arg(destination).args(keys), None)
    }

    fn sdiff(
        &mut self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SDIFF").args(keys), None)
    }

    fn sdiffstore(
        &mut self,
        destination: impl IntoArg,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SDIFFSTORE").arg(destination).args(keys), None)
    }

    fn smembers(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SMEMBERS").arg(key), None)
    }

    fn srandmember(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SRANDMEMBER").arg(key), None)
    }

    fn sscan(
        &mut self,
        key: impl IntoArg,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            scan_args(Command::new("SSCAN").arg(key), cursor, pattern, count),
            None,
        )
    }

    // === Hashes ===

    fn hset(
        &mut self,
        key: impl IntoArg,
        field: impl IntoArg,
        value: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HSET").arg(key).arg(field).arg(value), None)
    }

    fn hsetnx(
        &mut self,
        key: impl IntoArg,
        field: impl IntoArg,
        value: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HSETNX").arg(key).arg(field).arg(value), None)
    }

    fn hget(
        &mut self,
        key: impl IntoArg,
        field: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HGET").arg(key).arg(field), None)
    }

    fn hmget(
        &mut self,
        key: impl IntoArg,
        fields: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HMGET").arg(key).args(fields), None)
    }

    fn hmset(
        &mut self,
        key: impl IntoArg,
        items: impl IntoIterator<Item = (impl IntoArg, impl IntoArg)>,
    ) -> impl Future<Output = Result<Self::Output>> {
        let mut cmd = Command::new("HMSET").arg(key);
        for (f, v) in items {
            cmd = cmd.arg(f).arg(v);
        }
        self.dispatch(cmd, None)
    }

    fn hincrby(
        &mut self,
        key: impl IntoArg,
        field: impl IntoArg,
        amount: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HINCRBY").arg(key).arg(field).arg(amount), None)
    }

    fn hexists(
        &mut self,
        key: impl IntoArg,
        field: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HEXISTS").arg(key).arg(field), None)
    }

    fn hdel(
        &mut self,
        key: impl IntoArg,
        fields: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HDEL").arg(key).args(fields), None)
    }

    fn hlen(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HLEN").arg(key), None)
    }

    fn hkeys(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HKEYS").arg(key), None)
    }

    fn hvals(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("HVALS").arg(key), None)
    }

    /// The flat `field, value, ..` reply is post-processed into a map.
    fn hgetall(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            Command::new("HGETALL").arg(key),
            Some(Arc::new(pairs_to_map)),
        )
    }

    fn hscan(
        &mut self,
        key: impl IntoArg,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            scan_args(Command::new("HSCAN").arg(key), cursor, pattern, count),
            None,
        )
    }

    // === Sorted sets ===

    fn zadd(
        &mut self,
        key: impl IntoArg,
        score: f64,
        member: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZADD").arg(key).arg(score).arg(member), None)
    }

    fn zrem(
        &mut self,
        key: impl IntoArg,
        members: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZREM").arg(key).args(members), None)
    }

    fn zincrby(
        &mut self,
        key: impl IntoArg,
        amount: f64,
        member: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZINCRBY").arg(key).arg(amount).arg(member), None)
    }

    fn zrank(
        &mut self,
        key: impl IntoArg,
        member: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZRANK").arg(key).arg(member), None)
    }

    fn zrevrank(
        &mut self,
        key: impl IntoArg,
        member: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZREVRANK").arg(key).arg(member), None)
    }

    fn zrange(
        &mut self,
        key: impl IntoArg,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZRANGE").arg(key).arg(start).arg(end), None)
    }

    fn zrevrange(
        &mut self,
        key: impl IntoArg,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZREVRANGE").arg(key).arg(start).arg(end), None)
    }

    fn zrangebyscore(
        &mut self,
        key: impl IntoArg,
        min: impl IntoArg,
        max: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZRANGEBYSCORE").arg(key).arg(min).arg(max), None)
    }

    fn zrevrangebyscore(
        &mut self,
        key: impl IntoArg,
        max: impl IntoArg,
        min: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            Command::new("ZREVRANGEBYSCORE").arg(key).arg(max).arg(min),
            None,
        )
    }

    fn zcount(
        &mut self,
        key: impl IntoArg,
        min: impl IntoArg,
        max: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZCOUNT").arg(key).arg(min).arg(max), None)
    }

    fn zcard(&mut self, key: impl IntoArg) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZCARD").arg(key), None)
    }

    fn zscore(
        &mut self,
        key: impl IntoArg,
        member: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("ZSCORE").arg(key).arg(member), None)
    }

    fn zremrangebyrank(
        &mut self,
        key: impl IntoArg,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            Command::new("ZREMRANGEBYRANK").arg(key).arg(start).arg(end),
            None,
        )
    }

    fn zremrangebyscore(
        &mut self,
        key: impl IntoArg,
        min: impl IntoArg,
        max: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            Command::new("ZREMRANGEBYSCORE").arg(key).arg(min).arg(max),
            None,
        )
    }

    fn zunionstore(
        &mut self,
        destination: impl IntoArg,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        let keys: Vec<Arg> = keys.into_iter().map(IntoArg::into_arg).collect();
        self.dispatch(
            Command::new("ZUNIONSTORE")
                .arg(destination)
                .arg(keys.len())
                .args(keys),
            None,
        )
    }

    fn zinterstore(
        &mut self,
        destination: impl IntoArg,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        let keys: Vec<Arg> = keys.into_iter().map(IntoArg::into_arg).collect();
        self.dispatch(
            Command::new("ZINTERSTORE")
                .arg(destination)
                .arg(keys.len())
                .args(keys),
            None,
        )
    }

    fn zscan(
        &mut self,
        key: impl IntoArg,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(
            scan_args(Command::new("ZSCAN").arg(key), cursor, pattern, count),
            None,
        )
    }

    // === Sorting ===

    fn sort(
        &mut self,
        key: impl IntoArg,
        spec: SortSpec,
    ) -> impl Future<Output = Result<Self::Output>> {
        async move {
            if spec.start.is_some() != spec.end.is_some() {
                return Err(Error::InvalidUsage(
                    "start and end must both be specified".into(),
                ));
            }
            let mut cmd = Command::new("SORT").arg(key);
            if let Some(by) = &spec.by {
                cmd = cmd.arg("BY").arg(by);
            }
            if let (Some(start), Some(end)) = (spec.start, spec.end) {
                cmd = cmd.arg("LIMIT").arg(start).arg(end);
            }
            for get in &spec.get {
                cmd = cmd.arg("GET").arg(get);
            }
            if spec.desc {
                cmd = cmd.arg("DESC");
            }
            if spec.alpha {
                cmd = cmd.arg("ALPHA");
            }
            if let Some(store) = &spec.store {
                cmd = cmd.arg("STORE").arg(store);
            }
            self.dispatch(cmd, None).await
        }
    }

    // === Pub/sub ===

    fn publish(
        &mut self,
        channel: impl IntoArg,
        message: impl IntoArg,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("PUBLISH").arg(channel).arg(message), None)
    }

    // === Persistence and server control ===

    fn save(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SAVE"), None)
    }

    fn bgsave(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("BGSAVE"), None)
    }

    fn lastsave(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("LASTSAVE"), None)
    }

    fn bgrewriteaof(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("BGREWRITEAOF"), None)
    }

    /// SHUTDOWN: save and stop the server. The server closes the socket
    /// without replying, so this resolves with a connection error; call
    /// `disconnect` afterwards to stop the pool from reconnecting.
    fn shutdown(&mut self) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("SHUTDOWN"), None)
    }

    /// With a section, the reply is post-processed into a map of
    /// `key: value` lines.
    fn info(&mut self, section: Option<&str>) -> impl Future<Output = Result<Self::Output>> {
        match section {
            None => self.dispatch(Command::new("INFO"), None),
            Some(section) => self.dispatch(
                Command::new("INFO").arg(section),
                Some(Arc::new(info_to_map)),
            ),
        }
    }

    // === HyperLogLog ===

    fn pfadd(
        &mut self,
        key: impl IntoArg,
        elements: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("PFADD").arg(key).args(elements), None)
    }

    fn pfcount(
        &mut self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("PFCOUNT").args(keys), None)
    }

    fn pfmerge(
        &mut self,
        destination: impl IntoArg,
        sources: impl IntoIterator<Item = impl IntoArg>,
    ) -> impl Future<Output = Result<Self::Output>> {
        self.dispatch(Command::new("PFMERGE").arg(destination).args(sources), None)
    }
}
