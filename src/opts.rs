//! Connection options.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Character set used for text arguments and best-effort reply decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// Encode text arguments as UTF-8 and decode bulk replies best-effort.
    #[default]
    Utf8,
    /// No charset: replies stay raw bytes and text arguments are rejected
    /// with an encoding error.
    Binary,
}

/// Connection options for Redis.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address.
    ///
    /// Default: `"localhost"`
    pub host: String,

    /// Port number for the Redis server.
    ///
    /// Default: `6379`
    pub port: u16,

    /// Unix socket path. When set, the TCP host/port are ignored.
    ///
    /// Default: `None`
    pub socket: Option<String>,

    /// Logical database index to SELECT after connecting.
    ///
    /// Default: `None`
    pub dbid: Option<u16>,

    /// Number of connections kept by the pool.
    ///
    /// Default: `1`
    pub poolsize: usize,

    /// Reconnect with exponential backoff after a connection is lost.
    ///
    /// Default: `true`
    pub reconnect: bool,

    /// Return the handler before the pool is connected. Readiness is
    /// observable through the handler.
    ///
    /// Default: `false`
    pub lazy: bool,

    /// Character set for text arguments and reply decoding.
    ///
    /// Default: `Charset::Utf8`
    pub charset: Charset,

    /// Password for AUTH after connecting.
    ///
    /// Default: `None`
    pub password: Option<String>,

    /// Timeout applied to socket establishment and the handshake.
    ///
    /// Default: `None`
    pub connect_timeout: Option<Duration>,
}

/// Default Unix socket path for Redis.
pub const DEFAULT_UNIX_SOCKET: &str = "/tmp/redis.sock";

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6379,
            socket: None,
            dbid: None,
            poolsize: 1,
            reconnect: true,
            lazy: false,
            charset: Charset::Utf8,
            password: None,
            connect_timeout: None,
        }
    }
}

impl Opts {
    /// Options for a Unix domain socket connection.
    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            socket: Some(path.into()),
            ..Self::default()
        }
    }

    /// The endpoint identifier used for logging and ring placement.
    pub fn endpoint(&self) -> String {
        match &self.socket {
            Some(path) => path.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "True" | "1" | "yes" | "on" => Ok(true),
        "false" | "False" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidUsage(format!("Invalid {}: {}", key, value))),
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a Redis connection URL.
    ///
    /// Formats:
    /// - `redis://[:password@]host[:port][/dbid][?param=value&..]`
    /// - `redis+unix://[:password@]/path/to/redis.sock[?param=value&..]`
    ///
    /// Supported query parameters:
    /// - `poolsize`: number of pooled connections (positive integer)
    /// - `reconnect`: true/True/1/yes/on or false/False/0/no/off
    /// - `lazy`: same boolean forms
    /// - `charset`: `utf-8` or `binary`
    /// - `db`: logical database index (alternative to the path component)
    /// - `connect_timeout_ms`: handshake timeout in milliseconds
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let is_unix = match url.scheme() {
            "redis" => false,
            "redis+unix" | "unix" => true,
            other => {
                return Err(Error::InvalidUsage(format!(
                    "Invalid scheme: expected 'redis://' or 'redis+unix://', got '{}://'",
                    other
                )));
            }
        };

        let mut opts = Opts {
            password: url.password().map(|s| s.to_string()),
            ..Opts::default()
        };

        if is_unix {
            let path = url.path();
            opts.socket = Some(if path.is_empty() {
                DEFAULT_UNIX_SOCKET.to_string()
            } else {
                path.to_string()
            });
        } else {
            if let Some(host) = url.host_str() {
                opts.host = host.to_string();
            }
            if let Some(port) = url.port() {
                opts.port = port;
            }
            if let Some(db) = url.path().strip_prefix('/')
                && !db.is_empty()
            {
                opts.dbid = Some(db.parse().map_err(|_| {
                    Error::InvalidUsage(format!("Invalid database index: {}", db))
                })?);
            }
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "poolsize" => {
                    opts.poolsize = value.parse().map_err(|_| {
                        Error::InvalidUsage(format!("Invalid poolsize: {}", value))
                    })?;
                }
                "reconnect" => {
                    opts.reconnect = parse_bool("reconnect", value.as_ref())?;
                }
                "lazy" => {
                    opts.lazy = parse_bool("lazy", value.as_ref())?;
                }
                "db" => {
                    opts.dbid = Some(value.parse().map_err(|_| {
                        Error::InvalidUsage(format!("Invalid db: {}", value))
                    })?);
                }
                "charset" => {
                    opts.charset = match value.as_ref() {
                        "utf-8" | "utf8" => Charset::Utf8,
                        "binary" | "none" => Charset::Binary,
                        _ => {
                            return Err(Error::InvalidUsage(format!(
                                "Invalid charset: expected 'utf-8' or 'binary', got {}",
                                value
                            )));
                        }
                    };
                }
                "connect_timeout_ms" => {
                    let ms: u64 = value.parse().map_err(|_| {
                        Error::InvalidUsage(format!("Invalid connect_timeout_ms: {}", value))
                    })?;
                    opts.connect_timeout = Some(Duration::from_millis(ms));
                }
                _ => {
                    return Err(Error::InvalidUsage(format!(
                        "Unknown connection parameter: {}",
                        key
                    )));
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url =
            Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let opts = Opts::default();
        assert_eq!(opts.host, "localhost");
        assert_eq!(opts.port, 6379);
        assert_eq!(opts.poolsize, 1);
        assert!(opts.reconnect);
        assert!(!opts.lazy);
        assert_eq!(opts.charset, Charset::Utf8);
        assert_eq!(opts.endpoint(), "localhost:6379");
    }

    #[test]
    fn tcp_url() {
        let opts = Opts::try_from("redis://:secret@redis.example.com:6380/3?poolsize=10").unwrap();
        assert_eq!(opts.host, "redis.example.com");
        assert_eq!(opts.port, 6380);
        assert_eq!(opts.dbid, Some(3));
        assert_eq!(opts.poolsize, 10);
        assert_eq!(opts.password.as_deref(), Some("secret"));
    }

    #[test]
    fn unix_url() {
        let opts = Opts::try_from("redis+unix:///var/run/redis.sock?db=2").unwrap();
        assert_eq!(opts.socket.as_deref(), Some("/var/run/redis.sock"));
        assert_eq!(opts.dbid, Some(2));
        assert_eq!(opts.endpoint(), "/var/run/redis.sock");
    }

    #[test]
    fn query_flags() {
        let opts =
            Opts::try_from("redis://localhost?reconnect=off&lazy=1&charset=binary").unwrap();
        assert!(!opts.reconnect);
        assert!(opts.lazy);
        assert_eq!(opts.charset, Charset::Binary);
    }

    #[test]
    fn bad_scheme() {
        assert!(Opts::try_from("postgres://localhost").is_err());
    }

    #[test]
    fn bad_param() {
        assert!(Opts::try_from("redis://localhost?poolsize=zero").is_err());
        assert!(Opts::try_from("redis://localhost?nope=1").is_err());
    }
}
