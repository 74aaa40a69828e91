//! Shared Redis plumbing for the cache backend and the event log.

use redis::{Client, RedisError};

use super::error::InfraError;

pub fn open_client(url: &str) -> Result<Client, InfraError> {
    Client::open(url).map_err(|err| InfraError::redis(format!("invalid redis url: {err}")))
}

/// True when the error means the connection itself is unusable rather than the
/// command being rejected.
pub fn is_transport_error(err: &RedisError) -> bool {
    err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN ... MATCH`.
pub fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_glob_only_touches_metacharacters() {
        assert_eq!(escape_glob("feedline:api:cache:feeds:"), "feedline:api:cache:feeds:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn io_errors_are_transport() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(is_transport_error(&err));
    }

    #[test]
    fn server_errors_are_not_transport() {
        let err = RedisError::from((redis::ErrorKind::ResponseError, "WRONGTYPE"));
        assert!(!is_transport_error(&err));
    }

    #[test]
    fn rejects_non_redis_urls() {
        assert!(open_client("http://localhost").is_err());
        assert!(open_client("redis://127.0.0.1:6379/0").is_ok());
    }
}
