//! Booking reference generation
//!
//! References are short, human-shareable and globally unique. Uniqueness is
//! finally enforced by storage; a generator only has to make collisions rare.

use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;
use crate::config::{BookingConfig, RedisConfig, ReferenceBackend};
use crate::utils::errors::{EventDeskError, Result};
use crate::utils::helpers::generate_random_string;

const RANDOM_SUFFIX_LEN: usize = 6;

#[async_trait]
pub trait ReferenceGenerator: Send + Sync {
    async fn next_reference(&self) -> Result<String>;
}

/// `PREFIX-YYMMDD-XXXXXX` with a random suffix
#[derive(Debug, Clone)]
pub struct RandomReferenceGenerator {
    prefix: String,
}

impl RandomReferenceGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into().to_uppercase() }
    }
}

#[async_trait]
impl ReferenceGenerator for RandomReferenceGenerator {
    async fn next_reference(&self) -> Result<String> {
        Ok(format!(
            "{}-{}-{}",
            self.prefix,
            Utc::now().format("%y%m%d"),
            generate_random_string(RANDOM_SUFFIX_LEN)
        ))
    }
}

fn sequence_key(redis: &RedisConfig) -> String {
    format!("{}booking_reference_seq", redis.prefix)
}

/// `PREFIX-00000042` from a Redis `INCR` counter shared by all instances
#[derive(Clone)]
pub struct RedisReferenceGenerator {
    connection_manager: ConnectionManager,
    key: String,
    prefix: String,
}

impl RedisReferenceGenerator {
    /// Connect to Redis; the connection manager reconnects on its own afterwards
    pub async fn connect(redis: &RedisConfig, prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis.url.as_str()).map_err(EventDeskError::Redis)?;
        let connection_manager = ConnectionManager::new(client).await?;
        Ok(Self {
            connection_manager,
            key: sequence_key(redis),
            prefix: prefix.into().to_uppercase(),
        })
    }
}

#[async_trait]
impl ReferenceGenerator for RedisReferenceGenerator {
    async fn next_reference(&self) -> Result<String> {
        let mut conn = self.connection_manager.clone();
        let sequence: u64 = conn.incr(&self.key, 1).await?;

        debug!(key = %self.key, sequence = sequence, "Reference sequence advanced");
        Ok(format!("{}-{:08}", self.prefix, sequence))
    }
}

/// Generator selected by `booking.reference_backend`
pub async fn from_config(booking: &BookingConfig, redis: &RedisConfig) -> Result<Arc<dyn ReferenceGenerator>> {
    let generator: Arc<dyn ReferenceGenerator> = match booking.reference_backend {
        ReferenceBackend::Random => Arc::new(RandomReferenceGenerator::new(booking.reference_prefix.as_str())),
        ReferenceBackend::Redis => {
            Arc::new(RedisReferenceGenerator::connect(redis, booking.reference_prefix.as_str()).await?)
        }
    };
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[tokio::test]
    async fn test_random_reference_format() {
        let generator = RandomReferenceGenerator::new("evt");
        let reference = generator.next_reference().await.unwrap();

        let pattern = Regex::new(r"^EVT-\d{6}-[A-Z2-9]{6}$").unwrap();
        assert!(pattern.is_match(&reference), "unexpected reference {}", reference);
    }

    #[tokio::test]
    async fn test_random_references_differ() {
        let generator = RandomReferenceGenerator::new("EVT");
        let a = generator.next_reference().await.unwrap();
        let b = generator.next_reference().await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sequence_key_uses_redis_prefix() {
        let redis = RedisConfig { url: "redis://localhost:6379".into(), prefix: "eventdesk:".into() };
        assert_eq!(sequence_key(&redis), "eventdesk:booking_reference_seq");
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_at_startup() {
        let redis = RedisConfig { url: "redis://127.0.0.1:1".into(), prefix: "eventdesk:".into() };
        let booking = BookingConfig { reference_backend: ReferenceBackend::Redis, ..BookingConfig::default() };
        assert!(from_config(&booking, &redis).await.is_err());
    }
}
