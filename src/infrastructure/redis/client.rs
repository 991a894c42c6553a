use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::info;

/// Redis connection used for the revoked-token blocklist.
#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(connection_string)?;

        // Fail fast on a bad URL instead of on the first request
        let _conn = client.get_multiplexed_async_connection().await?;

        info!("✅ Connected to Redis");
        Ok(Self { client })
    }

    pub async fn get_conn(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    pub async fn is_token_blocked(&self, token: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.get_conn().await?;
        conn.exists(format!("blocked_token:{token}")).await
    }
}
