use crate::store::{parse_count, Counter, Store};
use crate::Error;
use actix_web::rt::time::{timeout, Instant};
use redis::aio::ConnectionManager;
use redis::IntoConnectionInfo;
use std::borrow::Cow;
use std::time::Duration;

/// How long startup waits for the store to answer before giving up.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection parameters for [RedisStore::connect].
#[derive(Clone, Debug)]
pub struct RedisSettings {
    /// `host:port` of the Redis server.
    pub address: String,
    /// Logical database index.
    pub database: i64,
    pub password: Option<String>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            address: "localhost:6379".to_owned(),
            database: 0,
            password: None,
        }
    }
}

/// A [Store] that keeps its state in Redis, shared by every instance of the service.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: Option<String>,
}

impl RedisStore {
    /// Create a Builder.
    ///
    /// # Arguments
    ///
    /// * `connection`: a Redis connection manager, cloned for each call
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use actix_admission_gate::store::redis::RedisStore;
    /// # use redis::aio::ConnectionManager;
    /// # async fn example() {
    /// let client = redis::Client::open("redis://127.0.0.1/").unwrap();
    /// let manager = ConnectionManager::new(client).await.unwrap();
    /// let store = RedisStore::builder(manager).build();
    /// # };
    /// ```
    pub fn builder(connection: ConnectionManager) -> Builder {
        Builder {
            connection,
            key_prefix: None,
        }
    }

    /// Open a connection and verify it answers a `PING` within `connect_timeout`.
    ///
    /// The service cannot make correct decisions without its store, so any failure here is
    /// reported as [Error::Connectivity].
    pub async fn connect(settings: &RedisSettings, connect_timeout: Duration) -> Result<Builder, Error> {
        let connectivity = |e: redis::RedisError| Error::Connectivity(e.to_string());
        let mut info = format!("redis://{}", settings.address)
            .into_connection_info()
            .map_err(connectivity)?;
        info.redis.db = settings.database;
        info.redis.password = settings.password.clone();
        let client = redis::Client::open(info).map_err(connectivity)?;

        let connection = timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| Error::Connectivity(format!("no connection within {connect_timeout:?}")))?
            .map_err(connectivity)?;
        let builder = Self::builder(connection);
        let probe = builder.clone_store();
        timeout(connect_timeout, probe.ping())
            .await
            .map_err(|_| Error::Connectivity(format!("no PING reply within {connect_timeout:?}")))?
            .map_err(|e| Error::Connectivity(e.to_string()))?;

        log::info!(
            "Connected to Redis at {} (db {})",
            settings.address,
            settings.database
        );
        Ok(builder)
    }

    fn make_key<'t>(&self, key: &'t str) -> Cow<'t, str> {
        match &self.key_prefix {
            None => Cow::Borrowed(key),
            Some(prefix) => Cow::Owned(format!("{prefix}{key}")),
        }
    }
}

pub struct Builder {
    connection: ConnectionManager,
    key_prefix: Option<String>,
}

impl Builder {
    /// Apply an optional prefix to all keys given to this store.
    ///
    /// This may be useful when the Redis instance is being used for other purposes; the prefix is
    /// used as a 'namespace' to avoid collision with other caches or keys inside Redis.
    pub fn key_prefix(mut self, key_prefix: Option<&str>) -> Self {
        self.key_prefix = key_prefix.map(ToOwned::to_owned);
        self
    }

    fn clone_store(&self) -> RedisStore {
        RedisStore {
            connection: self.connection.clone(),
            key_prefix: self.key_prefix.clone(),
        }
    }

    pub fn build(self) -> RedisStore {
        RedisStore {
            connection: self.connection,
            key_prefix: self.key_prefix,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let key = self.make_key(key);
        let mut con = self.connection.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key.as_ref())
            .query_async(&mut con)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), Error> {
        let ttl = millis(ttl);
        if ttl == 0 {
            // Redis refuses a zero expiry, an already expired value is simply absent
            return self.delete(key).await;
        }
        let key = self.make_key(key);
        let mut con = self.connection.clone();
        let () = redis::cmd("SET")
            .arg(key.as_ref())
            .arg(value)
            .arg("PX")
            .arg(ttl)
            .query_async(&mut con)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let key = self.make_key(key);
        let mut con = self.connection.clone();
        let () = redis::cmd("DEL")
            .arg(key.as_ref())
            .query_async(&mut con)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), Error> {
        let mut con = self.connection.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<Counter, Error> {
        let key = self.make_key(key);
        let window_ms = millis(window);

        let mut pipe = redis::pipe();
        pipe.atomic()
            // Increment the rate limit count
            .cmd("INCR")
            .arg(key.as_ref())
            // Set the key to expire (only if it doesn't already have an expiry)
            .cmd("PEXPIRE")
            .arg(key.as_ref())
            .arg(window_ms)
            .arg("NX")
            .ignore()
            // Return time-to-live of key
            .cmd("PTTL")
            .arg(key.as_ref());

        let mut con = self.connection.clone();
        let (count, pttl): (u64, i64) = pipe.query_async(&mut con).await?;

        // PEXPIRE NX inside the transaction guarantees a TTL, unless a zero window
        // expired the key on the spot (PTTL -2)
        Ok(Counter {
            count,
            resets_at: Instant::now() + Duration::from_millis(pttl.max(0) as u64),
        })
    }

    async fn counter(&self, key: &str) -> Result<Option<Counter>, Error> {
        let prefixed = self.make_key(key);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("GET")
            .arg(prefixed.as_ref())
            .cmd("PTTL")
            .arg(prefixed.as_ref());

        let mut con = self.connection.clone();
        let (value, pttl): (Option<Vec<u8>>, i64) = pipe.query_async(&mut con).await?;
        match value {
            None => Ok(None),
            Some(value) => Ok(Some(Counter {
                count: parse_count(key, &value)?,
                resets_at: Instant::now() + Duration::from_millis(pttl.max(0) as u64),
            })),
        }
    }
}
