use std::fmt::{Display, Formatter};
use std::time::Duration;

/// One of the two independent limiting axes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Dimension {
    /// The client network address.
    Address,
    /// The caller supplied API token.
    Token,
}

impl Dimension {
    /// Namespace prefix that keeps the two dimensions from colliding in the store.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Address => "ip:",
            Self::Token => "token:",
        }
    }

    /// The store key for an identity within this dimension.
    pub fn key(self, identity: &str) -> String {
        format!("{}{identity}", self.prefix())
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address => f.write_str("ip"),
            Self::Token => f.write_str("token"),
        }
    }
}

/// Limits applied to a single [Dimension].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DimensionPolicy {
    /// Whether this dimension is evaluated at all.
    pub enabled: bool,
    /// The total requests to be allowed within each one second window.
    pub max_requests: u64,
    /// How long an identity stays blocked once it exceeds `max_requests`.
    pub block_seconds: u64,
}

impl DimensionPolicy {
    pub fn new(max_requests: u64, block_seconds: u64) -> Self {
        Self {
            enabled: true,
            max_requests,
            block_seconds,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0, 0)
        }
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_seconds)
    }
}

/// The admission policy, fixed for the lifetime of the process.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Policy {
    pub address: DimensionPolicy,
    pub token: DimensionPolicy,
}

impl Policy {
    pub fn dimension(&self, dimension: Dimension) -> &DimensionPolicy {
        match dimension {
            Dimension::Address => &self.address,
            Dimension::Token => &self.token,
        }
    }

    /// A policy that admits every request.
    pub fn unrestricted() -> Self {
        Self {
            address: DimensionPolicy::disabled(),
            token: DimensionPolicy::disabled(),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            address: DimensionPolicy::new(10, 60),
            token: DimensionPolicy::new(100, 60),
        }
    }
}
