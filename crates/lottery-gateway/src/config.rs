//! Gateway configuration with validation.

use crate::error::{GatewayError, GatewayResult};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default listen port
pub const DEFAULT_PORT: u16 = 3001;

/// Default maximum inbound message size (64KB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default rate limit (messages per second per connection)
pub const DEFAULT_RATE_LIMIT: u32 = 20;

/// Default cap on bets in verification per connection
pub const DEFAULT_MAX_PENDING_BETS: usize = 4;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    /// Snapshots buffered per subscriber before a slow one starts skipping
    pub channel_capacity: usize,
    /// Inbound text frames above this size are refused
    pub max_message_size: usize,
    /// Messages accepted per connection in any one-second window
    pub rate_limit: u32,
    /// Bets a connection may have in verification at once
    pub max_pending_bets: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            channel_capacity: 256,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            rate_limit: DEFAULT_RATE_LIMIT,
            max_pending_bets: DEFAULT_MAX_PENDING_BETS,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.channel_capacity == 0 {
            return Err(GatewayError::Config("channel_capacity cannot be 0".into()));
        }
        if self.max_message_size == 0 {
            return Err(GatewayError::Config("max_message_size cannot be 0".into()));
        }
        if self.rate_limit == 0 {
            return Err(GatewayError::Config("rate_limit cannot be 0".into()));
        }
        if self.max_pending_bets == 0 {
            return Err(GatewayError::Config("max_pending_bets cannot be 0".into()));
        }
        Ok(())
    }
}
