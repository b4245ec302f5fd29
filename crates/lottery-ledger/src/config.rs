//! Ledger endpoint configuration

use std::time::Duration;

/// Connection and confirmation settings of the RPC endpoint.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Status polls before a submitted transfer counts as unconfirmed
    pub confirmation_attempts: u32,
    pub confirmation_interval: Duration,
}

impl LedgerConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            confirmation_attempts: 30,
            confirmation_interval: Duration::from_secs(1),
        }
    }
}
