//! Node configuration from environment variables.

use crate::telemetry::TelemetryConfig;
use anyhow::{bail, Context, Result};
use lottery_core::{Address, LotteryConfig};
use lottery_gateway::GatewayConfig;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Ledger endpoint; `None` runs the node in simulation-only mode
    pub rpc_url: Option<String>,
    pub lottery: LotteryConfig,
    pub gateway: GatewayConfig,
    pub telemetry: TelemetryConfig,
}

impl NodeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LOTTERY_RPC_URL`: Solana RPC endpoint (unset: simulation only)
    /// - `LOTTERY_PLATFORM_ADDRESS`: Receiver of the platform fee
    /// - `LOTTERY_PLATFORM_FEE_BPS`: Platform fee in basis points (default: 250)
    /// - `LOTTERY_BIND_ADDR`: Listen address (default: 0.0.0.0)
    /// - `LOTTERY_PORT` or `PORT`: Listen port (default: 3001)
    /// - `LOTTERY_ROUND_SECS`: Countdown length (default: 60)
    /// - `LOTTERY_GRACE_SECS`: Pause between rounds (default: 15)
    /// - `LOTTERY_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `LOTTERY_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut lottery = LotteryConfig::default();
        let mut gateway = GatewayConfig::default();
        let mut telemetry = TelemetryConfig::default();

        if let Some(address) = lookup("LOTTERY_PLATFORM_ADDRESS") {
            lottery.platform_address =
                Address::parse(&address).context("LOTTERY_PLATFORM_ADDRESS is not a valid address")?;
        }
        if let Some(bps) = parse_var(&lookup, "LOTTERY_PLATFORM_FEE_BPS")? {
            lottery.platform_fee_bps = bps;
        }
        if let Some(secs) = parse_var(&lookup, "LOTTERY_ROUND_SECS")? {
            lottery.round_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "LOTTERY_GRACE_SECS")? {
            lottery.grace_period = Duration::from_secs(secs);
        }
        lottery.validate().context("invalid lottery configuration")?;

        let ip: IpAddr = parse_var(&lookup, "LOTTERY_BIND_ADDR")?.unwrap_or(gateway.bind_addr.ip());
        let port: u16 = match parse_var(&lookup, "LOTTERY_PORT")? {
            Some(port) => port,
            None => parse_var(&lookup, "PORT")?.unwrap_or(gateway.bind_addr.port()),
        };
        gateway.bind_addr = SocketAddr::new(ip, port);

        if let Some(level) = lookup("LOTTERY_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            telemetry.log_level = level;
        }
        telemetry.json_logs = lookup("LOTTERY_JSON_LOGS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let rpc_url = lookup("LOTTERY_RPC_URL").filter(|url| !url.trim().is_empty());

        Ok(Self {
            rpc_url,
            lottery,
            gateway,
            telemetry,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Ok(Some(value)),
            Err(e) => bail!("{key}={raw} is invalid: {e}"),
        },
    }
}
