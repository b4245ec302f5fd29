//! # Lottery Gateway
//!
//! WebSocket push transport: every subscriber receives a `gameUpdate` on
//! connect and on every round change, and may send `placeBet` or `resetGame`.
//!
//! ## Security
//!
//! - Inbound frames above the configured size are refused
//! - Slow subscribers skip stale snapshots instead of buffering unboundedly

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;

pub use broadcaster::WsBroadcaster;
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{router, serve, serve_on, AppState};
