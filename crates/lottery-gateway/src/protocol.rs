//! Wire protocol of the push transport
//!
//! Every frame is a JSON object tagged by its `type` field.

use lottery_core::{BetRequest, RoundSnapshot};
use serde::{Deserialize, Serialize};

/// Reply sent for frames that cannot be decoded.
pub const MALFORMED_MESSAGE: &str = "Invalid message format";

/// Reply sent when a connection exceeds its message rate.
pub const RATE_LIMITED: &str = "Too many messages, slow down";

/// Reply sent when a connection already has too many bets in verification.
pub const TOO_MANY_PENDING_BETS: &str = "Too many bets awaiting verification, wait for a reply";

/// Frames sent by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    PlaceBet(BetRequest),
    ResetGame {},
}

/// Frames sent to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    GameUpdate(RoundSnapshot),
    BetPlaced { message: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // all variants serialize to plain JSON objects
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"type":"error","message":"{MALFORMED_MESSAGE}"}}"#)
        })
    }
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_parse_place_bet() {
        let message = ClientMessage::parse(
            r#"{"type":"placeBet","identity":"Alice","amount":0.5,"transferId":"5xSig"}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ClientMessage::PlaceBet(BetRequest {
                identity: "Alice".into(),
                amount: 0.5,
                transfer_id: Some("5xSig".into()),
            })
        );
    }

    #[test]
    fn test_parse_place_bet_without_transfer() {
        let message = ClientMessage::parse(r#"{"type":"placeBet","identity":"A","amount":1}"#).unwrap();
        assert!(matches!(
            message,
            ClientMessage::PlaceBet(BetRequest { transfer_id: None, .. })
        ));
    }

    #[test]
    fn test_parse_reset() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"resetGame"}"#).unwrap(),
            ClientMessage::ResetGame {}
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(ClientMessage::parse(r#"{"type":"withdraw"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type":"placeBet","amount":1}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn test_server_messages_are_tagged() {
        let placed: Value =
            serde_json::from_str(&ServerMessage::BetPlaced { message: "ok".into() }.to_json()).unwrap();
        assert_eq!(placed, json!({"type": "betPlaced", "message": "ok"}));

        let error: Value = serde_json::from_str(&ServerMessage::error("nope").to_json()).unwrap();
        assert_eq!(error, json!({"type": "error", "message": "nope"}));
    }
}
