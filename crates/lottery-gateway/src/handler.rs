//! WebSocket connection handler
//!
//! Each connection gets a writer task that merges round snapshots from the
//! broadcast channel with replies addressed to this connection only. Bets are
//! processed on their own tasks so a slow verification never stalls the
//! reader or other subscribers.
//!
//! Limits per connection:
//! - Message size
//! - Messages per one-second window
//! - Bets in verification at once

use crate::broadcaster::WsBroadcaster;
use crate::config::GatewayConfig;
use crate::protocol::{
    ClientMessage, ServerMessage, MALFORMED_MESSAGE, RATE_LIMITED, TOO_MANY_PENDING_BETS,
};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use lottery_core::LotteryApi;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ConnectionHandler {
    api: Arc<dyn LotteryApi>,
    broadcaster: WsBroadcaster,
    connection_id: Uuid,
    max_message_size: usize,
    rate_limit: u32,
    /// Message counter for rate limiting
    message_count: u32,
    /// Rate limit window start
    rate_limit_window: Instant,
    /// One permit per bet in verification
    pending_bets: Arc<Semaphore>,
}

impl ConnectionHandler {
    pub fn new(api: Arc<dyn LotteryApi>, broadcaster: WsBroadcaster, config: &GatewayConfig) -> Self {
        Self {
            api,
            broadcaster,
            connection_id: Uuid::new_v4(),
            max_message_size: config.max_message_size,
            rate_limit: config.rate_limit,
            message_count: 0,
            rate_limit_window: Instant::now(),
            pending_bets: Arc::new(Semaphore::new(config.max_pending_bets)),
        }
    }

    /// Check rate limit, returns true if the message is allowed
    fn check_rate_limit(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.rate_limit_window) >= Duration::from_secs(1) {
            self.rate_limit_window = now;
            self.message_count = 0;
        }

        self.message_count += 1;
        self.message_count <= self.rate_limit
    }

    pub async fn handle(mut self, socket: WebSocket) {
        let connection_id = self.connection_id;
        info!(
            %connection_id,
            subscribers = self.broadcaster.subscriber_count() + 1,
            "New WebSocket connection"
        );

        let (mut sink, mut stream) = socket.split();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();
        // subscribe before reading the snapshot so no update falls in between
        let mut updates = self.broadcaster.subscribe();
        let initial = ServerMessage::GameUpdate(self.api.snapshot()).to_json();

        let writer = tokio::spawn(async move {
            if let Err(e) = sink.send(Message::Text(initial)).await {
                debug!(%connection_id, error = %e, "Failed to send initial snapshot");
                return;
            }
            loop {
                let text = tokio::select! {
                    reply = reply_rx.recv() => match reply {
                        Some(reply) => reply.to_json(),
                        None => break,
                    },
                    update = updates.recv() => match update {
                        Ok(frame) => frame.to_string(),
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(%connection_id, skipped, "Subscriber lagging, skipped snapshots");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!(%connection_id, error = %e, "Failed to send WebSocket frame");
                    break;
                }
            }
        });

        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => self.on_text(&text, &reply_tx),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => self.on_text(&text, &reply_tx),
                    Err(_) => reply(&reply_tx, ServerMessage::error(MALFORMED_MESSAGE)),
                },
                Ok(Message::Close(_)) => {
                    debug!(%connection_id, "WebSocket close received");
                    break;
                }
                // ping/pong are answered by the socket itself
                Ok(_) => {}
                Err(e) => {
                    warn!(%connection_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }

        writer.abort();
        info!(%connection_id, "WebSocket connection closed");
    }

    /// Decode one inbound frame and dispatch it.
    pub fn on_text(&mut self, text: &str, replies: &mpsc::UnboundedSender<ServerMessage>) {
        if !self.check_rate_limit() {
            warn!(connection_id = %self.connection_id, limit = self.rate_limit, "Rate limit exceeded");
            reply(replies, ServerMessage::error(RATE_LIMITED));
            return;
        }
        if text.len() > self.max_message_size {
            warn!(
                connection_id = %self.connection_id,
                size = text.len(),
                max = self.max_message_size,
                "Message exceeds size limit"
            );
            reply(replies, ServerMessage::error(MALFORMED_MESSAGE));
            return;
        }

        match ClientMessage::parse(text) {
            Ok(ClientMessage::PlaceBet(request)) => {
                let Ok(permit) = self.pending_bets.clone().try_acquire_owned() else {
                    debug!(connection_id = %self.connection_id, "Too many bets in verification");
                    reply(replies, ServerMessage::error(TOO_MANY_PENDING_BETS));
                    return;
                };
                let api = self.api.clone();
                let replies = replies.clone();
                let connection_id = self.connection_id;
                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = match api.place_bet(request).await {
                        Ok(message) => ServerMessage::BetPlaced { message },
                        Err(e) => {
                            debug!(%connection_id, error = %e, "Bet refused");
                            ServerMessage::error(e.to_string())
                        }
                    };
                    reply(&replies, outcome);
                });
            }
            Ok(ClientMessage::ResetGame {}) => {
                info!(connection_id = %self.connection_id, "Reset requested by subscriber");
                let api = self.api.clone();
                tokio::spawn(async move { api.reset_game().await });
            }
            Err(e) => {
                debug!(connection_id = %self.connection_id, error = %e, "Malformed message");
                reply(replies, ServerMessage::error(MALFORMED_MESSAGE));
            }
        }
    }
}

fn reply(replies: &mpsc::UnboundedSender<ServerMessage>, message: ServerMessage) {
    if replies.send(message).is_err() {
        debug!("Reply dropped, connection already closed");
    }
}
