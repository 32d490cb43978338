//! Signaling hub.
//!
//! Per-session multiplexer over websocket connections. Participants are
//! grouped by session id into channels; an in-band message sent to a
//! channel is forwarded to every connected client except its sender.
//!
//! Channels and clients live in memory only and are lost on restart.
//! A channel exists iff it has at least one live client: the last
//! disconnect removes the channel under the channel-table write lock.
//!
//! # Concurrency
//!
//! The channel table and each channel's client table are guarded by
//! read-write locks; lookups take the read lock, membership changes take
//! the write lock. Fan-out holds only the channel read lock and enqueues
//! on bounded per-client queues; a dedicated writer task per client
//! drains its queue onto the socket, so the hub never blocks on a slow
//! peer. A client whose queue is full at fan-out time is treated as dead
//! and removed, which closes its queue and makes the writer task send a
//! CLOSE frame.

use crate::errors::SmError;
use crate::models::Message;
use crate::observability::metrics;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, instrument, warn};

/// Per-client outbound queue bound, in frames.
const OUTBOUND_QUEUE_FRAMES: usize = 64;

/// A connected client's hub-side handle: its identity and outbound queue.
struct ChannelClient {
    sender: mpsc::Sender<String>,
}

/// The live clients of one session, keyed by user id.
struct Channel {
    clients: RwLock<HashMap<String, ChannelClient>>,
}

impl Channel {
    fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Add a client to the channel.
    ///
    /// # Errors
    ///
    /// - `SmError::Conflict` - A client with this user id is already joined
    async fn join(&self, user_id: &str) -> Result<mpsc::Receiver<String>, SmError> {
        let mut clients = self.clients.write().await;

        if clients.contains_key(user_id) {
            return Err(SmError::Conflict(format!(
                "client(userId={}) has already joined channel",
                user_id
            )));
        }

        let (sender, receiver) = mpsc::channel(OUTBOUND_QUEUE_FRAMES);
        clients.insert(user_id.to_string(), ChannelClient { sender });

        Ok(receiver)
    }
}

/// A registered client's connection-side handle: its identity and the
/// receiving end of its outbound queue.
struct ClientHandle {
    session_id: String,
    user_id: String,
    receiver: mpsc::Receiver<String>,
}

/// Relayer of signaling messages between session participants.
pub struct SignalingHub {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
}

impl Default for SignalingHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Connect a participant's upgraded websocket to its session's
    /// channel, creating the channel on first join.
    ///
    /// On Conflict the upgraded transport is closed and the error
    /// returned; the original client stays connected. On success the
    /// client driver (writer task plus inbound reader) is spawned and
    /// the call returns, so a subsequent send can reach the new client
    /// through its queue.
    ///
    /// # Errors
    ///
    /// - `SmError::Conflict` - The (session, user) pair is already connected
    #[instrument(skip_all, name = "sm.hub.connect", fields(session_id = %session_id))]
    pub async fn connect(
        self: &Arc<Self>,
        mut socket: WebSocket,
        session_id: &str,
        user_id: &str,
    ) -> Result<(), SmError> {
        let handle = match self.register(session_id, user_id).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    target: "sm.hub",
                    session_id = %session_id,
                    error = %e,
                    "Duplicate join, closing upgraded transport"
                );
                if let Err(close_err) = socket.send(WsMessage::Close(None)).await {
                    debug!(target: "sm.hub", error = %close_err, "Failed to close websocket connection");
                }
                return Err(e);
            }
        };

        tokio::spawn(Arc::clone(self).run_client(socket, handle));
        Ok(())
    }

    /// Add a participant to its session's channel.
    async fn register(&self, session_id: &str, user_id: &str) -> Result<ClientHandle, SmError> {
        let channel = self.find_or_create_channel(session_id).await;
        let receiver = channel.join(user_id).await?;

        debug!(
            target: "sm.hub",
            session_id = %session_id,
            "Client registered on channel"
        );

        Ok(ClientHandle {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            receiver,
        })
    }

    /// Drive a client's upgraded websocket until it disconnects.
    ///
    /// Spawns a writer task that forwards the outbound queue as TEXT
    /// frames and sends a CLOSE frame once the queue closes or a write
    /// fails. The inbound side is drained to detect disconnects; on
    /// close or transport error the client is removed from its channel.
    async fn run_client(self: Arc<Self>, socket: WebSocket, handle: ClientHandle) {
        let ClientHandle {
            session_id,
            user_id,
            mut receiver,
        } = handle;

        let (mut sink, mut stream) = socket.split();

        let writer = tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                if let Err(e) = sink.send(WsMessage::Text(frame)).await {
                    warn!(target: "sm.hub", error = %e, "Failed to send message");
                    break;
                }
            }

            if let Err(e) = sink.send(WsMessage::Close(None)).await {
                debug!(target: "sm.hub", error = %e, "Failed to close websocket connection");
            }
        });

        while let Some(result) = stream.next().await {
            match result {
                Ok(WsMessage::Close(_)) | Err(_) => break,
                // Inbound frames are not routed; fan-out goes through send()
                Ok(_) => {}
            }
        }

        self.remove_client(&session_id, &user_id).await;

        // Dropping the queue sender above wakes the writer, which says
        // goodbye and releases the transport.
        if let Err(e) = writer.await {
            warn!(target: "sm.hub", error = %e, "Writer task failed");
        }
    }

    /// Send a message to all clients connected to its session's channel,
    /// except the sender. A message with an empty sender id (server
    /// originated, e.g. the OFFER) reaches every client.
    ///
    /// # Errors
    ///
    /// - `SmError::PreconditionRequired` - No channel exists for the session
    /// - `SmError::Internal` - The envelope could not be serialized
    #[instrument(skip_all, name = "sm.hub.send", fields(session_id = %message.session_id))]
    pub async fn send(&self, message: &Message) -> Result<(), SmError> {
        let channel = self
            .find_channel(&message.session_id)
            .await
            .ok_or_else(|| {
                SmError::PreconditionRequired(format!("no such channel {}", message.session_id))
            })?;

        // Serialize once; every recipient gets the same bytes.
        let data = serde_json::to_string(message)
            .map_err(|e| SmError::Internal(format!("failed to serialize message: {}", e)))?;

        let mut dead = Vec::new();
        {
            let clients = channel.clients.read().await;
            for (id, client) in clients.iter() {
                if !message.sender_id.is_empty() && *id == message.sender_id {
                    continue;
                }

                if let Err(e) = client.sender.try_send(data.clone()) {
                    warn!(
                        target: "sm.hub",
                        session_id = %message.session_id,
                        error = %e,
                        "Client queue unavailable, dropping client"
                    );
                    dead.push(id.clone());
                }
            }
        }

        for id in dead {
            self.remove_client(&message.session_id, &id).await;
        }

        metrics::record_message_sent(&message.message_type);
        Ok(())
    }

    async fn find_channel(&self, channel_id: &str) -> Option<Arc<Channel>> {
        let channels = self.channels.read().await;
        channels.get(channel_id).cloned()
    }

    async fn find_or_create_channel(&self, channel_id: &str) -> Arc<Channel> {
        if let Some(channel) = self.find_channel(channel_id).await {
            return channel;
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(Channel::new()))
            .clone()
    }

    /// Remove a client from its channel; an emptied channel is removed
    /// from the table. Holding the table write lock across the emptiness
    /// check keeps the removal race-free against concurrent joins.
    async fn remove_client(&self, session_id: &str, user_id: &str) {
        let mut channels = self.channels.write().await;

        let Some(channel) = channels.get(session_id) else {
            return;
        };

        let mut clients = channel.clients.write().await;
        clients.remove(user_id);

        if clients.is_empty() {
            drop(clients);
            channels.remove(session_id);
            debug!(target: "sm.hub", session_id = %session_id, "Removed empty channel");
        }
    }

    /// Number of live channels, for tests and diagnostics.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{MESSAGE_TYPE_OFFER, MESSAGE_TYPE_TEXT};

    fn text_message(session_id: &str, sender_id: &str, body: &str) -> Message {
        Message {
            message_type: MESSAGE_TYPE_TEXT.to_string(),
            sender_id: sender_id.to_string(),
            session_id: session_id.to_string(),
            body: serde_json::json!(body),
        }
    }

    #[tokio::test]
    async fn test_register_creates_channel_lazily() {
        let hub = SignalingHub::new();
        assert_eq!(hub.channel_count().await, 0);

        hub.register("session-1", "user-a").await.unwrap();
        assert_eq!(hub.channel_count().await, 1);

        hub.register("session-1", "user-b").await.unwrap();
        assert_eq!(hub.channel_count().await, 1);

        hub.register("session-2", "user-a").await.unwrap();
        assert_eq!(hub.channel_count().await, 2);
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let hub = SignalingHub::new();

        let original = hub.register("session-1", "user-a").await.unwrap();
        let result = hub.register("session-1", "user-a").await;

        assert!(matches!(result, Err(SmError::Conflict(_))));

        // The original client stays connected: its queue still receives
        let mut receiver = original.receiver;
        hub.send(&text_message("session-1", "", "hello")).await.unwrap();
        let frame = receiver.try_recv().expect("original client should receive");
        assert!(frame.contains("hello"));
    }

    #[tokio::test]
    async fn test_send_without_channel_is_precondition_required() {
        let hub = SignalingHub::new();

        let result = hub.send(&text_message("missing", "user-a", "hi")).await;
        assert!(matches!(result, Err(SmError::PreconditionRequired(_))));
    }

    #[tokio::test]
    async fn test_send_skips_sender() {
        let hub = SignalingHub::new();

        let mut a = hub.register("session-1", "user-a").await.unwrap();
        let mut b = hub.register("session-1", "user-b").await.unwrap();
        let mut c = hub.register("session-1", "user-c").await.unwrap();

        hub.send(&text_message("session-1", "user-a", "hello"))
            .await
            .unwrap();

        assert!(a.receiver.try_recv().is_err(), "sender must not receive");

        let to_b = b.receiver.try_recv().expect("b should receive");
        let to_c = c.receiver.try_recv().expect("c should receive");

        let envelope: Message = serde_json::from_str(&to_b).unwrap();
        assert_eq!(envelope.message_type, MESSAGE_TYPE_TEXT);
        assert_eq!(envelope.sender_id, "user-a");
        assert_eq!(envelope.session_id, "session-1");
        assert_eq!(envelope.body, serde_json::json!("hello"));
        assert_eq!(to_b, to_c);
    }

    #[tokio::test]
    async fn test_send_with_empty_sender_reaches_all() {
        let hub = SignalingHub::new();

        let mut a = hub.register("session-1", "user-a").await.unwrap();
        let mut b = hub.register("session-1", "user-b").await.unwrap();

        let offer = Message {
            message_type: MESSAGE_TYPE_OFFER.to_string(),
            sender_id: String::new(),
            session_id: "session-1".to_string(),
            body: serde_json::json!({"token": "jwt"}),
        };

        hub.send(&offer).await.unwrap();

        assert!(a.receiver.try_recv().is_ok());
        assert!(b.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_frames_delivered_in_order() {
        let hub = SignalingHub::new();

        let _a = hub.register("session-1", "user-a").await.unwrap();
        let mut b = hub.register("session-1", "user-b").await.unwrap();

        for i in 0..5 {
            hub.send(&text_message("session-1", "user-a", &format!("m{}", i)))
                .await
                .unwrap();
        }

        for i in 0..5 {
            let frame = b.receiver.try_recv().unwrap();
            let envelope: Message = serde_json::from_str(&frame).unwrap();
            assert_eq!(envelope.body, serde_json::json!(format!("m{}", i)));
        }
    }

    #[tokio::test]
    async fn test_remove_last_client_removes_channel() {
        let hub = SignalingHub::new();

        hub.register("session-1", "user-a").await.unwrap();
        hub.register("session-1", "user-b").await.unwrap();

        hub.remove_client("session-1", "user-a").await;
        assert_eq!(hub.channel_count().await, 1);

        hub.remove_client("session-1", "user-b").await;
        assert_eq!(hub.channel_count().await, 0);

        let result = hub.send(&text_message("session-1", "", "hi")).await;
        assert!(matches!(result, Err(SmError::PreconditionRequired(_))));
    }

    #[tokio::test]
    async fn test_rejoin_after_disconnect_is_allowed() {
        let hub = SignalingHub::new();

        hub.register("session-1", "user-a").await.unwrap();
        hub.remove_client("session-1", "user-a").await;

        let result = hub.register("session-1", "user-a").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_full_queue_drops_client() {
        let hub = SignalingHub::new();

        // b never drains its queue
        let b = hub.register("session-1", "user-b").await.unwrap();
        let _a = hub.register("session-1", "user-a").await.unwrap();

        for i in 0..OUTBOUND_QUEUE_FRAMES {
            hub.send(&text_message("session-1", "user-a", &format!("m{}", i)))
                .await
                .unwrap();
        }

        // The 65th frame finds b's queue full; b is treated as dead
        hub.send(&text_message("session-1", "user-a", "overflow"))
            .await
            .unwrap();

        // b's queue was closed by removal
        let mut receiver = b.receiver;
        let mut drained = 0;
        while receiver.try_recv().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, OUTBOUND_QUEUE_FRAMES);

        // a is still connected, so the channel survives
        assert_eq!(hub.channel_count().await, 1);

        // and b can register again
        assert!(hub.register("session-1", "user-b").await.is_ok());
    }
}
