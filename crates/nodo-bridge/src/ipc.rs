use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event_bus::EventBus;
use crate::protocol::{Command, Notification, Reply};

/// Errors that can occur while decoding or encoding IPC frames.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("malformed request: {0}")]
    Decode(String),

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, IpcError>;

/// Anything that can execute a [`Command`] and answer synchronously.
///
/// Implementations must not wait on worker completion; long-running work is
/// reported through the [`EventBus`].
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> Reply;
}

#[async_trait]
impl<T: CommandHandler + ?Sized> CommandHandler for Arc<T> {
    async fn handle(&self, command: Command) -> Reply {
        (**self).handle(command).await
    }
}

/// A caller request with its correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: Uuid,
    pub command: Command,
}

impl RequestFrame {
    pub fn new(command: Command) -> Self {
        Self {
            id: Uuid::new_v4(),
            command,
        }
    }
}

/// Answer to a [`RequestFrame`], carrying the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: Uuid,
    pub reply: Reply,
}

/// A notification as it leaves the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFrame {
    pub timestamp: DateTime<Utc>,
    pub notification: Notification,
}

impl NotificationFrame {
    pub fn now(notification: Notification) -> Self {
        Self {
            timestamp: Utc::now(),
            notification,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| IpcError::Encode(e.to_string()))
    }
}

/// Decodes JSON frames from the transport, routes them to a
/// [`CommandHandler`] and encodes the reply.
pub struct IpcHandler<H> {
    handler: H,
    event_bus: EventBus,
}

impl<H: CommandHandler> IpcHandler<H> {
    pub fn new(handler: H, event_bus: EventBus) -> Self {
        Self { handler, event_bus }
    }

    /// The bus whose notifications the transport should forward.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub async fn handle_message(&self, request: RequestFrame) -> ResponseFrame {
        debug!(id = %request.id, command = request.command.name(), "ipc request");
        let reply = self.handler.handle(request.command).await;
        if let Reply::Rejected { reason } = &reply {
            warn!(id = %request.id, %reason, "ipc request rejected");
        }
        ResponseFrame {
            id: request.id,
            reply,
        }
    }

    /// Handle one JSON-encoded request frame and return the encoded response.
    pub async fn handle_json(&self, frame: &str) -> Result<String> {
        let request: RequestFrame =
            serde_json::from_str(frame).map_err(|e| IpcError::Decode(e.to_string()))?;
        let response = self.handle_message(request).await;
        serde_json::to_string(&response).map_err(|e| IpcError::Encode(e.to_string()))
    }
}
