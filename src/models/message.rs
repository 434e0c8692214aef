use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::Role;

/// WebSocket message types exchanged with the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Token handshake from a client
    AuthenticationRequest,
    /// Handshake result
    AuthenticationResponse,
    /// Connection status update to client
    ConnectionStatus,
    /// A quotation was created or changed
    QuotationUpdate,
    /// An invoice was created or changed
    InvoiceUpdate,
    /// Popup for the dashboard
    Notification,
    Ping,
    Pong,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::AuthenticationRequest => "authentication_request",
            MessageType::AuthenticationResponse => "authentication_response",
            MessageType::ConnectionStatus => "connection_status",
            MessageType::QuotationUpdate => "quotation_update",
            MessageType::InvoiceUpdate => "invoice_update",
            MessageType::Notification => "notification",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
        }
    }
}

/// WebSocket message structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessage<T> {
    /// Message type
    pub type_: String,
    /// Message data
    pub data: T,
    /// Timestamp when the message was created
    pub timestamp: DateTime<Utc>,
    /// Optional message ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

impl<T> WebSocketMessage<T> {
    pub fn new(type_: MessageType, data: T) -> Self {
        Self {
            type_: type_.as_str().to_string(),
            data,
            timestamp: Utc::now(),
            id: Some(Uuid::new_v4()),
        }
    }
}

/// Connection status message sent to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatusData {
    pub status: ConnectionStatus,
}

/// Connection status enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Token handshake payload
#[derive(Debug, Deserialize)]
pub struct AuthenticationRequest {
    pub token: String,
}

/// Handshake result sent back over the socket
#[derive(Debug, Serialize)]
pub struct AuthenticationResponse {
    pub authenticated: bool,
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub role: Option<Role>,
}
