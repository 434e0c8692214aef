use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{
    RwLock,
    mpsc::{self, error::TrySendError},
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        ConnectionStatus, ConnectionStatusData, WebSocketMessage,
        invoice::Invoice,
        message::MessageType,
        notification::Notification,
        quotation::Quotation,
        user::{Action, Role},
    },
    ws::message_router::MessageRouter,
};

/// Authenticated identity of a dashboard connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: i64,
    pub role: Role,
}

struct Connection {
    sender: mpsc::Sender<Message>,
    viewer: Option<Viewer>,
}

/// WebSocket connection manager
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, id: Uuid, sender: mpsc::Sender<Message>) {
        let mut connections = self.connections.write().await;
        connections.insert(id, Connection { sender, viewer: None });
        tracing::info!("Registered connection {}", id);
    }

    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        connections.remove(id);
        tracing::info!("Unregistered connection {}", id);
    }

    /// Attach a verified identity; pushed updates are filtered by it
    pub async fn authenticate(&self, id: &Uuid, viewer: Viewer) -> Result<()> {
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(id)
            .ok_or_else(|| AppError::WebSocket(format!("Connection {} not found", id)))?;
        connection.viewer = Some(viewer);
        tracing::info!("Connection {} authenticated as user {}", id, viewer.user_id);
        Ok(())
    }

    /// Send a message to a specific connection
    pub async fn send_to(&self, connection_id: &Uuid, message: impl Serialize) -> Result<()> {
        let sender = {
            let connections = self.connections.read().await;
            let connection = connections.get(connection_id).ok_or_else(|| {
                AppError::WebSocket(format!("Connection {} not found", connection_id))
            })?;
            connection.sender.clone()
        };

        let message_json = serde_json::to_string(&message)?;
        if let Err(e) = sender.send(Message::Text(message_json.into())).await {
            tracing::error!("Failed to send message to {}: {}", connection_id, e);
            return Err(AppError::WebSocket(format!("Failed to send message: {}", e)));
        }
        Ok(())
    }

    /// Send to every authenticated connection whose viewer passes `allowed`.
    /// Pushes never wait on a client: a full queue drops the push for that
    /// client, a closed one is unregistered.
    pub async fn broadcast_where<F>(&self, message: impl Serialize, allowed: F) -> Result<usize>
    where
        F: Fn(&Viewer) -> bool,
    {
        let message_json = serde_json::to_string(&message)?;
        let recipients: Vec<(Uuid, mpsc::Sender<Message>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(_, connection)| connection.viewer.as_ref().is_some_and(|viewer| allowed(viewer)))
                .map(|(id, connection)| (*id, connection.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, sender) in recipients {
            match sender.try_send(Message::Text(message_json.clone().into())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Dropping push for {}, its queue is full", id)
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            self.unregister(&id).await;
        }

        Ok(delivered)
    }

    pub async fn broadcast_quotation_update(&self, quotation: &Quotation) -> Result<usize> {
        let message = WebSocketMessage::new(MessageType::QuotationUpdate, quotation);
        self.broadcast_where(message, |viewer| {
            quotation.visible_to(viewer.user_id, viewer.role)
        })
        .await
    }

    pub async fn broadcast_invoice_update(&self, invoice: &Invoice) -> Result<usize> {
        let message = WebSocketMessage::new(MessageType::InvoiceUpdate, invoice);
        self.broadcast_where(message, |viewer| invoice.visible_to(viewer.user_id, viewer.role))
            .await
    }

    /// Quotation removal, carried as an update with only the id and a deleted flag
    pub async fn broadcast_quotation_deletion(&self, id: i64, owner: i64) -> Result<usize> {
        let data = serde_json::json!({ "id": id, "deleted": true });
        let message = WebSocketMessage::new(MessageType::QuotationUpdate, data);
        self.broadcast_where(message, |viewer| {
            viewer.role.can(Action::ViewAllQuotations)
                || viewer.user_id == owner
        })
        .await
    }

    pub async fn push_notification(&self, notification: &Notification) -> Result<usize> {
        let message = WebSocketMessage::new(MessageType::Notification, notification);
        self.broadcast_where(message, |viewer| notification.is_for(viewer.user_id, viewer.role))
            .await
    }

    /// Send a connection status update to a specific connection
    pub async fn send_connection_status(
        &self,
        connection_id: &Uuid,
        status: ConnectionStatus,
    ) -> Result<()> {
        let status_data = ConnectionStatusData { status };
        let message = WebSocketMessage::new(MessageType::ConnectionStatus, status_data);
        self.send_to(connection_id, message).await
    }

    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }
}

/// Shared state for the connection manager
pub type SharedConnectionManager = Arc<ConnectionManager>;

/// Handle a WebSocket connection
pub async fn handle_socket(
    socket: WebSocket,
    connection_manager: SharedConnectionManager,
    router: Arc<dyn MessageRouter>,
) {
    let connection_id = Uuid::new_v4();
    tracing::info!("New websocket connection: {}", connection_id);

    let (mut sender, mut receiver) = socket.split();

    // Everything bound for this client goes through the channel
    let (tx, mut rx) = mpsc::channel::<Message>(100);
    connection_manager.register(connection_id, tx.clone()).await;

    if let Err(e) = connection_manager
        .send_connection_status(&connection_id, ConnectionStatus::Connected)
        .await
    {
        tracing::error!("Error sending connection status: {}", e);
    }

    let mut forward_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sender.send(message).await {
                tracing::error!("Error sending WebSocket message: {}", e);
                break;
            }
        }
    });

    let manager = connection_manager.clone();
    let mut receive_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    tracing::debug!("Received message: {}", text.as_str());

                    match serde_json::from_str::<WebSocketMessage<Value>>(text.as_str()) {
                        Ok(message) => {
                            if let Err(e) = router
                                .route_message(connection_id, message, manager.clone())
                                .await
                            {
                                tracing::warn!("Error routing message from {}: {}", connection_id, e);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Error parsing message: {}", e);
                        }
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::debug!("Ignoring binary message");
                }
                Ok(Message::Ping(data)) => {
                    if let Err(e) = tx.send(Message::Pong(data)).await {
                        tracing::error!("Error queueing pong: {}", e);
                    }
                }
                Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    tracing::info!("Client {} disconnected", connection_id);
                    break;
                }
                Err(e) => {
                    tracing::error!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => receive_task.abort(),
        _ = &mut receive_task => forward_task.abort(),
    }

    connection_manager.unregister(&connection_id).await;
    tracing::info!("WebSocket connection closed: {}", connection_id);
}
