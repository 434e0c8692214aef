use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    db::UserStore,
    error::{AppError, Result},
    models::{
        WebSocketMessage,
        message::{AuthenticationRequest, AuthenticationResponse, MessageType},
        user::User,
    },
    services::AuthService,
    ws::connection::{SharedConnectionManager, Viewer},
};

/// Message router trait for handling websocket messages
#[async_trait]
pub trait MessageRouter: Send + Sync {
    async fn route_message(
        &self,
        connection_id: Uuid,
        message: WebSocketMessage<Value>,
        connection_manager: SharedConnectionManager,
    ) -> Result<()>;
}

/// Routes dashboard messages: token handshake and keep-alive
pub struct DefaultMessageRouter {
    user_store: UserStore,
    auth: AuthService,
}

impl DefaultMessageRouter {
    pub fn new(user_store: UserStore, auth: AuthService) -> Self {
        Self { user_store, auth }
    }

    async fn resolve_user(&self, data: Value) -> Result<User> {
        let request: AuthenticationRequest = serde_json::from_value(data)
            .map_err(|e| AppError::BadRequest(format!("Invalid authentication request: {}", e)))?;

        let claims = self.auth.verify_token(&request.token)?;
        let user = self.user_store.get_user_by_id(claims.sub).await?;
        if !user.is_active() {
            return Err(AppError::Auth("Account is inactive".to_string()));
        }
        Ok(user)
    }

    async fn handle_auth_request(
        &self,
        connection_id: Uuid,
        data: Value,
        connection_manager: SharedConnectionManager,
    ) -> Result<()> {
        let response = match self.resolve_user(data).await {
            Ok(user) => {
                connection_manager
                    .authenticate(
                        &connection_id,
                        Viewer {
                            user_id: user.id,
                            role: user.role,
                        },
                    )
                    .await?;
                AuthenticationResponse {
                    authenticated: true,
                    user_id: Some(user.id),
                    name: Some(user.name),
                    role: Some(user.role),
                }
            }
            Err(e) => {
                tracing::info!("WebSocket authentication failed for {}: {}", connection_id, e);
                AuthenticationResponse {
                    authenticated: false,
                    user_id: None,
                    name: None,
                    role: None,
                }
            }
        };

        let message = WebSocketMessage::new(MessageType::AuthenticationResponse, response);
        connection_manager.send_to(&connection_id, message).await
    }

    async fn handle_ping(
        &self,
        connection_id: Uuid,
        connection_manager: SharedConnectionManager,
    ) -> Result<()> {
        let message = WebSocketMessage::new(MessageType::Pong, Value::Null);
        connection_manager.send_to(&connection_id, message).await
    }
}

#[async_trait]
impl MessageRouter for DefaultMessageRouter {
    async fn route_message(
        &self,
        connection_id: Uuid,
        message: WebSocketMessage<Value>,
        connection_manager: SharedConnectionManager,
    ) -> Result<()> {
        match message.type_.as_str() {
            "authentication_request" => {
                self.handle_auth_request(connection_id, message.data, connection_manager)
                    .await
            }
            "ping" => self.handle_ping(connection_id, connection_manager).await,
            _ => {
                tracing::warn!("Unknown message type: {}", message.type_);
                Ok(())
            }
        }
    }
}
