use axum::{
    extract::{State, ws::WebSocketUpgrade},
    response::IntoResponse,
};

use crate::{state::AppState, ws::handle_socket};

/// Handler for WebSocket connections; authentication happens in-band
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_socket(socket, state.connection_manager, state.message_router)
    })
}
