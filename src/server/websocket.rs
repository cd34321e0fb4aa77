/// WebSocket handler for real-time dashboard updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::time::{interval, MissedTickBehavior};

use super::handlers::DashboardQuery;
use super::view;
use super::AppState;

/// Pushes the dashboard projection once per base tick
pub async fn ws_metrics_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_metrics_websocket(socket, state, query.disk()))
}

async fn handle_metrics_websocket(socket: WebSocket, state: AppState, disk: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    let mut ticker = interval(state.sampler.base_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = state.store.read();
                let dashboard = view::dashboard(&snapshot, &state.facts, disk.as_deref());
                match serde_json::to_string(&dashboard) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("failed to encode dashboard: {}", e),
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("metrics websocket closed");
}
