//! Axum WebSocket adapter for the session bridge.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use console_context::ClientRegistry;
use console_core::EngineDialer;

use crate::frames::{FrameSink, FrameSource, InFrame, OutFrame};
use crate::session;

/// Shared bridge state for the WebSocket routes.
pub struct BridgeState<D> {
    /// Registry answering context lookups.
    pub registry: Arc<ClientRegistry<D>>,
}

impl<D> Clone for BridgeState<D> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Sending half of an upgraded operator connection.
pub struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: OutFrame) -> std::io::Result<()> {
        let message = match frame {
            OutFrame::Binary(data) => Message::Binary(data.into()),
            OutFrame::Text(text) => Message::Text(text.into()),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

/// Receiving half of an upgraded operator connection.
pub struct WsSource(SplitStream<WebSocket>);

#[async_trait]
impl FrameSource for WsSource {
    async fn next(&mut self) -> Option<InFrame> {
        match self.0.next().await {
            Some(Ok(Message::Text(text))) => Some(InFrame::Text(text.to_string())),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => None,
            Some(Ok(_)) => Some(InFrame::Other),
        }
    }
}

/// Shell-exec upgrade handler.
///
/// Use this as an axum route handler with `{context}` and `{container}`
/// path parameters.
pub async fn exec_handler<D>(
    ws: WebSocketUpgrade,
    Path((context, container)): Path<(String, String)>,
    State(state): State<BridgeState<D>>,
) -> impl IntoResponse
where
    D: EngineDialer + 'static,
{
    ws.on_upgrade(move |socket| async move {
        let (sink, source) = socket.split();
        session::run_session(
            &state.registry,
            &context,
            &container,
            WsSink(sink),
            WsSource(source),
        )
        .await;
    })
}

/// Router exposing the interactive shell endpoint.
#[must_use]
pub fn router<D>(registry: Arc<ClientRegistry<D>>) -> Router
where
    D: EngineDialer + 'static,
{
    Router::new()
        .route(
            "/api/contexts/{context}/containers/{container}/exec",
            get(exec_handler::<D>),
        )
        .with_state(BridgeState { registry })
}
