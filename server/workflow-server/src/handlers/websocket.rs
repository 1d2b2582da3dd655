//! Per-patient WebSocket delivery of workflow change events.
//!
//! A connecting client is registered as one observer of the patient's
//! workflow; every committed transition arrives as one JSON-encoded
//! event frame. The observer slot is released when the socket closes or
//! when the notifier disconnects a client that stopped draining its
//! buffer.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::server::WorkflowServer;

/// Handle WebSocket upgrade for a patient's workflow event stream
pub async fn workflow_ws(
    ws: WebSocketUpgrade,
    Path(patient_id): Path<Uuid>,
    State(server): State<WorkflowServer>,
) -> Response {
    ws.on_upgrade(move |socket| stream_workflow_events(socket, patient_id, server))
}

async fn stream_workflow_events(socket: WebSocket, patient_id: Uuid, server: WorkflowServer) {
    let mut subscription = server.engine.subscribe(patient_id);
    let (mut sender, mut receiver) = socket.split();

    info!(%patient_id, "workflow subscriber connected");

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(%patient_id, "failed to encode workflow event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                // Disconnected by the notifier (buffer overflow) or the
                // notifier itself is gone; the client re-reads and
                // reconnects.
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sender.send(Message::Pong(payload)).await;
                }
                Some(Ok(_)) => {
                    // The stream is one-way; client frames are ignored.
                }
                Some(Err(e)) => {
                    debug!(%patient_id, "websocket error: {}", e);
                    break;
                }
            },
        }
    }

    info!(%patient_id, "workflow subscriber disconnected");
    // Dropping the subscription releases the observer slot.
}
