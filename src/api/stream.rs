//! WebSocket media-stream transport
//!
//! One socket per call. Binary frames are caller audio and only buffered;
//! recognized speech arrives as `{"type":"utterance","text":...}` text
//! frames. Closing the socket ends the call.

use super::audio::AudioBuffer;
use super::types::{ClientFrame, ServerFrame, WebhookParams};
use super::AppState;
use crate::instruction::Instruction;
use crate::state_machine::Event;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

pub async fn stream_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let call_id = WebhookParams::new(query).inbound().resolve_call_id();
    ws.on_upgrade(move |socket| handle_socket(socket, state, call_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, call_id: String) {
    let (ws_tx, ws_rx) = socket.split();
    run_stream(ws_tx, ws_rx, state, call_id).await;
}

/// Drive one call over a frame source and sink until either side ends it.
///
/// Utterances are admitted in arrival order: the next frame is read only
/// once the previous utterance holds the reply slot or was turned away.
/// Returns the audio buffer as it stood when the call ended.
async fn run_stream<S, R, E>(
    sink: S,
    mut source: R,
    state: AppState,
    call_id: String,
) -> AudioBuffer
where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        let mut sink = sink;
        while let Some(message) = out_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    tracing::info!(call_id = %call_id, "Stream connected");
    dispatch(&state, &call_id, Event::CallStarted, &out_tx).await;

    let mut audio = AudioBuffer::new(state.audio_buffer_bytes);

    while let Some(result) = source.next().await {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(call_id = %call_id, error = %err, "Stream receive error");
                break;
            }
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Utterance { text }) => {
                    audio.clear();
                    // The reply runs on its own task so a later utterance can
                    // still be answered with the wait prompt
                    let (admitted_tx, admitted_rx) = oneshot::channel();
                    let state = state.clone();
                    let call_id = call_id.clone();
                    let out_tx = out_tx.clone();
                    tokio::spawn(async move {
                        let instruction = state
                            .controller
                            .handle_in_order(&call_id, Event::Utterance { text }, admitted_tx)
                            .await;
                        send_instruction(instruction, &out_tx);
                    });
                    // Resolves on admission, or when the task finishes without one
                    let _ = admitted_rx.await;
                }
                Ok(ClientFrame::Hangup) => break,
                Err(err) => {
                    send_frame(
                        &out_tx,
                        &ServerFrame::Error {
                            message: format!("Invalid frame: {err}"),
                        },
                    );
                }
            },
            Message::Binary(data) => audio.push(data),
            Message::Close(_) => break,
            Message::Ping(payload) => {
                let _ = out_tx.send(Message::Pong(payload));
            }
            Message::Pong(_) => {}
        }
    }

    state.controller.handle(&call_id, Event::Hangup).await;
    tracing::info!(
        call_id = %call_id,
        buffered_bytes = audio.len_bytes(),
        dropped_bytes = audio.dropped_bytes(),
        "Stream closed"
    );

    // Replies still in flight finish on their own; the socket is gone
    drop(out_tx);
    writer.abort();
    audio
}

/// Run one event and write the resulting instruction as frames
async fn dispatch(
    state: &AppState,
    call_id: &str,
    event: Event,
    out_tx: &mpsc::UnboundedSender<Message>,
) {
    let instruction = state.controller.handle(call_id, event).await;
    send_instruction(instruction, out_tx);
}

/// Write an instruction as a `say` frame, followed by `hangup` when it ends the call
fn send_instruction(instruction: Option<Instruction>, out_tx: &mpsc::UnboundedSender<Message>) {
    let Some(instruction) = instruction else {
        return;
    };
    let ends_call = instruction.ends_call();
    send_frame(
        out_tx,
        &ServerFrame::Say {
            text: instruction.text,
        },
    );
    if ends_call {
        send_frame(out_tx, &ServerFrame::Hangup);
    }
}

fn send_frame(out_tx: &mpsc::UnboundedSender<Message>, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(text) => out_tx.send(Message::Text(text)).is_ok(),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to serialize stream frame");
            false
        }
    }
}
