// Chat query streaming

use crate::api::backend::{Backend, BackendError};
use crate::models::responses::StreamEvent;
use crate::models::state::ChatTicket;
use crate::stream::StreamDecoder;
use futures::StreamExt;
use log::{error, info};

/// Shown when the chat request could not be sent or its body could not be read.
pub const SEND_FAILED: &str = "Failed to send message. Please try again.";

/// User-facing text for a failed chat request.
pub fn chat_error_message(err: &BackendError) -> String {
    match err {
        BackendError::Status { status, envelope } => envelope
            .as_ref()
            .and_then(|env| env.detail_text())
            .unwrap_or_else(|| format!("HTTP error! status: {}", status)),
        BackendError::Network(_) | BackendError::Decode(_) => SEND_FAILED.to_string(),
    }
}

/// Send one chat query and hand every decoded event to `on_event` as its bytes arrive.
///
/// Events decoded before a mid-body read failure are still delivered.
pub async fn stream_chat<F>(
    backend: &dyn Backend,
    ticket: &ChatTicket,
    mut on_event: F,
) -> Result<(), String>
where
    F: FnMut(StreamEvent),
{
    let id = ticket.correlation_id;
    let mut body = backend
        .generate_query(&ticket.query, id)
        .await
        .map_err(|e| {
            error!(
                "[PHASE: chat] [STEP: request] correlation_id={} failed: {}",
                id, e
            );
            chat_error_message(&e)
        })?;

    let mut decoder = StreamDecoder::new();
    let mut delivered = 0usize;

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for ev in decoder.push(&bytes) {
                    delivered += 1;
                    on_event(ev);
                }
            }
            Err(e) => {
                error!(
                    "[PHASE: chat] [STEP: stream] correlation_id={} body read failed after {} events: {}",
                    id, delivered, e
                );
                for ev in decoder.finish() {
                    on_event(ev);
                }
                return Err(SEND_FAILED.to_string());
            }
        }
    }

    for ev in decoder.finish() {
        delivered += 1;
        on_event(ev);
    }

    info!(
        "[PHASE: chat] [STEP: complete] correlation_id={} events={} skipped={}",
        id,
        delivered,
        decoder.skipped()
    );
    Ok(())
}
