// Execute-query client

use crate::api::backend::{Backend, BackendError};
use crate::models::responses::ExecuteQueryResponse;
use log::{error, info};

pub const EXECUTE_FAILED: &str = "Failed to execute query. Please try again.";

/// Run `sql` on the backend and render the outcome as an assistant message body.
pub async fn execute(backend: &dyn Backend, sql: &str) -> Result<String, String> {
    info!(
        "[PHASE: chat] [STEP: execute] Running selected block ({} lines)",
        sql.lines().count()
    );
    match backend.execute_query(sql).await {
        Ok(resp) => render_results(resp),
        Err(BackendError::Status { status, envelope }) => {
            error!("[PHASE: chat] [STEP: execute] HTTP {}", status);
            Err(envelope
                .and_then(|env| env.detail_text())
                .unwrap_or_else(|| format!("HTTP error! status: {}", status)))
        }
        Err(e) => {
            error!("[PHASE: chat] [STEP: execute] {}", e);
            Err(EXECUTE_FAILED.to_string())
        }
    }
}

/// A backend-reported `error` wins over `results`.
pub fn render_results(resp: ExecuteQueryResponse) -> Result<String, String> {
    if let Some(err) = resp.error.filter(|e| !e.trim().is_empty()) {
        return Err(err);
    }

    let body = resp.results.trim_end_matches(['\n', '\r']);
    let fence = fence_for(body);
    Ok(format!("Query results:\n\n{}text\n{}\n{}", fence, body, fence))
}

// One backtick longer than the longest run inside the body, minimum three.
fn fence_for(body: &str) -> String {
    let mut longest = 0usize;
    let mut run = 0usize;
    for c in body.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}
