// Connection client
//
// Turns backend outcomes into what the wizard shows: a ConnectedTarget or loaded
// flag on success, a user-facing error string otherwise. Internal details go to the
// log only.

use crate::api::backend::{Backend, BackendError};
use crate::models::requests::ConnectionParams;
use crate::models::responses::CONNECT_SUCCESS_MESSAGE;
use crate::models::state::{Artifact, ConnectedTarget, DataSource};
use chrono::Utc;
use log::{error, info, warn};

/// Shown when the backend rejects the connection without saying why.
pub const CONNECT_FAILED: &str = "Connection failed";

/// Shown when the backend could not be reached or answered with something unreadable.
pub const CONNECT_UNREACHABLE: &str =
    "Failed to connect to database. Please check your credentials.";

/// Test a connection. Success requires a 2xx whose `message` is exactly the
/// backend's success literal.
pub async fn connect(
    backend: &dyn Backend,
    source: DataSource,
    params: &ConnectionParams,
) -> Result<ConnectedTarget, String> {
    info!(
        "[PHASE: wizard] [STEP: connect] Connecting to {} with {:?}",
        source.label(),
        params
    );

    match backend.connect(params).await {
        Ok(envelope) if envelope.message_text() == Some(CONNECT_SUCCESS_MESSAGE) => {
            Ok(ConnectedTarget {
                source,
                database: params.dbname.clone(),
                host: params.host.clone(),
                connected_at: Utc::now(),
            })
        }
        Ok(envelope) => {
            let shown = envelope.message_text().unwrap_or(CONNECT_FAILED).to_string();
            warn!(
                "[PHASE: wizard] [STEP: connect] Backend declined connection: {}",
                shown
            );
            Err(shown)
        }
        Err(BackendError::Status {
            status,
            envelope: Some(envelope),
        }) => {
            if let Some(detail) = envelope.detail_text() {
                warn!(
                    "[PHASE: wizard] [STEP: connect] HTTP {} detail: {}",
                    status, detail
                );
            }
            Err(envelope.message_text().unwrap_or(CONNECT_FAILED).to_string())
        }
        Err(e) => {
            error!("[PHASE: wizard] [STEP: connect] Connection request failed: {}", e);
            Err(CONNECT_UNREACHABLE.to_string())
        }
    }
}

/// Prepare one artifact; any 2xx is success, anything else maps to the artifact's
/// fixed failure message.
pub async fn prepare_artifact(backend: &dyn Backend, artifact: Artifact) -> Result<(), String> {
    info!(
        "[PHASE: artifacts] [STEP: {}] Starting",
        artifact.label().to_ascii_lowercase()
    );
    backend.prepare(artifact).await.map_err(|e| {
        error!(
            "[PHASE: artifacts] [STEP: {}] Failed: {}",
            artifact.label().to_ascii_lowercase(),
            e
        );
        artifact.failure_message().to_string()
    })
}

/// Run `pending` in order, reporting each result through `on_result`, and stop at the
/// first failure. Returns the artifacts that were never attempted.
pub async fn prepare_all<F>(
    backend: &dyn Backend,
    pending: &[Artifact],
    mut on_result: F,
) -> Vec<Artifact>
where
    F: FnMut(Artifact, Result<(), String>),
{
    for (i, artifact) in pending.iter().enumerate() {
        let result = prepare_artifact(backend, *artifact).await;
        let failed = result.is_err();
        on_result(*artifact, result);
        if failed {
            let unreached = pending[i + 1..].to_vec();
            if !unreached.is_empty() {
                warn!(
                    "[PHASE: artifacts] [STEP: pipeline] Stopped after {} failed; skipped {:?}",
                    artifact.label(),
                    unreached
                );
            }
            return unreached;
        }
    }
    Vec::new()
}


#[cfg(test)]
mod tests {
    use super::stubs::{envelope, StubBackend};
    use super::*;
    use crate::models::responses::MessageEnvelope;
    use std::sync::atomic::Ordering;

    fn params() -> ConnectionParams {
        ConnectionParams {
            dbname: "sales".to_string(),
            user: "analyst".to_string(),
            password: "hunter22".to_string(),
            host: "db.local".to_string(),
            port: "5432".to_string(),
        }
    }

    #[tokio::test]
    async fn exact_success_message_connects() {
        let backend = StubBackend::new();
        let target = connect(&backend, DataSource::PostgreSql, &params())
            .await
            .unwrap();
        assert_eq!(target.database, "sales");
        assert_eq!(target.host, "db.local");
        assert_eq!(backend.connect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_2xx_message_is_shown_verbatim() {
        let backend =
            StubBackend::new().with_connect(Ok(envelope("Database connection to MySQL successful")));
        let err = connect(&backend, DataSource::PostgreSql, &params())
            .await
            .unwrap_err();
        assert_eq!(err, "Database connection to MySQL successful");
    }

    #[tokio::test]
    async fn missing_message_falls_back_to_generic() {
        let backend = StubBackend::new().with_connect(Ok(MessageEnvelope::default()));
        let err = connect(&backend, DataSource::PostgreSql, &params())
            .await
            .unwrap_err();
        assert_eq!(err, CONNECT_FAILED);
    }

    #[tokio::test]
    async fn non_2xx_shows_body_message_or_generic() {
        let backend = StubBackend::new().with_connect(Err(BackendError::Status {
            status: 400,
            envelope: Some(envelope("password authentication failed")),
        }));
        let err = connect(&backend, DataSource::PostgreSql, &params())
            .await
            .unwrap_err();
        assert_eq!(err, "password authentication failed");

        let backend = StubBackend::new().with_connect(Err(BackendError::Status {
            status: 422,
            envelope: Some(MessageEnvelope {
                message: None,
                detail: Some(serde_json::json!("field required")),
            }),
        }));
        let err = connect(&backend, DataSource::PostgreSql, &params())
            .await
            .unwrap_err();
        assert_eq!(err, CONNECT_FAILED);
    }

    #[tokio::test]
    async fn network_and_decode_failures_show_credentials_hint() {
        for failure in [
            BackendError::Network("refused".to_string()),
            BackendError::Decode("expected value".to_string()),
            BackendError::Status {
                status: 502,
                envelope: None,
            },
        ] {
            let backend = StubBackend::new().with_connect(Err(failure));
            let err = connect(&backend, DataSource::PostgreSql, &params())
                .await
                .unwrap_err();
            assert_eq!(err, CONNECT_UNREACHABLE);
        }
    }

    #[tokio::test]
    async fn artifact_failures_use_fixed_messages() {
        let backend = StubBackend::new().failing(Artifact::Metadata);
        assert!(prepare_artifact(&backend, Artifact::Schema).await.is_ok());
        assert_eq!(
            prepare_artifact(&backend, Artifact::Metadata).await.unwrap_err(),
            "Failed to load metadata. Please try again."
        );
    }

    #[tokio::test]
    async fn pipeline_runs_in_order_and_stops_at_first_failure() {
        let backend = StubBackend::new().failing(Artifact::Metadata);
        let mut seen = Vec::new();
        let unreached = prepare_all(&backend, &Artifact::PIPELINE, |a, r| {
            seen.push((a, r.is_ok()))
        })
        .await;

        assert_eq!(
            seen,
            vec![(Artifact::Schema, true), (Artifact::Metadata, false)]
        );
        assert_eq!(unreached, vec![Artifact::VectorIndex]);
        assert_eq!(backend.prepared(), vec![Artifact::Schema, Artifact::Metadata]);
    }

    #[tokio::test]
    async fn pipeline_with_everything_pending_succeeds() {
        let backend = StubBackend::new();
        let mut ok = 0;
        let unreached = prepare_all(&backend, &Artifact::PIPELINE, |_, r| {
            if r.is_ok() {
                ok += 1;
            }
        })
        .await;
        assert!(unreached.is_empty());
        assert_eq!(ok, 3);
    }
}
