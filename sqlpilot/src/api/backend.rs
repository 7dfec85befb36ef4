// Backend HTTP seam
//
// Backend trait for deterministic testing of every UI path without a live server.
// Production code uses HttpBackend; tests use hand-written stubs.

use crate::models::requests::{ConnectionParams, ExecuteQueryRequest};
use crate::models::responses::{ExecuteQueryResponse, MessageEnvelope};
use crate::models::state::Artifact;
use crate::utils::logging::mask_url_secrets;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

pub const CONNECT_PATH: &str = "connect-postgres/";
pub const LOAD_SCHEMA_PATH: &str = "load-schema/";
pub const LOAD_METADATA_PATH: &str = "load-metadata/";
pub const CREATE_VECTOR_STORE_PATH: &str = "create-vector-store";
pub const GENERATE_QUERY_PATH: &str = "generate-query/";
pub const EXECUTE_QUERY_PATH: &str = "execute-query/";

/// Endpoint that prepares `artifact` on the backend.
pub fn artifact_path(artifact: Artifact) -> &'static str {
    match artifact {
        Artifact::Schema => LOAD_SCHEMA_PATH,
        Artifact::Metadata => LOAD_METADATA_PATH,
        Artifact::VectorIndex => CREATE_VECTOR_STORE_PATH,
    }
}

/// Why a backend call did not produce the expected response.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request could not be sent, or the body could not be read.
    #[error("request failed: {0}")]
    Network(String),
    /// Non-2xx. `envelope` is present when the body was JSON.
    #[error("HTTP error! status: {status}")]
    Status {
        status: u16,
        envelope: Option<MessageEnvelope>,
    },
    /// 2xx, but the body is not what the endpoint promises.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl BackendError {
    /// The request URL is dropped: connect carries credentials in its query string.
    fn network(e: reqwest::Error) -> Self {
        BackendError::Network(e.without_url().to_string())
    }
}

/// Body chunks of a streaming response, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, BackendError>>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /connect-postgres/`. Returns the decoded 2xx body; the caller decides
    /// whether its message means success.
    async fn connect(&self, params: &ConnectionParams) -> Result<MessageEnvelope, BackendError>;

    /// One of `load-schema/`, `load-metadata/`, `create-vector-store`. Any 2xx is success.
    async fn prepare(&self, artifact: Artifact) -> Result<(), BackendError>;

    /// `POST /generate-query/?query_text=...`. Resolves once the status line is in; the
    /// body then arrives through the returned stream.
    async fn generate_query(
        &self,
        query_text: &str,
        correlation_id: Uuid,
    ) -> Result<ByteStream, BackendError>;

    /// `POST /execute-query/`.
    async fn execute_query(&self, sql: &str) -> Result<ExecuteQueryResponse, BackendError>;
}

/// Production backend over reqwest.
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    /// `base` must end with `/` so relative endpoint paths join beneath it
    /// (see `validate_backend_url`).
    pub fn new(base: Url) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // No timeout: a hung request leaves its operation in flight.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|e| BackendError::Network(format!("invalid endpoint '{}': {}", path, e)))
    }

    async fn post_empty(&self, url: Url) -> Result<reqwest::Response, BackendError> {
        debug!(
            "[PHASE: backend] [STEP: request] POST {}",
            mask_url_secrets(url.as_str())
        );
        self.client
            .post(url)
            .send()
            .await
            .map_err(BackendError::network)
    }
}

/// Read a non-2xx response into `BackendError::Status`, keeping the JSON envelope
/// when there is one.
async fn status_error(resp: reqwest::Response) -> BackendError {
    let status = resp.status().as_u16();
    let envelope = match resp.bytes().await {
        Ok(body) => serde_json::from_slice::<MessageEnvelope>(&body).ok(),
        Err(e) => {
            warn!(
                "[PHASE: backend] [STEP: response] Could not read error body (status {}): {}",
                status,
                e.without_url()
            );
            None
        }
    };
    BackendError::Status { status, envelope }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn connect(&self, params: &ConnectionParams) -> Result<MessageEnvelope, BackendError> {
        let mut url = self.endpoint(CONNECT_PATH)?;
        url.query_pairs_mut().extend_pairs(params.query_pairs());
        info!(
            "[PHASE: backend] [STEP: connect] Testing connection to {}:{} db={} user={}",
            params.host, params.port, params.dbname, params.user
        );

        let resp = self.post_empty(url).await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let body = resp.bytes().await.map_err(BackendError::network)?;
        serde_json::from_slice::<MessageEnvelope>(&body)
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn prepare(&self, artifact: Artifact) -> Result<(), BackendError> {
        let url = self.endpoint(artifact_path(artifact))?;
        let resp = self.post_empty(url).await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        info!(
            "[PHASE: backend] [STEP: prepare] {} ready (status {})",
            artifact.label(),
            resp.status().as_u16()
        );
        Ok(())
    }

    async fn generate_query(
        &self,
        query_text: &str,
        correlation_id: Uuid,
    ) -> Result<ByteStream, BackendError> {
        let mut url = self.endpoint(GENERATE_QUERY_PATH)?;
        url.query_pairs_mut().append_pair("query_text", query_text);
        info!(
            "[PHASE: chat] [STEP: request] correlation_id={} chars={}",
            correlation_id,
            query_text.chars().count()
        );

        let resp = self.post_empty(url).await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(BackendError::network));
        Ok(stream.boxed())
    }

    async fn execute_query(&self, sql: &str) -> Result<ExecuteQueryResponse, BackendError> {
        let url = self.endpoint(EXECUTE_QUERY_PATH)?;
        debug!(
            "[PHASE: backend] [STEP: execute] POST {} ({} chars of SQL)",
            url,
            sql.len()
        );
        let resp = self
            .client
            .post(url)
            .json(&ExecuteQueryRequest {
                sql_query: sql.to_string(),
            })
            .send()
            .await
            .map_err(BackendError::network)?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let body = resp.bytes().await.map_err(BackendError::network)?;
        serde_json::from_slice::<ExecuteQueryResponse>(&body)
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::serve_once;
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams {
            dbname: "sales db".to_string(),
            user: "analyst".to_string(),
            password: "p&ss=word".to_string(),
            host: "db.local".to_string(),
            port: "5432".to_string(),
        }
    }

    #[test]
    fn artifact_paths_match_backend_routes() {
        assert_eq!(artifact_path(Artifact::Schema), "load-schema/");
        assert_eq!(artifact_path(Artifact::Metadata), "load-metadata/");
        assert_eq!(artifact_path(Artifact::VectorIndex), "create-vector-store");
    }

    #[tokio::test]
    async fn connect_posts_urlencoded_params_with_accept_header() {
        let (base, server) =
            serve_once(200, r#"{"message":"Database connection to Postgres successful"}"#).await;
        let backend = HttpBackend::new(base).unwrap();

        let env = backend.connect(&params()).await.unwrap();
        assert_eq!(
            env.message_text(),
            Some("Database connection to Postgres successful")
        );

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("POST /connect-postgres/?"), "{}", request_line);
        assert!(request_line.contains("dbname=sales+db"), "{}", request_line);
        assert!(request_line.contains("password=p%26ss%3Dword"), "{}", request_line);
        assert!(
            request.to_ascii_lowercase().contains("accept: application/json"),
            "{}",
            request
        );
    }

    #[tokio::test]
    async fn non_2xx_keeps_json_envelope() {
        let (base, _server) = serve_once(400, r#"{"message":"password authentication failed"}"#).await;
        let backend = HttpBackend::new(base).unwrap();

        match backend.connect(&params()).await {
            Err(BackendError::Status { status, envelope }) => {
                assert_eq!(status, 400);
                assert_eq!(
                    envelope.unwrap().message_text(),
                    Some("password authentication failed")
                );
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_json_success_body_is_a_decode_error() {
        let (base, _server) = serve_once(200, "<html>ok</html>").await;
        let backend = HttpBackend::new(base).unwrap();

        assert!(matches!(
            backend.connect(&params()).await,
            Err(BackendError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn prepare_posts_to_artifact_endpoint() {
        let (base, server) = serve_once(200, r#"{"message":"Schema loaded"}"#).await;
        let backend = HttpBackend::new(base).unwrap();

        backend.prepare(Artifact::VectorIndex).await.unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /create-vector-store HTTP/1.1"), "{}", request);
    }

    #[tokio::test]
    async fn prepare_failure_reports_status() {
        let (base, _server) = serve_once(500, r#"{"detail":"Schema must be loaded first"}"#).await;
        let backend = HttpBackend::new(base).unwrap();

        let err = backend.prepare(Artifact::VectorIndex).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn generate_query_streams_body() {
        let (base, server) = serve_once(
            200,
            r#"{"event":"status","data":"A"}{"event":"sql_query","data":"B"}"#,
        )
        .await;
        let backend = HttpBackend::new(base).unwrap();

        let mut stream = backend
            .generate_query("top 5 customers?", Uuid::new_v4())
            .await
            .unwrap();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend(chunk.unwrap());
        }
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"event":"status","data":"A"}{"event":"sql_query","data":"B"}"#
        );

        let request = server.await.unwrap();
        assert!(
            request.starts_with("POST /generate-query/?query_text=top+5+customers%3F HTTP/1.1"),
            "{}",
            request
        );
    }

    #[tokio::test]
    async fn execute_query_sends_json_body() {
        let (base, server) = serve_once(200, r#"{"results":"n\n-\n3","error":null}"#).await;
        let backend = HttpBackend::new(base).unwrap();

        let resp = backend.execute_query("SELECT count(*) AS n FROM t").await.unwrap();
        assert_eq!(resp.results, "n\n-\n3");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /execute-query/ HTTP/1.1"), "{}", request);
        assert!(
            request.ends_with(r#"{"sql_query":"SELECT count(*) AS n FROM t"}"#),
            "{}",
            request
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend =
            HttpBackend::new(Url::parse(&format!("http://{}/", addr)).unwrap()).unwrap();
        assert!(matches!(
            backend.prepare(Artifact::Schema).await,
            Err(BackendError::Network(_))
        ));
    }

    #[tokio::test]
    async fn transport_errors_do_not_carry_credentials() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend =
            HttpBackend::new(Url::parse(&format!("http://{}/", addr)).unwrap()).unwrap();
        let mut p = params();
        p.password = "HUNTER2SECRET".to_string();

        let err = backend.connect(&p).await.unwrap_err();
        assert!(matches!(err, BackendError::Network(_)));
        let shown = err.to_string();
        assert!(!shown.contains("HUNTER2SECRET"), "{}", shown);
        assert!(!format!("{:?}", err).contains("HUNTER2SECRET"));
        assert!(!shown.contains(CONNECT_PATH), "{}", shown);
    }
}
