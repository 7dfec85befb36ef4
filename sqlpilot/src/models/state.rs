// Application state (in-memory)
//
// The wizard step is a tagged union so "chatting without a connection" cannot be
// expressed; the async operations live in a separate status map because several of them
// may be in flight at once.

use crate::models::message::Transcript;
use crate::models::responses::StreamEvent;
use crate::stream::ChatTurn;
use crate::utils::validation::normalize_chat_input;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    PostgreSql,
    Databricks,
    Redshift,
    Snowflake,
    MySql,
    BigQuery,
    Rds,
}

impl DataSource {
    pub const ALL: [DataSource; 7] = [
        DataSource::PostgreSql,
        DataSource::Databricks,
        DataSource::Redshift,
        DataSource::Snowflake,
        DataSource::MySql,
        DataSource::BigQuery,
        DataSource::Rds,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DataSource::PostgreSql => "PostgreSQL",
            DataSource::Databricks => "Databricks",
            DataSource::Redshift => "Redshift",
            DataSource::Snowflake => "Snowflake",
            DataSource::MySql => "MySQL",
            DataSource::BigQuery => "BigQuery",
            DataSource::Rds => "RDS",
        }
    }

    /// Only PostgreSQL has a client flow today.
    pub fn is_supported(&self) -> bool {
        matches!(self, DataSource::PostgreSql)
    }
}

/// What we know about a live backend connection. Credentials are not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedTarget {
    pub source: DataSource,
    pub database: String,
    pub host: String,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStep {
    SelectSource,
    Connect { source: DataSource },
    LoadArtifacts { target: ConnectedTarget },
    Chat { target: ConnectedTarget },
}

impl WizardStep {
    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::SelectSource => "Connect a data source",
            WizardStep::Connect { .. } => "Connect",
            WizardStep::LoadArtifacts { .. } => "Load Schema and Metadata",
            WizardStep::Chat { .. } => "Chat",
        }
    }

    pub fn target(&self) -> Option<&ConnectedTarget> {
        match self {
            WizardStep::LoadArtifacts { target } | WizardStep::Chat { target } => Some(target),
            _ => None,
        }
    }
}

/// Backend preparation artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Schema,
    Metadata,
    VectorIndex,
}

impl Artifact {
    /// Order the backend needs them in.
    pub const PIPELINE: [Artifact; 3] = [Artifact::Schema, Artifact::Metadata, Artifact::VectorIndex];

    pub fn label(&self) -> &'static str {
        match self {
            Artifact::Schema => "Schema",
            Artifact::Metadata => "Metadata",
            Artifact::VectorIndex => "Vector",
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Artifact::Schema => Operation::LoadSchema,
            Artifact::Metadata => Operation::LoadMetadata,
            Artifact::VectorIndex => Operation::CreateVectorIndex,
        }
    }

    /// Fixed user-facing failure text.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Artifact::Schema => "Failed to load schema. Please try again.",
            Artifact::Metadata => "Failed to load metadata. Please try again.",
            Artifact::VectorIndex => "Failed to create vector index. Please try again.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    LoadSchema,
    LoadMetadata,
    CreateVectorIndex,
    Chat,
    ExecuteQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationStatus {
    #[default]
    Idle,
    InFlight,
    Succeeded,
    Failed,
}

/// Per-operation status. Only same-operation submissions exclude each other.
#[derive(Debug, Clone, Default)]
pub struct Operations {
    statuses: HashMap<Operation, OperationStatus>,
}

impl Operations {
    pub fn status(&self, op: Operation) -> OperationStatus {
        self.statuses.get(&op).copied().unwrap_or_default()
    }

    pub fn is_in_flight(&self, op: Operation) -> bool {
        self.status(op) == OperationStatus::InFlight
    }

    /// Mark `op` in flight. Returns false (and changes nothing) if it already is.
    pub fn try_begin(&mut self, op: Operation) -> bool {
        if self.is_in_flight(op) {
            return false;
        }
        self.statuses.insert(op, OperationStatus::InFlight);
        true
    }

    pub fn finish(&mut self, op: Operation, success: bool) {
        let status = if success {
            OperationStatus::Succeeded
        } else {
            OperationStatus::Failed
        };
        self.statuses.insert(op, status);
    }

    /// Drop a claimed-but-never-started operation back to idle.
    pub fn release(&mut self, op: Operation) {
        if self.is_in_flight(op) {
            self.statuses.insert(op, OperationStatus::Idle);
        }
    }
}

/// Independent "loaded" flags; set on success only, never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadedFlags {
    pub schema: bool,
    pub metadata: bool,
    pub vector: bool,
}

impl LoadedFlags {
    pub fn is_loaded(&self, artifact: Artifact) -> bool {
        match artifact {
            Artifact::Schema => self.schema,
            Artifact::Metadata => self.metadata,
            Artifact::VectorIndex => self.vector,
        }
    }

    pub fn mark(&mut self, artifact: Artifact) {
        match artifact {
            Artifact::Schema => self.schema = true,
            Artifact::Metadata => self.metadata = true,
            Artifact::VectorIndex => self.vector = true,
        }
    }
}

/// A chat request that was accepted and must now be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTicket {
    pub query: String,
    pub correlation_id: uuid::Uuid,
}

/// Everything the UI shows, owned by the UI thread.
#[derive(Debug, Clone)]
pub struct AppState {
    pub step: WizardStep,
    pub operations: Operations,
    pub loaded: LoadedFlags,
    pub transcript: Transcript,
    pub turn: Option<ChatTurn>,
    pub error: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            step: WizardStep::SelectSource,
            operations: Operations::default(),
            loaded: LoadedFlags::default(),
            transcript: Transcript::new(),
            turn: None,
            error: None,
        }
    }

    // ---------------------------------------------------------------------
    // Wizard navigation
    // ---------------------------------------------------------------------

    pub fn select_source(&mut self, source: DataSource) -> bool {
        if !matches!(self.step, WizardStep::SelectSource) || !source.is_supported() {
            return false;
        }
        self.error = None;
        self.step = WizardStep::Connect { source };
        true
    }

    /// Connect → back to source selection (nothing else goes back).
    pub fn back(&mut self) -> bool {
        if matches!(self.step, WizardStep::Connect { .. }) && !self.operations.is_in_flight(Operation::Connect) {
            self.error = None;
            self.step = WizardStep::SelectSource;
            return true;
        }
        false
    }

    pub fn continue_to_chat(&mut self) -> bool {
        match &self.step {
            WizardStep::LoadArtifacts { target } => {
                self.step = WizardStep::Chat {
                    target: target.clone(),
                };
                true
            }
            _ => false,
        }
    }

    // ---------------------------------------------------------------------
    // Connect
    // ---------------------------------------------------------------------

    pub fn begin_connect(&mut self) -> Option<DataSource> {
        let WizardStep::Connect { source } = self.step else {
            return None;
        };
        if !self.operations.try_begin(Operation::Connect) {
            return None;
        }
        self.error = None;
        Some(source)
    }

    pub fn finish_connect(&mut self, result: Result<ConnectedTarget, String>) {
        match result {
            Ok(target) => {
                self.operations.finish(Operation::Connect, true);
                if matches!(self.step, WizardStep::Connect { .. }) {
                    info!(
                        "[PHASE: wizard] [STEP: connect] Connected to {} on {}",
                        target.database, target.host
                    );
                    self.step = WizardStep::LoadArtifacts { target };
                }
            }
            Err(message) => {
                self.operations.finish(Operation::Connect, false);
                self.error = Some(message);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Artifacts
    // ---------------------------------------------------------------------

    pub fn begin_artifact(&mut self, artifact: Artifact) -> bool {
        if self.step.target().is_none() {
            return false;
        }
        if !self.operations.try_begin(artifact.operation()) {
            return false;
        }
        self.error = None;
        true
    }

    /// Claim every artifact the sequential pipeline still has to load. Returns `None`
    /// (claiming nothing) when any of them is already in flight.
    pub fn begin_pipeline(&mut self) -> Option<Vec<Artifact>> {
        if self.step.target().is_none() {
            return None;
        }
        let pending: Vec<Artifact> = Artifact::PIPELINE
            .iter()
            .copied()
            .filter(|a| !self.loaded.is_loaded(*a))
            .collect();
        if pending
            .iter()
            .any(|a| self.operations.is_in_flight(a.operation()))
        {
            return None;
        }
        for a in &pending {
            self.operations.try_begin(a.operation());
        }
        self.error = None;
        Some(pending)
    }

    pub fn finish_artifact(&mut self, artifact: Artifact, result: Result<(), String>) {
        match result {
            Ok(()) => {
                self.operations.finish(artifact.operation(), true);
                self.loaded.mark(artifact);
            }
            Err(message) => {
                self.operations.finish(artifact.operation(), false);
                self.error = Some(message);
            }
        }
    }

    /// Pipeline stopped early: artifacts it never reached go back to idle.
    pub fn release_artifacts(&mut self, artifacts: &[Artifact]) {
        for a in artifacts {
            self.operations.release(a.operation());
        }
    }

    // ---------------------------------------------------------------------
    // Chat
    // ---------------------------------------------------------------------

    /// Accept a chat submission: appends the user message and opens a new turn.
    /// Blank input, a request already in flight, or not being on the chat step make
    /// this a no-op.
    pub fn begin_chat(&mut self, input: &str) -> Option<ChatTicket> {
        if !matches!(self.step, WizardStep::Chat { .. }) {
            return None;
        }
        let query = normalize_chat_input(input)?;
        // Query results land as the trailing assistant message; a turn must not adopt them.
        if self.operations.is_in_flight(Operation::ExecuteQuery) {
            return None;
        }
        if !self.operations.try_begin(Operation::Chat) {
            return None;
        }

        self.error = None;
        self.transcript.push_user(query);
        let turn = ChatTurn::new(query);
        let ticket = ChatTicket {
            query: turn.query().to_string(),
            correlation_id: turn.correlation_id(),
        };
        self.turn = Some(turn);
        Some(ticket)
    }

    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        let Some(turn) = self.turn.as_mut() else {
            warn!(
                "[PHASE: chat] [STEP: apply] Dropping {} event with no chat in progress",
                event.kind()
            );
            return;
        };
        if let Some(err) = turn.apply(event, &mut self.transcript) {
            self.error = Some(err);
        }
    }

    pub fn finish_chat(&mut self, result: Result<(), String>) {
        self.turn = None;
        match result {
            Ok(()) => self.operations.finish(Operation::Chat, true),
            Err(message) => {
                self.operations.finish(Operation::Chat, false);
                self.error = Some(message);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Execute query
    // ---------------------------------------------------------------------

    pub fn begin_execute(&mut self, sql: &str) -> bool {
        if !matches!(self.step, WizardStep::Chat { .. }) || sql.trim().is_empty() {
            return false;
        }
        // Results are appended to the transcript; keep them out of a live turn.
        if self.operations.is_in_flight(Operation::Chat) {
            return false;
        }
        if !self.operations.try_begin(Operation::ExecuteQuery) {
            return false;
        }
        self.error = None;
        true
    }

    pub fn finish_execute(&mut self, result: Result<String, String>) {
        match result {
            Ok(rendered) => {
                self.operations.finish(Operation::ExecuteQuery, true);
                self.transcript.push_assistant(rendered);
            }
            Err(message) => {
                self.operations.finish(Operation::ExecuteQuery, false);
                self.error = Some(message);
            }
        }
    }
}
