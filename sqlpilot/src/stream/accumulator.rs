use crate::models::message::Transcript;
use crate::models::responses::StreamEvent;
use uuid::Uuid;

/// State of one chat request: the accumulated assistant text.
///
/// Lives from the moment the user message is appended until the response ends. While
/// it lives, the trailing assistant message in the transcript is the one it writes to.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    correlation_id: Uuid,
    query: String,
    accumulator: String,
}

impl ChatTurn {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            query: query.into(),
            accumulator: String::new(),
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Accumulated assistant text (untrimmed).
    pub fn text(&self) -> &str {
        &self.accumulator
    }

    /// Fold one event. `status` / `sql_query` grow the assistant message; `error` leaves
    /// the transcript alone and is returned for display.
    pub fn apply(&mut self, event: StreamEvent, transcript: &mut Transcript) -> Option<String> {
        match event {
            StreamEvent::Status(data) | StreamEvent::SqlQuery(data) => {
                self.accumulator.push('\n');
                self.accumulator.push_str(&data);
                transcript.upsert_trailing_assistant(self.accumulator.trim());
                None
            }
            StreamEvent::Error(data) => Some(data),
        }
    }

    /// Fold a sequence of events; returns the last error, if any.
    pub fn apply_all(
        &mut self,
        events: impl IntoIterator<Item = StreamEvent>,
        transcript: &mut Transcript,
    ) -> Option<String> {
        let mut last_error = None;
        for ev in events {
            if let Some(err) = self.apply(ev, transcript) {
                last_error = Some(err);
            }
        }
        last_error
    }
}
