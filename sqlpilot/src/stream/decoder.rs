use crate::models::responses::StreamEvent;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::bytes::Regex;

lazy_static! {
    // Shortest `{ ... }` span: everything up to the first closing brace.
    static ref LEGACY_CANDIDATE: Option<Regex> = Regex::new(r"\{[^}]+\}").ok();
}

const LOG_FRAGMENT_MAX: usize = 120;

/// Incremental decoder for the chat response body.
///
/// Candidates are brace-balanced spans. Braces inside JSON string literals (and escaped
/// quotes inside those strings) do not count, so `{"data": "SELECT '{}'"}` stays one
/// candidate. Text between objects is ignored. A candidate that does not decode as a
/// [`StreamEvent`] is re-scanned with the legacy shortest-span rule before it is
/// skipped, so one broken object never hides the events after it.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
    skipped: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the body; returns every event completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0usize;

        loop {
            let Some(start) = find_byte(&self.buf, b'{', consumed) else {
                // Nothing but inter-object noise left.
                consumed = self.buf.len();
                break;
            };

            match find_object_end(&self.buf, start) {
                Some(end) => {
                    let candidate = self.buf[start..=end].to_vec();
                    self.decode_candidate(&candidate, &mut events);
                    consumed = end + 1;
                }
                None => {
                    // Incomplete object: keep it for the next chunk.
                    consumed = start;
                    break;
                }
            }
        }

        self.buf.drain(..consumed);
        events
    }

    /// Convenience for text input.
    pub fn push_str(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.push(chunk.as_bytes())
    }

    /// End of body. Whatever is still buffered never balanced; salvage what the legacy
    /// rule can find in it.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buf);
        let mut events = Vec::new();
        if rest.iter().all(|b| b.is_ascii_whitespace()) {
            return events;
        }

        debug!(
            "[PHASE: chat] [STEP: decode] Unbalanced tail at end of body ({} bytes): {}",
            rest.len(),
            preview(&rest)
        );
        self.decode_legacy(&rest, &mut events);
        events
    }

    /// Number of fragments dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_candidate(&mut self, candidate: &[u8], events: &mut Vec<StreamEvent>) {
        match serde_json::from_slice::<StreamEvent>(candidate) {
            Ok(ev) => events.push(ev),
            Err(e) => {
                debug!(
                    "[PHASE: chat] [STEP: decode] Balanced fragment did not decode ({}), retrying with bracket scan: {}",
                    e,
                    preview(candidate)
                );
                self.decode_legacy(candidate, events);
            }
        }
    }

    fn decode_legacy(&mut self, text: &[u8], events: &mut Vec<StreamEvent>) {
        let candidates = scan_legacy_candidates(text);
        if candidates.is_empty() {
            self.skip(text, "no bracketed fragment");
            return;
        }
        for c in candidates {
            match serde_json::from_slice::<StreamEvent>(c) {
                Ok(ev) => events.push(ev),
                Err(e) => self.skip(c, &e.to_string()),
            }
        }
    }

    fn skip(&mut self, fragment: &[u8], reason: &str) {
        self.skipped += 1;
        warn!(
            "[PHASE: chat] [STEP: decode] Skipping malformed stream fragment ({}): {}",
            reason,
            preview(fragment)
        );
    }
}

/// Decode a complete response body in one go.
pub fn parse_events(body: &str) -> Vec<StreamEvent> {
    let mut decoder = StreamDecoder::new();
    let mut events = decoder.push_str(body);
    events.extend(decoder.finish());
    events
}

/// Legacy candidate extraction: every shortest span from `{` to the next `}`.
///
/// Mis-splits payloads that contain a literal `}`; used only as a fallback.
pub fn scan_legacy_candidates(text: &[u8]) -> Vec<&[u8]> {
    match LEGACY_CANDIDATE.as_ref() {
        Some(re) => re.find_iter(text).map(|m| m.as_bytes()).collect(),
        None => Vec::new(),
    }
}

fn find_byte(buf: &[u8], needle: u8, from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|b| *b == needle)
        .map(|i| i + from)
}

/// Index of the `}` closing the object that opens at `start`, if the buffer holds it.
fn find_object_end(buf: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in buf.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if *b == b'\\' {
                escaped = true;
            } else if *b == b'"' {
                in_string = false;
            }
            continue;
        }

        match *b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn preview(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() <= LOG_FRAGMENT_MAX {
        return text.into_owned();
    }
    let cut: String = text.chars().take(LOG_FRAGMENT_MAX).collect();
    format!("{}...", cut)
}
