//! Chat response parsing.
//!
//! The backend answers `/generate-query/` with a body of back-to-back JSON objects
//! (`{"event": ..., "data": ...}`) and no framing between them. [`StreamDecoder`] cuts
//! that body into events as bytes arrive; [`ChatTurn`] folds the events into the
//! in-progress assistant message.

mod accumulator;
mod decoder;

pub use accumulator::ChatTurn;
pub use decoder::{parse_events, scan_legacy_candidates, StreamDecoder};
