pub mod backend;
pub mod chat;
pub mod connection;
pub mod query;

pub use backend::{Backend, BackendError, HttpBackend};
