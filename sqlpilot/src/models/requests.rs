// API request models

use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials for `POST /connect-postgres/`.
///
/// Transient: built from the connect form for one request and dropped afterwards.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: String,
}

impl ConnectionParams {
    /// Query pairs in the order the backend documents them.
    pub fn query_pairs(&self) -> [(&'static str, &str); 5] {
        [
            ("dbname", self.dbname.as_str()),
            ("user", self.user.as_str()),
            ("password", self.password.as_str()),
            ("host", self.host.as_str()),
            ("port", self.port.as_str()),
        ]
    }
}

// Never let the password reach a log line through `{:?}`.
impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Body for `POST /execute-query/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteQueryRequest {
    pub sql_query: String,
}
