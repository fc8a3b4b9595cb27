//! The artifact a build hands to the executor.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A planned query: which database to run against, and the SQL to submit.
///
/// This is the only output of a build; the core never executes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreateQuery {
    pub database_id: u64,
    pub submitted_query: String,
}

impl CreateQuery {
    pub fn new(database_id: u64, submitted_query: impl Into<String>) -> Self {
        Self {
            database_id,
            submitted_query: submitted_query.into(),
        }
    }
}
