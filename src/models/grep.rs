//! Search hit DTO.
//!
//! Serialized field names follow the public wire format:
//! `{branch, file, line_no, line, repo}`.

use serde::{Deserialize, Serialize};

/// A single `git grep` hit, tagged with the repository it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    pub branch: String,
    pub file: String,
    pub line_no: u64,
    /// Matched line text, colons included
    pub line: String,
    pub repo: String,
}
