//! Data transfer objects (DTOs) for API responses.
//!
//! - `branch`: BranchInfo parsed from branch listings
//! - `grep`: GrepMatch, one streamed search hit

pub mod branch;
pub mod grep;

pub use branch::*;
pub use grep::*;
