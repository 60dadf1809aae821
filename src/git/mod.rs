pub mod branches;
pub mod command;
pub mod grep;
pub mod lines;
pub mod repository;

pub use command::GitCommand;
pub use repository::{AppState, RepoRoot, SharedState};
