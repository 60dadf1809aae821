use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::git::lines::{line_stream, LineStream, ProcessInvocation};

/// Config overrides that keep git output machine-parseable.
pub const BASELINE_ARGS: [&str; 6] = [
    "-c",
    "color.ui=false",
    "-c",
    "core.quotepath=false",
    "-c",
    "core.pager=cat",
];

/// Runs git with a fixed executable and baseline flags.
#[derive(Debug, Clone)]
pub struct GitCommand {
    program: String,
    leading_args: Vec<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the baseline flags, e.g. a wrapper script
    /// when `program` is an interpreter.
    #[cfg(test)]
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn invocation<I, S>(&self, work_dir: &Path, args: I) -> ProcessInvocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProcessInvocation::new(&self.program, work_dir)
            .args(self.leading_args.iter().cloned())
            .args(BASELINE_ARGS)
            .args(args)
    }

    pub fn run<I, S>(&self, work_dir: &Path, args: I, cancel: CancellationToken) -> LineStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        line_stream(self.invocation(work_dir, args), cancel)
    }
}
