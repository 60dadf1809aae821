use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::error::GitError;
use crate::git::command::GitCommand;
use crate::git::lines::{line_stream, LineStream};
use crate::models::GrepMatch;

/// `git grep` exits with 1 when nothing matched.
const NO_MATCH_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrepQuery {
    pub pattern: String,
    pub file_glob: String,
    pub ignore_case: bool,
    /// `basic`, `extended`, `fixed` or `perl`
    pub pattern_type: String,
    /// Keep only hits on this line number
    pub target_line: Option<u64>,
}

impl Default for GrepQuery {
    fn default() -> Self {
        Self {
            pattern: ".".to_string(),
            file_glob: "*".to_string(),
            ignore_case: false,
            pattern_type: "basic".to_string(),
            target_line: None,
        }
    }
}

impl GrepQuery {
    pub fn args(&self, branches: &[String]) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            format!("grep.patternType={}", self.pattern_type),
            "grep".to_string(),
            "-In".to_string(),
        ];
        if self.ignore_case {
            args.push("-i".to_string());
        }
        // -e keeps a leading '-' in the pattern from being read as an option
        args.push("-e".to_string());
        args.push(self.pattern.clone());
        args.extend(branches.iter().cloned());
        args.push("--".to_string());
        args.push(self.file_glob.clone());
        args
    }

    pub fn matches_target(&self, hit: &GrepMatch) -> bool {
        self.target_line.is_none_or(|line| hit.line_no == line)
    }
}

/// Run `git grep` for `branches` in `work_dir`; "no matches" is a normal completion.
pub fn run_grep(
    git: &GitCommand,
    work_dir: &Path,
    query: &GrepQuery,
    branches: &[String],
    cancel: CancellationToken,
) -> LineStream {
    let invocation = git
        .invocation(work_dir, query.args(branches))
        .accept_exit_code(NO_MATCH_EXIT_CODE);
    line_stream(invocation, cancel)
}

/// Parse `branch:file:line_no:text`. Text may itself contain colons.
pub fn parse_grep_line(repo: &str, line: &str) -> Result<GrepMatch, GitError> {
    let mut fields = line.splitn(4, ':');
    let (Some(branch), Some(file), Some(line_no), Some(text)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(GitError::MalformedLine(line.to_string()));
    };

    let line_no = line_no
        .parse()
        .map_err(|_| GitError::MalformedLine(line.to_string()))?;

    Ok(GrepMatch {
        branch: branch.to_string(),
        file: file.to_string(),
        line_no,
        line: text.to_string(),
        repo: repo.to_string(),
    })
}
