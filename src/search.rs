//! Multi-repository, multi-branch grep.
//!
//! Repositories are searched one after another, and within a repository one
//! branch after another. Each (repository, branch) pair is a separate `git grep`
//! run. Output order is repository order, then resolved branch order, then
//! git's own order; nothing is merged by arrival time.
//!
//! A failing unit (branch resolution, spawn, bad exit) is logged and
//! contributes whatever it produced before failing. Malformed lines are
//! logged and skipped. The merged stream itself never fails.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::git::branches::resolve_branches;
use crate::git::grep::{parse_grep_line, run_grep, GrepQuery};
use crate::git::lines::LineStream;
use crate::git::{GitCommand, RepoRoot};
use crate::models::GrepMatch;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub repos: Vec<String>,
    /// Literal branch name or `^`-prefixed pattern
    pub branches: String,
    pub query: GrepQuery,
}

struct SearchContext {
    git: GitCommand,
    root: RepoRoot,
    branches: String,
    query: GrepQuery,
    cancel: CancellationToken,
}

/// Stream every hit for `request`. Ends early when `cancel` fires, which also
/// terminates any running git process.
pub fn search(
    git: GitCommand,
    root: RepoRoot,
    request: SearchRequest,
    cancel: CancellationToken,
) -> BoxStream<'static, GrepMatch> {
    let SearchRequest {
        repos,
        branches,
        query,
    } = request;
    let stop = cancel.clone().cancelled_owned();

    let ctx = Arc::new(SearchContext {
        git,
        root,
        branches,
        query,
        cancel,
    });

    stream::iter(repos)
        .map(move |repo| repository_matches(ctx.clone(), repo))
        .flatten()
        .take_until(stop)
        .boxed()
}

fn repository_matches(ctx: Arc<SearchContext>, repo: String) -> BoxStream<'static, GrepMatch> {
    stream::once(async move {
        let work_dir = ctx.root.repo_path(&repo);
        let resolved =
            resolve_branches(&ctx.git, &work_dir, &ctx.branches, ctx.cancel.clone()).await;

        match resolved {
            Ok(branches) => {
                tracing::debug!(repo = %repo, ?branches, "resolved branches");
                stream::iter(branches)
                    .map(move |branch| branch_matches(ctx.clone(), repo.clone(), branch))
                    .flatten()
                    .boxed()
            }
            Err(e) => {
                tracing::warn!(repo = %repo, spec = %ctx.branches, error = %e, "branch resolution failed, skipping repository");
                stream::empty().boxed()
            }
        }
    })
    .flatten()
    .boxed()
}

fn branch_matches(ctx: Arc<SearchContext>, repo: String, branch: String) -> BoxStream<'static, GrepMatch> {
    let work_dir = ctx.root.repo_path(&repo);
    let lines = run_grep(
        &ctx.git,
        &work_dir,
        &ctx.query,
        std::slice::from_ref(&branch),
        ctx.cancel.clone(),
    );

    isolate(lines, repo.clone(), branch)
        .filter_map(move |line| {
            future::ready(match parse_grep_line(&repo, &line) {
                Ok(hit) => Some(hit),
                Err(e) => {
                    tracing::warn!(repo = %repo, error = %e, "skipping unparseable grep line");
                    None
                }
            })
        })
        .filter(move |hit| future::ready(ctx.query.matches_target(hit)))
        .boxed()
}

/// Lines up to the first error; the error is logged, never forwarded.
fn isolate(lines: LineStream, repo: String, branch: String) -> impl Stream<Item = String> + Send {
    lines.scan((repo, branch), |(repo, branch), line| {
        future::ready(match line {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::warn!(repo = %repo, branch = %branch, error = %e, "grep failed, skipping branch");
                None
            }
        })
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const FAKE_GIT: &str = r##"
repo=$(basename "$PWD")
prev=""
branch=""
for arg in "$@"; do
  if [ "$arg" = "--" ]; then branch="$prev"; fi
  prev="$arg"
done
case "$*" in
  *"branch --list"*)
    if [ "$repo" = "no-branches" ]; then echo "fatal: not a git repository" >&2; exit 128; fi
    printf '* main\n  dev\n  feature/x\n'
    exit 0
    ;;
esac
case "$repo:$branch" in
  R1:*) echo "fatal: grep exploded" >&2; exit 128 ;;
  R2:main) printf 'main:src/app.go:42:fmt.Println("x:y")\n' ;;
  multi:main) printf 'main:a.txt:1:one\nmain:a.txt:2:two\n' ;;
  multi:dev) printf 'garbage\ndev:b.txt:2:deux\n' ;;
  multi:feature/x) printf 'feature/x:c.txt:2:partial\n'; echo "fatal: bad object" >&2; exit 128 ;;
  slow:*) echo "slow:a.txt:1:first"; exec sleep 30 ;;
  *) exit 1 ;;
esac
"##;

    struct Fixture {
        _root: tempfile::TempDir,
        _script: tempfile::NamedTempFile,
        git: GitCommand,
        repos: RepoRoot,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        for name in ["R1", "R2", "multi", "no-branches", "slow"] {
            std::fs::create_dir(root.path().join(name)).unwrap();
        }
        let mut script = tempfile::NamedTempFile::new().unwrap();
        script.write_all(FAKE_GIT.as_bytes()).unwrap();
        script.flush().unwrap();

        let git = GitCommand::new("sh").with_leading_args([script.path().to_string_lossy().to_string()]);
        let repos = RepoRoot::new(root.path());
        Fixture {
            _root: root,
            _script: script,
            git,
            repos,
        }
    }

    fn request(repos: &[&str], branches: &str) -> SearchRequest {
        SearchRequest {
            repos: repos.iter().map(|r| r.to_string()).collect(),
            branches: branches.to_string(),
            query: GrepQuery::default(),
        }
    }

    fn summary(hits: &[GrepMatch]) -> Vec<String> {
        hits.iter()
            .map(|h| format!("{}@{}:{}:{}", h.repo, h.branch, h.file, h.line_no))
            .collect()
    }

    #[tokio::test]
    async fn test_failed_repository_does_not_abort_others() {
        let f = fixture();
        let hits: Vec<_> = search(f.git.clone(), f.repos.clone(), request(&["R1", "R2"], "main"), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(
            hits,
            vec![GrepMatch {
                branch: "main".to_string(),
                file: "src/app.go".to_string(),
                line_no: 42,
                line: r#"fmt.Println("x:y")"#.to_string(),
                repo: "R2".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_order_follows_repos_then_branches() {
        let f = fixture();
        let hits: Vec<_> = search(f.git.clone(), f.repos.clone(), request(&["multi", "R2"], "^"), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(
            summary(&hits),
            vec![
                "multi@main:a.txt:1",
                "multi@main:a.txt:2",
                "multi@dev:b.txt:2",
                "multi@feature/x:c.txt:2",
                "R2@main:src/app.go:42",
            ]
        );
    }

    #[tokio::test]
    async fn test_target_line_filters_hits() {
        let f = fixture();
        let mut req = request(&["multi"], "^");
        req.query.target_line = Some(2);
        let hits: Vec<_> = search(f.git.clone(), f.repos.clone(), req, CancellationToken::new())
            .collect()
            .await;

        assert_eq!(
            summary(&hits),
            vec!["multi@main:a.txt:2", "multi@dev:b.txt:2", "multi@feature/x:c.txt:2"]
        );
    }

    #[tokio::test]
    async fn test_branch_resolution_failure_is_isolated() {
        let f = fixture();
        let hits: Vec<_> = search(f.git.clone(), f.repos.clone(), request(&["no-branches", "R2"], "^main"), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(summary(&hits), vec!["R2@main:src/app.go:42"]);
    }

    #[tokio::test]
    async fn test_pattern_with_no_matching_branch_yields_nothing() {
        let f = fixture();
        let hits: Vec<_> = search(f.git.clone(), f.repos.clone(), request(&["R2"], "^release"), CancellationToken::new())
            .collect()
            .await;

        assert!(hits.is_empty());
    }

    fn git(dir: &std::path::Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com", "-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(dir)
            .stdout(std::process::Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    /// A real repository `demo` whose `main` branch holds one commit.
    fn real_repo(files: &[(&str, &str)]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let repo = root.path().join("demo");
        std::fs::create_dir(&repo).unwrap();
        git(&repo, &["init", "-q"]);
        git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        for (name, contents) in files {
            std::fs::write(repo.join(name), contents).unwrap();
        }
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "-q", "-m", "init"]);
        root
    }

    #[tokio::test]
    async fn test_pattern_starting_with_dash_is_searched_literally() {
        let root = real_repo(&[("f.txt", "a --> b\nplain\n")]);
        let repos = RepoRoot::new(root.path());

        let mut req = request(&["demo"], "main");
        req.query.pattern = "-->".to_string();
        let hits: Vec<_> = search(GitCommand::default(), repos.clone(), req, CancellationToken::new())
            .collect()
            .await;
        assert_eq!(
            hits,
            vec![GrepMatch {
                branch: "main".to_string(),
                file: "f.txt".to_string(),
                line_no: 1,
                line: "a --> b".to_string(),
                repo: "demo".to_string(),
            }]
        );

        let mut req = request(&["demo"], "main");
        req.query.pattern = "--count".to_string();
        let hits: Vec<_> = search(GitCommand::default(), repos, req, CancellationToken::new())
            .collect()
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_ends_stream() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let mut hits = search(f.git.clone(), f.repos.clone(), request(&["slow", "R2"], "main"), cancel.clone());

        let first = hits.next().await.unwrap();
        assert_eq!(first.repo, "slow");

        cancel.cancel();
        let next = tokio::time::timeout(Duration::from_secs(5), hits.next())
            .await
            .expect("search should stop promptly after cancellation");
        assert!(next.is_none());
    }
}
