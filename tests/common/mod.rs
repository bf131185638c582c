//! Common test utilities and helpers
//!
//! Builds repair sessions over the in-memory adapters so integration tests
//! can script the working tree, the suites and the fix proposer.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use mender::adapters::memory::{InMemoryVcs, ScriptedFixProposer, ScriptedSuiteExecutor};
use mender::domain::models::{ResultFormat, SuiteConfig, SuiteCost};
use mender::{Config, RepairOrchestrator, RepairPorts};
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// The directory is removed when the returned TempDir is dropped.
#[allow(dead_code)]
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Setup test logging
///
/// Initializes tracing subscriber for tests. Safe to call more than once.
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("mender=debug")
        .try_init();
}

#[allow(dead_code)]
pub fn suite(id: &str, cost: SuiteCost) -> SuiteConfig {
    SuiteConfig {
        id: id.to_string(),
        command: format!("scripted {id}"),
        cost,
        format: ResultFormat::Auto,
    }
}

/// Config with a cheap `unit` suite and an expensive `integration` suite,
/// state kept under `state_dir`.
#[allow(dead_code)]
pub fn config(state_dir: &Path, max_attempts: usize) -> Config {
    Config {
        max_attempts,
        fast_suite: Some("unit".to_string()),
        suite_timeout_secs: 60,
        max_consecutive_regressions: 0,
        state_dir: state_dir.to_path_buf(),
        suites: vec![
            suite("unit", SuiteCost::Cheap),
            suite("integration", SuiteCost::Expensive),
        ],
        ..Config::default()
    }
}

/// Failure count of a `bugs.txt`-driven suite: one per non-empty line.
#[allow(dead_code)]
pub fn bug_lines(tree: &mender::adapters::memory::Tree) -> u32 {
    tree.get("bugs.txt")
        .map_or(0, |b| b.lines().filter(|l| !l.is_empty()).count())
        .try_into()
        .unwrap_or(u32::MAX)
}

/// A repository whose committed `bugs.txt` is empty, with `pending`
/// written over it as an uncommitted change.
#[allow(dead_code)]
pub fn repo_with_pending(pending: &str) -> Arc<InMemoryVcs> {
    let vcs = Arc::new(InMemoryVcs::new([("bugs.txt", ""), ("src/lib.rs", "pub fn f() {}\n")]));
    vcs.write("bugs.txt", pending);
    vcs
}

/// Executor where both suites fail once per line of `bugs.txt`.
#[allow(dead_code)]
pub fn executor(vcs: &Arc<InMemoryVcs>, log_dir: &Path) -> ScriptedSuiteExecutor {
    ScriptedSuiteExecutor::new(vcs.clone(), log_dir)
        .suite("unit", bug_lines)
        .suite("integration", bug_lines)
}

/// Everything one scripted session needs, kept alive together.
#[allow(dead_code)]
pub struct Harness {
    pub vcs: Arc<InMemoryVcs>,
    pub proposer: Arc<ScriptedFixProposer>,
    pub executor: Arc<ScriptedSuiteExecutor>,
    pub orchestrator: RepairOrchestrator,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Harness {
    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }
}

#[allow(dead_code)]
pub fn harness(
    vcs: Arc<InMemoryVcs>,
    executor: impl FnOnce(&Arc<InMemoryVcs>, &Path) -> ScriptedSuiteExecutor,
    proposer: ScriptedFixProposer,
    configure: impl FnOnce(&mut Config),
) -> Harness {
    let dir = temp_dir();
    let mut config = config(&dir.path().join("state"), 3);
    configure(&mut config);
    let executor = Arc::new(executor(&vcs, &dir.path().join("logs")));
    let proposer = Arc::new(proposer);
    let orchestrator = RepairOrchestrator::new(
        RepairPorts {
            vcs: vcs.clone(),
            executor: executor.clone(),
            proposer: proposer.clone(),
        },
        &config,
    )
    .expect("Failed to build orchestrator");
    Harness {
        vcs,
        proposer,
        executor,
        orchestrator,
        dir,
    }
}

fn git(path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(path)
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "test@test.com")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "test@test.com")
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Run git in `path`, panicking on failure. Returns trimmed stdout.
#[allow(dead_code)]
pub fn run_git(path: &Path, args: &[&str]) -> String {
    git(path, args)
}

/// Setup a git repository in a temp directory for testing
///
/// Creates an initialized repo on branch `main` with one commit holding
/// `files`. Returns the TempDir (for lifetime management) and the path.
#[allow(dead_code)]
pub fn setup_test_git_repo(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir for git repo");
    let path = dir.path().to_path_buf();

    git(&path, &["init", "-q", "-b", "main"]);
    git(&path, &["config", "user.email", "test@test.com"]);
    git(&path, &["config", "user.name", "Test User"]);
    git(&path, &["config", "commit.gpgsign", "false"]);

    for (name, content) in files {
        let file = path.join(name);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(file, content).expect("Failed to write file");
    }
    git(&path, &["add", "--all"]);
    git(&path, &["commit", "-q", "--allow-empty", "-m", "initial commit"]);

    (dir, path)
}
