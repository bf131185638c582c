//! GitVcs against real repositories in temp directories.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{run_git, setup_test_git_repo};
use mender::domain::ports::{VcsError, VcsProvider};
use mender::infrastructure::vcs::GitVcs;
use mender::services::{BackupManager, Workspace};

fn read(root: &Path, name: &str) -> Option<String> {
    fs::read_to_string(root.join(name)).ok()
}

fn vcs(root: &Path) -> GitVcs {
    GitVcs::new(root, "upstream", &root.join(".git/mender"))
}

#[tokio::test]
async fn diff_round_trips_every_kind_of_change() {
    let (_dir, root) = setup_test_git_repo(&[("a.txt", "one\n"), ("b.txt", "two\n")]);
    fs::write(root.join("a.txt"), "ONE\n").unwrap();
    fs::remove_file(root.join("b.txt")).unwrap();
    fs::create_dir_all(root.join("new")).unwrap();
    fs::write(root.join("new/c.txt"), "three\n").unwrap();
    let git = vcs(&root);

    let diff = git.diff_working_tree().await.unwrap();
    assert!(!diff.is_empty());
    assert_eq!(run_git(&root, &["diff", "--cached", "--name-only"]), "");

    git.discard_changes().await.unwrap();
    assert_eq!(read(&root, "a.txt").as_deref(), Some("one\n"));
    assert_eq!(read(&root, "b.txt").as_deref(), Some("two\n"));
    assert!(read(&root, "new/c.txt").is_none());

    git.apply_diff(&diff).await.unwrap();
    assert_eq!(read(&root, "a.txt").as_deref(), Some("ONE\n"));
    assert!(read(&root, "b.txt").is_none());
    assert_eq!(read(&root, "new/c.txt").as_deref(), Some("three\n"));
    assert_eq!(git.diff_working_tree().await.unwrap(), diff);
}

#[tokio::test]
async fn clean_tree_has_empty_diff() {
    let (_dir, root) = setup_test_git_repo(&[("a.txt", "one\n")]);
    assert!(vcs(&root).diff_working_tree().await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_patch_is_rejected() {
    let (_dir, root) = setup_test_git_repo(&[("a.txt", "one\n")]);
    fs::write(root.join("a.txt"), "changed\n").unwrap();
    let git = vcs(&root);
    let diff = git.diff_working_tree().await.unwrap();

    let err = git.apply_diff(&diff).await.unwrap_err();
    assert!(matches!(err, VcsError::PatchRejected(_)));
    assert_eq!(read(&root, "a.txt").as_deref(), Some("changed\n"));
}

#[tokio::test]
async fn checkout_sets_pending_changes_aside_and_restore_brings_them_back() {
    let (_dir, root) = setup_test_git_repo(&[("a.txt", "v1\n")]);
    let first = run_git(&root, &["rev-parse", "HEAD"]);
    fs::write(root.join("a.txt"), "v2\n").unwrap();
    run_git(&root, &["commit", "-q", "-am", "second"]);
    fs::write(root.join("a.txt"), "pending\n").unwrap();
    fs::write(root.join("untracked.txt"), "mine\n").unwrap();
    let git = vcs(&root);

    let checkout = git.checkout(&first).await.unwrap();
    assert_eq!(checkout.previous, "main");
    assert!(checkout.stash.is_some());
    assert_eq!(read(&root, "a.txt").as_deref(), Some("v1\n"));
    assert!(read(&root, "untracked.txt").is_none());

    fs::write(root.join("build-artifact.txt"), "junk\n").unwrap();
    fs::write(root.join("a.txt"), "edited by suite\n").unwrap();
    git.restore(checkout).await.unwrap();

    assert_eq!(run_git(&root, &["symbolic-ref", "--short", "HEAD"]), "main");
    assert_eq!(read(&root, "a.txt").as_deref(), Some("pending\n"));
    assert_eq!(read(&root, "untracked.txt").as_deref(), Some("mine\n"));
    assert!(read(&root, "build-artifact.txt").is_none());
    assert_eq!(run_git(&root, &["stash", "list"]), "");
}

#[tokio::test]
async fn suite_leftovers_do_not_collide_with_pending_untracked_files() {
    let (_dir, root) = setup_test_git_repo(&[("a.txt", "v1\n")]);
    fs::write(root.join("notes.md"), "mine\n").unwrap();
    let state_dir = root.join(".mender-state");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(state_dir.join("OUTSTANDING"), "snap").unwrap();
    let git = GitVcs::new(&root, "upstream", &state_dir);

    let checkout = git.checkout("HEAD").await.unwrap();
    assert!(read(&root, "notes.md").is_none());
    fs::write(root.join("notes.md"), "written by a suite\n").unwrap();
    fs::create_dir_all(root.join("target")).unwrap();
    fs::write(root.join("target/out.bin"), "junk").unwrap();
    git.restore(checkout).await.unwrap();

    assert_eq!(read(&root, "notes.md").as_deref(), Some("mine\n"));
    assert!(!root.join("target").exists());
    assert!(state_dir.join("OUTSTANDING").exists());
    assert_eq!(run_git(&root, &["stash", "list"]), "");
}

#[tokio::test]
async fn clean_checkout_needs_no_stash() {
    let (_dir, root) = setup_test_git_repo(&[("a.txt", "v1\n")]);
    let git = vcs(&root);
    let checkout = git.checkout("HEAD").await.unwrap();
    assert!(checkout.stash.is_none());
    git.restore(checkout).await.unwrap();
    assert_eq!(run_git(&root, &["symbolic-ref", "--short", "HEAD"]), "main");
}

#[tokio::test]
async fn refs_resolve_or_report_unknown() {
    let (_dir, root) = setup_test_git_repo(&[("a.txt", "v1\n")]);
    let head = run_git(&root, &["rev-parse", "HEAD"]);
    let git = vcs(&root);

    assert_eq!(git.resolve("HEAD").await.unwrap(), head);
    assert!(matches!(
        git.resolve("no-such-branch").await,
        Err(VcsError::UnknownRef(_))
    ));
    assert_eq!(git.current_branch_head().await.unwrap(), "HEAD");
    assert!(matches!(git.upstream_base().await, Err(VcsError::UnknownRef(_))));

    run_git(&root, &["branch", "upstream"]);
    fs::write(root.join("a.txt"), "v2\n").unwrap();
    run_git(&root, &["commit", "-q", "-am", "ahead of upstream"]);
    assert_eq!(git.upstream_base().await.unwrap(), head);
}

#[tokio::test]
async fn state_dir_inside_work_tree_is_never_captured_or_cleaned() {
    let (_dir, root) = setup_test_git_repo(&[("a.txt", "v1\n")]);
    let state_dir = root.join(".mender-state");
    fs::create_dir_all(state_dir.join("snapshots")).unwrap();
    fs::write(state_dir.join("snapshots/OUTSTANDING"), "snap").unwrap();
    let git = GitVcs::new(&root, "upstream", &state_dir);

    assert!(git.diff_working_tree().await.unwrap().is_empty());
    git.discard_changes().await.unwrap();
    assert!(state_dir.join("snapshots/OUTSTANDING").exists());
}

#[tokio::test]
async fn snapshot_restore_is_bit_for_bit() {
    let (_dir, root) = setup_test_git_repo(&[("src/lib.rs", "pub fn f() {}\n"), ("bin.dat", "\0\x01")]);
    fs::write(root.join("src/lib.rs"), "pub fn f() { g() }\n").unwrap();
    fs::write(root.join("bin.dat"), b"\0\x02\xff").unwrap();
    fs::write(root.join("notes.md"), "wip\n").unwrap();
    let git: Arc<dyn VcsProvider> = Arc::new(vcs(&root));
    let backup = BackupManager::new(Arc::new(Workspace::new(git)), &root.join(".git/mender"));

    let snapshot = backup.create_snapshot().await.unwrap();
    assert!(snapshot.payload_path().exists());

    fs::write(root.join("src/lib.rs"), "broken(\n").unwrap();
    fs::remove_file(root.join("notes.md")).unwrap();
    fs::write(root.join("stray.txt"), "x\n").unwrap();
    backup.restore_snapshot(&snapshot).await.unwrap();

    assert_eq!(read(&root, "src/lib.rs").as_deref(), Some("pub fn f() { g() }\n"));
    assert_eq!(fs::read(root.join("bin.dat")).unwrap(), b"\0\x02\xff");
    assert_eq!(read(&root, "notes.md").as_deref(), Some("wip\n"));
    assert!(read(&root, "stray.txt").is_none());
    assert!(backup.matches(&snapshot).await.unwrap());
    backup.release(&snapshot).unwrap();
    assert!(backup.outstanding().unwrap().is_none());
}
