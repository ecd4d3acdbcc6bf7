mod common;

use git_ops::StatusPoller;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn poller_publishes_first_snapshot_and_updates() {
    let (_dir, repo_path) = common::init_test_repo();
    let poller = Arc::new(StatusPoller::new(Duration::from_millis(50)));

    let mut rx = poller.watch(repo_path.clone());

    // First poll.
    rx.changed().await.expect("poller dropped");
    let first = rx.borrow().clone().expect("no snapshot");
    assert!(first.is_clean);

    // Dirty the repo and wait for the snapshot to change.
    common::create_file(&repo_path, "new_file.txt", "hello\n");
    rx.changed().await.expect("poller dropped");
    let second = rx.borrow().clone().expect("no snapshot");
    assert!(!second.is_clean);
    assert_eq!(second.added, 1);
}

#[tokio::test]
async fn watch_is_shared_and_unwatch_cancels() {
    let (_dir, repo_path) = common::init_test_repo();
    let poller = Arc::new(StatusPoller::new(Duration::from_millis(50)));

    let _rx1 = poller.watch(repo_path.clone());
    let _rx2 = poller.watch(repo_path.clone());
    assert_eq!(poller.active(), 1);

    poller.unwatch(&repo_path);
    assert_eq!(poller.active(), 0);

    // Unwatching again is a no-op.
    poller.unwatch(&repo_path);
}
