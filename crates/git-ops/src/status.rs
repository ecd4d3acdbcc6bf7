//! Status snapshot derivation.

use crate::error::{GitOpsError, GitOpsResult};
use git2::{Repository, StatusOptions};
use std::path::Path;
use tiller_domain::GitStatusSnapshot;

/// Derive the status snapshot for a repository path.
///
/// The snapshot covers:
/// - current branch shorthand (None on detached HEAD)
/// - commits ahead/behind the upstream (0/0 when no upstream is set)
/// - counts of added (new/untracked) and deleted files
/// - whether the working directory is clean
pub fn get_status_snapshot(repo_path: &Path) -> GitOpsResult<GitStatusSnapshot> {
    let repo = Repository::open(repo_path).map_err(|e| GitOpsError::OpenFailed {
        path: repo_path.display().to_string(),
        detail: e.message().to_string(),
    })?;

    let branch = repo
        .head()
        .ok()
        .and_then(|head| head.shorthand().map(String::from));

    let (ahead, behind) = ahead_behind(&repo);

    let mut status_opts = StatusOptions::new();
    status_opts
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .include_unmodified(false);

    let statuses = repo.statuses(Some(&mut status_opts))?;

    let mut added = 0;
    let mut deleted = 0;
    for entry in statuses.iter() {
        let status = entry.status();
        if status.is_index_new() || status.is_wt_new() {
            added += 1;
        }
        if status.is_index_deleted() || status.is_wt_deleted() {
            deleted += 1;
        }
    }

    Ok(GitStatusSnapshot {
        branch,
        ahead,
        behind,
        added,
        deleted,
        is_clean: statuses.is_empty(),
    })
}

/// Commits ahead of / behind the upstream of HEAD's branch.
///
/// Detached HEAD or a branch without an upstream both report 0/0.
fn ahead_behind(repo: &Repository) -> (usize, usize) {
    let head = match repo.head() {
        Ok(head) if head.is_branch() => head,
        _ => return (0, 0),
    };
    let local_oid = match head.target() {
        Some(oid) => oid,
        None => return (0, 0),
    };
    let branch_name = match head.shorthand() {
        Some(name) => name.to_string(),
        None => return (0, 0),
    };

    let upstream_oid = repo
        .find_branch(&branch_name, git2::BranchType::Local)
        .ok()
        .and_then(|branch| branch.upstream().ok())
        .and_then(|upstream| upstream.get().target());

    match upstream_oid {
        Some(upstream) => repo.graph_ahead_behind(local_oid, upstream).unwrap_or((0, 0)),
        None => (0, 0),
    }
}
