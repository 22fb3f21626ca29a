// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Just enough git to synthesize versions for unreleased roles: a shallow
//! clone, an optional branch switch, and the head commit's hash and
//! committer date.

use std::path::Path;

use chrono::{DateTime, Utc};
use git2::build::RepoBuilder;
use git2::{FetchOptions, Repository};
use log::info;
use thiserror::Error;

/// Shallow-clone `url` into `path`. An existing clone is left untouched.
pub fn clone_shallow(url: &str, path: &Path) -> Result<(), Error> {
    if path.join(".git").exists() {
        return Ok(());
    }

    info!("clone {url} -> {}", path.display());

    let mut fetch = FetchOptions::new();
    fetch.depth(1);

    RepoBuilder::new().fetch_options(fetch).clone(url, path)?;
    Ok(())
}

/// Switch the work tree to a named branch, looking at remote-tracking
/// refs first since shallow clones rarely carry local branches.
pub fn checkout_branch(path: &Path, branch: &str) -> Result<(), Error> {
    let repo = Repository::open(path)?;

    let object = repo
        .revparse_single(&format!("origin/{branch}"))
        .or_else(|_| repo.revparse_single(branch))?;

    repo.checkout_tree(&object, None)?;
    repo.set_head_detached(object.id())?;
    Ok(())
}

/// The head commit's full hash and committer date as `YYYYMMDDHHMMSS`
pub fn head_commit(path: &Path) -> Result<(String, String), Error> {
    let repo = Repository::open(path)?;
    let commit = repo.head()?.peel_to_commit()?;

    let time = commit.time();
    let date = DateTime::<Utc>::from_timestamp(time.seconds(), 0).ok_or(Error::BadTimestamp)?;

    Ok((commit.id().to_string(), date.format("%Y%m%d%H%M%S").to_string()))
}

/// Resolve a named commit's date, falling back to head when the hash is
/// not present locally
pub fn commit_date(path: &Path, commit: &str) -> Result<String, Error> {
    let repo = Repository::open(path)?;

    let commit = match repo.revparse_single(commit).and_then(|o| o.peel_to_commit()) {
        Ok(commit) => commit,
        Err(_) => repo.head()?.peel_to_commit()?,
    };

    let time = commit.time();
    let date = DateTime::<Utc>::from_timestamp(time.seconds(), 0).ok_or(Error::BadTimestamp)?;
    Ok(date.format("%Y%m%d%H%M%S").to_string())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("git: {0}")]
    Git(#[from] git2::Error),

    #[error("commit timestamp out of range")]
    BadTimestamp,
}
