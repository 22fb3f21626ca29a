// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Role work units: tag-archive downloads for released roles, synthesized
//! snapshot archives for roles with no releases.

use std::path::{Path, PathBuf};

use fs_err as fs;
use log::{debug, info, warn};
use tokio::task;

use crate::descriptor::RoleDescriptor;
use crate::galaxy::{self, CachedGalaxyClient, Role};
use crate::git;
use crate::sync::sidecar::Sidecar;
use crate::sync::{Dirs, Error, FileSet, COOL_DOWN};

/// Process one role: every selected version in sequence, inside the
/// caller's semaphore slot. Failures are recorded as `.bad` sidecars and
/// never escape the unit.
pub async fn sync_role(
    client: &CachedGalaxyClient,
    dirs: &Dirs,
    file_set: &FileSet,
    role: Role,
    latest_only: bool,
    version_filter: Option<&str>,
) {
    let namespace = role.namespace().to_owned();
    let name = role.name.clone();

    let mut versions = role.summary_fields.versions.clone();
    if latest_only {
        versions = galaxy::reduce_to_highest(&versions);
    }
    if let Some(wanted) = version_filter {
        versions.retain(|v| v.name == wanted);
    }

    if versions.is_empty() {
        sync_unversioned(client, dirs, file_set, &role, &namespace, &name).await;
        return;
    }

    for version in versions {
        let stem = format!("{namespace}-{name}-{}", version.name);
        let sidecar = Sidecar::new(&dirs.roles, &stem);

        if let Some(reason) = sidecar.skip_reason() {
            debug!("{stem}: skipping ({reason:?})");
            continue;
        }

        let target = dirs.roles.join(format!("{stem}.tar.gz"));
        if target.is_file() || target.is_symlink() {
            debug!("{stem}: already present");
            continue;
        }

        let Ok(Some(guard)) = sidecar.acquire() else {
            continue;
        };

        match fetch_versioned(client, dirs, &role, &namespace, &name, &version.name, &target).await
        {
            Ok(canonical) => {
                info!("{stem}: synced to {}", canonical.display());
                if let Err(e) = guard.release() {
                    warn!("{stem}: failed to release lock: {e}");
                }
                tokio::time::sleep(COOL_DOWN).await;
            }
            Err(e) => {
                warn!("{stem}: {e}");
                if let Err(e) = guard.mark_bad(&e.to_string()) {
                    warn!("{stem}: failed to write bad sidecar: {e}");
                }
            }
        }
    }
}

/// Download one released version and reconcile on-disk identity with the
/// identity declared inside the archive. Returns the canonical artifact
/// path whether or not a rename happened.
async fn fetch_versioned(
    client: &CachedGalaxyClient,
    dirs: &Dirs,
    role: &Role,
    namespace: &str,
    name: &str,
    version: &str,
    target: &Path,
) -> Result<PathBuf, Error> {
    let url = format!(
        "https://github.com/{}/{}/archive/refs/tags/{version}.tar.gz",
        role.github_user, role.github_repo
    );

    debug!("HEAD {url}");
    if !client.fetcher().head_ok(&url).await {
        return Err(Error::HeadFailed(url));
    }

    client.fetcher().download_to(&url, target).await?;

    reconcile_identity(&dirs.roles, target, namespace, name, version)
}

/// The embedded descriptor may claim a different identity than the
/// upstream record. The descriptor wins: the file moves to the declared
/// name and a symlink keeps the upstream name resolvable. Returns the
/// canonical path whether or not a rename happened.
fn reconcile_identity(
    roles_dir: &Path,
    target: &Path,
    namespace: &str,
    name: &str,
    version: &str,
) -> Result<PathBuf, Error> {
    let meta = RoleDescriptor::from_archive(target)?;
    let info = &meta.galaxy_info;

    let declared_namespace = if info.namespace.is_empty() { namespace } else { info.namespace.as_str() };
    let declared_name = if info.role_name.is_empty() { name } else { info.role_name.as_str() };

    if declared_namespace == namespace && declared_name == name {
        return Ok(target.to_path_buf());
    }

    let canonical_name = format!("{declared_namespace}-{declared_name}-{version}.tar.gz");
    let canonical = roles_dir.join(&canonical_name);

    debug!("rename {} -> {}", target.display(), canonical.display());
    fs::rename(target, &canonical)?;
    std::os::unix::fs::symlink(&canonical_name, target)?;

    Ok(canonical)
}

async fn sync_unversioned(
    client: &CachedGalaxyClient,
    dirs: &Dirs,
    file_set: &FileSet,
    role: &Role,
    namespace: &str,
    name: &str,
) {
    let stem = format!("{namespace}-{name}");
    let sidecar = Sidecar::new(&dirs.roles, &stem);

    if let Some(reason) = sidecar.skip_reason() {
        debug!("{stem}: skipping ({reason:?})");
        return;
    }

    let Ok(Some(guard)) = sidecar.acquire() else {
        return;
    };

    match synthesize_artifact(client, dirs, file_set, role, namespace, name).await {
        Ok(path) => {
            info!("{stem}: synthesized {}", path.display());
            if let Err(e) = guard.release() {
                warn!("{stem}: failed to release lock: {e}");
            }
            tokio::time::sleep(COOL_DOWN).await;
        }
        Err(e) => {
            warn!("{stem}: {e}");
            if let Err(e) = guard.mark_bad(&e.to_string()) {
                warn!("{stem}: failed to write bad sidecar: {e}");
            }
        }
    }
}

/// Build the snapshot artifact for a role with no release tags: resolve
/// the head commit, synthesize `0.0.0+<date>-<commit>`, download the
/// commit archive.
async fn synthesize_artifact(
    client: &CachedGalaxyClient,
    dirs: &Dirs,
    file_set: &FileSet,
    role: &Role,
    namespace: &str,
    name: &str,
) -> Result<PathBuf, Error> {
    // An artifact for this commit may exist from an earlier run under a
    // different date resolution; the pre-indexed file set answers that
    // without rescanning the directory.
    if !role.commit.is_empty() {
        let pattern = format!("{namespace}-{name}-*-{}.tar.gz", role.commit);
        if let Some(existing) = file_set.find_by_glob(&pattern).first() {
            debug!("{namespace}-{name}: found existing {existing}");
            return Ok(dirs.roles.join(existing));
        }
    }

    let repo_url = format!("https://github.com/{}/{}", role.github_user, role.github_repo);
    let repo_path = dirs.git.join(format!("{}.{}", role.github_user, role.github_repo));

    let known_commit = role.commit.clone();
    let branch = role.github_branch.clone();

    let (commit, date) = task::spawn_blocking(move || -> Result<(String, String), git::Error> {
        git::clone_shallow(&repo_url, &repo_path)?;
        if !branch.is_empty() {
            git::checkout_branch(&repo_path, &branch)?;
        }
        if known_commit.is_empty() {
            git::head_commit(&repo_path)
        } else {
            let date = git::commit_date(&repo_path, &known_commit)?;
            Ok((known_commit, date))
        }
    })
    .await
    .expect("git task panicked")?;

    let version = format!("0.0.0+{date}-{commit}");
    let target = dirs.roles.join(format!("{namespace}-{name}-{version}.tar.gz"));
    if target.is_file() {
        return Ok(target);
    }

    let url = format!(
        "https://github.com/{}/{}/archive/{commit}.tar.gz",
        role.github_user, role.github_repo
    );
    client.fetcher().download_to(&url, &target).await?;

    Ok(target)
}
