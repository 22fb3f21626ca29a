// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The mirror engine: enumerate upstream artifacts and materialize them
//! into a local repository tree.
//!
//! Work units run under a counting semaphore; all cross-worker
//! coordination happens through the sidecar files next to each artifact,
//! so an interrupted run resumes by simply running again.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fs_err as fs;
use glob::{MatchOptions, Pattern};
use log::{debug, error, info};
use tokio::sync::Semaphore;

use crate::galaxy::{self, CachedGalaxyClient};
use crate::requirements::{self, Requirements};
use crate::{descriptor, fetch, git};

use thiserror::Error;

pub mod collections;
pub mod roles;
pub mod sidecar;

/// Pause between successful network downloads, out of politeness to the
/// upstream
const COOL_DOWN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub server: String,
    pub dest: PathBuf,
    pub concurrency: usize,
    pub collections_only: bool,
    pub roles_only: bool,
    pub artifacts_only: bool,
    pub latest_only: bool,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub requirements_file: Option<PathBuf>,
    pub auth_url: Option<String>,
    pub token: Option<String>,
    pub api_prefix: String,
}

/// The on-disk tree a sync run writes into
#[derive(Debug, Clone)]
pub struct Dirs {
    pub dest: PathBuf,
    pub cache: PathBuf,
    pub roles: PathBuf,
    pub collections: PathBuf,
    pub git: PathBuf,
}

impl Dirs {
    pub fn create(dest: &Path) -> Result<Self, Error> {
        let dirs = Self {
            dest: dest.to_path_buf(),
            cache: dest.join(".cache"),
            roles: dest.join("roles"),
            collections: dest.join("collections"),
            git: dest.join(".cache").join("git"),
        };

        for dir in [
            &dirs.dest,
            &dirs.cache,
            &dirs.cache.join("roles"),
            &dirs.cache.join("collections"),
            &dirs.roles,
            &dirs.collections,
            &dirs.git,
        ] {
            fs::create_dir_all(dir)?;
        }

        Ok(dirs)
    }
}

/// Run a full sync of the requested content kinds
pub async fn run(options: SyncOptions) -> Result<(), Error> {
    info!(
        "syncing {} to {} collections:{} roles:{} latest:{}",
        options.server,
        options.dest.display(),
        options.collections_only,
        options.roles_only,
        options.latest_only
    );
    if options.artifacts_only {
        debug!("artifact bodies are always synced; --artifacts adds nothing here");
    }

    let dirs = Arc::new(Dirs::create(&options.dest)?);

    let client = Arc::new(
        CachedGalaxyClient::new(
            options.server.clone(),
            options.auth_url.as_deref(),
            options.token.as_deref(),
            options.api_prefix.clone(),
            dirs.cache.clone(),
        )
        .await?,
    );

    let requirements = match &options.requirements_file {
        Some(path) => Some(Requirements::from_file(path)?),
        None => None,
    };

    if options.roles_only || !options.collections_only {
        sync_all_roles(&options, &dirs, &client, requirements.as_ref()).await?;
    }

    if options.collections_only || !options.roles_only {
        sync_all_collections(&options, &dirs, &client, requirements.as_ref()).await?;
    }

    Ok(())
}

/// (namespace, name) pairs to walk: either the CLI filter or one pair per
/// requirements entry
fn targets(
    filter: (&Option<String>, &Option<String>),
    named: Option<Vec<String>>,
) -> Vec<(Option<String>, Option<String>)> {
    match named {
        Some(names) => names
            .iter()
            .filter_map(|fqn| {
                let (namespace, name) = fqn.split_once('.')?;
                Some((Some(namespace.to_owned()), Some(name.to_owned())))
            })
            .collect(),
        None => vec![(filter.0.clone(), filter.1.clone())],
    }
}

async fn sync_all_roles(
    options: &SyncOptions,
    dirs: &Arc<Dirs>,
    client: &Arc<CachedGalaxyClient>,
    requirements: Option<&Requirements>,
) -> Result<(), Error> {
    let named = requirements.map(|reqs| reqs.roles.iter().map(|r| r.name.clone()).collect());

    let mut all_roles = vec![];
    for (namespace, name) in targets((&options.namespace, &options.name), named) {
        all_roles.extend(
            client
                .roles(namespace.as_deref(), name.as_deref(), options.latest_only)
                .await?,
        );
    }

    all_roles.sort_by(|a, b| {
        (a.github_user.as_str(), a.github_repo.as_str())
            .cmp(&(b.github_user.as_str(), b.github_repo.as_str()))
    });
    info!("{} total roles", all_roles.len());

    let file_set = Arc::new(FileSet::index(&dirs.roles)?);
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));

    let handles: Vec<_> = all_roles
        .into_iter()
        .map(|role| {
            let client = Arc::clone(client);
            let dirs = Arc::clone(dirs);
            let file_set = Arc::clone(&file_set);
            let semaphore = Arc::clone(&semaphore);
            let latest_only = options.latest_only;
            let version = options.version.clone();

            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                roles::sync_role(&client, &dirs, &file_set, role, latest_only, version.as_deref())
                    .await;
            })
        })
        .collect();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("role worker panicked: {e}");
        }
    }

    Ok(())
}

async fn sync_all_collections(
    options: &SyncOptions,
    dirs: &Arc<Dirs>,
    client: &Arc<CachedGalaxyClient>,
    requirements: Option<&Requirements>,
) -> Result<(), Error> {
    let named = requirements.map(|reqs| reqs.collections.iter().map(|c| c.name.clone()).collect());

    let mut details = vec![];
    for (namespace, name) in targets((&options.namespace, &options.name), named) {
        details.extend(
            client
                .collections(namespace.as_deref(), name.as_deref(), options.latest_only)
                .await?,
        );
    }

    if let Some(version) = &options.version {
        details.retain(|detail| detail.version == *version);
    }
    info!("{} total collection versions", details.len());

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));

    let handles: Vec<_> = details
        .into_iter()
        .map(|detail| {
            let client = Arc::clone(client);
            let dirs = Arc::clone(dirs);
            let semaphore = Arc::clone(&semaphore);

            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                collections::sync_collection(&client, &dirs, detail).await;
            })
        })
        .collect();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("collection worker panicked: {e}");
        }
    }

    Ok(())
}

/// A snapshot of the artifact directory taken once at startup, so the
/// per-role commit short-circuit glob never rescans the tree.
#[derive(Debug, Default)]
pub struct FileSet {
    names: Vec<String>,
}

impl FileSet {
    /// Index every file under `dir` (relative paths)
    pub fn index(dir: &Path) -> io::Result<Self> {
        let mut names = vec![];
        let mut queue = vec![dir.to_path_buf()];

        while let Some(current) = queue.pop() {
            for entry in fs::read_dir(&current)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    queue.push(path);
                } else if let Ok(relative) = path.strip_prefix(dir) {
                    names.push(relative.to_string_lossy().into_owned());
                }
            }
        }

        names.sort();
        Ok(Self { names })
    }

    /// Files matching a glob pattern; `*` does not cross `/`
    pub fn find_by_glob(&self, pattern: &str) -> Vec<String> {
        let Ok(pattern) = Pattern::new(pattern) else {
            return vec![];
        };
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };

        self.names
            .iter()
            .filter(|name| pattern.matches_with(name, options))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),

    #[error("upstream: {0}")]
    Galaxy(#[from] galaxy::Error),

    #[error("fetch: {0}")]
    Fetch(#[from] fetch::Error),

    #[error("url failed HEAD check: {0}")]
    HeadFailed(String),

    #[error("requirements: {0}")]
    Requirements(#[from] requirements::Error),

    #[error("descriptor: {0}")]
    Descriptor(#[from] descriptor::Error),

    #[error("git: {0}")]
    Git(#[from] git::Error),
}
