// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Read access to a published repository, local or remote.
//!
//! Both backings materialize the index into the cache directory and then
//! answer every question from there, so the resolver and the package
//! manager never care which one they hold.

use std::path::{Path, PathBuf};

use fs_err as fs;
use log::{debug, info};
use url::Url;

use crate::fetch::Fetcher;
use crate::repository::{
    read_manifest_blob, Error, RepoMeta, COLLECTION_FILES, COLLECTION_MANIFESTS, REPO_META,
    ROLE_FILES, ROLE_MANIFESTS,
};
use crate::resolver;
use crate::spec::InstallSpec;
use crate::descriptor::RoleDescriptor;
use crate::repository::CollectionManifest;

const BLOBS: [&str; 4] = [
    COLLECTION_MANIFESTS,
    COLLECTION_FILES,
    ROLE_MANIFESTS,
    ROLE_FILES,
];

/// The two artifact kinds a repository serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Collection,
    Role,
}

impl ArtifactKind {
    pub fn dir(&self) -> &'static str {
        match self {
            ArtifactKind::Collection => "collections",
            ArtifactKind::Role => "roles",
        }
    }
}

/// A repository backing. Selection happens once, from the shape of the
/// source string; everything downstream is backing-agnostic.
pub enum RepoClient {
    Local { base: PathBuf, cache: PathBuf },
    Remote { base_url: String, cache: PathBuf, fetcher: Fetcher },
}

impl RepoClient {
    /// `source` may be a repository URL or a local directory
    pub fn new(source: &str, cache: &Path) -> Result<Self, Error> {
        if is_url(source) {
            return Ok(RepoClient::Remote {
                base_url: source.trim_end_matches('/').to_owned(),
                cache: cache.to_path_buf(),
                fetcher: Fetcher::new(None),
            });
        }

        let base = Path::new(source);
        if base.is_dir() {
            return Ok(RepoClient::Local {
                base: base.to_path_buf(),
                cache: cache.to_path_buf(),
            });
        }

        Err(Error::UnsupportedSource(source.to_owned()))
    }

    pub fn cache_dir(&self) -> &Path {
        match self {
            RepoClient::Local { cache, .. } => cache,
            RepoClient::Remote { cache, .. } => cache,
        }
    }

    /// The date the repository currently advertises
    pub async fn repo_meta_date(&self) -> Result<String, Error> {
        match self {
            RepoClient::Local { base, .. } => Ok(RepoMeta::read(&base.join(REPO_META))?.date),
            RepoClient::Remote { base_url, fetcher, .. } => {
                let body = fetcher.get_bytes(&format!("{base_url}/{REPO_META}")).await?;
                let meta: RepoMeta = serde_json::from_slice(&body)?;
                Ok(meta.date)
            }
        }
    }

    /// Materialize `repometa.json` and all four index blobs into the
    /// cache directory
    pub async fn fetch_repo_meta(&self) -> Result<(), Error> {
        fs::create_dir_all(self.cache_dir())?;

        match self {
            RepoClient::Local { base, cache } => {
                info!("copying repository index from {}", base.display());

                let meta = RepoMeta::read(&base.join(REPO_META))?;
                fs::copy(base.join(REPO_META), cache.join(REPO_META))?;

                for file in [
                    &meta.collection_manifests,
                    &meta.collection_files,
                    &meta.role_manifests,
                    &meta.role_files,
                ] {
                    let src = base.join(&file.filename);
                    if src.is_file() {
                        debug!("{} -> {}", src.display(), cache.display());
                        fs::copy(&src, cache.join(&file.filename))?;
                    }
                }
            }
            RepoClient::Remote { base_url, cache, fetcher } => {
                info!("fetching repository index from {base_url}");

                fetcher
                    .download_to(&format!("{base_url}/{REPO_META}"), &cache.join(REPO_META))
                    .await?;

                for blob in BLOBS {
                    fetcher
                        .download_to(&format!("{base_url}/{blob}"), &cache.join(blob))
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Resolve a collection install plan from the cached manifest blob
    pub fn resolve_collection_deps(&self, spec: &InstallSpec) -> Result<Vec<InstallSpec>, Error> {
        let manifests: Vec<CollectionManifest> =
            read_manifest_blob(&self.cache_dir().join(COLLECTION_MANIFESTS))?;
        Ok(resolver::resolve(spec, &manifests))
    }

    /// Resolve a role install plan from the cached manifest blob
    pub fn resolve_role_deps(&self, spec: &InstallSpec) -> Result<Vec<InstallSpec>, Error> {
        let manifests: Vec<RoleDescriptor> =
            read_manifest_blob(&self.cache_dir().join(ROLE_MANIFESTS))?;
        Ok(resolver::resolve(spec, &manifests))
    }

    /// Cache-aware artifact getter: hand back the local tarball for a
    /// resolved spec, transferring it first when absent
    pub async fn cache_file_for(
        &self,
        spec: &InstallSpec,
        kind: ArtifactKind,
    ) -> Result<PathBuf, Error> {
        let filename = format!("{}-{}-{}.tar.gz", spec.namespace, spec.name, spec.version);
        let target = self.cache_dir().join(kind.dir()).join(&filename);

        if target.is_file() {
            return Ok(target);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        match self {
            RepoClient::Local { base, .. } => {
                let src = base.join(kind.dir()).join(&filename);
                debug!("{} -> {}", src.display(), target.display());
                fs::copy(&src, &target)?;
            }
            RepoClient::Remote { base_url, fetcher, .. } => {
                let url = format!("{base_url}/{}/{filename}", kind.dir());
                fetcher.download_to(&url, &target).await?;
            }
        }

        Ok(target)
    }
}

/// A source is remote when it parses as an http(s) URL with a host
fn is_url(source: &str) -> bool {
    match Url::parse(source) {
        Ok(url) => url.scheme().starts_with("http") && url.has_host(),
        Err(_) => false,
    }
}
