// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The package manager: executes an install plan into the well-known
//! layout and keeps the local index cache fresh.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use fs_err as fs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive;
use crate::repository::{self, RepoClient, RepoMeta, REPO_META};
use crate::spec::InstallSpec;

/// Install-time metadata written beside an installed collection
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionInstallInfo {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub install_date: String,
}

/// Install-time metadata written inside an installed role
#[derive(Debug, Serialize, Deserialize)]
pub struct RoleInstallInfo {
    pub install_date: String,
    pub version: String,
}

pub struct PackageManager {
    base_path: PathBuf,
    cache_path: PathBuf,
    repo_meta: Option<RepoMeta>,
}

impl PackageManager {
    pub fn open(base_path: impl Into<PathBuf>, cache_path: impl Into<PathBuf>) -> Result<Self, Error> {
        let base_path = base_path.into();
        let cache_path = cache_path.into();

        fs::create_dir_all(&base_path)?;
        fs::create_dir_all(&cache_path)?;

        let meta_file = cache_path.join(REPO_META);
        let repo_meta = meta_file.is_file().then(|| RepoMeta::read(&meta_file)).transpose()?;

        Ok(Self {
            base_path,
            cache_path,
            repo_meta,
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Is the cached index missing or older than what the repository
    /// advertises?
    pub async fn needs_repo_refresh(&self, client: &RepoClient) -> Result<bool, Error> {
        let Some(local) = &self.repo_meta else {
            debug!("no cached repository index");
            return Ok(true);
        };

        let remote_date = client.repo_meta_date().await?;

        let local = DateTime::parse_from_rfc3339(&local.date);
        let remote = DateTime::parse_from_rfc3339(&remote_date);
        match (local, remote) {
            (Ok(local), Ok(remote)) => Ok(local < remote),
            // An unreadable date on either side: refetching is the fix
            _ => Ok(true),
        }
    }

    /// Refresh the cached index when stale
    pub async fn refresh_if_stale(&mut self, client: &RepoClient) -> Result<(), Error> {
        if self.needs_repo_refresh(client).await? {
            info!("updating local repository cache");
            client.fetch_repo_meta().await?;
            self.repo_meta = Some(RepoMeta::read(&self.cache_path.join(REPO_META))?);
        } else {
            debug!("local repository cache is current");
        }
        Ok(())
    }

    /// Extract a collection artifact into the install layout and record
    /// the install metadata. A previously installed version is replaced.
    pub fn install_collection(&self, spec: &InstallSpec, artifact: &Path) -> Result<(), Error> {
        let root = self.base_path.join("collections").join("ansible_collections");
        let dest = root.join(&spec.namespace).join(&spec.name);

        info!("installing {spec} into {}", dest.display());

        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }
        self.remove_collection_info_dirs(&root, spec)?;

        archive::extract_tree(artifact, &dest)?;

        let info_dir = root.join(format!("{}.{}-{}.info", spec.namespace, spec.name, spec.version));
        fs::create_dir_all(&info_dir)?;
        let info = CollectionInstallInfo {
            namespace: spec.namespace.clone(),
            name: spec.name.clone(),
            version: spec.version.clone(),
            install_date: human_timestamp(),
        };
        fs::write(info_dir.join("GALAXY.yml"), serde_json::to_string_pretty(&info)?)?;

        Ok(())
    }

    /// Extract a role artifact into the install layout and record the
    /// install metadata. A previously installed version is replaced.
    pub fn install_role(&self, spec: &InstallSpec, artifact: &Path) -> Result<(), Error> {
        let dest = self
            .base_path
            .join("roles")
            .join(format!("{}.{}", spec.namespace, spec.name));

        info!("installing {spec} into {}", dest.display());

        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }

        archive::extract_tree_role(artifact, &dest)?;

        let meta_dir = dest.join("meta");
        fs::create_dir_all(&meta_dir)?;
        let info = RoleInstallInfo {
            install_date: human_timestamp(),
            version: spec.version.clone(),
        };
        fs::write(
            meta_dir.join(".galaxy_install_info"),
            serde_yaml::to_string(&info)?,
        )?;

        Ok(())
    }

    /// Drop every `<ns>.<name>-<any version>.info` directory so only one
    /// installed version is ever recorded
    fn remove_collection_info_dirs(&self, root: &Path, spec: &InstallSpec) -> Result<(), Error> {
        if !root.is_dir() {
            return Ok(());
        }

        let prefix = format!("{}.{}-", spec.namespace, spec.name);
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(".info") {
                fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }
}

/// The install-date format carried in metadata sidecars: a human-readable
/// local timestamp with no timezone
fn human_timestamp() -> String {
    Local::now().format("%c").to_string()
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),

    #[error("archive: {0}")]
    Archive(#[from] archive::Error),

    #[error("repository: {0}")]
    Repository(#[from] repository::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn write_archive(path: &Path, entries: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let enc = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(enc);
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
    }

    #[test]
    fn collection_install_layout() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("acme-util-1.0.0.tar.gz");
        write_archive(&artifact, &[("MANIFEST.json", "{}"), ("plugins/x.py", "pass")]);

        let mgr = PackageManager::open(dir.path().join("dest"), dir.path().join("cache")).unwrap();
        let spec = InstallSpec::new("acme", "util", "1.0.0");
        mgr.install_collection(&spec, &artifact).unwrap();

        let root = dir.path().join("dest/collections/ansible_collections");
        assert!(root.join("acme/util/MANIFEST.json").is_file());
        assert!(root.join("acme/util/plugins/x.py").is_file());

        let galaxy = root.join("acme.util-1.0.0.info/GALAXY.yml");
        let info: CollectionInstallInfo =
            serde_json::from_str(&std::fs::read_to_string(galaxy).unwrap()).unwrap();
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.namespace, "acme");
    }

    #[test]
    fn reinstall_replaces_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let v1 = dir.path().join("acme-util-1.0.0.tar.gz");
        let v2 = dir.path().join("acme-util-2.0.0.tar.gz");
        write_archive(&v1, &[("MANIFEST.json", "{}"), ("old.txt", "x")]);
        write_archive(&v2, &[("MANIFEST.json", "{}")]);

        let mgr = PackageManager::open(dir.path().join("dest"), dir.path().join("cache")).unwrap();
        mgr.install_collection(&InstallSpec::new("acme", "util", "1.0.0"), &v1).unwrap();
        mgr.install_collection(&InstallSpec::new("acme", "util", "2.0.0"), &v2).unwrap();

        let root = dir.path().join("dest/collections/ansible_collections");
        assert!(!root.join("acme/util/old.txt").exists());
        assert!(root.join("acme.util-2.0.0.info").is_dir());
        // only one version is recorded at a time
        assert!(!root.join("acme.util-1.0.0.info").exists());
    }

    #[test]
    fn role_install_layout_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("acme-server-1.2.0.tar.gz");
        write_archive(
            &artifact,
            &[
                ("ansible-server-abc123/meta/main.yml", "galaxy_info:\n"),
                ("ansible-server-abc123/tasks/main.yml", "---\n"),
            ],
        );

        let mgr = PackageManager::open(dir.path().join("dest"), dir.path().join("cache")).unwrap();
        let spec = InstallSpec::new("acme", "server", "1.2.0");
        mgr.install_role(&spec, &artifact).unwrap();

        let role_dir = dir.path().join("dest/roles/acme.server");
        assert!(role_dir.join("tasks/main.yml").is_file());

        let info: RoleInstallInfo = serde_yaml::from_str(
            &std::fs::read_to_string(role_dir.join("meta/.galaxy_install_info")).unwrap(),
        )
        .unwrap();
        assert_eq!(info.version, "1.2.0");
        assert!(!info.install_date.is_empty());
    }
}
