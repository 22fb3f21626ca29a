// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Build the repository index over a directory of artifacts.

use std::path::Path;

use log::{info, warn};
use semver::Version;

use crate::archive;
use crate::descriptor::RoleDescriptor;
use crate::repository::{
    self, CollectionManifest, Error, FileEntry, FilesMeta, RepoMeta, COLLECTION_FILES,
    COLLECTION_MANIFESTS, FRAME_ENTRIES, REPO_META, ROLE_FILES, ROLE_MANIFESTS,
};

/// Index `dest/collections` and `dest/roles`, writing the four blobs and
/// `repometa.json` (last) into `dest`.
pub fn create_repo(dest: &Path, roles_only: bool, collections_only: bool) -> Result<(), Error> {
    info!("creating repository metadata in {}", dest.display());

    if !dest.is_dir() {
        return Err(Error::NotADirectory(dest.display().to_string()));
    }

    if !roles_only {
        process_collections(dest)?;
    }
    if !collections_only {
        process_roles(dest)?;
    }

    RepoMeta::now().write(&dest.join(REPO_META))?;
    Ok(())
}

fn process_collections(base: &Path) -> Result<(), Error> {
    let collections_dir = base.join("collections");
    if !collections_dir.is_dir() {
        warn!("{} is not a directory", collections_dir.display());
        return Ok(());
    }

    let mut manifests = vec![];
    let mut inventory = vec![];

    for artifact in archive::find_tar_gz(&collections_dir)? {
        info!("indexing {}", artifact.display());

        let extracted = match archive::extract_named(&artifact, &["MANIFEST.json", "FILES.json"]) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("failed to read {}: {e}", artifact.display());
                continue;
            }
        };

        let manifest: CollectionManifest = match extracted
            .get("MANIFEST.json")
            .map(|body| serde_json::from_slice(body))
        {
            Some(Ok(manifest)) => manifest,
            Some(Err(e)) => {
                warn!("undecodable MANIFEST.json in {}: {e}", artifact.display());
                continue;
            }
            None => {
                warn!("no MANIFEST.json in {}", artifact.display());
                continue;
            }
        };

        let files: FilesMeta = match extracted
            .get("FILES.json")
            .map(|body| serde_json::from_slice(body))
        {
            Some(Ok(files)) => files,
            Some(Err(e)) => {
                warn!("undecodable FILES.json in {}: {e}", artifact.display());
                continue;
            }
            None => FilesMeta::default(),
        };

        let info = &manifest.collection_info;
        for file in files.files {
            inventory.push(FileEntry {
                namespace: info.namespace.clone(),
                name: info.name.clone(),
                version: info.version.clone(),
                filename: file.name,
                filetype: file.ftype,
                chksum_sha256: file.chksum_sha256.unwrap_or_default(),
            });
        }
        manifests.push(manifest);
    }

    info!("{} collection manifests, {} files", manifests.len(), inventory.len());
    repository::write_manifest_blob(&manifests, &base.join(COLLECTION_MANIFESTS))?;
    repository::write_file_entries(&inventory, &base.join(COLLECTION_FILES), FRAME_ENTRIES)?;
    Ok(())
}

fn process_roles(base: &Path) -> Result<(), Error> {
    let roles_dir = base.join("roles");
    if !roles_dir.is_dir() {
        warn!("{} is not a directory", roles_dir.display());
        return Ok(());
    }

    let mut manifests = vec![];
    let mut inventory = vec![];

    for artifact in archive::find_tar_gz(&roles_dir)? {
        info!("indexing {}", artifact.display());

        let mut meta = match RoleDescriptor::from_archive(&artifact) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("rejecting {}: {e}", artifact.display());
                mark_bad(&artifact, &e.to_string());
                continue;
            }
        };

        // Authors rarely declare identity; the artifact filename is
        // authoritative when fields are missing.
        let parsed = split_artifact_name(&artifact);
        let info = &mut meta.galaxy_info;
        if info.namespace.is_empty() {
            info.namespace = parsed.as_ref().map(|p| p.0.clone()).unwrap_or_default();
        }
        if info.role_name.is_empty() {
            info.role_name = parsed.as_ref().map(|p| p.1.clone()).unwrap_or_default();
        }
        if info.version.is_empty() {
            info.version = parsed.as_ref().map(|p| p.2.clone()).unwrap_or_default();
        }

        match archive::list_filenames(&artifact) {
            Ok(names) => {
                for name in names {
                    inventory.push(FileEntry {
                        namespace: meta.galaxy_info.namespace.clone(),
                        name: meta.galaxy_info.role_name.clone(),
                        version: meta.galaxy_info.version.clone(),
                        filename: archive::strip_first_component(&name),
                        filetype: "file".to_owned(),
                        chksum_sha256: String::new(),
                    });
                }
            }
            Err(e) => warn!("failed to list {}: {e}", artifact.display()),
        }

        manifests.push(meta);
    }

    info!("{} role manifests, {} files", manifests.len(), inventory.len());
    repository::write_manifest_blob(&manifests, &base.join(ROLE_MANIFESTS))?;
    repository::write_file_entries(&inventory, &base.join(ROLE_FILES), FRAME_ENTRIES)?;
    Ok(())
}

/// Record a rejected artifact so later runs skip it
fn mark_bad(artifact: &Path, reason: &str) {
    let bad = artifact.with_extension("").with_extension("bad");
    if let Err(e) = fs_err::write(&bad, format!("{reason}\n")) {
        warn!("failed to write {}: {e}", bad.display());
    }
}

/// Split `<ns>-<name>-<ver>.tar.gz` into its parts. The name may itself
/// contain hyphens, so the version is found by scanning for the first
/// hyphen boundary whose remainder parses as semver.
pub fn split_artifact_name(artifact: &Path) -> Option<(String, String, String)> {
    let stem = artifact.file_name()?.to_str()?.strip_suffix(".tar.gz")?;

    let (namespace, rest) = stem.split_once('-')?;

    let mut boundary = 0;
    while let Some(next) = rest[boundary..].find('-') {
        let at = boundary + next;
        let candidate = &rest[at + 1..];
        if Version::parse(candidate).is_ok() {
            return Some((
                namespace.to_owned(),
                rest[..at].to_owned(),
                candidate.to_owned(),
            ));
        }
        boundary = at + 1;
    }

    None
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::path::PathBuf;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;
    use crate::repository::read_file_entries;
    use crate::repository::read_manifest_blob;

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

    fn collection_fixture(dir: &Path) -> PathBuf {
        let collections = dir.join("collections");
        std::fs::create_dir_all(&collections).unwrap();
        let artifact = collections.join("acme-util-1.0.0.tar.gz");
        write_archive(
            &artifact,
            &[
                (
                    "MANIFEST.json",
                    r#"{"collection_info": {"namespace": "acme", "name": "util", "version": "1.0.0", "dependencies": {"acme.base": ">=1.0.0"}}}"#,
                ),
                (
                    "FILES.json",
                    r#"{"files": [{"name": "tasks/main.yml", "ftype": "file", "chksum_sha256": "aa"}]}"#,
                ),
            ],
        );
        artifact
    }

    #[test]
    fn indexes_collections_and_roles() {
        let dir = tempfile::tempdir().unwrap();
        collection_fixture(dir.path());

        let roles = dir.path().join("roles");
        std::fs::create_dir_all(&roles).unwrap();
        write_archive(
            &roles.join("acme-server-2.0.0.tar.gz"),
            &[
                ("ansible-server-2.0.0/meta/main.yml", "galaxy_info:\n  author: a\n"),
                ("ansible-server-2.0.0/tasks/main.yml", "---\n"),
            ],
        );

        create_repo(dir.path(), false, false).unwrap();

        let manifests: Vec<CollectionManifest> =
            read_manifest_blob(&dir.path().join(COLLECTION_MANIFESTS)).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].collection_info.version, "1.0.0");

        let files = read_file_entries(&dir.path().join(COLLECTION_FILES)).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "tasks/main.yml");
        assert_eq!(files[0].chksum_sha256, "aa");

        // identity derived from the artifact filename
        let roles_meta: Vec<RoleDescriptor> =
            read_manifest_blob(&dir.path().join(ROLE_MANIFESTS)).unwrap();
        assert_eq!(roles_meta.len(), 1);
        assert_eq!(roles_meta[0].galaxy_info.namespace, "acme");
        assert_eq!(roles_meta[0].galaxy_info.role_name, "server");
        assert_eq!(roles_meta[0].galaxy_info.version, "2.0.0");

        // leading path component stripped from role file entries
        let role_files = read_file_entries(&dir.path().join(ROLE_FILES)).unwrap();
        assert!(role_files.iter().any(|f| f.filename == "tasks/main.yml"));

        let meta = RepoMeta::read(&dir.path().join(REPO_META)).unwrap();
        assert_eq!(meta.collection_manifests.filename, COLLECTION_MANIFESTS);
    }

    #[test]
    fn undecodable_manifest_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        collection_fixture(dir.path());
        write_archive(
            &dir.path().join("collections").join("bad-artifact-1.0.0.tar.gz"),
            &[("MANIFEST.json", "not json at all")],
        );

        create_repo(dir.path(), false, true).unwrap();

        let manifests: Vec<CollectionManifest> =
            read_manifest_blob(&dir.path().join(COLLECTION_MANIFESTS)).unwrap();
        assert_eq!(manifests.len(), 1);
    }

    #[test]
    fn unparsable_descriptor_marks_artifact_bad() {
        let dir = tempfile::tempdir().unwrap();
        let roles = dir.path().join("roles");
        std::fs::create_dir_all(&roles).unwrap();
        write_archive(
            &roles.join("acme-broken-1.0.0.tar.gz"),
            &[("x/meta/main.yml", "{{{{ not yaml")],
        );

        create_repo(dir.path(), true, false).unwrap();

        let manifests: Vec<RoleDescriptor> =
            read_manifest_blob(&dir.path().join(ROLE_MANIFESTS)).unwrap();
        assert!(manifests.is_empty());
        assert!(roles.join("acme-broken-1.0.0.bad").is_file());
    }

    #[test]
    fn artifact_names_split_through_hyphenated_names() {
        let split = |name: &str| split_artifact_name(Path::new(name));

        assert_eq!(
            split("acme-util-1.0.0.tar.gz"),
            Some(("acme".into(), "util".into(), "1.0.0".into()))
        );
        assert_eq!(
            split("0ccupi3R-ansible-kibana-7.6.1.tar.gz"),
            Some(("0ccupi3R".into(), "ansible-kibana".into(), "7.6.1".into()))
        );
        assert_eq!(
            split("acme-util-0.0.0+20240101000000-abc123.tar.gz"),
            Some((
                "acme".into(),
                "util".into(),
                "0.0.0+20240101000000-abc123".into()
            ))
        );
        assert_eq!(split("nodashes.tar.gz"), None);
        assert_eq!(split("not-an-archive.zip"), None);
    }
}
