// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The repository wire format: four index blobs plus `repometa.json`.
//!
//! Manifest blobs are gzipped tars of one JSON document per artifact.
//! File-inventory blobs are gzip streams of consecutive self-delimiting
//! binary frames, each frame a batch of entries, so readers and writers
//! never hold the whole catalog in one allocation.

use std::io::{self, Read, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use fs_err as fs;
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::client::{ArtifactKind, RepoClient};

pub mod client;
pub mod create;

pub const REPO_META: &str = "repometa.json";
pub const COLLECTION_MANIFESTS: &str = "collection_manifests.tar.gz";
pub const COLLECTION_FILES: &str = "collection_files.tar.gz";
pub const ROLE_MANIFESTS: &str = "role_manifests.tar.gz";
pub const ROLE_FILES: &str = "role_files.tar.gz";

/// Cap on entries per binary frame, bounding peak memory on both ends
pub const FRAME_ENTRIES: usize = 1_000_000;

/// The root manifest of a repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoMeta {
    pub date: String,
    pub collection_manifests: RepoMetaFile,
    pub collection_files: RepoMetaFile,
    pub role_manifests: RepoMetaFile,
    pub role_files: RepoMetaFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoMetaFile {
    pub date: String,
    pub filename: String,
}

impl RepoMeta {
    /// A fresh root manifest stamped with the current UTC time
    pub fn now() -> Self {
        let date = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let file = |filename: &str| RepoMetaFile {
            date: date.clone(),
            filename: filename.to_owned(),
        };

        Self {
            collection_manifests: file(COLLECTION_MANIFESTS),
            collection_files: file(COLLECTION_FILES),
            role_manifests: file(ROLE_MANIFESTS),
            role_files: file(ROLE_FILES),
            date,
        }
    }

    pub fn read(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write canonical (2-space indented) JSON
    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// A collection's `MANIFEST.json`, reduced to the fields the resolver
/// consumes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionManifest {
    pub collection_info: CollectionInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Keyed by fully-qualified name, valued by constraint
    #[serde(default)]
    pub dependencies: std::collections::BTreeMap<String, String>,
}

/// A collection's `FILES.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesMeta {
    #[serde(default)]
    pub files: Vec<FileInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ftype: String,
    #[serde(default)]
    pub chksum_sha256: Option<String>,
}

/// One file-inventory entry: answers "which artifact carries this file"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub filename: String,
    pub filetype: String,
    pub chksum_sha256: String,
}

/// Write a manifest blob: a gzipped tar with one JSON file per item
pub fn write_manifest_blob<T: Serialize>(items: &[T], path: &Path) -> Result<(), Error> {
    let file = fs::File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (ix, item) in items.iter().enumerate() {
        let json = serde_json::to_vec(item)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(json.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, format!("manifest_{ix}.json"), json.as_slice())?;
    }

    builder.into_inner()?.finish()?.flush()?;
    Ok(())
}

/// Read a manifest blob back. Entries that fail to decode are logged and
/// skipped; the rest of the blob is still usable.
pub fn read_manifest_blob<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, Error> {
    let file = fs::File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let mut items = vec![];
    for entry in archive.entries()? {
        let mut entry = entry?;
        let mut body = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut body)?;

        match serde_json::from_slice(&body) {
            Ok(item) => items.push(item),
            Err(e) => warn!("skipping undecodable manifest in {}: {e}", path.display()),
        }
    }

    Ok(items)
}

/// Write a file-inventory blob: gzip over consecutive bincode frames
pub fn write_file_entries(entries: &[FileEntry], path: &Path, frame_entries: usize) -> Result<(), Error> {
    let file = fs::File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());

    for frame in entries.chunks(frame_entries.max(1)) {
        bincode::serialize_into(&mut encoder, frame)?;
    }

    encoder.finish()?.flush()?;
    Ok(())
}

/// Read every frame of a file-inventory blob
pub fn read_file_entries(path: &Path) -> Result<Vec<FileEntry>, Error> {
    let file = fs::File::open(path)?;
    let mut decoder = GzDecoder::new(file);

    let mut entries = vec![];
    loop {
        match bincode::deserialize_from::<_, Vec<FileEntry>>(&mut decoder) {
            Ok(frame) => entries.extend(frame),
            Err(e) => {
                if frame_end(&e) {
                    break;
                }
                return Err(Error::Bincode(e));
            }
        }
    }

    Ok(entries)
}

/// Frames are self-delimiting, so the only clean way out is EOF at a
/// frame boundary
fn frame_end(error: &bincode::Error) -> bool {
    matches!(
        &**error,
        bincode::ErrorKind::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof
    )
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed frame: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("archive: {0}")]
    Archive(#[from] crate::archive::Error),

    #[error("fetch: {0}")]
    Fetch(#[from] crate::fetch::Error),

    #[error("{0} is neither a repository URL nor a directory")]
    UnsupportedSource(String),

    #[error("{0} is not a directory")]
    NotADirectory(String),
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(n: u32) -> FileEntry {
        FileEntry {
            namespace: "acme".into(),
            name: "util".into(),
            version: "1.0.0".into(),
            filename: format!("tasks/file_{n}.yml"),
            filetype: "file".into(),
            chksum_sha256: format!("{n:064x}"),
        }
    }

    #[test]
    fn manifest_blob_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COLLECTION_MANIFESTS);

        let manifests = vec![
            CollectionManifest {
                collection_info: CollectionInfo {
                    namespace: "acme".into(),
                    name: "util".into(),
                    version: "1.0.0".into(),
                    dependencies: [("acme.base".to_owned(), ">=1.0.0".to_owned())].into(),
                },
            },
            CollectionManifest::default(),
        ];

        write_manifest_blob(&manifests, &path).unwrap();
        let read: Vec<CollectionManifest> = read_manifest_blob(&path).unwrap();

        assert_eq!(read.len(), 2);
        assert_eq!(read[0].collection_info.namespace, "acme");
        assert_eq!(
            read[0].collection_info.dependencies.get("acme.base").unwrap(),
            ">=1.0.0"
        );
    }

    #[test]
    fn file_entries_round_trip_across_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COLLECTION_FILES);

        let entries: Vec<FileEntry> = (0..10).map(entry).collect();

        // tiny frame size forces multiple frames
        write_file_entries(&entries, &path, 3).unwrap();
        let read = read_file_entries(&path).unwrap();

        assert_eq!(read, entries);
    }

    #[test]
    fn empty_inventory_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ROLE_FILES);

        write_file_entries(&[], &path, FRAME_ENTRIES).unwrap();
        assert!(read_file_entries(&path).unwrap().is_empty());
    }

    #[test]
    fn repo_meta_round_trips_with_canonical_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REPO_META);

        let meta = RepoMeta::now();
        meta.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("  \"date\""));

        let read = RepoMeta::read(&path).unwrap();
        assert_eq!(read.date, meta.date);
        assert_eq!(read.collection_files.filename, COLLECTION_FILES);
        assert!(chrono::DateTime::parse_from_rfc3339(&read.date).is_ok());
    }
}
