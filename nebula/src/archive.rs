// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Reading and unpacking gzipped tar artifacts.

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use fs_err as fs;
use tar::Archive;
use thiserror::Error;

fn open(archive: &Path) -> Result<Archive<GzDecoder<fs::File>>, Error> {
    let file = fs::File::open(archive)?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// List every entry path inside the archive
pub fn list_filenames(archive: &Path) -> Result<Vec<String>, Error> {
    let mut names = vec![];
    for entry in open(archive)?.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Extract the named entries into memory, keyed by entry path.
/// Entries that are absent from the archive are absent from the map.
pub fn extract_named(archive: &Path, names: &[&str]) -> Result<HashMap<String, Vec<u8>>, Error> {
    let mut wanted: Vec<&str> = names.to_vec();
    let mut found = HashMap::new();

    for entry in open(archive)?.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        if let Some(ix) = wanted.iter().position(|name| *name == path) {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            found.insert(path, buf);
            wanted.swap_remove(ix);
            if wanted.is_empty() {
                break;
            }
        }
    }

    Ok(found)
}

/// Extract the first entry whose path satisfies the predicate
pub fn extract_first_match(
    archive: &Path,
    predicate: impl Fn(&str) -> bool,
) -> Result<Option<(String, Vec<u8>)>, Error> {
    for entry in open(archive)?.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        if entry.header().entry_type().is_file() && predicate(&path) {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            return Ok(Some((path, buf)));
        }
    }
    Ok(None)
}

/// Unpack the whole archive under `dest`
pub fn extract_tree(archive: &Path, dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest)?;
    open(archive)?.unpack(dest)?;
    Ok(())
}

/// Unpack a role archive under `dest`, normalizing the top-level directory.
///
/// Source tarballs carry an unstable prefix (`<repo>-<ref>/`), so the
/// archive is unpacked to scratch space first; the parent of the first
/// `meta` directory is taken as the effective root and its contents are
/// copied into `dest`.
pub fn extract_tree_role(archive: &Path, dest: &Path) -> Result<(), Error> {
    let scratch = tempfile::tempdir()?;
    open(archive)?.unpack(scratch.path())?;

    let root = find_meta_parent(scratch.path())?.ok_or(Error::NoRoleRoot)?;

    fs::create_dir_all(dest)?;
    copy_tree(&root, dest)?;
    Ok(())
}

/// Locate the parent directory of the first `meta` directory in the tree
fn find_meta_parent(dir: &Path) -> Result<Option<PathBuf>, Error> {
    let mut queue = vec![dir.to_path_buf()];
    while let Some(current) = queue.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                if entry.file_name() == "meta" {
                    return Ok(Some(current));
                }
                queue.push(path);
            }
        }
    }
    Ok(None)
}

/// Recursively copy `src` contents into `dest`
pub fn copy_tree(src: &Path, dest: &Path) -> Result<(), Error> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            fs::create_dir_all(&to)?;
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Recursively enumerate `*.tar.gz` files under `dir`
pub fn find_tar_gz(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut found = vec![];
    let mut queue = vec![dir.to_path_buf()];
    while let Some(current) = queue.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                queue.push(path);
            } else if path.to_string_lossy().ends_with(".tar.gz") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Drop the leading path component: `repo-abc/tasks/main.yml` → `tasks/main.yml`
pub fn strip_first_component(path: &str) -> String {
    match path.split_once('/') {
        Some((_, rest)) => rest.to_owned(),
        None => path.to_owned(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),

    #[error("role archive has no meta directory")]
    NoRoleRoot,
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
    fn lists_and_extracts_named_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("c.tar.gz");
        write_archive(
            &archive,
            &[("MANIFEST.json", "{}"), ("FILES.json", "{\"files\":[]}")],
        );

        let names = list_filenames(&archive).unwrap();
        assert_eq!(names, vec!["MANIFEST.json", "FILES.json"]);

        let map = extract_named(&archive, &["FILES.json", "missing.txt"]).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["FILES.json"], b"{\"files\":[]}");
    }

    #[test]
    fn role_tree_extraction_normalizes_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("r.tar.gz");
        write_archive(
            &archive,
            &[
                ("repo-deadbeef/meta/main.yml", "galaxy_info:\n"),
                ("repo-deadbeef/tasks/main.yml", "---\n"),
            ],
        );

        let dest = dir.path().join("out");
        extract_tree_role(&archive, &dest).unwrap();
        assert!(dest.join("meta/main.yml").is_file());
        assert!(dest.join("tasks/main.yml").is_file());
        assert!(!dest.join("repo-deadbeef").exists());
    }

    #[test]
    fn first_match_finds_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("r.tar.gz");
        write_archive(&archive, &[("x/meta/main.yml", "galaxy_info:\n")]);

        let (path, body) = extract_first_match(&archive, |p| p.ends_with("meta/main.yml"))
            .unwrap()
            .unwrap();
        assert_eq!(path, "x/meta/main.yml");
        assert_eq!(body, b"galaxy_info:\n");
    }

    #[test]
    fn strips_leading_component() {
        assert_eq!(strip_first_component("a/b/c"), "b/c");
        assert_eq!(strip_first_component("plain"), "plain");
    }
}
