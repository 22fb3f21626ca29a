// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The role descriptor: hand-authored metadata read from
//! `meta/main.yml` inside a role archive.
//!
//! Every polymorphic field (scalar vs list, string vs number, string
//! dependency vs mapping dependency) is normalized to one canonical shape
//! at parse time. Text that fails the first parse goes through the repair
//! passes once; text that still fails is rejected.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use thiserror::Error;

use crate::archive;

/// Parsed, normalized role descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleDescriptor {
    #[serde(default)]
    pub galaxy_info: GalaxyInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GalaxyInfo {
    #[serde(default, deserialize_with = "one_or_many")]
    pub author: Vec<String>,
    #[serde(default, deserialize_with = "scalar_to_string")]
    pub namespace: String,
    #[serde(default, deserialize_with = "scalar_to_string")]
    pub role_name: String,

    /// Not authored in descriptors; carried so index entries and
    /// synthesized snapshots have somewhere to record it.
    #[serde(default, deserialize_with = "scalar_to_string")]
    pub version: String,

    #[serde(default, deserialize_with = "scalar_to_string")]
    pub description: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub license: Vec<String>,
    #[serde(default, deserialize_with = "scalar_to_string")]
    pub min_ansible_version: String,
    #[serde(default, deserialize_with = "nullable_seq")]
    pub platforms: Vec<Platform>,
    #[serde(default, deserialize_with = "tags")]
    pub galaxy_tags: Vec<String>,
    #[serde(default, deserialize_with = "nullable_seq")]
    pub dependencies: Vec<RoleDependency>,
}

/// A bare `dependencies:` / `platforms:` key carries a null value; treat
/// it as the empty list.
fn nullable_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(vec![]),
        value => serde_yaml::from_value(value).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default, deserialize_with = "scalar_to_string")]
    pub name: String,
    #[serde(default, deserialize_with = "scalar_list")]
    pub versions: Vec<String>,
}

/// A role dependency in canonical mapping form
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoleDependency {
    pub src: String,
    pub name: String,
    pub version: String,
}

impl<'de> Deserialize<'de> for RoleDependency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => Ok(RoleDependency {
                src: s.clone(),
                name: s,
                version: String::new(),
            }),
            Value::Mapping(map) => {
                let field = |key: &str| -> String {
                    map.get(&Value::String(key.to_owned()))
                        .and_then(scalar)
                        .unwrap_or_default()
                };
                let name = {
                    let name = field("name");
                    // `role:` survives here when the repair passes never ran
                    if name.is_empty() { field("role") } else { name }
                };
                Ok(RoleDependency {
                    src: field("src"),
                    name,
                    version: field("version"),
                })
            }
            other => Err(serde::de::Error::custom(format!(
                "unsupported dependency shape: {other:?}"
            ))),
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accept a single scalar or a list of scalars
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(vec![]),
        Value::Sequence(seq) => Ok(seq.iter().filter_map(scalar).collect()),
        ref single => Ok(scalar(single).into_iter().collect()),
    }
}

/// Accept string, integer or float; normalize to string
fn scalar_to_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar(&value).unwrap_or_default())
}

/// Accept null, a bare scalar, or a list of scalars
fn scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(vec![]),
        Value::Sequence(seq) => Ok(seq.iter().filter_map(scalar).collect()),
        ref single => Ok(scalar(single).into_iter().collect()),
    }
}

/// Accept a list of tags or one multiline string of tags
fn tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(vec![]),
        Value::Sequence(seq) => Ok(seq.iter().filter_map(scalar).collect()),
        Value::String(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()),
        other => Err(serde::de::Error::custom(format!(
            "unsupported galaxy_tags shape: {other:?}"
        ))),
    }
}

impl RoleDescriptor {
    /// Parse descriptor text, falling back to the repair passes when the
    /// pristine text is rejected
    pub fn parse(text: &str) -> Result<Self, Error> {
        match serde_yaml::from_str(text) {
            Ok(parsed) => Ok(parsed),
            Err(first) => {
                let repaired = repair::repair(text);
                serde_yaml::from_str(&repaired).map_err(|_| Error::Unparsable(first))
            }
        }
    }

    /// Read and parse the descriptor embedded in a role archive
    pub fn from_archive(archive_path: &Path) -> Result<Self, Error> {
        let found = archive::extract_first_match(archive_path, |path| {
            path.ends_with("meta/main.yml") || path.ends_with("meta/main.yaml")
        })?;

        let (_, body) = found.ok_or(Error::MissingDescriptor)?;
        Self::parse(&String::from_utf8_lossy(&body))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("archive: {0}")]
    Archive(#[from] archive::Error),

    #[error("archive contains no meta/main.yml")]
    MissingDescriptor,

    #[error("descriptor unparsable after repair: {0}")]
    Unparsable(#[source] serde_yaml::Error),
}
