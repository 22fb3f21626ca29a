// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Wire types for the upstream index API.
//!
//! The v1 role listing embeds hand-authored metadata, so several fields
//! arrive in more than one admissible shape and deserialize leniently.

use serde::{Deserialize, Deserializer};

/// v1 listing fields arrive as explicit nulls often enough that every
/// string field tolerates them
fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One role from the v1 listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Role {
    pub id: u64,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub github_user: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub github_repo: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub github_branch: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub commit: String,
    #[serde(default)]
    pub summary_fields: RoleSummaryFields,
}

impl Role {
    /// Upstream namespace, falling back to the github user
    pub fn namespace(&self) -> &str {
        if self.summary_fields.namespace.name.is_empty() {
            &self.github_user
        } else {
            &self.summary_fields.namespace.name
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleSummaryFields {
    #[serde(default)]
    pub namespace: RoleNamespace,
    #[serde(default, deserialize_with = "dependency_names")]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub versions: Vec<RoleVersion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleNamespace {
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleVersion {
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
}

/// Dependencies appear either as `["ns.name", ...]` or as
/// `[{"role": "ns.name"}, ...]`
fn dependency_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Name(String),
        Keyed { role: String },
    }

    let entries = Vec::<Entry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            Entry::Name(name) => name,
            Entry::Keyed { role } => role,
        })
        .collect())
}

/// A page of the v1 roles listing
#[derive(Debug, Default, Deserialize)]
pub struct RolesPage {
    #[serde(default)]
    pub results: Vec<Role>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub count: u64,
}

/// A page of the per-role versions listing
#[derive(Debug, Default, Deserialize)]
pub struct RoleVersionsPage {
    #[serde(default)]
    pub results: Vec<RoleVersion>,
    #[serde(default)]
    pub next: Option<String>,
}

/// A page of the v3 cross-repo collection-version search
#[derive(Debug, Default, Deserialize)]
pub struct CollectionsPage {
    #[serde(default)]
    pub links: PageLinks,
    #[serde(default)]
    pub data: Vec<CollectionIndexEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionIndexEntry {
    #[serde(default)]
    pub repository: RepositoryRef,
    #[serde(default)]
    pub collection_version: CollectionVersionRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionVersionRef {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// The per-version detail record, carrying the real download location
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionVersionDetail {
    #[serde(default)]
    pub namespace: RoleNamespace,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub version: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub download_url: String,
    #[serde(default)]
    pub artifact: ArtifactRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactRef {
    #[serde(default, deserialize_with = "nullable_string")]
    pub filename: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dependencies_accept_both_shapes() {
        let strings: RoleSummaryFields =
            serde_json::from_str(r#"{"dependencies": ["a.b", "c.d"]}"#).unwrap();
        assert_eq!(strings.dependencies, vec!["a.b", "c.d"]);

        let keyed: RoleSummaryFields =
            serde_json::from_str(r#"{"dependencies": [{"role": "a.b"}]}"#).unwrap();
        assert_eq!(keyed.dependencies, vec!["a.b"]);
    }

    #[test]
    fn role_namespace_falls_back_to_github_user() {
        let role: Role = serde_json::from_str(
            r#"{"id": 1, "github_user": "user", "github_repo": "repo"}"#,
        )
        .unwrap();
        assert_eq!(role.namespace(), "user");

        let role: Role = serde_json::from_str(
            r#"{"id": 1, "github_user": "user", "summary_fields": {"namespace": {"name": "acme"}}}"#,
        )
        .unwrap();
        assert_eq!(role.namespace(), "acme");
    }

    #[test]
    fn explicit_nulls_are_tolerated() {
        let role: Role = serde_json::from_str(
            r#"{"id": 1, "name": null, "github_user": "user", "github_branch": null, "commit": null}"#,
        )
        .unwrap();
        assert_eq!(role.name, "");
        assert_eq!(role.commit, "");

        let detail: CollectionVersionDetail =
            serde_json::from_str(r#"{"download_url": null, "artifact": {"filename": null}}"#)
                .unwrap();
        assert_eq!(detail.download_url, "");
        assert_eq!(detail.artifact.filename, "");
    }

    #[test]
    fn detail_record_parses() {
        let detail: CollectionVersionDetail = serde_json::from_str(
            r#"{
                "namespace": {"name": "acme"},
                "name": "util",
                "version": "1.0.0",
                "download_url": "https://h/artifact.tar.gz",
                "artifact": {"filename": "acme-util-1.0.0.tar.gz", "sha256": "ff", "size": 10}
            }"#,
        )
        .unwrap();
        assert_eq!(detail.artifact.filename, "acme-util-1.0.0.tar.gz");
        assert_eq!(detail.namespace.name, "acme");
    }
}
