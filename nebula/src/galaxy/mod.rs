// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Paginated crawl of the upstream index with a per-URL response cache.

use std::path::PathBuf;

use log::{debug, info, warn};
use thiserror::Error;

use crate::fetch::{self, url_hash, Fetcher};
use crate::version;

pub use self::types::{
    CollectionIndexEntry, CollectionVersionDetail, Role, RoleVersion, RoleVersionsPage, RolesPage,
};
use self::types::CollectionsPage;

pub mod types;

/// Roles whose inline version list reaches the server's page cap need a
/// dedicated versions walk to see everything.
const INLINE_VERSION_CAP: usize = 10;

/// Upstream index client. Every response is cached on disk keyed by URL
/// hash, so interrupted walks resume without refetching.
pub struct CachedGalaxyClient {
    fetcher: Fetcher,
    base_url: String,
    api_prefix: String,
    cache_path: PathBuf,
}

impl CachedGalaxyClient {
    /// Build a client. When `auth_url` is set, a refresh-token exchange
    /// runs once here and the resulting access token is attached to all
    /// requests made through this instance.
    pub async fn new(
        base_url: impl Into<String>,
        auth_url: Option<&str>,
        token: Option<&str>,
        api_prefix: impl Into<String>,
        cache_path: impl Into<PathBuf>,
    ) -> Result<Self, Error> {
        let access_token = match (auth_url, token) {
            (Some(auth_url), Some(token)) => {
                let access = fetch::exchange_refresh_token(auth_url, token).await?;
                info!("access token acquired from {auth_url}");
                Some(access)
            }
            (None, Some(token)) => Some(token.to_owned()),
            _ => None,
        };

        Ok(Self {
            fetcher: Fetcher::new(access_token),
            base_url: base_url.into(),
            api_prefix: api_prefix.into(),
            cache_path: cache_path.into(),
        })
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    fn role_cache_file(&self, url: &str) -> PathBuf {
        self.cache_path
            .join("roles")
            .join(format!("{:x}.json", url_hash(url)))
    }

    fn collection_cache_file(&self, url: &str) -> PathBuf {
        self.cache_path
            .join("collections")
            .join(format!("{:x}.json", url_hash(url)))
    }

    /// Walk the role listing, optionally filtered by namespace and name.
    /// With `latest_only`, each role keeps only its highest version.
    pub async fn roles(
        &self,
        namespace: Option<&str>,
        name: Option<&str>,
        latest_only: bool,
    ) -> Result<Vec<Role>, Error> {
        let mut url = format!("{}/api/v1/roles/?order_by=-modified", self.base_url);
        if let Some(namespace) = namespace {
            url.push_str(&format!("&namespace={namespace}"));
        }
        if let Some(name) = name {
            url.push_str(&format!("&name={name}"));
        }

        let mut roles = vec![];
        let mut next = Some(url);
        let mut count = 0;

        while let Some(url) = next {
            info!("{}/{count} {url}", roles.len());

            let page: RolesPage = self
                .fetcher
                .get_cached_json(&url, &self.role_cache_file(&url))
                .await?;
            count = page.count;

            for mut role in page.results {
                if role.summary_fields.versions.len() >= INLINE_VERSION_CAP {
                    role.summary_fields.versions = self.role_versions(role.id, latest_only).await?;
                } else if latest_only {
                    role.summary_fields.versions =
                        reduce_to_highest(&role.summary_fields.versions);
                }
                roles.push(role);
            }

            next = page.next;
        }

        Ok(roles)
    }

    /// Collect every version of one role through the paginated versions
    /// endpoint
    pub async fn role_versions(
        &self,
        role_id: u64,
        latest_only: bool,
    ) -> Result<Vec<RoleVersion>, Error> {
        let mut versions = vec![];
        let mut next = Some(format!("{}/api/v1/roles/{role_id}/versions/", self.base_url));

        while let Some(url) = next {
            debug!("role versions {url}");
            let page: RoleVersionsPage = self
                .fetcher
                .get_cached_json(&url, &self.role_cache_file(&url))
                .await?;
            versions.extend(page.results);
            next = page.next;
        }

        if latest_only {
            versions = reduce_to_highest(&versions);
        }

        Ok(versions)
    }

    /// Walk the collection-version search and resolve each summary entry
    /// to its detail record (which carries the download URL).
    pub async fn collections(
        &self,
        namespace: Option<&str>,
        name: Option<&str>,
        latest_only: bool,
    ) -> Result<Vec<CollectionVersionDetail>, Error> {
        let mut url = format!(
            "{}{}/v3/plugin/ansible/search/collection-versions/",
            self.base_url, self.api_prefix
        );
        let mut params = vec![];
        if let Some(namespace) = namespace {
            params.push(format!("namespace={namespace}"));
        }
        if let Some(name) = name {
            params.push(format!("name={name}"));
        }
        if latest_only {
            params.push("is_highest=true".to_owned());
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        let mut details = vec![];
        let mut next = Some(url);

        while let Some(url) = next {
            info!("{} {url}", details.len());

            let page: CollectionsPage = self
                .fetcher
                .get_cached_json(&url, &self.collection_cache_file(&url))
                .await?;

            for entry in &page.data {
                details.push(self.collection_detail(entry).await?);
            }

            // the search endpoint hands back relative next links
            next = page.links.next.map(|n| format!("{}{n}", self.base_url));
        }

        Ok(details)
    }

    /// Fetch the detail record for one listed collection version
    async fn collection_detail(
        &self,
        entry: &CollectionIndexEntry,
    ) -> Result<CollectionVersionDetail, Error> {
        let cv = &entry.collection_version;
        let url = format!(
            "{}{}/v3/plugin/ansible/content/{}/collections/index/{}/{}/versions/{}/",
            self.base_url, self.api_prefix, entry.repository.name, cv.namespace, cv.name, cv.version
        );
        debug!("collection detail {url}");

        self.fetcher
            .get_cached_json(&url, &self.collection_cache_file(&url))
            .await
            .map_err(Error::from)
    }
}

/// Keep only the versions equal to the highest valid semver in the list.
/// Lists with no valid semver at all come back empty.
pub fn reduce_to_highest(versions: &[RoleVersion]) -> Vec<RoleVersion> {
    let names: Vec<String> = versions.iter().map(|v| v.name.clone()).collect();
    match version::highest(&names) {
        Ok(top) => {
            let top = top.to_string();
            versions.iter().filter(|v| v.name == top).cloned().collect()
        }
        Err(_) => {
            warn!("no valid versions among {names:?}");
            vec![]
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("fetch: {0}")]
    Fetch(#[from] fetch::Error),
}
