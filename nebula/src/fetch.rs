// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Bearer-authenticated HTTP access with on-disk response caching.

use std::io;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Hash a URL into its cache key: `h = 31·h + codepoint (mod 2³²)`
pub fn url_hash(url: &str) -> u32 {
    url.chars()
        .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32))
}

/// One client per upstream. The access token, when present, rides along
/// on every request issued through this instance.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    token: Option<String>,
}

impl Fetcher {
    pub fn new(token: Option<String>) -> Self {
        let client = reqwest::ClientBuilder::new()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("build reqwest client");

        Self { client, token }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// GET the full response body. Non-2xx statuses are errors.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, Error> {
        debug!("GET {url}");
        let response = self.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// GET a JSON document through an on-disk cache file. A hit never
    /// touches the network; a miss persists the raw body before parsing.
    pub async fn get_cached_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cache_file: &Path,
    ) -> Result<T, Error> {
        if fs::try_exists(cache_file).await? {
            debug!("cache hit {}", cache_file.display());
            let data = fs::read(cache_file).await?;
            return Ok(serde_json::from_slice(&data)?);
        }

        let body = self.get_bytes(url).await?;
        if let Some(parent) = cache_file.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(cache_file, &body).await?;

        Ok(serde_json::from_slice(&body)?)
    }

    /// HEAD probe: true only on a 200 response
    pub async fn head_ok(&self, url: &str) -> bool {
        let mut builder = self.client.head(url).timeout(HEAD_TIMEOUT);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        match builder.send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(_) => false,
        }
    }

    /// Stream a response body to `path`
    pub async fn download_to(&self, url: &str, path: &Path) -> Result<(), Error> {
        info!("download {url} -> {}", path.display());

        let response = self.get(url).send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();

        let mut out = File::create(path).await?;
        while let Some(chunk) = stream.next().await {
            out.write_all(&chunk?).await?;
        }
        out.flush().await?;

        Ok(())
    }
}

/// Exchange a refresh token for an access token at `auth_url`
pub async fn exchange_refresh_token(auth_url: &str, refresh_token: &str) -> Result<String, Error> {
    #[derive(serde::Deserialize)]
    struct TokenResponse {
        access_token: String,
    }

    let client = reqwest::Client::new();
    let response = client
        .post(auth_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", "cloud-services"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await?
        .error_for_status()?;

    let token: TokenResponse = serde_json::from_slice(&response.bytes().await?)?;
    Ok(token.access_token)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("io")]
    Io(#[from] io::Error),

    #[error("malformed response body: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn url_hash_matches_reference_values() {
        // h = 31*h + codepoint, wrapping at 2^32
        assert_eq!(url_hash(""), 0);
        assert_eq!(url_hash("a"), 97);
        assert_eq!(url_hash("ab"), 97 * 31 + 98);
        // wraps rather than overflowing
        let long = "https://galaxy.ansible.com/api/v1/roles/?order_by=-modified";
        let _ = url_hash(long);
        assert_eq!(url_hash(long), url_hash(long));
    }
}
