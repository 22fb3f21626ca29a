// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Collection work units: the detail record already names the artifact
//! and its download URL, so the unit is a guarded download.

use std::path::Path;

use log::{debug, info, warn};

use crate::galaxy::{CachedGalaxyClient, CollectionVersionDetail};
use crate::sync::sidecar::Sidecar;
use crate::sync::{Dirs, COOL_DOWN};

/// Download one collection version into the collections directory
pub async fn sync_collection(client: &CachedGalaxyClient, dirs: &Dirs, detail: CollectionVersionDetail) {
    let filename = basename(&detail.artifact.filename);
    if filename.is_empty() {
        warn!(
            "{}.{} {}: detail record carries no artifact filename",
            detail.namespace.name, detail.name, detail.version
        );
        return;
    }

    let stem = filename.trim_end_matches(".tar.gz").to_owned();
    let sidecar = Sidecar::new(&dirs.collections, &stem);

    if let Some(reason) = sidecar.skip_reason() {
        debug!("{stem}: skipping ({reason:?})");
        return;
    }

    let target = dirs.collections.join(filename);
    if target.is_file() {
        debug!("{stem}: already present");
        return;
    }

    let Ok(Some(guard)) = sidecar.acquire() else {
        return;
    };

    match client.fetcher().download_to(&detail.download_url, &target).await {
        Ok(()) => {
            info!("{stem}: synced");
            if let Err(e) = guard.release() {
                warn!("{stem}: failed to release lock: {e}");
            }
            tokio::time::sleep(COOL_DOWN).await;
        }
        Err(e) => {
            warn!("{stem}: {e}");
            if let Err(e) = guard.mark_bad(&e.to_string()) {
                warn!("{stem}: failed to write bad sidecar: {e}");
            }
        }
    }
}

/// The final component of a path-ish filename
fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("")
}
