// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `requirements.yml` parsing: the two-key file listing collections and
//! roles to sync or install.

use std::io;
use std::path::Path;

use fs_err as fs;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub collections: Vec<CollectionRequirement>,
    #[serde(default)]
    pub roles: Vec<RoleRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionRequirement {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleRequirement {
    pub name: String,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl Requirements {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),

    #[error("malformed requirements file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
