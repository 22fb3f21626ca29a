// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::{arg, value_parser, ArgMatches, Command};
use log::{info, warn};
use thiserror::Error;

use nebula::environment::{default_cache_dir, default_install_dir, expand_user};
use nebula::install::{self, PackageManager};
use nebula::repository::{self, ArtifactKind, RepoClient};
use nebula::requirements::{self, Requirements};
use nebula::spec::{split_fqn, InstallSpec};

pub fn command() -> Command {
    Command::new("install")
        .about("Resolve and install content with its dependencies")
        .arg(arg!(--server <url> "repository url or directory"))
        .arg(arg!(--dest <path> "where to install"))
        .arg(arg!(--cachedir <path> "where to store intermediate files"))
        .arg(arg!(--namespace <n> "namespace"))
        .arg(arg!(--name <n> "name"))
        .arg(arg!(--version <v> "version constraint"))
        .arg(
            arg!(-r --requirements <file> "requirements file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!([FQN] "fully-qualified name, e.g. acme.util"))
}

pub async fn handle(args: &ArgMatches, kind: ArtifactKind) -> Result<(), Error> {
    let dest = args
        .get_one::<String>("dest")
        .map(|d| expand_user(d))
        .unwrap_or_else(default_install_dir);
    let cache = args
        .get_one::<String>("cachedir")
        .map(|d| expand_user(d))
        .unwrap_or_else(default_cache_dir);
    let server = args.get_one::<String>("server").cloned().unwrap_or_default();

    let client = RepoClient::new(&server, &cache)?;
    let mut manager = PackageManager::open(&dest, &cache)?;
    manager.refresh_if_stale(&client).await?;

    for request in requested_specs(args, kind)? {
        info!("resolving {request}");

        let plan = match kind {
            ArtifactKind::Collection => client.resolve_collection_deps(&request)?,
            ArtifactKind::Role => client.resolve_role_deps(&request)?,
        };

        if plan.is_empty() {
            warn!("nothing to install for {request}");
            continue;
        }

        for spec in &plan {
            info!("install: {spec}");
        }

        for spec in &plan {
            let artifact = client.cache_file_for(spec, kind).await?;
            match kind {
                ArtifactKind::Collection => manager.install_collection(spec, &artifact)?,
                ArtifactKind::Role => manager.install_role(spec, &artifact)?,
            }
        }
    }

    Ok(())
}

/// The top-level specs to resolve: the requirements file when given,
/// otherwise one spec from the FQN argument / flags
fn requested_specs(args: &ArgMatches, kind: ArtifactKind) -> Result<Vec<InstallSpec>, Error> {
    if let Some(path) = args.get_one::<PathBuf>("requirements") {
        let requirements = Requirements::from_file(path)?;
        let named: Vec<(String, Option<String>)> = match kind {
            ArtifactKind::Collection => requirements
                .collections
                .into_iter()
                .map(|c| (c.name, c.version))
                .collect(),
            ArtifactKind::Role => requirements
                .roles
                .into_iter()
                .map(|r| (r.name, r.version))
                .collect(),
        };

        return Ok(named
            .into_iter()
            .filter_map(|(fqn, version)| {
                let (namespace, name) = fqn.split_once('.')?;
                Some(InstallSpec::new(namespace, name, version.unwrap_or_default()))
            })
            .collect());
    }

    let mut namespace = args.get_one::<String>("namespace").cloned().unwrap_or_default();
    let mut name = args.get_one::<String>("name").cloned().unwrap_or_default();
    let version = args.get_one::<String>("version").cloned().unwrap_or_default();

    if let Some(fqn) = args.get_one::<String>("FQN") {
        let parts = split_fqn(fqn);
        match parts.len() {
            2 => {
                namespace = parts[0].clone();
                name = parts[1].clone();
            }
            3 => {
                namespace = parts[1].clone();
                name = parts[2].clone();
            }
            _ => {}
        }
    }

    if namespace.is_empty() || name.is_empty() {
        return Err(Error::NoTarget);
    }

    Ok(vec![InstallSpec::new(namespace, name, version)])
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no namespace.name given; pass an FQN or --namespace/--name")]
    NoTarget,

    #[error("repository: {0}")]
    Repository(#[from] repository::Error),

    #[error("requirements: {0}")]
    Requirements(#[from] requirements::Error),

    #[error("install: {0}")]
    Install(#[from] install::Error),
}
