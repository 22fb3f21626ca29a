// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io;
use std::path::Path;

use clap::{arg, ArgMatches, Command};
use fs_err as fs;
use log::info;
use thiserror::Error;

use nebula::repository::ArtifactKind;

pub fn command() -> Command {
    Command::new("init")
        .about("Create a new role or collection skeleton")
        .arg(arg!(<NAME> "fully-qualified name, e.g. acme.util"))
}

pub fn handle(args: &ArgMatches, kind: ArtifactKind) -> Result<(), Error> {
    let fqn = args.get_one::<String>("NAME").unwrap();
    let Some((namespace, name)) = fqn.split_once('.') else {
        return Err(Error::BadName(fqn.clone()));
    };

    match kind {
        ArtifactKind::Role => init_role(namespace, name),
        ArtifactKind::Collection => init_collection(namespace, name),
    }
}

fn init_role(namespace: &str, name: &str) -> Result<(), Error> {
    let root = Path::new(name);
    ensure_fresh(root)?;

    fs::create_dir_all(root.join("meta"))?;
    fs::create_dir_all(root.join("tasks"))?;

    fs::write(
        root.join("meta").join("main.yml"),
        format!(
            "galaxy_info:\n  author: your name\n  namespace: {namespace}\n  role_name: {name}\n  \
             description: your role description\n  license: MIT\n  min_ansible_version: \"2.9\"\n  \
             platforms: []\n  galaxy_tags: []\n  dependencies: []\n"
        ),
    )?;
    fs::write(root.join("tasks").join("main.yml"), format!("---\n# tasks for {name}\n"))?;

    info!("initialized role {namespace}.{name} in ./{name}");
    Ok(())
}

fn init_collection(namespace: &str, name: &str) -> Result<(), Error> {
    let root = Path::new(namespace).join(name);
    ensure_fresh(&root)?;

    fs::create_dir_all(&root)?;
    fs::write(
        root.join("galaxy.yml"),
        format!(
            "namespace: {namespace}\nname: {name}\nversion: 0.1.0\nreadme: README.md\nauthors:\n  - your name\n"
        ),
    )?;
    fs::create_dir_all(root.join("plugins"))?;
    fs::create_dir_all(root.join("roles"))?;

    info!("initialized collection {namespace}.{name} in ./{namespace}/{name}");
    Ok(())
}

fn ensure_fresh(path: &Path) -> Result<(), Error> {
    if path.exists() {
        return Err(Error::AlreadyExists(path.display().to_string()));
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} is not a namespace.name pair")]
    BadName(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("io")]
    Io(#[from] io::Error),
}
