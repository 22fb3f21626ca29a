// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use thiserror::Error;

use nebula::repository::ArtifactKind;

mod createrepo;
mod init;
mod install;
mod sync;

/// Generate the CLI command structure
fn command() -> Command {
    Command::new("nebula")
        .about("Mirror, index, serve and install galaxy content")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .help("Print additional information about what nebula is doing")
                .action(ArgAction::SetTrue),
        )
        .arg_required_else_help(true)
        .subcommand_required(true)
        .subcommand(createrepo::command())
        .subcommand(sync::galaxy_command())
        .subcommand(sync::crc_command())
        .subcommand(
            Command::new("role")
                .about("Manage roles")
                .arg_required_else_help(true)
                .subcommand_required(true)
                .subcommand(install::command())
                .subcommand(init::command()),
        )
        .subcommand(
            Command::new("collection")
                .about("Manage collections")
                .arg_required_else_help(true)
                .subcommand_required(true)
                .subcommand(install::command())
                .subcommand(init::command()),
        )
}

/// Process all CLI arguments
pub async fn process() -> Result<(), Error> {
    let matches = command().get_matches();

    let level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    match matches.subcommand() {
        Some(("createrepo", args)) => createrepo::handle(args).map_err(Error::CreateRepo),
        Some(("galaxy-sync", args)) => sync::handle(args, sync::Mode::Galaxy).await.map_err(Error::Sync),
        Some(("crc-sync", args)) => sync::handle(args, sync::Mode::Crc).await.map_err(Error::Sync),
        Some(("role", sub)) => match sub.subcommand() {
            Some(("install", args)) => install::handle(args, ArtifactKind::Role)
                .await
                .map_err(Error::Install),
            Some(("init", args)) => init::handle(args, ArtifactKind::Role).map_err(Error::Init),
            _ => unreachable!(),
        },
        Some(("collection", sub)) => match sub.subcommand() {
            Some(("install", args)) => install::handle(args, ArtifactKind::Collection)
                .await
                .map_err(Error::Install),
            Some(("init", args)) => init::handle(args, ArtifactKind::Collection).map_err(Error::Init),
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("error creating repository: {0}")]
    CreateRepo(#[from] createrepo::Error),

    #[error("error syncing: {0}")]
    Sync(#[from] sync::Error),

    #[error("error installing: {0}")]
    Install(#[from] install::Error),

    #[error("error initializing: {0}")]
    Init(#[from] init::Error),
}
