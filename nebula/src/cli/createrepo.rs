// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use nebula::environment::expand_user;
use nebula::repository::{self, create::create_repo};

pub fn command() -> Command {
    Command::new("createrepo")
        .about("Create repository metadata from a directory of artifacts")
        .arg(arg!(--dest <path> "directory holding collections/ and roles/").required(true))
        .arg(
            Arg::new("collections")
                .long("collections")
                .help("Only process collections")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("roles")
                .long("roles")
                .help("Only process roles")
                .action(ArgAction::SetTrue),
        )
}

pub fn handle(args: &ArgMatches) -> Result<(), Error> {
    let dest = expand_user(args.get_one::<String>("dest").unwrap());
    let collections_only = args.get_flag("collections");
    let roles_only = args.get_flag("roles");

    create_repo(&dest, roles_only, collections_only)?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Repository(#[from] repository::Error),
}
