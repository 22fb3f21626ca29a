// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::{arg, value_parser, Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use nebula::environment::expand_user;
use nebula::sync::{self, SyncOptions};

const GALAXY_SERVER: &str = "https://galaxy.ansible.com";
const GALAXY_API_PREFIX: &str = "/api";

const CRC_SERVER: &str = "https://console.redhat.com";
const CRC_API_PREFIX: &str = "/api/automation-hub";
const CRC_AUTH_URL: &str =
    "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token";

#[derive(Debug, Clone, Copy)]
pub enum Mode {
    /// Public index, anonymous access
    Galaxy,
    /// Authenticated hub: token exchange up front, bearer auth throughout
    Crc,
}

fn common_args(cmd: Command) -> Command {
    cmd.arg(arg!(--dest <path> "where to store the mirrored tree").required(true))
        .arg(
            Arg::new("collections")
                .long("collections")
                .help("Only sync collections")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("roles")
                .long("roles")
                .help("Only sync roles")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("artifacts")
                .long("artifacts")
                .help("Only sync the artifacts")
                .action(ArgAction::SetTrue),
        )
        .arg(arg!(--namespace <n> "restrict to one namespace"))
        .arg(arg!(--name <n> "restrict to one name"))
        .arg(arg!(--version <v> "restrict to one version"))
        .arg(
            arg!(--concurrency <int> "parallel downloads")
                .value_parser(value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("latest")
                .long("latest")
                .help("Get only the latest version of everything")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(-r --requirements <file> "requirements file")
                .value_parser(value_parser!(PathBuf)),
        )
}

pub fn galaxy_command() -> Command {
    common_args(
        Command::new("galaxy-sync")
            .about("Sync content from a galaxy server into a repository directory")
            .arg(arg!(--server <url> "remote server").default_value(GALAXY_SERVER)),
    )
}

pub fn crc_command() -> Command {
    common_args(
        Command::new("crc-sync")
            .about("Sync content from an authenticated automation hub")
            .arg(arg!(--server <url> "remote server").default_value(CRC_SERVER))
            .arg(arg!(--token <t> "offline/refresh token").required(true))
            .arg(arg!(--auth_url <url> "token exchange endpoint").default_value(CRC_AUTH_URL)),
    )
}

pub async fn handle(args: &ArgMatches, mode: Mode) -> Result<(), Error> {
    let (api_prefix, auth_url, token) = match mode {
        Mode::Galaxy => (GALAXY_API_PREFIX, None, None),
        Mode::Crc => (
            CRC_API_PREFIX,
            args.get_one::<String>("auth_url").cloned(),
            args.get_one::<String>("token").cloned(),
        ),
    };

    let options = SyncOptions {
        server: args.get_one::<String>("server").cloned().unwrap(),
        dest: expand_user(args.get_one::<String>("dest").unwrap()),
        concurrency: *args.get_one::<usize>("concurrency").unwrap(),
        collections_only: args.get_flag("collections"),
        roles_only: args.get_flag("roles"),
        artifacts_only: args.get_flag("artifacts"),
        latest_only: args.get_flag("latest"),
        namespace: args.get_one::<String>("namespace").cloned(),
        name: args.get_one::<String>("name").cloned(),
        version: args.get_one::<String>("version").cloned(),
        requirements_file: args.get_one::<PathBuf>("requirements").cloned(),
        auth_url,
        token,
        api_prefix: api_prefix.to_owned(),
    };

    sync::run(options).await?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sync(#[from] sync::Error),
}
