// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

mod cli;

/// Main entry point
#[tokio::main]
async fn main() -> Result<(), cli::Error> {
    cli::process().await
}
