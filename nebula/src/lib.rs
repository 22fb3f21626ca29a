// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

pub use self::install::PackageManager;
pub use self::repository::{RepoClient, RepoMeta};
pub use self::spec::InstallSpec;

pub mod archive;
pub mod descriptor;
pub mod environment;
pub mod fetch;
pub mod galaxy;
pub mod git;
pub mod install;
pub mod repository;
pub mod requirements;
pub mod resolver;
pub mod spec;
pub mod sync;
pub mod version;
