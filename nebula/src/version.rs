// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Semantic version selection and constraint arithmetic.
//!
//! Constraints are an operator-prefixed version (`>=1.2.0`); a bare
//! version means exact equality. Synthesized snapshot versions carry
//! build metadata (`0.0.0+20240102030405-abcdef0`) and therefore sort
//! below every real release.

use std::fmt;

use semver::Version;
use thiserror::Error;

/// Comparison operator of a [`Constraint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
        }
    }

    /// Evaluate `a <op> b`
    pub fn compare(&self, a: &Version, b: &Version) -> bool {
        match self {
            Op::Eq => a == b,
            Op::Gt => a > b,
            Op::Ge => a >= b,
            Op::Lt => a < b,
            Op::Le => a <= b,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A version constraint: operator plus boundary version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: Op,
    pub version: Version,
}

impl Constraint {
    /// Parse an operator-prefixed constraint. A missing operator means `=`.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let input = input.trim();

        let (op, rest) = if let Some(rest) = input.strip_prefix(">=") {
            (Op::Ge, rest)
        } else if let Some(rest) = input.strip_prefix("<=") {
            (Op::Le, rest)
        } else if let Some(rest) = input.strip_prefix('>') {
            (Op::Gt, rest)
        } else if let Some(rest) = input.strip_prefix('<') {
            (Op::Lt, rest)
        } else if let Some(rest) = input.strip_prefix('=') {
            (Op::Eq, rest)
        } else {
            (Op::Eq, input)
        };

        let version = Version::parse(rest.trim())
            .map_err(|_| Error::InvalidConstraint(input.to_owned()))?;

        Ok(Self { op, version })
    }

    /// Does `version` satisfy this constraint?
    pub fn matches(&self, version: &Version) -> bool {
        self.op.compare(version, &self.version)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

/// Parse every entry, silently dropping invalid versions, and return the
/// remainder in ascending order.
pub fn filter_and_sort(versions: &[String]) -> Vec<Version> {
    let mut valid: Vec<Version> = versions
        .iter()
        .filter_map(|v| Version::parse(v.trim()).ok())
        .collect();
    valid.sort();
    valid
}

/// The highest valid version in the list
pub fn highest(versions: &[String]) -> Result<Version, Error> {
    filter_and_sort(versions)
        .into_iter()
        .next_back()
        .ok_or(Error::NoValidVersions)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid version constraint: {0}")]
    InvalidConstraint(String),

    #[error("no valid semantic versions")]
    NoValidVersions,
}
