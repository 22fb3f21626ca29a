// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Install requests and fully-qualified-name parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A request for an artifact: namespace, name and a version constraint.
/// An empty or `*` version means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSpec {
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl InstallSpec {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Specs match on namespace and name, regardless of version
    pub fn name_equals(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }

    /// Does the constraint accept any version at all?
    pub fn is_unconstrained(&self) -> bool {
        self.version.is_empty() || self.version == "*"
    }
}

impl fmt::Display for InstallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}=={}", self.namespace, self.name, self.version)
    }
}

/// Split a fully-qualified name argument into its parts.
///
/// `a.b` → `[a, b]`; `host:a.b` → `[host, a, b]`. When the argument has
/// an `http(s)://` scheme the split point moves to the second colon so
/// the scheme's own colon survives: `https://h:a.b` → `[https://h, a, b]`.
pub fn split_fqn(input: &str) -> Vec<String> {
    let Some(colon) = input.find(':') else {
        return input.split('.').map(String::from).collect();
    };

    if input.starts_with("http://") || input.starts_with("https://") {
        let Some(second) = input[colon + 1..].find(':').map(|i| i + colon + 1) else {
            return vec![input.to_owned()];
        };
        let mut parts = vec![input[..second].to_owned()];
        parts.extend(input[second + 1..].split('.').map(String::from));
        return parts;
    }

    let mut parts = vec![input[..colon].to_owned()];
    parts.extend(input[colon + 1..].split('.').map(String::from));
    parts
}
