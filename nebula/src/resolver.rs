// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Dependency closure resolution over repository manifests.
//!
//! Both manifest kinds resolve identically; [`ManifestLike`] exposes the
//! identity and first-order dependencies of either. The first resolution
//! of a name pins it: constraints discovered later in the walk can
//! neither downgrade nor fork an already-chosen artifact, which also
//! terminates any dependency cycle.

use log::warn;
use semver::Version;

use crate::descriptor::RoleDescriptor;
use crate::repository::CollectionManifest;
use crate::spec::InstallSpec;
use crate::version::Constraint;

/// A manifest the resolver can walk
pub trait ManifestLike {
    fn namespace(&self) -> &str;
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    /// First-order dependencies as (fully-qualified name, constraint)
    fn dependencies(&self) -> Vec<(String, String)>;
}

impl ManifestLike for CollectionManifest {
    fn namespace(&self) -> &str {
        &self.collection_info.namespace
    }

    fn name(&self) -> &str {
        &self.collection_info.name
    }

    fn version(&self) -> &str {
        &self.collection_info.version
    }

    fn dependencies(&self) -> Vec<(String, String)> {
        self.collection_info
            .dependencies
            .iter()
            .map(|(fqn, constraint)| (fqn.clone(), constraint.clone()))
            .collect()
    }
}

impl ManifestLike for RoleDescriptor {
    fn namespace(&self) -> &str {
        &self.galaxy_info.namespace
    }

    fn name(&self) -> &str {
        &self.galaxy_info.role_name
    }

    fn version(&self) -> &str {
        &self.galaxy_info.version
    }

    fn dependencies(&self) -> Vec<(String, String)> {
        self.galaxy_info
            .dependencies
            .iter()
            .map(|dep| (dep.name.clone(), dep.version.clone()))
            .collect()
    }
}

/// Resolve `spec` and its transitive dependencies to a deduplicated,
/// sorted install plan. Subtrees with no candidates are logged and
/// dropped; the rest of the plan survives.
pub fn resolve<M: ManifestLike>(spec: &InstallSpec, manifests: &[M]) -> Vec<InstallSpec> {
    let mut plan = vec![];
    resolve_into(spec, manifests, &mut plan);

    plan.sort_by(|a, b| {
        (&a.namespace, &a.name, &a.version).cmp(&(&b.namespace, &b.name, &b.version))
    });
    plan.dedup();
    plan
}

fn resolve_into<M: ManifestLike>(spec: &InstallSpec, manifests: &[M], plan: &mut Vec<InstallSpec>) {
    let constraint = if spec.is_unconstrained() {
        None
    } else {
        match Constraint::parse(&spec.version) {
            Ok(constraint) => Some(constraint),
            Err(e) => {
                warn!("{spec}: {e}");
                return;
            }
        }
    };

    // Candidates: matching name, valid version, constraint satisfied
    let mut candidates: Vec<(&M, Version)> = manifests
        .iter()
        .filter(|m| m.namespace() == spec.namespace && m.name() == spec.name)
        .filter_map(|m| Version::parse(m.version()).ok().map(|v| (m, v)))
        .filter(|(_, version)| {
            constraint
                .as_ref()
                .map(|c| c.matches(version))
                .unwrap_or(true)
        })
        .collect();

    if candidates.is_empty() {
        warn!("no candidates for {spec}");
        return;
    }

    candidates.sort_by(|a, b| a.1.cmp(&b.1));
    let Some((manifest, version)) = candidates.pop() else {
        return;
    };

    let chosen = InstallSpec::new(manifest.namespace(), manifest.name(), version.to_string());

    // First writer wins: a name already in the plan stays as resolved
    if plan.iter().any(|existing| existing.name_equals(&chosen)) {
        return;
    }
    plan.push(chosen);

    for (fqn, constraint) in manifest.dependencies() {
        let Some((namespace, name)) = fqn.split_once('.') else {
            warn!("malformed dependency name {fqn}");
            continue;
        };
        resolve_into(&InstallSpec::new(namespace, name, constraint), manifests, plan);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::repository::CollectionInfo;

    fn manifest(namespace: &str, name: &str, version: &str, deps: &[(&str, &str)]) -> CollectionManifest {
        CollectionManifest {
            collection_info: CollectionInfo {
                namespace: namespace.into(),
                name: name.into(),
                version: version.into(),
                dependencies: deps
                    .iter()
                    .map(|(fqn, c)| ((*fqn).to_owned(), (*c).to_owned()))
                    .collect(),
            },
        }
    }

    #[test]
    fn resolves_single_artifact() {
        let manifests = vec![manifest("acme", "util", "1.0.0", &[])];
        let plan = resolve(&InstallSpec::new("acme", "util", ""), &manifests);
        assert_eq!(plan, vec![InstallSpec::new("acme", "util", "1.0.0")]);
    }

    #[test]
    fn transitive_resolution_picks_latest() {
        let manifests = vec![
            manifest("a", "x", "1.0.0", &[("b.y", ">=1.0.0")]),
            manifest("b", "y", "1.0.0", &[]),
            manifest("b", "y", "2.0.0", &[]),
        ];
        let plan = resolve(&InstallSpec::new("a", "x", ""), &manifests);
        assert_eq!(
            plan,
            vec![
                InstallSpec::new("a", "x", "1.0.0"),
                InstallSpec::new("b", "y", "2.0.0"),
            ]
        );
    }

    #[test]
    fn first_writer_wins_on_conflicting_constraints() {
        let manifests = vec![
            manifest("a", "x", "1.0.0", &[("c.z", ">=2.0.0"), ("b.y", "*")]),
            manifest("b", "y", "1.0.0", &[("c.z", "=1.0.0")]),
            manifest("c", "z", "1.0.0", &[]),
            manifest("c", "z", "2.0.0", &[]),
        ];
        let plan = resolve(&InstallSpec::new("a", "x", ""), &manifests);

        // c.z was pinned at 2.0.0 before b.y's =1.0.0 constraint appeared
        assert!(plan.contains(&InstallSpec::new("c", "z", "2.0.0")));
        assert!(!plan.iter().any(|s| s.name == "z" && s.version == "1.0.0"));
    }

    #[test]
    fn no_two_versions_of_one_name() {
        let manifests = vec![
            manifest("a", "x", "1.0.0", &[("b.y", ">=1.0.0"), ("c.z", "*")]),
            manifest("b", "y", "2.0.0", &[]),
            manifest("c", "z", "1.0.0", &[("b.y", "=1.0.0")]),
            manifest("b", "y", "1.0.0", &[]),
        ];
        let plan = resolve(&InstallSpec::new("a", "x", ""), &manifests);

        for a in &plan {
            for b in &plan {
                if a.name_equals(b) {
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn missing_subtree_is_tolerated() {
        let manifests = vec![manifest("a", "x", "1.0.0", &[("ghost.dep", "*")])];
        let plan = resolve(&InstallSpec::new("a", "x", ""), &manifests);
        assert_eq!(plan, vec![InstallSpec::new("a", "x", "1.0.0")]);
    }

    #[test]
    fn constraint_parse_error_means_no_candidates() {
        let manifests = vec![manifest("a", "x", "1.0.0", &[])];
        let plan = resolve(&InstallSpec::new("a", "x", "not-a-version"), &manifests);
        assert!(plan.is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let manifests = vec![
            manifest("a", "x", "1.0.0", &[("b.y", "*")]),
            manifest("b", "y", "1.0.0", &[("a.x", "*")]),
        ];
        let plan = resolve(&InstallSpec::new("a", "x", ""), &manifests);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn plan_is_name_sorted() {
        let manifests = vec![
            manifest("z", "last", "1.0.0", &[("a.first", "*")]),
            manifest("a", "first", "1.0.0", &[]),
        ];
        let plan = resolve(&InstallSpec::new("z", "last", ""), &manifests);
        assert_eq!(plan[0].namespace, "a");
        assert_eq!(plan[1].namespace, "z");
    }
}
