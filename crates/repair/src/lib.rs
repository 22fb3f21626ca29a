// SPDX-FileCopyrightText: Copyright © 2024 Nebula Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Best-effort rewrites for hand-authored role descriptors.
//!
//! Descriptor text found in the wild is frequently not valid YAML: keys
//! indented at the wrong depth, unquoted scalars that open with `[`,
//! tag lists written as bare words, platform entries missing their
//! `versions:` key. Each pass here rewrites the source text into a shape
//! the parser accepts while preserving the author's content. Passes are
//! idempotent and applied in a fixed order by [`repair`].

use regex::Regex;

/// Apply every repair pass in order.
///
/// Callers should only reach for this after an initial parse failure; if
/// the result still fails to parse, the descriptor is beyond repair.
pub fn repair(text: &str) -> String {
    let text = reindent_dependencies(text);
    let text = quote_descriptions(&text);
    let text = materialize_tag_list(&text);
    let text = inject_platform_versions(&text);
    let text = rename_dependency_role_key(&text);
    let text = strip_comment_lines(&text);
    normalize_nbsp(&text)
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Move a misplaced `dependencies:` key to the indent level of the other
/// keys under `galaxy_info:`. The target indent is the most common indent
/// among `galaxy_info`'s children.
pub fn reindent_dependencies(text: &str) -> String {
    let mut lines: Vec<String> = text.lines().map(String::from).collect();

    let Some(info_at) = lines.iter().position(|l| l.trim() == "galaxy_info:") else {
        return text.to_owned();
    };

    // Sample the indentation of the child keys
    let mut counts = std::collections::HashMap::new();
    for line in lines.iter().skip(info_at + 1) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('-') {
            continue;
        }
        let indent = leading_spaces(line);
        if indent == 0 {
            continue;
        }
        *counts.entry(indent).or_insert(0usize) += 1;
    }

    let Some((&target, _)) = counts.iter().max_by_key(|(_, count)| **count) else {
        return text.to_owned();
    };

    for line in lines.iter_mut().skip(info_at + 1) {
        if line.trim() == "dependencies:" && leading_spaces(line) != target {
            *line = format!("{}dependencies:", " ".repeat(target));
        }
    }

    lines.join("\n")
}

/// Quote `description:` values so that `[brackets]` and `(parens)` cannot
/// trip the parser. Already-quoted values pass through untouched.
pub fn quote_descriptions(text: &str) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let Some(value) = trimmed.strip_prefix("description:") else {
                return line.to_owned();
            };
            let value = value.trim();
            if value.is_empty() || (value.starts_with('"') && value.ends_with('"')) {
                return line.to_owned();
            }
            let indent = &line[..line.len() - trimmed.len()];
            format!("{}description: \"{}\"", indent, value.replace('"', "'"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert bare identifier lines following `galaxy_tags:` into list items.
/// A block that already contains a hyphenated item is left alone.
pub fn materialize_tag_list(text: &str) -> String {
    let ident = Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex");
    let mut lines: Vec<String> = text.lines().map(String::from).collect();

    let Some(tags_at) = lines.iter().position(|l| l.trim() == "galaxy_tags:") else {
        return text.to_owned();
    };
    let tags_indent = leading_spaces(&lines[tags_at]);

    // Collect the block: every following line indented deeper than the key
    let mut block = vec![];
    for (ix, line) in lines.iter().enumerate().skip(tags_at + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if leading_spaces(line) <= tags_indent {
            break;
        }
        block.push(ix);
    }

    if block
        .iter()
        .any(|&ix| lines[ix].trim_start().starts_with('-'))
    {
        return text.to_owned();
    }

    let item_indent = " ".repeat(tags_indent + 2);
    for ix in block {
        let word = lines[ix].trim().to_owned();
        if ident.is_match(&word) {
            lines[ix] = format!("{item_indent}- {word}");
        }
    }

    lines.join("\n")
}

/// Ensure every `- name:` entry under `platforms:` is followed by a
/// `versions:` key. Some authors drop the key entirely or leave only a
/// commented-out copy behind.
pub fn inject_platform_versions(text: &str) -> String {
    let mut lines: Vec<String> = text.lines().map(String::from).collect();

    let Some(platforms_at) = lines.iter().position(|l| l.trim() == "platforms:") else {
        return text.to_owned();
    };
    let platforms_indent = leading_spaces(&lines[platforms_at]);

    let mut out: Vec<String> = lines[..=platforms_at].to_vec();
    let mut ix = platforms_at + 1;
    while ix < lines.len() {
        let line = &lines[ix];
        let trimmed = line.trim();
        if !trimmed.is_empty() && leading_spaces(line) <= platforms_indent {
            break;
        }

        out.push(line.clone());
        if trimmed.starts_with("- name:") {
            let entry_indent = leading_spaces(line);
            // peek past comments for the versions key
            let mut next = ix + 1;
            while next < lines.len() && lines[next].trim_start().starts_with('#') {
                next += 1;
            }
            let has_versions = next < lines.len() && lines[next].trim_start().starts_with("versions:");
            if !has_versions {
                out.push(format!("{}versions:", " ".repeat(entry_indent + 2)));
            }
        }
        ix += 1;
    }
    out.extend(lines[ix..].iter().cloned());

    out.join("\n")
}

/// The tolerant dependency form accepts `role:` as a synonym for `name:`.
pub fn rename_dependency_role_key(text: &str) -> String {
    let mut in_deps = false;
    let mut deps_indent = 0;

    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed == "dependencies:" {
                in_deps = true;
                deps_indent = leading_spaces(line);
                return line.to_owned();
            }
            if in_deps {
                if !trimmed.is_empty() && leading_spaces(line) <= deps_indent {
                    in_deps = false;
                } else if let Some(rest) = trimmed.strip_prefix("- role:") {
                    let indent = &line[..line.len() - trimmed.len()];
                    return format!("{indent}- name:{rest}");
                } else if let Some(rest) = trimmed.strip_prefix("role:") {
                    let indent = &line[..line.len() - trimmed.len()];
                    return format!("{indent}name:{rest}");
                }
            }
            line.to_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop whole-line comments.
pub fn strip_comment_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace U+00A0 with an ASCII space.
pub fn normalize_nbsp(text: &str) -> String {
    text.replace('\u{00a0}', " ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reindents_misplaced_dependencies() {
        let src = "galaxy_info:\n  author: a\n   dependencies:\n  description: thing\n";
        let fixed = reindent_dependencies(src);
        assert!(fixed.contains("\n  dependencies:"));
        assert_eq!(reindent_dependencies(&fixed), fixed);
    }

    #[test]
    fn quotes_bracketed_descriptions() {
        let src = "  description: [DRAFT] STIG for RHVH";
        let fixed = quote_descriptions(src);
        assert_eq!(fixed, "  description: \"[DRAFT] STIG for RHVH\"");
        assert_eq!(quote_descriptions(&fixed), fixed);
    }

    #[test]
    fn leaves_quoted_descriptions_alone() {
        let src = "  description: \"already fine\"";
        assert_eq!(quote_descriptions(src), src);
    }

    #[test]
    fn materializes_bare_tags() {
        let src = "galaxy_info:\n  galaxy_tags:\n    foo\n    bar\n";
        let fixed = materialize_tag_list(src);
        assert!(fixed.contains("    - foo"));
        assert!(fixed.contains("    - bar"));
        assert_eq!(materialize_tag_list(&fixed), fixed);
    }

    #[test]
    fn keeps_existing_tag_items() {
        let src = "galaxy_info:\n  galaxy_tags:\n    - foo\n    bar\n";
        assert_eq!(materialize_tag_list(src), src);
    }

    #[test]
    fn injects_missing_platform_versions() {
        let src = "platforms:\n  - name: EL\n  - name: Fedora\n    versions:\n      - all\n";
        let fixed = inject_platform_versions(src);
        let expected = "platforms:\n  - name: EL\n    versions:\n  - name: Fedora\n    versions:\n      - all";
        assert_eq!(fixed, expected);
        assert_eq!(inject_platform_versions(&fixed), fixed);
    }

    #[test]
    fn injects_past_commented_versions() {
        let src = "platforms:\n  - name: EL\n    # versions:\n    #   - all\n";
        let fixed = inject_platform_versions(src);
        assert!(fixed.contains("- name: EL\n    versions:\n"));
    }

    #[test]
    fn renames_role_to_name_in_dependencies() {
        let src = "dependencies:\n  - role: acme.util\n  - name: acme.other\n";
        let fixed = rename_dependency_role_key(src);
        assert!(fixed.contains("- name: acme.util"));
        assert!(fixed.contains("- name: acme.other"));
        assert_eq!(rename_dependency_role_key(&fixed), fixed);
    }

    #[test]
    fn role_key_outside_dependencies_is_untouched() {
        let src = "galaxy_info:\n  role: something\n";
        assert_eq!(rename_dependency_role_key(src), src);
    }

    #[test]
    fn strips_comments_and_nbsp() {
        let src = "# header\nkey: value\u{00a0}here\n  # indented comment\n";
        let fixed = normalize_nbsp(&strip_comment_lines(src));
        assert_eq!(fixed, "key: value here");
    }

    #[test]
    fn full_repair_recovers_spec_fixture() {
        let src = "galaxy_info:\n  author: a\n   dependencies:\n  description: [draft] thing\n  galaxy_tags:\n    foo\n    bar\n";
        let fixed = repair(src);
        assert!(fixed.contains("\n  dependencies:"));
        assert!(fixed.contains("description: \"[draft] thing\""));
        assert!(fixed.contains("- foo"));
        assert!(fixed.contains("- bar"));
        // the whole pipeline is idempotent
        assert_eq!(repair(&fixed), fixed);
    }
}
