// Copyright 2026 Pandora Web Server contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `Mapping`, the conflict-resolution algorithm run at rebuild time, and `MappingTable`, the
//! best-match structure built from its output.

use std::collections::HashMap;

use crate::error::ConfigurationError;
use crate::path::{segments, normalize, PathSpec, Specificity};
use crate::registry::SourceOrigin;
use crate::trie::Trie;

/// (handlerName, [PathSpec], source origin, fromDefaultDescriptor flag).
#[derive(Debug, Clone)]
pub struct Mapping {
    pub handler_name: String,
    pub path_specs: Vec<PathSpec>,
    pub source: SourceOrigin,
    /// Marks mappings injected as catch-all fallbacks; used only for conflict resolution.
    pub from_default_descriptor: bool,
}

/// Name reserved for the synthetic built-in 404 handler installed by `ensure_default_handler`.
pub const DEFAULT_404_HANDLER: &str = "__dispatch_core_default_404__";

/// Runs the rebuild-time conflict-resolution algorithm over every `Mapping` referencing the same
/// `PathSpec`, returning the single active (PathSpec, handlerName) pair per pattern.
///
/// 1. Drop mappings whose handler is disabled.
/// 2. If both default-descriptor and non-default mappings remain, keep only the non-default ones.
/// 3. If more than one non-default mapping remains, fail unless `allow_duplicate_mappings`, in
///    which case the last in declaration order wins and a warning is logged.
/// 4. If all remaining are defaults, keep the first in declaration order.
///
/// A `PathSpec` with no surviving mapping is simply omitted from the result; that is not an
/// error.
pub(crate) fn resolve_conflicts(
    mappings: &[Mapping],
    is_handler_enabled: impl Fn(&str) -> bool,
    allow_duplicate_mappings: bool,
) -> Result<Vec<(PathSpec, String)>, ConfigurationError> {
    let mut by_spec: HashMap<PathSpec, Vec<(usize, &Mapping)>> = HashMap::new();
    for (order, mapping) in mappings.iter().enumerate() {
        for spec in &mapping.path_specs {
            by_spec.entry(spec.clone()).or_default().push((order, mapping));
        }
    }

    let mut resolved = Vec::with_capacity(by_spec.len());
    for (spec, mut candidates) in by_spec {
        candidates.retain(|(_, m)| is_handler_enabled(&m.handler_name));
        if candidates.is_empty() {
            continue;
        }

        let any_non_default = candidates.iter().any(|(_, m)| !m.from_default_descriptor);
        if any_non_default {
            candidates.retain(|(_, m)| !m.from_default_descriptor);
        }

        let handler_name = if candidates.len() == 1 {
            candidates[0].1.handler_name.clone()
        } else if !any_non_default {
            candidates
                .iter()
                .min_by_key(|(order, _)| *order)
                .expect("candidates is non-empty")
                .1
                .handler_name
                .clone()
        } else if allow_duplicate_mappings {
            log::warn!(
                "multiple mappings declared for `{spec}`; allow_duplicate_mappings is set, \
                 choosing the one declared last"
            );
            candidates
                .iter()
                .max_by_key(|(order, _)| *order)
                .expect("candidates is non-empty")
                .1
                .handler_name
                .clone()
        } else {
            return Err(ConfigurationError::ConflictingMapping(spec.declaration()));
        };

        resolved.push((spec, handler_name));
    }
    Ok(resolved)
}

/// Value stored in the EXACT/PREFIX trie: which kind of match produced it, so `best_match` can
/// report the correct `PathSpec` and `Specificity` back to the caller without the trie itself
/// needing to know about either.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TrieEntry {
    Exact(String),
    Prefix { handler_name: String, prefix: String },
}

/// Result of a successful [`MappingTable::best_match`] lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathMatch {
    pub handler_name: String,
    pub path_spec: PathSpec,
    pub specificity: Specificity,
}

/// Ordered collection of (PathSpec, handlerName) entries returning the single best match for a
/// path per the precedence rules: EXACT > longest-matching PREFIX > SUFFIX > DEFAULT.
///
/// EXACT and PREFIX are served by a [`Trie`] (which already resolves "exact beats any prefix" and
/// "longer prefix beats shorter prefix" as part of its own lookup semantics); SUFFIX is a small
/// linear scan since suffix mappings are rarely numerous; ROOT and DEFAULT are single slots.
#[derive(Debug)]
pub(crate) struct MappingTable {
    trie: Trie<TrieEntry>,
    suffixes: Vec<(String, String)>,
    root_handler: Option<String>,
    default_handler: Option<String>,
}

impl MappingTable {
    /// Builds a table from already-conflict-resolved (PathSpec, handlerName) pairs.
    pub(crate) fn build(resolved: Vec<(PathSpec, String)>) -> Self {
        let mut builder = Trie::builder();
        let mut suffixes = Vec::new();
        let mut root_handler = None;
        let mut default_handler = None;

        for (spec, handler_name) in resolved {
            match spec {
                PathSpec::Root => root_handler = Some(handler_name),
                PathSpec::Default => default_handler = Some(handler_name),
                PathSpec::Exact(path) => {
                    builder.push(path_label(&path), TrieEntry::Exact(handler_name), None);
                }
                PathSpec::Prefix(prefix) => {
                    let entry = TrieEntry::Prefix {
                        handler_name,
                        prefix: prefix.clone(),
                    };
                    builder.push(path_label(&prefix), entry.clone(), Some(entry));
                }
                PathSpec::Suffix(suffix) => suffixes.push((suffix, handler_name)),
            }
        }

        // Longest suffix first so the first match found is the most specific one.
        suffixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            trie: builder.build(),
            suffixes,
            root_handler,
            default_handler,
        }
    }

    /// `bestMatch(path) -> (PathSpec, value) | none`. `path` must already be normalized and begin
    /// with `/`.
    pub(crate) fn best_match(&self, path: &str) -> Option<PathMatch> {
        let path = normalize(path);
        let trie_match = self.trie.lookup(segments(&path)).map(|result| match &*result {
            TrieEntry::Exact(handler_name) => PathMatch {
                handler_name: handler_name.clone(),
                path_spec: PathSpec::Exact(path.clone()),
                specificity: Specificity::Exact,
            },
            TrieEntry::Prefix { handler_name, prefix } => PathMatch {
                handler_name: handler_name.clone(),
                path_spec: PathSpec::Prefix(prefix.clone()),
                specificity: Specificity::Prefix(prefix.len()),
            },
        });

        let suffix_match = self
            .suffixes
            .iter()
            .find(|(suffix, _)| path.ends_with(suffix.as_str()))
            .map(|(suffix, handler_name)| PathMatch {
                handler_name: handler_name.clone(),
                path_spec: PathSpec::Suffix(suffix.clone()),
                specificity: Specificity::Suffix,
            });

        let root_match = self.root_handler.as_ref().map(|handler_name| {
            let specificity = if path == "/" { Specificity::Exact } else { Specificity::Default };
            PathMatch {
                handler_name: handler_name.clone(),
                path_spec: PathSpec::Root,
                specificity,
            }
        });

        // The synthetic 404 fallback only ever competes at Default and only when nothing else,
        // including the root mapping's own default role, has already claimed that tier.
        let default_match = self.default_handler.as_ref().map(|handler_name| PathMatch {
            handler_name: handler_name.clone(),
            path_spec: PathSpec::Default,
            specificity: Specificity::Default,
        });

        [trie_match, suffix_match, root_match, default_match]
            .into_iter()
            .flatten()
            .max_by_key(|m| m.specificity)
    }
}

fn path_label(path: &str) -> Vec<u8> {
    let mut label = Vec::new();
    for (i, segment) in segments(path).enumerate() {
        if i > 0 {
            label.push(crate::trie::SEPARATOR);
        }
        label.extend_from_slice(segment);
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)]) -> MappingTable {
        let resolved = entries
            .iter()
            .map(|(pattern, handler)| (PathSpec::parse(pattern).unwrap(), (*handler).to_owned()))
            .collect();
        MappingTable::build(resolved)
    }

    #[test]
    fn s1_exact_over_prefix() {
        let t = table(&[("/foo/bar", "H1"), ("/foo/*", "H2")]);
        assert_eq!(t.best_match("/foo/bar").unwrap().handler_name, "H1");
        assert_eq!(t.best_match("/foo/baz").unwrap().handler_name, "H2");
        assert!(t.best_match("/other").is_none());
    }

    #[test]
    fn s2_suffix_vs_default() {
        let t = table(&[("*.jsp", "HJ"), ("/", "HD")]);
        assert_eq!(t.best_match("/x.jsp").unwrap().handler_name, "HJ");
        assert_eq!(t.best_match("/x.html").unwrap().handler_name, "HD");
    }

    #[test]
    fn root_wins_at_root_path_even_with_default_fallback_installed() {
        let mut resolved = vec![(PathSpec::Root, "ROOT".to_owned())];
        resolved.push((PathSpec::Default, DEFAULT_404_HANDLER.to_owned()));
        let t = MappingTable::build(resolved);
        assert_eq!(t.best_match("/").unwrap().handler_name, "ROOT");
        assert_eq!(t.best_match("/anything").unwrap().handler_name, "ROOT");
    }

    #[test]
    fn synthetic_default_used_when_no_root_declared() {
        let resolved = vec![(PathSpec::Default, DEFAULT_404_HANDLER.to_owned())];
        let t = MappingTable::build(resolved);
        assert_eq!(t.best_match("/anything").unwrap().handler_name, DEFAULT_404_HANDLER);
    }

    #[test]
    fn longest_prefix_wins() {
        let t = table(&[("/a/*", "SHORT"), ("/a/b/*", "LONG")]);
        assert_eq!(t.best_match("/a/b/c").unwrap().handler_name, "LONG");
        assert_eq!(t.best_match("/a/x").unwrap().handler_name, "SHORT");
    }

    #[test]
    fn conflict_resolution_drops_disabled_handlers() {
        let mapping_a = Mapping {
            handler_name: "disabled".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        };
        let mapping_b = Mapping {
            handler_name: "enabled".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        };
        let resolved = resolve_conflicts(&[mapping_a, mapping_b], |name| name == "enabled", false).unwrap();
        assert_eq!(resolved, vec![(PathSpec::parse("/x").unwrap(), "enabled".to_owned())]);
    }

    #[test]
    fn conflict_resolution_prefers_non_default_mapping() {
        let default_mapping = Mapping {
            handler_name: "fallback".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: true,
        };
        let explicit_mapping = Mapping {
            handler_name: "explicit".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        };
        let resolved =
            resolve_conflicts(&[default_mapping, explicit_mapping], |_| true, false).unwrap();
        assert_eq!(resolved[0].1, "explicit");
    }

    #[test]
    fn conflict_resolution_errors_without_allow_duplicate_mappings() {
        let a = Mapping {
            handler_name: "a".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        };
        let b = Mapping {
            handler_name: "b".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        };
        assert!(resolve_conflicts(&[a, b], |_| true, false).is_err());
    }

    #[test]
    fn conflict_resolution_last_declared_wins_with_allow_duplicate_mappings() {
        let a = Mapping {
            handler_name: "a".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        };
        let b = Mapping {
            handler_name: "b".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        };
        let resolved = resolve_conflicts(&[a, b], |_| true, true).unwrap();
        assert_eq!(resolved[0].1, "b");
    }
}
