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

//! Mapping patterns (`PathSpec`) and the total order (`Specificity`) used to pick the best match
//! among several patterns that apply to the same path.

use std::fmt;

/// A parsed mapping pattern.
///
/// `Root` doubles as the catch-all: besides matching `/` itself at [`Specificity::Exact`], it
/// also matches every other path at [`Specificity::Default`], mirroring how a servlet container
/// treats a bare `/` mapping as both the root resource and the default servlet. `Default` is a
/// distinct, internal-only variant reserved for the synthetic built-in 404 mapping; nothing
/// produced by [`PathSpec::parse`] ever returns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSpec {
    /// The literal pattern `/`.
    Root,
    /// An exact path, e.g. `/foo/bar`.
    Exact(String),
    /// A prefix pattern, e.g. `/foo/*`. The stored string is the prefix without the trailing
    /// `/*` (`"/foo"` for the example above, `""` for the pattern `/*`).
    Prefix(String),
    /// A suffix pattern, e.g. `*.jsp`. The stored string includes the leading dot (`".jsp"`).
    Suffix(String),
    /// Internal catch-all used only for the synthetic default-404 mapping.
    Default,
}

/// A mapping pattern that could not be classified into one of the four recognized shapes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is not a valid mapping pattern (expected `/`, `/path`, `/path/*` or `*.ext`)")]
pub struct PathSpecError(pub String);

impl PathSpec {
    /// Classifies a declared pattern string into its `PathSpec` group.
    ///
    /// Patterns beginning with `/` and not containing `*` are `Exact` (or `Root` for the literal
    /// `/`); patterns beginning with `/` and ending in `/*` are `Prefix`; patterns beginning with
    /// `*.` are `Suffix`. Anything else is rejected.
    pub fn parse(pattern: &str) -> Result<Self, PathSpecError> {
        if pattern == "/" {
            Ok(Self::Root)
        } else if let Some(prefix) = pattern.strip_prefix('/').and_then(|_| pattern.strip_suffix("/*")) {
            Ok(Self::Prefix(prefix.to_owned()))
        } else if pattern.starts_with('/') && !pattern.contains('*') {
            Ok(Self::Exact(pattern.to_owned()))
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            if suffix.is_empty() || suffix.contains('*') || suffix.contains('/') {
                Err(PathSpecError(pattern.to_owned()))
            } else {
                Ok(Self::Suffix(suffix.to_owned()))
            }
        } else {
            Err(PathSpecError(pattern.to_owned()))
        }
    }

    /// The original declaration this `PathSpec` would have been parsed from.
    pub fn declaration(&self) -> String {
        match self {
            Self::Root => "/".to_owned(),
            Self::Exact(path) => path.clone(),
            Self::Prefix(prefix) => format!("{prefix}/*"),
            Self::Suffix(suffix) => format!("*{suffix}"),
            Self::Default => "/".to_owned(),
        }
    }

    /// Tests whether this pattern matches `path`, returning the specificity of the match.
    ///
    /// `path` is expected to be an already-normalized path-within-context starting with `/`.
    pub fn matches(&self, path: &str) -> Option<Specificity> {
        match self {
            Self::Root => {
                if path == "/" {
                    Some(Specificity::Exact)
                } else {
                    Some(Specificity::Default)
                }
            }
            Self::Exact(exact) => (path == exact).then_some(Specificity::Exact),
            Self::Prefix(prefix) => {
                let matches = path == prefix
                    || (path.len() > prefix.len()
                        && path.starts_with(prefix.as_str())
                        && path.as_bytes()[prefix.len()] == b'/');
                matches.then_some(Specificity::Prefix(prefix.len()))
            }
            Self::Suffix(suffix) => path.ends_with(suffix.as_str()).then_some(Specificity::Suffix),
            Self::Default => Some(Specificity::Default),
        }
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.declaration())
    }
}

/// Total order over pattern specificity: `Default < Suffix < Prefix(len) < Exact`.
///
/// Relying on the derived `Ord` for enum variants (declaration order, then payload) encodes the
/// precedence rule from the data model directly: among `Prefix` matches the longer prefix sorts
/// higher, and every `Prefix` outranks every `Suffix`/`Default` regardless of length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    Default,
    Suffix,
    Prefix(usize),
    Exact,
}

/// Normalizes a path-within-context: collapses repeated `/` and strips a trailing `/` (except for
/// the root path itself). Mirrors `pandora_module_utils::router::Path` normalization.
pub(crate) fn normalize(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut last_was_separator = false;
    for c in path.chars() {
        if c == '/' {
            if last_was_separator {
                continue;
            }
            last_was_separator = true;
        } else {
            last_was_separator = false;
        }
        result.push(c);
    }
    if result.len() > 1 && result.ends_with('/') {
        result.pop();
    }
    if !result.starts_with('/') {
        result.insert(0, '/');
    }
    result
}

/// Splits a normalized path into its non-empty segments, suitable for [`crate::trie::Trie`]
/// lookups and insertions.
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &[u8]> {
    path.as_bytes()
        .split(|c| *c == crate::trie::SEPARATOR)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classifies_each_group() {
        assert_eq!(PathSpec::parse("/").unwrap(), PathSpec::Root);
        assert_eq!(
            PathSpec::parse("/foo/bar").unwrap(),
            PathSpec::Exact("/foo/bar".to_owned())
        );
        assert_eq!(
            PathSpec::parse("/foo/*").unwrap(),
            PathSpec::Prefix("/foo".to_owned())
        );
        assert_eq!(PathSpec::parse("/*").unwrap(), PathSpec::Prefix(String::new()));
        assert_eq!(
            PathSpec::parse("*.jsp").unwrap(),
            PathSpec::Suffix(".jsp".to_owned())
        );
        assert!(PathSpec::parse("foo/bar").is_err());
        assert!(PathSpec::parse("/foo/*bar").is_err());
        assert!(PathSpec::parse("*").is_err());
    }

    #[test]
    fn root_matches_itself_exact_and_rest_default() {
        let spec = PathSpec::Root;
        assert_eq!(spec.matches("/"), Some(Specificity::Exact));
        assert_eq!(spec.matches("/anything"), Some(Specificity::Default));
    }

    #[test]
    fn prefix_matches_boundary_correctly() {
        let spec = PathSpec::Prefix("/foo".to_owned());
        assert_eq!(spec.matches("/foo"), Some(Specificity::Prefix(4)));
        assert_eq!(spec.matches("/foo/bar"), Some(Specificity::Prefix(4)));
        assert_eq!(spec.matches("/foobar"), None);
        assert_eq!(spec.matches("/fo"), None);
    }

    #[test]
    fn suffix_matches_on_ends_with() {
        let spec = PathSpec::Suffix(".jsp".to_owned());
        assert_eq!(spec.matches("/x.jsp"), Some(Specificity::Suffix));
        assert_eq!(spec.matches("/x.html"), None);
    }

    #[test]
    fn specificity_order() {
        assert!(Specificity::Exact > Specificity::Prefix(1000));
        assert!(Specificity::Prefix(5) > Specificity::Prefix(4));
        assert!(Specificity::Prefix(0) > Specificity::Suffix);
        assert!(Specificity::Suffix > Specificity::Default);
    }

    #[test]
    fn normalize_collapses_and_trims() {
        assert_eq!(normalize("/foo//bar/"), "/foo/bar");
        assert_eq!(normalize("foo/bar"), "/foo/bar");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("//"), "/");
    }
}
