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

//! The master list of filter mappings and the insertion rules that keep it partitioned into
//! three contiguous zones: programmatic-prepended, descriptor-declared, programmatic-appended.

use std::ops::Range;

use crate::context::DispatchMask;
use crate::path::PathSpec;
use crate::registry::SourceOrigin;

/// A target name pattern a `FilterMapping` may carry: an exact name, or the wildcard `*` meaning
/// "every handler".
pub const WILDCARD_NAME: &str = "*";

/// (filterName, optional PathSpec list, optional target name list, dispatch mask, source origin).
/// Either the path spec list or the name list (or both) is non-empty.
#[derive(Debug, Clone)]
pub struct FilterMapping {
    pub filter_name: String,
    pub path_specs: Vec<PathSpec>,
    pub target_names: Vec<String>,
    pub dispatches: DispatchMask,
    pub source: SourceOrigin,
}

impl FilterMapping {
    /// Whether any of this mapping's `PathSpec`s match `path`.
    pub fn matches_path(&self, path: &str) -> bool {
        self.path_specs.iter().any(|spec| spec.matches(path).is_some())
    }
}

/// Ordered list of `FilterMapping`s with insertion rules preserving the
/// prepend / descriptor-declared / append partitioning.
///
/// Rather than the two sentinel indexes (`matchBeforeIndex`, `matchAfterIndex`, `-1` meaning
/// empty) from the source algorithm, this tracks the size of the prepend and append zones
/// directly; the descriptor zone is always whatever is left in the middle. The externally
/// observable insertion behavior is identical, but there is no `-1` case to special-case.
#[derive(Debug, Clone, Default)]
pub struct FilterMappingList {
    entries: Vec<FilterMapping>,
    prepend_count: usize,
    append_count: usize,
}

impl FilterMappingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// `append(m)`: an API-sourced mapping is placed at the very end, growing the append zone;
    /// anything else is placed immediately before the current append zone, growing the
    /// descriptor zone instead.
    pub fn append(&mut self, mapping: FilterMapping) {
        if mapping.source == SourceOrigin::Api {
            self.entries.push(mapping);
            self.append_count += 1;
        } else {
            let index = self.entries.len() - self.append_count;
            self.entries.insert(index, mapping);
        }
    }

    /// `prepend(m)`: an API-sourced mapping is placed at the end of the prepend zone; anything
    /// else is placed at position 0, ahead of the existing prepend zone. Either way the prepend
    /// zone grows by one.
    pub fn prepend(&mut self, mapping: FilterMapping) {
        if mapping.source == SourceOrigin::Api {
            self.entries.insert(self.prepend_count, mapping);
        } else {
            self.entries.insert(0, mapping);
        }
        self.prepend_count += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterMapping> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The three zones as index ranges into the master order: prepend, descriptor-declared,
    /// append. Always contiguous and in this order, regardless of insertion history.
    pub fn zones(&self) -> (Range<usize>, Range<usize>, Range<usize>) {
        let prepend = 0..self.prepend_count;
        let append_start = self.entries.len() - self.append_count;
        let descriptor = self.prepend_count..append_start;
        let append = append_start..self.entries.len();
        (prepend, descriptor, append)
    }

    /// Entries carrying at least one `PathSpec`, preserving master order. Feeds
    /// `Indexes::path_filters` during rebuild.
    pub(crate) fn path_mappings(&self) -> impl Iterator<Item = &FilterMapping> {
        self.entries.iter().filter(|m| !m.path_specs.is_empty())
    }

    /// Entries carrying at least one target name, preserving master order. Feeds
    /// `Indexes::name_filters` during rebuild.
    pub(crate) fn name_mappings(&self) -> impl Iterator<Item = &FilterMapping> {
        self.entries.iter().filter(|m| !m.target_names.is_empty())
    }
}
