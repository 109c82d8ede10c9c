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

//! Name-indexed storage of handler and filter descriptors ("servlet holders" / "filter holders"
//! in servlet-container terms) together with their lifecycle state.
//!
//! Descriptors are owned exclusively by the registry; nothing reachable from a descriptor owns
//! the dispatcher back, keeping the wiring a lookup rather than a reference cycle.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::{Filter, Handler};

/// Where a descriptor came from; drives `FilterMappingList` insertion order (see
/// [`crate::filter_mapping`]) and mapping conflict resolution (see [`crate::mapping`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOrigin {
    /// Added by the programmatic API before the dispatcher started.
    Embedded,
    /// Loaded from a deployment descriptor. Out of this crate's scope to parse; callers that
    /// implement descriptor parsing register the resulting descriptors with this origin.
    Descriptor,
    /// Declared via the dynamic registration interface, typically at runtime.
    Api,
}

/// Either a ready-made instance or a class name to instantiate lazily.
///
/// The lazy variant exists for parity with the servlet data model; this crate never performs the
/// instantiation itself (no reflection, no container) and leaves a `ClassName` target unresolved
/// in the derived indexes. Callers that want lazy instantiation are expected to register a
/// ready-made `Instance` once they have one.
pub enum Target<T: ?Sized> {
    Instance(Arc<T>),
    ClassName(String),
}

impl<T: ?Sized> std::fmt::Debug for Target<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instance(_) => f.debug_tuple("Instance").field(&"..").finish(),
            Self::ClassName(name) => f.debug_tuple("ClassName").field(name).finish(),
        }
    }
}

impl<T: ?Sized> Clone for Target<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Instance(instance) => Self::Instance(Arc::clone(instance)),
            Self::ClassName(name) => Self::ClassName(name.clone()),
        }
    }
}

/// Mutable lifecycle record for a handler ("servlet holder").
#[derive(Debug, Clone)]
pub struct HandlerDescriptor<Req, Res> {
    pub name: String,
    pub target: Target<dyn Handler<Req, Res>>,
    pub source: SourceOrigin,
    pub enabled: bool,
    pub available: bool,
    /// Absent or non-negative; handlers start in ascending order of this hint, unset hints last,
    /// ties broken by registration order.
    pub init_order: Option<u32>,
    pub(crate) registration_order: usize,
}

/// Same shape as [`HandlerDescriptor`] plus the `supports_async` flag used by the dispatcher's
/// async-supported discipline (see [`crate::dispatcher::Dispatcher::dispatch`]).
#[derive(Debug, Clone)]
pub struct FilterDescriptor<Req, Res> {
    pub name: String,
    pub target: Target<dyn Filter<Req, Res>>,
    pub source: SourceOrigin,
    pub enabled: bool,
    pub available: bool,
    pub init_order: Option<u32>,
    pub supports_async: bool,
    pub(crate) registration_order: usize,
}

/// Name-indexed store of handler and filter descriptors.
pub(crate) struct HandlerRegistry<Req, Res> {
    handlers: HashMap<String, HandlerDescriptor<Req, Res>>,
    filters: HashMap<String, FilterDescriptor<Req, Res>>,
    next_registration_order: usize,
}

impl<Req, Res> std::fmt::Debug for HandlerRegistry<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl<Req, Res> Default for HandlerRegistry<Req, Res> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            filters: HashMap::new(),
            next_registration_order: 0,
        }
    }
}

impl<Req, Res> HandlerRegistry<Req, Res> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn next_order(&mut self) -> usize {
        let order = self.next_registration_order;
        self.next_registration_order += 1;
        order
    }

    /// Registers a handler descriptor, returning `false` (and leaving the registry unchanged) if
    /// a handler with the same name already exists, mirroring the idempotent registration API.
    pub(crate) fn register_handler(
        &mut self,
        name: impl Into<String>,
        target: Target<dyn Handler<Req, Res>>,
        source: SourceOrigin,
        init_order: Option<u32>,
    ) -> bool {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return false;
        }
        let registration_order = self.next_order();
        self.handlers.insert(
            name.clone(),
            HandlerDescriptor {
                name,
                target,
                source,
                enabled: true,
                available: true,
                init_order,
                registration_order,
            },
        );
        true
    }

    /// Registers a filter descriptor. Same idempotency rule as [`Self::register_handler`].
    pub(crate) fn register_filter(
        &mut self,
        name: impl Into<String>,
        target: Target<dyn Filter<Req, Res>>,
        source: SourceOrigin,
        init_order: Option<u32>,
        supports_async: bool,
    ) -> bool {
        let name = name.into();
        if self.filters.contains_key(&name) {
            return false;
        }
        let registration_order = self.next_order();
        self.filters.insert(
            name.clone(),
            FilterDescriptor {
                name,
                target,
                source,
                enabled: true,
                available: true,
                init_order,
                supports_async,
                registration_order,
            },
        );
        true
    }

    pub(crate) fn handler(&self, name: &str) -> Option<&HandlerDescriptor<Req, Res>> {
        self.handlers.get(name)
    }

    pub(crate) fn filter(&self, name: &str) -> Option<&FilterDescriptor<Req, Res>> {
        self.filters.get(name)
    }

    pub(crate) fn handlers(&self) -> impl Iterator<Item = &HandlerDescriptor<Req, Res>> {
        self.handlers.values()
    }

    pub(crate) fn filters(&self) -> impl Iterator<Item = &FilterDescriptor<Req, Res>> {
        self.filters.values()
    }

    pub(crate) fn is_handler_enabled(&self, name: &str) -> bool {
        self.handlers.get(name).is_some_and(|h| h.enabled && h.available)
    }

    /// Purges mappings and descriptors whose origin is not `Embedded`, so a subsequent start
    /// begins from the programmatic baseline (see the stop semantics in
    /// [`crate::dispatcher::Dispatcher::stop`]).
    pub(crate) fn purge_non_embedded(&mut self) {
        self.handlers.retain(|_, h| h.source == SourceOrigin::Embedded);
        self.filters.retain(|_, f| f.source == SourceOrigin::Embedded);
    }

    /// Handlers in ascending initialization-hint order, unset hints last, ties broken by
    /// registration order.
    pub(crate) fn handlers_in_start_order(&self) -> Vec<&HandlerDescriptor<Req, Res>> {
        let mut handlers: Vec<_> = self.handlers.values().collect();
        handlers.sort_by_key(|h| (h.init_order.is_none(), h.init_order, h.registration_order));
        handlers
    }

    pub(crate) fn filters_in_start_order(&self) -> Vec<&FilterDescriptor<Req, Res>> {
        let mut filters: Vec<_> = self.filters.values().collect();
        filters.sort_by_key(|f| (f.init_order.is_none(), f.init_order, f.registration_order));
        filters
    }
}
