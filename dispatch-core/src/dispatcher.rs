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

//! The per-request entry point: ties path resolution, chain building, caching and invocation
//! together, and owns the registration API and rebuild/start/stop lifecycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::cache::ChainCache;
use crate::chain::{Chain, ChainBuilder, Handler, ResolvedFilter};
use crate::context::{DispatchContextHolder, DispatchResponseHolder, DispatchType, PathMapping};
use crate::error::{ConfigurationError, DispatchError, LifecycleError, LifecycleFailure};
use crate::filter_mapping::FilterMappingList;
use crate::mapping::{self, Mapping, MappingTable, DEFAULT_404_HANDLER};
use crate::path::PathSpec;
use crate::registry::{HandlerRegistry, SourceOrigin, Target};

/// Initialized when the dispatcher starts, torn down when it stops. Listeners have no per-request
/// role and are not part of the data model proper; they exist purely as the hook `start`/`stop`
/// mention.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn on_start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    async fn on_stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Writes HTTP status 404 with an empty body on any method. Installed automatically as the
/// target of the synthetic default mapping when `ensure_default_handler` is set and nothing else
/// claims the root.
struct NotFoundHandler;

#[async_trait]
impl<Req, Res> Handler<Req, Res> for NotFoundHandler
where
    Req: Send + Sync,
    Res: Send + Sync + DispatchResponseHolder,
{
    async fn handle(&self, _req: &mut Req, res: &mut Res, _ctx: &mut crate::context::RequestContext) -> Result<(), DispatchError> {
        res.set_status(404);
        res.set_body(Vec::new());
        Ok(())
    }
}

/// The mutable master state: registries and lists mutated only under `Dispatcher::master`'s lock.
struct MasterState<Req, Res> {
    registry: HandlerRegistry<Req, Res>,
    mappings: Vec<Mapping>,
    filter_mappings: FilterMappingList,
    listeners: Vec<Arc<dyn Listener>>,
    allow_duplicate_mappings: bool,
    ensure_default_handler: bool,
    started: bool,
}

impl<Req, Res> MasterState<Req, Res>
where
    Req: Send + Sync + 'static,
    Res: Send + Sync + DispatchResponseHolder + 'static,
{
    fn new() -> Self {
        let mut registry = HandlerRegistry::new();
        registry.register_handler(
            DEFAULT_404_HANDLER,
            Target::Instance(Arc::new(NotFoundHandler) as Arc<dyn Handler<Req, Res>>),
            SourceOrigin::Embedded,
            None,
        );
        Self {
            registry,
            mappings: Vec::new(),
            filter_mappings: FilterMappingList::new(),
            listeners: Vec::new(),
            allow_duplicate_mappings: false,
            ensure_default_handler: false,
            started: false,
        }
    }
}

/// The five derived indexes, recomputed wholesale by `rebuild` and published by atomic
/// replacement: `nameToHandler` and `nameToFilter` here hold resolved, directly invocable
/// instances so lookups never need to go back through the registry's lock.
pub(crate) struct Indexes<Req, Res> {
    pub(crate) name_to_handler: HashMap<String, Arc<dyn Handler<Req, Res>>>,
    pub(crate) path_to_handler: MappingTable,
    pub(crate) name_to_filter: HashMap<String, ResolvedFilter<Req, Res>>,
    pub(crate) path_filters: Vec<crate::filter_mapping::FilterMapping>,
    pub(crate) name_filters: HashMap<String, Vec<crate::filter_mapping::FilterMapping>>,
}

impl<Req, Res> Indexes<Req, Res> {
    fn empty() -> Self {
        Self {
            name_to_handler: HashMap::new(),
            path_to_handler: MappingTable::build(Vec::new()),
            name_to_filter: HashMap::new(),
            path_filters: Vec::new(),
            name_filters: HashMap::new(),
        }
    }
}

/// Per-request entry point tying path resolution, chain building, caching and invocation
/// together.
pub struct Dispatcher<Req, Res> {
    master: Mutex<MasterState<Req, Res>>,
    indexes: RwLock<Arc<Indexes<Req, Res>>>,
    cache: ChainCache<Req, Res>,
}

impl<Req, Res> std::fmt::Debug for Dispatcher<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl<Req, Res> Default for Dispatcher<Req, Res>
where
    Req: Send + Sync + 'static,
    Res: Send + Sync + DispatchResponseHolder + 'static,
{
    fn default() -> Self {
        Self::new(128, true)
    }
}

impl<Req, Res> Dispatcher<Req, Res>
where
    Req: Send + Sync + 'static,
    Res: Send + Sync + DispatchResponseHolder + 'static,
{
    pub fn new(max_cache_entries: usize, cache_enabled: bool) -> Self {
        Self {
            master: Mutex::new(MasterState::new()),
            indexes: RwLock::new(Arc::new(Indexes::empty())),
            cache: ChainCache::new(max_cache_entries, cache_enabled),
        }
    }

    // ---- Registration API (§6): idempotent, locked --------------------------------------

    pub fn register_handler(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn Handler<Req, Res>>,
        source: SourceOrigin,
        init_order: Option<u32>,
    ) -> bool {
        let mut master = self.master.lock().expect("dispatcher mutex poisoned");
        master.registry.register_handler(name, Target::Instance(handler), source, init_order)
    }

    pub fn register_filter(
        &self,
        name: impl Into<String>,
        filter: Arc<dyn crate::chain::Filter<Req, Res>>,
        source: SourceOrigin,
        init_order: Option<u32>,
        supports_async: bool,
    ) -> bool {
        let mut master = self.master.lock().expect("dispatcher mutex poisoned");
        master
            .registry
            .register_filter(name, Target::Instance(filter), source, init_order, supports_async)
    }

    pub fn register_listener(&self, listener: Arc<dyn Listener>) {
        let mut master = self.master.lock().expect("dispatcher mutex poisoned");
        master.listeners.push(listener);
    }

    pub fn register_mapping(&self, mapping: Mapping) {
        let mut master = self.master.lock().expect("dispatcher mutex poisoned");
        master.mappings.push(mapping);
    }

    pub fn add_filter_mapping(&self, mapping: crate::filter_mapping::FilterMapping) {
        let mut master = self.master.lock().expect("dispatcher mutex poisoned");
        master.filter_mappings.append(mapping);
    }

    pub fn prepend_filter_mapping(&self, mapping: crate::filter_mapping::FilterMapping) {
        let mut master = self.master.lock().expect("dispatcher mutex poisoned");
        master.filter_mappings.prepend(mapping);
    }

    pub fn set_max_cache_entries(&self, n: usize) {
        let _master = self.master.lock().expect("dispatcher mutex poisoned");
        self.cache.set_max_entries(n);
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        let _master = self.master.lock().expect("dispatcher mutex poisoned");
        self.cache.set_enabled(enabled);
    }

    pub fn set_allow_duplicate_mappings(&self, allow: bool) {
        self.master.lock().expect("dispatcher mutex poisoned").allow_duplicate_mappings = allow;
    }

    pub fn set_ensure_default_handler(&self, ensure: bool) {
        self.master.lock().expect("dispatcher mutex poisoned").ensure_default_handler = ensure;
    }

    // ---- Rebuild and lifecycle (§4.6) ----------------------------------------------------

    /// Recomputes all derived indexes from the master lists and publishes them by atomic
    /// replacement. Synchronous and mutually exclusive with itself (serialized by the master
    /// lock). Always invalidates the chain cache on success; leaves the prior indexes and cache
    /// untouched on failure.
    pub fn rebuild(&self) -> Result<(), ConfigurationError> {
        let master = self.master.lock().expect("dispatcher mutex poisoned");

        for filter_mapping in master.filter_mappings.iter() {
            if master.registry.filter(&filter_mapping.filter_name).is_none() {
                return Err(ConfigurationError::UnknownFilter(filter_mapping.filter_name.clone()));
            }
        }
        for servlet_mapping in &master.mappings {
            if master.registry.handler(&servlet_mapping.handler_name).is_none() {
                return Err(ConfigurationError::UnknownHandler(servlet_mapping.handler_name.clone()));
            }
        }

        let mut resolved = mapping::resolve_conflicts(
            &master.mappings,
            |name| master.registry.is_handler_enabled(name),
            master.allow_duplicate_mappings,
        )?;

        let covers_root = resolved.iter().any(|(spec, _)| spec.matches("/").is_some());
        if !covers_root && master.ensure_default_handler {
            resolved.push((PathSpec::Default, DEFAULT_404_HANDLER.to_owned()));
        }

        let path_to_handler = MappingTable::build(resolved);

        let name_to_handler: HashMap<_, _> = master
            .registry
            .handlers()
            .filter(|h| h.enabled && h.available)
            .filter_map(|h| match &h.target {
                Target::Instance(instance) => Some((h.name.clone(), Arc::clone(instance))),
                Target::ClassName(_) => None,
            })
            .collect();

        let name_to_filter: HashMap<_, _> = master
            .registry
            .filters()
            .filter(|f| f.enabled && f.available)
            .filter_map(|f| match &f.target {
                Target::Instance(instance) => Some((
                    f.name.clone(),
                    ResolvedFilter {
                        supports_async: f.supports_async,
                        filter: Arc::clone(instance),
                    },
                )),
                Target::ClassName(_) => None,
            })
            .collect();

        let path_filters: Vec<_> = master.filter_mappings.path_mappings().cloned().collect();

        let mut name_filters: HashMap<String, Vec<_>> = HashMap::new();
        for filter_mapping in master.filter_mappings.name_mappings() {
            for target_name in &filter_mapping.target_names {
                name_filters.entry(target_name.clone()).or_default().push(filter_mapping.clone());
            }
        }

        let new_indexes = Arc::new(Indexes {
            name_to_handler,
            path_to_handler,
            name_to_filter,
            path_filters,
            name_filters,
        });

        *self.indexes.write().expect("dispatcher rwlock poisoned") = new_indexes;
        self.cache.invalidate();
        Ok(())
    }

    /// Start semantics: rebuild, then listeners, then filters (ascending init-order hint), then
    /// handlers (same order). Individual failures are logged and accumulated; teardown of
    /// unrelated components still runs, and the aggregate is raised at the end.
    ///
    /// Mutations registered after `start` are *not* implicitly started — unlike the source this
    /// is distilled from, `rebuild` here never triggers component start as a side effect. Call
    /// `start` again to bring newly registered components up; already-running components'
    /// `start` will be invoked a second time; implementations with non-idempotent startup should
    /// guard against that themselves.
    pub async fn start(&self) -> Result<(), LifecycleFailure> {
        let (filters, handlers, listeners) = {
            let mut master = self.master.lock().expect("dispatcher mutex poisoned");
            if let Err(err) = self.rebuild() {
                log::error!("rebuild failed during start: {err}");
                return Err(LifecycleFailure(vec![LifecycleError {
                    component: "dispatcher",
                    name: "rebuild".to_owned(),
                    action: "start",
                    source: Box::new(err),
                }]));
            }
            master.started = true;
            let filters: Vec<_> = master
                .registry
                .filters_in_start_order()
                .into_iter()
                .filter_map(|f| match &f.target {
                    Target::Instance(instance) => Some((f.name.clone(), Arc::clone(instance))),
                    Target::ClassName(_) => None,
                })
                .collect();
            let handlers: Vec<_> = master
                .registry
                .handlers_in_start_order()
                .into_iter()
                .filter_map(|h| match &h.target {
                    Target::Instance(instance) => Some((h.name.clone(), Arc::clone(instance))),
                    Target::ClassName(_) => None,
                })
                .collect();
            (filters, handlers, master.listeners.clone())
        };

        let mut failures = Vec::new();

        for listener in &listeners {
            if let Err(source) = listener.on_start().await {
                log::warn!("listener failed to start: {source}");
                failures.push(LifecycleError {
                    component: "listener",
                    name: String::new(),
                    action: "start",
                    source,
                });
            }
        }
        for (name, filter) in &filters {
            if let Err(source) = filter.start().await {
                log::warn!("filter `{name}` failed to start: {source}");
                failures.push(LifecycleError { component: "filter", name: name.clone(), action: "start", source });
            }
        }
        for (name, handler) in &handlers {
            if let Err(source) = handler.start().await {
                log::warn!("handler `{name}` failed to start: {source}");
                failures.push(LifecycleError { component: "handler", name: name.clone(), action: "start", source });
            }
        }

        LifecycleFailure::from_vec(failures)
    }

    /// Stop semantics: the reverse of start (handlers, then filters, then listeners), and
    /// mappings/descriptors whose origin is not `Embedded` are purged so a subsequent start
    /// begins from the programmatic baseline.
    pub async fn stop(&self) -> Result<(), LifecycleFailure> {
        let (filters, handlers, listeners) = {
            let master = self.master.lock().expect("dispatcher mutex poisoned");
            let filters: Vec<_> = master
                .registry
                .filters_in_start_order()
                .into_iter()
                .rev()
                .filter_map(|f| match &f.target {
                    Target::Instance(instance) => Some((f.name.clone(), Arc::clone(instance))),
                    Target::ClassName(_) => None,
                })
                .collect();
            let handlers: Vec<_> = master
                .registry
                .handlers_in_start_order()
                .into_iter()
                .rev()
                .filter_map(|h| match &h.target {
                    Target::Instance(instance) => Some((h.name.clone(), Arc::clone(instance))),
                    Target::ClassName(_) => None,
                })
                .collect();
            (filters, handlers, master.listeners.clone())
        };

        let mut failures = Vec::new();

        for (name, handler) in &handlers {
            if let Err(source) = handler.stop().await {
                log::warn!("handler `{name}` failed to stop: {source}");
                failures.push(LifecycleError { component: "handler", name: name.clone(), action: "stop", source });
            }
        }
        for (name, filter) in &filters {
            if let Err(source) = filter.stop().await {
                log::warn!("filter `{name}` failed to stop: {source}");
                failures.push(LifecycleError { component: "filter", name: name.clone(), action: "stop", source });
            }
        }
        for listener in listeners.iter().rev() {
            if let Err(source) = listener.on_stop().await {
                log::warn!("listener failed to stop: {source}");
                failures.push(LifecycleError { component: "listener", name: String::new(), action: "stop", source });
            }
        }

        {
            let mut master = self.master.lock().expect("dispatcher mutex poisoned");
            master.registry.purge_non_embedded();
            master.mappings.retain(|m| m.source == SourceOrigin::Embedded);
            master.filter_mappings = std::mem::take(&mut master.filter_mappings)
                .iter()
                .filter(|m| m.source == SourceOrigin::Embedded)
                .cloned()
                .fold(FilterMappingList::new(), |mut list, m| {
                    list.append(m);
                    list
                });
            master.started = false;
        }

        LifecycleFailure::from_vec(failures)
    }

    // ---- Dispatch (§4.5) -------------------------------------------------------------------

    /// `dispatch(target, req, res)`. `target`'s leading `/` selects path-based resolution;
    /// anything else is looked up by handler name.
    pub async fn dispatch(&self, target: &str, req: &mut Req, res: &mut Res) -> Result<(), DispatchError>
    where
        Req: DispatchContextHolder,
    {
        let dispatch_type = req.dispatch_type();
        let indexes = Arc::clone(&self.indexes.read().expect("dispatcher rwlock poisoned"));

        let (handler_name, handler, path_mapping, cache_key) = match self.resolve(target, &indexes) {
            Some(resolved) => resolved,
            None => return Err(DispatchError::NotFound(target.to_owned())),
        };

        let previous_mapping = if dispatch_type == DispatchType::Include {
            req.swap_include_mapping(Some(path_mapping))
        } else {
            req.swap_path_mapping(Some(path_mapping))
        };

        let chain = self.chain_for(dispatch_type, target, &handler_name, handler, &cache_key, &indexes).await;

        let mut ctx = crate::context::RequestContext::new(dispatch_type);
        ctx.async_permitted = req.async_permitted();

        let result = match chain {
            Some(chain) => chain.walk().proceed(req, res, &mut ctx).await,
            None => {
                // "No chain": invoke the target directly, still honoring the async-permitted
                // value the caller already established.
                self.invoke_without_chain(&indexes, &handler_name, req, res, &mut ctx).await
            }
        };

        req.mark_handled();
        req.set_async_permitted(ctx.async_permitted);
        if dispatch_type == DispatchType::Include {
            req.swap_include_mapping(previous_mapping);
        } else {
            req.swap_path_mapping(previous_mapping);
        }

        result
    }

    fn resolve(
        &self,
        target: &str,
        indexes: &Indexes<Req, Res>,
    ) -> Option<(String, Arc<dyn Handler<Req, Res>>, PathMapping, String)> {
        if target.starts_with('/') {
            let path = target;
            let best = indexes.path_to_handler.best_match(path)?;
            let handler = indexes.name_to_handler.get(&best.handler_name)?;
            let (servlet_path, path_info) = servlet_path_info(&best.path_spec, path);
            let path_mapping = PathMapping {
                matched_value: path.to_owned(),
                pattern: best.path_spec.declaration(),
                servlet_path,
                path_info,
            };
            Some((best.handler_name, Arc::clone(handler), path_mapping, path.to_owned()))
        } else {
            let handler = indexes.name_to_handler.get(target)?;
            let path_mapping = PathMapping {
                matched_value: target.to_owned(),
                pattern: target.to_owned(),
                servlet_path: target.to_owned(),
                path_info: None,
            };
            Some((target.to_owned(), Arc::clone(handler), path_mapping, target.to_owned()))
        }
    }

    async fn chain_for(
        &self,
        dispatch_type: DispatchType,
        target: &str,
        handler_name: &str,
        handler: Arc<dyn Handler<Req, Res>>,
        cache_key: &str,
        indexes: &Indexes<Req, Res>,
    ) -> Option<Arc<Chain<Req, Res>>> {
        if let Some(cached) = self.cache.lookup(dispatch_type, cache_key).await {
            return Some(cached);
        }

        let path = target.starts_with('/').then_some(target);
        let built = ChainBuilder::build(
            path,
            dispatch_type,
            handler_name,
            handler_name,
            handler,
            &indexes.path_filters,
            &indexes.name_filters,
            &indexes.name_to_filter,
        )?;
        let chain = Arc::new(built);
        self.cache.insert(dispatch_type, cache_key.to_owned(), Arc::clone(&chain)).await;
        Some(chain)
    }

    async fn invoke_without_chain(
        &self,
        indexes: &Indexes<Req, Res>,
        handler_name: &str,
        req: &mut Req,
        res: &mut Res,
        ctx: &mut crate::context::RequestContext,
    ) -> Result<(), DispatchError> {
        let handler = indexes
            .name_to_handler
            .get(handler_name)
            .expect("handler resolved moments ago must still be in this snapshot")
            .clone();
        handler.handle(req, res, ctx).await
    }
}

/// Derives `(servletPath, pathInfo)` from the `PathSpec` that resolved a request, per the
/// classic servlet request-mapping convention: the exact/prefix match consumes `servletPath`,
/// anything left over (only possible for prefix and default-ish matches) becomes `pathInfo`.
fn servlet_path_info(spec: &PathSpec, path: &str) -> (String, Option<String>) {
    match spec {
        PathSpec::Exact(exact) => (exact.clone(), None),
        PathSpec::Prefix(prefix) => {
            let path_info = (path.len() > prefix.len()).then(|| path[prefix.len()..].to_owned());
            (prefix.clone(), path_info)
        }
        PathSpec::Suffix(_) => (path.to_owned(), None),
        PathSpec::Root => {
            if path == "/" {
                ("/".to_owned(), None)
            } else {
                (String::new(), Some(path.to_owned()))
            }
        }
        PathSpec::Default => (String::new(), Some(path.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Filter;
    use crate::context::RequestContext;
    use crate::filter_mapping::FilterMapping;
    use async_trait::async_trait;
    use test_log::test;

    #[derive(Debug, Default, Clone)]
    struct TestRequest {
        dispatch_type: DispatchType,
        async_permitted: bool,
        path_mapping: Option<PathMapping>,
        include_mapping: Option<PathMapping>,
        handled: bool,
        trace: Vec<&'static str>,
    }

    impl DispatchContextHolder for TestRequest {
        fn dispatch_type(&self) -> DispatchType {
            self.dispatch_type
        }
        fn async_permitted(&self) -> bool {
            self.async_permitted
        }
        fn set_async_permitted(&mut self, value: bool) {
            self.async_permitted = value;
        }
        fn swap_path_mapping(&mut self, mapping: Option<PathMapping>) -> Option<PathMapping> {
            std::mem::replace(&mut self.path_mapping, mapping)
        }
        fn swap_include_mapping(&mut self, mapping: Option<PathMapping>) -> Option<PathMapping> {
            std::mem::replace(&mut self.include_mapping, mapping)
        }
        fn mark_handled(&mut self) {
            self.handled = true;
        }
    }

    struct RecordingHandler(&'static str);

    #[async_trait]
    impl Handler<TestRequest, ()> for RecordingHandler {
        async fn handle(&self, req: &mut TestRequest, _res: &mut (), _ctx: &mut RequestContext) -> Result<(), DispatchError> {
            req.trace.push(self.0);
            Ok(())
        }
    }

    struct RecordingFilter(&'static str);

    #[async_trait]
    impl Filter<TestRequest, ()> for RecordingFilter {
        async fn do_filter(
            &self,
            req: &mut TestRequest,
            res: &mut (),
            ctx: &mut RequestContext,
            next: &mut crate::chain::ChainWalk<'_, TestRequest, ()>,
        ) -> Result<(), DispatchError> {
            req.trace.push(self.0);
            next.proceed(req, res, ctx).await
        }
    }

    fn dispatcher() -> Dispatcher<TestRequest, ()> {
        Dispatcher::new(128, true)
    }

    #[test(tokio::test)]
    async fn s1_exact_over_prefix_end_to_end() {
        let d = dispatcher();
        d.register_handler("H1", Arc::new(RecordingHandler("H1")), SourceOrigin::Embedded, None);
        d.register_handler("H2", Arc::new(RecordingHandler("H2")), SourceOrigin::Embedded, None);
        d.register_mapping(Mapping {
            handler_name: "H1".to_owned(),
            path_specs: vec![PathSpec::parse("/foo/bar").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        });
        d.register_mapping(Mapping {
            handler_name: "H2".to_owned(),
            path_specs: vec![PathSpec::parse("/foo/*").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        });
        d.rebuild().unwrap();

        let mut req = TestRequest { async_permitted: true, ..Default::default() };
        d.dispatch("/foo/bar", &mut req, &mut ()).await.unwrap();
        assert_eq!(req.trace, vec!["H1"]);

        let mut req = TestRequest { async_permitted: true, ..Default::default() };
        d.dispatch("/foo/baz", &mut req, &mut ()).await.unwrap();
        assert_eq!(req.trace, vec!["H2"]);

        let mut req = TestRequest { async_permitted: true, ..Default::default() };
        assert!(matches!(d.dispatch("/other", &mut req, &mut ()).await, Err(DispatchError::NotFound(_))));
    }

    #[test(tokio::test)]
    async fn s3_filter_ordering_partitions_end_to_end() {
        let d = dispatcher();
        d.register_handler("H", Arc::new(RecordingHandler("handler")), SourceOrigin::Embedded, None);
        d.register_mapping(Mapping {
            handler_name: "H".to_owned(),
            path_specs: vec![PathSpec::parse("/*").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        });
        d.register_filter("D1", Arc::new(RecordingFilter("D1")), SourceOrigin::Descriptor, None, true);
        d.register_filter("P1", Arc::new(RecordingFilter("P1")), SourceOrigin::Api, None, true);
        d.register_filter("A1", Arc::new(RecordingFilter("A1")), SourceOrigin::Api, None, true);

        let path_spec = vec![PathSpec::parse("/*").unwrap()];
        d.add_filter_mapping(FilterMapping {
            filter_name: "D1".to_owned(),
            path_specs: path_spec.clone(),
            target_names: Vec::new(),
            dispatches: Default::default(),
            source: SourceOrigin::Descriptor,
        });
        d.prepend_filter_mapping(FilterMapping {
            filter_name: "P1".to_owned(),
            path_specs: path_spec.clone(),
            target_names: Vec::new(),
            dispatches: Default::default(),
            source: SourceOrigin::Api,
        });
        d.add_filter_mapping(FilterMapping {
            filter_name: "A1".to_owned(),
            path_specs: path_spec,
            target_names: Vec::new(),
            dispatches: Default::default(),
            source: SourceOrigin::Api,
        });
        d.rebuild().unwrap();

        let mut req = TestRequest { async_permitted: true, ..Default::default() };
        d.dispatch("/x", &mut req, &mut ()).await.unwrap();
        assert_eq!(req.trace, vec!["P1", "D1", "A1", "handler"]);
    }

    #[test(tokio::test)]
    async fn s4_dispatch_type_filtering() {
        let d = dispatcher();
        d.register_handler("H", Arc::new(RecordingHandler("handler")), SourceOrigin::Embedded, None);
        d.register_mapping(Mapping {
            handler_name: "H".to_owned(),
            path_specs: vec![PathSpec::parse("/*").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        });
        d.register_filter("F", Arc::new(RecordingFilter("F")), SourceOrigin::Embedded, None, true);
        d.add_filter_mapping(FilterMapping {
            filter_name: "F".to_owned(),
            path_specs: vec![PathSpec::parse("/*").unwrap()],
            target_names: Vec::new(),
            dispatches: crate::context::DispatchMask::new(crate::context::DispatchMask::INCLUDE),
            source: SourceOrigin::Embedded,
        });
        d.rebuild().unwrap();

        let mut req = TestRequest { dispatch_type: DispatchType::Request, async_permitted: true, ..Default::default() };
        d.dispatch("/x", &mut req, &mut ()).await.unwrap();
        assert_eq!(req.trace, vec!["handler"]);

        let mut req = TestRequest { dispatch_type: DispatchType::Include, async_permitted: true, ..Default::default() };
        d.dispatch("/x", &mut req, &mut ()).await.unwrap();
        assert_eq!(req.trace, vec!["F", "handler"]);
    }

    #[test(tokio::test)]
    async fn s5_async_flip_restored_on_exit() {
        struct AsyncCheckingHandler;
        #[async_trait]
        impl Handler<TestRequest, ()> for AsyncCheckingHandler {
            async fn handle(&self, req: &mut TestRequest, _res: &mut (), ctx: &mut RequestContext) -> Result<(), DispatchError> {
                req.trace.push(if ctx.async_permitted { "async" } else { "sync" });
                Ok(())
            }
        }

        let d = dispatcher();
        d.register_handler("H", Arc::new(AsyncCheckingHandler), SourceOrigin::Embedded, None);
        d.register_mapping(Mapping {
            handler_name: "H".to_owned(),
            path_specs: vec![PathSpec::parse("/*").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        });
        d.register_filter("F", Arc::new(RecordingFilter("F")), SourceOrigin::Embedded, None, false);
        d.add_filter_mapping(FilterMapping {
            filter_name: "F".to_owned(),
            path_specs: vec![PathSpec::parse("/*").unwrap()],
            target_names: Vec::new(),
            dispatches: Default::default(),
            source: SourceOrigin::Embedded,
        });
        d.rebuild().unwrap();

        let mut req = TestRequest { async_permitted: true, ..Default::default() };
        d.dispatch("/x", &mut req, &mut ()).await.unwrap();
        assert_eq!(req.trace, vec!["F", "sync"]);
        assert!(req.async_permitted);
    }

    #[test(tokio::test)]
    async fn rebuild_rejects_mapping_to_unknown_handler() {
        let d = dispatcher();
        d.register_mapping(Mapping {
            handler_name: "missing".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Embedded,
            from_default_descriptor: false,
        });
        assert!(matches!(d.rebuild(), Err(ConfigurationError::UnknownHandler(_))));
    }

    #[test(tokio::test)]
    async fn ensure_default_handler_installs_synthetic_404() {
        let d = dispatcher();
        d.set_ensure_default_handler(true);
        d.rebuild().unwrap();

        let mut req = TestRequest { async_permitted: true, ..Default::default() };
        assert!(d.dispatch("/anything", &mut req, &mut ()).await.is_ok());
    }

    #[test(tokio::test)]
    async fn stop_purges_non_embedded_mappings_and_descriptors() {
        let d = dispatcher();
        d.register_handler("api-h", Arc::new(RecordingHandler("api-h")), SourceOrigin::Api, None);
        d.register_mapping(Mapping {
            handler_name: "api-h".to_owned(),
            path_specs: vec![PathSpec::parse("/x").unwrap()],
            source: SourceOrigin::Api,
            from_default_descriptor: false,
        });
        d.rebuild().unwrap();
        d.stop().await.unwrap();

        let mut req = TestRequest { async_permitted: true, ..Default::default() };
        assert!(matches!(d.dispatch("/x", &mut req, &mut ()).await, Err(DispatchError::NotFound(_))));
    }
}
