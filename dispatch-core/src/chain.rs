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

//! Filter and handler invocation, chain composition (`ChainBuilder`) and the chain walk itself.
//!
//! The walk is implemented as an indexed, re-entrant cursor (see [`ChainWalk`]) rather than a
//! linked list of nodes: a built `Chain` is `Arc`-shared between [`crate::cache::ChainCache`]
//! entries and concurrent walkers, so keeping it an immutable `Vec` plus a per-walk cursor avoids
//! allocating walker-private node objects on every request.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use std::collections::HashMap;

use crate::context::{DispatchType, RequestContext};
use crate::error::DispatchError;
use crate::filter_mapping::FilterMapping;

/// An interceptor that may inspect, mutate, short-circuit, or wrap the processing of a request
/// before the handler runs.
///
/// `next` is the continuation: calling `next.proceed(..)` hands control to whatever comes after
/// this filter in the chain, be it another filter or the terminal handler. A filter that never
/// calls `next.proceed` short-circuits the chain.
#[async_trait]
pub trait Filter<Req, Res>: Send + Sync {
    async fn do_filter(
        &self,
        req: &mut Req,
        res: &mut Res,
        ctx: &mut RequestContext,
        next: &mut ChainWalk<'_, Req, Res>,
    ) -> Result<(), DispatchError>;

    /// Initialization hook run once, in ascending `init_order` hint order, when the owning
    /// [`crate::dispatcher::Dispatcher`] starts. Defaulted to a no-op for filters with nothing to
    /// set up.
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// Teardown hook, run in reverse start order when the dispatcher stops.
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// The final responder for a request.
#[async_trait]
pub trait Handler<Req, Res>: Send + Sync {
    async fn handle(&self, req: &mut Req, res: &mut Res, ctx: &mut RequestContext) -> Result<(), DispatchError>;

    /// See [`Filter::start`].
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// See [`Filter::stop`].
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// One filter entry in a built chain: the invocable filter plus the bookkeeping the walker needs
/// without going back through the registry.
pub(crate) struct ChainFilter<Req, Res> {
    pub name: String,
    pub supports_async: bool,
    pub filter: Arc<dyn Filter<Req, Res>>,
}

/// An ordered sequence of filters terminated by exactly one handler invocation.
///
/// Cheaply cloneable (`Arc`-wrapped internally by callers that cache it); immutable once built.
pub struct Chain<Req, Res> {
    pub(crate) filters: Vec<ChainFilter<Req, Res>>,
    pub(crate) handler_name: String,
    pub(crate) handler: Arc<dyn Handler<Req, Res>>,
}

impl<Req, Res> fmt::Debug for Chain<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("filters", &self.filters.iter().map(|e| &e.name).collect::<Vec<_>>())
            .field("handler_name", &self.handler_name)
            .finish()
    }
}

impl<Req, Res> Chain<Req, Res> {
    /// Number of filter steps in this chain (not counting the terminal handler invocation).
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Starts a walk over this chain from the first filter.
    pub fn walk(self: &Arc<Self>) -> ChainWalk<'_, Req, Res> {
        ChainWalk {
            chain: self,
            cursor: 0,
        }
    }
}

/// Re-entrant cursor over a [`Chain`]. Each call to [`Self::proceed`] consumes exactly one filter
/// step; the terminal transition invokes the handler. A walker is single-threaded per request:
/// concurrent walks of the same (shared, immutable) chain use independent `ChainWalk` instances.
pub struct ChainWalk<'a, Req, Res> {
    chain: &'a Chain<Req, Res>,
    cursor: usize,
}

impl<'a, Req, Res> fmt::Debug for ChainWalk<'a, Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainWalk")
            .field("cursor", &self.cursor)
            .field("len", &self.chain.filters.len())
            .finish()
    }
}

impl<'a, Req, Res> ChainWalk<'a, Req, Res> {
    /// Advances the cursor by one step, invoking either the next filter or, once the filters are
    /// exhausted, the terminal handler.
    ///
    /// Implements the async-supported discipline: when the filter about to run does not support
    /// async, `ctx.async_permitted` is flipped to `false` for the duration of the call and
    /// restored to its prior value on return, whether the call succeeds or raises.
    pub async fn proceed(
        &mut self,
        req: &mut Req,
        res: &mut Res,
        ctx: &mut RequestContext,
    ) -> Result<(), DispatchError> {
        let Some(index) = (self.cursor < self.chain.filters.len()).then_some(self.cursor) else {
            return self.chain.handler.handle(req, res, ctx).await;
        };
        self.cursor += 1;
        let entry = &self.chain.filters[index];

        if entry.supports_async {
            entry.filter.do_filter(req, res, ctx, self).await
        } else {
            let previous = ctx.async_permitted;
            ctx.async_permitted = false;
            let result = entry.filter.do_filter(req, res, ctx, self).await;
            ctx.async_permitted = previous;
            result
        }
    }
}

/// A filter resolved to an invocable instance, as stored in the `nameToFilter` derived index.
/// Cheap to clone: the map itself is rebuilt on every `rebuild`, but entries only ever hold an
/// `Arc` to the same long-lived filter instance.
#[derive(Clone)]
pub(crate) struct ResolvedFilter<Req, Res> {
    pub supports_async: bool,
    pub filter: Arc<dyn Filter<Req, Res>>,
}

/// Builds the ordered filter list for one (path-or-null, dispatch type, target handler)
/// combination.
///
/// Takes only derived-index snapshots (never the registry directly), matching the invariant that
/// lookups against the five derived indexes are concurrent-safe and wait-free: building a chain
/// never touches the lock guarding the mutable master lists.
pub(crate) struct ChainBuilder;

impl ChainBuilder {
    /// Step 1-3 of the chain-composition algorithm: path filters, then name filters for the
    /// resolved handler, then name filters for the wildcard name `*`; each iterated in master
    /// list order and filtered by dispatch type. The same filter may be appended more than once
    /// if it is mapped more than once — by design, the chain walks one step per mapping.
    ///
    /// Returns `None` if the resulting list is empty (the dispatcher invokes the target
    /// directly), matching the "no chain" outcome.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build<Req, Res>(
        path: Option<&str>,
        dispatch_type: DispatchType,
        target_name: &str,
        handler_name: &str,
        handler: Arc<dyn Handler<Req, Res>>,
        path_filters: &[FilterMapping],
        name_filters: &HashMap<String, Vec<FilterMapping>>,
        name_to_filter: &HashMap<String, ResolvedFilter<Req, Res>>,
    ) -> Option<Chain<Req, Res>> {
        let mut filters = Vec::new();

        if let Some(path) = path {
            for mapping in path_filters {
                if mapping.matches_path(path) && mapping.dispatches.includes(dispatch_type) {
                    Self::push_filter(&mut filters, name_to_filter, mapping);
                }
            }
        }

        if let Some(mappings) = name_filters.get(target_name) {
            for mapping in mappings {
                if mapping.dispatches.includes(dispatch_type) {
                    Self::push_filter(&mut filters, name_to_filter, mapping);
                }
            }
        }

        if let Some(mappings) = name_filters.get(crate::filter_mapping::WILDCARD_NAME) {
            for mapping in mappings {
                if mapping.dispatches.includes(dispatch_type) {
                    Self::push_filter(&mut filters, name_to_filter, mapping);
                }
            }
        }

        if filters.is_empty() {
            return None;
        }

        Some(Chain {
            filters,
            handler_name: handler_name.to_owned(),
            handler,
        })
    }

    fn push_filter<Req, Res>(
        filters: &mut Vec<ChainFilter<Req, Res>>,
        name_to_filter: &HashMap<String, ResolvedFilter<Req, Res>>,
        mapping: &FilterMapping,
    ) {
        let Some(resolved) = name_to_filter.get(&mapping.filter_name) else {
            log::warn!(
                "filter mapping references `{}`, which is no longer registered; skipping",
                mapping.filter_name
            );
            return;
        };
        filters.push(ChainFilter {
            name: mapping.filter_name.clone(),
            supports_async: resolved.supports_async,
            filter: Arc::clone(&resolved.filter),
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use test_log::test;

    pub(crate) struct NoopHandler;

    #[async_trait]
    impl Handler<(), ()> for NoopHandler {
        async fn handle(&self, _req: &mut (), _res: &mut (), _ctx: &mut RequestContext) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    pub(crate) struct RecordingFilter {
        pub supports_async: bool,
    }

    #[async_trait]
    impl Filter<Vec<&'static str>, ()> for RecordingFilter {
        async fn do_filter(
            &self,
            req: &mut Vec<&'static str>,
            res: &mut (),
            ctx: &mut RequestContext,
            next: &mut ChainWalk<'_, Vec<&'static str>, ()>,
        ) -> Result<(), DispatchError> {
            req.push("enter");
            let result = next.proceed(req, res, ctx).await;
            req.push("exit");
            result
        }
    }

    #[test(tokio::test)]
    async fn walk_invokes_filters_then_handler() {
        struct RecordingHandler;
        #[async_trait]
        impl Handler<Vec<&'static str>, ()> for RecordingHandler {
            async fn handle(
                &self,
                req: &mut Vec<&'static str>,
                _res: &mut (),
                _ctx: &mut RequestContext,
            ) -> Result<(), DispatchError> {
                req.push("handled");
                Ok(())
            }
        }

        let chain = Arc::new(Chain {
            filters: vec![ChainFilter {
                name: "f1".to_owned(),
                supports_async: true,
                filter: Arc::new(RecordingFilter { supports_async: true }),
            }],
            handler_name: "h1".to_owned(),
            handler: Arc::new(RecordingHandler),
        });

        let mut req = Vec::new();
        let mut ctx = RequestContext::new(crate::context::DispatchType::Request);
        chain.walk().proceed(&mut req, &mut (), &mut ctx).await.unwrap();
        assert_eq!(req, vec!["enter", "handled", "exit"]);
    }

    #[test(tokio::test)]
    async fn async_flag_is_flipped_and_restored_around_non_async_filter() {
        struct AsyncCheckingHandler;
        #[async_trait]
        impl Handler<Vec<bool>, ()> for AsyncCheckingHandler {
            async fn handle(&self, req: &mut Vec<bool>, _res: &mut (), ctx: &mut RequestContext) -> Result<(), DispatchError> {
                req.push(ctx.async_permitted);
                Ok(())
            }
        }

        struct NonAsyncFilter;
        #[async_trait]
        impl Filter<Vec<bool>, ()> for NonAsyncFilter {
            async fn do_filter(
                &self,
                req: &mut Vec<bool>,
                res: &mut (),
                ctx: &mut RequestContext,
                next: &mut ChainWalk<'_, Vec<bool>, ()>,
            ) -> Result<(), DispatchError> {
                req.push(ctx.async_permitted);
                next.proceed(req, res, ctx).await
            }
        }

        let chain = Arc::new(Chain {
            filters: vec![ChainFilter {
                name: "f".to_owned(),
                supports_async: false,
                filter: Arc::new(NonAsyncFilter),
            }],
            handler_name: "h".to_owned(),
            handler: Arc::new(AsyncCheckingHandler),
        });

        let mut req = Vec::new();
        let mut ctx = RequestContext::new(crate::context::DispatchType::Async);
        assert!(ctx.async_permitted);
        chain.walk().proceed(&mut req, &mut (), &mut ctx).await.unwrap();
        assert_eq!(req, vec![false, false]);
        assert!(ctx.async_permitted);
    }
}
