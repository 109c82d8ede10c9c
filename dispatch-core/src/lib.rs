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

//! A servlet-style HTTP request dispatcher core.
//!
//! This crate is transport- and framework-agnostic: it knows nothing about sockets, TLS or HTTP
//! parsing, only about resolving a request to a handler, building the ordered list of filters that
//! should run around that handler, and walking that chain. The request and response types are
//! left generic (`Req`, `Res` throughout) so a caller can plug in whatever representation its
//! transport layer already uses, the same way [`crate::context::DispatchContextHolder`] lets the
//! dispatcher read and write request-scoped attributes without knowing the concrete request type.
//!
//! Start at [`dispatcher::Dispatcher`]: register handlers and filters, declare mappings, call
//! [`dispatcher::Dispatcher::start`], and dispatch requests with
//! [`dispatcher::Dispatcher::dispatch`].

mod cache;
mod chain;
mod context;
mod dispatcher;
mod error;
mod filter_mapping;
mod mapping;
mod path;
mod registry;
mod trie;

pub use chain::{Chain, ChainWalk, Filter, Handler};
pub use context::{
    DispatchContextHolder, DispatchMask, DispatchResponseHolder, DispatchType, PathMapping, RequestContext,
};
pub use dispatcher::{Dispatcher, Listener};
pub use error::{ConfigurationError, DispatchError, LifecycleError, LifecycleFailure};
pub use filter_mapping::{FilterMapping, FilterMappingList, WILDCARD_NAME};
pub use mapping::{Mapping, DEFAULT_404_HANDLER};
pub use path::{PathSpec, PathSpecError, Specificity};
pub use registry::{FilterDescriptor, HandlerDescriptor, SourceOrigin, Target};
