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

//! Dispatch types, the dispatch-type bitmask, and the request-scoped state the dispatcher reads
//! and writes around a chain walk.

/// Why a request is being routed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchType {
    /// A fresh arrival.
    #[default]
    Request,
    /// An internal forward to another target.
    Forward,
    /// An internal include of another target's output.
    Include,
    /// Error handling dispatch.
    Error,
    /// An asynchronous continuation.
    Async,
}

impl DispatchType {
    /// This dispatch type's single bit within a [`DispatchMask`].
    pub const fn bit(self) -> u8 {
        match self {
            Self::Request => DispatchMask::REQUEST,
            Self::Forward => DispatchMask::FORWARD,
            Self::Include => DispatchMask::INCLUDE,
            Self::Error => DispatchMask::ERROR,
            Self::Async => DispatchMask::ASYNC,
        }
    }

    /// Index of this dispatch type's dedicated cache within [`crate::cache::ChainCache`]'s five
    /// independent per-dispatch-type caches.
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Request => 0,
            Self::Forward => 1,
            Self::Include => 2,
            Self::Error => 3,
            Self::Async => 4,
        }
    }

    pub(crate) const COUNT: usize = 5;
}

/// Bitmask over `{REQUEST, FORWARD, INCLUDE, ERROR, ASYNC}`, as carried by `FilterMapping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchMask(u8);

impl DispatchMask {
    pub const REQUEST: u8 = 1;
    pub const FORWARD: u8 = 2;
    pub const INCLUDE: u8 = 4;
    pub const ERROR: u8 = 8;
    pub const ASYNC: u8 = 16;
    pub const ALL: u8 = Self::REQUEST | Self::FORWARD | Self::INCLUDE | Self::ERROR | Self::ASYNC;

    pub const fn new(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    pub const fn all() -> Self {
        Self(Self::ALL)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether this mask includes the given dispatch type.
    pub const fn includes(self, dispatch_type: DispatchType) -> bool {
        self.0 & dispatch_type.bit() != 0
    }
}

/// Default when unspecified is `REQUEST` only.
impl Default for DispatchMask {
    fn default() -> Self {
        Self(Self::REQUEST)
    }
}

/// Servlet-path-mapping metadata derived from the `PathSpec` that resolved a request, stored on
/// the request as an attribute (see [`RequestContext`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    /// The path or name that was matched.
    pub matched_value: String,
    /// The declaration of the `PathSpec` that matched.
    pub pattern: String,
    /// The portion of the path consumed by the match.
    pub servlet_path: String,
    /// The remainder of the path beyond `servlet_path`, if any (only meaningful for prefix
    /// matches).
    pub path_info: Option<String>,
}

/// Request-scoped state the dispatcher reads and mutates around a chain walk.
///
/// Request and response bodies themselves are opaque to this crate (see the module-level
/// documentation); this is the state the dispatcher itself is responsible for.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub dispatch_type: DispatchType,
    /// Whether the request currently permits asynchronous completion. Flipped to `false` around
    /// the invocation of any filter with `supports_async == false` and restored on exit.
    pub async_permitted: bool,
    /// The request's active path-mapping slot, mutated directly unless `dispatch_type` is
    /// `Include`.
    pub path_mapping: Option<PathMapping>,
    /// Mirrors the servlet API's `javax.servlet.include.mapping` attribute: populated instead of
    /// `path_mapping` when `dispatch_type` is `Include`, so an active include cannot clobber the
    /// outer request's mapping.
    pub include_mapping: Option<PathMapping>,
}

impl RequestContext {
    pub fn new(dispatch_type: DispatchType) -> Self {
        Self {
            dispatch_type,
            async_permitted: dispatch_type == DispatchType::Async,
            path_mapping: None,
            include_mapping: None,
        }
    }
}

/// Exposes the request-scoped attributes [`crate::dispatcher::Dispatcher::dispatch`] reads and
/// writes, without requiring this crate to know anything else about the request type.
///
/// Grounded on the same idea as `pandora_module_utils::pingora::SessionWrapper`: rather than
/// taking a concrete request type, the dispatcher is generic over anything that can answer these
/// questions about itself.
pub trait DispatchContextHolder {
    fn dispatch_type(&self) -> DispatchType;

    fn async_permitted(&self) -> bool;
    fn set_async_permitted(&mut self, value: bool);

    /// Replaces the active path-mapping slot, returning the previous value so the dispatcher can
    /// restore it in its finally path.
    fn swap_path_mapping(&mut self, mapping: Option<PathMapping>) -> Option<PathMapping>;

    /// Replaces the `javax.servlet.include.mapping`-equivalent slot used instead of the active
    /// slot when `dispatch_type()` is `Include`.
    fn swap_include_mapping(&mut self, mapping: Option<PathMapping>) -> Option<PathMapping>;

    /// Marks the request as handled. Called once by [`crate::dispatcher::Dispatcher::dispatch`]
    /// after the chain walk returns, before the path-mapping/async-permitted restorations run.
    fn mark_handled(&mut self);
}

/// Exposes the response-scoped mutation the built-in default 404 handler needs, without
/// requiring this crate to know anything else about the response type. Parallels
/// [`DispatchContextHolder`] on the response side.
pub trait DispatchResponseHolder {
    /// Sets the HTTP status line.
    fn set_status(&mut self, status: u16);
    /// Replaces the response body.
    fn set_body(&mut self, body: Vec<u8>);
}

/// A response sink that discards everything written to it. Lets tests and callers that don't
/// care about response content use `()` as `Res`.
impl DispatchResponseHolder for () {
    fn set_status(&mut self, _status: u16) {}
    fn set_body(&mut self, _body: Vec<u8>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn mask_bits_match_spec() {
        assert_eq!(DispatchMask::REQUEST, 1);
        assert_eq!(DispatchMask::FORWARD, 2);
        assert_eq!(DispatchMask::INCLUDE, 4);
        assert_eq!(DispatchMask::ERROR, 8);
        assert_eq!(DispatchMask::ASYNC, 16);
    }

    #[test]
    fn default_mask_is_request_only() {
        let mask = DispatchMask::default();
        assert!(mask.includes(DispatchType::Request));
        assert!(!mask.includes(DispatchType::Forward));
    }

    #[test]
    fn mask_includes_checks_single_bit() {
        let mask = DispatchMask::new(DispatchMask::INCLUDE | DispatchMask::ERROR);
        assert!(mask.includes(DispatchType::Include));
        assert!(mask.includes(DispatchType::Error));
        assert!(!mask.includes(DispatchType::Request));
    }
}
