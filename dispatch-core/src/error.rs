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

//! Error types raised by configuration mutation, lifecycle transitions and the per-request chain
//! walk.

use std::fmt;

/// Failure raised synchronously by [`crate::dispatcher::Dispatcher::rebuild`].
///
/// A configuration error aborts the mutation and leaves the prior derived indexes in place;
/// publication of new indexes only happens once rebuild has fully succeeded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// A `FilterMapping` names a filter that was never registered.
    #[error("filter mapping references unknown filter `{0}`")]
    UnknownFilter(String),

    /// A `Mapping` names a handler that was never registered.
    #[error("mapping references unknown handler `{0}`")]
    UnknownHandler(String),

    /// More than one non-default mapping remains for the same pattern after conflict resolution,
    /// and `allow_duplicate_mappings` is not set.
    #[error(
        "conflicting mappings for pattern `{0}`; enable allow_duplicate_mappings to permit this"
    )]
    ConflictingMapping(String),

    /// A declared pattern could not be classified into one of the recognized groups.
    #[error(transparent)]
    InvalidPattern(#[from] crate::path::PathSpecError),
}

/// A single component's failure during a lifecycle transition (`start` or `stop`).
#[derive(Debug, thiserror::Error)]
#[error("{component} `{name}` failed to {action}: {source}")]
pub struct LifecycleError {
    /// `"handler"` or `"filter"`.
    pub component: &'static str,
    /// Name of the descriptor that failed.
    pub name: String,
    /// `"start"` or `"stop"`.
    pub action: &'static str,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Accumulated failures from a multi-component lifecycle transition.
///
/// Individual failures are logged and accumulated as they occur so teardown of unrelated
/// components still runs; the aggregate is only raised once the transition completes.
#[derive(Debug, thiserror::Error)]
pub struct LifecycleFailure(pub Vec<LifecycleError>);

impl fmt::Display for LifecycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} component(s) failed during lifecycle transition:", self.0.len())?;
        for failure in &self.0 {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

impl LifecycleFailure {
    /// Returns `Ok(())` if `errors` is empty, otherwise `Err(LifecycleFailure(errors))`.
    pub(crate) fn from_vec(errors: Vec<LifecycleError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self(errors))
        }
    }
}

/// Outcome of [`crate::dispatcher::Dispatcher::dispatch`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handler resolved for the requested target, and no downstream handler was configured to
    /// take over. This is a protocol outcome, not an internal error: callers typically write a
    /// 404 response and move on.
    #[error("no handler resolved for target `{0}`")]
    NotFound(String),

    /// A filter or handler raised during the chain walk. Propagated unchanged after the
    /// dispatcher restores saved request state.
    #[error("handler or filter failed during dispatch")]
    HandlerFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}
