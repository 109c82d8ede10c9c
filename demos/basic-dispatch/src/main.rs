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

//! Minimal end-to-end demonstration of wiring up a [`dispatch_core::Dispatcher`]: two handlers, a
//! logging filter mapped by path, and a handful of requests dispatched against it.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use dispatch_core::{
    DispatchContextHolder, DispatchError, DispatchResponseHolder, DispatchType, Dispatcher, Filter, Handler,
    Mapping, PathMapping, PathSpec, RequestContext, SourceOrigin,
};

/// Dispatches a handful of sample requests against a small, programmatically configured
/// dispatcher and prints what each one resolved to.
#[derive(Debug, Parser)]
struct Args {
    /// Additional request targets to dispatch, beyond the built-in sample set.
    #[arg(long = "target")]
    targets: Vec<String>,
}

/// The request type this demo dispatches: a target string plus the attributes the dispatcher
/// reads and writes around a chain walk.
#[derive(Debug)]
struct DemoRequest {
    target: String,
    dispatch_type: DispatchType,
    async_permitted: bool,
    path_mapping: Option<PathMapping>,
    include_mapping: Option<PathMapping>,
    handled: bool,
    log: Vec<String>,
}

impl DemoRequest {
    fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            dispatch_type: DispatchType::Request,
            async_permitted: true,
            path_mapping: None,
            include_mapping: None,
            handled: false,
            log: Vec::new(),
        }
    }
}

impl DispatchContextHolder for DemoRequest {
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

/// Collects the status and body a handler wrote, so the demo can print what actually came back
/// instead of just what ran.
#[derive(Debug, Default)]
struct DemoResponse {
    status: Option<u16>,
    body: Vec<u8>,
}

impl DispatchResponseHolder for DemoResponse {
    fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }
}

/// Logs each request's servlet path before handing off to the handler.
struct LoggingFilter;

#[async_trait]
impl Filter<DemoRequest, DemoResponse> for LoggingFilter {
    async fn do_filter(
        &self,
        req: &mut DemoRequest,
        res: &mut DemoResponse,
        ctx: &mut RequestContext,
        next: &mut dispatch_core::ChainWalk<'_, DemoRequest, DemoResponse>,
    ) -> Result<(), DispatchError> {
        let servlet_path = ctx.path_mapping.as_ref().map(|m| m.servlet_path.as_str()).unwrap_or("?");
        req.log.push(format!("logged `{}` -> servlet path `{servlet_path}`", req.target));
        next.proceed(req, res, ctx).await
    }
}

/// Echoes the dispatched target back into the request's log.
struct EchoHandler;

#[async_trait]
impl Handler<DemoRequest, DemoResponse> for EchoHandler {
    async fn handle(&self, req: &mut DemoRequest, _res: &mut DemoResponse, _ctx: &mut RequestContext) -> Result<(), DispatchError> {
        req.log.push(format!("echo: {}", req.target));
        Ok(())
    }
}

/// Reports a static health payload, regardless of path.
struct HealthHandler;

#[async_trait]
impl Handler<DemoRequest, DemoResponse> for HealthHandler {
    async fn handle(&self, req: &mut DemoRequest, _res: &mut DemoResponse, _ctx: &mut RequestContext) -> Result<(), DispatchError> {
        req.log.push("ok".to_owned());
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let dispatcher: Dispatcher<DemoRequest, DemoResponse> = Dispatcher::new(64, true);

    dispatcher.register_handler("health", Arc::new(HealthHandler), SourceOrigin::Embedded, None);
    dispatcher.register_handler("echo", Arc::new(EchoHandler), SourceOrigin::Embedded, None);
    dispatcher.register_filter("logging", Arc::new(LoggingFilter), SourceOrigin::Embedded, None, true);

    dispatcher.register_mapping(Mapping {
        handler_name: "health".to_owned(),
        path_specs: vec![PathSpec::parse("/health").expect("valid pattern")],
        source: SourceOrigin::Embedded,
        from_default_descriptor: false,
    });
    dispatcher.register_mapping(Mapping {
        handler_name: "echo".to_owned(),
        path_specs: vec![PathSpec::parse("/echo/*").expect("valid pattern")],
        source: SourceOrigin::Embedded,
        from_default_descriptor: false,
    });

    dispatcher.add_filter_mapping(dispatch_core::FilterMapping {
        filter_name: "logging".to_owned(),
        path_specs: vec![PathSpec::parse("/*").expect("valid pattern")],
        target_names: Vec::new(),
        dispatches: Default::default(),
        source: SourceOrigin::Embedded,
    });

    dispatcher.set_ensure_default_handler(true);

    if let Err(err) = dispatcher.start().await {
        log::error!("dispatcher failed to start: {err}");
        return;
    }

    let mut targets = vec!["/health".to_owned(), "/echo/hello".to_owned(), "/nowhere".to_owned()];
    targets.extend(args.targets);

    for target in targets {
        let mut req = DemoRequest::new(&target);
        let mut res = DemoResponse::default();
        match dispatcher.dispatch(&target, &mut req, &mut res).await {
            Ok(()) => {
                let status = res.status.map_or_else(|| "-".to_owned(), |code| code.to_string());
                println!("{target}: status {status}, handled={}, log: {}", req.handled, req.log.join(", "));
            }
            Err(err) => println!("{target}: dispatch failed: {err}"),
        }
    }

    if let Err(err) = dispatcher.stop().await {
        log::error!("dispatcher failed to stop cleanly: {err}");
    }
}
