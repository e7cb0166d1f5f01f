/*
 * Copyright (C) 2025 Jakub Žitník
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 */

//! The path- and payload-based request handlers.
//!
//! Both are built from an [`OkProxy`] and returned as a [`RequestHandler`],
//! a cloneable `tower::Service` that mounts directly on an axum router:
//!
//! ```no_run
//! use axum::Router;
//! use okproxy::{LoggingErrorHandler, OkProxy};
//!
//! let proxy = OkProxy::new("https://127.0.0.1:8080");
//! let forward = proxy.path_request_proxy_handler("/forward", LoggingErrorHandler);
//! let app: Router = Router::new()
//!     .route_service("/forward/{*path}", forward)
//!     .route_service("/payload", proxy.payload_request_proxy_handler(LoggingErrorHandler));
//! ```

use std::{
    convert::Infallible,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    extract::Request,
    response::Response,
};
use serde::Deserialize;
use tower::Service;

use crate::{
    error::{ErrorHandler, ProxyError},
    proxy::OkProxy,
    utils,
};

/// The payload-mode request body. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct ProxyPayload {
    #[serde(rename = "proxyURL", default)]
    proxy_url: Option<String>,
}

#[derive(Clone)]
enum HandlerMode {
    Path { prefix: Arc<str> },
    Payload,
}

/// A request handler produced by one of the `OkProxy` factories.
#[derive(Clone)]
pub struct RequestHandler {
    proxy: OkProxy,
    mode: HandlerMode,
    error_handler: Arc<dyn ErrorHandler>,
}

impl OkProxy {
    /// Forwards requests to the configured target with `prefix` trimmed from
    /// the path, so `/forward/api` on prefix `/forward` becomes `/api`.
    ///
    /// Requests fail through `error_handler` while no target is configured.
    pub fn path_request_proxy_handler(
        &self,
        prefix: impl Into<String>,
        error_handler: impl ErrorHandler,
    ) -> RequestHandler {
        RequestHandler {
            proxy: self.clone(),
            mode: HandlerMode::Path {
                prefix: Arc::from(prefix.into()),
            },
            error_handler: Arc::new(error_handler),
        }
    }

    /// Forwards requests to the target named by the `proxyURL` field of the
    /// JSON body. The body itself is forwarded untouched.
    pub fn payload_request_proxy_handler(&self, error_handler: impl ErrorHandler) -> RequestHandler {
        RequestHandler {
            proxy: self.clone(),
            mode: HandlerMode::Payload,
            error_handler: Arc::new(error_handler),
        }
    }

    /// Reads the body, puts it back on the request and decodes the target.
    ///
    /// The returned request always carries the bytes that were read. A
    /// missing or `null` target decodes to an empty string.
    pub(crate) async fn decode_url_from_body(
        &self,
        req: Request,
    ) -> (Request, Result<String, ProxyError>) {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, self.body_limit).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return (
                    Request::from_parts(parts, Body::empty()),
                    Err(ProxyError::BodyRead(err)),
                );
            }
        };

        let decoded = serde_json::from_slice::<Option<ProxyPayload>>(&bytes)
            .map(|payload| payload.and_then(|p| p.proxy_url).unwrap_or_default())
            .map_err(ProxyError::from);

        (Request::from_parts(parts, Body::from(bytes)), decoded)
    }
}

impl RequestHandler {
    pub async fn handle(&self, req: Request) -> Response {
        match &self.mode {
            HandlerMode::Path { prefix } => self.serve_path(prefix, req).await,
            HandlerMode::Payload => self.serve_payload(req).await,
        }
    }

    async fn serve_path(&self, prefix: &str, mut req: Request) -> Response {
        let target = self.proxy.get_proxy_url();
        if target.is_empty() {
            return self
                .error_handler
                .handle_error(&req, ProxyError::UnconfiguredTarget);
        }

        match utils::trim_path_prefix(req.uri(), prefix) {
            Ok(uri) => *req.uri_mut() = uri,
            Err(err) => return self.error_handler.handle_error(&req, err.into()),
        }

        self.proxy
            .serve_reverse_proxy(&target, req, self.error_handler.as_ref())
            .await
    }

    async fn serve_payload(&self, req: Request) -> Response {
        let (req, decoded) = self.proxy.decode_url_from_body(req).await;
        let target = match decoded {
            Ok(target) => target,
            Err(err) => return self.error_handler.handle_error(&req, err),
        };
        if target.is_empty() {
            return self
                .error_handler
                .handle_error(&req, ProxyError::UnconfiguredPayloadTarget);
        }

        // Forward to the decoded value rather than re-reading the shared
        // target, which a concurrent payload request may have replaced.
        self.proxy.set_proxy_url(target.as_str());
        self.proxy
            .serve_reverse_proxy(&target, req, self.error_handler.as_ref())
            .await
    }
}

impl Service<Request> for RequestHandler {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}
