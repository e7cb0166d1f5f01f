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

//! Error taxonomy and the error-reporting collaborator.
//!
//! Every failure detected by the handlers is reported exactly once through an
//! [`ErrorHandler`]. The collaborator decides what the client sees.

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced to an [`ErrorHandler`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProxyError {
    /// The path handler was invoked while no target is configured.
    #[error("ProxyURL needs to be set for PathRequestProxyHandler")]
    UnconfiguredTarget,

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] axum::Error),

    /// The body is not JSON or does not have the `{"proxyURL": ...}` shape.
    #[error("invalid proxy payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The payload decoded fine but carried no target.
    #[error("ProxyURL needs to be set in request body at proxyURL field")]
    UnconfiguredPayloadTarget,

    /// The resolved target is not a usable upstream URL.
    #[error("invalid upstream url {url:?}: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    /// The rewritten URI or `Host` value could not be built.
    #[error("failed to rewrite request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
}

impl ProxyError {
    pub(crate) fn invalid_upstream(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUpstreamUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Handles a request that failed before it could be forwarded.
///
/// Invoked at most once per request, never after forwarding has begun. The
/// returned response is sent to the client as is.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle_error(&self, req: &Request, err: ProxyError) -> Response;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Request, ProxyError) -> Response + Send + Sync + 'static,
{
    fn handle_error(&self, req: &Request, err: ProxyError) -> Response {
        self(req, err)
    }
}

/// Logs the failure and answers with `500 Internal Server Error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle_error(&self, req: &Request, err: ProxyError) -> Response {
        tracing::error!("Proxy error on {} {}: {}", req.method(), req.uri(), err);
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
    }
}
