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

//! Recording doubles for the reverse-proxy primitive and the error handler.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{Bytes, to_bytes},
    extract::Request,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use url::Url;

use crate::{
    error::{ErrorHandler, ProxyError},
    proxy::ReverseProxy,
};

#[derive(Debug, Clone)]
pub struct ForwardedRequest {
    pub target: Url,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Records every forwarded request and answers `200 forwarded`.
#[derive(Debug, Clone, Default)]
pub struct RecordingReverseProxy {
    calls: Arc<Mutex<Vec<ForwardedRequest>>>,
}

impl RecordingReverseProxy {
    pub fn calls(&self) -> Vec<ForwardedRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ReverseProxy for RecordingReverseProxy {
    async fn serve_http(&self, target: &Url, req: Request) -> Response {
        let (parts, body) = req.into_parts();
        let body = to_bytes(body, usize::MAX).await.unwrap_or_default();
        self.calls.lock().push(ForwardedRequest {
            target: target.clone(),
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        });
        (StatusCode::OK, "forwarded").into_response()
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub uri: Uri,
    pub headers: HeaderMap,
}

/// Records every reported error and answers `500 handled`.
#[derive(Debug, Clone, Default)]
pub struct RecordingErrorHandler {
    seen: Arc<Mutex<Vec<(SeenRequest, ProxyError)>>>,
}

impl RecordingErrorHandler {
    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().iter().map(|(req, _)| req.clone()).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(_, err)| err.to_string()).collect()
    }

    /// True when exactly one error was reported and it satisfies `f`.
    pub fn single(&self, f: impl FnOnce(&ProxyError) -> bool) -> bool {
        let seen = self.seen.lock();
        seen.len() == 1 && f(&seen[0].1)
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn handle_error(&self, req: &Request, err: ProxyError) -> Response {
        let seen = SeenRequest {
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        };
        self.seen.lock().push((seen, err));
        (StatusCode::INTERNAL_SERVER_ERROR, "handled").into_response()
    }
}
