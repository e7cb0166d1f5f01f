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

//! The forwarder and the reverse-proxy primitive it delegates to.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{self, HeaderValue, StatusCode, Uri, header::HOST, uri::PathAndQuery},
    response::{IntoResponse, Response},
};
use reqwest::{Client, redirect::Policy};
use url::Url;

use crate::{
    error::{ErrorHandler, ProxyError},
    state::ProxyTarget,
    utils::{self, X_FORWARDED_HOST},
};

/// Performs the actual proxying of an already rewritten request.
///
/// Implementations own the transport: connecting, relaying the body in both
/// directions, and reporting upstream failures as a response.
#[async_trait]
pub trait ReverseProxy: Send + Sync {
    async fn serve_http(&self, target: &Url, req: Request) -> Response;
}

/// Forwards every request to one upstream using a `reqwest` client.
#[derive(Debug, Clone)]
pub struct SingleHostReverseProxy {
    client: Client,
}

impl SingleHostReverseProxy {
    /// Creates a proxy whose client does not follow redirects.
    pub fn new() -> Self {
        let client = Client::builder()
            .redirect(Policy::none())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build reqwest client, using defaults: {}", e);
                Client::new()
            });
        Self::with_client(client)
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for SingleHostReverseProxy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReverseProxy for SingleHostReverseProxy {
    async fn serve_http(&self, target: &Url, req: Request) -> Response {
        let upstream = utils::upstream_url(target, req.uri());
        tracing::info!("Proxying: {} -> {}", req.uri(), upstream);

        let client_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let (parts, body) = req.into_parts();
        let mut headers = parts.headers;
        utils::prepare_request_headers(&mut headers);
        if let Some(ip) = client_ip {
            utils::append_forwarded_for(&mut headers, ip);
        }

        let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Failed to read request body: {}", e);
                return (StatusCode::BAD_REQUEST, "Failed to read body").into_response();
            }
        };

        let request_builder = self
            .client
            .request(parts.method, upstream)
            .headers(headers)
            .body(body_bytes);

        match request_builder.send().await {
            Ok(resp) => relay_response(resp),
            Err(e) => {
                tracing::error!("Upstream request failed: {}", e);
                (StatusCode::BAD_GATEWAY, format!("Proxy Error: {}", e)).into_response()
            }
        }
    }
}

/// Streams the upstream response back with hop-by-hop headers removed.
fn relay_response(resp: reqwest::Response) -> Response {
    let status = resp.status();
    let mut headers = resp.headers().clone();
    utils::remove_hop_by_hop_headers(&mut headers);

    let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Parses a resolved target into an upstream URL.
pub fn parse_target(target: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(target).map_err(|e| ProxyError::invalid_upstream(target, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::invalid_upstream(
            target,
            format!("unsupported scheme {:?}", url.scheme()),
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ProxyError::invalid_upstream(target, "missing host"));
    }
    Ok(url)
}

/// Points `req` at `target`.
///
/// The URI takes the target's scheme and authority, the inbound `Host` is
/// copied to `X-Forwarded-Host` (empty when absent) and `Host` becomes the
/// target authority. Nothing is modified when an error is returned.
pub fn rewrite_request(req: &mut Request, target: &Url) -> Result<(), ProxyError> {
    let authority = utils::target_authority(target);
    let path_and_query = req
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    let uri = Uri::builder()
        .scheme(target.scheme())
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()?;
    let host = HeaderValue::from_str(&authority).map_err(http::Error::from)?;
    let forwarded_host = req
        .headers()
        .get(HOST)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""));

    *req.uri_mut() = uri;
    let headers = req.headers_mut();
    headers.insert(X_FORWARDED_HOST.clone(), forwarded_host);
    headers.insert(HOST, host);
    Ok(())
}

/// A forwarding proxy with a shared upstream target.
///
/// Cloning is cheap and clones share the target.
#[derive(Clone)]
pub struct OkProxy {
    target: ProxyTarget,
    reverse_proxy: Arc<dyn ReverseProxy>,
    pub(crate) body_limit: usize,
}

impl OkProxy {
    /// Creates a proxy pre-seeded with `url`, which may be empty.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_reverse_proxy(url, Arc::new(SingleHostReverseProxy::new()))
    }

    pub fn with_reverse_proxy(url: impl Into<String>, reverse_proxy: Arc<dyn ReverseProxy>) -> Self {
        Self {
            target: ProxyTarget::new(url),
            reverse_proxy,
            body_limit: usize::MAX,
        }
    }

    /// Caps how many body bytes the payload handler reads.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    pub fn set_proxy_url(&self, url: impl Into<String>) {
        self.target.set_proxy_url(url);
    }

    pub fn get_proxy_url(&self) -> String {
        self.target.get_proxy_url()
    }

    /// Rewrites `req` for `target` and hands it to the reverse proxy.
    ///
    /// An invalid target goes to `error_handler` and nothing is forwarded.
    pub async fn serve_reverse_proxy(
        &self,
        target: &str,
        mut req: Request,
        error_handler: &dyn ErrorHandler,
    ) -> Response {
        let rewritten = parse_target(target)
            .and_then(|url| rewrite_request(&mut req, &url).map(|()| url));

        match rewritten {
            Ok(url) => self.reverse_proxy.serve_http(&url, req).await,
            Err(err) => error_handler.handle_error(&req, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{RecordingErrorHandler, RecordingReverseProxy};

    fn request(host: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/api?x=1");
        if let Some(host) = host {
            builder = builder.header(HOST, host);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_parse_target_valid() {
        let url = parse_target("https://127.0.0.1:8080").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn test_parse_target_rejects_garbage() {
        for target in ["", "not a url", "127.0.0.1:8080", "http://[::1", "http://"] {
            let err = parse_target(target).unwrap_err();
            assert!(
                matches!(err, ProxyError::InvalidUpstreamUrl { .. }),
                "{target:?} gave {err}"
            );
        }
    }

    #[test]
    fn test_parse_target_rejects_unsupported() {
        let err = parse_target("ftp://files.example.com").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));

        let err = parse_target("mailto:someone@example.com").unwrap_err();
        assert!(matches!(err, ProxyError::InvalidUpstreamUrl { .. }));
    }

    #[test]
    fn test_rewrite_request_updates_uri_and_hosts() {
        let mut req = request(Some("127.0.0.1:8080"));
        let target = Url::parse("https://127.0.0.1:8080").unwrap();

        rewrite_request(&mut req, &target).unwrap();

        assert_eq!(req.uri().scheme_str(), Some("https"));
        assert_eq!(req.uri().authority().unwrap().as_str(), "127.0.0.1:8080");
        assert_eq!(req.uri().path(), "/api");
        assert_eq!(req.uri().query(), Some("x=1"));
        assert_eq!(req.headers().get(&X_FORWARDED_HOST).unwrap(), "127.0.0.1:8080");
        assert_eq!(req.headers().get(HOST).unwrap(), "127.0.0.1:8080");
    }

    #[test]
    fn test_rewrite_request_keeps_original_host_in_forwarded() {
        let mut req = request(Some("public.example.com"));
        let target = Url::parse("http://10.0.0.5:9000/ignored").unwrap();

        rewrite_request(&mut req, &target).unwrap();

        assert_eq!(
            req.headers().get(&X_FORWARDED_HOST).unwrap(),
            "public.example.com"
        );
        assert_eq!(req.headers().get(HOST).unwrap(), "10.0.0.5:9000");
        assert_eq!(req.uri().path(), "/api");
    }

    #[test]
    fn test_rewrite_request_without_host_sets_empty_forwarded() {
        let mut req = request(None);
        let target = Url::parse("http://example.com").unwrap();

        rewrite_request(&mut req, &target).unwrap();

        assert_eq!(req.headers().get(&X_FORWARDED_HOST).unwrap(), "");
        assert_eq!(req.headers().get(HOST).unwrap(), "example.com");
    }

    #[tokio::test]
    async fn test_serve_reverse_proxy_forwards_rewritten_request() {
        let upstream = RecordingReverseProxy::default();
        let errors = RecordingErrorHandler::default();
        let proxy = OkProxy::with_reverse_proxy("", Arc::new(upstream.clone()));

        let response = proxy
            .serve_reverse_proxy("https://127.0.0.1:8080", request(Some("127.0.0.1:8080")), &errors)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(errors.count(), 0);

        let calls = upstream.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target.as_str(), "https://127.0.0.1:8080/");
        assert_eq!(calls[0].uri, "https://127.0.0.1:8080/api?x=1");
        assert_eq!(calls[0].headers.get(&X_FORWARDED_HOST).unwrap(), "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_serve_reverse_proxy_invalid_target() {
        let upstream = RecordingReverseProxy::default();
        let errors = RecordingErrorHandler::default();
        let proxy = OkProxy::with_reverse_proxy("", Arc::new(upstream.clone()));

        let response = proxy
            .serve_reverse_proxy("http\ns://6876826^@[30", request(None), &errors)
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(errors.count(), 1);
        assert!(upstream.calls().is_empty());

        // The request handed to the error handler was not rewritten.
        let seen = errors.requests();
        assert_eq!(seen[0].uri, "/api?x=1");
        assert!(seen[0].headers.get(&X_FORWARDED_HOST).is_none());
        assert!(seen[0].headers.get(HOST).is_none());
    }

    #[test]
    fn test_proxy_target_is_shared() {
        let proxy = OkProxy::with_reverse_proxy("", Arc::new(RecordingReverseProxy::default()));
        let clone = proxy.clone();
        clone.set_proxy_url("http://h:1");
        assert_eq!(proxy.get_proxy_url(), "http://h:1");
        assert_eq!(proxy.target().get_proxy_url(), "http://h:1");
    }
}
