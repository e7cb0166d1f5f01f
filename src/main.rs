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

use axum::{Router, http::Method};
use okproxy::{LoggingErrorHandler, OkProxy, config::Config};
use std::net::SocketAddr;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    let proxy = OkProxy::new(config.proxy_url.clone()).with_body_limit(config.body_limit);
    let forward = proxy.path_request_proxy_handler(config.proxy_path.clone(), LoggingErrorHandler);
    let payload = proxy.payload_request_proxy_handler(LoggingErrorHandler);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let app = Router::new()
        .route_service(&config.proxy_path, forward.clone())
        .route_service(&format!("{}/{{*path}}", config.proxy_path), forward)
        .route_service(&config.payload_path, payload.clone())
        .route_service(&format!("{}/{{*path}}", config.payload_path), payload)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Proxy listening on http://{}", addr);
    if config.proxy_url.is_empty() {
        tracing::info!(
            "No PROXY_URL configured, {} answers with errors until one is set",
            config.proxy_path
        );
    } else {
        tracing::info!("Forwarding {} to {}", config.proxy_path, config.proxy_url);
    }
    tracing::info!("Payload forwarding on {}", config.payload_path);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
    }
}
