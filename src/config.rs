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

use std::env;

/// Configuration for the proxy server binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The port to listen on.
    pub port: u16,
    /// The initial upstream target. Empty means unset.
    pub proxy_url: String,
    /// Mount point of the path handler, trimmed before forwarding.
    pub proxy_path: String,
    /// Mount point of the payload handler.
    pub payload_path: String,
    /// Maximum payload body size in bytes.
    pub body_limit: usize,
}

impl Config {
    /// # Environment Variables
    /// * `PORT` - Port to listen on (default: 3000).
    /// * `PROXY_URL` - Initial upstream target (default: unset).
    /// * `PROXY_PATH` - Path handler prefix (default: `/forward`).
    /// * `PAYLOAD_PATH` - Payload handler route (default: `/payload`).
    /// * `BODY_LIMIT` - Payload body limit in bytes (default: unlimited).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let proxy_url = lookup("PROXY_URL").unwrap_or_default();
        let proxy_path = route(lookup("PROXY_PATH"), "/forward");
        let payload_path = route(lookup("PAYLOAD_PATH"), "/payload");

        let body_limit = lookup("BODY_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(usize::MAX);

        Self {
            port,
            proxy_url,
            proxy_path,
            payload_path,
            body_limit,
        }
    }
}

/// Normalizes a route to start with `/` and not end with one.
fn route(value: Option<String>, default: &str) -> String {
    let value = value
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string());

    if value.starts_with('/') {
        value
    } else {
        format!("/{value}")
    }
}
