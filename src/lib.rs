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

//! Request-forwarding handlers for axum.
//!
//! An [`OkProxy`] holds one upstream target and hands out two kinds of
//! handler: one that trims a route prefix and forwards to the configured
//! target, and one that reads the target from a `{"proxyURL": ...}` JSON
//! body. Forwarding goes through a [`ReverseProxy`], by default
//! [`SingleHostReverseProxy`] on top of `reqwest`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod proxy;
pub mod state;
pub mod utils;

#[cfg(test)]
mod testutil;

pub use error::{ErrorHandler, LoggingErrorHandler, ProxyError};
pub use handlers::RequestHandler;
pub use proxy::{OkProxy, ReverseProxy, SingleHostReverseProxy};
pub use state::ProxyTarget;
