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

use parking_lot::RwLock;
use std::sync::Arc;

/// The upstream base URL shared by every handler of one proxy.
///
/// An empty value means "unset". Clones share the same value, and reads and
/// writes always see a whole string.
#[derive(Debug, Clone, Default)]
pub struct ProxyTarget {
    url: Arc<RwLock<String>>,
}

impl ProxyTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Arc::new(RwLock::new(url.into())),
        }
    }

    /// Replaces the stored URL. No validation happens here.
    pub fn set_proxy_url(&self, url: impl Into<String>) {
        *self.url.write() = url.into();
    }

    pub fn get_proxy_url(&self) -> String {
        self.url.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.url.read().is_empty()
    }
}
