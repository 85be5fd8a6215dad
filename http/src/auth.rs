// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! API-key authentication and per-key rate limiting for the HTTP surface.
//! `PRISMQ_API_KEY` is either a bare comma-separated list of keys or a JSON
//! map of `name -> key`; either shape is accepted.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    pub is_active: bool,
}

/// A process-wide table of accepted API keys plus a sliding one-minute
/// rate-limit window per key. When constructed from an empty string the
/// store is disabled and every request is tagged `anonymous` — local/dev
/// ergonomics without a special-cased code path downstream.
#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    enabled: bool,
    rate_limit_per_minute: u32,
    keys: Arc<RwLock<DashMap<String, ApiKey>>>,
    rate_windows: Arc<RwLock<DashMap<String, Vec<DateTime<Utc>>>>>,
}

impl ApiKeyStore {
    pub fn new(raw: &str, rate_limit_per_minute: u32) -> Self {
        if raw.trim().is_empty() {
            return Self {
                enabled: false,
                rate_limit_per_minute,
                keys: Arc::new(RwLock::new(DashMap::new())),
                rate_windows: Arc::new(RwLock::new(DashMap::new())),
            };
        }

        let keys = DashMap::new();
        if let Ok(named) = serde_json::from_str::<std::collections::HashMap<String, String>>(raw) {
            for (name, key) in named {
                keys.insert(
                    key.clone(),
                    ApiKey {
                        key,
                        name,
                        is_active: true,
                    },
                );
            }
        } else {
            for key in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
                keys.insert(
                    key.to_string(),
                    ApiKey {
                        key: key.to_string(),
                        name: key.to_string(),
                        is_active: true,
                    },
                );
            }
        }

        Self {
            enabled: true,
            rate_limit_per_minute,
            keys: Arc::new(RwLock::new(keys)),
            rate_windows: Arc::new(RwLock::new(DashMap::new())),
        }
    }

    pub fn disabled() -> Self {
        Self::new("", 0)
    }

    async fn get(&self, key: &str) -> Option<ApiKey> {
        let keys = self.keys.read().await;
        keys.get(key).map(|k| k.clone())
    }

    async fn check_rate_limit(&self, key: &str) -> bool {
        if self.rate_limit_per_minute == 0 {
            return true;
        }
        let windows = self.rate_windows.write().await;
        let now = Utc::now();
        let window_start = now - chrono::Duration::minutes(1);
        let mut entry = windows.entry(key.to_string()).or_default();
        entry.retain(|t| *t >= window_start);
        if entry.len() >= self.rate_limit_per_minute as usize {
            return false;
        }
        entry.push(now);
        true
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticatedApiKey {
    pub key: String,
    pub name: String,
}

pub async fn api_key_auth_middleware(
    State(store): State<Arc<ApiKeyStore>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !store.enabled {
        req.extensions_mut().insert(AuthenticatedApiKey {
            key: "anonymous".to_string(),
            name: "anonymous".to_string(),
        });
        return Ok(next.run(req).await);
    }

    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if provided.is_empty() {
        warn!("request missing x-api-key header");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let Some(key_info) = store.get(&provided).await else {
        warn!("unknown api key presented");
        return Err(StatusCode::UNAUTHORIZED);
    };
    if !key_info.is_active {
        warn!(name = %key_info.name, "inactive api key presented");
        return Err(StatusCode::UNAUTHORIZED);
    }
    if !store.check_rate_limit(&provided).await {
        warn!(name = %key_info.name, "rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    debug!(name = %key_info.name, "request authenticated");
    req.extensions_mut().insert(AuthenticatedApiKey {
        key: provided,
        name: key_info.name,
    });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_store_accepts_anything() {
        let store = ApiKeyStore::disabled();
        assert!(store.get("anything").await.is_none());
        assert!(!store.enabled);
    }

    #[tokio::test]
    async fn comma_separated_keys_are_accepted() {
        let store = ApiKeyStore::new("key-a,key-b", 60);
        assert!(store.get("key-a").await.is_some());
        assert!(store.get("key-b").await.is_some());
        assert!(store.get("key-c").await.is_none());
    }

    #[tokio::test]
    async fn named_json_map_is_accepted() {
        let store = ApiKeyStore::new(r#"{"prod":"key-a"}"#, 60);
        let key = store.get("key-a").await.unwrap();
        assert_eq!(key.name, "prod");
    }

    #[tokio::test]
    async fn rate_limit_blocks_after_threshold() {
        let store = ApiKeyStore::new("key-a", 2);
        assert!(store.check_rate_limit("key-a").await);
        assert!(store.check_rate_limit("key-a").await);
        assert!(!store.check_rate_limit("key-a").await);
    }
}
