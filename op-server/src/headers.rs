//! HTTP caching headers for protocol responses.
//!
//! Token and identity responses must never be cached (RFC 6749 §5.1);
//! discovery and key material tolerate bounded public caching.

use axum::http::HeaderValue;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use log::warn;

/// Cache-Control directives attached to a response.
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    no_store: bool,
    no_cache: bool,
    must_revalidate: bool,
    public: bool,
    max_age: Option<u32>,
}

impl CacheControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    pub fn must_revalidate(mut self) -> Self {
        self.must_revalidate = true;
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    fn is_no_cache(&self) -> bool {
        self.no_cache
    }

    /// Render the directives into a header value
    fn to_header_value(&self) -> String {
        let mut parts = Vec::new();
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        if self.public {
            parts.push("public".to_string());
        }
        if let Some(seconds) = self.max_age {
            parts.push(format!("max-age={seconds}"));
        }
        parts.join(", ")
    }
}

/// A bundle of caching headers applied to an outgoing response.
#[derive(Debug, Clone, Default)]
pub struct CacheHeaders {
    cache_control: CacheControl,
    expires: Option<DateTime<Utc>>,
}

impl CacheHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Stamp the headers onto a response, replacing any existing values
    pub fn apply<B>(&self, response: &mut Response<B>) {
        let headers = response.headers_mut();

        match HeaderValue::from_str(&self.cache_control.to_header_value()) {
            Ok(value) => {
                headers.insert(CACHE_CONTROL, value);
            }
            Err(e) => warn!("Failed to build Cache-Control header: {}", e),
        }

        // HTTP/1.0 caches only understand Pragma
        if self.cache_control.is_no_cache() {
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }

        if let Some(expires) = self.expires {
            match HeaderValue::from_str(&expires.to_rfc2822()) {
                Ok(value) => {
                    headers.insert(EXPIRES, value);
                }
                Err(e) => warn!("Failed to build Expires header: {}", e),
            }
        }
    }
}

pub mod presets {
    use super::*;

    /// Headers for responses that must never be cached.
    pub fn no_store() -> CacheHeaders {
        CacheHeaders::new()
            .cache_control(
                CacheControl::new()
                    .no_store()
                    .no_cache()
                    .must_revalidate(),
            )
            .expires(Utc::now() - Duration::hours(1))
    }

    /// Headers for publicly cacheable documents such as discovery metadata
    /// and the key set.
    pub fn public_cache(max_age_seconds: u32) -> CacheHeaders {
        CacheHeaders::new()
            .cache_control(CacheControl::new().public().max_age(max_age_seconds))
            .expires(Utc::now() + Duration::seconds(i64::from(max_age_seconds)))
    }
}
