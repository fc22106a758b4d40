use crate::{config::Rate, errors::AppError};
use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter};
use http::{header, HeaderMap};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;

pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub fn require_bearer(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let token = extract_bearer(headers).ok_or(AppError::Unauthorized)?;
    if token != expected {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

pub fn check_origin(headers: &HeaderMap, allowed: &[String]) -> Result<(), AppError> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::OriginDenied)?;
    if allowed.iter().any(|o| o == origin) {
        Ok(())
    } else {
        Err(AppError::OriginDenied)
    }
}

pub fn content_length_ok(headers: &HeaderMap, max_kb: usize) -> Result<(), AppError> {
    if let Some(len) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if len > max_kb * 1024 {
            return Err(AppError::RequestTooLarge);
        }
    }
    Ok(())
}

/// Per-token and process-wide call quotas.
#[derive(Clone)]
pub struct RateLimiters {
    per_token: Arc<DefaultKeyedRateLimiter<String>>,
    global: Arc<DefaultDirectRateLimiter>,
}

impl RateLimiters {
    pub fn new(rate: &Rate) -> Self {
        let per_token = quota(rate.per_token_rps, rate.per_token_burst);
        let global = quota(rate.global_rps, rate.global_burst);
        Self {
            per_token: Arc::new(RateLimiter::keyed(per_token)),
            global: Arc::new(RateLimiter::direct(global)),
        }
    }

    pub fn check(&self, token: Option<&str>) -> Result<(), AppError> {
        if let Some(t) = token {
            self.per_token.check_key(&t.to_string()).map_err(|_| AppError::RateLimited)?;
        }
        self.global.check().map_err(|_| AppError::RateLimited)
    }
}

fn quota(rps: u32, burst: u32) -> Quota {
    let rps = NonZeroU32::new(rps).unwrap_or(nonzero!(1u32));
    let burst = NonZeroU32::new(burst).unwrap_or(rps);
    Quota::per_second(rps).allow_burst(burst)
}
