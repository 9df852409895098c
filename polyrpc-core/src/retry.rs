//! §6 service-config JSON (retry policy, retry throttling) and the §6
//! retry algorithm: exponential backoff jittered ±20%, a token-bucket
//! throttle guarded by a single mutex, and server "pushback" overrides.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prost::Message as _;
use prost_reflect::DynamicMessage;
use serde::Deserialize;

use crate::error::{PolyCode, PolyError};
use crate::service::{HandlerContext, HandlerContextPool, Interceptor, NextUnary};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default)]
    pub method_config: Vec<MethodConfig>,
    #[serde(default)]
    pub retry_throttling: Option<RetryThrottling>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodConfig {
    pub name: Vec<MethodName>,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodName {
    pub service: String,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: String,
    pub max_backoff: String,
    pub backoff_multiplier: f64,
    pub retryable_status_codes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryThrottling {
    pub max_tokens: f64,
    pub token_ratio: f64,
}

const CANONICAL_CODES: &[&str] = &[
    "canceled", "unknown", "invalid_argument", "deadline_exceeded", "not_found", "already_exists",
    "permission_denied", "resource_exhausted", "failed_precondition", "aborted", "out_of_range",
    "unimplemented", "internal", "unavailable", "data_loss", "unauthenticated",
];

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), PolyError> {
        if let Some(throttling) = &self.retry_throttling {
            if !(throttling.max_tokens > 0.0 && throttling.max_tokens <= 1000.0) {
                return Err(PolyError::invalid_argument("maxTokens must be in (0, 1000]"));
            }
            if throttling.token_ratio <= 0.0 {
                return Err(PolyError::invalid_argument("tokenRatio must be > 0"));
            }
        }
        for mc in &self.method_config {
            if let Some(policy) = &mc.retry_policy {
                policy.validate()?;
            }
            if let Some(timeout) = &mc.timeout {
                parse_grpc_duration(timeout)
                    .ok_or_else(|| PolyError::invalid_argument(format!("unparseable timeout: {timeout}")))?;
            }
        }
        Ok(())
    }

    /// Find the retry policy that applies to one method (§6): an entry
    /// naming the method exactly wins over one naming just the service.
    pub fn retry_policy_for(&self, service: &str, method: &str) -> Option<&RetryPolicy> {
        let specific = self.method_config.iter().find(|mc| {
            mc.name.iter().any(|n| n.service == service && n.method.as_deref() == Some(method))
        });
        let wildcard = self.method_config.iter().find(|mc| {
            mc.name.iter().any(|n| n.service == service && n.method.is_none())
        });
        specific.or(wildcard).and_then(|mc| mc.retry_policy.as_ref())
    }
}

impl RetryPolicy {
    fn validate(&self) -> Result<(), PolyError> {
        if self.max_attempts <= 1 {
            return Err(PolyError::invalid_argument("retryPolicy.maxAttempts must be > 1"));
        }
        parse_grpc_duration(&self.initial_backoff)
            .ok_or_else(|| PolyError::invalid_argument("unparseable initialBackoff"))?;
        parse_grpc_duration(&self.max_backoff)
            .ok_or_else(|| PolyError::invalid_argument("unparseable maxBackoff"))?;
        for code in &self.retryable_status_codes {
            if !CANONICAL_CODES.contains(&code.as_str()) {
                return Err(PolyError::invalid_argument(format!("unknown status code: {code}")));
            }
        }
        Ok(())
    }

    pub fn is_retryable(&self, code: PolyCode) -> bool {
        self.retryable_status_codes.iter().any(|c| c == code.as_str())
    }
}

/// Parse a gRPC-style duration string like `"1.5s"` or `"250ms"`.
fn parse_grpc_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (number_part, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else {
        return None;
    };
    let value: f64 = number_part.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    let millis = match unit {
        "ms" => value,
        "s" => value * 1000.0,
        _ => return None,
    };
    Some(Duration::from_millis(millis.round() as u64))
}

/// Compute the backoff to wait before retry attempt `attempt` (1-indexed:
/// attempt 1 is the first retry, after the original call failed), jittered
/// uniformly in ±20% (§6).
pub fn compute_backoff(attempt: u32, policy: &RetryPolicy) -> Duration {
    let initial = parse_grpc_duration(&policy.initial_backoff).unwrap_or_default();
    let max = parse_grpc_duration(&policy.max_backoff).unwrap_or(initial);

    let exponent = attempt.saturating_sub(1) as i32;
    let scaled_ms = (initial.as_millis() as f64) * policy.backoff_multiplier.powi(exponent);
    let capped_ms = scaled_ms.min(max.as_millis() as f64);

    let jitter = 1.0 + (rand::random::<f64>() * 0.4 - 0.2);
    Duration::from_millis((capped_ms * jitter).max(0.0).round() as u64)
}

/// A server "pushback" value from error details overrides the computed
/// backoff entirely; a negative value halts retrying (`None`).
pub fn apply_pushback(computed: Duration, pushback_ms: Option<i64>) -> Option<Duration> {
    match pushback_ms {
        None => Some(computed),
        Some(ms) if ms < 0 => None,
        Some(ms) => Some(Duration::from_millis(ms as u64)),
    }
}

/// Token-bucket retry throttle (§5/§6): a single mutex guards the token
/// count, incremented by `token_ratio` on success and decremented by 1 on
/// failure. Retries are only allowed while the bucket holds more than half
/// its capacity, matching gRPC's own retry-throttling convention.
pub struct RetryThrottle {
    max_tokens: f64,
    token_ratio: f64,
    tokens: Mutex<f64>,
}

impl RetryThrottle {
    pub fn new(config: RetryThrottling) -> Self {
        RetryThrottle {
            max_tokens: config.max_tokens,
            token_ratio: config.token_ratio,
            tokens: Mutex::new(config.max_tokens),
        }
    }

    pub fn record_success(&self) {
        let mut tokens = self.tokens.lock().unwrap();
        *tokens = (*tokens + self.token_ratio).min(self.max_tokens);
    }

    pub fn record_failure(&self) {
        let mut tokens = self.tokens.lock().unwrap();
        *tokens = (*tokens - 1.0).max(0.0);
    }

    pub fn allow_retry(&self) -> bool {
        *self.tokens.lock().unwrap() > self.max_tokens / 2.0
    }
}

/// `DynamicMessage` carries no public `Clone`; a retry attempt past the
/// first needs its own copy of the request, so one is produced by
/// round-tripping through the wire encoding instead.
fn clone_request(msg: &DynamicMessage) -> DynamicMessage {
    let mut buf = Vec::new();
    msg.encode(&mut buf).expect("encoding into a Vec<u8> is infallible");
    let mut clone = DynamicMessage::new(msg.descriptor());
    clone.merge(buf.as_slice()).expect("re-decoding just-encoded bytes cannot fail");
    clone
}

/// Drives the §6 retry loop around the rest of the interceptor chain: looks
/// up the policy for the in-flight method by name, and while the last
/// attempt's error is retryable, under `maxAttempts`, and the throttle still
/// allows it, waits out the jittered backoff and calls `next` again with a
/// fresh copy of the request.
pub struct RetryInterceptor {
    service_name: String,
    config: ServiceConfig,
    throttle: Option<Arc<RetryThrottle>>,
}

impl RetryInterceptor {
    pub fn new(service_name: impl Into<String>, config: ServiceConfig, throttle: Option<Arc<RetryThrottle>>) -> Self {
        RetryInterceptor {
            service_name: service_name.into(),
            config,
            throttle,
        }
    }
}

#[async_trait]
impl Interceptor for RetryInterceptor {
    async fn call(&self, ctx: HandlerContext, req: DynamicMessage, next: NextUnary) -> (HandlerContext, Result<DynamicMessage, PolyError>) {
        let Some(policy) = self.config.retry_policy_for(&self.service_name, &ctx.method_name) else {
            return next(ctx, req).await;
        };

        let mut ctx = ctx;
        let mut attempt: u32 = 1;
        loop {
            let (returned_ctx, result) = next(ctx, clone_request(&req)).await;
            ctx = returned_ctx;

            let err = match result {
                Ok(response) => {
                    if let Some(throttle) = &self.throttle {
                        throttle.record_success();
                    }
                    return (ctx, Ok(response));
                }
                Err(err) => err,
            };

            if let Some(throttle) = &self.throttle {
                throttle.record_failure();
            }
            let throttle_allows = self.throttle.as_ref().map_or(true, |t| t.allow_retry());
            if !policy.is_retryable(err.code) || attempt >= policy.max_attempts || !throttle_allows {
                return (ctx, Err(err));
            }

            tokio::time::sleep(compute_backoff(attempt, policy)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial: &str, max: &str, mult: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: initial.to_string(),
            max_backoff: max.to_string(),
            backoff_multiplier: mult,
            retryable_status_codes: vec!["unavailable".to_string()],
        }
    }

    #[test]
    fn duration_parses_seconds_and_milliseconds() {
        assert_eq!(parse_grpc_duration("1s"), Some(Duration::from_secs(1)));
        assert_eq!(parse_grpc_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_duration("1.5s"), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn backoff_grows_with_attempt_and_caps_at_max() {
        let p = policy("100ms", "400ms", 2.0);
        let b1 = compute_backoff(1, &p).as_millis();
        let b4 = compute_backoff(4, &p).as_millis();
        assert!(b1 <= 120 && b1 >= 80);
        // attempt 4 -> 100*2^3=800ms uncapped, capped to 400ms +-20%
        assert!(b4 <= 480);
    }

    #[test]
    fn pushback_overrides_computed_backoff() {
        let out = apply_pushback(Duration::from_secs(1), Some(50));
        assert_eq!(out, Some(Duration::from_millis(50)));
    }

    #[test]
    fn negative_pushback_halts_retrying() {
        assert_eq!(apply_pushback(Duration::from_secs(1), Some(-1)), None);
    }

    #[test]
    fn is_retryable_checks_canonical_name() {
        let p = policy("1s", "2s", 2.0);
        assert!(p.is_retryable(PolyCode::Unavailable));
        assert!(!p.is_retryable(PolyCode::NotFound));
    }

    #[test]
    fn service_config_rejects_single_attempt_policy() {
        let mut p = policy("1s", "2s", 2.0);
        p.max_attempts = 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn service_config_rejects_unknown_status_code() {
        let mut p = policy("1s", "2s", 2.0);
        p.retryable_status_codes = vec!["bogus".to_string()];
        assert!(p.validate().is_err());
    }

    #[test]
    fn throttle_blocks_retries_below_half_capacity() {
        let throttle = RetryThrottle::new(RetryThrottling { max_tokens: 10.0, token_ratio: 0.1 });
        for _ in 0..6 {
            throttle.record_failure();
        }
        assert!(!throttle.allow_retry());
    }

    #[test]
    fn throttle_recovers_on_success() {
        let throttle = RetryThrottle::new(RetryThrottling { max_tokens: 10.0, token_ratio: 1.0 });
        for _ in 0..6 {
            throttle.record_failure();
        }
        assert!(!throttle.allow_retry());
        for _ in 0..5 {
            throttle.record_success();
        }
        assert!(throttle.allow_retry());
    }

    fn empty_message() -> DynamicMessage {
        let mut set = prost_types::FileDescriptorSet::default();
        set.file.push(prost_types::FileDescriptorProto {
            name: Some("retry_test.proto".to_string()),
            package: Some("rt.v1".to_string()),
            message_type: vec![prost_types::DescriptorProto {
                name: Some("Empty".to_string()),
                ..Default::default()
            }],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        });
        let pool = prost_reflect::DescriptorPool::from_file_descriptor_set(set).unwrap();
        DynamicMessage::new(pool.get_message_by_name("rt.v1.Empty").unwrap())
    }

    fn config_with_policy(service: &str, p: RetryPolicy) -> ServiceConfig {
        ServiceConfig {
            method_config: vec![MethodConfig {
                name: vec![MethodName { service: service.to_string(), method: None }],
                timeout: None,
                retry_policy: Some(p),
            }],
            retry_throttling: None,
        }
    }

    fn counting_next(attempts: Arc<std::sync::atomic::AtomicU32>, succeed_on: u32) -> NextUnary {
        use std::sync::atomic::Ordering;
        Arc::new(move |ctx, req| {
            let attempts = attempts.clone();
            Box::pin(async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < succeed_on {
                    (ctx, Err(PolyError::new(PolyCode::Unavailable, "down")))
                } else {
                    (ctx, Ok(req))
                }
            })
        })
    }

    #[tokio::test]
    async fn retry_interceptor_retries_a_retryable_failure_until_success() {
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let next = counting_next(attempts.clone(), 3);

        let config = config_with_policy("rt.v1.Demo", policy("1ms", "2ms", 2.0));
        let interceptor = RetryInterceptor::new("rt.v1.Demo", config, None);

        let mut ctx = HandlerContextPool::default().acquire();
        ctx.method_name = "Echo".to_string();

        let (_, result) = interceptor.call(ctx, empty_message(), next).await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_interceptor_stops_at_max_attempts() {
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let next = counting_next(attempts.clone(), u32::MAX);

        let config = config_with_policy("rt.v1.Demo", policy("1ms", "2ms", 2.0));
        let interceptor = RetryInterceptor::new("rt.v1.Demo", config, None);

        let mut ctx = HandlerContextPool::default().acquire();
        ctx.method_name = "Echo".to_string();

        let (_, result) = interceptor.call(ctx, empty_message(), next).await;
        assert_eq!(result.unwrap_err().code, PolyCode::Unavailable);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn retry_interceptor_leaves_an_unconfigured_service_untouched() {
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let next = counting_next(attempts.clone(), u32::MAX);

        // the config's only entry names a different service, so nothing
        // matches and the interceptor passes straight through.
        let config = config_with_policy("rt.v1.OtherService", policy("1ms", "2ms", 2.0));
        let interceptor = RetryInterceptor::new("rt.v1.Demo", config, None);

        let mut ctx = HandlerContextPool::default().acquire();
        ctx.method_name = "Echo".to_string();

        let (_, result) = interceptor.call(ctx, empty_message(), next).await;
        assert_eq!(result.unwrap_err().code, PolyCode::Unavailable);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_interceptor_exhausts_the_throttle_before_max_attempts() {
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let next = counting_next(attempts.clone(), u32::MAX);

        let mut policy = policy("1ms", "2ms", 2.0);
        policy.max_attempts = 100;
        let config = config_with_policy("rt.v1.Demo", policy);
        let throttle = Arc::new(RetryThrottle::new(RetryThrottling { max_tokens: 10.0, token_ratio: 1.0 }));
        let interceptor = RetryInterceptor::new("rt.v1.Demo", config, Some(throttle));

        let mut ctx = HandlerContextPool::default().acquire();
        ctx.method_name = "Echo".to_string();

        let (_, result) = interceptor.call(ctx, empty_message(), next).await;
        assert_eq!(result.unwrap_err().code, PolyCode::Unavailable);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 5);
    }
}
