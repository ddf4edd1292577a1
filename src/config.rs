// Configuration for the reservation core. Every service takes its config by
// value at construction; there are no module-level singletons.

use std::collections::HashMap;

use chrono::{NaiveDate, Weekday};

// Retry configuration for upstream PMS reads
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 4000,
        }
    }
}

// PMS gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub cache_ttl_seconds: u64,
    pub request_timeout_ms: u64,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 300,
            request_timeout_ms: 2000,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

// Lock manager configuration. The TTL bounds how long a crashed holder can
// block other callers.
#[derive(Debug, Clone)]
pub struct LockConfig {
    pub ttl_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            poll_interval_ms: 50,
        }
    }
}

// Hotel business rules applied before an availability check. Blackout ranges
// are inclusive on both ends.
#[derive(Debug, Clone)]
pub struct BusinessRules {
    pub min_advance_days: i64,
    pub max_advance_days: i64,
    pub min_stay_nights: i64,
    pub max_stay_nights: i64,
    pub blackout_ranges: Vec<(NaiveDate, NaiveDate)>,
    pub max_occupancy_per_room_type: HashMap<String, u32>,
    pub default_max_occupancy: u32,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            min_advance_days: 0,
            max_advance_days: 365,
            min_stay_nights: 1,
            max_stay_nights: 30,
            blackout_ranges: Vec::new(),
            max_occupancy_per_room_type: HashMap::new(),
            default_max_occupancy: 4,
        }
    }
}

// Pricing configuration. Multipliers are applied in a fixed order by the
// calculator; see pricing.rs.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub currency: String,
    pub tax_rate: f64,
    pub service_fee_cents: i64,
    pub weekend_nights: Vec<Weekday>,
    pub weekend_markup: f64,
    pub peak_window: Option<(NaiveDate, NaiveDate)>,
    pub peak_multiplier: f64,
    pub early_booking_days: i64,
    pub early_booking_multiplier: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            tax_rate: 0.12,
            service_fee_cents: 2500,
            weekend_nights: vec![Weekday::Fri, Weekday::Sat],
            weekend_markup: 1.25,
            peak_window: None,
            peak_multiplier: 1.5,
            early_booking_days: 30,
            early_booking_multiplier: 0.9,
        }
    }
}

// Workflow engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workflow_idle_ttl_seconds: u64,
    pub lock_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workflow_idle_ttl_seconds: 1800,
            lock_wait_ms: 3000,
        }
    }
}
