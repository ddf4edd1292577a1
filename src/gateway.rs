// Resilient adapter in front of the upstream PMS. Availability reads are
// cache-first with retry, backoff and a circuit breaker, and never fail: an
// unreachable PMS degrades to stale or empty data. Reservation creates are
// the opposite: one attempt, errors surface, nothing is silently degraded.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::{GatewayConfig, RetryConfig};
use crate::error::GatewayError;
use crate::models::{Availability, AvailabilityQuery, Reservation, ReservationDraft};
use crate::pms::PmsClient;

#[derive(Debug, Default)]
struct GatewayStats {
    availability_requests: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    upstream_retries: AtomicUsize,
    upstream_failures: AtomicUsize,
    fallback_responses: AtomicUsize,
    breaker_fast_fails: AtomicUsize,
    reservations_created: AtomicUsize,
    commit_failures: AtomicUsize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStatsSnapshot {
    pub availability_requests: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub upstream_retries: usize,
    pub upstream_failures: usize,
    pub fallback_responses: usize,
    pub breaker_fast_fails: usize,
    pub reservations_created: usize,
    pub commit_failures: usize,
}

struct CachedAvailability {
    options: Vec<Availability>,
    expires_at: Instant,
}

pub struct PmsGateway {
    client: Arc<dyn PmsClient>,
    config: GatewayConfig,
    breaker: CircuitBreaker,
    // Expired entries are kept around to serve as stale fallback data
    availability_cache: DashMap<String, CachedAvailability>,
    reservation_cache: DashMap<String, Reservation>,
    cache_version: AtomicU64,
    stats: GatewayStats,
}

// Exponential backoff with jitter to avoid thundering-herd retries
fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
    let base_backoff_ms = (config.initial_backoff_ms as f64
        * config.backoff_multiplier.powf(retry_attempt as f64))
    .min(config.max_backoff_ms as f64);

    let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
    let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

    Duration::from_millis(backoff_ms as u64)
}

impl PmsGateway {
    pub fn new(client: Arc<dyn PmsClient>, config: GatewayConfig) -> Self {
        let breaker = CircuitBreaker::new(&config.circuit_breaker);
        Self {
            client,
            config,
            breaker,
            availability_cache: DashMap::new(),
            reservation_cache: DashMap::new(),
            cache_version: AtomicU64::new(0),
            stats: GatewayStats::default(),
        }
    }

    fn availability_key(&self, query: &AvailabilityQuery) -> String {
        format!(
            "v{}:{}:{}:{}:{}:{}",
            self.cache_version.load(Ordering::SeqCst),
            query.room_type.as_deref().unwrap_or("*"),
            query.checkin,
            query.checkout,
            query.occupancy.adults,
            query.occupancy.children,
        )
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    // Availability never fails: exhausted retries or an open breaker produce
    // a degraded fallback set instead.
    pub async fn check_availability(&self, query: &AvailabilityQuery) -> Vec<Availability> {
        self.stats
            .availability_requests
            .fetch_add(1, Ordering::SeqCst);
        let key = self.availability_key(query);

        if let Some(entry) = self.availability_cache.get(&key) {
            if entry.expires_at > Instant::now() {
                self.stats.cache_hits.fetch_add(1, Ordering::SeqCst);
                return entry.options.clone();
            }
        }
        self.stats.cache_misses.fetch_add(1, Ordering::SeqCst);

        let mut attempt = 0u32;
        loop {
            if !self.breaker.should_allow_call() {
                // Fail fast at cache-lookup cost instead of waiting on a
                // network timeout
                self.stats.breaker_fast_fails.fetch_add(1, Ordering::SeqCst);
                tracing::warn!("circuit open, serving fallback availability");
                return self.fallback_availability(query, &key);
            }

            match tokio::time::timeout(
                self.request_timeout(),
                self.client.check_availability(query),
            )
            .await
            {
                Ok(Ok(options)) => {
                    self.breaker.on_success();
                    self.availability_cache.insert(
                        key,
                        CachedAvailability {
                            options: options.clone(),
                            expires_at: Instant::now()
                                + Duration::from_secs(self.config.cache_ttl_seconds),
                        },
                    );
                    return options;
                }
                Ok(Err(e)) => {
                    self.breaker.on_failure();
                    self.stats.upstream_failures.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(error = %e, attempt, "availability call failed");
                    if !e.is_retryable() {
                        break;
                    }
                }
                Err(_) => {
                    self.breaker.on_failure();
                    self.stats.upstream_failures.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(
                        attempt,
                        timeout_ms = self.config.request_timeout_ms,
                        "availability call timed out"
                    );
                }
            }

            if attempt >= self.config.retry.max_retries {
                break;
            }
            self.stats.upstream_retries.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(calculate_backoff(attempt, &self.config.retry)).await;
            attempt += 1;
        }

        self.fallback_availability(query, &key)
    }

    fn fallback_availability(&self, query: &AvailabilityQuery, key: &str) -> Vec<Availability> {
        self.stats.fallback_responses.fetch_add(1, Ordering::SeqCst);

        // Stale-if-error: an expired snapshot beats an empty answer
        if let Some(entry) = self.availability_cache.get(key) {
            let mut options = entry.options.clone();
            for option in &mut options {
                option.degraded = true;
            }
            return options;
        }

        vec![Availability {
            checkin: query.checkin,
            checkout: query.checkout,
            room_type: query
                .room_type
                .clone()
                .unwrap_or_else(|| "standard".to_string()),
            available_rooms: 0,
            total_rooms: 0,
            rates: Vec::new(),
            degraded: true,
        }]
    }

    fn validate_draft(draft: &ReservationDraft) -> Result<(), GatewayError> {
        if draft.guest_name.trim().is_empty() {
            return Err(GatewayError::InvalidDraft("guest_name"));
        }
        if draft.room_type.is_empty() {
            return Err(GatewayError::InvalidDraft("room_type"));
        }
        if draft.rate_id.is_empty() {
            return Err(GatewayError::InvalidDraft("rate_id"));
        }
        if draft.checkout <= draft.checkin {
            return Err(GatewayError::InvalidDraft("date_range"));
        }
        if draft.total_cents < 0 {
            return Err(GatewayError::InvalidDraft("total_cents"));
        }
        Ok(())
    }

    // Exactly one upstream attempt. A retry here could double-book a guest,
    // so failures surface to the caller instead.
    pub async fn create_reservation(
        &self,
        draft: &ReservationDraft,
    ) -> Result<Reservation, GatewayError> {
        Self::validate_draft(draft)?;

        if !self.breaker.should_allow_call() {
            return Err(GatewayError::UpstreamUnavailable {
                retry_after_ms: self.breaker.retry_after().as_millis() as u64,
            });
        }

        let mut draft = draft.clone();
        if draft.confirmation_number.is_none() {
            draft.confirmation_number = Some(format!("CONF{:08X}", rand::random::<u32>()));
        }

        match tokio::time::timeout(
            self.request_timeout(),
            self.client.create_reservation(&draft),
        )
        .await
        {
            Ok(Ok(reservation)) => {
                self.breaker.on_success();
                self.stats
                    .reservations_created
                    .fetch_add(1, Ordering::SeqCst);
                self.reservation_cache
                    .insert(reservation.confirmation_number.clone(), reservation.clone());
                // Committed inventory invalidates every cached availability
                self.invalidate_availability();
                tracing::info!(
                    confirmation = %reservation.confirmation_number,
                    room_type = %reservation.room_type,
                    "reservation committed"
                );
                Ok(reservation)
            }
            Ok(Err(e)) => {
                self.breaker.on_failure();
                self.stats.commit_failures.fetch_add(1, Ordering::SeqCst);
                tracing::error!(error = %e, "reservation commit failed");
                match e {
                    GatewayError::CommitFailed(_) | GatewayError::InvalidDraft(_) => Err(e),
                    other => Err(GatewayError::CommitFailed(other.to_string())),
                }
            }
            Err(_) => {
                self.breaker.on_failure();
                self.stats.commit_failures.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::CommitFailed(format!(
                    "commit timed out after {}ms, upstream outcome unknown",
                    self.config.request_timeout_ms
                )))
            }
        }
    }

    pub async fn get_reservation(
        &self,
        confirmation_number: &str,
    ) -> Result<Option<Reservation>, GatewayError> {
        if let Some(reservation) = self.reservation_cache.get(confirmation_number) {
            return Ok(Some(reservation.clone()));
        }

        if !self.breaker.should_allow_call() {
            return Err(GatewayError::UpstreamUnavailable {
                retry_after_ms: self.breaker.retry_after().as_millis() as u64,
            });
        }

        match tokio::time::timeout(
            self.request_timeout(),
            self.client.get_reservation(confirmation_number),
        )
        .await
        {
            Ok(Ok(Some(reservation))) => {
                self.breaker.on_success();
                self.reservation_cache
                    .insert(reservation.confirmation_number.clone(), reservation.clone());
                Ok(Some(reservation))
            }
            Ok(Ok(None)) => {
                self.breaker.on_success();
                Ok(None)
            }
            Ok(Err(e)) => {
                self.breaker.on_failure();
                Err(e)
            }
            Err(_) => {
                self.breaker.on_failure();
                Err(GatewayError::Timeout(self.config.request_timeout_ms))
            }
        }
    }

    // Bumping the version makes every availability key miss on next lookup
    pub fn invalidate_availability(&self) {
        self.cache_version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.current_state()
    }

    pub fn stats(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            availability_requests: self.stats.availability_requests.load(Ordering::SeqCst),
            cache_hits: self.stats.cache_hits.load(Ordering::SeqCst),
            cache_misses: self.stats.cache_misses.load(Ordering::SeqCst),
            upstream_retries: self.stats.upstream_retries.load(Ordering::SeqCst),
            upstream_failures: self.stats.upstream_failures.load(Ordering::SeqCst),
            fallback_responses: self.stats.fallback_responses.load(Ordering::SeqCst),
            breaker_fast_fails: self.stats.breaker_fast_fails.load(Ordering::SeqCst),
            reservations_created: self.stats.reservations_created.load(Ordering::SeqCst),
            commit_failures: self.stats.commit_failures.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use crate::models::RoomOccupancy;
    use crate::pms::mock_pms::MockPms;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn query() -> AvailabilityQuery {
        AvailabilityQuery {
            checkin: date("2025-07-10"),
            checkout: date("2025-07-12"),
            occupancy: RoomOccupancy {
                adults: 2,
                children: 0,
            },
            room_type: None,
        }
    }

    fn draft() -> ReservationDraft {
        ReservationDraft {
            guest_name: "Ada Guest".to_string(),
            guest_email: None,
            guest_phone: None,
            room_type: "standard".to_string(),
            rate_id: "BAR".to_string(),
            checkin: date("2025-07-10"),
            checkout: date("2025-07-12"),
            occupancy: RoomOccupancy {
                adults: 2,
                children: 0,
            },
            total_cents: 42_000,
            currency: "USD".to_string(),
            confirmation_number: None,
        }
    }

    fn gateway(pms: Arc<MockPms>, config: GatewayConfig) -> PmsGateway {
        PmsGateway::new(pms, config)
    }

    #[tokio::test(start_paused = true)]
    async fn availability_is_served_from_cache() {
        let pms = Arc::new(MockPms::new());
        let gw = gateway(Arc::clone(&pms), GatewayConfig::default());

        let first = gw.check_availability(&query()).await;
        let second = gw.check_availability(&query()).await;

        assert_eq!(first, second);
        assert_eq!(pms.availability_calls(), 1);
        let stats = gw.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_and_absorbed() {
        let pms = Arc::new(MockPms::new());
        pms.fail_next_requests(2);
        let gw = gateway(Arc::clone(&pms), GatewayConfig::default());

        let options = gw.check_availability(&query()).await;

        assert!(!options.is_empty());
        assert!(!options[0].degraded);
        assert_eq!(pms.availability_calls(), 3);
        assert_eq!(gw.stats().upstream_retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_serves_fallback_without_contacting_upstream() {
        let pms = Arc::new(MockPms::new());
        pms.set_outage(true);
        let config = GatewayConfig {
            retry: RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout_ms: 60_000,
            },
            ..GatewayConfig::default()
        };
        let gw = gateway(Arc::clone(&pms), config);

        for _ in 0..5 {
            let options = gw.check_availability(&query()).await;
            assert!(options.iter().all(|o| o.degraded));
        }
        assert_eq!(pms.availability_calls(), 5);
        assert_eq!(gw.breaker_state(), CircuitState::Open);

        // Sixth call never reaches the upstream
        let options = gw.check_availability(&query()).await;
        assert!(options[0].degraded);
        assert_eq!(pms.availability_calls(), 5);
        assert_eq!(gw.stats().breaker_fast_fails, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cache_is_served_stale_on_outage() {
        let pms = Arc::new(MockPms::new());
        let config = GatewayConfig {
            cache_ttl_seconds: 10,
            retry: RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
            ..GatewayConfig::default()
        };
        let gw = gateway(Arc::clone(&pms), config);

        let fresh = gw.check_availability(&query()).await;
        assert!(!fresh[0].degraded);

        tokio::time::advance(Duration::from_secs(11)).await;
        pms.set_outage(true);

        let stale = gw.check_availability(&query()).await;
        assert_eq!(stale.len(), fresh.len());
        assert!(stale.iter().all(|o| o.degraded));
        assert_eq!(stale[0].room_type, fresh[0].room_type);
        assert!(!stale[0].rates.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn commit_fills_confirmation_number_and_invalidates_cache() {
        let pms = Arc::new(MockPms::new());
        let gw = gateway(Arc::clone(&pms), GatewayConfig::default());

        gw.check_availability(&query()).await;
        assert_eq!(pms.availability_calls(), 1);

        let reservation = gw.create_reservation(&draft()).await.unwrap();
        assert!(reservation.confirmation_number.starts_with("CONF"));

        // Post-commit the cached snapshot is stale, so the next read refetches
        gw.check_availability(&query()).await;
        assert_eq!(pms.availability_calls(), 2);
        assert_eq!(gw.stats().reservations_created, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_is_never_retried() {
        let pms = Arc::new(MockPms::new());
        pms.fail_next_requests(1);
        let gw = gateway(Arc::clone(&pms), GatewayConfig::default());

        let err = gw.create_reservation(&draft()).await.unwrap_err();
        assert!(matches!(err, GatewayError::CommitFailed(_)));
        assert_eq!(pms.create_calls(), 1);
        assert_eq!(gw.stats().commit_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_rejects_commits_instead_of_degrading() {
        let pms = Arc::new(MockPms::new());
        pms.set_outage(true);
        let config = GatewayConfig {
            retry: RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout_ms: 60_000,
            },
            ..GatewayConfig::default()
        };
        let gw = gateway(Arc::clone(&pms), config);

        gw.check_availability(&query()).await;
        assert_eq!(gw.breaker_state(), CircuitState::Open);

        let err = gw.create_reservation(&draft()).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable { .. }));
        assert_eq!(pms.create_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_draft_never_reaches_upstream() {
        let pms = Arc::new(MockPms::new());
        let gw = gateway(Arc::clone(&pms), GatewayConfig::default());

        let mut bad = draft();
        bad.guest_name = "  ".to_string();
        let err = gw.create_reservation(&bad).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidDraft("guest_name")));
        assert_eq!(pms.create_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn get_reservation_is_cache_first() {
        let pms = Arc::new(MockPms::new());
        let gw = gateway(Arc::clone(&pms), GatewayConfig::default());

        let reservation = gw.create_reservation(&draft()).await.unwrap();
        pms.set_outage(true);

        // Cached from the commit, so the outage is invisible
        let fetched = gw
            .get_reservation(&reservation.confirmation_number)
            .await
            .unwrap();
        assert_eq!(fetched, Some(reservation));
    }
}
