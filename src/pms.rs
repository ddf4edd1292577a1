// Provider-agnostic PMS client boundary. The gateway only sees this trait;
// the REST adapter below and the mock PMS used in tests are both drop-in
// implementations.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::models::{Availability, AvailabilityQuery, Reservation, ReservationDraft};
use crate::wire;

#[async_trait]
pub trait PmsClient: Send + Sync + 'static {
    async fn check_availability(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<Vec<Availability>, GatewayError>;

    // Exactly one upstream create per call; the caller decides whether a
    // failed create may be retried.
    async fn create_reservation(
        &self,
        draft: &ReservationDraft,
    ) -> Result<Reservation, GatewayError>;

    async fn get_reservation(
        &self,
        confirmation_number: &str,
    ) -> Result<Option<Reservation>, GatewayError>;
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    GatewayError::Transient(e.to_string())
}

// Reference HTTP implementation: XML availability (see wire.rs), JSON writes.
pub struct RestPmsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestPmsClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl PmsClient for RestPmsClient {
    async fn check_availability(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<Vec<Availability>, GatewayError> {
        let mut params = vec![
            ("checkin", query.checkin.to_string()),
            ("checkout", query.checkout.to_string()),
            ("adults", query.occupancy.adults.to_string()),
            ("children", query.occupancy.children.to_string()),
        ];
        if let Some(room_type) = &query.room_type {
            params.push(("room_type", room_type.clone()));
        }

        let response = self
            .http
            .get(format!("{}/availability", self.base_url))
            .header("x-api-key", &self.api_key)
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transient(format!(
                "availability request returned {status}"
            )));
        }

        let body = response.text().await.map_err(transport_error)?;
        wire::parse_availability(&body, query)
    }

    async fn create_reservation(
        &self,
        draft: &ReservationDraft,
    ) -> Result<Reservation, GatewayError> {
        let response = self
            .http
            .post(format!("{}/reservations", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(draft)
            .send()
            .await
            .map_err(|e| GatewayError::CommitFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::CommitFailed(format!(
                "reservation create returned {status}"
            )));
        }

        response
            .json::<Reservation>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn get_reservation(
        &self,
        confirmation_number: &str,
    ) -> Result<Option<Reservation>, GatewayError> {
        let response = self
            .http
            .get(format!(
                "{}/reservations/{confirmation_number}",
                self.base_url
            ))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transient(format!(
                "reservation fetch returned {status}"
            )));
        }

        response
            .json::<Reservation>()
            .await
            .map(Some)
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

// Configurable in-memory PMS for tests: canned inventory, injectable failures
// and latency, call counters.
pub mod mock_pms {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    use crate::models::{RateOption, ReservationStatus, RoomOccupancy};

    #[derive(Debug, Clone)]
    pub struct RoomInventory {
        pub room_type: String,
        pub total_rooms: u32,
        pub base_rate_cents: i64,
    }

    pub struct MockPms {
        rooms: Vec<RoomInventory>,
        currency: String,
        reservations: Mutex<HashMap<String, Reservation>>,
        fail_next_requests: AtomicUsize,
        outage: AtomicBool,
        delay_ms: AtomicUsize,
        availability_calls: AtomicUsize,
        create_calls: AtomicUsize,
    }

    impl MockPms {
        pub fn new() -> Self {
            Self::with_rooms(vec![
                RoomInventory {
                    room_type: "standard".to_string(),
                    total_rooms: 10,
                    base_rate_cents: 18_900,
                },
                RoomInventory {
                    room_type: "deluxe".to_string(),
                    total_rooms: 5,
                    base_rate_cents: 20_000,
                },
            ])
        }

        pub fn with_rooms(rooms: Vec<RoomInventory>) -> Self {
            Self {
                rooms,
                currency: "USD".to_string(),
                reservations: Mutex::new(HashMap::new()),
                fail_next_requests: AtomicUsize::new(0),
                outage: AtomicBool::new(false),
                delay_ms: AtomicUsize::new(0),
                availability_calls: AtomicUsize::new(0),
                create_calls: AtomicUsize::new(0),
            }
        }

        pub fn fail_next_requests(&self, count: usize) {
            self.fail_next_requests.store(count, Ordering::SeqCst);
        }

        pub fn set_outage(&self, outage: bool) {
            self.outage.store(outage, Ordering::SeqCst);
        }

        pub fn set_delay(&self, delay_ms: usize) {
            self.delay_ms.store(delay_ms, Ordering::SeqCst);
        }

        pub fn availability_calls(&self) -> usize {
            self.availability_calls.load(Ordering::SeqCst)
        }

        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        pub async fn reservation_count(&self) -> usize {
            self.reservations.lock().await.len()
        }

        async fn fault_gate(&self) -> Result<(), GatewayError> {
            if self.outage.load(Ordering::SeqCst) {
                return Err(GatewayError::Transient("service unavailable".to_string()));
            }
            if self
                .fail_next_requests
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(GatewayError::Transient(
                    "500 Internal Server Error".to_string(),
                ));
            }
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            Ok(())
        }

        async fn booked_overlapping(
            &self,
            room_type: &str,
            checkin: chrono::NaiveDate,
            checkout: chrono::NaiveDate,
        ) -> u32 {
            self.reservations
                .lock()
                .await
                .values()
                .filter(|r| {
                    r.status == ReservationStatus::Confirmed
                        && r.room_type == room_type
                        && r.checkin < checkout
                        && r.checkout > checkin
                })
                .count() as u32
        }
    }

    impl Default for MockPms {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl PmsClient for MockPms {
        async fn check_availability(
            &self,
            query: &AvailabilityQuery,
        ) -> Result<Vec<Availability>, GatewayError> {
            self.availability_calls.fetch_add(1, Ordering::SeqCst);
            self.fault_gate().await?;

            let mut options = Vec::new();
            for room in &self.rooms {
                if let Some(wanted) = &query.room_type {
                    if !room.room_type.eq_ignore_ascii_case(wanted) {
                        continue;
                    }
                }
                let booked = self
                    .booked_overlapping(&room.room_type, query.checkin, query.checkout)
                    .await;
                options.push(Availability {
                    checkin: query.checkin,
                    checkout: query.checkout,
                    room_type: room.room_type.clone(),
                    available_rooms: room.total_rooms.saturating_sub(booked),
                    total_rooms: room.total_rooms,
                    rates: vec![RateOption {
                        rate_id: "BAR".to_string(),
                        description: "Best available rate".to_string(),
                        base_rate_cents: room.base_rate_cents,
                        currency: self.currency.clone(),
                        refundable: true,
                    }],
                    degraded: false,
                });
            }
            Ok(options)
        }

        async fn create_reservation(
            &self,
            draft: &ReservationDraft,
        ) -> Result<Reservation, GatewayError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.fault_gate().await?;

            let room = self
                .rooms
                .iter()
                .find(|r| r.room_type == draft.room_type)
                .ok_or_else(|| {
                    GatewayError::CommitFailed(format!("unknown room type {}", draft.room_type))
                })?;
            let booked = self
                .booked_overlapping(&draft.room_type, draft.checkin, draft.checkout)
                .await;
            if booked >= room.total_rooms {
                return Err(GatewayError::CommitFailed(format!(
                    "no {} rooms left for those dates",
                    draft.room_type
                )));
            }

            let confirmation_number = draft
                .confirmation_number
                .clone()
                .unwrap_or_else(|| format!("CONF{}", rand::random::<u16>()));
            let reservation = Reservation {
                confirmation_number: confirmation_number.clone(),
                guest_name: draft.guest_name.clone(),
                guest_email: draft.guest_email.clone(),
                guest_phone: draft.guest_phone.clone(),
                room_type: draft.room_type.clone(),
                rate_id: draft.rate_id.clone(),
                checkin: draft.checkin,
                checkout: draft.checkout,
                occupancy: RoomOccupancy {
                    adults: draft.occupancy.adults,
                    children: draft.occupancy.children,
                },
                total_cents: draft.total_cents,
                currency: draft.currency.clone(),
                status: ReservationStatus::Confirmed,
            };
            self.reservations
                .lock()
                .await
                .insert(confirmation_number, reservation.clone());
            Ok(reservation)
        }

        async fn get_reservation(
            &self,
            confirmation_number: &str,
        ) -> Result<Option<Reservation>, GatewayError> {
            self.fault_gate().await?;
            Ok(self
                .reservations
                .lock()
                .await
                .get(confirmation_number)
                .cloned())
        }
    }
}
