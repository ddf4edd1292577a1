// Domain model types shared across the gateway, pricing and workflow modules.
// All monetary amounts are integer cents so a quote shown at selection time is
// bit-identical to the amount committed at processing time.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Occupancy requested for a stay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOccupancy {
    pub adults: u32,
    pub children: u32,
}

impl RoomOccupancy {
    pub fn total(&self) -> u32 {
        self.adults + self.children
    }
}

// One bookable rate for a room type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateOption {
    pub rate_id: String,
    pub description: String,
    pub base_rate_cents: i64,
    pub currency: String,
    pub refundable: bool,
}

// Immutable availability snapshot for one room type over a date range,
// regenerated per query. `degraded` marks fallback data served while the
// upstream PMS is unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub room_type: String,
    pub available_rooms: u32,
    pub total_rooms: u32,
    pub rates: Vec<RateOption>,
    pub degraded: bool,
}

// Query parameters for an availability lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub occupancy: RoomOccupancy,
    pub room_type: Option<String>,
}

// Deterministic pricing result. total = subtotal + taxes + fees - discounts,
// clamped to >= 0. The breakdown map is ordered so serialized output is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingCalculation {
    pub base_rate_cents: i64,
    pub nights: i64,
    pub subtotal_cents: i64,
    pub taxes_cents: i64,
    pub fees_cents: i64,
    pub discounts_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub breakdown: BTreeMap<String, i64>,
}

// An availability option priced for the guest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedOption {
    pub room_type: String,
    pub rate: RateOption,
    pub pricing: PricingCalculation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

// What the workflow engine sends to the gateway at commit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationDraft {
    pub guest_name: String,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub room_type: String,
    pub rate_id: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub occupancy: RoomOccupancy,
    pub total_cents: i64,
    pub currency: String,
    pub confirmation_number: Option<String>,
}

// A committed reservation. The PMS is the system of record once this exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub confirmation_number: String,
    pub guest_name: String,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub room_type: String,
    pub rate_id: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub occupancy: RoomOccupancy,
    pub total_cents: i64,
    pub currency: String,
    pub status: ReservationStatus,
}
