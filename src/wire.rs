// Wire format spoken by the reference REST PMS adapter. Availability comes
// back as an OTA-style XML document; this module is the only place that knows
// its shape, so the format can change without touching the gateway or engine.

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::models::{Availability, AvailabilityQuery, RateOption};

#[derive(Debug, Deserialize)]
pub struct AvailabilityRs {
    #[serde(rename = "@currency")]
    pub currency: String,
    #[serde(rename = "Room", default)]
    pub rooms: Vec<RoomElement>,
}

#[derive(Debug, Deserialize)]
pub struct RoomElement {
    #[serde(rename = "@type")]
    pub room_type: String,
    #[serde(rename = "@available")]
    pub available: u32,
    #[serde(rename = "@total")]
    pub total: u32,
    #[serde(rename = "Rate", default)]
    pub rates: Vec<RateElement>,
}

#[derive(Debug, Deserialize)]
pub struct RateElement {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@description", default)]
    pub description: String,
    #[serde(rename = "@amount")]
    pub amount_cents: i64,
    #[serde(rename = "@refundable", default)]
    pub refundable: bool,
}

pub fn parse_availability(
    xml: &str,
    query: &AvailabilityQuery,
) -> Result<Vec<Availability>, GatewayError> {
    let response: AvailabilityRs =
        from_str(xml).map_err(|e| GatewayError::Decode(e.to_string()))?;

    let options = response
        .rooms
        .into_iter()
        .filter(|room| match &query.room_type {
            Some(wanted) => room.room_type.eq_ignore_ascii_case(wanted),
            None => true,
        })
        .map(|room| Availability {
            checkin: query.checkin,
            checkout: query.checkout,
            room_type: room.room_type,
            available_rooms: room.available,
            total_rooms: room.total,
            rates: room
                .rates
                .into_iter()
                .map(|rate| RateOption {
                    rate_id: rate.id,
                    description: rate.description,
                    base_rate_cents: rate.amount_cents,
                    currency: response.currency.clone(),
                    refundable: rate.refundable,
                })
                .collect(),
            degraded: false,
        })
        .collect();

    Ok(options)
}
