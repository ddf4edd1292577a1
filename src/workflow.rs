// Reservation workflow engine: a per-conversation state machine that collects
// guest data incrementally, validates business rules, quotes availability and
// commits the reservation under a per-resource lock. Services are injected at
// construction; the registry is a process-local map with an idle-TTL sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::{BusinessRules, EngineConfig, PricingConfig};
use crate::error::{BusinessRuleViolation, LockError, WorkflowError};
use crate::gateway::PmsGateway;
use crate::lock::LockManager;
use crate::models::{AvailabilityQuery, QuotedOption, Reservation, ReservationDraft, RoomOccupancy};
use crate::pricing::calculate_pricing;
use crate::rules::validate_stay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Inquiry,
    InformationGathering,
    AvailabilityCheck,
    Selection,
    GuestDetails,
    Confirmation,
    Processing,
    Completed,
    Cancelled,
    Error,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Cancelled | WorkflowState::Error
        )
    }
}

// Fields the guest still has to provide, with a natural-language-ready prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    CheckinDate,
    CheckoutDate,
    Adults,
    RoomSelection,
    GuestName,
    GuestEmail,
    Confirmation,
}

impl Field {
    pub fn prompt(&self) -> &'static str {
        match self {
            Field::CheckinDate => "What date would you like to check in?",
            Field::CheckoutDate => "What date will you check out?",
            Field::Adults => "How many guests will be staying?",
            Field::RoomSelection => "Which room option would you like?",
            Field::GuestName => "What name should the reservation be under?",
            Field::GuestEmail => "What email should the confirmation go to?",
            Field::Confirmation => "Shall I go ahead and book it?",
        }
    }

    fn is_set(&self, data: &WorkflowData) -> bool {
        match self {
            Field::CheckinDate => data.checkin_date.is_some(),
            Field::CheckoutDate => data.checkout_date.is_some(),
            Field::Adults => data.adults.is_some(),
            Field::RoomSelection => data.selected_rate_id.is_some(),
            Field::GuestName => data.guest_name.is_some(),
            Field::GuestEmail => data.guest_email.is_some(),
            Field::Confirmation => data.confirmed == Some(true),
        }
    }
}

// Declarative required-fields table per state
fn required_fields(state: WorkflowState) -> &'static [Field] {
    match state {
        WorkflowState::InformationGathering => {
            &[Field::CheckinDate, Field::CheckoutDate, Field::Adults]
        }
        WorkflowState::Selection => &[Field::RoomSelection],
        WorkflowState::GuestDetails => &[Field::GuestName, Field::GuestEmail],
        WorkflowState::Confirmation => &[Field::Confirmation],
        _ => &[],
    }
}

fn missing_fields(state: WorkflowState, data: &WorkflowData) -> Vec<Field> {
    required_fields(state)
        .iter()
        .copied()
        .filter(|field| !field.is_set(data))
        .collect()
}

// Typed accumulated guest data. Merging a delta is last-write-wins per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowData {
    pub checkin_date: Option<NaiveDate>,
    pub checkout_date: Option<NaiveDate>,
    pub adults: Option<u32>,
    pub children: Option<u32>,
    pub room_type: Option<String>,
    pub selected_rate_id: Option<String>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub confirmed: Option<bool>,
}

macro_rules! merge_field {
    ($self:ident, $delta:ident, $($field:ident),+) => {
        $(if $delta.$field.is_some() {
            $self.$field = $delta.$field.clone();
        })+
    };
}

impl WorkflowData {
    pub fn merge(&mut self, delta: &WorkflowData) {
        merge_field!(
            self,
            delta,
            checkin_date,
            checkout_date,
            adults,
            children,
            room_type,
            selected_rate_id,
            guest_name,
            guest_email,
            guest_phone,
            confirmed
        );
    }

    // True when the delta rewrites a field the quotes were computed from.
    // Accepting such a delta invalidates rule validation and pricing alike.
    fn changes_stay(&self, delta: &WorkflowData) -> bool {
        fn rewrites<T: PartialEq>(current: &Option<T>, incoming: &Option<T>) -> bool {
            matches!(incoming, Some(value) if current.as_ref() != Some(value))
        }
        rewrites(&self.checkin_date, &delta.checkin_date)
            || rewrites(&self.checkout_date, &delta.checkout_date)
            || rewrites(&self.adults, &delta.adults)
            || rewrites(&self.children, &delta.children)
            || rewrites(&self.room_type, &delta.room_type)
    }

    // Parse the entity map handed over by the NLP collaborator. Unparseable
    // values become violations so the guest can be re-prompted; they never
    // abort the turn.
    pub fn from_entities(
        entities: &HashMap<String, String>,
    ) -> (WorkflowData, Vec<BusinessRuleViolation>) {
        let mut data = WorkflowData::default();
        let mut violations = Vec::new();

        let mut parse_date = |key: &str| -> Option<NaiveDate> {
            let raw = entities.get(key)?;
            match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    violations.push(BusinessRuleViolation::new(
                        "entity_format",
                        format!("Could not understand {key} value '{raw}'"),
                    ));
                    None
                }
            }
        };
        data.checkin_date = parse_date("checkin_date");
        data.checkout_date = parse_date("checkout_date");

        let mut parse_count = |key: &str| -> Option<u32> {
            let raw = entities.get(key)?;
            match raw.parse::<u32>() {
                Ok(count) => Some(count),
                Err(_) => {
                    violations.push(BusinessRuleViolation::new(
                        "entity_format",
                        format!("Could not understand {key} value '{raw}'"),
                    ));
                    None
                }
            }
        };
        data.adults = parse_count("guest_count").or_else(|| parse_count("adults"));
        data.children = parse_count("children");

        data.room_type = entities.get("room_type").cloned();
        data.selected_rate_id = entities.get("selected_rate_id").cloned();
        data.guest_name = entities.get("guest_name").cloned();
        data.guest_email = entities.get("guest_email").cloned();
        data.guest_phone = entities.get("guest_phone").cloned();
        data.confirmed = entities.get("confirm").map(|v| v == "true" || v == "yes");

        (data, violations)
    }
}

// One guest conversation's reservation attempt
pub struct ReservationWorkflow {
    pub workflow_id: String,
    pub session_id: String,
    pub state: WorkflowState,
    pub data: WorkflowData,
    pub quotes: Vec<QuotedOption>,
    pub selected: Option<QuotedOption>,
    pub violations: Vec<BusinessRuleViolation>,
    pub reservation: Option<Reservation>,
    pub failure: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    last_touched: Instant,
}

impl ReservationWorkflow {
    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.last_touched = Instant::now();
    }
}

// Outcome of one guest turn, ready for the response-generation collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub workflow_id: String,
    pub state: WorkflowState,
    pub missing_fields: Vec<Field>,
    pub prompts: Vec<String>,
    pub violations: Vec<BusinessRuleViolation>,
    pub options: Vec<QuotedOption>,
    pub reservation: Option<Reservation>,
    pub failure: Option<String>,
}

enum PendingIo {
    None,
    Availability,
    Commit,
}

pub struct WorkflowEngine {
    gateway: Arc<PmsGateway>,
    locks: Arc<LockManager>,
    rules: BusinessRules,
    pricing: PricingConfig,
    config: EngineConfig,
    registry: DashMap<String, ReservationWorkflow>,
}

impl WorkflowEngine {
    pub fn new(
        gateway: Arc<PmsGateway>,
        locks: Arc<LockManager>,
        rules: BusinessRules,
        pricing: PricingConfig,
        config: EngineConfig,
    ) -> Self {
        Self {
            gateway,
            locks,
            rules,
            pricing,
            config,
            registry: DashMap::new(),
        }
    }

    pub fn start(&self, session_id: &str) -> String {
        let workflow_id = format!("wf-{:012x}", rand::random::<u64>() & 0xffff_ffff_ffff);
        let now = Utc::now();
        self.registry.insert(
            workflow_id.clone(),
            ReservationWorkflow {
                workflow_id: workflow_id.clone(),
                session_id: session_id.to_string(),
                state: WorkflowState::Inquiry,
                data: WorkflowData::default(),
                quotes: Vec::new(),
                selected: None,
                violations: Vec::new(),
                reservation: None,
                failure: None,
                cancel_reason: None,
                created_at: now,
                updated_at: now,
                last_touched: Instant::now(),
            },
        );
        tracing::info!(workflow_id = %workflow_id, session_id, "workflow started");
        workflow_id
    }

    pub fn snapshot(&self, workflow_id: &str) -> Option<StepResult> {
        self.registry
            .get(workflow_id)
            .map(|w| Self::result_of(&w))
    }

    // Merge a data delta and advance as far as the accumulated data allows.
    // Calling with an empty delta is idempotent: same state, same prompts.
    pub async fn process_step(
        &self,
        workflow_id: &str,
        delta: &WorkflowData,
    ) -> Result<StepResult, WorkflowError> {
        let pending = {
            let mut w = self
                .registry
                .get_mut(workflow_id)
                .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
            if w.state.is_terminal() {
                return Ok(Self::result_of(&w));
            }
            // A changed stay drops the stored quotes and goes back through
            // rule validation and availability, so a delta that also carries
            // confirmed=true can only commit a re-validated, re-priced stay
            if w.data.changes_stay(delta)
                && matches!(
                    w.state,
                    WorkflowState::Selection
                        | WorkflowState::GuestDetails
                        | WorkflowState::Confirmation
                )
            {
                w.quotes.clear();
                w.selected = None;
                Self::transition(&mut w, WorkflowState::AvailabilityCheck);
            }
            w.data.merge(delta);
            w.touch();
            Self::sync_advance(&mut w)
        };
        self.drive(workflow_id, pending).await
    }

    // Explicit cancel: any non-terminal state goes to Cancelled. Nothing was
    // committed yet in those states, so no PMS round-trip happens.
    pub fn cancel(&self, workflow_id: &str, reason: &str) -> Result<StepResult, WorkflowError> {
        let mut w = self
            .registry
            .get_mut(workflow_id)
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
        if w.state.is_terminal() {
            return Err(WorkflowError::Terminal(workflow_id.to_string()));
        }
        Self::transition(&mut w, WorkflowState::Cancelled);
        w.cancel_reason = Some(reason.to_string());
        w.touch();
        Ok(Self::result_of(&w))
    }

    // Drop workflows idle past the configured TTL, terminal or abandoned
    pub fn sweep_idle(&self) -> usize {
        let ttl = Duration::from_secs(self.config.workflow_idle_ttl_seconds);
        // Counted inside the closure; len() before/after can drift under
        // concurrent inserts
        let mut removed = 0;
        self.registry.retain(|_, w| {
            let keep = w.last_touched.elapsed() <= ttl;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            tracing::debug!(removed, "swept idle workflows");
        }
        removed
    }

    fn transition(w: &mut ReservationWorkflow, next: WorkflowState) {
        tracing::info!(
            workflow_id = %w.workflow_id,
            from = ?w.state,
            to = ?next,
            "workflow transition"
        );
        w.state = next;
        w.updated_at = Utc::now();
    }

    // Advance through every transition that needs no I/O and report what the
    // next step needs. Readiness is purely the required-fields table, so
    // repeated calls with no new data land in the same place.
    fn sync_advance(w: &mut ReservationWorkflow) -> PendingIo {
        loop {
            match w.state {
                WorkflowState::Inquiry => {
                    Self::transition(w, WorkflowState::InformationGathering);
                }
                WorkflowState::InformationGathering => {
                    if !missing_fields(w.state, &w.data).is_empty() {
                        return PendingIo::None;
                    }
                    Self::transition(w, WorkflowState::AvailabilityCheck);
                }
                WorkflowState::AvailabilityCheck => return PendingIo::Availability,
                WorkflowState::Selection => {
                    let Some(rate_id) = w.data.selected_rate_id.clone() else {
                        return PendingIo::None;
                    };
                    let wanted_room = w.data.room_type.clone();
                    let quote = w
                        .quotes
                        .iter()
                        .find(|q| {
                            q.rate.rate_id == rate_id
                                && wanted_room
                                    .as_deref()
                                    .map_or(true, |room| q.room_type.eq_ignore_ascii_case(room))
                        })
                        .cloned();
                    match quote {
                        Some(quote) => {
                            w.data.room_type = Some(quote.room_type.clone());
                            w.selected = Some(quote);
                            w.violations.clear();
                            Self::transition(w, WorkflowState::GuestDetails);
                        }
                        None => {
                            w.violations = vec![BusinessRuleViolation::new(
                                "unknown_option",
                                format!("'{rate_id}' does not match any offered option"),
                            )];
                            w.data.selected_rate_id = None;
                            return PendingIo::None;
                        }
                    }
                }
                WorkflowState::GuestDetails => {
                    if !missing_fields(w.state, &w.data).is_empty() {
                        return PendingIo::None;
                    }
                    Self::transition(w, WorkflowState::Confirmation);
                }
                WorkflowState::Confirmation => {
                    if w.data.confirmed == Some(true) {
                        return PendingIo::Commit;
                    }
                    return PendingIo::None;
                }
                WorkflowState::Processing => return PendingIo::Commit,
                WorkflowState::Completed | WorkflowState::Cancelled | WorkflowState::Error => {
                    return PendingIo::None;
                }
            }
        }
    }

    async fn drive(
        &self,
        workflow_id: &str,
        mut pending: PendingIo,
    ) -> Result<StepResult, WorkflowError> {
        loop {
            match pending {
                PendingIo::None => {
                    let w = self
                        .registry
                        .get(workflow_id)
                        .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
                    return Ok(Self::result_of(&w));
                }
                PendingIo::Availability => {
                    pending = self.run_availability_check(workflow_id).await?;
                }
                PendingIo::Commit => return self.commit(workflow_id).await,
            }
        }
    }

    async fn run_availability_check(
        &self,
        workflow_id: &str,
    ) -> Result<PendingIo, WorkflowError> {
        let today = Utc::now().date_naive();

        // Snapshot inputs; the registry guard must not be held across awaits
        let (query, checkin, checkout) = {
            let w = self
                .registry
                .get(workflow_id)
                .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
            let (Some(checkin), Some(checkout), Some(adults)) = (
                w.data.checkin_date,
                w.data.checkout_date,
                w.data.adults,
            ) else {
                return Ok(PendingIo::None);
            };
            let occupancy = RoomOccupancy {
                adults,
                children: w.data.children.unwrap_or(0),
            };

            let violations = validate_stay(
                &self.rules,
                checkin,
                checkout,
                occupancy,
                w.data.room_type.as_deref(),
                today,
            );
            if !violations.is_empty() {
                drop(w);
                let mut w = self
                    .registry
                    .get_mut(workflow_id)
                    .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
                w.quotes.clear();
                w.violations = violations;
                return Ok(PendingIo::None);
            }

            (
                AvailabilityQuery {
                    checkin,
                    checkout,
                    occupancy,
                    room_type: w.data.room_type.clone(),
                },
                checkin,
                checkout,
            )
        };

        let options = self.gateway.check_availability(&query).await;
        let quotes: Vec<QuotedOption> = options
            .iter()
            .filter(|option| option.available_rooms > 0)
            .flat_map(|option| {
                option.rates.iter().map(|rate| QuotedOption {
                    room_type: option.room_type.clone(),
                    rate: rate.clone(),
                    pricing: calculate_pricing(
                        &self.pricing,
                        rate.base_rate_cents,
                        checkin,
                        checkout,
                        today,
                    ),
                })
            })
            .collect();

        let mut w = self
            .registry
            .get_mut(workflow_id)
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
        if w.state.is_terminal() {
            return Ok(PendingIo::None);
        }
        w.violations.clear();
        w.quotes = quotes;
        if w.quotes.is_empty() {
            // Nothing bookable right now (sold out or degraded upstream);
            // the guest can adjust dates or try again
            return Ok(PendingIo::None);
        }
        Self::transition(&mut w, WorkflowState::Selection);
        Ok(Self::sync_advance(&mut w))
    }

    async fn commit(&self, workflow_id: &str) -> Result<StepResult, WorkflowError> {
        let (draft, resource_id) = {
            let mut w = self
                .registry
                .get_mut(workflow_id)
                .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
            let (Some(selected), Some(checkin), Some(checkout), Some(guest_name), Some(adults)) = (
                w.selected.clone(),
                w.data.checkin_date,
                w.data.checkout_date,
                w.data.guest_name.clone(),
                w.data.adults,
            ) else {
                // Required data disappeared from under us; re-prompt rather
                // than commit a partial draft
                return Ok(Self::result_of(&w));
            };

            Self::transition(&mut w, WorkflowState::Processing);
            let resource_id = format!("room:{}:{checkin}:{checkout}", selected.room_type);
            let draft = ReservationDraft {
                guest_name,
                guest_email: w.data.guest_email.clone(),
                guest_phone: w.data.guest_phone.clone(),
                room_type: selected.room_type.clone(),
                rate_id: selected.rate.rate_id.clone(),
                checkin,
                checkout,
                occupancy: RoomOccupancy {
                    adults,
                    children: w.data.children.unwrap_or(0),
                },
                // The committed amount is the stored quote, never a recompute
                total_cents: selected.pricing.total_cents,
                currency: selected.pricing.currency.clone(),
                confirmation_number: None,
            };
            (draft, resource_id)
        };

        // Serialize committers on the same room/date-range before the
        // one-shot create. The guard releases on drop, so a cancelled task
        // cannot leak the lock.
        let guard = match self
            .locks
            .lease(&resource_id, Duration::from_millis(self.config.lock_wait_ms))
            .await
        {
            Ok(guard) => guard,
            Err(LockError::Timeout { .. }) => {
                let mut w = self
                    .registry
                    .get_mut(workflow_id)
                    .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
                if w.state == WorkflowState::Processing {
                    tracing::warn!(
                        workflow_id = %w.workflow_id,
                        resource_id = %resource_id,
                        "commit lock busy, returning to confirmation"
                    );
                    Self::transition(&mut w, WorkflowState::Confirmation);
                }
                return Err(WorkflowError::LockBusy(resource_id));
            }
        };

        let outcome = self.gateway.create_reservation(&draft).await;
        drop(guard);

        let mut w = self
            .registry
            .get_mut(workflow_id)
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
        if w.state != WorkflowState::Processing {
            // Cancelled while committing; keep the committed reservation on
            // record if the create went through
            if let Ok(reservation) = outcome {
                w.reservation = Some(reservation);
            }
            return Ok(Self::result_of(&w));
        }
        match outcome {
            Ok(reservation) => {
                w.reservation = Some(reservation);
                Self::transition(&mut w, WorkflowState::Completed);
            }
            Err(e) => {
                w.failure = Some(e.to_string());
                Self::transition(&mut w, WorkflowState::Error);
            }
        }
        w.touch();
        Ok(Self::result_of(&w))
    }

    fn result_of(w: &ReservationWorkflow) -> StepResult {
        let missing = missing_fields(w.state, &w.data);
        StepResult {
            workflow_id: w.workflow_id.clone(),
            state: w.state,
            prompts: missing.iter().map(|f| f.prompt().to_string()).collect(),
            missing_fields: missing,
            violations: w.violations.clone(),
            options: w.quotes.clone(),
            reservation: w.reservation.clone(),
            failure: w.failure.clone(),
        }
    }
}
