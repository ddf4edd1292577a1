// Business-rule validation for a requested stay. Violations come back as a
// structured list the orchestrator can turn into guest-facing prompts; an
// empty list means the stay may proceed to an availability check.

use chrono::NaiveDate;

use crate::config::BusinessRules;
use crate::error::BusinessRuleViolation;
use crate::models::RoomOccupancy;

pub fn validate_stay(
    rules: &BusinessRules,
    checkin: NaiveDate,
    checkout: NaiveDate,
    occupancy: RoomOccupancy,
    room_type: Option<&str>,
    today: NaiveDate,
) -> Vec<BusinessRuleViolation> {
    let mut violations = Vec::new();

    if checkout <= checkin {
        violations.push(BusinessRuleViolation::new(
            "checkout_after_checkin",
            "Check-out date must be after check-in date",
        ));
        // The remaining checks assume a positive stay length
        return violations;
    }

    let advance_days = (checkin - today).num_days();
    if advance_days < 0 {
        violations.push(BusinessRuleViolation::new(
            "advance_window",
            "Check-in date cannot be in the past",
        ));
    } else if advance_days < rules.min_advance_days {
        violations.push(BusinessRuleViolation::new(
            "advance_window",
            format!(
                "Check-in must be at least {} day(s) from today",
                rules.min_advance_days
            ),
        ));
    } else if advance_days > rules.max_advance_days {
        violations.push(BusinessRuleViolation::new(
            "advance_window",
            format!(
                "Reservations can be made at most {} days in advance",
                rules.max_advance_days
            ),
        ));
    }

    let nights = (checkout - checkin).num_days();
    if nights < rules.min_stay_nights {
        violations.push(BusinessRuleViolation::new(
            "stay_length",
            format!("Stays must be at least {} night(s)", rules.min_stay_nights),
        ));
    } else if nights > rules.max_stay_nights {
        violations.push(BusinessRuleViolation::new(
            "stay_length",
            format!("Stays can be at most {} nights", rules.max_stay_nights),
        ));
    }

    // Blackout ranges are inclusive; a stay overlaps when any of its nights
    // falls inside one.
    let last_night = checkout - chrono::Duration::days(1);
    for (start, end) in &rules.blackout_ranges {
        if checkin <= *end && last_night >= *start {
            violations.push(BusinessRuleViolation::new(
                "blackout",
                format!("The hotel is not taking reservations between {start} and {end}"),
            ));
            break;
        }
    }

    if let Some(room_type) = room_type {
        let max = rules
            .max_occupancy_per_room_type
            .get(room_type)
            .copied()
            .unwrap_or(rules.default_max_occupancy);
        if occupancy.total() > max {
            violations.push(BusinessRuleViolation::new(
                "occupancy",
                format!("Room type {room_type} sleeps at most {max} guests"),
            ));
        }
    } else if occupancy.total() > rules.default_max_occupancy {
        violations.push(BusinessRuleViolation::new(
            "occupancy",
            format!(
                "No room sleeps more than {} guests",
                rules.default_max_occupancy
            ),
        ));
    }

    violations
}
