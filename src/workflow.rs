//! Status machines and stock arithmetic shared by the handlers and both
//! repository implementations.

use chrono::NaiveDate;
use std::fmt::Debug;

use crate::error::AppError;
use crate::models::{Availability, DonationStatus, GroupStatus, RequestStatus, ResupplyStatus};
use crate::validation::MAX_QUANTITY;

pub const REQUEST_NUMBER_PREFIX: &str = "PFR";

/// Transition
///
/// Implemented by every status enum that moves through a fixed graph.
pub trait Transition: Copy + Eq + Debug {
    fn can_transition_to(self, next: Self) -> bool;

    fn is_terminal(self) -> bool;
}

/// Rejects moves the graph doesn't allow with a 409.
pub fn ensure_transition<S: Transition>(from: S, to: S) -> Result<(), AppError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Cannot move from {:?} to {:?}",
            from, to
        )))
    }
}

impl Transition for GroupStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use GroupStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Suspended)
                | (Suspended, Approved)
                | (Rejected, Pending)
        )
    }

    fn is_terminal(self) -> bool {
        false
    }
}

impl Transition for RequestStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Pending, Cancelled)
                | (Pending, Rejected)
                | (Assigned, InProgress)
                | (Assigned, Pending)
                | (Assigned, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Rejected
        )
    }
}

impl Transition for ResupplyStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use ResupplyStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, Fulfilled)
                | (Approved, Cancelled)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            ResupplyStatus::Rejected | ResupplyStatus::Fulfilled | ResupplyStatus::Cancelled
        )
    }
}

impl Transition for DonationStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use DonationStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Accepted, Received)
                | (Accepted, Cancelled)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            DonationStatus::Rejected | DonationStatus::Received | DonationStatus::Cancelled
        )
    }
}

/// Stock added to the entry when a resupply request reaches `to`.
pub fn resupply_stock_delta(to: ResupplyStatus, quantity: i32) -> Option<i32> {
    (to == ResupplyStatus::Fulfilled).then_some(quantity)
}

/// Stock added to the entry when a donation offer reaches `to`.
pub fn donation_stock_delta(to: DonationStatus, quantity: i32) -> Option<i32> {
    (to == DonationStatus::Received).then_some(quantity)
}

/// Applies `delta` to a stock level, keeping it inside `0..=MAX_QUANTITY`.
pub fn apply_stock_delta(current: i32, delta: i32) -> Result<i32, AppError> {
    current
        .checked_add(delta)
        .filter(|q| (0..=MAX_QUANTITY).contains(q))
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "Stock would leave the allowed range (current {}, change {})",
                current, delta
            ))
        })
}

/// Availability after the quantity changed from `old_quantity` to `new_quantity`.
/// Empty stock is never advertised; restocking an emptied entry re-opens it.
pub fn availability_after(
    current: Availability,
    old_quantity: i32,
    new_quantity: i32,
) -> Availability {
    if new_quantity == 0 {
        Availability::Unavailable
    } else if old_quantity == 0 && current == Availability::Unavailable {
        Availability::Available
    } else {
        current
    }
}

/// Formats `PFR` + `YYYYMMDD` + the daily sequence padded to four digits.
/// Sequences beyond 9999 simply widen the number.
pub fn request_number(date: NaiveDate, sequence: u32) -> String {
    format!(
        "{}{}{:04}",
        REQUEST_NUMBER_PREFIX,
        date.format("%Y%m%d"),
        sequence
    )
}

/// Splits a request number back into its date and sequence.
pub fn parse_request_number(number: &str) -> Option<(NaiveDate, u32)> {
    let rest = number.strip_prefix(REQUEST_NUMBER_PREFIX)?;
    if rest.len() < 12 || !rest.is_ascii() {
        return None;
    }
    let (date_part, seq_part) = rest.split_at(8);
    let date = NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()?;
    if !seq_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let sequence = seq_part.parse().ok()?;
    Some((date, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_moderation_graph() {
        assert!(GroupStatus::Pending.can_transition_to(GroupStatus::Approved));
        assert!(GroupStatus::Approved.can_transition_to(GroupStatus::Suspended));
        assert!(GroupStatus::Suspended.can_transition_to(GroupStatus::Approved));
        assert!(!GroupStatus::Rejected.can_transition_to(GroupStatus::Approved));
        assert!(!GroupStatus::Approved.can_transition_to(GroupStatus::Pending));
    }

    #[test]
    fn request_terminal_states_do_not_move() {
        for terminal in [
            RequestStatus::Completed,
            RequestStatus::Cancelled,
            RequestStatus::Rejected,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                RequestStatus::Pending,
                RequestStatus::Assigned,
                RequestStatus::InProgress,
                RequestStatus::Completed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn request_cannot_skip_assignment() {
        let err = ensure_transition(RequestStatus::Pending, RequestStatus::InProgress).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn resupply_must_be_approved_before_fulfilment() {
        assert!(!ResupplyStatus::Pending.can_transition_to(ResupplyStatus::Fulfilled));
        assert!(ResupplyStatus::Approved.can_transition_to(ResupplyStatus::Fulfilled));
        assert_eq!(resupply_stock_delta(ResupplyStatus::Fulfilled, 40), Some(40));
        assert_eq!(resupply_stock_delta(ResupplyStatus::Approved, 40), None);
    }

    #[test]
    fn donation_received_only_after_acceptance() {
        assert!(!DonationStatus::Pending.can_transition_to(DonationStatus::Received));
        assert!(DonationStatus::Accepted.can_transition_to(DonationStatus::Received));
        assert!(!DonationStatus::Received.can_transition_to(DonationStatus::Cancelled));
        assert_eq!(donation_stock_delta(DonationStatus::Received, 5), Some(5));
    }

    #[test]
    fn stock_stays_in_bounds() {
        assert_eq!(apply_stock_delta(10, 5).unwrap(), 15);
        assert_eq!(apply_stock_delta(10, -10).unwrap(), 0);
        assert!(apply_stock_delta(10, -11).is_err());
        assert!(apply_stock_delta(MAX_QUANTITY, 1).is_err());
        assert!(apply_stock_delta(i32::MAX, 1).is_err());
    }

    #[test]
    fn availability_follows_stock() {
        assert_eq!(
            availability_after(Availability::Available, 3, 0),
            Availability::Unavailable
        );
        assert_eq!(
            availability_after(Availability::Unavailable, 0, 20),
            Availability::Available
        );
        // A provider who parked stock as reserved keeps it reserved.
        assert_eq!(
            availability_after(Availability::Reserved, 5, 9),
            Availability::Reserved
        );
    }

    #[test]
    fn request_numbers_are_date_stamped() {
        let day = NaiveDate::from_ymd_opt(2024, 8, 3).unwrap();
        assert_eq!(request_number(day, 7), "PFR202408030007");
        assert_eq!(request_number(day, 12345), "PFR2024080312345");
        assert_eq!(parse_request_number("PFR202408030007"), Some((day, 7)));
        assert_eq!(parse_request_number("PFR20240803"), None);
        assert_eq!(parse_request_number("XYZ202408030007"), None);
        assert_eq!(parse_request_number("PFR20241303000x"), None);
    }
}
