//! The barcode transition table.
//!
//! One function owns the table; everything else asks it. Exhaustive match
//! means a new status variant cannot be added without this file failing to
//! compile.

use super::entities::BarcodeStatus;
use super::errors::BarcodeError;

/// Minimum courier level allowed to cancel an in-transit barcode.
pub const IN_TRANSIT_CANCEL_MIN_LEVEL: u8 = 3;

/// Validate a status change.
///
/// `actor_level` is the courier level driving the change, if a courier is
/// driving it (binding and user-side cancels pass `None`).
pub fn check_transition(
    from: BarcodeStatus,
    to: BarcodeStatus,
    actor_level: Option<u8>,
) -> Result<(), BarcodeError> {
    use BarcodeStatus as S;

    if from.is_terminal() {
        return Err(BarcodeError::AlreadyTerminal { status: from });
    }

    let allowed = match (from, to) {
        // bind() is the only way out of Unactivated besides cancel.
        (S::Unactivated, S::Bound) | (S::Unactivated, S::Cancelled) => true,
        (S::Bound, S::InTransit) | (S::Bound, S::Failed) | (S::Bound, S::Cancelled) => true,
        (S::InTransit, S::Delivered) | (S::InTransit, S::Failed) => true,
        (S::InTransit, S::Cancelled) => {
            let level = actor_level.unwrap_or(0);
            if level < IN_TRANSIT_CANCEL_MIN_LEVEL {
                return Err(BarcodeError::CancelRequiresSenior { actor_level: level });
            }
            true
        }
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(BarcodeError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BarcodeStatus as S;

    #[test]
    fn test_happy_path_chain() {
        assert!(check_transition(S::Unactivated, S::Bound, None).is_ok());
        assert!(check_transition(S::Bound, S::InTransit, Some(1)).is_ok());
        assert!(check_transition(S::InTransit, S::Delivered, Some(1)).is_ok());
    }

    #[test]
    fn test_no_regression() {
        assert!(matches!(
            check_transition(S::InTransit, S::Bound, Some(1)),
            Err(BarcodeError::InvalidTransition { .. })
        ));
        assert!(matches!(
            check_transition(S::Bound, S::Unactivated, None),
            Err(BarcodeError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_terminal_rejects_everything() {
        for terminal in [S::Delivered, S::Failed, S::Cancelled] {
            for to in [S::Bound, S::InTransit, S::Delivered, S::Cancelled] {
                assert!(matches!(
                    check_transition(terminal, to, Some(4)),
                    Err(BarcodeError::AlreadyTerminal { .. })
                ));
            }
        }
    }

    #[test]
    fn test_fail_allowed_from_bound_and_transit() {
        assert!(check_transition(S::Bound, S::Failed, Some(1)).is_ok());
        assert!(check_transition(S::InTransit, S::Failed, Some(1)).is_ok());
    }

    #[test]
    fn test_in_transit_cancel_needs_level_three() {
        assert!(matches!(
            check_transition(S::InTransit, S::Cancelled, Some(1)),
            Err(BarcodeError::CancelRequiresSenior { actor_level: 1 })
        ));
        assert!(matches!(
            check_transition(S::InTransit, S::Cancelled, None),
            Err(BarcodeError::CancelRequiresSenior { actor_level: 0 })
        ));
        assert!(check_transition(S::InTransit, S::Cancelled, Some(3)).is_ok());
        assert!(check_transition(S::InTransit, S::Cancelled, Some(4)).is_ok());
    }

    #[test]
    fn test_bound_cancel_allowed_for_anyone() {
        assert!(check_transition(S::Bound, S::Cancelled, None).is_ok());
        assert!(check_transition(S::Unactivated, S::Cancelled, None).is_ok());
    }
}
