use super::schemas::{PaymentMethod, PaymentStatus};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The payment is already terminal. Benign under replay; callers
    /// acknowledge and move on instead of surfacing an error.
    #[error("payment is already settled")]
    Stale,
    #[error("transition from {from} to {to} is not allowed for {method}")]
    Illegal {
        from: PaymentStatus,
        to: PaymentStatus,
        method: PaymentMethod,
    },
    #[error("staff authorization is required to settle a bank transfer")]
    StaffRequired,
}

/// Pure legality check for a state transition. The store's optimistic
/// precondition handles concurrency; this handles the shape of the graph:
///
/// pending -> processing -> {completed | failed}          (mobile money, card)
/// pending -> completed                                   (cash only)
/// pending -> pending_verification -> {completed | failed} (bank transfer)
/// pending -> failed                                      (any method)
pub fn validate_transition(
    method: PaymentMethod,
    from: PaymentStatus,
    to: PaymentStatus,
    staff_authorized: bool,
) -> Result<(), TransitionError> {
    if from.is_terminal() {
        return Err(TransitionError::Stale);
    }

    let illegal = || TransitionError::Illegal { from, to, method };

    match (from, to) {
        (PaymentStatus::Pending, PaymentStatus::Processing) => {
            if method.is_mobile_money() || method == PaymentMethod::Card {
                Ok(())
            } else {
                Err(illegal())
            }
        }
        (PaymentStatus::Pending, PaymentStatus::Completed) => {
            if method == PaymentMethod::Cash {
                Ok(())
            } else {
                Err(illegal())
            }
        }
        (PaymentStatus::Pending, PaymentStatus::PendingVerification) => {
            if method == PaymentMethod::BankTransfer {
                Ok(())
            } else {
                Err(illegal())
            }
        }
        (PaymentStatus::Pending, PaymentStatus::Failed) => Ok(()),
        (PaymentStatus::Processing, PaymentStatus::Completed)
        | (PaymentStatus::Processing, PaymentStatus::Failed) => Ok(()),
        (PaymentStatus::PendingVerification, PaymentStatus::Completed) => {
            if staff_authorized {
                Ok(())
            } else {
                Err(TransitionError::StaffRequired)
            }
        }
        (PaymentStatus::PendingVerification, PaymentStatus::Failed) => Ok(()),
        _ => Err(illegal()),
    }
}
