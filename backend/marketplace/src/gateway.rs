//! Payment gateway boundary.
//!
//! The settlement engine talks to a [`CardProcessor`] and only relies on
//! its contract: a deterministic approve/decline per attempt.  The shipped
//! [`DummyGateway`] declines any card number starting with `4000` and
//! approves everything else, standing in for a real processor integration.

use uuid::Uuid;

use crate::errors::{MarketError, Result};
use crate::models::Cents;

/// Decline reason used by the dummy processor.
pub const DECLINE_REASON: &str = "Card declined by payment processor";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CardDetails {
    pub card_number: String,
    pub card_holder: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
    pub cvv: String,
}

impl CardDetails {
    /// Structural validation only: a 14–16 digit PAN and a 3–4 digit CVV.
    /// Anything deeper (issuer checks, expiry windows) is the processor's
    /// concern.
    pub fn validate(&self) -> Result<()> {
        let pan_digits = self.card_number.chars().all(|c| c.is_ascii_digit());
        if !pan_digits || !(14..=16).contains(&self.card_number.len()) {
            return Err(MarketError::Validation(
                "Card number must be 14-16 digits".to_string(),
            ));
        }
        let cvv_digits = self.cvv.chars().all(|c| c.is_ascii_digit());
        if !cvv_digits || !(3..=4).contains(&self.cvv.len()) {
            return Err(MarketError::Validation(
                "CVV must be 3-4 digits".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum ChargeOutcome {
    Approved { txn_id: String },
    Declined { reason: String },
}

/// One payment attempt against a processor.  Implementations must be
/// deterministic per attempt so that retries and idempotent replays behave
/// predictably.
pub trait CardProcessor: Send + Sync {
    fn name(&self) -> &'static str;
    fn charge(&self, card: &CardDetails, amount: Cents) -> ChargeOutcome;
}

/// Simulation processor: the `4000` PAN prefix always declines, every other
/// well-formed card always approves.
#[derive(Debug, Clone, Default)]
pub struct DummyGateway;

impl CardProcessor for DummyGateway {
    fn name(&self) -> &'static str {
        "DUMMY"
    }

    fn charge(&self, card: &CardDetails, _amount: Cents) -> ChargeOutcome {
        if card.card_number.starts_with("4000") {
            ChargeOutcome::Declined {
                reason: DECLINE_REASON.to_string(),
            }
        } else {
            ChargeOutcome::Approved {
                txn_id: Uuid::new_v4().to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(number: &str) -> CardDetails {
        CardDetails {
            card_number: number.to_string(),
            card_holder: "Jo Bidder".to_string(),
            expiry_month: 12,
            expiry_year: 2030,
            cvv: "123".to_string(),
        }
    }

    #[test]
    fn dummy_gateway_declines_4000_prefix() {
        match DummyGateway.charge(&card("4000123456789012"), 16_000) {
            ChargeOutcome::Declined { reason } => assert_eq!(reason, DECLINE_REASON),
            other => panic!("expected decline, got {other:?}"),
        }
    }

    #[test]
    fn dummy_gateway_approves_other_cards() {
        assert!(matches!(
            DummyGateway.charge(&card("4111111111111111"), 16_000),
            ChargeOutcome::Approved { .. }
        ));
    }

    #[test]
    fn card_validation_is_structural() {
        assert!(card("4111111111111111").validate().is_ok());
        assert!(card("12345678901234").validate().is_ok());
        assert!(card("1234").validate().is_err());
        assert!(card("41111111111111111111").validate().is_err());
        assert!(card("4111-1111-1111-1111").validate().is_err());

        let mut bad_cvv = card("4111111111111111");
        bad_cvv.cvv = "12".to_string();
        assert!(bad_cvv.validate().is_err());
    }
}
