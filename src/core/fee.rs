//! Fee computation for approved requests
//!
//! Fees are assessed once, at approval time, and the result is stored with the
//! ledger mutation and the audit entry. The net amount is rounded toward zero to
//! the smallest currency unit, so the user is never credited or paid out a
//! fraction of a unit the platform does not hold.

use crate::types::{FeeAssessment, FeeError, RequestKind};
use rust_decimal::{Decimal, RoundingStrategy};

/// Fee rates per request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Rate retained from deposits before crediting (0 = credit in full)
    pub deposit_rate: Decimal,

    /// Rate retained from withdrawals before paying out
    pub withdrawal_rate: Decimal,

    /// Decimal places of the smallest currency unit
    pub currency_scale: u32,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            deposit_rate: Decimal::ZERO,
            withdrawal_rate: Decimal::new(5, 2),
            currency_scale: 2,
        }
    }
}

impl FeeSchedule {
    pub fn rate_for(&self, kind: RequestKind) -> Decimal {
        match kind {
            RequestKind::Deposit => self.deposit_rate,
            RequestKind::Withdrawal => self.withdrawal_rate,
        }
    }

    /// Whether `rate` is a usable fee rate, i.e. within `[0, 1)`
    pub fn is_valid_rate(rate: Decimal) -> bool {
        rate >= Decimal::ZERO && rate < Decimal::ONE
    }

    /// Assess the fee for a gross `amount`
    ///
    /// `net_amount = amount * (1 - rate)` rounded down to `currency_scale`
    /// places; `fee = amount - net_amount`.
    ///
    /// # Errors
    ///
    /// * `FeeError::InvalidRate` - The rate for `kind` is outside `[0, 1)`
    /// * `FeeError::Overflow` - The decimal arithmetic overflowed
    pub fn assess(&self, kind: RequestKind, amount: Decimal) -> Result<FeeAssessment, FeeError> {
        let rate = self.rate_for(kind);
        if !Self::is_valid_rate(rate) {
            return Err(FeeError::InvalidRate { kind, rate });
        }
        if rate.is_zero() {
            return Ok(FeeAssessment::none(amount));
        }

        let keep = Decimal::ONE.checked_sub(rate).ok_or(FeeError::Overflow)?;
        let net_amount = amount
            .checked_mul(keep)
            .ok_or(FeeError::Overflow)?
            .round_dp_with_strategy(self.currency_scale, RoundingStrategy::ToZero);
        let fee = amount.checked_sub(net_amount).ok_or(FeeError::Overflow)?;

        Ok(FeeAssessment {
            rate,
            fee,
            net_amount,
        })
    }

    /// Signed ledger delta for an approved request
    ///
    /// Deposits credit the net amount (the gross amount when no deposit fee is
    /// configured). Withdrawals debit the gross amount; the fee is carved out of
    /// what is paid out, not added on top.
    pub fn ledger_delta(kind: RequestKind, amount: Decimal, assessment: &FeeAssessment) -> Decimal {
        match kind {
            RequestKind::Deposit => assessment.net_amount,
            RequestKind::Withdrawal => -amount,
        }
    }
}
