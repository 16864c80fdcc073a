//! Paid-batch quota accounting
//!
//! Tracks how many paid retrieval batches a user has purchased and
//! consumed. Consumption is derived from the running `total_fetched`
//! counter rather than stored separately, so the two can never drift.

use crate::config::FetchConfig;
use crate::data::UserFetchState;
use crate::metrics::{PAYMENTS_CREDITED_TOTAL, PAYMENTS_DUPLICATE_TOTAL};

use super::fetch::FetchTier;

/// Quota arithmetic over a user's fetch state.
#[derive(Debug, Clone, Copy)]
pub struct QuotaLedger {
    free_allowance: u64,
    batch_size: u64,
}

impl QuotaLedger {
    pub fn new(fetch: &FetchConfig) -> Self {
        Self {
            free_allowance: fetch.free_allowance,
            batch_size: fetch.paid_batch_size,
        }
    }

    /// Paid batches already consumed, derived from the total item count.
    ///
    /// Items within the free allowance consume nothing; beyond it,
    /// every started batch counts as consumed.
    pub fn batches_consumed(&self, total_fetched: u64) -> u64 {
        if total_fetched <= self.free_allowance {
            return 0;
        }
        (total_fetched - self.free_allowance).div_ceil(self.batch_size)
    }

    /// Whether a run at the given tier may start.
    ///
    /// The free tier is always authorized; a paid run requires an
    /// unconsumed purchased batch.
    pub fn authorize(&self, state: &UserFetchState, tier: FetchTier) -> bool {
        match tier {
            FetchTier::Free => true,
            FetchTier::Paid => {
                self.batches_consumed(state.total_fetched) < u64::from(state.paid_batches)
            }
        }
    }

    /// Credit one purchased batch for a completed payment.
    ///
    /// Idempotent: a payment id that was already processed leaves the
    /// state untouched. Returns whether anything was credited.
    pub fn credit_payment(&self, state: &mut UserFetchState, payment_id: &str) -> bool {
        if state
            .processed_payment_ids
            .iter()
            .any(|id| id == payment_id)
        {
            PAYMENTS_DUPLICATE_TOTAL.inc();
            return false;
        }

        state.paid_batches += 1;
        state.processed_payment_ids.push(payment_id.to_string());
        PAYMENTS_CREDITED_TOTAL.inc();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> QuotaLedger {
        QuotaLedger {
            free_allowance: 25,
            batch_size: 100,
        }
    }

    fn state_with(total_fetched: u64, paid_batches: u32) -> UserFetchState {
        let mut state = UserFetchState::new(
            "at".into(),
            "rt".into(),
            0,
            "alice".into(),
            "Alice".into(),
            None,
        );
        state.total_fetched = total_fetched;
        state.paid_batches = paid_batches;
        state
    }

    #[test]
    fn free_allowance_consumes_no_batches() {
        let ledger = ledger();
        assert_eq!(ledger.batches_consumed(0), 0);
        assert_eq!(ledger.batches_consumed(25), 0);
        assert_eq!(ledger.batches_consumed(26), 1);
        assert_eq!(ledger.batches_consumed(125), 1);
        assert_eq!(ledger.batches_consumed(126), 2);
    }

    #[test]
    fn free_tier_is_always_authorized() {
        let ledger = ledger();
        assert!(ledger.authorize(&state_with(10_000, 0), FetchTier::Free));
    }

    #[test]
    fn paid_tier_requires_unconsumed_batch() {
        let ledger = ledger();
        // Free allowance used up, nothing purchased
        assert!(!ledger.authorize(&state_with(25, 0), FetchTier::Paid));
        // One batch purchased, not yet consumed
        assert!(ledger.authorize(&state_with(25, 1), FetchTier::Paid));
        // One batch purchased and fully consumed
        assert!(!ledger.authorize(&state_with(125, 1), FetchTier::Paid));
        assert!(ledger.authorize(&state_with(125, 2), FetchTier::Paid));
    }

    #[test]
    fn credit_payment_is_idempotent() {
        let ledger = ledger();
        let mut state = state_with(0, 0);

        assert!(ledger.credit_payment(&mut state, "pay_1"));
        assert_eq!(state.paid_batches, 1);

        // Replayed event changes nothing
        assert!(!ledger.credit_payment(&mut state, "pay_1"));
        assert_eq!(state.paid_batches, 1);
        assert_eq!(state.processed_payment_ids, vec!["pay_1".to_string()]);

        assert!(ledger.credit_payment(&mut state, "pay_2"));
        assert_eq!(state.paid_batches, 2);
    }
}
