//! Bill selection.
//!
//! Bills are spent largest first so a payment touches as few bills as
//! possible. Ties are broken by unit id, which keeps the choice stable
//! between runs over the same ledger state.

use std::cmp::Ordering;

use super::error::SelectionError;
use crate::unit::Bill;

/// Spending order: value descending, then unit id ascending.
pub fn spending_order(a: &Bill, b: &Bill) -> Ordering {
    b.value.cmp(&a.value).then_with(|| a.id.cmp(&b.id))
}

/// Picks the fewest largest bills whose sum reaches `target`.
///
/// Locked and zero-value bills are never selected.
pub fn select_bills_for_amount(bills: &[Bill], target: u64) -> Result<Vec<Bill>, SelectionError> {
    if target == 0 {
        return Err(SelectionError::ZeroAmount);
    }
    let mut candidates: Vec<&Bill> = bills.iter().filter(|b| b.is_spendable()).collect();
    candidates.sort_by(|a, b| spending_order(a, b));

    let mut selected = Vec::new();
    let mut total = 0u64;
    for bill in candidates {
        if total >= target {
            break;
        }
        total = total.saturating_add(bill.value);
        selected.push(bill.clone());
    }
    if total < target {
        return Err(SelectionError::InsufficientBalance {
            available: total,
            required: target,
        });
    }
    Ok(selected)
}
