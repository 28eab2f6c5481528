//! # Ledger Configuration & Constants
//!
//! Every magic number in the ledger lives here. Grading scores, pagination
//! bounds, and reward limits are part of the contract with the frontend, so
//! changing one of these is a coordinated change, not a refactor.

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Ledger library version reported by the node's status endpoint.
pub const LEDGER_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Grading
// ---------------------------------------------------------------------------

/// Score recorded for a correct answer (and the default for an accepted
/// text submission).
pub const FULL_SCORE: u8 = 100;

/// Score recorded for an incorrect auto-graded answer or a rejected review.
pub const ZERO_SCORE: u8 = 0;

/// Minimum number of options an MCQ quest must offer. One option is not a
/// question.
pub const MIN_MCQ_OPTIONS: usize = 2;

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

/// Upper bound on a single quest reward or coin grant.
///
/// Keeps every amount comfortably inside `i64` so ledger deltas never
/// truncate.
pub const MAX_COIN_AMOUNT: u64 = 1_000_000;

/// Maximum length of a quest title, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum length of a free-text answer, in characters.
pub const MAX_TEXT_ANSWER_LEN: usize = 10_000;

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Page size used by `get_my_ledger` when the caller does not pass one.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Largest page `get_my_ledger` will return. Larger requests are clamped.
pub const MAX_PAGE_LIMIT: usize = 200;

/// Clamps a caller-supplied page size into `[1, MAX_PAGE_LIMIT]`.
pub fn clamp_page_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limit_defaults_and_clamps() {
        assert_eq!(clamp_page_limit(None), DEFAULT_PAGE_LIMIT);
        assert_eq!(clamp_page_limit(Some(0)), 1);
        assert_eq!(clamp_page_limit(Some(10)), 10);
        assert_eq!(clamp_page_limit(Some(10_000)), MAX_PAGE_LIMIT);
    }

    #[test]
    fn max_coin_amount_fits_in_a_delta() {
        assert!(MAX_COIN_AMOUNT <= i64::MAX as u64);
    }
}
