//! Freshness Catalog (spec section 4.1): a pure, stateless evaluator with a
//! single operation, `is_fresh`. No I/O, no suspension points — every
//! caller that needs to decide "serve cache" vs "fetch/enqueue" goes
//! through here so a TTL change propagates uniformly (spec section 9).

use chrono::{DateTime, Timelike, Utc};

use crate::models::{is_zero_instant, SliceKind};

/// Tunable TTLs, one instance shared process-wide via `Arc` so every caller
/// observes the same values (spec section 4.1 table).
#[derive(Debug, Clone)]
pub struct FreshnessConfig {
    pub eod_trading_hours_secs: i64,
    pub eod_after_hours_secs: i64,
    pub fundamentals_secs: i64,
    pub filings_index_secs: i64,
    pub news_secs: i64,
    pub company_timeline_secs: i64,
    pub earnings_calendar_secs: i64,
    /// Filing summaries TTL; the caller must additionally check the
    /// filing's PDF is present (spec section 4.1 table footnote).
    pub filing_summaries_secs: i64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            eod_trading_hours_secs: 6 * 3600,
            eod_after_hours_secs: 24 * 3600,
            fundamentals_secs: 7 * 24 * 3600,
            filings_index_secs: 4 * 3600,
            news_secs: 6 * 3600,
            company_timeline_secs: 30 * 24 * 3600,
            earnings_calendar_secs: 24 * 3600,
            filing_summaries_secs: 90 * 24 * 3600,
        }
    }
}

impl FreshnessConfig {
    fn ttl_secs(&self, kind: SliceKind, now: DateTime<Utc>) -> Option<i64> {
        match kind {
            SliceKind::Eod | SliceKind::Signals => Some(if is_trading_hours(now) {
                self.eod_trading_hours_secs
            } else {
                self.eod_after_hours_secs
            }),
            SliceKind::Fundamentals => Some(self.fundamentals_secs),
            SliceKind::FilingsIndex => Some(self.filings_index_secs),
            // Indefinite once present; re-download only on explicit force.
            SliceKind::FilingsPdfs => None,
            SliceKind::FilingSummaries => Some(self.filing_summaries_secs),
            SliceKind::News => Some(self.news_secs),
            SliceKind::CompanyTimeline => Some(self.company_timeline_secs),
            SliceKind::EarningsCalendar => Some(self.earnings_calendar_secs),
        }
    }

    /// `is_fresh(slice_kind, last_updated, now) -> bool` (spec section 4.1).
    ///
    /// Edge cases: `last_updated` zero means never collected, so never
    /// fresh. `last_updated > now` (clock skew) is treated as fresh to
    /// avoid thrash. The boundary `last_updated == now - ttl` is stale
    /// (strict `<`, spec section 8).
    pub fn is_fresh(&self, kind: SliceKind, last_updated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if is_zero_instant(last_updated) {
            return false;
        }
        if last_updated > now {
            return true;
        }

        match kind {
            SliceKind::FilingsPdfs => true,
            _ => {
                let ttl = self
                    .ttl_secs(kind, now)
                    .expect("non-filings_pdfs kinds always carry a TTL");
                let age = now.signed_duration_since(last_updated).num_seconds();
                age < ttl
            }
        }
    }

    /// Variant of [`is_fresh`] for `filing_summaries`, which additionally
    /// requires the filing's PDF to be present (spec section 4.1 table).
    pub fn is_filing_summary_fresh(
        &self,
        last_updated: DateTime<Utc>,
        now: DateTime<Utc>,
        pdf_present: bool,
    ) -> bool {
        pdf_present && self.is_fresh(SliceKind::FilingSummaries, last_updated, now)
    }
}

/// US equity market hours, naive UTC approximation (9:30-16:00 Eastern is
/// out of scope for full timezone/holiday handling here; the collection
/// pipeline's vendor already reports trading-day status where it matters).
fn is_trading_hours(now: DateTime<Utc>) -> bool {
    let hour = now.hour();
    (13..21).contains(&hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::zero_instant;
    use chrono::Duration;

    #[test]
    fn zero_last_updated_is_never_fresh() {
        let cfg = FreshnessConfig::default();
        let now = Utc::now();
        assert!(!cfg.is_fresh(SliceKind::Eod, zero_instant(), now));
    }

    #[test]
    fn future_timestamp_is_fresh() {
        let cfg = FreshnessConfig::default();
        let now = Utc::now();
        assert!(cfg.is_fresh(SliceKind::Fundamentals, now + Duration::hours(1), now));
    }

    #[test]
    fn boundary_is_strictly_stale() {
        let cfg = FreshnessConfig::default();
        let now = Utc::now();
        let last_updated = now - Duration::seconds(cfg.fundamentals_secs);
        assert!(!cfg.is_fresh(SliceKind::Fundamentals, last_updated, now));
    }

    #[test]
    fn just_inside_ttl_is_fresh() {
        let cfg = FreshnessConfig::default();
        let now = Utc::now();
        let last_updated = now - Duration::seconds(cfg.fundamentals_secs - 1);
        assert!(cfg.is_fresh(SliceKind::Fundamentals, last_updated, now));
    }

    #[test]
    fn filings_pdfs_are_indefinite_once_present() {
        let cfg = FreshnessConfig::default();
        let now = Utc::now();
        let long_ago = now - Duration::days(3650);
        assert!(cfg.is_fresh(SliceKind::FilingsPdfs, long_ago, now));
    }

    #[test]
    fn filing_summary_requires_pdf_present() {
        let cfg = FreshnessConfig::default();
        let now = Utc::now();
        assert!(!cfg.is_filing_summary_fresh(now, now, false));
        assert!(cfg.is_filing_summary_fresh(now, now, true));
    }
}
