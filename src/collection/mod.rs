//! Collection Pipeline (spec section 4.5): domain glue between the
//! Freshness Catalog, upstream vendors and the store. Functions take the
//! vendor/summarizer as borrowed trait objects rather than storing one on
//! a struct, so the router's per-request client substitution (spec
//! section 4.6) is just "pass a different reference in" with no extra
//! plumbing.

pub mod aggregates;
pub mod signals;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::error::VireResult;
use crate::freshness::FreshnessConfig;
use crate::models::{
    EodBar, Filing, MarketData, NewsItem, SliceKind, StockIndexEntry, Subject,
};
use crate::store::Store;
use crate::vendor::{FilingSummarizer, MarketDataVendor};

use aggregates::{compute_portfolio_aggregate, Holding, PortfolioAggregate, PortfolioInput};

/// One pending or just-enqueued piece of slow work, surfaced to callers of
/// `get_stock_data` so they know what is not yet reflected in the
/// returned snapshot (spec section 4.5.1).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Advisory {
    pub slice: SliceKind,
    pub note: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StockSnapshot {
    pub ticker: String,
    pub market_data: MarketData,
    pub advisories: Vec<Advisory>,
}

const CORE_SLICES: [SliceKind; 3] = [SliceKind::Eod, SliceKind::Fundamentals, SliceKind::FilingsIndex];
const SLOW_SLICES: [SliceKind; 4] = [
    SliceKind::FilingsPdfs,
    SliceKind::FilingSummaries,
    SliceKind::News,
    SliceKind::Signals,
];

/// Enqueue the job for `slice` against `ticker`, ignoring the case where
/// one is already pending (spec section 4.3 uniqueness).
async fn enqueue_slow(store: &Store, ticker: &str, slice: SliceKind, correlation_id: Option<&str>) -> VireResult<()> {
    let Some(job_type) = slice.job_type() else {
        return Ok(());
    };
    let job = crate::models::Job::new_pending(
        job_type,
        ticker,
        crate::models::default_priority::USER_REQUESTED,
        correlation_id.map(|s| s.to_string()),
    );
    store.jobs.enqueue(&job).await
}

/// `get_stock_data(ticker, force?) -> snapshot` (spec section 4.5.1).
///
/// A brand-new ticker (no stock-index entry) gets an entry, has its core
/// collection kicked off in the background (folded directly into
/// `collect_core`, not routed through the persisted job queue — core
/// slices have no dedicated job type, spec section 4.5.3), and every slice
/// is reported as an advisory. `force` additionally runs core collection
/// inline so the caller observes the freshly-fetched core slices before
/// the call returns (spec section 8, "core/slow split").
pub async fn get_stock_data(
    store: Arc<Store>,
    freshness: Arc<FreshnessConfig>,
    vendor: Arc<dyn MarketDataVendor>,
    ticker: &str,
    force: bool,
    correlation_id: Option<&str>,
) -> VireResult<StockSnapshot> {
    let ticker = ticker.to_uppercase();
    let now = Utc::now();

    let (entry, is_new) = match store.stock_index.get(&ticker).await {
        Ok(entry) => (entry, false),
        Err(e) if e.is_not_found() => {
            let entry = StockIndexEntry::new(&ticker, &ticker, "UNKNOWN", "pending");
            store.stock_index.upsert(&entry).await?;
            (entry, true)
        }
        Err(e) => return Err(e),
    };

    let stale_core: Vec<SliceKind> = CORE_SLICES
        .into_iter()
        .filter(|k| force || !freshness.is_fresh(*k, entry.timestamp_for(*k), now))
        .collect();

    let mut advisories = Vec::new();

    let market_data = if !stale_core.is_empty() && (force || !is_new) {
        collect_core(&store, vendor.as_ref(), &ticker, &stale_core, force).await?
    } else if !stale_core.is_empty() {
        for slice in &stale_core {
            advisories.push(Advisory { slice: *slice, note: "core collection running in background".to_string() });
        }
        let bg_store = store.clone();
        let bg_vendor = vendor.clone();
        let bg_ticker = ticker.clone();
        tokio::spawn(async move {
            if let Err(e) = collect_core(&bg_store, bg_vendor.as_ref(), &bg_ticker, &CORE_SLICES, true).await {
                warn!(ticker = %bg_ticker, error = %e, "background core collection failed");
            }
        });
        MarketData::empty(&ticker)
    } else {
        store.market_data.get(&ticker).await.unwrap_or_else(|_| MarketData::empty(&ticker))
    };

    for slice in SLOW_SLICES {
        let fresh = freshness.is_fresh(slice, entry.timestamp_for(slice), now);
        if force || is_new || !fresh {
            enqueue_slow(&store, &ticker, slice, correlation_id).await?;
            advisories.push(Advisory { slice, note: "collection job enqueued".to_string() });
        }
    }

    Ok(StockSnapshot { ticker, market_data, advisories })
}

/// Union existing and freshly-fetched bars keyed by date, newest-first
/// (spec section 4.5.1). A bulk single-day fetch and a full-history fetch
/// merge identically here: both only ever add or overwrite bars for the
/// dates they cover, never drop a date they didn't fetch.
fn merge_eod(existing: Vec<EodBar>, fetched: Vec<EodBar>, _is_bulk_single_day: bool) -> Vec<EodBar> {
    let mut by_date: HashMap<chrono::NaiveDate, EodBar> = existing.into_iter().map(|b| (b.date, b)).collect();
    for bar in fetched {
        by_date.insert(bar.date, bar);
    }
    let mut bars: Vec<EodBar> = by_date.into_values().collect();
    bars.sort_by(|a, b| b.date.cmp(&a.date));
    bars
}

fn merge_filings(existing: Vec<Filing>, fetched: Vec<Filing>) -> Vec<Filing> {
    let mut by_key: HashMap<String, Filing> = existing.into_iter().map(|f| (f.document_key.clone(), f)).collect();
    let mut merged = Vec::with_capacity(fetched.len());
    for mut incoming in fetched {
        if let Some(current) = by_key.remove(&incoming.document_key) {
            incoming.pdf_path = current.pdf_path;
            incoming.file_size = current.file_size;
            incoming.summary = current.summary;
        }
        merged.push(incoming);
    }
    merged
}

/// `collect_core(ticker, include, force)` (spec section 4.5.1). Fetches and
/// merges only the slices named in `include`.
pub async fn collect_core(
    store: &Store,
    vendor: &dyn MarketDataVendor,
    ticker: &str,
    include: &[SliceKind],
    _force: bool,
) -> VireResult<MarketData> {
    let mut current = store.market_data.get(ticker).await.unwrap_or_else(|_| MarketData::empty(ticker));

    for &slice in include {
        match slice {
            SliceKind::Eod => {
                let fetch = vendor.fetch_eod(ticker, None).await?;
                current.eod_bars = merge_eod(std::mem::take(&mut current.eod_bars), fetch.bars, fetch.is_bulk_single_day);
                store.stock_index.update_timestamp(ticker, SliceKind::Eod, Utc::now()).await?;
            }
            SliceKind::Fundamentals => {
                current.fundamentals = Some(vendor.fetch_fundamentals(ticker).await?);
                store.stock_index.update_timestamp(ticker, SliceKind::Fundamentals, Utc::now()).await?;
            }
            SliceKind::FilingsIndex => {
                let fetched = vendor.fetch_filings_index(ticker).await?;
                current.filings = merge_filings(std::mem::take(&mut current.filings), fetched);
                store.stock_index.update_timestamp(ticker, SliceKind::FilingsIndex, Utc::now()).await?;
            }
            other => {
                warn!(ticker, slice = ?other, "collect_core called with a non-core slice; ignoring");
            }
        }
    }

    store.market_data.save(&current).await?;
    Ok(current)
}

/// `collect_filing_pdfs(ticker, force)` (spec section 4.5.1). Streams each
/// PDF straight to the File Store; never buffers a whole document on the
/// heap.
pub async fn collect_filing_pdfs(store: &Store, vendor: &dyn MarketDataVendor, ticker: &str, force: bool) -> VireResult<()> {
    let initial = store.market_data.get(ticker).await?;
    let mut filings = initial.filings.clone();

    for filing in filings.iter_mut() {
        if filing.pdf_path.is_some() && !force {
            continue;
        }
        match vendor.fetch_filing_pdf(filing).await {
            Ok((reader, content_type)) => {
                let key = format!("{ticker}/{}", filing.document_key);
                match store.files.save_streamed("filing_pdf", &key, &content_type, reader).await {
                    Ok(byte_len) => {
                        filing.pdf_path = Some(key);
                        filing.file_size = Some(byte_len);
                    }
                    Err(e) => warn!(ticker, document_key = %filing.document_key, error = %e, "filing pdf save failed"),
                }
            }
            Err(e) => warn!(ticker, document_key = %filing.document_key, error = %e, "filing pdf fetch failed"),
        }
    }

    let latest = store.market_data.get(ticker).await.unwrap_or_else(|_| initial.clone());
    let merged = MarketData { filings, ..latest };
    store.market_data.save(&merged).await?;
    store.stock_index.update_timestamp(ticker, SliceKind::FilingsPdfs, Utc::now()).await?;
    Ok(())
}

const SUMMARY_BATCH_SIZE: usize = 5;

/// `collect_filing_summaries(ticker)` (spec section 4.5.1). Flushes every
/// `SUMMARY_BATCH_SIZE` filings processed, re-reading the current document
/// first so a crash mid-run never drops slices this executor doesn't own
/// (spec section 8 "partial-write isolation").
pub async fn collect_filing_summaries(
    store: &Store,
    summarizer: &dyn FilingSummarizer,
    freshness: &FreshnessConfig,
    ticker: &str,
) -> VireResult<()> {
    let initial = store.market_data.get(ticker).await?;
    let mut filings = initial.filings.clone();
    let now = Utc::now();
    let mut dirty_since_flush = 0usize;

    async fn flush(store: &Store, ticker: &str, filings: &[Filing], fallback: &MarketData) -> VireResult<()> {
        let latest = store.market_data.get(ticker).await.unwrap_or_else(|_| fallback.clone());
        let merged = MarketData { filings: filings.to_vec(), ..latest };
        store.market_data.save(&merged).await
    }

    for index in 0..filings.len() {
        let Some(pdf_path) = filings[index].pdf_path.clone() else { continue };
        let already_fresh = filings[index]
            .summary
            .as_ref()
            .map(|s| freshness.is_filing_summary_fresh(s.generated_at, now, true))
            .unwrap_or(false);
        if already_fresh {
            continue;
        }

        match summarizer.summarize(&pdf_path).await {
            Ok(summary) => filings[index].summary = Some(summary),
            Err(e) => {
                warn!(ticker, document_key = %filings[index].document_key, error = %e, "filing summary fetch failed");
                continue;
            }
        }

        dirty_since_flush += 1;
        if dirty_since_flush >= SUMMARY_BATCH_SIZE {
            flush(store, ticker, &filings, &initial).await?;
            dirty_since_flush = 0;
        }
    }

    if dirty_since_flush > 0 {
        flush(store, ticker, &filings, &initial).await?;
    }

    store.stock_index.update_timestamp(ticker, SliceKind::FilingSummaries, Utc::now()).await?;
    Ok(())
}

fn merge_news(existing: Vec<NewsItem>, fetched: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut by_url: HashMap<String, NewsItem> = existing.into_iter().map(|n| (n.url.clone(), n)).collect();
    for item in fetched {
        by_url.insert(item.url.clone(), item);
    }
    let mut items: Vec<NewsItem> = by_url.into_values().collect();
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items
}

/// `collect_news(ticker)` (spec section 4.5.1, slow slice). Matches
/// existing items by URL so a re-fetch never duplicates a headline.
pub async fn collect_news(store: &Store, vendor: &dyn MarketDataVendor, ticker: &str) -> VireResult<()> {
    let fetched = vendor.fetch_news(ticker).await?;
    let latest = store.market_data.get(ticker).await.unwrap_or_else(|_| MarketData::empty(ticker));
    let news = merge_news(latest.news.clone(), fetched);
    let merged = MarketData { news, ..latest };
    store.market_data.save(&merged).await?;
    store.stock_index.update_timestamp(ticker, SliceKind::News, Utc::now()).await?;
    Ok(())
}

/// `compute_signals(ticker)` (spec section 4.5.1, slow slice): recomputes
/// technical signals from whatever EOD history is already stored, without
/// touching the vendor.
pub async fn compute_signals_for_ticker(store: &Store, ticker: &str) -> VireResult<()> {
    let data = store.market_data.get(ticker).await?;
    let mut bars = data.eod_bars.clone();
    bars.sort_by(|a, b| a.date.cmp(&b.date));
    let computed = signals::compute_signals(ticker, &bars);
    store.signals.save(&computed).await?;
    store.stock_index.update_timestamp(ticker, SliceKind::Signals, Utc::now()).await?;
    Ok(())
}

/// `collect_bulk_eod(exchange, force)` (spec section 4.5.1). One vendor
/// call covers every ticker on the exchange; tickers with no prior record
/// fall back to a full-history fetch. Signals are recomputed for any
/// ticker whose EOD history grew.
pub async fn collect_bulk_eod(
    store: &Store,
    vendor: &dyn MarketDataVendor,
    exchange: &str,
    _force: bool,
) -> VireResult<()> {
    let entries = store.stock_index.list_by_exchange(exchange).await?;
    let tickers: Vec<String> = entries.iter().map(|e| e.ticker.clone()).collect();

    let bulk = vendor.fetch_bulk_eod_single_day(exchange, &tickers).await?;
    let mut bulk_by_ticker: HashMap<String, EodBar> = bulk.into_iter().collect();

    for ticker in &tickers {
        let existing = store.market_data.get(ticker).await;
        let had_record = existing.is_ok();

        let (current, grew) = match existing {
            Ok(mut current) => {
                let before = current.eod_bars.len();
                if let Some(bar) = bulk_by_ticker.remove(ticker) {
                    current.eod_bars = merge_eod(std::mem::take(&mut current.eod_bars), vec![bar], true);
                }
                let after = current.eod_bars.len();
                (current, after > before)
            }
            Err(_) => {
                let fetch = vendor.fetch_eod(ticker, None).await?;
                let mut fresh = MarketData::empty(ticker);
                let grew = !fetch.bars.is_empty();
                fresh.eod_bars = fetch.bars;
                (fresh, grew)
            }
        };

        store.market_data.save(&current).await?;
        store.stock_index.update_timestamp(ticker, SliceKind::Eod, Utc::now()).await?;

        if grew || !had_record {
            let signals = signals::compute_signals(ticker, &{
                let mut ordered = current.eod_bars.clone();
                ordered.sort_by(|a, b| a.date.cmp(&b.date));
                ordered
            });
            store.signals.save(&signals).await?;
            store.stock_index.update_timestamp(ticker, SliceKind::Signals, Utc::now()).await?;
        }
    }

    Ok(())
}

/// The narrow slice of a stored portfolio document the core must
/// reproduce bit-exactly (spec section 4.5.2). Everything else about the
/// document — strategy evaluation, screening filters — is opaque business
/// logic outside this core.
#[derive(Debug, Clone, serde::Deserialize)]
struct StoredHolding {
    ticker: String,
    native_currency: String,
    buys: Vec<aggregates::Lot>,
    sells: Vec<aggregates::Lot>,
    realized_return: f64,
    /// Native-currency-to-display-currency rate in effect when the
    /// position was opened; needed to isolate the FX component of
    /// `net_return` from the capital component (spec section 4.5.2).
    #[serde(default = "one")]
    purchase_fx: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, serde::Deserialize)]
struct StoredPortfolio {
    holdings: Vec<StoredHolding>,
    cash_transactions: Vec<aggregates::CashTransaction>,
    display_currency: String,
}

fn fx_kv_key(native: &str, display: &str) -> String {
    format!("fx:{native}:{display}")
}

/// `get_portfolio(user, name) -> portfolio` (spec section 4.5.1): joins the
/// per-user portfolio record with market-namespace prices, applies a
/// cached FX rate, and computes the derived aggregates from section 4.5.2.
pub async fn get_portfolio(store: &Store, user_id: Uuid, name: &str) -> VireResult<PortfolioAggregate> {
    let (internal, user_data, _oauth) = store.require_user_stores()?;

    let record = user_data.get(user_id, Subject::Portfolio, name).await?;
    let stored: StoredPortfolio = serde_json::from_str(&record.value)?;

    let mut holdings = Vec::with_capacity(stored.holdings.len());
    for h in stored.holdings {
        let current_price = store
            .market_data
            .get(&h.ticker)
            .await
            .ok()
            .and_then(|md| md.eod_bars.iter().max_by_key(|b| b.date).map(|b| b.close))
            .unwrap_or(0.0);

        let fx_rate = if h.native_currency == stored.display_currency {
            1.0
        } else {
            internal
                .get_system_kv(&fx_kv_key(&h.native_currency, &stored.display_currency))
                .await
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0)
        };

        let bought: f64 = h.buys.iter().map(|l| l.units).sum();
        let sold: f64 = h.sells.iter().map(|l| l.units).sum();
        let units_remaining = bought - sold;
        let invested: f64 = h.buys.iter().map(|l| l.units * l.price).sum();
        let avg_cost = if bought == 0.0 { 0.0 } else { invested / bought };

        // Unrealized gain in native currency plus whatever was already
        // realized on closed lots (spec section 4.5.2's FX gain contract
        // composes this with the separate FX component).
        let unrealized_native = (current_price - avg_cost) * units_remaining;
        let capital_gain_in_native = unrealized_native + h.realized_return;

        holdings.push(Holding {
            ticker: h.ticker,
            native_currency: h.native_currency,
            buys: h.buys,
            sells: h.sells,
            realized_return: h.realized_return,
            current_price,
            current_fx: fx_rate,
            purchase_fx: h.purchase_fx,
            capital_gain_in_native,
        });
    }

    let input = PortfolioInput {
        holdings,
        cash_transactions: stored.cash_transactions,
        display_currency: stored.display_currency,
    };
    Ok(compute_portfolio_aggregate(&input))
}

/// `review_portfolio(user, name) -> compliance` (spec section 4.5.1). The
/// core computes the same aggregates as `get_portfolio`; the per-holding
/// rule evaluation against the user's stored strategy document is an
/// external collaborator's responsibility (spec section 1) — this
/// function hands that collaborator the aggregates plus the opaque
/// strategy document, unevaluated.
pub async fn review_portfolio(store: &Store, user_id: Uuid, name: &str) -> VireResult<PortfolioReview> {
    let portfolio = get_portfolio(store, user_id, name).await?;

    let (_internal, user_data, _oauth) = store.require_user_stores()?;
    let strategy = match user_data.get(user_id, Subject::Strategy, "default").await {
        Ok(record) => Some(record.value),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };

    Ok(PortfolioReview { portfolio, strategy_document: strategy })
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PortfolioReview {
    pub portfolio: PortfolioAggregate,
    /// Opaque rules document; evaluating it against `portfolio` is out of
    /// scope for this core (spec section 1).
    pub strategy_document: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::freshness::FreshnessConfig;
    use crate::vendor::{FakeSummarizer, FakeVendor};
    use chrono::NaiveDate;

    async fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let market = StorageConfig {
            namespace: "market".to_string(),
            database_path: dir.path().join("market.db").to_string_lossy().into_owned(),
        };
        let store = Store::connect(&market, None).await.unwrap();
        (dir, store)
    }

    fn bar(day: u32, close: f64) -> EodBar {
        EodBar {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: None,
        }
    }

    #[tokio::test]
    async fn get_stock_data_on_unknown_ticker_enqueues_every_slow_slice() {
        let (_dir, store) = test_store().await;
        let store = Arc::new(store);
        let freshness = Arc::new(FreshnessConfig::default());
        let vendor: Arc<dyn MarketDataVendor> = Arc::new(
            FakeVendor::default().with_eod("AAPL", vec![bar(1, 100.0)]),
        );

        let snapshot = get_stock_data(store.clone(), freshness, vendor, "aapl", true, None)
            .await
            .unwrap();

        assert_eq!(snapshot.ticker, "AAPL");
        assert_eq!(snapshot.market_data.eod_bars.len(), 1);
        let slow_advisories: Vec<_> = snapshot
            .advisories
            .iter()
            .filter(|a| a.note == "collection job enqueued")
            .collect();
        assert_eq!(slow_advisories.len(), SLOW_SLICES.len());
        for slice in SLOW_SLICES {
            assert!(store.jobs.has_pending(slice.job_type().unwrap(), "AAPL").await.unwrap());
        }
    }

    #[tokio::test]
    async fn collect_core_merges_without_dropping_other_slices() {
        let (_dir, store) = test_store().await;
        let vendor = FakeVendor::default()
            .with_eod("AAPL", vec![bar(1, 100.0), bar(2, 101.0)])
            .with_fundamentals("AAPL", crate::models::Fundamentals { pe_ratio: Some(20.0), ..Default::default() });

        collect_core(&store, &vendor, "AAPL", &[SliceKind::Eod], true).await.unwrap();
        collect_core(&store, &vendor, "AAPL", &[SliceKind::Fundamentals], true).await.unwrap();

        let saved = store.market_data.get("AAPL").await.unwrap();
        assert_eq!(saved.eod_bars.len(), 2);
        assert_eq!(saved.fundamentals.unwrap().pe_ratio, Some(20.0));
    }

    #[tokio::test]
    async fn collect_filing_pdfs_only_touches_filings_field() {
        let (_dir, store) = test_store().await;
        let filing = Filing {
            document_key: "10-K-2026".to_string(),
            form_type: "10-K".to_string(),
            filed_at: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            source_url: "https://example.com/10k".to_string(),
            pdf_path: None,
            file_size: None,
            summary: None,
        };
        let initial = MarketData {
            ticker: "AAPL".to_string(),
            eod_bars: vec![bar(1, 100.0)],
            filings: vec![filing],
            ..MarketData::empty("AAPL")
        };
        store.market_data.save(&initial).await.unwrap();

        let vendor = FakeVendor::default().with_pdf("10-K-2026", b"%PDF-1.4 test".to_vec());
        std::env::set_var("FILE_STORAGE_DIR", "data/test-files");
        collect_filing_pdfs(&store, &vendor, "AAPL", false).await.unwrap();

        let after = store.market_data.get("AAPL").await.unwrap();
        assert_eq!(after.eod_bars.len(), 1, "untouched slice must survive the read-modify-write");
        assert!(after.filings[0].pdf_path.is_some());
    }

    #[tokio::test]
    async fn collect_filing_summaries_skips_filings_without_a_pdf() {
        let (_dir, store) = test_store().await;
        let filing = Filing {
            document_key: "10-K-2026".to_string(),
            form_type: "10-K".to_string(),
            filed_at: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            source_url: "https://example.com/10k".to_string(),
            pdf_path: None,
            file_size: None,
            summary: None,
        };
        store
            .market_data
            .save(&MarketData { filings: vec![filing], ..MarketData::empty("AAPL") })
            .await
            .unwrap();

        let summarizer = FakeSummarizer;
        let freshness = FreshnessConfig::default();
        collect_filing_summaries(&store, &summarizer, &freshness, "AAPL").await.unwrap();

        let after = store.market_data.get("AAPL").await.unwrap();
        assert!(after.filings[0].summary.is_none());
    }

    #[test]
    fn true_breakeven_matches_filing_scenario() {
        let holding = aggregates::Holding {
            ticker: "X".to_string(),
            native_currency: "USD".to_string(),
            buys: vec![
                aggregates::Lot { date: NaiveDate::from_ymd_opt(2025, 12, 24).unwrap(), units: 4925.0, price: 4.0248 },
                aggregates::Lot { date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(), units: 2511.0, price: 3.980 },
                aggregates::Lot { date: NaiveDate::from_ymd_opt(2026, 2, 13).unwrap(), units: 2456.0, price: 4.070 },
            ],
            sells: vec![
                aggregates::Lot { date: NaiveDate::from_ymd_opt(2026, 1, 22).unwrap(), units: 1333.0, price: 3.7627 },
                aggregates::Lot { date: NaiveDate::from_ymd_opt(2026, 1, 27).unwrap(), units: 819.0, price: 3.680 },
                aggregates::Lot { date: NaiveDate::from_ymd_opt(2026, 1, 29).unwrap(), units: 2773.0, price: 3.4508 },
            ],
            realized_return: -2235.47,
            current_price: 0.0,
            current_fx: 1.0,
            purchase_fx: 1.0,
            capital_gain_in_native: 0.0,
        };
        let price = aggregates::true_breakeven_price(&holding).unwrap();
        assert!((price - 4.47).abs() < 0.01, "expected ~4.47, got {price}");
    }
}
