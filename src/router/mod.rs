//! Request Router (spec section 4.6): three mechanical responsibilities —
//! user context extraction, per-request vendor client substitution, and
//! correlation id propagation — plus the REST surface that terminates
//! them. Deep business logic (portfolio compliance, the MCP tool catalog)
//! stays out of scope; only the plumbing around it lives here.

pub mod context;
pub mod http;

pub use context::{vendor_client_for, UserContext};
pub use http::build_router;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{Config, VendorConfig};
use crate::freshness::FreshnessConfig;
use crate::store::Store;
use crate::vendor::{FilingSummarizer, MarketDataVendor};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub freshness: Arc<FreshnessConfig>,
    pub default_vendor: Arc<dyn MarketDataVendor>,
    pub default_summarizer: Arc<dyn FilingSummarizer>,
    pub market_vendor_config: VendorConfig,
    pub service_registration_key: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        freshness: Arc<FreshnessConfig>,
        default_vendor: Arc<dyn MarketDataVendor>,
        default_summarizer: Arc<dyn FilingSummarizer>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            freshness,
            default_vendor,
            default_summarizer,
            market_vendor_config: config.market_vendor.clone(),
            service_registration_key: config.service_registration_key.clone(),
            started_at: Utc::now(),
        }
    }
}
