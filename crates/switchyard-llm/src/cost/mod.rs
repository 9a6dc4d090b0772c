//! Cost Tracking - pricing, cost records and usage reporting
//!
//! # Module Structure
//!
//! - `pricing`: Model pricing table and defaults
//! - `record`: Cost records and aggregated statistics
//! - `tracker`: In-memory [`CostTracker`] sink

mod pricing;
mod record;
mod tracker;


pub use pricing::{default_pricing, ModelPricing, PricingTable};
pub use record::{CostRecord, ProviderEfficiency, ProviderUsage, UsageStats};
pub use tracker::CostTracker;
