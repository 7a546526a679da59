//! Market Data Types
//!
//! The canonical tick produced from any inbound feed event, and the table
//! holding the most recent price per instrument.
//!
//! # Concurrency
//!
//! Ticks may be recorded from a thread owned by the external client, while
//! the health endpoint reads snapshots. Every write replaces the previous
//! value for the instrument (last writer wins); no history is retained.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

// =============================================================================
// Canonical Tick
// =============================================================================

/// One normalized price update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalTick {
    /// Venue-specific instrument identifier.
    pub instrument_id: String,
    /// Last traded price.
    pub price: f64,
    /// When the tick was normalized.
    pub observed_at: DateTime<Utc>,
}

impl CanonicalTick {
    /// Create a tick observed now.
    #[must_use]
    pub fn new(instrument_id: impl Into<String>, price: f64) -> Self {
        Self::observed(instrument_id, price, Utc::now())
    }

    /// Create a tick with an explicit observation time.
    #[must_use]
    pub fn observed(instrument_id: impl Into<String>, price: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            price,
            observed_at,
        }
    }
}

// =============================================================================
// Latest Price Table
// =============================================================================

/// Most recent price for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceObservation {
    /// Last traded price.
    pub price: f64,
    /// When it was observed.
    pub observed_at: DateTime<Utc>,
}

/// Latest price per instrument, overwritten on every tick.
#[derive(Debug, Default)]
pub struct LatestPriceTable {
    prices: RwLock<HashMap<String, PriceObservation>>,
}

/// Shared handle to the latest price table.
pub type SharedPriceTable = Arc<LatestPriceTable>;

impl LatestPriceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tick, replacing any previous value for its instrument.
    pub fn record(&self, tick: &CanonicalTick) {
        self.prices.write().insert(
            tick.instrument_id.clone(),
            PriceObservation {
                price: tick.price,
                observed_at: tick.observed_at,
            },
        );
    }

    /// Latest observation for an instrument.
    #[must_use]
    pub fn get(&self, instrument_id: &str) -> Option<PriceObservation> {
        self.prices.read().get(instrument_id).copied()
    }

    /// Latest price for an instrument.
    #[must_use]
    pub fn price(&self, instrument_id: &str) -> Option<f64> {
        self.get(instrument_id).map(|obs| obs.price)
    }

    /// Ordered copy of the whole table.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, PriceObservation> {
        self.prices
            .read()
            .iter()
            .map(|(id, obs)| (id.clone(), *obs))
            .collect()
    }

    /// Number of instruments with a recorded price.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether no price has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
