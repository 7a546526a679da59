//! Message Normalizer
//!
//! Turns an inbound event of unknown shape into a `CanonicalTick`.
//!
//! # Extraction rules
//!
//! - Text and bytes are decoded as JSON when possible
//! - Mappings: the first *present* value under each alias list wins, where
//!   null, `false`, `0`, empty strings and empty containers count as absent
//! - When the instrument id is absent, one level of `data`, `payload`,
//!   `tick` or `update` is searched with the same lists
//! - Objects: attribute lookup with the same lists
//! - Instrument ids accept strings and numbers; prices accept numbers and
//!   numeric strings, and must be finite
//!
//! Events that fail any rule are dropped with a debug log. Nothing raised
//! here ever reaches the client's callback path.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::application::ports::{AttributeSource, EventCallback, InboundEvent, RelayMetrics};
use crate::domain::market::{CanonicalTick, SharedPriceTable};

/// Keys holding the instrument id.
pub const INSTRUMENT_KEYS: [&str; 4] = ["securityId", "symbol", "security_id", "s"];

/// Keys holding the last traded price.
pub const PRICE_KEYS: [&str; 4] = ["lastTradedPrice", "ltp", "last_price", "last"];

/// Keys of nested payloads searched when the id is absent.
pub const NESTED_KEYS: [&str; 4] = ["data", "payload", "tick", "update"];

/// Why an event did not produce a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedTick {
    /// Neither a mapping nor an object with attributes.
    #[error("event is not structured")]
    Unstructured,

    /// No instrument id under any alias.
    #[error("no instrument id")]
    MissingInstrument,

    /// No usable price under any alias.
    #[error("no usable price")]
    MissingPrice,
}

impl MalformedTick {
    /// Metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unstructured => "unstructured",
            Self::MissingInstrument => "missing_instrument",
            Self::MissingPrice => "missing_price",
        }
    }
}

// =============================================================================
// Extraction
// =============================================================================

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn first_present<'a>(
    keys: &[&str],
    lookup: impl Fn(&str) -> Option<&'a Value>,
) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| lookup(key))
        .find(|value| is_present(value))
}

fn coerce_instrument(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    price.is_finite().then_some(price)
}

fn build(instrument: Option<&Value>, price: Option<&Value>) -> Result<CanonicalTick, MalformedTick> {
    let instrument_id = instrument
        .and_then(coerce_instrument)
        .ok_or(MalformedTick::MissingInstrument)?;
    let price = price.and_then(coerce_price).ok_or(MalformedTick::MissingPrice)?;
    Ok(CanonicalTick::new(instrument_id, price))
}

fn from_mapping(map: &Map<String, Value>) -> Result<CanonicalTick, MalformedTick> {
    let mut instrument = first_present(&INSTRUMENT_KEYS, |k| map.get(k));
    let mut price = first_present(&PRICE_KEYS, |k| map.get(k));

    if instrument.is_none() {
        for key in NESTED_KEYS {
            let Some(Value::Object(nested)) = map.get(key) else {
                continue;
            };
            instrument = first_present(&INSTRUMENT_KEYS, |k| nested.get(k));
            if price.is_none() {
                price = first_present(&PRICE_KEYS, |k| nested.get(k));
            }
            if instrument.is_some() {
                break;
            }
        }
    }

    build(instrument, price)
}

fn from_object(source: &dyn AttributeSource) -> Result<CanonicalTick, MalformedTick> {
    let lookup = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| source.attribute(key))
            .find(is_present)
    };
    let instrument = lookup(INSTRUMENT_KEYS.as_slice());
    let price = lookup(PRICE_KEYS.as_slice());
    build(instrument.as_ref(), price.as_ref())
}

fn from_value(value: &Value) -> Result<CanonicalTick, MalformedTick> {
    match value {
        Value::Object(map) => from_mapping(map),
        _ => Err(MalformedTick::Unstructured),
    }
}

/// Normalize one inbound event.
///
/// # Errors
///
/// Returns the reason the event carries no usable tick.
pub fn normalize(event: &InboundEvent) -> Result<CanonicalTick, MalformedTick> {
    match event {
        InboundEvent::Structured(value) => from_value(value),
        InboundEvent::Text(text) => serde_json::from_str::<Value>(text)
            .map_err(|_| MalformedTick::Unstructured)
            .and_then(|value| from_value(&value)),
        InboundEvent::Bytes(bytes) => serde_json::from_slice::<Value>(bytes)
            .map_err(|_| MalformedTick::Unstructured)
            .and_then(|value| from_value(&value)),
        InboundEvent::Object(source) => from_object(source.as_ref()),
    }
}

// =============================================================================
// Callback Adapter
// =============================================================================

/// Callback target: records prices and queues ticks for dispatch.
#[derive(Clone)]
pub struct MessageNormalizer {
    prices: SharedPriceTable,
    ticks: mpsc::Sender<CanonicalTick>,
    metrics: Arc<dyn RelayMetrics>,
}

impl MessageNormalizer {
    /// Create a normalizer feeding `prices` and the tick queue.
    #[must_use]
    pub const fn new(
        prices: SharedPriceTable,
        ticks: mpsc::Sender<CanonicalTick>,
        metrics: Arc<dyn RelayMetrics>,
    ) -> Self {
        Self {
            prices,
            ticks,
            metrics,
        }
    }

    /// Process one event.
    ///
    /// Returns the tick when one was produced. Never blocks.
    pub fn handle(&self, event: InboundEvent) -> Option<CanonicalTick> {
        match normalize(&event) {
            Ok(tick) => {
                self.prices.record(&tick);
                self.metrics.tick_accepted();
                tracing::info!(
                    instrument_id = %tick.instrument_id,
                    price = tick.price,
                    "Real-time tick"
                );
                match self.ticks.try_send(tick.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(dropped)) => {
                        self.metrics.queue_overflow();
                        tracing::warn!(
                            instrument_id = %dropped.instrument_id,
                            "Tick queue full, dropping tick"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!("Tick queue closed");
                    }
                }
                Some(tick)
            }
            Err(reason) => {
                self.metrics.tick_dropped(reason.as_str());
                tracing::debug!(reason = reason.as_str(), event = ?event, "Ignored event");
                None
            }
        }
    }

    /// Callback handed to the client's run method.
    ///
    /// Panics inside normalization are caught and logged.
    #[must_use]
    pub fn callback(&self) -> EventCallback {
        let normalizer = self.clone();
        Arc::new(move |event| {
            if catch_unwind(AssertUnwindSafe(|| normalizer.handle(event))).is_err() {
                normalizer.metrics.tick_dropped("panic");
                tracing::error!("Event handler panicked; event dropped");
            }
        })
    }
}

impl fmt::Debug for MessageNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageNormalizer")
            .field("tracked_instruments", &self.prices.len())
            .field("queue_capacity", &self.ticks.max_capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::application::ports::MockRelayMetrics;
    use crate::domain::market::LatestPriceTable;

    fn structured(value: Value) -> InboundEvent {
        InboundEvent::Structured(value)
    }

    #[test_case(json!({"securityId": "1333", "lastTradedPrice": 1642.55}) ; "canonical keys")]
    #[test_case(json!({"symbol": "1333", "ltp": "1642.55"}) ; "short keys with string price")]
    #[test_case(json!({"security_id": 1333, "last_price": 1642.55}) ; "numeric id")]
    #[test_case(json!({"s": "1333", "last": " 1642.55 "}) ; "padded price")]
    #[test_case(json!({"data": {"securityId": "1333", "ltp": 1642.55}}) ; "nested data")]
    #[test_case(json!({"update": {"symbol": "1333"}, "ltp": 1642.55}) ; "nested id outer price")]
    fn aliases_resolve(value: Value) {
        let tick = normalize(&structured(value)).unwrap();
        assert_eq!(tick.instrument_id, "1333");
        assert_eq!(tick.price, 1642.55);
    }

    #[test_case(json!({"ltp": 1.0}), MalformedTick::MissingInstrument ; "no id")]
    #[test_case(json!({"securityId": "1333"}), MalformedTick::MissingPrice ; "no price")]
    #[test_case(json!({"securityId": "1333", "ltp": "n/a"}), MalformedTick::MissingPrice ; "unparseable price")]
    #[test_case(json!({"securityId": "1333", "ltp": 0}), MalformedTick::MissingPrice ; "zero price is absent")]
    #[test_case(json!({"securityId": "", "ltp": 5.0}), MalformedTick::MissingInstrument ; "empty id is absent")]
    #[test_case(json!({"securityId": "1333", "ltp": "inf"}), MalformedTick::MissingPrice ; "infinite price")]
    #[test_case(json!([1, 2]), MalformedTick::Unstructured ; "array")]
    fn malformed_events_are_rejected(value: Value, expected: MalformedTick) {
        assert_eq!(normalize(&structured(value)), Err(expected));
    }

    #[test]
    fn falsy_alias_falls_through_to_next() {
        let tick = normalize(&structured(json!({
            "securityId": null,
            "symbol": "1333",
            "lastTradedPrice": "",
            "ltp": 10.5
        })))
        .unwrap();
        assert_eq!(tick.instrument_id, "1333");
        assert_eq!(tick.price, 10.5);
    }

    #[test]
    fn text_and_bytes_are_decoded() {
        let text = r#"{"securityId":"1333","lastTradedPrice":"1642.55"}"#;
        assert_eq!(
            normalize(&InboundEvent::Text(text.into())).unwrap().price,
            1642.55
        );
        assert_eq!(
            normalize(&InboundEvent::Bytes(text.as_bytes().to_vec()))
                .unwrap()
                .instrument_id,
            "1333"
        );
        assert_eq!(
            normalize(&InboundEvent::Text("heartbeat".into())),
            Err(MalformedTick::Unstructured)
        );
    }

    struct Quote;

    impl AttributeSource for Quote {
        fn type_name(&self) -> &str {
            "Quote"
        }

        fn attribute(&self, name: &str) -> Option<Value> {
            match name {
                "security_id" => Some(json!(1333)),
                "last_price" => Some(json!(99.5)),
                _ => None,
            }
        }
    }

    #[test]
    fn objects_use_attribute_lookup() {
        let tick = normalize(&InboundEvent::Object(Arc::new(Quote))).unwrap();
        assert_eq!(tick.instrument_id, "1333");
        assert_eq!(tick.price, 99.5);
    }

    #[tokio::test]
    async fn handle_records_and_queues() {
        let prices = Arc::new(LatestPriceTable::new());
        let (tx, mut rx) = mpsc::channel(4);
        let mut metrics = MockRelayMetrics::new();
        metrics.expect_tick_accepted().times(1).return_const(());
        metrics
            .expect_tick_dropped()
            .withf(|reason| reason == "unstructured")
            .times(1)
            .return_const(());
        metrics.expect_queue_overflow().never();
        let normalizer = MessageNormalizer::new(Arc::clone(&prices), tx, Arc::new(metrics));

        let callback = normalizer.callback();
        callback(InboundEvent::Text(
            r#"{"securityId":"1333","lastTradedPrice":"1642.55"}"#.into(),
        ));
        callback(InboundEvent::Text("not json".into()));

        assert_eq!(prices.price("1333"), Some(1642.55));
        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.instrument_id, "1333");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_still_updates_prices() {
        let prices = Arc::new(LatestPriceTable::new());
        let (tx, _rx) = mpsc::channel(1);
        let mut metrics = MockRelayMetrics::new();
        metrics.expect_tick_accepted().times(3).return_const(());
        metrics.expect_queue_overflow().times(2).return_const(());
        let normalizer = MessageNormalizer::new(Arc::clone(&prices), tx, Arc::new(metrics));

        for price in ["1.0", "2.0", "3.0"] {
            let event = structured(json!({"securityId": "1333", "ltp": price}));
            assert!(normalizer.handle(event).is_some());
        }
        assert_eq!(prices.price("1333"), Some(3.0));
    }

    proptest! {
        #[test]
        fn arbitrary_text_never_panics(text in ".*") {
            let _ = normalize(&InboundEvent::Text(text));
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = normalize(&InboundEvent::Bytes(bytes));
        }

        #[test]
        fn ticks_require_finite_prices(id in "[0-9]{1,6}", price in any::<f64>()) {
            let event = InboundEvent::Structured(json!({"securityId": id, "ltp": price.to_string()}));
            if let Ok(tick) = normalize(&event) {
                prop_assert!(tick.price.is_finite());
                prop_assert!(tick.price != 0.0 || price == 0.0);
            }
        }
    }
}
