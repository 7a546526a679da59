//! Built-in `dhanhq` Client Shim
//!
//! Exposes the DhanHQ live market feed through capability tables:
//!
//! - package `dhanhq`, submodule `marketfeed`
//! - entry type `DhanFeed(client_id, access_token, instruments, version="v2")`
//! - methods `run_forever(on_message)` and `disconnect()`
//! - segment and subscription constants (`NSE`, `Ticker`, ...)
//!
//! # Protocol
//!
//! Connects to `{base}/?version={n}&token=..&clientId=..&authType=2`, sends
//! one subscription request, then forwards every frame to the callback.
//! Binary ticker packets are decoded into `{securityId, lastTradedPrice}`;
//! anything else is forwarded untouched.

use std::sync::Arc;

use futures::FutureExt;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::signature::{BoundArgs, Parameter, Signature};
use super::table::{EntryTable, HandleTable, LibraryTable, ModuleTable};
use crate::application::ports::{
    CallError, ClientHandle, Constant, EventCallback, InboundEvent, InstrumentSpec,
};

/// Package name the shim registers under.
pub const PACKAGE: &str = "dhanhq";

/// Version used when the caller passes none.
const DEFAULT_VERSION: &str = "v2";

/// Ticker packet response code.
const TICKER_RESPONSE_CODE: u8 = 2;

/// Fixed ticker packet length (8-byte header, f32 price, i32 time).
const TICKER_PACKET_LEN: usize = 16;

// =============================================================================
// Library Layout
// =============================================================================

/// Build the `dhanhq` library table against the given feed endpoint.
#[must_use]
pub fn library(ws_url: impl Into<String>) -> LibraryTable {
    let ws_url: Arc<str> = Arc::from(ws_url.into());

    let feed = EntryTable::new(
        "DhanFeed",
        Signature::new(vec![
            Parameter::required("client_id"),
            Parameter::required("access_token"),
            Parameter::required("instruments"),
            Parameter::optional("version"),
        ]),
        move |bound| construct(&ws_url, &bound),
    );

    let marketfeed = ModuleTable::new("dhanhq.marketfeed")
        .with_entry(feed)
        .with_constant("IDX", Constant::Int(0))
        .with_constant("NSE", Constant::Int(1))
        .with_constant("NSE_FNO", Constant::Int(2))
        .with_constant("BSE", Constant::Int(4))
        .with_constant("MCX", Constant::Int(5))
        .with_constant("Ticker", Constant::Int(15))
        .with_constant("Quote", Constant::Int(17))
        .with_constant("Depth", Constant::Int(19))
        .with_constant("Full", Constant::Int(21));

    let root = ModuleTable::new(PACKAGE)
        .with_member("dhanhq")
        .with_member("marketfeed")
        .with_member("orderupdate");

    LibraryTable::new(PACKAGE, root).with_submodule("marketfeed", marketfeed)
}

fn construct(ws_url: &str, bound: &BoundArgs) -> Result<Box<dyn ClientHandle>, CallError> {
    let version = bound.text("version").unwrap_or(DEFAULT_VERSION);
    let version_number = match version {
        "1" | "v1" => 1,
        "2" | "2.0" | "v2" => 2,
        other => {
            return Err(CallError::from_message(format!(
                "Unsupported version: {other}"
            )));
        }
    };

    let client_id = bound
        .text("client_id")
        .ok_or_else(|| CallError::SignatureMismatch("client_id must be text".into()))?;
    let access_token = bound
        .text("access_token")
        .ok_or_else(|| CallError::SignatureMismatch("access_token must be text".into()))?;
    let instruments = bound
        .instruments("instruments")
        .ok_or_else(|| CallError::SignatureMismatch("instruments must be a list".into()))?;

    let session = Arc::new(FeedSession {
        endpoint: ws_url.to_string(),
        url: format!(
            "{}/?version={version_number}&token={access_token}&clientId={client_id}&authType=2",
            ws_url.trim_end_matches('/')
        ),
        subscription: subscription_request(instruments).to_string(),
        instrument_count: instruments.len(),
        cancel: CancellationToken::new(),
    });

    let run_session = Arc::clone(&session);
    let close_session = session;

    let handle = HandleTable::new("DhanFeed")
        .with_method(
            "run_forever",
            Signature::new(vec![Parameter::required("on_message")]),
            move |args| {
                let on_message = args
                    .callback("on_message")
                    .ok_or_else(|| CallError::SignatureMismatch("on_message must be callable".into()))?;
                let session = Arc::clone(&run_session);
                Ok(async move { session.stream(on_message).await }.boxed())
            },
        )
        .with_method("disconnect", Signature::empty(), move |_| {
            close_session.cancel.cancel();
            Ok(futures::future::ready(Ok(())).boxed())
        })
        .with_attribute("client_id")
        .with_attribute("instruments")
        .with_attribute("version");

    Ok(Box::new(handle))
}

// =============================================================================
// Wire Format
// =============================================================================

fn segment_name(segment: &Constant) -> String {
    match segment {
        Constant::Int(0) => "IDX_I".to_string(),
        Constant::Int(1) => "NSE_EQ".to_string(),
        Constant::Int(2) => "NSE_FNO".to_string(),
        Constant::Int(3) => "NSE_CURRENCY".to_string(),
        Constant::Int(4) => "BSE_EQ".to_string(),
        Constant::Int(5) => "MCX_COMM".to_string(),
        Constant::Int(7) => "BSE_CURRENCY".to_string(),
        Constant::Int(8) => "BSE_FNO".to_string(),
        Constant::Int(other) => other.to_string(),
        Constant::Text(name) if name.eq_ignore_ascii_case("NSE") => "NSE_EQ".to_string(),
        Constant::Text(name) => name.clone(),
    }
}

fn request_code(subscription: &Constant) -> i64 {
    match subscription {
        Constant::Int(code) => *code,
        Constant::Text(name) => match name.to_ascii_uppercase().as_str() {
            "QUOTE" => 17,
            "DEPTH" => 19,
            "FULL" => 21,
            _ => 15,
        },
    }
}

/// Subscription request for a set of instruments.
fn subscription_request(instruments: &[InstrumentSpec]) -> Value {
    let code = instruments
        .first()
        .map_or(15, |spec| request_code(&spec.subscription));
    let list: Vec<Value> = instruments
        .iter()
        .map(|spec| {
            json!({
                "ExchangeSegment": segment_name(&spec.segment),
                "SecurityId": spec.security_id,
            })
        })
        .collect();

    json!({
        "RequestCode": code,
        "InstrumentCount": list.len(),
        "InstrumentList": list,
    })
}

/// Decode a little-endian ticker packet into a structured tick.
fn decode_ticker_packet(data: &[u8]) -> Option<Value> {
    if data.len() < TICKER_PACKET_LEN || data[0] != TICKER_RESPONSE_CODE {
        return None;
    }
    let security_id = u32::from_le_bytes(data[4..8].try_into().ok()?);
    let price = f32::from_le_bytes(data[8..12].try_into().ok()?);
    let last_trade_time = i32::from_le_bytes(data[12..16].try_into().ok()?);

    Some(json!({
        "type": "Ticker Data",
        "exchange_segment": data[3],
        "securityId": security_id.to_string(),
        "lastTradedPrice": f64::from(price),
        "lastTradeTime": last_trade_time,
    }))
}

// =============================================================================
// Session
// =============================================================================

struct FeedSession {
    endpoint: String,
    url: String,
    subscription: String,
    instrument_count: usize,
    cancel: CancellationToken,
}

impl FeedSession {
    async fn stream(&self, on_message: EventCallback) -> Result<(), CallError> {
        tracing::info!(
            endpoint = %self.endpoint,
            instruments = self.instrument_count,
            "Connecting to market feed"
        );

        let connected = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(&self.url) => result,
        };
        let (ws_stream, _response) =
            connected.map_err(|e| CallError::Failed(format!("feed connection failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(self.subscription.clone().into()))
            .await
            .map_err(|e| CallError::Failed(format!("failed to send subscription: {e}")))?;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    tracing::debug!("Feed session disconnected");
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            on_message(InboundEvent::Text(text.to_string()));
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let event = decode_ticker_packet(&data).map_or_else(
                                || InboundEvent::Bytes(data.to_vec()),
                                InboundEvent::Structured,
                            );
                            on_message(event);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| CallError::Failed(e.to_string()))?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Market feed closed by server");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(CallError::Failed(format!("feed stream error: {e}")));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::sync::{mpsc, oneshot};

    use super::*;
    use crate::application::ports::{ArgValue, CallArgs, ClientLibrary};

    fn nse_ticker(id: &str) -> InstrumentSpec {
        InstrumentSpec {
            segment: Constant::Int(1),
            security_id: id.to_string(),
            subscription: Constant::Int(15),
        }
    }

    fn ctor_args(version: Option<&str>) -> CallArgs {
        let args = CallArgs::new()
            .kwarg("client_id", "1000")
            .kwarg("access_token", "tok")
            .kwarg("instruments", ArgValue::Instruments(vec![nse_ticker("1333")]));
        match version {
            Some(v) => args.kwarg("version", v),
            None => args,
        }
    }

    #[test]
    fn marketfeed_exposes_entry_and_constants() {
        let lib = library("wss://feed.invalid");
        let module = lib.submodule("marketfeed").unwrap();
        assert!(module.entry_type("DhanFeed").is_some());
        assert_eq!(module.constant("NSE"), Some(Constant::Int(1)));
        assert_eq!(module.constant("Ticker"), Some(Constant::Int(15)));
        assert!(lib.root().entry_type("DhanFeed").is_none());
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let entry = library("wss://feed.invalid")
            .submodule("marketfeed")
            .unwrap()
            .entry_type("DhanFeed")
            .unwrap();

        assert!(entry.construct(ctor_args(None)).is_ok());
        assert!(entry.construct(ctor_args(Some("v1"))).is_ok());
        assert!(entry.construct(ctor_args(Some("2.0"))).is_ok());
        assert!(matches!(
            entry.construct(ctor_args(Some("v3"))),
            Err(CallError::VersionRejected(_))
        ));
    }

    #[test]
    fn handle_exposes_run_and_disconnect() {
        let entry = library("wss://feed.invalid")
            .submodule("marketfeed")
            .unwrap()
            .entry_type("DhanFeed")
            .unwrap();
        let handle = entry.construct(ctor_args(None)).unwrap();
        assert!(handle.has_member("run_forever"));
        assert!(handle.has_member("disconnect"));
    }

    #[test]
    fn subscription_request_lists_instruments() {
        let request = subscription_request(&[nse_ticker("1333"), nse_ticker("11536")]);
        assert_eq!(request["RequestCode"], 15);
        assert_eq!(request["InstrumentCount"], 2);
        assert_eq!(request["InstrumentList"][0]["ExchangeSegment"], "NSE_EQ");
        assert_eq!(request["InstrumentList"][1]["SecurityId"], "11536");
    }

    #[test]
    fn literal_fallbacks_map_to_wire_names() {
        let spec = InstrumentSpec {
            segment: Constant::from("NSE"),
            security_id: "1333".into(),
            subscription: Constant::from("TICKER"),
        };
        let request = subscription_request(&[spec]);
        assert_eq!(request["RequestCode"], 15);
        assert_eq!(request["InstrumentList"][0]["ExchangeSegment"], "NSE_EQ");
    }

    fn ticker_packet(security_id: u32, price: f32) -> Vec<u8> {
        let mut packet = vec![TICKER_RESPONSE_CODE, 16, 0, 1];
        packet.extend_from_slice(&security_id.to_le_bytes());
        packet.extend_from_slice(&price.to_le_bytes());
        packet.extend_from_slice(&0_i32.to_le_bytes());
        packet
    }

    #[test]
    fn ticker_packet_decodes() {
        let tick = decode_ticker_packet(&ticker_packet(1333, 1642.5)).unwrap();
        assert_eq!(tick["securityId"], "1333");
        assert_eq!(tick["lastTradedPrice"], 1642.5);
    }

    #[test]
    fn short_or_foreign_packets_are_not_decoded() {
        assert!(decode_ticker_packet(&[2, 0, 0]).is_none());
        assert!(decode_ticker_packet(&[50; 16]).is_none());
    }

    #[tokio::test]
    async fn run_forever_streams_frames_until_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (subscription_tx, subscription_rx) = oneshot::channel();
        let (pong_tx, pong_rx) = oneshot::channel();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let Some(Ok(Message::Text(subscription))) = ws.next().await else {
                panic!("expected a subscription frame");
            };
            subscription_tx.send(subscription.to_string()).unwrap();

            ws.send(Message::Ping(b"hb".to_vec().into())).await.unwrap();
            let reply = ws.next().await;
            pong_tx
                .send(matches!(reply, Some(Ok(Message::Pong(ref data))) if data.to_vec() == b"hb"))
                .unwrap();

            ws.send(Message::Text(
                r#"{"securityId":"1333","lastTradedPrice":"1642.55"}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Binary(ticker_packet(11536, 250.25).into()))
                .await
                .unwrap();

            while let Some(Ok(message)) = ws.next().await {
                if message.is_close() {
                    break;
                }
            }
        });

        let handle = library(format!("ws://{addr}"))
            .submodule("marketfeed")
            .unwrap()
            .entry_type("DhanFeed")
            .unwrap()
            .construct(ctor_args(None))
            .unwrap();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let callback: EventCallback = Arc::new(move |event: InboundEvent| {
            let _ = event_tx.send(event);
        });
        let call = handle
            .invoke("run_forever", CallArgs::new().arg(ArgValue::Callback(callback)))
            .unwrap();
        let running = tokio::spawn(call);

        let subscription: Value =
            serde_json::from_str(&subscription_rx.await.unwrap()).unwrap();
        assert_eq!(subscription["RequestCode"], 15);
        assert_eq!(subscription["InstrumentList"][0]["SecurityId"], "1333");
        assert!(pong_rx.await.unwrap());

        let within = Duration::from_secs(5);
        let first = tokio::time::timeout(within, event_rx.recv()).await.unwrap().unwrap();
        let InboundEvent::Text(text) = first else {
            panic!("expected a text event, got {first:?}");
        };
        assert!(text.contains("1642.55"));

        let second = tokio::time::timeout(within, event_rx.recv()).await.unwrap().unwrap();
        let InboundEvent::Structured(tick) = second else {
            panic!("expected a decoded ticker, got {second:?}");
        };
        assert_eq!(tick["securityId"], "11536");
        assert_eq!(tick["lastTradedPrice"], 250.25);

        handle
            .invoke("disconnect", CallArgs::new())
            .unwrap()
            .await
            .unwrap();
        let outcome = tokio::time::timeout(within, running).await.unwrap().unwrap();
        assert_eq!(outcome, Ok(()));
        tokio::time::timeout(within, server).await.unwrap().unwrap();
    }
}
