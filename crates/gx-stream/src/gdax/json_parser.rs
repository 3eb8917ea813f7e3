//! GDAX JSON request builder and channel-key extraction.
//!
//! Outbound requests have exactly two fields:
//!
//! ```json
//! {"type": "subscribe", "product_id": "BTC-USD"}
//! {"type": "unsubscribe", "product_id": "BTC-USD"}
//! ```
//!
//! Inbound feed messages are routed by their string `product_id` field.

use gx_core::error::{GxError, Result};
use serde::Serialize;
use serde_json::Value;

/// Field carrying the channel key, both outbound and inbound.
pub const PRODUCT_ID: &str = "product_id";

const SUBSCRIBE: &str = "subscribe";
const UNSUBSCRIBE: &str = "unsubscribe";

/// Wire shape of a subscribe/unsubscribe request. Field order is the
/// serialization order.
#[derive(Debug, Serialize)]
struct SubscriptionRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    product_id: &'a str,
}

/// Build the subscribe request for `product_id`.
pub fn build_subscribe(product_id: &str) -> Result<String> {
    build_request(SUBSCRIBE, product_id)
}

/// Build the unsubscribe request for `product_id`.
pub fn build_unsubscribe(product_id: &str) -> Result<String> {
    build_request(UNSUBSCRIBE, product_id)
}

fn build_request(kind: &str, product_id: &str) -> Result<String> {
    Ok(serde_json::to_string(&SubscriptionRequest { kind, product_id })?)
}

/// Extract the `product_id` of an inbound message.
///
/// Fails with [`GxError::Decode`] when the field is missing or not a string
/// (heartbeats without a product, subscription acks, errors).
pub fn product_id(message: &Value) -> Result<&str> {
    match message.get(PRODUCT_ID) {
        Some(Value::String(id)) => Ok(id.as_str()),
        Some(other) => Err(GxError::Decode(format!("`{PRODUCT_ID}` is not a string: {other}"))),
        None => Err(GxError::Decode(format!(
            "missing `{PRODUCT_ID}` in {} message",
            message_type(message).unwrap_or("untyped")
        ))),
    }
}

/// The `type` field of a feed message (`"match"`, `"heartbeat"`, ...).
pub fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}
