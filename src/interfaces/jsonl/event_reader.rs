use crate::application::engine::CheckoutRequest;
use crate::domain::order::CheckoutToken;
use crate::error::{OrderError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

fn yes() -> bool {
    true
}

/// One line of a checkout event log.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutEvent {
    /// Customer starts checkout.
    Initiate(CheckoutRequest),
    /// Payer completes payment in the widget (simulated gateway only). The
    /// callback is verified right away.
    Pay {
        #[serde(alias = "checkoutToken")]
        checkout_token: CheckoutToken,
        #[serde(alias = "paymentRef")]
        payment_ref: String,
        #[serde(default = "yes")]
        captured: bool,
        /// Corrupts the signature before verification.
        #[serde(default)]
        tamper: bool,
    },
    /// Raw completion callback as posted by the client.
    Callback {
        #[serde(alias = "razorpay_order_id")]
        gateway_order_ref: String,
        #[serde(alias = "razorpay_payment_id")]
        payment_ref: String,
        #[serde(alias = "razorpay_signature")]
        signature: String,
    },
    /// Runs one reconciliation sweep as of `at` (defaults to now).
    Sweep {
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
}

/// Reads checkout events from a JSON Lines source.
///
/// Blank lines and lines starting with `#` are skipped. A malformed line
/// yields an error item and does not stop the stream.
pub struct EventReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Lazily yields `(line_number, event)` pairs.
    pub fn events(self) -> impl Iterator<Item = (usize, Result<CheckoutEvent>)> {
        self.reader
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let number = index + 1;
                match line {
                    Ok(text) => {
                        let text = text.trim();
                        if text.is_empty() || text.starts_with('#') {
                            None
                        } else {
                            Some((number, serde_json::from_str(text).map_err(OrderError::from)))
                        }
                    }
                    Err(e) => Some((number, Err(OrderError::from(e)))),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INITIATE: &str = r#"{"type":"initiate","checkout_token":"c1","owner_id":"u1","items":[{"product_id":"p1","quantity":2,"unit_price":500}],"address":{"full_name":"Asha Rao","line1":"12 MG Road","city":"Bengaluru","region":"Karnataka","postal_code":"560001","phone":"9876543210"}}"#;

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{INITIATE}\n\n# paid\n{}\n{}\n{}",
            r#"{"type":"pay","checkout_token":"c1","payment_ref":"pay_1"}"#,
            r#"{"type":"callback","razorpay_order_id":"gw_1","razorpay_payment_id":"pay_1","razorpay_signature":"ab"}"#,
            r#"{"type":"sweep","at":"2030-01-01T00:00:00Z"}"#,
        );
        let events: Vec<_> = EventReader::new(data.as_bytes()).events().collect();
        assert_eq!(events.len(), 4);

        let (line, first) = &events[0];
        assert_eq!(*line, 1);
        match first.as_ref().unwrap() {
            CheckoutEvent::Initiate(request) => {
                assert_eq!(request.checkout_token, "c1".into());
                assert_eq!(request.items[0].quantity, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let (line, pay) = &events[1];
        assert_eq!(*line, 4);
        assert_eq!(
            pay.as_ref().unwrap(),
            &CheckoutEvent::Pay {
                checkout_token: "c1".into(),
                payment_ref: "pay_1".into(),
                captured: true,
                tamper: false,
            }
        );
        assert!(matches!(
            events[2].1.as_ref().unwrap(),
            CheckoutEvent::Callback { gateway_order_ref, .. } if gateway_order_ref == "gw_1"
        ));
        assert!(matches!(
            events[3].1.as_ref().unwrap(),
            CheckoutEvent::Sweep { at: Some(_) }
        ));
    }

    #[test]
    fn test_reader_malformed_line_does_not_stop_stream() {
        let data = "{\"type\":\"refund\"}\nnot json\n{\"type\":\"sweep\"}";
        let events: Vec<_> = EventReader::new(data.as_bytes()).events().collect();
        assert_eq!(events.len(), 3);
        assert!(events[0].1.is_err());
        assert!(events[1].1.is_err());
        assert_eq!(
            events[2].1.as_ref().unwrap(),
            &CheckoutEvent::Sweep { at: None }
        );
    }
}
