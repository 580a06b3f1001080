use crate::domain::order::Order;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OrderRecord<'a> {
    order_id: String,
    checkout_token: &'a str,
    owner_id: &'a str,
    /// Minor units.
    amount: u64,
    currency: &'a str,
    status: &'a str,
    failure_reason: Option<&'a str>,
    gateway_order_ref: Option<&'a str>,
    gateway_payment_ref: Option<&'a str>,
}

impl<'a> From<&'a Order> for OrderRecord<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            order_id: order.id.to_string(),
            checkout_token: &order.checkout_token.0,
            owner_id: &order.owner_id.0,
            amount: order.amount.minor_units,
            currency: order.amount.currency.code(),
            status: order.status.as_str(),
            failure_reason: order.failure_reason.map(|r| r.as_str()),
            gateway_order_ref: order.gateway_order_ref.as_deref(),
            gateway_payment_ref: order.gateway_payment_ref.as_deref(),
        }
    }
}

/// Writes the order report as CSV, one row per order.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders<'a>(&mut self, orders: impl IntoIterator<Item = &'a Order>) -> Result<()> {
        for order in orders {
            self.writer.serialize(OrderRecord::from(order))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
