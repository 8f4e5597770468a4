//! New-vehicle notification formatting and fan-out
//!
//! Each new vehicle produces one message per destination: the aggregate
//! channel shared by all targets, then the target's own channel. The two
//! deliveries are independent and never retried.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::TargetConfig;
use crate::error::Error;
use crate::model::VehicleRecord;
use crate::traits::{ChannelTransport, MessageEmbed, OutboundMessage};

/// Mention line attached to every vehicle notification
pub const MENTION: &str = "@everyone";

const PLACEHOLDER: &str = "-";
const NO_OPTIONS: &str = "없음";

/// Per-destination delivery outcomes of one notification
#[derive(Debug)]
pub struct DispatchReport {
    /// Aggregate channel delivery
    pub aggregate: Result<(), Error>,
    /// Target channel delivery
    pub target: Result<(), Error>,
}

impl DispatchReport {
    /// Whether both destinations received the message
    pub fn all_delivered(&self) -> bool {
        self.aggregate.is_ok() && self.target.is_ok()
    }
}

/// Formats vehicles and fans them out to the configured channels
pub struct NotificationDispatcher {
    transport: Arc<dyn ChannelTransport>,
    aggregate_channel_id: u64,
    detail_base_url: String,
}

impl NotificationDispatcher {
    /// Create a dispatcher
    ///
    /// # Parameters
    ///
    /// - `transport`: Channel transport used for delivery
    /// - `aggregate_channel_id`: Channel receiving every target's notifications
    /// - `detail_base_url`: Base of the purchase/detail link
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        aggregate_channel_id: u64,
        detail_base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            aggregate_channel_id,
            detail_base_url: detail_base_url.into(),
        }
    }

    /// Deliver one vehicle notification to both destinations
    ///
    /// Never fails: each destination's outcome is logged and reported.
    pub async fn notify(&self, vehicle: &VehicleRecord, target: &TargetConfig) -> DispatchReport {
        let message = self.build_message(vehicle, target);
        let id = vehicle.id().unwrap_or_else(|| PLACEHOLDER.to_string());

        let aggregate = self.deliver(self.aggregate_channel_id, &message, target, &id).await;
        let target_result = self.deliver(target.channel_id, &message, target, &id).await;

        DispatchReport {
            aggregate,
            target: target_result,
        }
    }

    async fn deliver(
        &self,
        channel_id: u64,
        message: &OutboundMessage,
        target: &TargetConfig,
        vehicle_id: &str,
    ) -> Result<(), Error> {
        match self.transport.send(channel_id, message).await {
            Ok(()) => {
                info!(
                    "[{}] notified {} to channel {}",
                    target.label, vehicle_id, channel_id
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "[{}] delivery of {} via {} failed: {}",
                    target.label,
                    vehicle_id,
                    self.transport.transport_name(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Render the notification for a vehicle
    pub fn build_message(&self, vehicle: &VehicleRecord, target: &TargetConfig) -> OutboundMessage {
        let text = |value: Option<String>| value.unwrap_or_else(|| PLACEHOLDER.to_string());

        let options = vehicle.option_names();
        let options = if options.is_empty() {
            NO_OPTIONS.to_string()
        } else {
            options.join(", ")
        };

        let description = [
            format!(
                "**모델** {} / {}",
                text(vehicle.model_name()),
                text(vehicle.trim_name())
            ),
            format!("**외장** {}", text(vehicle.exterior_color())),
            format!("**내장** {}", text(vehicle.interior_color())),
            format!("**출고** {}", text(vehicle.delivery_center())),
            format!("**가격** {}", format_price(vehicle.price())),
            format!("**할인** {}", format_price(vehicle.discount())),
            format!("**옵션** {}", options),
            String::new(),
            format!("**[구매링크]({})**", self.detail_url(vehicle)),
        ]
        .join("\n");

        OutboundMessage::embed(
            MENTION,
            MessageEmbed {
                title: format!("{} — 신규 차량", target.label),
                description,
                color: target.color,
                timestamp: Utc::now(),
            },
        )
    }

    /// Purchase link for a vehicle
    ///
    /// Prefers the production-number form; falls back to the identifier.
    pub fn detail_url(&self, vehicle: &VehicleRecord) -> String {
        match (vehicle.criterion_year_month(), vehicle.production_number()) {
            (Some(year_month), Some(production)) => format!(
                "{}?criterionYearMonth={}&carProductionNumber={}",
                self.detail_base_url, year_month, production
            ),
            _ => format!(
                "{}?vehicleId={}",
                self.detail_base_url,
                vehicle.id().unwrap_or_default()
            ),
        }
    }
}

/// Format a currency amount: grouped digits with the won suffix
///
/// Fractions are truncated, so a positive amount below one renders as `"0원"`.
/// Zero, negative, missing and non-finite amounts render as `"-"`.
pub fn format_price(amount: Option<f64>) -> String {
    match amount {
        Some(v) if v.is_finite() && v > 0.0 => format!("{}원", group_thousands(v.trunc() as u64)),
        _ => PLACEHOLDER.to_string(),
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
