//! Alert messages and Telegram delivery.

use crate::rules::Side;
use crate::watchlist::Alert;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::fmt::{self, Write};

pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const CHAT_ENV: &str = "TELEGRAM_CHAT_ID";

const FUTURES_URL: &str = "https://coindcx.com/futures";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

pub struct TelegramNotifier {
    client: Client,
    credentials: Option<(String, String)>,
    parse_mode: Option<String>,
}

impl TelegramNotifier {
    /// Reads the bot token and chat id from the environment. Without both the
    /// notifier only logs.
    pub fn from_env(client: Client, parse_mode: Option<String>) -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let credentials = read(TOKEN_ENV).zip(read(CHAT_ENV));
        if credentials.is_none() {
            log::warn!("{TOKEN_ENV} / {CHAT_ENV} not set, alerts will only be logged");
        }
        Self::new(client, credentials, parse_mode)
    }

    pub fn new(client: Client, credentials: Option<(String, String)>, parse_mode: Option<String>) -> Self {
        Self {
            client,
            credentials,
            parse_mode,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Delivers one message. Failures are logged, never returned.
    pub async fn send(&self, text: &str) {
        let Some((token, chat_id)) = &self.credentials else {
            log::info!("alert (telegram disabled):\n{text}");
            return;
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = SendMessage {
            chat_id: chat_id.as_str(),
            text,
            parse_mode: self.parse_mode.as_deref(),
        };

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => log::info!("telegram message sent"),
            Ok(response) => {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                log::error!("telegram rejected message: {status} {detail}");
            }
            // reqwest errors embed the URL, which contains the token
            Err(e) => log::error!("telegram request failed: {}", e.without_url()),
        }
    }
}

fn price(value: f64) -> String {
    match value.abs() {
        v if v >= 100.0 => format!("{value:.2}"),
        v if v >= 1.0 => format!("{value:.4}"),
        _ => format!("{value:.6}"),
    }
}

/// One message for a scanner's cycle, `None` when nothing fired.
pub fn format_message(title: &str, alerts: &[Alert], scanned: usize, now: DateTime<Utc>) -> Option<String> {
    if alerts.is_empty() {
        return None;
    }
    let mut text = String::new();
    write_message(&mut text, title, alerts, scanned, now).ok()?;
    Some(text)
}

fn write_message(
    out: &mut impl Write,
    title: &str,
    alerts: &[Alert],
    scanned: usize,
    now: DateTime<Utc>,
) -> fmt::Result {
    writeln!(out, "{title}")?;
    writeln!(out, "{} UTC | {scanned} pairs scanned", now.format("%d-%m-%Y %H:%M"))?;

    for side in Side::BOTH {
        let section: Vec<&Alert> = alerts.iter().filter(|a| a.side == side).collect();
        if section.is_empty() {
            continue;
        }
        writeln!(out, "\n{} ({})", side.label(), section.len())?;
        for alert in section {
            write_alert(out, alert)?;
        }
    }

    write!(out, "\n{} alert(s)", alerts.len())
}

fn write_alert(out: &mut impl Write, alert: &Alert) -> fmt::Result {
    writeln!(out, "\n{} | close {} | {}", alert.pair, price(alert.close), alert.reason)?;
    if let Some(plan) = &alert.plan {
        writeln!(out, "Entry {} | SL {} | {}x", price(plan.entry), price(plan.stop), plan.leverage)?;
        let targets: Vec<String> = plan
            .targets
            .iter()
            .map(|t| format!("{}R {}", t.multiple, price(t.price)))
            .collect();
        if !targets.is_empty() {
            writeln!(out, "Targets: {}", targets.join(", "))?;
        }
    }
    writeln!(out, "{FUTURES_URL}/{}", alert.pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{RiskParams, plan_trade};
    use chrono::TimeZone;

    fn alert(pair: &str, side: Side) -> Alert {
        Alert {
            scanner: "bb_green".to_string(),
            pair: pair.to_string(),
            side,
            bar_time: 0,
            close: 100.0,
            value: 1.0,
            reason: "BB(20, 2) touch, then candle colour".to_string(),
            plan: plan_trade(side, 100.0, if side == Side::Buy { 95.0 } else { 105.0 }, &RiskParams::default()),
        }
    }

    #[test]
    fn nothing_to_send() {
        assert!(format_message("Title", &[], 10, Utc::now()).is_none());
    }

    #[test]
    fn sections_and_links() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let text = format_message(
            "BB touch + first candle",
            &[alert("B-ETH_USDT", Side::Sell), alert("B-BTC_USDT", Side::Buy)],
            42,
            now,
        )
        .unwrap();

        assert!(text.starts_with("BB touch + first candle\n01-05-2024 12:00 UTC | 42 pairs scanned"));
        let buy = text.find("BUY (1)").unwrap();
        let sell = text.find("SELL (1)").unwrap();
        assert!(buy < sell);
        assert!(text.contains("https://coindcx.com/futures/B-BTC_USDT"));
        assert!(text.contains("Entry 100.00 | SL 95.00 | 5x"));
        assert!(text.contains("Targets: 2R 110.00, 3R 115.00, 4R 120.00"));
        assert!(text.ends_with("2 alert(s)"));
    }

    #[test]
    fn small_prices_keep_precision() {
        assert_eq!(price(0.000123), "0.000123");
        assert_eq!(price(1.5), "1.5000");
    }

    #[tokio::test]
    async fn disabled_notifier_only_logs() {
        let notifier = TelegramNotifier::new(Client::new(), None, None);
        assert!(!notifier.is_enabled());
        notifier.send("hello").await;
    }
}
