//! Recognizer for RFC 3464 delivery status notifications.
//!
//! The machine-readable bounce format: a `message/delivery-status` part
//! whose body is a per-message field block followed by one field block
//! per recipient. Recipients whose `Action` is a failure contribute
//! their `Final-Recipient` address.

use herald_common::message::Message;

use super::Recognizer;

#[derive(Debug, Default)]
pub struct Dsn;

impl Dsn {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Recognizer for Dsn {
    fn name(&self) -> &'static str {
        "dsn"
    }

    fn attempt(&self, message: &Message) -> Option<Vec<String>> {
        let status = message
            .leaves()
            .into_iter()
            .find(|leaf| leaf.content_type() == "message/delivery-status")?;

        let text = String::from_utf8_lossy(&status.body_bytes()).into_owned();
        Some(failed_recipients(&text))
    }
}

/// Walk the field blocks; the first block is per-message and never names
/// a recipient, so simply collecting `(Final-Recipient, Action)` pairs
/// per blank-line-separated block is enough.
fn failed_recipients(text: &str) -> Vec<String> {
    let mut addresses = Vec::new();
    let mut recipient: Option<String> = None;
    let mut failed = false;

    let mut finish = |recipient: &mut Option<String>, failed: &mut bool| {
        if *failed
            && let Some(addr) = recipient.take()
        {
            addresses.push(addr);
        }
        *recipient = None;
        *failed = false;
    };

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            finish(&mut recipient, &mut failed);
            continue;
        }

        // Continuation lines of folded fields carry no field name.
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };

        match name.trim().to_ascii_lowercase().as_str() {
            "final-recipient" => recipient = Some(strip_address_type(value)),
            "action" => {
                failed = value
                    .trim()
                    .split_whitespace()
                    .next()
                    .is_some_and(|word| word.to_ascii_lowercase().starts_with("fail"));
            }
            _ => {}
        }
    }
    finish(&mut recipient, &mut failed);

    addresses
}

/// `Final-Recipient: rfc822; bart@example.org` minus the address type,
/// angle brackets tolerated.
fn strip_address_type(value: &str) -> String {
    let addr = value
        .split_once(';')
        .map_or(value, |(_, addr)| addr)
        .trim();
    addr.trim_start_matches('<').trim_end_matches('>').to_string()
}
