//! Recognizer for Postfix-style bounce notices.
//!
//! Also matches the Keftamail and "BNS Postfix" variants, which are the
//! same format with the name filed off. The notice is a
//! `multipart/mixed` envelope whose `text/plain` part with a
//! `Content-Description: notification` carries a salutation line
//! followed by indented per-recipient failure lines with the address in
//! angle brackets.

use herald_common::message::Message;
use regex::Regex;

use super::Recognizer;

/// Salutation of the human-readable notification, e.g.
/// `\t\t\tThe Postfix program`.
const SALUTATION: &str = r"(?i)^\t\t\tthe\s*(bns)?\s*(postfix|keftamail)";
/// Some variants open the failure listing with this line instead.
const FAILURE_REASON: &str = r"(?i)^failure reason:$";
/// A failed recipient, `<addr>: reason...`.
const ADDRESS: &str = r"<(?P<addr>[^>]*)>:";

#[derive(Debug)]
pub struct Postfix {
    salutation: Regex,
    failure_reason: Regex,
    address: Regex,
}

impl Default for Postfix {
    fn default() -> Self {
        Self::new()
    }
}

impl Postfix {
    /// # Panics
    /// Never; the patterns are compile-time constants.
    #[must_use]
    #[allow(clippy::missing_panics_doc, clippy::unwrap_used)]
    pub fn new() -> Self {
        Self {
            salutation: Regex::new(SALUTATION).unwrap(),
            failure_reason: Regex::new(FAILURE_REASON).unwrap(),
            address: Regex::new(ADDRESS).unwrap(),
        }
    }

    /// Two-state scan of the notification text: look for the salutation,
    /// then collect every bracketed address that follows. Blank lines
    /// are skipped, not terminal; the failure listing is often broken up
    /// by them.
    fn find_addresses(&self, text: &str) -> Vec<String> {
        let mut addresses = Vec::new();
        let mut collecting = false;

        for line in text.lines() {
            // trailing whitespace only; indentation is significant
            let line = line.trim_end();
            if !collecting
                && (self.salutation.is_match(line) || self.failure_reason.is_match(line))
            {
                collecting = true;
            } else if collecting
                && !line.is_empty()
                && let Some(caps) = self.address.captures(line)
            {
                addresses.push(caps["addr"].to_string());
            }
        }

        addresses
    }
}

impl Recognizer for Postfix {
    fn name(&self) -> &'static str {
        "postfix"
    }

    fn attempt(&self, message: &Message) -> Option<Vec<String>> {
        if message.content_type() != "multipart/mixed" {
            return None;
        }

        for leaf in message.leaves() {
            if leaf.content_type() == "text/plain"
                && leaf
                    .content_description()
                    .is_some_and(|d| d.eq_ignore_ascii_case("notification"))
            {
                let text = String::from_utf8_lossy(&leaf.body_bytes()).into_owned();
                return Some(self.find_addresses(&text));
            }
        }

        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn bounce_with_notification(notification: &str) -> Message {
        let raw = format!(
            "From: MAILER-DAEMON@example.com\r\n\
             Subject: Undelivered Mail Returned to Sender\r\n\
             Content-Type: multipart/mixed; boundary=\"BB\"\r\n\
             \r\n\
             --BB\r\n\
             Content-Type: text/plain\r\n\
             Content-Description: Notification\r\n\
             \r\n\
             {}\r\n\
             --BB\r\n\
             Content-Type: message/rfc822\r\n\
             \r\n\
             Subject: the original message\r\n\
             \r\n\
             hi\r\n\
             --BB--\r\n",
            notification.replace('\n', "\r\n")
        );
        Message::parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_collects_addresses_after_the_salutation() {
        let message = bounce_with_notification(
            "This is the Postfix program at host mail.example.com.\n\
             \n\
             \t\t\tThe Postfix program\n\
             \n\
             <bart@example.org>: unknown user\n\
             <lisa@example.org>: mailbox full\n\
             \n\
             This unrelated trailer mentions <nobody@example.org> without a colon",
        );

        let addrs = Postfix::new().attempt(&message).unwrap();
        assert_eq!(addrs, vec!["bart@example.org", "lisa@example.org"]);
    }

    #[test]
    fn test_blank_lines_do_not_end_collection() {
        let message = bounce_with_notification(
            "\t\t\tThe Postfix program\n\
             \n\
             <one@example.org>: over quota\n\
             \n\
             \n\
             <two@example.org>: no such user\n",
        );

        let addrs = Postfix::new().attempt(&message).unwrap();
        assert_eq!(addrs, vec!["one@example.org", "two@example.org"]);
    }

    #[test]
    fn test_variant_salutations() {
        for salutation in [
            "\t\t\tThe BNS Postfix program",
            "\t\t\tthe keftamail system",
            "Failure reason:",
        ] {
            let message = bounce_with_notification(&format!(
                "{salutation}\n<who@example.org>: bounced\n"
            ));
            let addrs = Postfix::new().attempt(&message).unwrap();
            assert_eq!(addrs, vec!["who@example.org"], "salutation {salutation:?}");
        }
    }

    #[test]
    fn test_addresses_before_the_salutation_are_ignored() {
        let message = bounce_with_notification(
            "<early@example.org>: should not count\n\
             \t\t\tThe Postfix program\n\
             <late@example.org>: counts\n",
        );

        let addrs = Postfix::new().attempt(&message).unwrap();
        assert_eq!(addrs, vec!["late@example.org"]);
    }

    #[test]
    fn test_wrong_envelope_or_missing_notification_is_no_match() {
        let plain = Message::parse(
            b"From: MAILER-DAEMON@example.com\r\n\
              \r\n\
              \t\t\tThe Postfix program\r\n\
              <who@example.org>: bounced\r\n",
        )
        .unwrap();
        assert_eq!(Postfix::new().attempt(&plain), None);

        let raw = b"Content-Type: multipart/mixed; boundary=\"BB\"\r\n\
            \r\n\
            --BB\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            no description here\r\n\
            --BB--\r\n";
        let no_description = Message::parse(raw).unwrap();
        assert_eq!(Postfix::new().attempt(&no_description), None);
    }
}
