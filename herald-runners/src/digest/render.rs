//! Digest renderings.
//!
//! One accumulated batch becomes two messages: a MIME digest that keeps
//! every post byte-for-byte as a `message/rfc822` part, and a plain-text
//! digest in the traditional RFC 1153 shape for subscribers whose
//! readers cannot unpack MIME. Both carry the identical Subject, so
//! threading collapses them.

use base64::Engine;
use herald_common::{
    list::ListConfig,
    message::{Body, Message},
};
use ulid::Ulid;

/// Rule line between RFC 1153 digest sections, exactly 30 dashes.
const SEPARATOR: &str = "------------------------------";

/// Subject shared by both renderings, RFC 2047-encoded when the display
/// name pushes it outside ASCII.
pub(crate) fn subject(config: &ListConfig, volume: u64, issue: u64) -> String {
    let plain = format!(
        "{} Digest, Vol {volume}, Issue {issue}",
        config.display_name()
    );
    if plain.is_ascii() {
        plain
    } else {
        let encoded = base64::engine::general_purpose::STANDARD.encode(plain.as_bytes());
        format!("=?utf-8?b?{encoded}?=")
    }
}

/// Render both digests for one batch of accumulated raw messages.
pub(crate) fn render(
    config: &ListConfig,
    volume: u64,
    issue: u64,
    messages: &[Vec<u8>],
) -> (Message, Message) {
    let subject = subject(config, volume, issue);
    let topics: Vec<Topic> = messages.iter().map(|raw| Topic::of(raw)).collect();

    let mime = render_mime(config, &subject, &topics, messages);
    let flat = render_flat(config, &subject, &topics, messages);

    (mime, flat)
}

/// One ToC entry, pulled from a post's headers.
struct Topic {
    subject: String,
    author: String,
}

impl Topic {
    fn of(raw: &[u8]) -> Self {
        let parsed = Message::parse(raw).ok();
        let subject = parsed
            .as_ref()
            .and_then(|m| m.get("subject"))
            .unwrap_or("(no subject)")
            .to_string();
        let author = parsed
            .as_ref()
            .and_then(|m| m.get("from"))
            .map_or_else(|| "(unknown sender)".to_string(), author_display);
        Self { subject, author }
    }
}

/// Human-readable name from a `From` value, falling back to the address.
fn author_display(from: &str) -> String {
    if let Ok(addrs) = mailparse::addrparse(from)
        && let Some(mailparse::MailAddr::Single(info)) = addrs.iter().next()
    {
        return info
            .display_name
            .clone()
            .unwrap_or_else(|| info.addr.clone());
    }
    from.to_string()
}

fn masthead(config: &ListConfig) -> String {
    let mut text = format!(
        "Send {} mailing list submissions to\n\t{}\n\n\
         To subscribe or unsubscribe, send a message with subject or body\n\
         'help' to\n\t{}\n",
        config.display_name(),
        config.posting_address(),
        config.request_address(),
    );
    if !config.description.is_empty() {
        text.push('\n');
        text.push_str(&config.description);
        text.push('\n');
    }
    text
}

fn table_of_contents(topics: &[Topic]) -> String {
    let mut text = String::from("Today's Topics:\n\n");
    for (i, topic) in topics.iter().enumerate() {
        text.push_str(&format!(
            "   {}. {} ({})\n",
            i + 1,
            topic.subject,
            topic.author
        ));
    }
    text
}

fn footer(config: &ListConfig) -> String {
    format!(
        "{} mailing list -- {}\n\
         To unsubscribe send an email to {}\n",
        config.display_name(),
        config.posting_address(),
        config.request_address(),
    )
}

fn digest_envelope(config: &ListConfig, subject: &str) -> Message {
    let mut message = Message::new();
    message.append("From", &config.request_address());
    message.append("To", &config.posting_address());
    message.append("Subject", subject);
    message.append("Date", &chrono::Utc::now().to_rfc2822());
    message.append("MIME-Version", "1.0");
    message
}

fn text_part(description: Option<&str>, text: &str) -> Message {
    let mut part = Message::new();
    part.append("Content-Type", "text/plain; charset=\"utf-8\"");
    part.append("MIME-Version", "1.0");
    part.append("Content-Transfer-Encoding", "8bit");
    if let Some(description) = description {
        part.append("Content-Description", description);
    }
    part.set_body(Body::Raw(text.as_bytes().to_vec()));
    part
}

/// MIME digest: masthead, ToC, the original posts untouched inside
/// `message/rfc822` parts, footer.
fn render_mime(
    config: &ListConfig,
    subject: &str,
    topics: &[Topic],
    messages: &[Vec<u8>],
) -> Message {
    let boundary = Ulid::new().to_string();
    let mut envelope = digest_envelope(config, subject);
    envelope.append(
        "Content-Type",
        &format!("multipart/mixed; boundary=\"{boundary}\""),
    );

    let mut parts = vec![
        text_part(None, &masthead(config)),
        text_part(
            Some(&format!("Today's Topics ({} messages)", topics.len())),
            &table_of_contents(topics),
        ),
    ];

    for raw in messages {
        let mut part = Message::new();
        part.append("Content-Type", "message/rfc822");
        part.append("MIME-Version", "1.0");
        part.set_body(Body::Raw(raw.clone()));
        parts.push(part);
    }

    parts.push(text_part(Some("Digest Footer"), &footer(config)));

    envelope.set_body(Body::Multipart { boundary, parts });
    envelope
}

/// RFC 1153 digest: one plain-text body, posts decoded and glued
/// together with rule lines, re-encoded into the list's preferred
/// charset when every post survives the trip, UTF-8 otherwise.
fn render_flat(
    config: &ListConfig,
    subject: &str,
    topics: &[Topic],
    messages: &[Vec<u8>],
) -> Message {
    let mut text = masthead(config);
    text.push('\n');
    text.push_str(&table_of_contents(topics));
    text.push('\n');
    text.push_str(SEPARATOR);
    text.push('\n');

    for raw in messages {
        text.push('\n');
        text.push_str(&flat_section(raw));
        text.push('\n');
        text.push_str(SEPARATOR);
        text.push('\n');
    }

    text.push('\n');
    text.push_str(&footer(config));
    text.push('\n');
    text.push_str(&format!("End of {subject}\n"));

    let (bytes, charset) = encode_body(&text, &config.preferred_charset);

    let mut envelope = digest_envelope(config, subject);
    envelope.append(
        "Content-Type",
        &format!("text/plain; charset=\"{charset}\""),
    );
    envelope.append("Content-Transfer-Encoding", "8bit");
    envelope.set_body(Body::Raw(bytes));
    envelope
}

/// One post in the flat digest: the interesting headers, a blank line,
/// the decoded plain-text body.
fn flat_section(raw: &[u8]) -> String {
    let mut section = String::new();

    if let Ok(parsed) = Message::parse(raw) {
        for name in ["From", "Subject", "Date", "Message-ID"] {
            if let Some(value) = parsed.get(name) {
                section.push_str(&format!("{name}: {value}\n"));
            }
        }
    }
    section.push('\n');
    section.push_str(plain_body(raw).trim_end_matches('\n'));
    section.push('\n');

    section
}

/// Decoded text of a post's first plain-text part. Transfer encoding
/// and declared charset are both resolved here, so the flat digest only
/// ever deals in Unicode until the final re-encode.
fn plain_body(raw: &[u8]) -> String {
    fn first_plain(part: &mailparse::ParsedMail<'_>) -> Option<String> {
        if part.subparts.is_empty() {
            if part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
                return part.get_body().ok();
            }
            return None;
        }
        part.subparts.iter().find_map(first_plain)
    }

    mailparse::parse_mail(raw).ok().map_or_else(
        || String::from_utf8_lossy(raw).into_owned(),
        |parsed| {
            first_plain(&parsed)
                .unwrap_or_else(|| "[A message part without plain text was omitted]\n".to_string())
        },
    )
}

/// Encode the flat body into the preferred charset when it round-trips
/// cleanly, UTF-8 otherwise. Returns the bytes and the charset label to
/// declare.
fn encode_body(text: &str, preferred: &str) -> (Vec<u8>, String) {
    if let Some(encoding) = encoding_rs::Encoding::for_label(preferred.as_bytes()) {
        let (bytes, used, had_errors) = encoding.encode(text);
        if !had_errors {
            return (bytes.into_owned(), used.name().to_ascii_lowercase());
        }
    }
    (text.as_bytes().to_vec(), "utf-8".to_string())
}
