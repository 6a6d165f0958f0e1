//! Send request/result shapes and outbound message assembly.

use lettre::Message;
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, MultiPart};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::TransportError;

/// Header identifying which pool account (or the relay) carried a message.
pub const ROUTE_HEADER: &str = "X-Mailroom-Account";

/// Route tag used in [`ROUTE_HEADER`] when a message went out via the relay.
pub const RELAY_ROUTE_TAG: &str = "relay";

/// One attachment on a send request. Content is raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentSpec {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// A single logical send, as accepted by the dispatch engine.
///
/// Defaults when fields are omitted: the sender falls back to the chosen
/// account's address, the reply-to falls back to the sender, and the plain
/// text body is derived from the HTML body by stripping markup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendRequest {
    /// Visible sender override. Defaults to the transport account address.
    #[serde(default)]
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Additional header key/value pairs, appended after the route header.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub attachments: Vec<AttachmentSpec>,
    /// Route through the relay even when the pool has capacity.
    #[serde(default)]
    pub force_relay: bool,
}

/// Which transport actually carried a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportKind {
    Account { address: String },
    Relay,
}

/// Remaining quota on the transport that carried a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingQuota {
    Limited(u32),
    Unlimited,
}

impl Serialize for RemainingQuota {
    /// `Limited(n)` serializes as `n`; `Unlimited` as the string
    /// `"unlimited"`, the sentinel callers look for.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RemainingQuota::Limited(n) => serializer.serialize_u32(*n),
            RemainingQuota::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub provider_message_id: String,
    pub transport_used: TransportKind,
    pub remaining: RemainingQuota,
}

/// A fully resolved outbound message: every default applied, route header
/// attached, ready for a transport to encode and send.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: String,
    pub reply_to: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub headers: Vec<(String, String)>,
    pub attachments: Vec<AttachmentSpec>,
}

impl Envelope {
    /// Resolve a request against the chosen transport identity.
    ///
    /// `default_sender` is the chosen account's address (or the relay
    /// from-address); `route_tag` is what goes into the routing-trace
    /// header, which always reflects the actual transport regardless of
    /// any visible-sender override.
    pub fn from_request(request: &SendRequest, default_sender: &str, route_tag: &str) -> Self {
        let from = request
            .from
            .clone()
            .unwrap_or_else(|| default_sender.to_string());
        let reply_to = request.reply_to.clone().unwrap_or_else(|| from.clone());
        let text_body = request
            .text_body
            .clone()
            .unwrap_or_else(|| strip_html(&request.html_body));

        let mut headers = vec![(ROUTE_HEADER.to_string(), route_tag.to_string())];
        headers.extend(request.headers.iter().cloned());

        Self {
            from,
            reply_to,
            to: request.to.clone(),
            subject: request.subject.clone(),
            html_body: request.html_body.clone(),
            text_body,
            headers,
            attachments: request.attachments.clone(),
        }
    }

    /// Encode as a MIME message for lettre.
    pub fn to_mime(&self) -> Result<Message, TransportError> {
        let from: Mailbox = self.from.parse().map_err(|e| {
            TransportError::Message(format!("invalid from address {}: {e}", self.from))
        })?;
        let reply_to: Mailbox = self.reply_to.parse().map_err(|e| {
            TransportError::Message(format!("invalid reply-to address {}: {e}", self.reply_to))
        })?;

        let mut builder = Message::builder()
            .from(from)
            .reply_to(reply_to)
            .subject(self.subject.clone());
        for to in &self.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| TransportError::Message(format!("invalid recipient {to}: {e}")))?;
            builder = builder.to(mailbox);
        }

        let alternative =
            MultiPart::alternative_plain_html(self.text_body.clone(), self.html_body.clone());

        let body = if self.attachments.is_empty() {
            alternative
        } else {
            let mut mixed = MultiPart::mixed().multipart(alternative);
            for spec in &self.attachments {
                let content_type: ContentType = spec.content_type.parse().map_err(|e| {
                    TransportError::Message(format!(
                        "invalid content type {}: {e}",
                        spec.content_type
                    ))
                })?;
                mixed = mixed
                    .singlepart(Attachment::new(spec.filename.clone()).body(
                        spec.content.clone(),
                        content_type,
                    ));
            }
            mixed
        };

        let mut message = builder
            .multipart(body)
            .map_err(|e| TransportError::Message(format!("failed to build message: {e}")))?;

        for (name, value) in &self.headers {
            let header_name = HeaderName::new_from_ascii(name.clone()).map_err(|e| {
                TransportError::Message(format!("invalid header name {name}: {e}"))
            })?;
            message
                .headers_mut()
                .insert_raw(HeaderValue::new(header_name, value.clone()));
        }

        Ok(message)
    }
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SendRequest {
        SendRequest {
            to: vec!["lead@client.com".into()],
            subject: "Hello".into(),
            html_body: "<p>Hi there</p>".into(),
            ..Default::default()
        }
    }

    // ── Envelope resolution ─────────────────────────────────────────

    #[test]
    fn sender_defaults_to_transport_account() {
        let env = Envelope::from_request(&request(), "ana@agency.com", "ana@agency.com");
        assert_eq!(env.from, "ana@agency.com");
        assert_eq!(env.reply_to, "ana@agency.com");
    }

    #[test]
    fn sender_override_wins_and_reply_to_follows_it() {
        let mut req = request();
        req.from = Some("client@brand.com".into());
        let env = Envelope::from_request(&req, "ana@agency.com", "ana@agency.com");
        assert_eq!(env.from, "client@brand.com");
        assert_eq!(env.reply_to, "client@brand.com");
    }

    #[test]
    fn explicit_reply_to_wins_over_sender() {
        let mut req = request();
        req.reply_to = Some("replies@agency.com".into());
        let env = Envelope::from_request(&req, "ana@agency.com", "ana@agency.com");
        assert_eq!(env.from, "ana@agency.com");
        assert_eq!(env.reply_to, "replies@agency.com");
    }

    #[test]
    fn text_body_derived_from_html_when_absent() {
        let env = Envelope::from_request(&request(), "ana@agency.com", "ana@agency.com");
        assert_eq!(env.text_body, "Hi there");
    }

    #[test]
    fn explicit_text_body_kept() {
        let mut req = request();
        req.text_body = Some("plain".into());
        let env = Envelope::from_request(&req, "ana@agency.com", "ana@agency.com");
        assert_eq!(env.text_body, "plain");
    }

    #[test]
    fn route_header_always_first_and_reflects_transport() {
        let mut req = request();
        req.from = Some("client@brand.com".into());
        req.headers.push(("X-Custom".into(), "1".into()));
        let env = Envelope::from_request(&req, "ana@agency.com", "ana@agency.com");
        assert_eq!(
            env.headers[0],
            (ROUTE_HEADER.to_string(), "ana@agency.com".to_string())
        );
        assert_eq!(env.headers[1], ("X-Custom".to_string(), "1".to_string()));
    }

    // ── MIME encoding ───────────────────────────────────────────────

    #[test]
    fn mime_builds_for_plain_request() {
        let env = Envelope::from_request(&request(), "ana@agency.com", "ana@agency.com");
        assert!(env.to_mime().is_ok());
    }

    #[test]
    fn mime_builds_with_attachment_and_custom_header() {
        let mut req = request();
        req.headers.push(("X-Campaign".into(), "spring".into()));
        req.attachments.push(AttachmentSpec {
            filename: "offer.txt".into(),
            content_type: "text/plain".into(),
            content: b"50% off".to_vec(),
        });
        let env = Envelope::from_request(&req, "ana@agency.com", "ana@agency.com");
        assert!(env.to_mime().is_ok());
    }

    #[test]
    fn mime_rejects_invalid_recipient() {
        let mut req = request();
        req.to = vec!["not an address".into()];
        let env = Envelope::from_request(&req, "ana@agency.com", "ana@agency.com");
        assert!(env.to_mime().is_err());
    }

    // ── HTML stripping ──────────────────────────────────────────────

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_with_attributes() {
        assert_eq!(
            strip_html(r#"<a href="https://example.com">Link</a>"#),
            "Link"
        );
    }

    #[test]
    fn strip_html_whitespace_normalized() {
        assert_eq!(strip_html("<p>  Hello   World  </p>"), "Hello World");
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
    }

    // ── Serialization ───────────────────────────────────────────────

    #[test]
    fn remaining_quota_serializes_sentinel() {
        assert_eq!(
            serde_json::to_string(&RemainingQuota::Limited(3)).unwrap(),
            "3"
        );
        assert_eq!(
            serde_json::to_string(&RemainingQuota::Unlimited).unwrap(),
            "\"unlimited\""
        );
    }

    #[test]
    fn send_request_minimal_json() {
        let req: SendRequest = serde_json::from_str(
            r#"{"to": ["lead@client.com"], "subject": "Hi", "html_body": "<p>x</p>"}"#,
        )
        .unwrap();
        assert!(req.from.is_none());
        assert!(!req.force_relay);
        assert!(req.headers.is_empty());
    }
}
