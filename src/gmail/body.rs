//! Turn a fetched message into plain searchable text.
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::model::{InboxMessage, MessagePart};

const TRANSPORT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static NUMERIC_ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|([0-9]+));").expect("valid regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Encoded body of the message: the top-level body, else the first part
/// carrying data (nested multiparts are searched depth-first).
pub fn raw_body(part: &MessagePart) -> Option<&str> {
    if let Some(data) = part.body.as_ref().and_then(|b| b.data()) {
        return Some(data);
    }
    part.parts.iter().find_map(raw_body)
}

/// Decode base64url transport data; standard alphabet and padding are tolerated.
pub fn decode_transport(data: &str) -> Option<String> {
    let cleaned: String = data
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = TRANSPORT.decode(cleaned.as_bytes()).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Strip markup, unescape entities and collapse whitespace.
pub fn normalize_text(raw: &str) -> String {
    let without_blocks = BLOCK_RE.replace_all(raw, " ");
    let without_tags = TAG_RE.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    WS_RE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(value: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(value, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    numeric
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Normalized body text followed by the provider snippet.
pub fn message_text(msg: &InboxMessage) -> String {
    let body = msg
        .payload
        .as_ref()
        .and_then(raw_body)
        .and_then(decode_transport)
        .map(|raw| normalize_text(&raw))
        .unwrap_or_default();
    let snippet = normalize_text(&msg.snippet);
    match (body.is_empty(), snippet.is_empty()) {
        (true, _) => snippet,
        (false, true) => body,
        (false, false) => format!("{body} {snippet}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::model::PartBody;

    fn encode(text: &str) -> String {
        TRANSPORT.encode(text.as_bytes())
    }

    fn part(mime: &str, data: Option<String>, parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: mime.into(),
            body: Some(PartBody { data, size: 0 }),
            parts,
        }
    }

    #[test]
    fn prefers_top_level_body() {
        let p = part(
            "text/html",
            Some(encode("top")),
            vec![part("text/plain", Some(encode("child")), vec![])],
        );
        assert_eq!(raw_body(&p).and_then(decode_transport).as_deref(), Some("top"));
    }

    #[test]
    fn falls_back_to_first_part_with_data() {
        let p = part(
            "multipart/mixed",
            None,
            vec![
                part(
                    "multipart/alternative",
                    None,
                    vec![part("text/plain", Some(encode("nested")), vec![])],
                ),
                part("text/html", Some(encode("second")), vec![]),
            ],
        );
        assert_eq!(raw_body(&p).and_then(decode_transport).as_deref(), Some("nested"));
    }

    #[test]
    fn decodes_padded_and_standard_alphabet() {
        // "??>" encodes to "Pz8+" in the standard alphabet.
        assert_eq!(decode_transport("Pz8+").as_deref(), Some("??>"));
        assert_eq!(decode_transport("Pz8-").as_deref(), Some("??>"));
        assert_eq!(decode_transport("aGk=").as_deref(), Some("hi"));
        assert_eq!(decode_transport("aGk").as_deref(), Some("hi"));
        assert!(decode_transport("***").is_none());
    }

    #[test]
    fn normalizes_html() {
        let html = "<html><style>p { color: red; }</style><body><p>Order:&nbsp;<b>AB12CD34-56EF78-90AB1</b></p>\n\n<p>Tom &amp; Jerry&#39;s &#x41;</p></body></html>";
        assert_eq!(
            normalize_text(html),
            "Order: AB12CD34-56EF78-90AB1 Tom & Jerry's A"
        );
    }

    #[test]
    fn message_text_joins_body_and_snippet() {
        let msg = InboxMessage {
            id: "m1".into(),
            snippet: "Order: AB12CD34-56EF78-90AB1 has shipped".into(),
            payload: Some(part("text/html", Some(encode("<p>Thanks</p>")), vec![])),
        };
        assert_eq!(
            message_text(&msg),
            "Thanks Order: AB12CD34-56EF78-90AB1 has shipped"
        );

        let bare = InboxMessage {
            id: "m2".into(),
            snippet: "only snippet".into(),
            payload: None,
        };
        assert_eq!(message_text(&bare), "only snippet");
    }
}
