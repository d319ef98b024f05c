//! Content negotiation: Accept header parsing and content token mapping

use std::fmt;

/// Media type assumed when a request does not state any preference.
pub const ANY_CONTENT_TYPE: &str = "*/*";

/// Short token identifying a family of representations a handler can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentToken {
    Html,
    Json,
    Xml,
    Image,
    All,
}

impl ContentToken {
    /// Maps a media type onto its token.
    pub fn for_media_type(media_type: &str) -> Result<Self, UnsupportedContentType> {
        match media_type {
            "text/html" => Ok(ContentToken::Html),
            "application/json" | "text/json" => Ok(ContentToken::Json),
            "application/xml" | "text/xml" => Ok(ContentToken::Xml),
            "image/png" | "image/jpeg" | "image/*" => Ok(ContentToken::Image),
            "*/*" => Ok(ContentToken::All),
            other => Err(UnsupportedContentType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentToken::Html => "html",
            ContentToken::Json => "json",
            ContentToken::Xml => "xml",
            ContentToken::Image => "image",
            ContentToken::All => "all",
        }
    }
}

impl fmt::Display for ContentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Content type '{0}' is not supported")]
pub struct UnsupportedContentType(pub String);

/// A media type the client accepts, with its quality weight.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedType {
    pub media_type: String,
    pub quality: f32,
}

/// Parses an Accept header into media types sorted by preference.
///
/// Whitespace is dropped and the header is lower-cased. Entries without a
/// `;q=` weight default to 1. Equal weights keep their left-to-right order,
/// and a repeated media type keeps its first position with its last weight.
/// Tokens that do not look like media types are kept as they are; rejecting
/// them is left to [`ContentToken::for_media_type`].
pub fn parse_accept_header(header: Option<&str>) -> Vec<AcceptedType> {
    let normalized: String = header
        .filter(|h| !h.trim().is_empty())
        .unwrap_or(ANY_CONTENT_TYPE)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    let mut accepted: Vec<AcceptedType> = Vec::new();
    for item in normalized.split(',').filter(|item| !item.is_empty()) {
        let (media_type, quality) = match item.split_once(";q=") {
            Some((media_type, quality)) => (media_type, quality.parse::<f32>().unwrap_or(0.0)),
            None => (item, 1.0),
        };

        match accepted.iter_mut().find(|a| a.media_type == media_type) {
            Some(existing) => existing.quality = quality,
            None => accepted.push(AcceptedType {
                media_type: media_type.to_string(),
                quality,
            }),
        }
    }

    // Vec::sort_by is stable, which keeps declaration order among ties.
    accepted.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    accepted
}
