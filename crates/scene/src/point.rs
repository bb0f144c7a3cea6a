use foundation::LatLon;
use serde::{Deserialize, Serialize};

/// Text shown when a page's description could not be retrieved.
pub const NO_DESCRIPTION: &str = "No description available";

/// Longest preview text derived from a description, in characters.
pub const SHORT_TEXT_MAX_CHARS: usize = 160;

/// A geotagged point of interest from one geodata fetch.
///
/// Points are immutable once built; a later fetch replaces the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub title: String,
    #[serde(flatten)]
    pub position: LatLon,
    pub short_text: String,
    pub full_text: String,
    pub image_url: Option<String>,
}

impl Point {
    pub fn new(
        title: impl Into<String>,
        position: LatLon,
        full_text: impl Into<String>,
        image_url: Option<String>,
    ) -> Self {
        let full_text = full_text.into();
        Self {
            title: title.into(),
            position,
            short_text: short_text(&full_text),
            full_text,
            image_url,
        }
    }

    /// A point whose description lookup failed.
    pub fn without_detail(title: impl Into<String>, position: LatLon) -> Self {
        Self::new(title, position, NO_DESCRIPTION, None)
    }
}

/// Minimal stand-in for a referenced item missing from the current point set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderPoint {
    pub title: String,
    #[serde(flatten)]
    pub position: LatLon,
}

/// First sentence of an HTML or plain-text description, tags removed and
/// character references decoded.
pub fn short_text(full_text: &str) -> String {
    let mut plain = String::with_capacity(full_text.len());
    let mut in_tag = false;
    for ch in full_text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                plain.push(' ');
            }
            _ if !in_tag => plain.push(ch),
            _ => {}
        }
    }

    // Decoded after stripping so an escaped `&lt;` never opens a tag.
    let decoded = html_escape::decode_html_entities(&plain);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    let sentence = match collapsed.find(". ") {
        Some(end) => &collapsed[..=end],
        None => collapsed.as_str(),
    };

    if sentence.chars().count() <= SHORT_TEXT_MAX_CHARS {
        return sentence.to_string();
    }
    let mut cut: String = sentence.chars().take(SHORT_TEXT_MAX_CHARS - 1).collect();
    cut.push('…');
    cut
}
