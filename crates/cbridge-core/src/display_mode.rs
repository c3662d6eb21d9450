//! Display mode parsing and canonical mode selection.
//!
//! A host describes its display modes in a server-info document using
//! tag-delimited sections:
//!
//! ```text
//! <PrimaryDisplayMode><DisplayMode>...</DisplayMode></PrimaryDisplayMode>
//! <SupportedDisplayMode>
//!   <DisplayMode><Width>2560</Width><Height>1440</Height>
//!     <RefreshRate>120</RefreshRate><IsActive>1</IsActive></DisplayMode>
//!   ...
//! </SupportedDisplayMode>
//! ```
//!
//! Modes chosen by the user are stored in the compact `"<w>x<h>x<r>"` form.
//! [`first_active_display_mode`] resolves a document to exactly one mode:
//! the primary mode wins, then the first valid active supported mode, then
//! [`FALLBACK_DISPLAY_MODE`].

use serde::{Deserialize, Serialize};

const TAG_PRIMARY_SECTION: &str = "PrimaryDisplayMode";
const TAG_SUPPORTED_SECTION: &str = "SupportedDisplayMode";
const TAG_DISPLAY_MODE: &str = "DisplayMode";
const TAG_WIDTH: &str = "Width";
const TAG_HEIGHT: &str = "Height";
const TAG_REFRESH_RATE: &str = "RefreshRate";
const TAG_IS_ACTIVE: &str = "IsActive";

/// Marker value of `<IsActive>` for the active mode.
const ACTIVE_MARKER: &str = "1";

/// Mode used when a document yields nothing usable.
pub const FALLBACK_DISPLAY_MODE: DisplayMode = DisplayMode {
    width: Some(1920),
    height: Some(1080),
    refresh_rate: Some(60),
    is_active: true,
};

/// A single display mode as reported by a host.
///
/// Every field may be absent because the source documents are untrusted;
/// use [`DisplayMode::is_valid`] before relying on the dimensions.
///
/// The JSON form keeps the document's string values,
/// `{"Width":"1920","Height":"1080","RefreshRate":"60","IsActive":"1"}`.
/// Numbers and a boolean `IsActive` are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayMode {
    #[serde(rename = "Width", default, with = "text_field")]
    pub width: Option<i32>,
    #[serde(rename = "Height", default, with = "text_field")]
    pub height: Option<i32>,
    #[serde(rename = "RefreshRate", default, with = "text_field")]
    pub refresh_rate: Option<i32>,
    #[serde(rename = "IsActive", default, with = "active_marker")]
    pub is_active: bool,
}

/// A JSON scalar as found in stored modes.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Number(i64),
    Flag(bool),
}

mod text_field {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::RawScalar;

    pub fn serialize<S: Serializer>(value: &Option<i32>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
        Ok(match Option::<RawScalar>::deserialize(deserializer)? {
            Some(RawScalar::Text(text)) => text.trim().parse().ok(),
            Some(RawScalar::Number(n)) => i32::try_from(n).ok(),
            Some(RawScalar::Flag(_)) | None => None,
        })
    }
}

mod active_marker {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{RawScalar, ACTIVE_MARKER};

    pub fn serialize<S: Serializer>(active: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *active { ACTIVE_MARKER } else { "0" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Option::<RawScalar>::deserialize(deserializer)? {
            Some(RawScalar::Text(text)) => text.trim() == ACTIVE_MARKER,
            Some(RawScalar::Number(n)) => n == 1,
            Some(RawScalar::Flag(flag)) => flag,
            None => false,
        })
    }
}

impl DisplayMode {
    /// Create an inactive mode with all three dimensions present.
    pub fn new(width: i32, height: i32, refresh_rate: i32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            refresh_rate: Some(refresh_rate),
            is_active: false,
        }
    }

    /// True when width and height are both present and positive.
    pub fn is_valid(&self) -> bool {
        matches!((self.width, self.height), (Some(w), Some(h)) if w > 0 && h > 0)
    }

    /// Copy of this mode marked active.
    pub fn forced_active(&self) -> Self {
        Self {
            is_active: true,
            ..*self
        }
    }

    /// Parse the compact `"<width>x<height>x<refresh>"` form.
    ///
    /// Returns `None` unless all three parts are positive integers.
    pub fn parse_compact(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('x');
        let width = parse_positive(parts.next()?)?;
        let height = parse_positive(parts.next()?)?;
        let refresh_rate = parse_positive(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(width, height, refresh_rate))
    }

    /// Compact `"<width>x<height>x<refresh>"` form, or `None` when any of the
    /// three values is missing.
    pub fn to_compact(&self) -> Option<String> {
        match (self.width, self.height, self.refresh_rate) {
            (Some(w), Some(h), Some(r)) => Some(format!("{w}x{h}x{r}")),
            _ => None,
        }
    }

    /// Parse a single `<DisplayMode>` body. Missing or non-numeric tags
    /// leave the corresponding field absent.
    pub fn parse_tagged(fragment: &str) -> Self {
        let int_tag = |tag: &str| {
            tag_body(fragment, 0, tag).and_then(|(body, _)| body.trim().parse::<i32>().ok())
        };
        Self {
            width: int_tag(TAG_WIDTH),
            height: int_tag(TAG_HEIGHT),
            refresh_rate: int_tag(TAG_REFRESH_RATE),
            is_active: tag_body(fragment, 0, TAG_IS_ACTIVE)
                .is_some_and(|(body, _)| body.trim() == ACTIVE_MARKER),
        }
    }

    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: Option<i32>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
        write!(
            f,
            "{}x{}@{}Hz{}",
            show(self.width),
            show(self.height),
            show(self.refresh_rate),
            if self.is_active { " (active)" } else { "" }
        )
    }
}

fn parse_positive(part: &str) -> Option<i32> {
    part.parse::<i32>().ok().filter(|v| *v > 0)
}

/// Find the body of the first `<tag>...</tag>` at or after `offset`.
///
/// Returns the body and the offset just past the closing tag, or `None` when
/// either tag is missing.
fn tag_body<'a>(text: &'a str, offset: usize, tag: &str) -> Option<(&'a str, usize)> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = offset + text.get(offset..)?.find(&open)?;
    let body_start = start + open.len();
    let end = body_start + text[body_start..].find(&close)?;
    Some((&text[body_start..end], end + close.len()))
}

/// The mode declared in the `PrimaryDisplayMode` section, forced active.
pub fn primary_display_mode(document: &str) -> Option<DisplayMode> {
    let (section, _) = tag_body(document, 0, TAG_PRIMARY_SECTION)?;
    let (mode, _) = tag_body(section, 0, TAG_DISPLAY_MODE)?;
    Some(DisplayMode::parse_tagged(mode).forced_active())
}

/// All modes of the `SupportedDisplayMode` section, in document order.
pub fn supported_display_modes(document: &str) -> Vec<DisplayMode> {
    let Some((section, _)) = tag_body(document, 0, TAG_SUPPORTED_SECTION) else {
        return Vec::new();
    };

    let mut modes = Vec::new();
    let mut offset = 0;
    while let Some((mode, next)) = tag_body(section, offset, TAG_DISPLAY_MODE) {
        modes.push(DisplayMode::parse_tagged(mode));
        offset = next;
    }
    modes
}

/// Resolve a server-info document to the canonical active mode.
///
/// Never fails: malformed or empty documents degrade to
/// [`FALLBACK_DISPLAY_MODE`].
pub fn first_active_display_mode(document: &str) -> DisplayMode {
    primary_display_mode(document)
        .or_else(|| {
            supported_display_modes(document)
                .into_iter()
                .find(|mode| mode.is_valid() && mode.is_active)
        })
        .unwrap_or(FALLBACK_DISPLAY_MODE)
}
