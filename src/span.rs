use serde::{Deserialize, Deserializer, Serialize};

/// A byte-offset range into a document's full text.
///
/// Layout backends routinely omit one or both offsets (a missing start means
/// "from the beginning", a missing end means "to the end of the text").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSpan {
    #[serde(default, deserialize_with = "deserialize_offset")]
    pub start_index: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_offset")]
    pub end_index: Option<usize>,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start_index: Some(start),
            end_index: Some(end),
        }
    }

    /// Resolve this span to a slice of `text`.
    ///
    /// Offsets past the end are clamped, an inverted range yields `""`, and an
    /// offset inside a multi-byte character moves down to its boundary.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        let len = text.len();
        let start = floor_char_boundary(text, self.start_index.unwrap_or(0).min(len));
        let end = floor_char_boundary(text, self.end_index.unwrap_or(len).min(len));
        if start >= end {
            return "";
        }
        &text[start..end]
    }
}

/// Join the slices of `spans` (in the given order) with single spaces and trim.
pub fn resolve_spans(spans: &[TextSpan], text: &str) -> String {
    spans
        .iter()
        .map(|span| span.slice(text))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

// Document AI serialises int64 offsets as JSON strings; accept both forms.
fn deserialize_offset<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Offset {
        Number(usize),
        Text(String),
    }

    match Option::<Offset>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Offset::Number(n)) => Ok(Some(n)),
        Some(Offset::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Offset::Text(s)) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
