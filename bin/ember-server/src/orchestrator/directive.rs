//! Routing of a user turn to the text or the image branch.

/// Marker that turns a user turn into an image request. Matched
/// case-insensitively anywhere in the text.
pub const IMAGE_DIRECTIVE: &str = "/imagine";

/// Prompt used when nothing but the directive was typed.
pub const DEFAULT_IMAGE_PROMPT: &str = "a surprising and beautiful picture";

/// Which generation call a turn needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Branch {
    Text,
    Image { prompt: String },
}

impl Branch {
    pub fn name(&self) -> &'static str {
        match self {
            Branch::Text => "text",
            Branch::Image { .. } => "image",
        }
    }
}

/// Classify the triggering text of a turn.
pub fn classify(text: &str) -> Branch {
    if find_directive(text, 0).is_none() {
        return Branch::Text;
    }
    let prompt = strip_directive(text);
    Branch::Image {
        prompt: if prompt.is_empty() { DEFAULT_IMAGE_PROMPT.to_owned() } else { prompt },
    }
}

/// Remove every occurrence of the directive and normalise whitespace.
fn strip_directive(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(at) = find_directive(text, cursor) {
        out.push_str(&text[cursor..at]);
        out.push(' ');
        cursor = at + IMAGE_DIRECTIVE.len();
    }
    out.push_str(&text[cursor..]);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

// The directive is ASCII, so a match always starts and ends on a char boundary.
fn find_directive(text: &str, from: usize) -> Option<usize> {
    let needle = IMAGE_DIRECTIVE.as_bytes();
    let hay = text.as_bytes();
    if hay.len() < needle.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
