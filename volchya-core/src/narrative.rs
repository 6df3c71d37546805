//! Narrative parser.
//!
//! Splits a raw model reply into display segments, one line at a time.
//! Parsing is purely syntactic and never fails: anything that does not
//! match a marker from [`crate::format`] is narration.

use crate::format::{
    DIALOGUE_SEPARATOR, HEADER_FENCE, HEADER_SEPARATOR, MONOLOGUE_DELIMITERS, TURN_TAG,
};
use serde::Serialize;

/// One classified line of a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NarrativeSegment {
    /// The per-turn HUD line.
    Header(TurnMeta),
    /// A spoken line attributed to a speaker.
    Dialogue { speaker: String, line: String },
    /// Internal monologue, delimiters removed.
    Monologue { text: String },
    /// Everything else.
    Narration { text: String },
}

/// Fields of a turn header. Every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnMeta {
    /// The header text without its fence.
    pub raw: String,
    pub turn: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub season: Option<String>,
    pub weather: Option<String>,
    pub location: Option<String>,
}

impl TurnMeta {
    /// The turn index, when the model wrote a number rather than `?`.
    pub fn turn_number(&self) -> Option<u32> {
        self.turn.as_deref().and_then(|t| t.parse().ok())
    }
}

/// Parse a reply into segments, dropping empty lines.
pub fn parse(raw: &str) -> Vec<NarrativeSegment> {
    raw.lines().filter_map(classify_line).collect()
}

/// Parse a reply into paragraphs of segments.
///
/// Blank lines separate paragraphs; runs of blank lines count as one break.
pub fn parse_paragraphs(raw: &str) -> Vec<Vec<NarrativeSegment>> {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();

    for line in raw.lines() {
        match classify_line(line) {
            Some(segment) => current.push(segment),
            None if !current.is_empty() => paragraphs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

/// Classify a single line. Returns `None` for blank lines.
pub fn classify_line(line: &str) -> Option<NarrativeSegment> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(meta) = parse_header(line) {
        return Some(NarrativeSegment::Header(meta));
    }

    if let Some(text) = parse_monologue(line) {
        return Some(NarrativeSegment::Monologue { text });
    }

    if let Some((speaker, spoken)) = parse_dialogue(line) {
        return Some(NarrativeSegment::Dialogue {
            speaker,
            line: spoken,
        });
    }

    Some(NarrativeSegment::Narration {
        text: line.to_string(),
    })
}

fn parse_header(line: &str) -> Option<TurnMeta> {
    let fenced = line.len() >= 2 && line.starts_with(HEADER_FENCE) && line.ends_with(HEADER_FENCE);
    let inner = line.trim_matches(HEADER_FENCE).trim();
    if inner.is_empty() {
        return None;
    }

    // Models sometimes fall back to the ASCII bar; accept it only when the
    // line opens with a turn tag so ordinary dialogue is not swallowed.
    for separator in [HEADER_SEPARATOR, DIALOGUE_SEPARATOR] {
        let fields: Vec<&str> = inner.split(separator).map(str::trim).collect();
        if fields.len() >= 2 && is_turn_tag(fields[0]) {
            let turn = fields[0][TURN_TAG.len_utf8()..].to_string();
            return Some(turn_meta(inner, Some(turn), &fields[1..]));
        }
    }

    if fenced {
        let fields: Vec<&str> = inner.split(HEADER_SEPARATOR).map(str::trim).collect();
        return Some(turn_meta(inner, None, &fields));
    }

    None
}

fn is_turn_tag(field: &str) -> bool {
    let Some(rest) = field.strip_prefix(TURN_TAG) else {
        return false;
    };
    rest == "?" || (!rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn turn_meta(raw: &str, turn: Option<String>, fields: &[&str]) -> TurnMeta {
    let field = |index: usize| {
        fields
            .get(index)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string())
    };

    TurnMeta {
        raw: raw.to_string(),
        turn,
        date: field(0),
        time: field(1),
        season: field(2),
        weather: field(3),
        location: field(4),
    }
}

fn parse_monologue(line: &str) -> Option<String> {
    for (open, close) in MONOLOGUE_DELIMITERS {
        if line.len() <= open.len() + close.len() {
            continue;
        }
        // A doubled marker is bold/underline, not a monologue wrapper.
        let doubled = format!("{open}{open}");
        if line.starts_with(&doubled) {
            continue;
        }
        if let Some(inner) = line
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            let inner = inner.trim();
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    None
}

fn parse_dialogue(line: &str) -> Option<(String, String)> {
    let (speaker, spoken) = line.split_once(DIALOGUE_SEPARATOR)?;
    let speaker = strip_bold(speaker.trim());
    if speaker.is_empty() {
        return None;
    }
    let spoken = strip_bold(spoken.trim());
    Some((speaker.to_string(), spoken.to_string()))
}

/// Remove `**` markers hugging either end, as in `**Volk |** "..."`.
fn strip_bold(text: &str) -> &str {
    let text = text.strip_prefix("**").unwrap_or(text);
    let text = text.strip_suffix("**").unwrap_or(text);
    text.trim()
}
