//! Text example grammar.
//!
//! Parses the compact line format examples arrive in:
//!
//! ```text
//! [label] |namespace token[:value] token[:value] ... |namespace ...
//! ```
//!
//! * The optional label is a single float before the first `|`.
//! * A namespace runs from `|` to the next whitespace. A `|` followed
//!   directly by whitespace selects the unnamed default namespace.
//! * A feature token carries an explicit value after its last `:` when the
//!   part after that colon parses as a float; otherwise the colon is part
//!   of the feature name and the value defaults to `1.0`. A trailing bare
//!   colon (`token:`) is malformed.
//!
//! Parsing is purely lexical. Nothing here hashes, allocates store records,
//! or looks at engine configuration; the output is handed to the lifecycle
//! layer, which owns the hashing step.

use crate::error::{HopperError, Result};

/// One feature token, pre-hash.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedFeature {
    pub token: String,
    pub value: f32,
}

/// One namespace segment, pre-hash.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedSpace {
    /// Full namespace text; empty for the default namespace. The hash
    /// seed covers the whole name, while the interchange layout carries
    /// only [`short_name`](Self::short_name).
    pub name: String,
    pub features: Vec<ParsedFeature>,
}

impl ParsedSpace {
    /// Single-character namespace identifier: the first character of the
    /// name, or `' '` for the default namespace.
    pub fn short_name(&self) -> char {
        self.name.chars().next().unwrap_or(' ')
    }
}

/// A fully tokenized example line.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedExample {
    pub label: Option<f32>,
    pub spaces: Vec<ParsedSpace>,
}

/// Tokenize one example line.
///
/// Errors are all [`HopperError::MalformedExample`]: a line with no `|`
/// delimiter, a non-numeric label, extra tokens in the label section, or
/// a feature with a dangling `:`.
pub fn parse_text_example(text: &str) -> Result<ParsedExample> {
    let first_bar = text.find('|').ok_or_else(|| {
        HopperError::MalformedExample(format!("no '|' delimiter in {:?}", text))
    })?;

    let label = parse_label(&text[..first_bar])?;

    let mut spaces = Vec::new();
    for segment in text[first_bar + 1..].split('|') {
        let (name, body) = split_namespace(segment);
        let mut features = Vec::new();
        for raw in body.split_whitespace() {
            features.push(parse_feature(raw)?);
        }
        spaces.push(ParsedSpace {
            name: name.to_string(),
            features,
        });
    }

    Ok(ParsedExample { label, spaces })
}

/// Split a `|`-delimited segment into namespace text and feature body.
fn split_namespace(segment: &str) -> (&str, &str) {
    match segment.char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((0, _)) => ("", segment),
        Some((at, _)) => (&segment[..at], &segment[at..]),
        None => (segment, ""),
    }
}

fn parse_label(section: &str) -> Result<Option<f32>> {
    let mut tokens = section.split_whitespace();
    let Some(token) = tokens.next() else {
        return Ok(None);
    };
    if tokens.next().is_some() {
        return Err(HopperError::MalformedExample(format!(
            "label section {:?} has more than one token",
            section.trim()
        )));
    }
    token
        .parse::<f32>()
        .map(Some)
        .map_err(|_| HopperError::MalformedExample(format!("label {:?} is not a number", token)))
}

fn parse_feature(raw: &str) -> Result<ParsedFeature> {
    if let Some(at) = raw.rfind(':') {
        let (token, suffix) = (&raw[..at], &raw[at + 1..]);
        if suffix.is_empty() {
            return Err(HopperError::MalformedExample(format!(
                "feature {:?} has a separator but no value",
                raw
            )));
        }
        if let Ok(value) = suffix.parse::<f32>() {
            return Ok(ParsedFeature {
                token: token.to_string(),
                value,
            });
        }
    }
    Ok(ParsedFeature {
        token: raw.to_string(),
        value: 1.0,
    })
}
