//! The built-in deterministic token extractor.
//!
//! Identifier-shaped runs are collected from UTF-8 text, optionally split
//! into compound parts, lowercased, and counted. Function-scoped extraction
//! uses a line heuristic over common definition keywords; it is a stand-in
//! for a syntax-aware extractor behind the same trait.

use std::collections::BTreeMap;

use crate::config::{ExtractConfig, ExtractError};
use crate::{Feature, FeatureExtractor, FunctionFeatures};

/// Keywords that open a function definition in the line heuristic.
const FUNCTION_KEYWORDS: &[&str] = &["fn", "def", "function", "func"];

/// Qualifiers that may precede a definition keyword and are skipped over.
const QUALIFIERS: &[&str] = &["pub", "async", "unsafe", "static", "export", "public", "private"];

/// Deterministic identifier-based extractor.
pub struct TokenExtractor {
    cfg: ExtractConfig,
}

impl TokenExtractor {
    pub fn new(cfg: ExtractConfig) -> Result<Self, ExtractError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    fn features_of(&self, text: &str) -> Vec<Feature> {
        // BTreeMap keeps the emitted feature order stable across runs.
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for ident in identifiers(text) {
            if self.cfg.split_compound {
                for part in split_compound(ident) {
                    if part.len() >= self.cfg.min_token_len {
                        *counts.entry(part.to_lowercase()).or_insert(0) += 1;
                    }
                }
            }
            if ident.len() >= self.cfg.min_token_len {
                *counts.entry(ident.to_lowercase()).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .map(|(token, weight)| Feature { token, weight })
            .collect()
    }
}

impl FeatureExtractor for TokenExtractor {
    fn extract_file(&self, bytes: &[u8]) -> Result<Vec<Feature>, ExtractError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ExtractError::Skipped("invalid utf-8".to_string()))?;
        Ok(self.features_of(text))
    }

    fn extract_functions(&self, bytes: &[u8]) -> Result<Vec<FunctionFeatures>, ExtractError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ExtractError::Skipped("invalid utf-8".to_string()))?;

        let lines: Vec<&str> = text.lines().collect();
        let mut heads: Vec<(usize, String)> = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if let Some(name) = function_name(line) {
                heads.push((i, name));
            }
        }

        let mut out = Vec::with_capacity(heads.len());
        for (slot, (start, name)) in heads.iter().enumerate() {
            let end = heads
                .get(slot + 1)
                .map(|(next, _)| *next)
                .unwrap_or(lines.len());
            let body = lines[*start..end].join("\n");
            let features = self.features_of(&body);
            out.push(FunctionFeatures {
                name: name.clone(),
                line: (*start + 1) as u32,
                text: body,
                features,
            });
        }
        Ok(out)
    }
}

/// Iterate identifier-shaped runs: `[A-Za-z_][A-Za-z0-9_]*`.
fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        loop {
            let start = rest
                .char_indices()
                .find(|(_, c)| c.is_ascii_alphabetic() || *c == '_')?
                .0;
            let after = &rest[start..];
            let len = after
                .char_indices()
                .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            let ident = &after[..len];
            rest = &after[len..];
            if !ident.is_empty() {
                return Some(ident);
            }
        }
    })
}

/// Split a compound identifier into snake and camel parts.
///
/// `parse_requestBody` → `["parse", "request", "Body"]`. Parts are returned
/// in their original case; callers normalize.
fn split_compound(ident: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    for chunk in ident.split('_').filter(|c| !c.is_empty()) {
        let mut start = 0;
        let bytes = chunk.as_bytes();
        for i in 1..bytes.len() {
            // A hump starts at a lower→upper boundary.
            if bytes[i].is_ascii_uppercase() && bytes[i - 1].is_ascii_lowercase() {
                parts.push(&chunk[start..i]);
                start = i;
            }
        }
        parts.push(&chunk[start..]);
    }
    // A simple identifier splits into itself; callers already emit the whole
    // identifier, so suppress the duplicate.
    if parts.len() == 1 && parts[0] == ident {
        parts.clear();
    }
    parts
}

/// Recognize a function definition line and return the function's name.
fn function_name(line: &str) -> Option<String> {
    let mut words = line.split_whitespace().peekable();
    // Skip leading qualifiers such as `pub` or `async`.
    while let Some(word) = words.peek() {
        if QUALIFIERS.contains(word) {
            words.next();
        } else {
            break;
        }
    }
    let keyword = words.next()?;
    if !FUNCTION_KEYWORDS.contains(&keyword) {
        return None;
    }
    let rest = words.next()?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
