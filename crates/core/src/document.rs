//! Source Documents
//!
//! A document is an identified unit of source text owned by the caller. Stage 1
//! of the coding pipeline attaches first-order codes to it; once attached they
//! are never recomputed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A short descriptive label (a handful of words) attached to one document.
pub type InitialCode = String;

/// An identified unit of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub full_text: String,
    /// First-order codes attached by initial coding.
    #[serde(default)]
    pub initial_codes: Vec<InitialCode>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, full_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            full_text: full_text.into(),
            initial_codes: Vec::new(),
        }
    }

    /// Whether initial coding has already produced codes for this document.
    pub fn is_coded(&self) -> bool {
        !self.initial_codes.is_empty()
    }

    pub fn has_text(&self) -> bool {
        !self.full_text.trim().is_empty()
    }
}

/// Coalesce codes by exact string equality, keeping first-seen order.
///
/// Blank codes are dropped.
pub fn dedupe_codes<'a, I>(codes: I) -> Vec<InitialCode>
where
    I: IntoIterator<Item = &'a InitialCode>,
{
    let mut seen = HashSet::new();
    codes
        .into_iter()
        .filter(|code| !code.trim().is_empty())
        .filter(|code| seen.insert(code.as_str()))
        .cloned()
        .collect()
}
