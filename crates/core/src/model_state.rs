//! Model State
//!
//! The accumulating record threaded through every pipeline stage. Stages never
//! mutate a shared `ModelState`; they return a [`ModelStateUpdate`] and the
//! orchestrator merges it into a new value, so a field is either untouched or
//! replaced wholesale.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::document::{Document, InitialCode};
use crate::error::{CoreError, CoreResult};

/// Theme name → first-order codes belonging to it.
pub type ThemeMap = BTreeMap<String, Vec<InitialCode>>;

/// Aggregate dimension name → theme names belonging to it.
pub type DimensionMap = BTreeMap<String, Vec<String>>;

/// A brainstormed explanatory construct linked to one or more dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Theory {
    #[serde(rename = "theory")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "relatedDimensions", default)]
    pub related_dimensions: Vec<String>,
    #[serde(rename = "possibleResearchQuestions", default)]
    pub research_questions: Vec<String>,
}

/// An ordered pair of concepts hypothesized to be related.
///
/// Serialized as a two-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptTuple(pub String, pub String);

impl ConceptTuple {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self(a.into(), b.into())
    }

    /// Free-text query used to retrieve evidence for this pair.
    pub fn as_query(&self) -> String {
        format!("{} and {}", self.0, self.1)
    }
}

impl std::fmt::Display for ConceptTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.0, self.1)
    }
}

/// Evidence-backed summary of how a concept pair relates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrelationship {
    pub concepts: ConceptTuple,
    pub summary: String,
    /// Chunk ids of the passages the summary was drawn from.
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Accumulated analysis for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelState {
    pub documents: Vec<Document>,
    pub query: Option<String>,
    pub remarks: Option<String>,
    pub research_questions: Vec<String>,
    /// Deduplicated union of every document's initial codes.
    pub first_order_codes: Vec<InitialCode>,
    pub theme_map: ThemeMap,
    pub dimension_map: DimensionMap,
    pub theories: Vec<Theory>,
    pub concept_tuples: Vec<ConceptTuple>,
    pub interrelationships: Vec<Interrelationship>,
    pub model_name: String,
    pub model_description: String,
    pub critique: String,
    pub diagram: String,
}

/// Partial update produced by a stage. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelStateUpdate {
    pub documents: Option<Vec<Document>>,
    pub query: Option<Option<String>>,
    pub remarks: Option<Option<String>>,
    pub research_questions: Option<Vec<String>>,
    pub first_order_codes: Option<Vec<InitialCode>>,
    pub theme_map: Option<ThemeMap>,
    pub dimension_map: Option<DimensionMap>,
    pub theories: Option<Vec<Theory>>,
    pub concept_tuples: Option<Vec<ConceptTuple>>,
    pub interrelationships: Option<Vec<Interrelationship>>,
    pub model_name: Option<String>,
    pub model_description: Option<String>,
    pub critique: Option<String>,
    pub diagram: Option<String>,
}

impl ModelStateUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl ModelState {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Default::default()
        }
    }

    /// Merge a partial update into a new state, leaving `self` untouched.
    pub fn merge(&self, update: ModelStateUpdate) -> ModelState {
        self.clone().apply(update)
    }

    /// Consume the state and apply a partial update.
    pub fn apply(mut self, update: ModelStateUpdate) -> ModelState {
        macro_rules! replace {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = update.$field {
                    self.$field = value;
                })*
            };
        }
        replace!(
            documents,
            query,
            remarks,
            research_questions,
            first_order_codes,
            theme_map,
            dimension_map,
            theories,
            concept_tuples,
            interrelationships,
            model_name,
            model_description,
            critique,
            diagram,
        );
        self
    }

    /// Vocabulary the diagram may reference: first-order codes, or theme
    /// names once the code set grows past `threshold`.
    pub fn diagram_vocabulary(&self, threshold: usize) -> Vec<String> {
        if self.first_order_codes.len() > threshold {
            self.theme_map.keys().cloned().collect()
        } else {
            self.first_order_codes.clone()
        }
    }

    /// Every label a diagram node or citation may legitimately draw on.
    pub fn code_vocabulary(&self) -> HashSet<&str> {
        self.first_order_codes
            .iter()
            .map(String::as_str)
            .chain(self.theme_map.keys().map(String::as_str))
            .collect()
    }

    /// Check the cross-stage reference invariants.
    pub fn validate(&self) -> CoreResult<()> {
        let codes: HashSet<&str> = self.first_order_codes.iter().map(String::as_str).collect();
        for (theme, members) in &self.theme_map {
            if let Some(unknown) = members.iter().find(|c| !codes.contains(c.as_str())) {
                return Err(CoreError::validation(format!(
                    "theme '{}' references unknown code '{}'",
                    theme, unknown
                )));
            }
        }
        for (dimension, themes) in &self.dimension_map {
            if let Some(unknown) = themes.iter().find(|t| !self.theme_map.contains_key(t.as_str())) {
                return Err(CoreError::validation(format!(
                    "dimension '{}' references unknown theme '{}'",
                    dimension, unknown
                )));
            }
        }
        Ok(())
    }
}

/// Keep only members found in `known`, dropping groups left empty.
pub fn restrict_members<'a, I>(map: BTreeMap<String, Vec<String>>, known: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let known: HashSet<&str> = known.into_iter().collect();
    map.into_iter()
        .filter_map(|(group, members)| {
            let mut seen = HashSet::new();
            let kept: Vec<String> = members
                .into_iter()
                .filter(|m| known.contains(m.as_str()) && seen.insert(m.clone()))
                .collect();
            (!kept.is_empty()).then_some((group, kept))
        })
        .collect()
}
