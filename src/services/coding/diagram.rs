//! Flowchart Diagrams
//!
//! Minimal reader for the Mermaid flowchart subset the diagram stage asks
//! for: a `flowchart`/`graph` header, nodes with `<br>'excerpt'` citations,
//! and edges in four strengths.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiagramError {
    #[error("diagram source is empty")]
    Empty,
    #[error("expected a flowchart header, found '{0}'")]
    MissingHeader(String),
    #[error("unknown flowchart direction '{0}'")]
    InvalidDirection(String),
}

const DIRECTIONS: [&str; 5] = ["TB", "TD", "BT", "RL", "LR"];

/// Strength of an edge, by its arrow token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStrength {
    /// `==>`
    Strong,
    /// `-->`
    Weak,
    /// `-.->`
    Moderation,
    /// `---`
    Correlation,
}

impl EdgeStrength {
    const TOKENS: [(&'static str, EdgeStrength); 4] = [
        ("-.->", EdgeStrength::Moderation),
        ("==>", EdgeStrength::Strong),
        ("-->", EdgeStrength::Weak),
        ("---", EdgeStrength::Correlation),
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Self::Strong => "==>",
            Self::Weak => "-->",
            Self::Moderation => "-.->",
            Self::Correlation => "---",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagramNode {
    pub id: String,
    pub label: String,
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagramEdge {
    pub from: String,
    pub to: String,
    pub strength: EdgeStrength,
    pub label: Option<String>,
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowchartDiagram {
    pub direction: String,
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
}

impl FlowchartDiagram {
    pub fn parse(source: &str) -> Result<Self, DiagramError> {
        let mut lines = source
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("%%"));

        let header = lines.next().ok_or(DiagramError::Empty)?;
        let mut words = header.split_whitespace();
        let direction = match words.next() {
            Some("flowchart") | Some("graph") => words.next().unwrap_or("TD").to_string(),
            _ => return Err(DiagramError::MissingHeader(header.to_string())),
        };
        if !DIRECTIONS.contains(&direction.as_str()) {
            return Err(DiagramError::InvalidDirection(direction));
        }

        let mut diagram = FlowchartDiagram {
            direction,
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        for line in lines {
            let line = line.trim_end_matches(';');
            if let Some((left, strength, label, right)) = split_edge(line) {
                let (Some(from), Some(to)) = (diagram.node_ref(left), diagram.node_ref(right))
                else {
                    continue;
                };
                let (label, citations) = match label {
                    Some(raw) => {
                        let (text, citations) = split_label(raw);
                        (Some(text).filter(|t| !t.is_empty()), citations)
                    }
                    None => (None, Vec::new()),
                };
                diagram.edges.push(DiagramEdge {
                    from,
                    to,
                    strength,
                    label,
                    citations,
                });
            } else if line.contains(['[', '(', '{']) {
                diagram.node_ref(line);
            }
        }
        Ok(diagram)
    }

    pub fn node(&self, id: &str) -> Option<&DiagramNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Every citation on nodes and edges, in reading order.
    pub fn citations(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .flat_map(|n| n.citations.iter())
            .chain(self.edges.iter().flat_map(|e| e.citations.iter()))
            .map(String::as_str)
    }

    /// Citations that are not drawn from `vocabulary`.
    pub fn unknown_citations<'a>(&'a self, vocabulary: &HashSet<&str>) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        self.citations()
            .filter(|c| !vocabulary.contains(c) && seen.insert(*c))
            .collect()
    }

    /// Register the node written in `text` (`A`, `A[Label]`, ...) and return its id.
    fn node_ref(&mut self, text: &str) -> Option<String> {
        let text = text.trim();
        let id_len = text
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(text.len());
        let id = &text[..id_len];
        if id.is_empty() {
            return None;
        }
        let label = shape_body(&text[id_len..]).map(split_label);

        match (self.nodes.iter_mut().find(|n| n.id == id), label) {
            (Some(node), Some((label, citations))) => {
                node.label = label;
                node.citations = citations;
            }
            (Some(_), None) => {}
            (None, label) => {
                let (label, citations) = label.unwrap_or_else(|| (id.to_string(), Vec::new()));
                self.nodes.push(DiagramNode {
                    id: id.to_string(),
                    label,
                    citations,
                });
            }
        }
        Some(id.to_string())
    }
}

/// `left`, strength, optional `|label|`, `right`.
fn split_edge(line: &str) -> Option<(&str, EdgeStrength, Option<&str>, &str)> {
    let (index, token, strength) = EdgeStrength::TOKENS
        .iter()
        .filter_map(|(token, strength)| line.find(token).map(|i| (i, *token, *strength)))
        .min_by_key(|(i, _, _)| *i)?;

    let left = &line[..index];
    let mut rest = line[index + token.len()..].trim_start();
    let mut label = None;
    if let Some(after) = rest.strip_prefix('|') {
        let end = after.find('|')?;
        label = Some(&after[..end]);
        rest = &after[end + 1..];
    }
    Some((left, strength, label, rest))
}

/// Text inside the node shape brackets, if any.
fn shape_body(shape: &str) -> Option<&str> {
    let shape = shape.trim();
    let close = match shape.chars().next()? {
        '[' => ']',
        '(' => ')',
        '{' => '}',
        _ => return None,
    };
    Some(shape.trim_start_matches(['[', '(', '{']).trim_end_matches(close))
}

/// Split `Label<br>'excerpt'<br>'excerpt'` into the label and its citations.
fn split_label(raw: &str) -> (String, Vec<String>) {
    let mut label = Vec::new();
    let mut citations = Vec::new();
    for part in raw
        .split("<br>")
        .flat_map(|p| p.split("<br/>"))
        .map(|p| p.trim().trim_matches('"').trim())
        .filter(|p| !p.is_empty())
    {
        let quoted = part.len() >= 2 && part.starts_with('\'') && part.ends_with('\'');
        if quoted {
            citations.push(part[1..part.len() - 1].trim().to_string());
        } else {
            label.push(part);
        }
    }
    (label.join(" "), citations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "flowchart TD\n  %% Nodes\n  A[Organizational Culture<br>'shared values'<br>'rituals']\n  B[Leadership Style]\n  C[Employee Satisfaction]\n\n  %% Relationships\n  A --> B\n  B ==>|Directly Influences<br>'coaching'| C\n  A -.->|Moderates| C\n  C --- D[Productivity]";

    #[test]
    fn parses_header_nodes_and_edges() {
        let diagram = FlowchartDiagram::parse(SAMPLE).unwrap();
        assert_eq!(diagram.direction, "TD");
        assert_eq!(diagram.nodes.len(), 4);
        let culture = diagram.node("A").unwrap();
        assert_eq!(culture.label, "Organizational Culture");
        assert_eq!(culture.citations, vec!["shared values", "rituals"]);
        assert_eq!(diagram.node("D").unwrap().label, "Productivity");

        let strengths: Vec<EdgeStrength> = diagram.edges.iter().map(|e| e.strength).collect();
        assert_eq!(
            strengths,
            vec![
                EdgeStrength::Weak,
                EdgeStrength::Strong,
                EdgeStrength::Moderation,
                EdgeStrength::Correlation
            ]
        );
        let strong = &diagram.edges[1];
        assert_eq!(strong.label.as_deref(), Some("Directly Influences"));
        assert_eq!(strong.citations, vec!["coaching"]);
        assert_eq!(diagram.edges[0].label, None);
    }

    #[test]
    fn graph_header_is_accepted() {
        let diagram = FlowchartDiagram::parse("graph LR\nX --> Y").unwrap();
        assert_eq!(diagram.direction, "LR");
        assert_eq!(diagram.edges.len(), 1);
        assert_eq!(diagram.node("Y").unwrap().label, "Y");
    }

    #[test]
    fn rejects_non_diagrams() {
        assert_eq!(FlowchartDiagram::parse("  \n"), Err(DiagramError::Empty));
        assert!(matches!(
            FlowchartDiagram::parse("Here is your diagram:"),
            Err(DiagramError::MissingHeader(_))
        ));
    }

    #[test]
    fn rejects_unknown_direction() {
        assert_eq!(
            FlowchartDiagram::parse("flowchart diagram you asked for:\nA ==> B"),
            Err(DiagramError::InvalidDirection("diagram".to_string()))
        );
        assert_eq!(FlowchartDiagram::parse("graph\nA --> B").unwrap().direction, "TD");
    }

    #[test]
    fn unknown_citations_are_reported_once() {
        let diagram = FlowchartDiagram::parse(SAMPLE).unwrap();
        let vocabulary: HashSet<&str> = ["shared values", "coaching"].into_iter().collect();
        assert_eq!(diagram.unknown_citations(&vocabulary), vec!["rituals"]);
    }

    #[test]
    fn strength_tokens_round_trip() {
        for (token, strength) in EdgeStrength::TOKENS {
            assert_eq!(strength.token(), token);
        }
    }
}
