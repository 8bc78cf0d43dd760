//! Structured Output Integration Tests
//!
//! Tolerant parsing of model answers, diagram extraction, chunking and
//! bounded fan-out as seen from outside the crate.

use std::time::Duration;

use theory_cascade::services::batch::map_bounded_infallible;
use theory_cascade::services::coding::{EdgeStrength, FlowchartDiagram};
use theory_cascade::services::knowledge::TextChunker;
use theory_cascade::services::parsing::{extract_diagram, string_list, string_map};
use theory_cascade::services::analysis::DIAGRAM_KEYWORD;

// ============================================================================
// Parser
// ============================================================================

#[test]
fn test_fenced_json_after_preamble() {
    let raw = "Sure! ```json\n{\"codes\":[\"a\",\"b\"]}\n```";
    assert_eq!(string_list(raw, "codes"), vec!["a", "b"]);
}

#[test]
fn test_non_json_yields_empty_defaults() {
    assert!(string_list("not json at all", "codes").is_empty());
    assert!(string_map("not json at all", "themes").is_empty());
}

#[test]
fn test_theme_map_parses_members() {
    let raw = "```json\n{\"Trust\": [\"peer trust\", \"manager trust\"], \"Autonomy\": [\"flexible hours\"]}\n```";
    let map = string_map(raw, "themes");
    assert_eq!(map.len(), 2);
    assert_eq!(map["Trust"], vec!["peer trust", "manager trust"]);
}

// ============================================================================
// Diagrams
// ============================================================================

#[test]
fn test_diagram_preamble_is_discarded() {
    let raw = "Of course! Here is the model:\n```mermaid\nflowchart LR\n  A[Trust] ==> B[Autonomy]\n  A --- C[Climate]\n```\n";
    let source = extract_diagram(raw, DIAGRAM_KEYWORD);
    assert!(source.starts_with("flowchart LR"));
    assert!(!source.contains("```"));

    let diagram = FlowchartDiagram::parse(&source).unwrap();
    assert_eq!(diagram.edges[0].strength, EdgeStrength::Strong);
    assert_eq!(diagram.edges[1].strength, EdgeStrength::Correlation);
    assert_eq!(diagram.node("C").unwrap().label, "Climate");
}

#[test]
fn test_prose_without_diagram_is_rejected_by_reader() {
    let source = extract_diagram("No diagram today.", DIAGRAM_KEYWORD);
    assert_eq!(source, "No diagram today.");
    assert!(FlowchartDiagram::parse(&source).is_err());
}

#[test]
fn test_graph_header_survives_extraction() {
    let raw = "```mermaid\ngraph TD\n  A[Trust] ==> B[Autonomy]\n```";
    let diagram = FlowchartDiagram::parse(&extract_diagram(raw, DIAGRAM_KEYWORD)).unwrap();
    assert_eq!(diagram.direction, "TD");
    assert_eq!(diagram.edges.len(), 1);
}

// ============================================================================
// Chunking and fan-out
// ============================================================================

#[test]
fn test_chunks_reassemble_the_input() {
    let text: String = ('a'..='z').cycle().take(250).collect();
    let chunks: Vec<&str> = TextChunker::new(100, 0).chunks(&text).collect();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks.concat(), text);
}

#[tokio::test]
async fn test_fan_out_preserves_input_order() {
    let inputs = vec![("a", 30u64), ("b", 15), ("c", 0)];
    let results = map_bounded_infallible(inputs, 2, |_, (name, delay)| async move {
        tokio::time::sleep(Duration::from_millis(delay)).await;
        format!("f({})", name)
    })
    .await;
    assert_eq!(results, vec!["f(a)", "f(b)", "f(c)"]);
}
