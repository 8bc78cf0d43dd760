//! Structured Output Parsing
//!
//! Tolerant extraction of JSON payloads and diagram sources from raw model
//! completions.

pub mod structured_output;

pub use structured_output::{
    extract_diagram, normalize_response, parse_or_default, parse_structured, record_list,
    string_list, string_map, strip_code_fences, ParseFailure,
};
