//! JSON-schema tool definitions advertised to the agent.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ToolKind;

/// Provider-neutral function definition. Agent clients wrap it in whatever
/// envelope their wire format needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn for_kind(kind: ToolKind) -> Self {
        let (description, parameters) = match kind {
            ToolKind::ListFiles => (
                "List all files (recursively) under a directory of the project. Paths are relative to the project root.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Relative directory to list (default: '.')"}
                    },
                    "required": []
                }),
            ),
            ToolKind::ReadFile => (
                "Read the contents of a text file. Counts against the file read quota.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Relative path to the file"}
                    },
                    "required": ["path"]
                }),
            ),
            ToolKind::ReadImage => (
                "Load an image (png, jpeg, gif, webp) so you can look at it. Counts against the file read quota.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Relative path to the image"}
                    },
                    "required": ["path"]
                }),
            ),
            ToolKind::ReadPage => (
                "Render one page of a PDF document as an image so you can look at it. Counts against the file read quota.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Relative path to the PDF"},
                        "page": {"type": "integer", "minimum": 1, "description": "1-based page number (default: 1)"},
                        "dpi": {"type": "integer", "minimum": 36, "maximum": 600, "description": "Render resolution (default: 150)"}
                    },
                    "required": ["path"]
                }),
            ),
            ToolKind::SearchIndex => (
                "Look up a term in the precomputed search index (case-insensitive exact term match).",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Search term"}
                    },
                    "required": ["query"]
                }),
            ),
            ToolKind::QueryGraph => (
                "Query the precomputed semantic graph for nodes, edges, or the neighbors of a node.",
                json!({
                    "type": "object",
                    "properties": {
                        "query_type": {"type": "string", "enum": ["nodes", "edges", "neighbors"], "description": "What to return (default: nodes)"},
                        "filters": {
                            "type": "object",
                            "properties": {
                                "node_type": {"type": "string", "description": "Node type (file, symbol, cluster, ...)"},
                                "name": {"type": "string", "description": "Case-insensitive partial name match"},
                                "id": {"type": "string", "description": "Exact node id (required for neighbors)"},
                                "source": {"type": "string", "description": "Edge source id"},
                                "target": {"type": "string", "description": "Edge target id"},
                                "relation": {"type": "string", "description": "Edge relation type"},
                                "limit": {"type": "integer", "minimum": 1, "description": "Maximum results"}
                            }
                        }
                    },
                    "required": []
                }),
            ),
            ToolKind::WriteOutput => (
                "Write a file to the output directory. Rewriting identical content is a no-op; replacing different content requires overwrite: true.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Relative path for the output file"},
                        "content": {"type": "string", "description": "Content to write"},
                        "overwrite": {"type": "boolean", "description": "Replace an existing file with different content (default: false)"}
                    },
                    "required": ["path", "content"]
                }),
            ),
        };

        Self {
            name: kind.as_str().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Definitions for `allowed`, in stable enum order.
pub fn definitions_for(allowed: &BTreeSet<ToolKind>) -> Vec<ToolDefinition> {
    allowed.iter().copied().map(ToolDefinition::for_kind).collect()
}
