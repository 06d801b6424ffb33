//! Tool surface exposed to the reasoning agent.
//!
//! Tools form a closed set ([`ToolKind`]). An agent-originated [`ToolCall`]
//! is parsed into a typed [`ToolRequest`] and dispatched by the
//! [`ToolRegistry`] through a single exhaustive `match`. Every failure is
//! returned as data ([`ToolResult`]), never as a panic.

pub mod definitions;
pub mod error;
mod fs;
mod index;
pub mod page;
pub mod registry;
pub mod result;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use definitions::{definitions_for, ToolDefinition};
pub use error::ToolError;
pub use page::{PageRenderer, PdftoppmRenderer, RenderError};
pub use registry::{ToolContext, ToolRegistry};
pub use result::{ImageAttachment, ToolOutcome, ToolResult};

/// Every tool the runner knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ListFiles,
    ReadFile,
    ReadImage,
    #[serde(rename = "read_page_as_image", alias = "read_pdf")]
    ReadPage,
    #[serde(alias = "search_code")]
    SearchIndex,
    QueryGraph,
    WriteOutput,
}

impl ToolKind {
    pub const ALL: [ToolKind; 7] = [
        ToolKind::ListFiles,
        ToolKind::ReadFile,
        ToolKind::ReadImage,
        ToolKind::ReadPage,
        ToolKind::SearchIndex,
        ToolKind::QueryGraph,
        ToolKind::WriteOutput,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::ListFiles => "list_files",
            ToolKind::ReadFile => "read_file",
            ToolKind::ReadImage => "read_image",
            ToolKind::ReadPage => "read_page_as_image",
            ToolKind::SearchIndex => "search_index",
            ToolKind::QueryGraph => "query_graph",
            ToolKind::WriteOutput => "write_output",
        }
    }

    /// Parse a canonical name or a legacy alias.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "search_code" => Some(ToolKind::SearchIndex),
            "read_pdf" => Some(ToolKind::ReadPage),
            other => Self::ALL.into_iter().find(|k| k.as_str() == other),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

fn default_list_path() -> String {
    ".".to_string()
}

fn default_page() -> u32 {
    1
}

fn default_dpi() -> u32 {
    150
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListFilesArgs {
    #[serde(default = "default_list_path")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadPageArgs {
    pub path: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchArgs {
    pub query: String,
}

/// Shape of a `query_graph` request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphQueryType {
    #[default]
    Nodes,
    Edges,
    Neighbors,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GraphFilters {
    #[serde(default, alias = "type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, alias = "kind")]
    pub relation: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GraphArgs {
    #[serde(default)]
    pub query_type: GraphQueryType,
    #[serde(default)]
    pub filters: GraphFilters,
    // Older agents pass these at the top level.
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl GraphArgs {
    /// Fold top-level legacy arguments into `filters`.
    pub fn normalized(mut self) -> Self {
        if self.filters.node_type.is_none() {
            self.filters.node_type = self.node_type.take();
        }
        if self.filters.name.is_none() {
            self.filters.name = self.name.take();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteArgs {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub overwrite: bool,
}

/// A tool call with its arguments parsed into the tool's typed shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    ListFiles(ListFilesArgs),
    ReadFile(PathArgs),
    ReadImage(PathArgs),
    ReadPage(ReadPageArgs),
    SearchIndex(SearchArgs),
    QueryGraph(GraphArgs),
    WriteOutput(WriteArgs),
}

impl ToolRequest {
    /// Parse `arguments` for `kind`. A missing or `null` argument object is
    /// treated as `{}` so tools with all-default arguments can be called bare.
    pub fn parse(kind: ToolKind, arguments: &Value) -> Result<Self, ToolError> {
        let args = match arguments {
            Value::Null => Value::Object(serde_json::Map::new()),
            Value::Object(_) => arguments.clone(),
            _ => {
                return Err(ToolError::InvalidArguments {
                    tool: kind.to_string(),
                    message: "arguments must be a JSON object".to_string(),
                })
            }
        };

        let invalid = |e: serde_json::Error| ToolError::InvalidArguments {
            tool: kind.to_string(),
            message: e.to_string(),
        };

        let request = match kind {
            ToolKind::ListFiles => ToolRequest::ListFiles(serde_json::from_value(args).map_err(invalid)?),
            ToolKind::ReadFile => ToolRequest::ReadFile(serde_json::from_value(args).map_err(invalid)?),
            ToolKind::ReadImage => ToolRequest::ReadImage(serde_json::from_value(args).map_err(invalid)?),
            ToolKind::ReadPage => ToolRequest::ReadPage(serde_json::from_value(args).map_err(invalid)?),
            ToolKind::SearchIndex => {
                ToolRequest::SearchIndex(serde_json::from_value(args).map_err(invalid)?)
            }
            ToolKind::QueryGraph => {
                let parsed: GraphArgs = serde_json::from_value(args).map_err(invalid)?;
                ToolRequest::QueryGraph(parsed.normalized())
            }
            ToolKind::WriteOutput => {
                ToolRequest::WriteOutput(serde_json::from_value(args).map_err(invalid)?)
            }
        };
        Ok(request)
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolRequest::ListFiles(_) => ToolKind::ListFiles,
            ToolRequest::ReadFile(_) => ToolKind::ReadFile,
            ToolRequest::ReadImage(_) => ToolKind::ReadImage,
            ToolRequest::ReadPage(_) => ToolKind::ReadPage,
            ToolRequest::SearchIndex(_) => ToolKind::SearchIndex,
            ToolRequest::QueryGraph(_) => ToolKind::QueryGraph,
            ToolRequest::WriteOutput(_) => ToolKind::WriteOutput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_accepts_aliases() {
        assert_eq!(ToolKind::parse("search_code"), Some(ToolKind::SearchIndex));
        assert_eq!(ToolKind::parse("read_pdf"), Some(ToolKind::ReadPage));
        assert_eq!(ToolKind::parse("read_page_as_image"), Some(ToolKind::ReadPage));
        assert_eq!(ToolKind::parse("shell"), None);
    }

    #[test]
    fn test_serde_names_match_wire_names() {
        for kind in ToolKind::ALL {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
        }
        let legacy: Vec<ToolKind> = serde_json::from_value(json!(["search_code", "read_pdf"])).unwrap();
        assert_eq!(legacy, vec![ToolKind::SearchIndex, ToolKind::ReadPage]);
    }

    #[test]
    fn test_request_defaults() {
        let req = ToolRequest::parse(ToolKind::ListFiles, &Value::Null).unwrap();
        assert_eq!(
            req,
            ToolRequest::ListFiles(ListFilesArgs {
                path: ".".to_string()
            })
        );

        let req = ToolRequest::parse(ToolKind::ReadPage, &json!({"path": "a.pdf"})).unwrap();
        assert_eq!(
            req,
            ToolRequest::ReadPage(ReadPageArgs {
                path: "a.pdf".to_string(),
                page: 1,
                dpi: 150
            })
        );
    }

    #[test]
    fn test_request_rejects_missing_and_non_object() {
        let err = ToolRequest::parse(ToolKind::ReadFile, &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        let err = ToolRequest::parse(ToolKind::ReadFile, &json!("a.txt")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_graph_legacy_arguments_fold_into_filters() {
        let req = ToolRequest::parse(
            ToolKind::QueryGraph,
            &json!({"node_type": "function", "name": "parse"}),
        )
        .unwrap();
        let ToolRequest::QueryGraph(args) = req else {
            panic!("expected graph request");
        };
        assert_eq!(args.query_type, GraphQueryType::Nodes);
        assert_eq!(args.filters.node_type.as_deref(), Some("function"));
        assert_eq!(args.filters.name.as_deref(), Some("parse"));
    }
}
