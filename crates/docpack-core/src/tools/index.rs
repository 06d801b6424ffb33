//! `search_index` and `query_graph` over the bundle's precomputed indexes.
//!
//! Index files are resolved through the sandbox, parsed on first use and
//! cached for the rest of the run. They are metadata, so loading them does
//! not consume read quota.

use std::collections::BTreeSet;
use std::fs;

use serde_json::{json, Value};

use super::{GraphArgs, GraphFilters, GraphQueryType, SearchArgs, ToolError};
use crate::sandbox::Sandbox;

pub(crate) const SEARCH_FILE: &str = "search.json";
pub(crate) const GRAPH_FILE: &str = "graph.json";

const MAX_SEARCH_RESULTS: usize = 50;
const DEFAULT_GRAPH_LIMIT: usize = 50;
const MAX_GRAPH_LIMIT: usize = 200;

#[derive(Debug, Default)]
pub(crate) struct IndexCache {
    search: Option<Value>,
    graph: Option<Value>,
}

impl IndexCache {
    fn load(sandbox: &Sandbox, file: &str) -> Result<Value, ToolError> {
        let unavailable = || ToolError::IndexUnavailable {
            file: format!("index/{file}"),
        };
        if !sandbox.has_index() {
            return Err(unavailable());
        }
        let path = sandbox.resolve_index(file)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(unavailable()),
            Err(e) => return Err(ToolError::io(&format!("index/{file}"), e)),
        };
        serde_json::from_slice(&raw).map_err(|e| ToolError::IndexMalformed {
            file: format!("index/{file}"),
            message: e.to_string(),
        })
    }

    fn search(&mut self, sandbox: &Sandbox) -> Result<&Value, ToolError> {
        if self.search.is_none() {
            self.search = Some(Self::load(sandbox, SEARCH_FILE)?);
        }
        self.search.as_ref().ok_or_else(|| ToolError::IndexUnavailable {
            file: format!("index/{SEARCH_FILE}"),
        })
    }

    fn graph(&mut self, sandbox: &Sandbox) -> Result<&Value, ToolError> {
        if self.graph.is_none() {
            self.graph = Some(Self::load(sandbox, GRAPH_FILE)?);
        }
        self.graph.as_ref().ok_or_else(|| ToolError::IndexUnavailable {
            file: format!("index/{GRAPH_FILE}"),
        })
    }
}

/// Case-insensitive exact-term lookup in `{"index": {term: [...]}}`.
pub(crate) fn search_index(
    cache: &mut IndexCache,
    sandbox: &Sandbox,
    args: &SearchArgs,
) -> Result<Value, ToolError> {
    sandbox.check_deadline()?;
    let query = args.query.trim().to_lowercase();
    let index = cache.search(sandbox)?;
    let terms = index
        .get("index")
        .and_then(Value::as_object)
        .ok_or_else(|| ToolError::IndexMalformed {
            file: format!("index/{SEARCH_FILE}"),
            message: "missing top-level \"index\" object".to_string(),
        })?;

    let hits: Vec<Value> = match terms.get(&query) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    };
    let total = hits.len();
    let results: Vec<Value> = hits.into_iter().take(MAX_SEARCH_RESULTS).collect();

    Ok(json!({
        "query": query,
        "results": results,
        "total": total,
        "truncated": total > MAX_SEARCH_RESULTS,
    }))
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_str))
}

fn node_id(node: &Value) -> Option<String> {
    match node.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn endpoint(edge: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match edge.get(*k)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn edge_source(edge: &Value) -> Option<String> {
    endpoint(edge, &["source", "from"])
}

fn edge_target(edge: &Value) -> Option<String> {
    endpoint(edge, &["target", "to"])
}

fn edge_relation(edge: &Value) -> Option<&str> {
    str_field(edge, &["type", "relation", "kind"])
}

fn node_matches(node: &Value, filters: &GraphFilters) -> bool {
    if let Some(wanted) = &filters.node_type {
        if str_field(node, &["type", "kind"]) != Some(wanted.as_str()) {
            return false;
        }
    }
    if let Some(name) = &filters.name {
        let needle = name.to_lowercase();
        let hay = str_field(node, &["name"]).unwrap_or_default().to_lowercase();
        if !hay.contains(&needle) {
            return false;
        }
    }
    if let Some(id) = &filters.id {
        if node_id(node).as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    true
}

fn edge_matches(edge: &Value, filters: &GraphFilters) -> bool {
    if let Some(source) = &filters.source {
        if edge_source(edge).as_deref() != Some(source.as_str()) {
            return false;
        }
    }
    if let Some(target) = &filters.target {
        if edge_target(edge).as_deref() != Some(target.as_str()) {
            return false;
        }
    }
    if let Some(relation) = &filters.relation {
        if edge_relation(edge) != Some(relation.as_str()) {
            return false;
        }
    }
    true
}

fn array<'a>(graph: &'a Value, key: &str) -> &'a [Value] {
    graph
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn capped(items: Vec<Value>, limit: usize) -> (Vec<Value>, usize, bool) {
    let total = items.len();
    let kept = items.into_iter().take(limit).collect();
    (kept, total, total > limit)
}

pub(crate) fn query_graph(
    cache: &mut IndexCache,
    sandbox: &Sandbox,
    args: &GraphArgs,
) -> Result<Value, ToolError> {
    sandbox.check_deadline()?;
    let graph = cache.graph(sandbox)?;
    let filters = &args.filters;
    let limit = filters
        .limit
        .unwrap_or(DEFAULT_GRAPH_LIMIT)
        .clamp(1, MAX_GRAPH_LIMIT);

    match args.query_type {
        GraphQueryType::Nodes => {
            let matched: Vec<Value> = array(graph, "nodes")
                .iter()
                .filter(|n| node_matches(n, filters))
                .cloned()
                .collect();
            let (nodes, total, truncated) = capped(matched, limit);
            Ok(json!({
                "query_type": "nodes",
                "nodes": nodes,
                "total": total,
                "truncated": truncated,
            }))
        }
        GraphQueryType::Edges => {
            let matched: Vec<Value> = array(graph, "edges")
                .iter()
                .filter(|e| edge_matches(e, filters))
                .cloned()
                .collect();
            let (edges, total, truncated) = capped(matched, limit);
            Ok(json!({
                "query_type": "edges",
                "edges": edges,
                "total": total,
                "truncated": truncated,
            }))
        }
        GraphQueryType::Neighbors => {
            let id = filters.id.as_deref().ok_or_else(|| ToolError::InvalidArguments {
                tool: "query_graph".to_string(),
                message: "neighbors queries require filters.id".to_string(),
            })?;

            let mut neighbor_ids = BTreeSet::new();
            let mut touching = Vec::new();
            for edge in array(graph, "edges") {
                if let Some(relation) = &filters.relation {
                    if edge_relation(edge) != Some(relation.as_str()) {
                        continue;
                    }
                }
                let (source, target) = (edge_source(edge), edge_target(edge));
                let (other, direction) = if source.as_deref() == Some(id) {
                    (target, "outgoing")
                } else if target.as_deref() == Some(id) {
                    (source, "incoming")
                } else {
                    continue;
                };
                if let Some(other) = other {
                    touching.push(json!({
                        "direction": direction,
                        "neighbor": other,
                        "relation": edge_relation(edge),
                    }));
                    neighbor_ids.insert(other);
                }
            }

            let nodes: Vec<Value> = array(graph, "nodes")
                .iter()
                .filter(|n| node_id(n).is_some_and(|nid| neighbor_ids.contains(&nid)))
                .filter(|n| {
                    filters
                        .node_type
                        .as_deref()
                        .map_or(true, |t| str_field(n, &["type", "kind"]) == Some(t))
                })
                .cloned()
                .collect();
            let (nodes, total, truncated) = capped(nodes, limit);
            let (edges, _, _) = capped(touching, limit);
            Ok(json!({
                "query_type": "neighbors",
                "id": id,
                "edges": edges,
                "nodes": nodes,
                "total": total,
                "truncated": truncated,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleLayout;
    use crate::sandbox::SandboxLimits;
    use std::time::Duration;

    fn sandbox_with_index(search: Option<&str>, graph: Option<&str>) -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        fs::create_dir_all(&layout.content).unwrap();
        fs::create_dir_all(&layout.index).unwrap();
        if let Some(s) = search {
            fs::write(layout.index.join(SEARCH_FILE), s).unwrap();
        }
        if let Some(g) = graph {
            fs::write(layout.index.join(GRAPH_FILE), g).unwrap();
        }
        let limits = SandboxLimits {
            max_file_reads: 1,
            max_duration: Duration::from_secs(60),
            max_memory_bytes: 1024,
            max_output_bytes: 1024,
        };
        let sandbox = Sandbox::new(&layout, limits).unwrap();
        (dir, sandbox)
    }

    const GRAPH: &str = r#"{
        "nodes": [
            {"id": "f1", "type": "file", "name": "main.py"},
            {"id": "s1", "type": "function", "name": "parse_args"},
            {"id": "s2", "type": "function", "name": "ParseConfig"}
        ],
        "edges": [
            {"source": "f1", "target": "s1", "type": "defines"},
            {"source": "f1", "target": "s2", "type": "defines"},
            {"source": "s1", "target": "s2", "type": "calls"}
        ]
    }"#;

    fn graph_args(query_type: GraphQueryType, filters: GraphFilters) -> GraphArgs {
        GraphArgs {
            query_type,
            filters,
            ..GraphArgs::default()
        }
    }

    #[test]
    fn test_search_is_case_insensitive_and_not_charged() {
        let (_dir, sandbox) =
            sandbox_with_index(Some(r#"{"index": {"parser": ["src/parse.py:10"]}}"#), None);
        let mut cache = IndexCache::default();
        let out = search_index(
            &mut cache,
            &sandbox,
            &SearchArgs {
                query: "Parser".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out["results"], json!(["src/parse.py:10"]));
        assert_eq!(sandbox.usage().reads_consumed, 0);

        let out = search_index(
            &mut cache,
            &sandbox,
            &SearchArgs {
                query: "absent".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out["total"], json!(0));
    }

    #[test]
    fn test_missing_index_is_tool_local_error() {
        let (_dir, sandbox) = sandbox_with_index(None, None);
        let mut cache = IndexCache::default();
        let err = search_index(
            &mut cache,
            &sandbox,
            &SearchArgs {
                query: "x".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "index_unavailable");
    }

    #[test]
    fn test_malformed_index() {
        let (_dir, sandbox) = sandbox_with_index(Some("{not json"), None);
        let mut cache = IndexCache::default();
        let err = search_index(
            &mut cache,
            &sandbox,
            &SearchArgs {
                query: "x".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "index_malformed");
    }

    #[test]
    fn test_graph_nodes_filter_by_type_and_name() {
        let (_dir, sandbox) = sandbox_with_index(None, Some(GRAPH));
        let mut cache = IndexCache::default();
        let filters = GraphFilters {
            node_type: Some("function".to_string()),
            name: Some("parse".to_string()),
            ..GraphFilters::default()
        };
        let out = query_graph(&mut cache, &sandbox, &graph_args(GraphQueryType::Nodes, filters)).unwrap();
        assert_eq!(out["total"], json!(2));

        let filters = GraphFilters {
            limit: Some(1),
            ..GraphFilters::default()
        };
        let out = query_graph(&mut cache, &sandbox, &graph_args(GraphQueryType::Nodes, filters)).unwrap();
        assert_eq!(out["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(out["truncated"], json!(true));
    }

    #[test]
    fn test_graph_edges_filter_by_relation() {
        let (_dir, sandbox) = sandbox_with_index(None, Some(GRAPH));
        let mut cache = IndexCache::default();
        let filters = GraphFilters {
            relation: Some("calls".to_string()),
            ..GraphFilters::default()
        };
        let out = query_graph(&mut cache, &sandbox, &graph_args(GraphQueryType::Edges, filters)).unwrap();
        assert_eq!(out["edges"], json!([{"source": "s1", "target": "s2", "type": "calls"}]));
    }

    #[test]
    fn test_graph_neighbors() {
        let (_dir, sandbox) = sandbox_with_index(None, Some(GRAPH));
        let mut cache = IndexCache::default();
        let filters = GraphFilters {
            id: Some("s1".to_string()),
            ..GraphFilters::default()
        };
        let out =
            query_graph(&mut cache, &sandbox, &graph_args(GraphQueryType::Neighbors, filters)).unwrap();
        let ids: Vec<_> = out["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["f1", "s2"]);

        let err = query_graph(
            &mut cache,
            &sandbox,
            &graph_args(GraphQueryType::Neighbors, GraphFilters::default()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }
}
