//! `docpack.json`: the bundle's environment description.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{BundleError, BundleResult, ValidationError};
use crate::tools::ToolKind;

pub const MANIFEST_FILE: &str = "docpack.json";

/// Resource limits declared by the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub max_file_reads: u32,
    pub max_execution_time_seconds: u64,
    pub memory_limit_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub tools: BTreeSet<ToolKind>,
    pub interpreter: String,
    pub constraints: Constraints,
}

/// Parsed and validated manifest. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub version: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub environment: Environment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Deserialize)]
struct RawManifest {
    version: Option<Value>,
    name: Option<String>,
    description: Option<String>,
    environment: Option<RawEnvironment>,
    metadata: Option<Value>,
}

#[derive(Deserialize)]
struct RawEnvironment {
    tools: Option<Vec<String>>,
    interpreter: Option<String>,
    constraints: Option<RawConstraints>,
}

#[derive(Deserialize)]
struct RawConstraints {
    max_file_reads: Option<u32>,
    max_execution_time_seconds: Option<u64>,
    memory_limit_mb: Option<u64>,
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingField {
        file: MANIFEST_FILE,
        field: field.to_string(),
    }
}

impl Manifest {
    pub fn load(path: &Path) -> BundleResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| BundleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| BundleError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_value(value)?)
    }

    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let raw: RawManifest =
            serde_json::from_value(value).map_err(|e| ValidationError::Malformed {
                file: MANIFEST_FILE,
                message: e.to_string(),
            })?;

        let version = match raw.version {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(missing("version")),
        };
        let env = raw.environment.ok_or_else(|| missing("environment"))?;
        let tool_names = env.tools.ok_or_else(|| missing("environment.tools"))?;
        let tools = parse_tools(MANIFEST_FILE, &tool_names)?;
        let interpreter = env
            .interpreter
            .ok_or_else(|| missing("environment.interpreter"))?;

        let c = env
            .constraints
            .ok_or_else(|| missing("environment.constraints"))?;
        let constraints = Constraints {
            max_file_reads: c
                .max_file_reads
                .ok_or_else(|| missing("environment.constraints.max_file_reads"))?,
            max_execution_time_seconds: c
                .max_execution_time_seconds
                .ok_or_else(|| missing("environment.constraints.max_execution_time_seconds"))?,
            memory_limit_mb: c
                .memory_limit_mb
                .ok_or_else(|| missing("environment.constraints.memory_limit_mb"))?,
        };
        if constraints.max_execution_time_seconds == 0 {
            return Err(ValidationError::InvalidConstraint {
                field: "max_execution_time_seconds",
                reason: "must be greater than zero".to_string(),
            });
        }
        if constraints.memory_limit_mb == 0 {
            return Err(ValidationError::InvalidConstraint {
                field: "memory_limit_mb",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            version,
            name: raw.name.unwrap_or_else(|| "unnamed".to_string()),
            description: raw.description,
            environment: Environment {
                tools,
                interpreter,
                constraints,
            },
            metadata: raw.metadata,
        })
    }

    pub fn tools(&self) -> &BTreeSet<ToolKind> {
        &self.environment.tools
    }

    pub fn constraints(&self) -> &Constraints {
        &self.environment.constraints
    }
}

/// Parse tool names (canonical or legacy alias) into a set.
pub(crate) fn parse_tools(
    file: &'static str,
    names: &[String],
) -> Result<BTreeSet<ToolKind>, ValidationError> {
    names
        .iter()
        .map(|name| {
            ToolKind::parse(name).ok_or_else(|| ValidationError::UnknownTool {
                file,
                name: name.clone(),
            })
        })
        .collect()
}
