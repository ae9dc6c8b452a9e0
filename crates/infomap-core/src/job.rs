//! Job identity and submission inputs.
//!
//! Validation and the small amount of argument inspection the orchestrator
//! does before handing a job to a worker: deriving the output name and
//! tokenizing the argument string. Everything else about the arguments is
//! the engine's business.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Filename used when the network is given as bare content.
pub const DEFAULT_NETWORK_FILENAME: &str = "network.net";

/// Argument that overrides the derived output name.
const OUT_NAME_FLAG: &str = "--out-name";

/// Identifier of a submitted job.
///
/// Allocated by the orchestrator in increasing order starting at 0 and never
/// reused within one orchestrator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub(crate) u64);

impl JobId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

/// Network input for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    /// Network content, stored under [`DEFAULT_NETWORK_FILENAME`].
    Content(String),
    /// Network content with an explicit filename.
    File { filename: String, content: String },
}

impl Network {
    /// Build a network with an explicit filename.
    pub fn file(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self::File {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Interpret an untyped value as a network.
    ///
    /// Accepts a string (the content) or an object with string fields
    /// `filename` and `content`.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(content) => Ok(Self::Content(content.clone())),
            Value::Object(map) => {
                let filename = map.get("filename").and_then(Value::as_str);
                let content = map.get("content").and_then(Value::as_str);
                match (filename, content) {
                    (Some(filename), Some(content)) => {
                        let network = Self::file(filename, content);
                        network.validate()?;
                        Ok(network)
                    }
                    _ => Err(shape_error()),
                }
            }
            _ => Err(shape_error()),
        }
    }

    /// Check that a file-shaped network has a filename and content.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Content(_) => Ok(()),
            Self::File { filename, content } if !filename.is_empty() && !content.is_empty() => {
                Ok(())
            }
            Self::File { .. } => Err(shape_error()),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Self::Content(_) => DEFAULT_NETWORK_FILENAME,
            Self::File { filename, .. } => filename,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Content(content) => content,
            Self::File { content, .. } => content,
        }
    }

    /// Filename with its final extension removed.
    ///
    /// A leading dot (`.hidden`) is not treated as an extension separator.
    pub fn base_name(&self) -> &str {
        let filename = self.filename();
        match filename.rfind('.') {
            Some(index) if index > 0 => &filename[..index],
            _ => filename,
        }
    }
}

impl From<String> for Network {
    fn from(content: String) -> Self {
        Self::Content(content)
    }
}

impl From<&str> for Network {
    fn from(content: &str) -> Self {
        Self::Content(content.to_string())
    }
}

fn shape_error() -> Error {
    Error::invalid(
        "network",
        "network must be a string or object of shape { filename: String, content: String }",
    )
}

/// Interpret an untyped value as the argument string.
pub fn args_from_value(value: Option<&Value>) -> Result<String> {
    match value {
        None => Ok(String::new()),
        Some(Value::String(args)) => Ok(args.clone()),
        Some(_) => Err(Error::invalid("args", "args must be a string")),
    }
}

/// Interpret an untyped value as the auxiliary file map.
pub fn files_from_value(value: Option<&Value>) -> Result<BTreeMap<String, String>> {
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };

    let Value::Object(map) = value else {
        return Err(Error::invalid(
            "files",
            "files must be an object mapping filenames to string content",
        ));
    };

    map.iter()
        .map(|(name, content)| match content {
            Value::String(content) => Ok((name.clone(), content.clone())),
            _ => Err(Error::invalid(
                "files",
                format!("content of file '{}' must be a string", name),
            )),
        })
        .collect()
}

/// Split an argument string into whitespace-separated tokens.
pub fn tokenize_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// Output name for a job: the `--out-name` value if given, else the network's base name.
pub fn derive_out_name(args: &str, network_name: &str) -> String {
    let mut tokens = args.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == OUT_NAME_FLAG {
            return match tokens.next() {
                Some(value) => value.to_string(),
                None => network_name.to_string(),
            };
        }
    }
    network_name.to_string()
}
