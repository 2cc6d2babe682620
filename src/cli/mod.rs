//! Command-line interface for cppref.
//!
//! This module handles argument parsing and output payloads only.
//! Searches and lookups are performed by the library.

use crate::config::ProjectConfig;
use crate::error::{CppRefError, Result};
use crate::ingest;
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// cppref: find references to C and C++ symbols.
#[derive(Parser, Debug)]
#[command(name = "cppref")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_required = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Project selection shared by every command.
#[derive(clap::Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root directory.
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Predefine a macro (`NAME` or `NAME=VALUE`).
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    pub defines: Vec<String>,

    /// Add an include search directory.
    #[arg(short = 'I', value_name = "DIR")]
    pub include_paths: Vec<PathBuf>,
}

impl ProjectArgs {
    /// Absolute project root.
    pub fn root_dir(&self) -> Result<PathBuf> {
        let root = if self.root.is_absolute() {
            self.root.clone()
        } else {
            std::env::current_dir()?.join(&self.root)
        };
        Ok(ingest::normalize_path(&root))
    }

    /// `cppref.json` with the command-line flags layered on top.
    pub fn config(&self, root: &Path) -> Result<ProjectConfig> {
        let mut config = ProjectConfig::load(root)?;
        for definition in &self.defines {
            config.define(definition);
        }
        for dir in &self.include_paths {
            config.add_include_path(project_file(root, dir));
        }
        Ok(config)
    }
}

/// Available cppref commands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Find every reference to a symbol.
    Refs {
        /// Project selection.
        #[command(flatten)]
        project: ProjectArgs,

        /// Symbol under a cursor position, as FILE:LINE:COL (1-based).
        #[arg(long, value_name = "FILE:LINE:COL", conflicts_with_all = ["file", "symbol"])]
        at: Option<String>,

        /// File declaring the symbol, relative to the root.
        #[arg(short, long, requires = "symbol", required_unless_present = "at")]
        file: Option<PathBuf>,

        /// Name of the symbol declared in --file.
        #[arg(short, long, requires = "file")]
        symbol: Option<String>,

        /// Narrow --symbol to one kind of declaration.
        #[arg(short, long)]
        kind: Option<SymbolKind>,
    },

    /// Print the files a search for a symbol declared in FILE would scan.
    Deps {
        /// Project selection.
        #[command(flatten)]
        project: ProjectArgs,

        /// Declaring file, relative to the root.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List the declarations of a file.
    Symbols {
        /// Project selection.
        #[command(flatten)]
        project: ProjectArgs,

        /// File to list, relative to the root.
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Symbol kind for filtering.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Namespace.
    Namespace,
    /// Class.
    Class,
    /// Struct.
    Struct,
    /// Union.
    Union,
    /// Enum.
    Enum,
    /// Enumerator.
    Enumerator,
    /// Free function.
    Function,
    /// Member function.
    Method,
    /// Variable.
    Variable,
    /// Data member.
    Field,
    /// Function parameter.
    Parameter,
    /// Typedef or alias.
    Typedef,
    /// Template parameter.
    TemplateParameter,
}

impl SymbolKind {
    /// Convert to the model's symbol kind.
    pub fn to_model(self) -> crate::model::SymbolKind {
        use crate::model::SymbolKind as Model;
        match self {
            SymbolKind::Namespace => Model::Namespace,
            SymbolKind::Class => Model::Class,
            SymbolKind::Struct => Model::Struct,
            SymbolKind::Union => Model::Union,
            SymbolKind::Enum => Model::Enum,
            SymbolKind::Enumerator => Model::Enumerator,
            SymbolKind::Function => Model::Function,
            SymbolKind::Method => Model::Method,
            SymbolKind::Variable => Model::Variable,
            SymbolKind::Field => Model::Field,
            SymbolKind::Parameter => Model::Parameter,
            SymbolKind::Typedef => Model::Typedef,
            SymbolKind::TemplateParameter => Model::TemplateParameter,
        }
    }
}

/// Parse command-line arguments.
///
/// This function is the entry point for CLI argument parsing.
/// It returns the parsed Cli struct or exits on error.
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// A project file given on the command line: absolute, or relative to `root`.
pub fn project_file(root: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        ingest::normalize_path(file)
    } else {
        ingest::normalize_path(&root.join(file))
    }
}

/// Split `FILE:LINE:COL` into its parts.
pub fn parse_position(position: &str) -> Result<(PathBuf, u32, u32)> {
    let invalid = || CppRefError::Other(format!("Invalid position '{}': expected FILE:LINE:COL", position));
    let mut parts = position.rsplitn(3, ':');
    let column = parts.next().and_then(|c| c.parse().ok()).ok_or_else(invalid)?;
    let line = parts.next().and_then(|l| l.parse().ok()).ok_or_else(invalid)?;
    let file = parts.next().filter(|f| !f.is_empty()).ok_or_else(invalid)?;
    if line == 0 || column == 0 {
        return Err(invalid());
    }
    Ok((PathBuf::from(file), line, column))
}

/// Path for display: relative to `root` when inside it.
pub fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// JSON success payload for CLI responses.
#[derive(Serialize)]
pub struct CliSuccessPayload {
    /// Status indicator ("ok").
    pub status: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CliSuccessPayload {
    /// Construct a payload containing only the message.
    pub fn message_only(message: String) -> Self {
        Self {
            status: "ok",
            message,
            data: None,
        }
    }

    /// Construct a payload with structured data.
    pub fn with_data(message: String, data: Value) -> Self {
        Self {
            status: "ok",
            message,
            data: Some(data),
        }
    }
}

/// One streamed match in JSON-lines output.
#[derive(Serialize)]
pub struct MatchLine<'a> {
    /// Always "match".
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Path relative to the root.
    pub path: String,
    /// The match.
    #[serde(flatten)]
    pub result: &'a crate::search::MatchResult,
}

/// JSON error payload for CLI responses.
#[derive(Serialize)]
pub struct CliErrorPayload {
    /// Status indicator ("error").
    pub status: &'static str,
    /// Structured error details.
    pub error: ErrorDetails,
}

/// Details for a CLI error payload.
#[derive(Serialize)]
pub struct ErrorDetails {
    /// Error kind identifier (SymbolNotFound, etc.).
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional file context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Optional hint for remediation steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl CliErrorPayload {
    /// Build payload from a CppRefError instance.
    pub fn from_error(error: &CppRefError) -> Self {
        CliErrorPayload {
            status: "error",
            error: ErrorDetails {
                kind: error.kind(),
                message: error.to_string(),
                file: error
                    .file_path()
                    .map(|path| path.to_string_lossy().to_string()),
                hint: error.hint().map(|h| h.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        let (file, line, column) = parse_position("src/a.cpp:12:5").unwrap();
        assert_eq!(file, PathBuf::from("src/a.cpp"));
        assert_eq!((line, column), (12, 5));
        assert!(parse_position("a.cpp:12").is_err());
        assert!(parse_position("a.cpp:0:1").is_err());
    }

    #[test]
    fn test_refs_requires_a_target() {
        assert!(Cli::try_parse_from(["cppref", "refs"]).is_err());
        assert!(Cli::try_parse_from(["cppref", "refs", "--file", "a.h"]).is_err());
        let cli = Cli::try_parse_from([
            "cppref", "refs", "--root", "/p", "--file", "a.h", "--symbol", "foo", "-D", "X=1",
        ])
        .unwrap();
        match cli.command {
            Commands::Refs { project, file, symbol, .. } => {
                assert_eq!(project.defines, vec!["X=1"]);
                assert_eq!(file, Some(PathBuf::from("a.h")));
                assert_eq!(symbol.as_deref(), Some("foo"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_error_payload_carries_kind_and_hint() {
        let err = CppRefError::SymbolNotFound {
            name: "foo".to_string(),
            file: Some(PathBuf::from("/p/a.h")),
        };
        let payload = serde_json::to_value(CliErrorPayload::from_error(&err)).unwrap();
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error"]["kind"], "SymbolNotFound");
        assert_eq!(payload["error"]["file"], "/p/a.h");
        assert!(payload["error"]["hint"].is_string());
    }
}
