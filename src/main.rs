//! cppref CLI binary
//!
//! This is the main entry point for the cppref command-line interface.
//! The CLI is a thin adapter over the library APIs.

use cppref::cli::{
    display_path, parse_position, project_file, CliErrorPayload, CliSuccessPayload, Commands,
    MatchLine, ProjectArgs, SymbolKind,
};
use cppref::model::{Snapshot, Symbol, Workspace};
use cppref::resolve::{self, ScopeResolver};
use cppref::search::{
    self, FindReferences, MatchResult, ProgressReporter, ResultHandle, ResultSink, SearchOutcome,
};
use cppref::CppRefError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = cppref::cli::parse_args();

    // Initialize logger if verbose
    if cli.verbose {
        env_logger::init();
    }

    let json = cli.json;
    let result = match cli.command {
        Commands::Refs {
            project,
            at,
            file,
            symbol,
            kind,
        } => execute_refs(&project, at.as_deref(), file.as_deref(), symbol.as_deref(), kind, json),
        Commands::Deps { project, file } => execute_deps(&project, &file, json),
        Commands::Symbols { project, file } => execute_symbols(&project, &file, json),
    };

    match result {
        Ok(msg) => {
            println!("{}", msg);
            ExitCode::SUCCESS
        }
        Err(e) => {
            if json {
                let payload = CliErrorPayload::from_error(&e);
                match serde_json::to_string(&payload) {
                    Ok(text) => println!("{}", text),
                    Err(_) => eprintln!("Error: {}", e),
                }
            } else {
                eprintln!("Error: {}", e);
            }
            ExitCode::from(1)
        }
    }
}

/// Open the project and capture a snapshot.
fn open_project(project: &ProjectArgs) -> Result<(PathBuf, Snapshot), CppRefError> {
    let root = project.root_dir()?;
    let config = project.config(&root)?;
    let workspace = Workspace::open(&root, config)?;
    Ok((root, workspace.snapshot()))
}

/// Prints matches as they are delivered.
struct StdoutSink<'r> {
    root: &'r Path,
    json: bool,
}

impl ResultSink for StdoutSink<'_> {
    fn clear(&mut self) {}

    fn present(&mut self) {}

    fn add_result(&mut self, result: &MatchResult) -> Option<&mut ResultHandle> {
        let path = display_path(self.root, &result.file);
        if self.json {
            let line = MatchLine {
                kind: "match",
                path,
                result,
            };
            if let Ok(text) = serde_json::to_string(&line) {
                println!("{}", text);
            }
        } else {
            println!(
                "{}:{}:{}: {}",
                path,
                result.line,
                result.column + 1,
                result.line_text.trim()
            );
        }
        None
    }
}

/// Logs per-file progress.
struct LogProgress;

impl ProgressReporter for LogProgress {
    fn set_range(&mut self, _min: usize, max: usize) {
        log::debug!("Scanning {} candidate file(s)", max);
    }

    fn set_value_and_text(&mut self, value: usize, text: &str) {
        log::debug!("[{}] {}", value + 1, text);
    }

    fn set_value(&mut self, _value: usize) {}
}

/// Execute the refs command.
///
/// Resolves the starting symbol, starts the search on a worker thread and
/// streams matches to stdout while it runs.
fn execute_refs(
    project: &ProjectArgs,
    at: Option<&str>,
    file: Option<&Path>,
    symbol: Option<&str>,
    kind: Option<SymbolKind>,
    json: bool,
) -> Result<String, CppRefError> {
    let (root, snapshot) = open_project(project)?;
    let resolver = Arc::new(ScopeResolver::new());

    let target: Symbol = match (at, file, symbol) {
        (Some(position), _, _) => {
            let (file, line, column) = parse_position(position)?;
            let file = project_file(&root, &file);
            resolve::symbol_under_cursor(&snapshot, resolver.as_ref(), &file, line, column)?
        }
        (None, Some(file), Some(name)) => resolve::find_declaration(
            &snapshot,
            &project_file(&root, file),
            name,
            kind.map(SymbolKind::to_model),
        )?,
        _ => {
            return Err(CppRefError::Other(
                "Either --at or --file with --symbol is required".to_string(),
            ))
        }
    };

    let mut sink = StdoutSink { root: &root, json };
    let handle = FindReferences::new(resolver).start(snapshot, &target, &mut sink)?;
    let summary = handle.wait(&mut sink, &mut LogProgress)?;

    let message = format!(
        "{} reference(s) to {} in {} of {} file(s){}",
        summary.matches,
        summary.symbol,
        summary.files_processed - summary.files_skipped,
        summary.files_total,
        if summary.outcome == SearchOutcome::Cancelled {
            " (cancelled)"
        } else {
            ""
        }
    );
    if json {
        let payload = CliSuccessPayload::with_data(message, serde_json::to_value(&summary)?);
        Ok(serde_json::to_string(&payload)?)
    } else {
        Ok(message)
    }
}

/// Execute the deps command.
fn execute_deps(project: &ProjectArgs, file: &Path, json: bool) -> Result<String, CppRefError> {
    let (root, snapshot) = open_project(project)?;
    let file = project_file(&root, file);
    if !snapshot.contains(&file) {
        return Err(CppRefError::SymbolNotFound {
            name: display_path(&root, &file),
            file: Some(file),
        });
    }

    let files: Vec<String> = search::dependency_closure(&snapshot, &file)
        .iter()
        .map(|path| display_path(&root, path))
        .collect();
    if json {
        let payload = CliSuccessPayload::with_data(
            format!("{} candidate file(s)", files.len()),
            serde_json::to_value(&files)?,
        );
        Ok(serde_json::to_string(&payload)?)
    } else {
        Ok(files.join("\n"))
    }
}

/// Execute the symbols command.
fn execute_symbols(project: &ProjectArgs, file: &Path, json: bool) -> Result<String, CppRefError> {
    let (root, snapshot) = open_project(project)?;
    let file = project_file(&root, file);
    let doc = snapshot.get(&file).ok_or_else(|| CppRefError::SymbolNotFound {
        name: display_path(&root, &file),
        file: Some(file.clone()),
    })?;

    let symbols = doc.scopes().symbols();
    if json {
        let payload = CliSuccessPayload::with_data(
            format!("{} declaration(s)", symbols.len()),
            serde_json::to_value(symbols)?,
        );
        return Ok(serde_json::to_string(&payload)?);
    }

    let lines: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}:{} {} {}", s.line, s.column, s.kind.as_str(), s.qualified_name()))
        .collect();
    Ok(lines.join("\n"))
}
