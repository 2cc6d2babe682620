//! Reference search orchestration.
//!
//! [`FindReferences`] prepares a search (validates and canonicalizes the
//! symbol, computes its candidate files) and executes it, either on the
//! calling thread with [`run`](FindReferences::run) or on one worker thread
//! with [`start`](FindReferences::start).
//!
//! A started search publishes its events into a single pending batch and
//! rings a bounded(1) doorbell. Events produced while a delivery is still
//! unconsumed join the same batch, so the foreground drains at most one
//! batch per cycle however fast the worker runs.

use super::sink::{Location, ProgressReporter, ResultSink};
use super::walker::{walk, MatchResult};
use super::{candidate_files, obtain_document, Obtained};
use crate::error::{CppRefError, Result};
use crate::ingest;
use crate::model::bind::Symbol;
use crate::model::lexer::is_identifier;
use crate::model::{BuildCounts, Snapshot};
use crate::resolve::{LookupContext, NameResolver, Scratch};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::cell::Cell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How often [`SearchHandle::wait`] re-checks a silent worker.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Lifecycle of a started search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    /// Scanning files, nothing found yet.
    Running,
    /// Scanning files, at least one match delivered to the channel.
    ProducingResults,
    /// Stopped on request.
    Cancelled,
    /// Every candidate file was processed.
    Finished,
}

impl SearchState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SearchState::Running,
            1 => SearchState::ProducingResults,
            2 => SearchState::Cancelled,
            _ => SearchState::Finished,
        }
    }

    /// Whether the search has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SearchState::Cancelled | SearchState::Finished)
    }
}

/// Terminal state of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// Stopped on request; delivered results stay valid.
    Cancelled,
    /// Every candidate file was processed.
    Finished,
}

/// Statistics of a completed search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSummary {
    /// Search id.
    pub id: Uuid,
    /// Qualified name of the symbol searched for.
    pub symbol: String,
    /// Location of its canonical declaration.
    pub declared_at: String,
    /// How the search ended.
    pub outcome: SearchOutcome,
    /// Candidate files.
    pub files_total: usize,
    /// Files processed before the search ended.
    pub files_processed: usize,
    /// Processed files that were not walked.
    pub files_skipped: usize,
    /// Files rebuilt during the search.
    pub files_rebuilt: usize,
    /// Cached documents walked as is.
    pub files_reused: usize,
    /// Matches reported.
    pub matches: usize,
    /// Builder work performed during the search.
    pub work: BuildCounts,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Notification from a running search, in production order.
#[derive(Debug, Clone)]
pub enum SearchEvent {
    /// Scan began over `total` files.
    Started {
        /// Candidate file count.
        total: usize,
    },
    /// About to process the `index`th candidate file.
    Progress {
        /// 0-based index in the candidate list.
        index: usize,
        /// Candidate file count.
        total: usize,
        /// File being processed.
        file: PathBuf,
    },
    /// A reference was found.
    Match(MatchResult),
    /// The search ended.
    Done(SearchSummary),
}

/// A validated search ready to execute.
#[derive(Debug, Clone)]
pub struct PreparedSearch {
    id: Uuid,
    target: Symbol,
    files: Vec<PathBuf>,
    snapshot: Snapshot,
}

impl PreparedSearch {
    /// Search id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Canonical declaration searched for.
    pub fn target(&self) -> &Symbol {
        &self.target
    }

    /// Candidate files in processing order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

type SharedActivation = Arc<dyn Fn(&Location) + Send + Sync>;

/// The find-references operation.
#[derive(Clone)]
pub struct FindReferences {
    resolver: Arc<dyn NameResolver>,
    activation: Option<SharedActivation>,
}

impl std::fmt::Debug for FindReferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindReferences")
            .field("activation", &self.activation.is_some())
            .finish()
    }
}

impl FindReferences {
    /// Operation resolving names with `resolver`.
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        Self {
            resolver,
            activation: None,
        }
    }

    /// Install `callback` on every result handle the sink returns.
    pub fn with_activation(mut self, callback: impl Fn(&Location) + Send + Sync + 'static) -> Self {
        self.activation = Some(Arc::new(callback));
        self
    }

    /// Validate `symbol` against `snapshot` and compute the candidate files.
    ///
    /// The symbol must name a declaration in a document of the snapshot; the
    /// search then looks for the canonical declaration of that entity.
    pub fn prepare(&self, snapshot: Snapshot, symbol: &Symbol) -> Result<PreparedSearch> {
        let invalid = |reason: &str| CppRefError::InvalidSymbol {
            name: symbol.name.clone(),
            reason: reason.to_string(),
        };
        if !is_identifier(&symbol.name) {
            return Err(invalid("not an identifier"));
        }
        let file = ingest::normalize_path(&symbol.file);
        let doc = snapshot
            .get(&file)
            .ok_or_else(|| invalid("declaring file is not in the snapshot"))?;
        let declared = doc
            .offset_at(symbol.line, symbol.column)
            .and_then(|offset| doc.scopes().symbol_declared_at(offset))
            .filter(|declared| declared.name == symbol.name)
            .ok_or_else(|| invalid("no declaration at its position"))?;

        let scratch = Scratch::new();
        let ctx = LookupContext::new(doc, &snapshot, &scratch, declared.offset);
        let target = self.resolver.canonical_declaration(&ctx, declared).clone();
        let files = candidate_files(&snapshot, &target);

        Ok(PreparedSearch {
            id: Uuid::new_v4(),
            target,
            files,
            snapshot,
        })
    }

    /// Run a search on the calling thread.
    ///
    /// Cancellation is polled from `progress` between files.
    pub fn run(
        &self,
        snapshot: Snapshot,
        symbol: &Symbol,
        sink: &mut dyn ResultSink,
        progress: &mut dyn ProgressReporter,
    ) -> Result<SearchSummary> {
        let prepared = self.prepare(snapshot, symbol)?;
        sink.clear();
        sink.present();

        let mut delivery = Foreground {
            activation: self.activation.clone(),
        };
        let cancel_requested = Cell::new(false);
        let summary = execute(
            prepared,
            self.resolver.as_ref(),
            &mut |event| {
                delivery.apply(event, sink, progress);
                cancel_requested.set(progress.is_cancel_requested());
            },
            &|| cancel_requested.get(),
        );
        Ok(summary)
    }

    /// Start a search on a worker thread and return immediately.
    ///
    /// `sink` is cleared and presented before the worker starts; results
    /// reach it through [`SearchHandle::pump`] or [`SearchHandle::wait`].
    pub fn start(
        &self,
        snapshot: Snapshot,
        symbol: &Symbol,
        sink: &mut dyn ResultSink,
    ) -> Result<SearchHandle> {
        let prepared = self.prepare(snapshot, symbol)?;
        sink.clear();
        sink.present();

        let id = prepared.id;
        let shared = Arc::new(Shared::new());
        let worker_shared = Arc::clone(&shared);
        let resolver = Arc::clone(&self.resolver);

        let worker = std::thread::Builder::new()
            .name(format!("cppref-search-{}", id))
            .spawn(move || {
                let cancel = || worker_shared.cancel.load(Ordering::Relaxed);
                execute(
                    prepared,
                    resolver.as_ref(),
                    &mut |event| worker_shared.publish(event),
                    &cancel,
                )
            })
            .map_err(|e| CppRefError::Other(format!("Failed to start search worker: {}", e)))?;

        Ok(SearchHandle {
            id,
            shared,
            worker: Some(worker),
            delivery: Foreground {
                activation: self.activation.clone(),
            },
            summary: None,
        })
    }
}

/// Scan every candidate file of `prepared`, reporting through `emit`.
fn execute(
    prepared: PreparedSearch,
    resolver: &dyn NameResolver,
    emit: &mut dyn FnMut(SearchEvent),
    cancelled: &dyn Fn() -> bool,
) -> SearchSummary {
    let PreparedSearch {
        id,
        target,
        files,
        mut snapshot,
    } = prepared;

    let started_at = Utc::now();
    let clock = Instant::now();
    let before = snapshot.builder().stats().counts();
    let total = files.len();
    log::info!(
        "Searching references to {} ({}) in {} candidate file(s)",
        target.qualified_name(),
        target.location(),
        total
    );

    let mut outcome = SearchOutcome::Finished;
    let (mut processed, mut skipped, mut rebuilt, mut reused, mut matches) = (0, 0, 0, 0, 0);
    emit(SearchEvent::Started { total });

    for (index, file) in files.iter().enumerate() {
        if cancelled() {
            outcome = SearchOutcome::Cancelled;
            break;
        }
        emit(SearchEvent::Progress {
            index,
            total,
            file: file.clone(),
        });

        let obtained = obtain_document(&mut snapshot, file, &target.name);
        match &obtained {
            Obtained::Reused(_) => reused += 1,
            Obtained::Rebuilt(_) => rebuilt += 1,
            Obtained::Skipped(_) => skipped += 1,
        }
        if let Some(doc) = obtained.document() {
            for found in walk(doc, &target, &snapshot, resolver) {
                matches += 1;
                emit(SearchEvent::Match(found));
            }
        }
        processed += 1;
    }

    let work = snapshot.builder().stats().counts() - before;
    let elapsed = clock.elapsed();
    log::info!(
        "Search for {} {}: {} match(es) in {}/{} file(s) ({} rebuilt, {} skipped) in {:.2?}",
        target.qualified_name(),
        match outcome {
            SearchOutcome::Finished => "finished",
            SearchOutcome::Cancelled => "cancelled",
        },
        matches,
        processed,
        total,
        rebuilt,
        skipped,
        elapsed
    );

    let summary = SearchSummary {
        id,
        symbol: target.qualified_name(),
        declared_at: target.location(),
        outcome,
        files_total: total,
        files_processed: processed,
        files_skipped: skipped,
        files_rebuilt: rebuilt,
        files_reused: reused,
        matches,
        work,
        started_at,
        elapsed_ms: elapsed.as_millis() as u64,
    };
    emit(SearchEvent::Done(summary.clone()));
    summary
}

/// Applies events to the foreground sink and progress reporter.
struct Foreground {
    activation: Option<SharedActivation>,
}

impl Foreground {
    /// Returns the summary when `event` ends the search.
    fn apply(
        &mut self,
        event: SearchEvent,
        sink: &mut dyn ResultSink,
        progress: &mut dyn ProgressReporter,
    ) -> Option<SearchSummary> {
        match event {
            SearchEvent::Started { total } => progress.set_range(0, total),
            SearchEvent::Progress { index, file, .. } => {
                progress.set_value_and_text(index, &ingest::display_name(&file))
            }
            SearchEvent::Match(found) => {
                if let Some(handle) = sink.add_result(&found) {
                    if let Some(activation) = &self.activation {
                        let activation = Arc::clone(activation);
                        handle.set_activation(move |location| activation(location));
                    }
                }
            }
            SearchEvent::Done(summary) => {
                if summary.outcome == SearchOutcome::Finished {
                    progress.set_value(summary.files_total);
                }
                return Some(summary);
            }
        }
        None
    }
}

/// State shared between a worker and its handle.
struct Shared {
    cancel: AtomicBool,
    state: AtomicU8,
    batch: Mutex<Vec<SearchEvent>>,
    doorbell: Sender<()>,
    bell: Receiver<()>,
}

impl Shared {
    fn new() -> Self {
        let (doorbell, bell) = crossbeam_channel::bounded(1);
        Self {
            cancel: AtomicBool::new(false),
            state: AtomicU8::new(SearchState::Running as u8),
            batch: Mutex::new(Vec::new()),
            doorbell,
            bell,
        }
    }

    fn set_state(&self, state: SearchState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn publish(&self, event: SearchEvent) {
        let next = match &event {
            SearchEvent::Match(_) => Some(SearchState::ProducingResults),
            SearchEvent::Done(summary) => Some(match summary.outcome {
                SearchOutcome::Finished => SearchState::Finished,
                SearchOutcome::Cancelled => SearchState::Cancelled,
            }),
            _ => None,
        };
        {
            let mut batch = match self.batch.lock() {
                Ok(batch) => batch,
                Err(poisoned) => poisoned.into_inner(),
            };
            batch.push(event);
        }
        if let Some(state) = next {
            self.set_state(state);
        }
        // a full doorbell means a delivery is already pending
        let _ = self.doorbell.try_send(());
    }

    fn take_batch(&self) -> Vec<SearchEvent> {
        let mut batch = match self.batch.lock() {
            Ok(batch) => batch,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *batch)
    }
}

/// Foreground handle of a started search.
pub struct SearchHandle {
    id: Uuid,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<SearchSummary>>,
    delivery: Foreground,
    summary: Option<SearchSummary>,
}

impl std::fmt::Debug for SearchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl SearchHandle {
    /// Search id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the worker to stop before its next file.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::Relaxed);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SearchState {
        SearchState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Summary once the terminal event has been delivered.
    pub fn summary(&self) -> Option<&SearchSummary> {
        self.summary.as_ref()
    }

    /// Deliver the pending batch, if any, without blocking.
    ///
    /// Returns whether the terminal event has been delivered.
    pub fn pump(&mut self, sink: &mut dyn ResultSink, progress: &mut dyn ProgressReporter) -> bool {
        if self.shared.bell.try_recv().is_ok() {
            self.drain(sink, progress);
        }
        self.summary.is_some()
    }

    /// Deliver batches until the search ends, then join the worker.
    pub fn wait(
        mut self,
        sink: &mut dyn ResultSink,
        progress: &mut dyn ProgressReporter,
    ) -> Result<SearchSummary> {
        while self.summary.is_none() {
            if progress.is_cancel_requested() {
                self.cancel();
            }
            match self.shared.bell.recv_timeout(WAIT_POLL) {
                Ok(()) => self.drain(sink, progress),
                Err(RecvTimeoutError::Timeout) => {
                    if self.worker.as_ref().map_or(true, |w| w.is_finished()) {
                        self.drain(sink, progress);
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let joined = match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| CppRefError::Other("Search worker panicked".to_string()))?,
            None => self
                .summary
                .clone()
                .ok_or_else(|| CppRefError::Other("Search worker already joined".to_string()))?,
        };
        Ok(self.summary.take().unwrap_or(joined))
    }

    fn drain(&mut self, sink: &mut dyn ResultSink, progress: &mut dyn ProgressReporter) {
        for event in self.shared.take_batch() {
            if self.summary.is_some() {
                break;
            }
            if let Some(summary) = self.delivery.apply(event, sink, progress) {
                self.summary = Some(summary);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::model::Workspace;
    use crate::resolve::{NameQuery, ScopeResolver};
    use crate::search::sink::{CollectingSink, NoProgress};
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        let ws = Workspace::open(dir.path(), ProjectConfig::default()).unwrap();
        (dir, ws)
    }

    fn foo_symbol(ws: &Workspace, file: &std::path::Path) -> Symbol {
        let snapshot = ws.snapshot();
        let symbol = snapshot
            .get(file)
            .unwrap()
            .scopes()
            .named("foo")
            .next()
            .unwrap()
            .clone();
        symbol
    }

    fn find_references() -> FindReferences {
        FindReferences::new(Arc::new(ScopeResolver::new()))
    }

    #[test]
    fn test_prepare_rejects_symbol_without_declaration() {
        let (dir, ws) = project(&[("a.cpp", "int foo;\n")]);
        let mut symbol = foo_symbol(&ws, &dir.path().join("a.cpp"));
        symbol.column += 1;
        let err = find_references().prepare(ws.snapshot(), &symbol).unwrap_err();
        assert_eq!(err.kind(), "InvalidSymbol");
    }

    #[test]
    fn test_prepare_canonicalizes_definition_to_header_declaration() {
        let (dir, ws) = project(&[
            ("a.h", "int foo(int x);\n"),
            ("a.cpp", "#include \"a.h\"\nint foo(int x) { return x; }\n"),
        ]);
        let definition = foo_symbol(&ws, &dir.path().join("a.cpp"));
        let prepared = find_references().prepare(ws.snapshot(), &definition).unwrap();
        assert_eq!(prepared.target().file, dir.path().join("a.h"));
        assert_eq!(prepared.files()[0], dir.path().join("a.h"));
        assert!(prepared.files().contains(&dir.path().join("a.cpp")));
    }

    #[test]
    fn test_started_search_matches_synchronous_run() {
        let (dir, ws) = project(&[
            ("a.h", "int foo();\n"),
            ("b.cpp", "#include \"a.h\"\nint b() { return foo(); }\n"),
            ("c.cpp", "#include \"a.h\"\nint c() { return foo() + foo(); }\n"),
        ]);
        let symbol = foo_symbol(&ws, &dir.path().join("a.h"));
        let search = find_references();

        let mut expected = CollectingSink::new();
        let summary = search
            .run(ws.snapshot(), &symbol, &mut expected, &mut NoProgress)
            .unwrap();
        assert_eq!(summary.outcome, SearchOutcome::Finished);
        assert_eq!(summary.matches, 3);

        let mut sink = CollectingSink::new();
        let handle = search.start(ws.snapshot(), &symbol, &mut sink).unwrap();
        assert!(sink.presented());
        let summary = handle.wait(&mut sink, &mut NoProgress).unwrap();
        assert_eq!(summary.outcome, SearchOutcome::Finished);
        assert_eq!(
            sink.results().collect::<Vec<_>>(),
            expected.results().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_handle_state_is_terminal_after_wait() {
        let (dir, ws) = project(&[("a.cpp", "int foo;\nint bar = foo;\n")]);
        let symbol = foo_symbol(&ws, &dir.path().join("a.cpp"));
        let mut sink = CollectingSink::new();
        let handle = find_references()
            .start(ws.snapshot(), &symbol, &mut sink)
            .unwrap();
        let shared = Arc::clone(&handle.shared);
        let summary = handle.wait(&mut sink, &mut NoProgress).unwrap();
        assert_eq!(summary.matches, 1);
        assert_eq!(
            SearchState::from_u8(shared.state.load(Ordering::Acquire)),
            SearchState::Finished
        );
    }

    #[test]
    fn test_activation_installed_on_handles() {
        let (dir, ws) = project(&[("a.cpp", "int foo;\nint bar = foo;\n")]);
        let symbol = foo_symbol(&ws, &dir.path().join("a.cpp"));
        let opened = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&opened);
        let search = find_references().with_activation(move |loc| {
            seen.lock().unwrap().push((loc.line, loc.column));
        });

        let mut sink = CollectingSink::new();
        search
            .run(ws.snapshot(), &symbol, &mut sink, &mut NoProgress)
            .unwrap();
        assert!(sink.handle_mut(0).unwrap().activate());
        assert_eq!(opened.lock().unwrap().as_slice(), &[(2, 10)]);
    }

    /// Blocks the first `resolve` call until the gate opens.
    struct GatedResolver {
        inner: ScopeResolver,
        gate: Mutex<Option<Receiver<()>>>,
    }

    impl NameResolver for GatedResolver {
        fn resolve<'a>(&self, ctx: &LookupContext<'a>, query: &NameQuery<'_>) -> Vec<&'a Symbol> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            self.inner.resolve(ctx, query)
        }

        fn canonical_declaration<'a>(
            &self,
            ctx: &LookupContext<'a>,
            symbol: &'a Symbol,
        ) -> &'a Symbol {
            self.inner.canonical_declaration(ctx, symbol)
        }
    }

    /// Requests cancellation once the second file is announced, and opens
    /// the resolver gate only after the request has been seen once.
    struct CancelOnSecondFile {
        announced: Vec<usize>,
        requested: Cell<bool>,
        release: Sender<()>,
    }

    impl ProgressReporter for CancelOnSecondFile {
        fn set_range(&mut self, _min: usize, _max: usize) {}

        fn set_value_and_text(&mut self, value: usize, _text: &str) {
            self.announced.push(value);
        }

        fn set_value(&mut self, _value: usize) {}

        fn is_cancel_requested(&self) -> bool {
            if !self.announced.contains(&1) {
                return false;
            }
            if self.requested.get() {
                let _ = self.release.try_send(());
            } else {
                self.requested.set(true);
            }
            true
        }
    }

    #[test]
    fn test_cancel_during_wait_stops_after_current_file() {
        let (dir, ws) = project(&[
            ("a.h", "int foo();\n"),
            ("b.cpp", "#include \"a.h\"\nint b() { return foo() + foo(); }\n"),
            ("c.cpp", "#include \"a.h\"\nint c() { return foo(); }\n"),
        ]);
        let symbol = foo_symbol(&ws, &dir.path().join("a.h"));
        let (release, gate) = crossbeam_channel::bounded(1);
        let search = FindReferences::new(Arc::new(GatedResolver {
            inner: ScopeResolver::new(),
            gate: Mutex::new(Some(gate)),
        }));
        let mut progress = CancelOnSecondFile {
            announced: Vec::new(),
            requested: Cell::new(false),
            release,
        };

        let mut sink = CollectingSink::new();
        let handle = search.start(ws.snapshot(), &symbol, &mut sink).unwrap();
        let shared = Arc::clone(&handle.shared);
        let summary = handle.wait(&mut sink, &mut progress).unwrap();

        assert_eq!(summary.outcome, SearchOutcome::Cancelled);
        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.matches, 2);
        assert_eq!(progress.announced, vec![0, 1]);
        let files: Vec<_> = sink.results().map(|m| m.file.clone()).collect();
        assert_eq!(files, vec![dir.path().join("b.cpp"), dir.path().join("b.cpp")]);
        assert_eq!(
            SearchState::from_u8(shared.state.load(Ordering::Acquire)),
            SearchState::Cancelled
        );
    }

    #[derive(Default)]
    struct Recorder {
        range: Option<(usize, usize)>,
        announced: Vec<usize>,
    }

    impl ProgressReporter for Recorder {
        fn set_range(&mut self, min: usize, max: usize) {
            self.range = Some((min, max));
        }

        fn set_value_and_text(&mut self, value: usize, _text: &str) {
            self.announced.push(value);
        }

        fn set_value(&mut self, _value: usize) {}
    }

    fn found(line: u32) -> MatchResult {
        MatchResult {
            file: PathBuf::from("/p/b.cpp"),
            line,
            line_text: "foo();".to_string(),
            column: 0,
            length: 3,
        }
    }

    #[test]
    fn test_pump_drains_coalesced_batch_at_once() {
        let shared = Arc::new(Shared::new());
        let mut handle = SearchHandle {
            id: Uuid::new_v4(),
            shared: Arc::clone(&shared),
            worker: None,
            delivery: Foreground { activation: None },
            summary: None,
        };

        shared.publish(SearchEvent::Started { total: 2 });
        shared.publish(SearchEvent::Progress {
            index: 0,
            total: 2,
            file: PathBuf::from("/p/b.cpp"),
        });
        shared.publish(SearchEvent::Match(found(1)));
        shared.publish(SearchEvent::Match(found(2)));
        assert_eq!(shared.bell.len(), 1);
        assert_eq!(handle.state(), SearchState::ProducingResults);

        let mut sink = CollectingSink::new();
        let mut progress = Recorder::default();
        assert!(!handle.pump(&mut sink, &mut progress));
        assert_eq!(sink.len(), 2);
        assert_eq!(progress.range, Some((0, 2)));
        assert_eq!(progress.announced, vec![0]);
        assert!(shared.bell.is_empty());

        assert!(!handle.pump(&mut sink, &mut progress));
        assert_eq!(sink.len(), 2);
    }
}
