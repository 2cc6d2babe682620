//! Snapshots of the project's documents.
//!
//! The [`DocumentCache`] is the session-wide store: a map of immutable
//! documents whose entries are only ever replaced whole. A [`Snapshot`] is a
//! cheap private copy of that map plus the include dependency relation; a
//! search captures one at start and works against it until it finishes.

use super::document::{Document, DocumentBuilder};
use crate::config::ProjectConfig;
use crate::error::Result;
use crate::ingest;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Include edges between the documents of a snapshot.
#[derive(Debug, Clone, Default)]
pub struct DependencyTable {
    includes: HashMap<PathBuf, Vec<PathBuf>>,
    included_by: HashMap<PathBuf, Vec<PathBuf>>,
}

impl DependencyTable {
    /// Build the relation from a set of documents.
    pub fn from_documents<'a>(docs: impl IntoIterator<Item = &'a Arc<Document>>) -> Self {
        let mut docs: Vec<&Arc<Document>> = docs.into_iter().collect();
        docs.sort_by(|a, b| a.path().cmp(b.path()));

        let mut table = Self::default();
        for doc in docs {
            table.set_includes(doc);
        }
        table
    }

    /// Replace the outgoing edges of `doc`.
    pub fn set_includes(&mut self, doc: &Document) {
        let path = doc.path().to_path_buf();
        if let Some(old) = self.includes.remove(&path) {
            for target in old {
                if let Some(back) = self.included_by.get_mut(&target) {
                    back.retain(|p| *p != path);
                }
            }
        }

        let mut targets = Vec::new();
        for fact in doc.includes() {
            if let Some(target) = &fact.resolved {
                if !targets.contains(target) {
                    targets.push(target.clone());
                }
            }
        }
        for target in &targets {
            let back = self.included_by.entry(target.clone()).or_default();
            if !back.contains(&path) {
                back.push(path.clone());
                back.sort();
            }
        }
        self.includes.insert(path, targets);
    }

    /// Files `path` includes directly.
    pub fn direct_includes(&self, path: &Path) -> &[PathBuf] {
        self.includes.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Files that include `path` directly.
    pub fn direct_dependents(&self, path: &Path) -> &[PathBuf] {
        self.included_by.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Files that transitively include `path`, breadth first.
    pub fn depends_on(&self, path: &Path) -> Vec<PathBuf> {
        let mut seen: HashSet<&Path> = HashSet::new();
        seen.insert(path);
        let mut order = Vec::new();
        let mut queue: VecDeque<&Path> = VecDeque::from([path]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.direct_dependents(current) {
                if seen.insert(dependent.as_path()) {
                    order.push(dependent.clone());
                    queue.push_back(dependent.as_path());
                }
            }
        }
        order
    }

    /// Files `path` transitively includes, depth-first pre-order.
    pub fn includes_closure(&self, path: &Path) -> Vec<PathBuf> {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        seen.insert(path.to_path_buf());
        let mut order = Vec::new();
        self.visit_includes(path, &mut seen, &mut order);
        order
    }

    fn visit_includes(&self, path: &Path, seen: &mut HashSet<PathBuf>, order: &mut Vec<PathBuf>) {
        for target in self.direct_includes(path) {
            if seen.insert(target.clone()) {
                order.push(target.clone());
                self.visit_includes(target, seen, order);
            }
        }
    }
}

/// Session-wide document store.
///
/// Entries are replaced whole; a reader holding an `Arc<Document>` never
/// observes a change.
#[derive(Debug, Default)]
pub struct DocumentCache {
    docs: RwLock<HashMap<PathBuf, Arc<Document>>>,
}

impl DocumentCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current document for `path`.
    pub fn get(&self, path: &Path) -> Option<Arc<Document>> {
        match self.docs.read() {
            Ok(docs) => docs.get(path).cloned(),
            Err(poisoned) => poisoned.into_inner().get(path).cloned(),
        }
    }

    /// Install `doc`, replacing any previous entry.
    pub fn insert(&self, doc: Arc<Document>) {
        let mut docs = match self.docs.write() {
            Ok(docs) => docs,
            Err(poisoned) => poisoned.into_inner(),
        };
        docs.insert(doc.path().to_path_buf(), doc);
    }

    /// Install `doc` only if the entry is still `expected`.
    ///
    /// Returns whether the swap happened. A search that rebuilt a file from
    /// disk does not clobber a buffer installed by the editor meanwhile.
    pub fn replace(&self, expected: Option<&Arc<Document>>, doc: Arc<Document>) -> bool {
        let mut docs = match self.docs.write() {
            Ok(docs) => docs,
            Err(poisoned) => poisoned.into_inner(),
        };
        let current = docs.get(doc.path());
        let unchanged = match (current, expected) {
            (None, None) => true,
            (Some(current), Some(expected)) => Arc::ptr_eq(current, expected),
            _ => false,
        };
        if unchanged {
            docs.insert(doc.path().to_path_buf(), doc);
        }
        unchanged
    }

    /// Drop the entry for `path`.
    pub fn remove(&self, path: &Path) -> Option<Arc<Document>> {
        let mut docs = match self.docs.write() {
            Ok(docs) => docs,
            Err(poisoned) => poisoned.into_inner(),
        };
        docs.remove(path)
    }

    /// Copy of the current entries.
    pub fn entries(&self) -> HashMap<PathBuf, Arc<Document>> {
        match self.docs.read() {
            Ok(docs) => docs.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        match self.docs.read() {
            Ok(docs) => docs.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A consistent, privately owned view of the project.
#[derive(Debug, Clone)]
pub struct Snapshot {
    docs: HashMap<PathBuf, Arc<Document>>,
    deps: Arc<DependencyTable>,
    builder: DocumentBuilder,
    cache: Option<Arc<DocumentCache>>,
}

impl Snapshot {
    /// Empty snapshot not backed by a session cache.
    pub fn new(builder: DocumentBuilder) -> Self {
        Self {
            docs: HashMap::new(),
            deps: Arc::new(DependencyTable::default()),
            builder,
            cache: None,
        }
    }

    /// Snapshot of the documents currently in `cache`.
    pub fn capture(cache: &Arc<DocumentCache>, builder: DocumentBuilder) -> Self {
        let docs = cache.entries();
        let deps = DependencyTable::from_documents(docs.values());
        Self {
            docs,
            deps: Arc::new(deps),
            builder,
            cache: Some(Arc::clone(cache)),
        }
    }

    /// Document for `path`.
    pub fn get(&self, path: &Path) -> Option<&Arc<Document>> {
        self.docs.get(path)
    }

    /// Whether the snapshot holds `path`.
    pub fn contains(&self, path: &Path) -> bool {
        self.docs.contains_key(path)
    }

    /// Paths of all documents, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.docs.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Include relation.
    pub fn dependencies(&self) -> &DependencyTable {
        &self.deps
    }

    /// Files that transitively include `path`.
    pub fn depends_on(&self, path: &Path) -> Vec<PathBuf> {
        self.deps.depends_on(path)
    }

    /// Files `path` transitively includes.
    pub fn includes_closure(&self, path: &Path) -> Vec<PathBuf> {
        self.deps.includes_closure(path)
    }

    /// Builder documents are (re)built with.
    pub fn builder(&self) -> &DocumentBuilder {
        &self.builder
    }

    /// Session cache backing this snapshot, if any.
    pub fn cache(&self) -> Option<&Arc<DocumentCache>> {
        self.cache.as_ref()
    }

    /// Add or replace a document in this snapshot only.
    pub fn insert(&mut self, doc: Arc<Document>) {
        let includes_changed = match self.docs.get(doc.path()) {
            Some(old) => old.includes() != doc.includes(),
            None => true,
        };
        if includes_changed {
            Arc::make_mut(&mut self.deps).set_includes(&doc);
        }
        self.docs.insert(doc.path().to_path_buf(), doc);
    }

    /// Include-existence check for documents built against this snapshot.
    pub fn file_exists(&self, path: &Path) -> bool {
        self.docs.contains_key(path) || path.is_file()
    }
}

/// The project-wide parse and index collaborator.
///
/// Owns the session cache and the open editor buffers.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    builder: DocumentBuilder,
    cache: Arc<DocumentCache>,
    revision: u64,
}

impl Workspace {
    /// Index every source under `root`.
    ///
    /// Files that fail to build are logged and left out.
    pub fn open(root: &Path, config: ProjectConfig) -> Result<Self> {
        let root = ingest::normalize_path(root);
        let sources = ingest::discover_sources(&root, &config)?;
        let builder = DocumentBuilder::new(config);
        let cache = Arc::new(DocumentCache::new());

        log::info!("Indexing {} source file(s) under {}", sources.len(), root.display());
        for path in &sources {
            match builder.build_file(path, &|p: &Path| p.is_file()) {
                Ok(doc) => cache.insert(Arc::new(doc)),
                Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
            }
        }

        Ok(Self {
            root,
            builder,
            cache,
            revision: 0,
        })
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared builder.
    pub fn builder(&self) -> &DocumentBuilder {
        &self.builder
    }

    /// Session cache.
    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    /// Capture a snapshot for a search.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.cache, self.builder.clone())
    }

    /// Replace `path` with unsaved editor contents.
    pub fn update_buffer(&mut self, path: &Path, text: &str) -> Result<Arc<Document>> {
        self.revision += 1;
        let path = ingest::normalize_path(path);
        let cache = Arc::clone(&self.cache);
        let exists = move |p: &Path| cache.get(p).is_some() || p.is_file();
        let doc = Arc::new(
            self.builder
                .build_buffer(&path, text.to_string(), self.revision, &exists)?,
        );
        self.cache.insert(Arc::clone(&doc));
        Ok(doc)
    }

    /// Rebuild `path` from disk, dropping it when it no longer exists.
    pub fn refresh(&mut self, path: &Path) -> Result<Option<Arc<Document>>> {
        let path = ingest::normalize_path(path);
        if !path.is_file() {
            self.cache.remove(&path);
            return Ok(None);
        }
        let cache = Arc::clone(&self.cache);
        let exists = move |p: &Path| cache.get(p).is_some() || p.is_file();
        let doc = Arc::new(self.builder.build_file(&path, &exists)?);
        self.cache.insert(Arc::clone(&doc));
        Ok(Some(doc))
    }
}
