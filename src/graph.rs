//! Inheritance traversal over entity documents.
//!
//! Documents are expanded depth-first: every document's transitive ancestors
//! precede it, and each physical file is decoded at most once per walk.

use crate::storage::{DocumentError, load_document, normalize_path, resolve_reference};
use crate::types::EntityDocument;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A decoded document with its merge precedence.
#[derive(Debug, Clone)]
pub struct LoadedDocument<D> {
    pub path: PathBuf,
    /// Higher precedence wins; ancestors always rank below their descendants.
    pub precedence: usize,
    /// Identifier of the document that declared the inheritance edge, when
    /// this one was reached through `inherits` rather than directly.
    pub inherited_from: Option<String>,
    pub document: D,
}

/// A candidate document that failed to load.
#[derive(Debug)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub error: DocumentError,
}

/// Result of expanding one or more entry-point documents.
#[derive(Debug)]
pub struct Expansion<D> {
    pub loaded: Vec<LoadedDocument<D>>,
    pub skipped: Vec<SkippedDocument>,
}

impl<D> Expansion<D> {
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

/// Label used to attribute inheritance: the slug, else the file name stem.
pub fn document_label<D: EntityDocument>(path: &Path, document: &D) -> String {
    document
        .slug()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .and_then(|n| n.split('.').next().map(|s| s.to_string()))
                .unwrap_or_default()
        })
}

/// Cycle-safe walker. One instance per top-level call; the visited set is
/// shared by every entry point visited through it.
pub struct InheritanceWalker<'a, D> {
    root: &'a Path,
    visited: HashSet<PathBuf>,
    loaded: Vec<LoadedDocument<D>>,
    skipped: Vec<SkippedDocument>,
}

impl<'a, D: EntityDocument> InheritanceWalker<'a, D> {
    /// `root` anchors relative inheritance references.
    pub fn new(root: &'a Path) -> Self {
        Self {
            root,
            visited: HashSet::new(),
            loaded: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Whether `path` has already been visited by this walker.
    pub fn has_visited(&self, path: &Path) -> bool {
        self.visited.contains(&normalize_path(path))
    }

    /// Visit `path` and everything it inherits from.
    pub fn visit(&mut self, path: &Path, inherited_from: Option<String>) {
        let key = normalize_path(path);
        if !self.visited.insert(key) {
            debug!(path = %path.display(), "already visited");
            return;
        }

        let document: D = match load_document(path) {
            Ok(document) => document,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "skipping document");
                self.skipped.push(SkippedDocument {
                    path: path.to_path_buf(),
                    error,
                });
                return;
            }
        };

        let label = document_label(path, &document);
        for reference in document.inherits() {
            match resolve_reference(reference, self.root, D::KIND) {
                Some(parent) => self.visit(&parent, Some(label.clone())),
                None => debug!(
                    reference = %reference,
                    from = %label,
                    "unresolved inheritance reference"
                ),
            }
        }

        let precedence = self.loaded.len();
        self.loaded.push(LoadedDocument {
            path: path.to_path_buf(),
            precedence,
            inherited_from,
            document,
        });
    }

    pub fn finish(self) -> Expansion<D> {
        Expansion {
            loaded: self.loaded,
            skipped: self.skipped,
        }
    }
}
