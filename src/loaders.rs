//! Schema document loading
//!
//! The compile pipeline never opens files itself. It asks a [`SchemaLoader`]
//! for the bytes behind a location, so tests can run against in-memory
//! documents and applications can sandbox file access. Network fetches are
//! always refused.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{LoadError, Result};
use crate::locations::{normalize_path, Location};

/// Loader options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Accept absolute paths, `file:` URLs, and paths escaping the root
    pub allow_absolute: bool,
    /// Largest accepted schema document in bytes (0 = unlimited)
    pub max_document_size: usize,
    /// Largest number of documents one compilation may load (0 = unlimited)
    pub max_documents: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            allow_absolute: false,
            max_document_size: 16 * 1024 * 1024, // 16 MB
            max_documents: 1000,
        }
    }
}

impl LoaderOptions {
    /// Create new options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict options (more restrictive)
    pub fn strict() -> Self {
        Self {
            allow_absolute: false,
            max_document_size: 1024 * 1024, // 1 MB
            max_documents: 50,
        }
    }

    /// Create permissive options (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            allow_absolute: true,
            max_document_size: 0,
            max_documents: 0,
        }
    }

    /// Check a document size
    pub fn check_document_size(&self, location: &str, size: usize) -> Result<()> {
        if self.max_document_size != 0 && size > self.max_document_size {
            Err(LoadError::new(format!(
                "document size {} bytes exceeds maximum {} bytes",
                size, self.max_document_size
            ))
            .with_location(location)
            .into())
        } else {
            Ok(())
        }
    }

    /// Check the number of loaded documents
    pub fn check_document_count(&self, count: usize) -> Result<()> {
        if self.max_documents != 0 && count > self.max_documents {
            Err(LoadError::new(format!(
                "schema set needs {} documents, maximum is {}",
                count, self.max_documents
            ))
            .into())
        } else {
            Ok(())
        }
    }
}

/// Source of schema document bytes
pub trait SchemaLoader {
    /// Load the document at `location`, already resolved against its
    /// including document
    fn load(&self, location: &str) -> Result<Vec<u8>>;

    /// Options the loader enforces
    fn options(&self) -> &LoaderOptions;
}

/// Reject locations no loader may serve
fn refuse_remote(location: &str, classified: &Location) -> Result<()> {
    if classified.is_remote() {
        return Err(LoadError::new("network schema locations are not supported")
            .with_location(location)
            .into());
    }
    Ok(())
}

/// Loads schema documents from a directory tree
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
    options: LoaderOptions,
}

impl FsLoader {
    /// Create a loader rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            options: LoaderOptions::default(),
        }
    }

    /// Set the options
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    fn resolve(&self, location: &str) -> Result<PathBuf> {
        let classified = Location::classify(location)?;
        refuse_remote(location, &classified)?;
        match classified {
            Location::Relative(ref path) => {
                if classified.escapes_root() && !self.options.allow_absolute {
                    return Err(LoadError::new("location escapes the loader root")
                        .with_location(location)
                        .into());
                }
                Ok(self.root.join(path))
            }
            Location::Absolute(path) => {
                if self.options.allow_absolute {
                    Ok(path)
                } else {
                    Err(LoadError::new("absolute schema locations are not allowed")
                        .with_location(location)
                        .into())
                }
            }
            Location::Url(url) => Err(LoadError::new(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            ))
            .with_location(location)
            .into()),
        }
    }
}

impl SchemaLoader for FsLoader {
    fn load(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.resolve(location)?;
        let metadata = fs::metadata(&path).map_err(|e| {
            LoadError::new(format!("failed to read '{}': {}", path.display(), e))
                .with_location(location)
        })?;
        self.options
            .check_document_size(location, metadata.len() as usize)?;
        let bytes = fs::read(&path).map_err(|e| {
            LoadError::new(format!("failed to read '{}': {}", path.display(), e))
                .with_location(location)
        })?;
        tracing::trace!(location, bytes = bytes.len(), "loaded schema document");
        Ok(bytes)
    }

    fn options(&self) -> &LoaderOptions {
        &self.options
    }
}

/// Serves schema documents registered in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: IndexMap<String, Vec<u8>>,
    options: LoaderOptions,
}

impl MemoryLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under `location`
    pub fn with_document(mut self, location: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(location, content);
        self
    }

    /// Register a document under `location`
    pub fn insert(&mut self, location: &str, content: impl Into<Vec<u8>>) {
        self.documents
            .insert(normalize_path(location), content.into());
    }

    /// Set the options
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }
}

impl SchemaLoader for MemoryLoader {
    fn load(&self, location: &str) -> Result<Vec<u8>> {
        let classified = Location::classify(location)?;
        refuse_remote(location, &classified)?;
        let key = normalize_path(location);
        let bytes = self.documents.get(&key).ok_or_else(|| {
            LoadError::new("no such schema document").with_location(location)
        })?;
        self.options.check_document_size(location, bytes.len())?;
        Ok(bytes.clone())
    }

    fn options(&self) -> &LoaderOptions {
        &self.options
    }
}
