//! `FOLDER` connectors: harvest files from a directory tree, or publish
//! records as files below a root directory.

use crate::harvest::connector::Connector;
use crate::harvest::extract::{enrich, MetadataExtractor};
use crate::harvest::template::{
    Argument, ArgumentKind, BrokerDefinition, ConnectorTemplate, InvalidDefinition,
};
use crate::model::{ContentType, DataReference};
use crate::traits::{DataInputError, DataOutputError, InputBroker, OutputBroker, ReleaseError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const FOLDER: &str = "FOLDER";
pub const P_ROOT_FOLDER: &str = "rootFolder";
pub const P_HOST_URL: &str = "hostUrl";
pub const P_PATTERN: &str = "pattern";
pub const P_RECURSIVE: &str = "recursive";

// ============================================================================
// Input
// ============================================================================

/// Builds [`FolderInput`] brokers.
#[derive(Default, Clone)]
pub struct FolderInputConnector {
    extractor: Option<Arc<dyn MetadataExtractor>>,
}

impl FolderInputConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enriches harvested PDF documents with extracted metadata.
    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }
}

impl Connector for FolderInputConnector {
    type Broker = Box<dyn InputBroker>;

    fn template(&self) -> ConnectorTemplate {
        ConnectorTemplate::new(
            FOLDER,
            "Folder",
            vec![
                Argument::required(P_ROOT_FOLDER, "Root folder", ArgumentKind::Path),
                Argument::optional(
                    P_PATTERN,
                    "File extensions (comma separated)",
                    ArgumentKind::String,
                ),
                Argument::optional(P_RECURSIVE, "Include sub-folders", ArgumentKind::Boolean)
                    .with_default("true"),
            ],
        )
    }

    fn build(&self, definition: BrokerDefinition) -> Result<Self::Broker, InvalidDefinition> {
        let root = PathBuf::from(definition.require(P_ROOT_FOLDER)?);
        let extensions = definition.get(P_PATTERN).map(|pattern| {
            pattern
                .split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect()
        });
        let recursive = definition.parse::<bool>(P_RECURSIVE)?.unwrap_or(true);

        Ok(Box::new(FolderInput {
            root,
            extensions,
            recursive,
            extractor: self.extractor.clone(),
            pending_dirs: Vec::new(),
            pending_files: VecDeque::new(),
            started: false,
        }))
    }
}

/// Walks a directory tree lazily, one directory listing at a time.
///
/// Files are yielded sorted by name within a directory; a directory's files
/// come before the contents of its sub-directories.
pub struct FolderInput {
    root: PathBuf,
    extensions: Option<Vec<String>>,
    recursive: bool,
    extractor: Option<Arc<dyn MetadataExtractor>>,
    pending_dirs: Vec<PathBuf>,
    pending_files: VecDeque<PathBuf>,
    started: bool,
}

impl FolderInput {
    fn accepts(&self, path: &Path) -> bool {
        match &self.extensions {
            None => true,
            Some(extensions) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
                .unwrap_or(false),
        }
    }

    async fn list(&mut self, dir: &Path) -> Result<(), DataInputError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        let mut dirs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                if self.recursive {
                    dirs.push(path);
                }
            } else if file_type.is_file() && self.accepts(&path) {
                files.push(path);
            }
        }

        files.sort();
        dirs.sort();
        debug!(dir = %dir.display(), files = files.len(), dirs = dirs.len(), "Listed folder");

        self.pending_files.extend(files);
        // Stack: push in reverse so the first sub-directory is visited first.
        self.pending_dirs.extend(dirs.into_iter().rev());
        Ok(())
    }

    fn record_id(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl InputBroker for FolderInput {
    fn describe(&self) -> String {
        format!("{FOLDER}:{}", self.root.display())
    }

    async fn has_next(&mut self) -> Result<bool, DataInputError> {
        if !self.started {
            self.started = true;
            self.pending_dirs.push(self.root.clone());
        }
        while self.pending_files.is_empty() {
            let Some(dir) = self.pending_dirs.pop() else {
                return Ok(false);
            };
            self.list(&dir).await?;
        }
        Ok(true)
    }

    async fn next(&mut self) -> Result<DataReference, DataInputError> {
        let path = self.pending_files.pop_front().ok_or(DataInputError::Exhausted)?;
        let content = tokio::fs::read(&path).await?;
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(ContentType::from_extension)
            .unwrap_or(ContentType::Binary);

        let reference = DataReference::new(
            self.record_id(&path),
            format!("file://{}", path.display()),
            self.describe(),
            content,
            content_type,
        );

        Ok(match (&self.extractor, reference.content_type()) {
            (Some(extractor), ContentType::Pdf) => enrich(reference, extractor.as_ref()),
            _ => reference,
        })
    }

    async fn close(&mut self) -> Result<(), ReleaseError> {
        self.pending_dirs.clear();
        self.pending_files.clear();
        Ok(())
    }
}

// ============================================================================
// Output
// ============================================================================

/// Builds [`FolderOutput`] brokers.
#[derive(Debug, Default, Clone, Copy)]
pub struct FolderOutputConnector;

impl Connector for FolderOutputConnector {
    type Broker = Box<dyn OutputBroker>;

    fn template(&self) -> ConnectorTemplate {
        ConnectorTemplate::new(
            FOLDER,
            "Folder",
            vec![
                Argument::required(P_ROOT_FOLDER, "Root folder", ArgumentKind::Path),
                Argument::optional(P_HOST_URL, "Source host URL", ArgumentKind::Url),
            ],
        )
    }

    fn build(&self, definition: BrokerDefinition) -> Result<Self::Broker, InvalidDefinition> {
        let mut root = PathBuf::from(definition.require(P_ROOT_FOLDER)?);
        if let Some(host) = definition.get(P_HOST_URL).and_then(host_folder) {
            root.push(host);
        }
        Ok(Box::new(FolderOutput { root, written: 0 }))
    }
}

/// Folder name for the host part of a URL, e.g. `http://a.com:80/x` → `a.com_80`.
fn host_folder(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let host = rest.split(['/', '?', '#']).next()?;
    (!host.is_empty()).then(|| host.replace(':', "_"))
}

/// Writes each record to `<root>/<record id>`.
pub struct FolderOutput {
    root: PathBuf,
    written: usize,
}

impl FolderOutput {
    /// Destination path for a record id; `None` when nothing usable remains.
    fn target(&self, id: &str) -> Option<PathBuf> {
        let parts: Vec<String> = id
            .split(['/', '\\'])
            .filter(|p| !p.is_empty() && *p != "." && *p != "..")
            .map(|p| p.replace(':', "_"))
            .collect();
        if parts.is_empty() {
            return None;
        }
        let mut path = self.root.clone();
        path.extend(parts);
        Some(path)
    }
}

#[async_trait]
impl OutputBroker for FolderOutput {
    fn describe(&self) -> String {
        format!("{FOLDER}:{}", self.root.display())
    }

    async fn publish(&mut self, reference: &DataReference) -> Result<(), DataOutputError> {
        let target = self.target(reference.id()).ok_or_else(|| {
            DataOutputError::Rejected(format!("unusable record id '{}'", reference.id()))
        })?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, reference.content()).await?;
        self.written += 1;
        debug!(path = %target.display(), "Wrote record");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ReleaseError> {
        info!(root = %self.root.display(), written = self.written, "Folder output closed");
        Ok(())
    }
}
