//! Document ingestion into the vector store.
//!
//! Walks the data directory recursively (or takes a single uploaded file),
//! converts each allow-listed file to text, splits it into chunks, embeds
//! them, deduplicates the batch by content id, and hands it to the store.
//! Per-file failures are logged and skipped; they never abort a batch.

pub mod convert;

pub use convert::{ConvertedDocument, DocumentConverter, PlainTextConverter};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::chunking::TextSplitter;
use crate::config::Settings;
use crate::core::DocumentChunk;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::store::VectorStore;

/// Ingests documents from the data directory into the store.
#[derive(Clone)]
pub struct Ingestor {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    splitter: Arc<dyn TextSplitter>,
    converter: Arc<dyn DocumentConverter>,
    data_dir: PathBuf,
    file_types: Vec<String>,
    json_selector: String,
    csv_separator: u8,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("data_dir", &self.data_dir)
            .field("file_types", &self.file_types)
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    /// Creates an ingestor from the configuration snapshot.
    #[must_use]
    pub fn new(
        settings: &Settings,
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        splitter: Arc<dyn TextSplitter>,
    ) -> Self {
        Self {
            store,
            embedder,
            splitter,
            converter: Arc::new(PlainTextConverter),
            data_dir: settings.data_directory(),
            file_types: settings.file_types(),
            json_selector: settings.json_schema().to_string(),
            csv_separator: settings.csv_separator(),
        }
    }

    /// Replaces the fallback document converter.
    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Walks the data directory and ingests every allow-listed file.
    ///
    /// Returns the number of chunks written. Files whose extension is
    /// outside the allow-list are silently ignored; files that fail to
    /// convert are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure for the final batch write.
    pub fn load_directory(&self) -> Result<usize> {
        let mut batch: Vec<DocumentChunk> = Vec::new();
        let mut files = 0usize;

        // Sorted traversal keeps the batch order, and therefore which
        // source wins dedup for duplicate content, stable across runs
        for entry in WalkDir::new(&self.data_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let Some(file_type) = extension_of(path) else {
                continue;
            };
            if !self.file_types.contains(&file_type) {
                continue;
            }

            let dataset = self.dataset_for(path);
            match self.chunks_for_file(path, &file_type, &dataset) {
                Ok(chunks) => {
                    files += 1;
                    batch.extend(chunks);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping file");
                }
            }
        }

        let batch = dedupe_by_id(batch);
        let count = batch.len();
        tracing::info!(files, chunks = count, "writing documents to the vector store");
        self.store.add(&batch)?;
        Ok(count)
    }

    /// Ingests a single file under an explicit dataset.
    ///
    /// Files whose extension is outside the allow-list are silently
    /// ignored (returning 0).
    ///
    /// # Errors
    ///
    /// Returns an error if conversion, embedding, or the store write
    /// fails.
    pub fn add_document(&self, path: &Path, dataset: &str) -> Result<usize> {
        let Some(file_type) = extension_of(path) else {
            return Ok(0);
        };
        if !self.file_types.contains(&file_type) {
            return Ok(0);
        }

        let batch = dedupe_by_id(self.chunks_for_file(path, &file_type, dataset)?);
        let count = batch.len();
        tracing::info!(path = %path.display(), chunks = count, "wrote document to the vector store");
        self.store.add(&batch)?;
        Ok(count)
    }

    /// Converts, splits, and embeds one file.
    fn chunks_for_file(
        &self,
        path: &Path,
        file_type: &str,
        dataset: &str,
    ) -> Result<Vec<DocumentChunk>> {
        let converted = convert::convert_file(
            path,
            file_type,
            &self.json_selector,
            self.csv_separator,
            self.converter.as_ref(),
        )?;

        // Tabular input arrives pre-chunked as one record per row
        let pieces = match converted {
            ConvertedDocument::Text(text) => self.splitter.split(&text)?,
            ConvertedDocument::Records(records) => records,
        };
        if pieces.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = pieces.iter().map(String::as_str).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;

        let source = path.display().to_string();
        Ok(pieces
            .into_iter()
            .zip(embeddings)
            .map(|(content, embedding)| DocumentChunk::new(content, &source, dataset, embedding))
            .collect())
    }

    /// Derives the dataset from the last directory component of the file's
    /// parent, relative to the data root. Files directly under the root
    /// get the empty dataset.
    fn dataset_for(&self, path: &Path) -> String {
        path.parent()
            .and_then(|parent| parent.strip_prefix(&self.data_dir).ok())
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Lowercased file extension, if any.
fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Deduplicates a batch by chunk id, keeping first occurrences in order.
fn dedupe_by_id(chunks: Vec<DocumentChunk>) -> Vec<DocumentChunk> {
    let mut seen = std::collections::HashSet::new();
    chunks
        .into_iter()
        .filter(|chunk| seen.insert(chunk.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::RecursiveCharacterSplitter;
    use crate::embedding::{DEFAULT_DIMENSIONS, FallbackEmbedder};
    use tempfile::TempDir;

    fn setup(data_dir: &Path) -> (Ingestor, TempDir) {
        let store_dir = TempDir::new().unwrap();
        let store = VectorStore::open(store_dir.path().join("test.db"), 2).unwrap();
        store.setup(DEFAULT_DIMENSIONS).unwrap();

        let mut map = std::collections::BTreeMap::new();
        map.insert(
            "data_directory".to_string(),
            data_dir.display().to_string(),
        );
        let settings = Settings::from_map(map);

        let ingestor = Ingestor::new(
            &settings,
            store,
            Arc::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS)),
            Arc::new(RecursiveCharacterSplitter::new(1024, 0).unwrap()),
        );
        (ingestor, store_dir)
    }

    #[test]
    fn test_cold_ingest_deduplicates_identical_files() {
        let data = TempDir::new().unwrap();
        std::fs::write(data.path().join("a.txt"), "hello world").unwrap();
        std::fs::write(data.path().join("b.txt"), "hello world").unwrap();

        let (ingestor, _store_dir) = setup(data.path());
        let count = ingestor.load_directory().unwrap();

        // Identical content collapses to a single chunk row
        assert_eq!(count, 1);
        assert_eq!(ingestor.store.chunk_count().unwrap(), 1);

        // The surviving row carries the first file's source path, and the
        // sorted walk makes "first" mean lexicographically first
        let names = ingestor.store.get_all_document_names().unwrap();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("a.txt"));
    }

    #[test]
    fn test_dataset_from_subdirectory() {
        let data = TempDir::new().unwrap();
        let sub = data.path().join("reports");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("q1.txt"), "quarterly numbers").unwrap();
        std::fs::write(data.path().join("root.txt"), "root level file").unwrap();

        let (ingestor, _store_dir) = setup(data.path());
        ingestor.load_directory().unwrap();

        let datasets = ingestor.store.get_datasets().unwrap();
        assert!(datasets.contains(&"reports".to_string()));
        assert!(datasets.contains(&String::new()));
    }

    #[test]
    fn test_disallowed_extension_ignored() {
        let data = TempDir::new().unwrap();
        std::fs::write(data.path().join("a.exe"), "binary junk").unwrap();
        std::fs::write(data.path().join("b.txt"), "real content").unwrap();

        let (ingestor, _store_dir) = setup(data.path());
        ingestor.load_directory().unwrap();

        let names = ingestor.store.get_all_document_names().unwrap();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("b.txt"));
    }

    #[test]
    fn test_broken_file_skipped_not_fatal() {
        let data = TempDir::new().unwrap();
        std::fs::write(data.path().join("bad.json"), "{not valid json").unwrap();
        std::fs::write(data.path().join("good.txt"), "fine content").unwrap();

        let (ingestor, _store_dir) = setup(data.path());
        let count = ingestor.load_directory().unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_add_document_explicit_dataset() {
        let data = TempDir::new().unwrap();
        let path = data.path().join("upload.txt");
        std::fs::write(&path, "uploaded content").unwrap();

        let (ingestor, _store_dir) = setup(data.path());
        let count = ingestor.add_document(&path, "uploads").unwrap();
        assert_eq!(count, 1);
        assert_eq!(ingestor.store.get_datasets().unwrap(), vec!["uploads"]);
    }

    #[test]
    fn test_add_document_disallowed_type() {
        let data = TempDir::new().unwrap();
        let path = data.path().join("binary.exe");
        std::fs::write(&path, "junk").unwrap();

        let (ingestor, _store_dir) = setup(data.path());
        assert_eq!(ingestor.add_document(&path, "ds").unwrap(), 0);
    }

    #[test]
    fn test_dedupe_by_id_keeps_first() {
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        let emb = |t: &str| {
            use crate::embedding::Embedder as _;
            embedder.embed(t).unwrap()
        };
        let chunks = vec![
            DocumentChunk::new("same".to_string(), "a.txt", "ds", emb("same")),
            DocumentChunk::new("same".to_string(), "b.txt", "ds", emb("same")),
            DocumentChunk::new("other".to_string(), "c.txt", "ds", emb("other")),
        ];
        let deduped = dedupe_by_id(chunks);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].source(), Some("a.txt"));
    }
}
