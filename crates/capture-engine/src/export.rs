//! Export serialization and delivery.
//!
//! Serialization is pure: schema + rows in, document text out. Delivering
//! the document (writing a file, handing it to a host) is a separate,
//! swappable [`ExportSink`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use posecap_common::error::{PosecapError, PosecapResult};
use posecap_pose_model::KeypointSchema;

/// A complete export, produced once per finalized session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDocument {
    pub file_name: String,
    pub contents: String,
    pub row_count: usize,
}

/// Header line, a newline, then rows joined by newlines (no trailing newline).
pub fn serialize_document(schema: &KeypointSchema, rows: &[String]) -> String {
    let header = schema.header();
    let body_len: usize = rows.iter().map(|r| r.len() + 1).sum();
    let mut out = String::with_capacity(header.len() + 1 + body_len);
    out.push_str(&header);
    out.push('\n');
    out.push_str(&rows.join("\n"));
    out
}

impl ExportDocument {
    pub fn new(schema: &KeypointSchema, rows: &[String], file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: serialize_document(schema, rows),
            row_count: rows.len(),
        }
    }
}

/// Destination for finished export documents.
pub trait ExportSink: Send {
    /// Persist or hand off the document, returning where it went.
    fn deliver(&mut self, document: &ExportDocument) -> PosecapResult<PathBuf>;
}

/// Writes export documents into a directory.
#[derive(Debug, Clone)]
pub struct FileExportSink {
    dir: PathBuf,
}

impl FileExportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for FileExportSink {
    fn deliver(&mut self, document: &ExportDocument) -> PosecapResult<PathBuf> {
        if document.file_name.contains(&['/', '\\'][..]) {
            return Err(PosecapError::export(format!(
                "Export file name must not contain path separators: {}",
                document.file_name
            )));
        }
        std::fs::create_dir_all(&self.dir)?;

        // Write then rename so a partially written export is never visible.
        let path = self.dir.join(&document.file_name);
        let tmp = self.dir.join(format!(".{}.partial", document.file_name));
        std::fs::write(&tmp, &document.contents)?;
        std::fs::rename(&tmp, &path)?;

        tracing::info!(path = %path.display(), rows = document.row_count, "CSV exported");
        Ok(path)
    }
}

/// Keeps delivered documents in memory. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryExportSink {
    documents: Arc<Mutex<Vec<ExportDocument>>>,
}

impl MemoryExportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents delivered so far, oldest first.
    pub fn documents(&self) -> Vec<ExportDocument> {
        self.documents
            .lock()
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }
}

impl ExportSink for MemoryExportSink {
    fn deliver(&mut self, document: &ExportDocument) -> PosecapResult<PathBuf> {
        self.documents
            .lock()
            .map_err(|_| PosecapError::export("Export store lock poisoned"))?
            .push(document.clone());
        Ok(PathBuf::from(&document.file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point_schema() -> KeypointSchema {
        KeypointSchema::from_names(["a", "b"]).unwrap()
    }

    #[test]
    fn document_is_header_then_rows() {
        let rows = vec!["0.100,1,2,0.5,,,".to_string(), "0.200,,,,3,4,1".to_string()];
        let text = serialize_document(&two_point_schema(), &rows);
        assert_eq!(
            text,
            "timestamp,a_x,a_y,a_score,b_x,b_y,b_score\n0.100,1,2,0.5,,,\n0.200,,,,3,4,1"
        );
    }

    #[test]
    fn header_is_present_without_rows() {
        let text = serialize_document(&two_point_schema(), &[]);
        assert_eq!(text, "timestamp,a_x,a_y,a_score,b_x,b_y,b_score\n");
    }

    #[test]
    fn file_sink_writes_into_directory() {
        let dir = std::env::temp_dir().join("posecap_test_file_export");
        let _ = std::fs::remove_dir_all(&dir);

        let doc = ExportDocument::new(&two_point_schema(), &["0.000,1,1,1,2,2,1".into()], "out.csv");
        let path = FileExportSink::new(&dir).deliver(&doc).unwrap();
        assert_eq!(path, dir.join("out.csv"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), doc.contents);
        assert!(!dir.join(".out.csv.partial").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn file_sink_rejects_path_in_name() {
        let doc = ExportDocument::new(&two_point_schema(), &[], "../escape.csv");
        let err = FileExportSink::new(std::env::temp_dir()).deliver(&doc).unwrap_err();
        assert!(matches!(err, PosecapError::Export { .. }));
    }

    #[test]
    fn memory_sink_clones_share_documents() {
        let sink = MemoryExportSink::new();
        let mut writer = sink.clone();
        let doc = ExportDocument::new(&two_point_schema(), &[], "x.csv");
        writer.deliver(&doc).unwrap();
        assert_eq!(sink.documents(), vec![doc]);
    }
}
