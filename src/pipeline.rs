// src/pipeline.rs

use crate::content::{Content, extract_content};
use crate::error::PipelineError;
use crate::invoice::InvoiceRecord;
use crate::invoice_store::{InvoiceExport, InvoiceHeader, InvoiceStore};
use crate::llm_extract::StructuredExtractor;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Instrument, info, info_span};

/// Wires content extraction, structured extraction and the store together,
/// one request at a time.
pub struct Pipeline {
    extractor: StructuredExtractor,
    store: InvoiceStore,
    upload_dir: PathBuf,
}

impl Pipeline {
    pub fn new(extractor: StructuredExtractor, store: InvoiceStore, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            store,
            upload_dir: upload_dir.into(),
        }
    }

    pub fn health() -> Value {
        json!({ "status": "Invoice OCR Backend Ready" })
    }

    /// Keep a copy of the upload, read it and extract a record. Nothing is persisted.
    pub async fn upload(&self, file: &Path) -> Result<InvoiceRecord, PipelineError> {
        let span = info_span!("upload", file = %file.display());
        async move {
            let stored = self.keep_upload(file)?;
            match extract_content(&stored) {
                Content::Error(msg) => Err(PipelineError::ContentUnreadable(msg)),
                content => Ok(self.extractor.extract(&content).await),
            }
        }
        .instrument(span)
        .await
    }

    /// Upload followed by save; returns the new invoice id with the record.
    pub async fn process(&self, file: &Path) -> Result<(String, InvoiceRecord), PipelineError> {
        let record = self.upload(file).await?;
        let invoice_id = self.save(&record)?;
        Ok((invoice_id, record))
    }

    pub fn save(&self, record: &InvoiceRecord) -> Result<String, PipelineError> {
        Ok(self.store.save(record)?)
    }

    /// Parse an InvoiceRecord JSON document and save it.
    pub fn save_json(&self, body: &str) -> Result<String, PipelineError> {
        let record: InvoiceRecord = serde_json::from_str(body)?;
        self.save(&record)
    }

    pub fn list(&self) -> Result<Vec<InvoiceHeader>, PipelineError> {
        Ok(self.store.list_all()?)
    }

    pub fn download(&self, invoice_id: &str) -> Result<Option<InvoiceExport>, PipelineError> {
        Ok(self.store.export_one(invoice_id)?)
    }

    fn keep_upload(&self, file: &Path) -> Result<PathBuf, PipelineError> {
        let name = file
            .file_name()
            .ok_or_else(|| PipelineError::ContentUnreadable("No file uploaded".to_string()))?;
        fs::create_dir_all(&self.upload_dir)?;
        let dest = self.upload_dir.join(name);
        if dest != file {
            fs::copy(file, &dest)?;
        }
        info!(dest = %dest.display(), "Upload stored");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::mock_record;
    use pretty_assertions::assert_eq;

    fn pipeline(dir: &Path, extractor: StructuredExtractor) -> Pipeline {
        Pipeline::new(extractor, InvoiceStore::new(dir.join("data")), dir.join("uploads"))
    }

    #[tokio::test]
    async fn test_upload_unsupported_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, "hello").unwrap();

        let err = pipeline(dir.path(), StructuredExtractor::unconfigured())
            .upload(&file)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(dir.path().join("uploads/notes.txt").exists());
    }

    #[tokio::test]
    async fn test_process_image_without_model() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scan.jpg");
        fs::write(&file, [0xFF, 0xD8, 0xFF]).unwrap();

        let p = pipeline(dir.path(), StructuredExtractor::unconfigured());
        let (id, record) = p.process(&file).await.unwrap();
        assert_eq!(record, mock_record());

        let listed = p.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].invoice_id, id);
        assert!(p.download(&id).unwrap().is_some());
        assert!(p.download("missing").unwrap().is_none());
    }

    #[test]
    fn test_save_json() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), StructuredExtractor::rules());

        let id = p
            .save_json(r#"{"invoice_number": "J-1", "total_amount": 12, "line_items": []}"#)
            .unwrap();
        assert_eq!(p.list().unwrap()[0].invoice_id, id);

        let err = p.save_json("not json").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_health() {
        assert_eq!(Pipeline::health()["status"], "Invoice OCR Backend Ready");
    }
}
