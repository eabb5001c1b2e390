use std::collections::BTreeSet;

use serde::Serialize;

use crate::builder::{BuildOutcome, DicomBuilder};
use crate::config::Settings;
use crate::error::UploaderError;
use crate::metadata::read_metadata;
use crate::pacs::{PacsClient, existing_sop_instance_uids};
use crate::store::Store;
use crate::upload::{UploadReport, Uploader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub level: EventLevel,
    pub message: String,
}

/// Where the pipeline stages report what they do.
pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);

    fn info(&self, message: String) {
        self.event(ProgressEvent {
            level: EventLevel::Info,
            message,
        });
    }

    fn warn(&self, message: String) {
        self.event(ProgressEvent {
            level: EventLevel::Warn,
            message,
        });
    }
}

/// Forwards events to `tracing`; the subscriber decides where they end up.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.level {
            EventLevel::Info => tracing::info!("{}", event.message),
            EventLevel::Warn => tracing::warn!("{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResult {
    pub items: Vec<ConvertItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertItemResult {
    pub src: String,
    pub sop_instance_uid: String,
    pub action: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub convert: ConvertResult,
    pub upload: UploadReport,
}

pub struct App<P: PacsClient> {
    store: Store,
    builder: DicomBuilder,
    pacs: P,
    settings: Settings,
}

impl<P: PacsClient> App<P> {
    pub fn new(settings: Settings, pacs: P) -> Self {
        let store = Store::new(&settings);
        let builder = DicomBuilder::new(store.clone(), settings.uid_root.clone());
        Self {
            store,
            builder,
            pacs,
            settings,
        }
    }

    /// Parses the metadata file and builds a DICOM file for every record.
    pub fn convert(&self, sink: &dyn ProgressSink) -> Result<ConvertResult, UploaderError> {
        self.store.ensure_dicom_dir()?;
        let records = read_metadata(&self.settings.metadata_file)?;
        sink.info(format!(
            "read {} image records from {}",
            records.len(),
            self.settings.metadata_file
        ));

        let outcomes = self.builder.build_all(&records, sink)?;
        let items = records
            .iter()
            .zip(outcomes)
            .map(|(record, outcome)| {
                let sop_instance_uid = self.settings.uid_root.sop_instance_uid(&record.uid)?;
                let action = match outcome {
                    BuildOutcome::Reused(_) => "reused",
                    BuildOutcome::Built(_) => "built",
                };
                Ok(ConvertItemResult {
                    src: record.src.clone(),
                    sop_instance_uid: sop_instance_uid.to_string(),
                    action: action.to_string(),
                    path: outcome.path().to_string(),
                })
            })
            .collect::<Result<Vec<_>, UploaderError>>()?;
        Ok(ConvertResult { items })
    }

    /// Uploads every local DICOM file the PACS does not hold yet.
    pub fn upload(&self, sink: &dyn ProgressSink) -> Result<UploadReport, UploaderError> {
        let existing: BTreeSet<String> = existing_sop_instance_uids(&self.pacs, sink)?;
        sink.info(format!("PACS already stores {} instances", existing.len()));
        Uploader::new(&self.store, &self.pacs).upload(&existing, sink)
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunResult, UploaderError> {
        let convert = self.convert(sink)?;
        let upload = self.upload(sink)?;
        Ok(RunResult { convert, upload })
    }
}
