use std::collections::BTreeSet;
use std::fs;

use serde::Serialize;

use crate::app::ProgressSink;
use crate::builder::read_sop_instance_uid;
use crate::error::UploaderError;
use crate::pacs::PacsClient;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Uploaded,
    /// The PACS already stores an instance with this SOPInstanceUID.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub sop_instance_uid: Option<String>,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
}

impl UploadReport {
    fn push(&mut self, report: FileReport) {
        match report.outcome {
            FileOutcome::Uploaded => self.uploaded += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
        self.files.push(report);
    }
}

pub struct Uploader<'a, P: PacsClient> {
    store: &'a Store,
    pacs: &'a P,
}

impl<'a, P: PacsClient> Uploader<'a, P> {
    pub fn new(store: &'a Store, pacs: &'a P) -> Self {
        Self { store, pacs }
    }

    /// Visits every local DICOM file once. A failed file is reported and the
    /// loop moves on; only a failing directory listing aborts.
    pub fn upload(
        &self,
        existing: &BTreeSet<String>,
        sink: &dyn ProgressSink,
    ) -> Result<UploadReport, UploaderError> {
        let mut report = UploadReport::default();

        for path in self.store.list_dicom_files()? {
            let file = path.file_name().unwrap_or(path.as_str()).to_string();

            let sop_instance_uid = match read_sop_instance_uid(&path) {
                Ok(uid) => uid,
                Err(err) => {
                    sink.warn(format!("cannot read {file}: {err}"));
                    report.push(FileReport {
                        file,
                        sop_instance_uid: None,
                        outcome: FileOutcome::Failed {
                            reason: err.to_string(),
                        },
                    });
                    continue;
                }
            };

            if existing.contains(&sop_instance_uid) {
                report.push(FileReport {
                    file,
                    sop_instance_uid: Some(sop_instance_uid),
                    outcome: FileOutcome::Skipped,
                });
                continue;
            }

            let outcome = match fs::read(path.as_std_path())
                .map_err(|err| UploaderError::Filesystem(format!("read {path}: {err}")))
                .and_then(|bytes| self.pacs.store_instance(bytes))
            {
                Ok(()) => {
                    sink.info(format!("uploaded {file}"));
                    FileOutcome::Uploaded
                }
                Err(err) => {
                    sink.warn(format!("failed to upload {file}: {err}"));
                    FileOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            report.push(FileReport {
                file,
                sop_instance_uid: Some(sop_instance_uid),
                outcome,
            });
        }

        Ok(report)
    }
}
