#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use image::{Rgb, RgbImage};
use serde_json::{Value, json};

use histo_dicom_uploader::app::{ProgressEvent, ProgressSink};
use histo_dicom_uploader::config::Settings;
use histo_dicom_uploader::domain::ImageMetadata;
use histo_dicom_uploader::error::UploaderError;
use histo_dicom_uploader::pacs::PacsClient;

pub struct Workspace {
    _temp: tempfile::TempDir,
    pub root: Utf8PathBuf,
    pub settings: Settings,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let settings = Settings::with_data_dir(&root.join("data"));
        fs::create_dir_all(settings.image_dir.as_std_path()).unwrap();
        fs::create_dir_all(settings.dicom_dir.as_std_path()).unwrap();
        Self {
            _temp: temp,
            root,
            settings,
        }
    }

    /// Writes a `width`x`height` gradient; the format follows the extension.
    pub fn write_image(&self, name: &str, width: u32, height: u32) -> Utf8PathBuf {
        let path = self.settings.image_dir.join(name);
        gradient(width, height).save(path.as_std_path()).unwrap();
        path
    }

    pub fn write_metadata(&self, xml: &str) -> Utf8PathBuf {
        let path = self.settings.metadata_file.clone();
        fs::write(path.as_std_path(), xml).unwrap();
        path
    }

    pub fn dicom_dir(&self) -> &Utf8Path {
        &self.settings.dicom_dir
    }
}

pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 40) as u8, (y * 60) as u8, ((x + y) * 10) as u8])
    })
}

pub fn record(src: &str, uid: &str) -> ImageMetadata {
    ImageMetadata {
        src: src.to_string(),
        description: "foo".to_string(),
        original_url: "http://x".to_string(),
        magnification: "20".to_string(),
        uid: uid.to_string(),
        author: None,
    }
}

pub fn image_xml(src: &str, uid: &str) -> String {
    format!(
        "<image src=\"{src}\">\
         <description>foo</description>\
         <originalURL>http://x</originalURL>\
         <magnification>20</magnification>\
         <uid>{uid}</uid>\
         </image>"
    )
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn warnings(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == histo_dicom_uploader::app::EventLevel::Warn)
            .map(|event| event.message.clone())
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory PACS: instances are `(id, tags)` pairs; uploads are recorded.
#[derive(Default)]
pub struct MockPacs {
    pub instances: Vec<(String, Value)>,
    pub list_status: Option<u16>,
    pub broken_instances: BTreeSet<String>,
    /// Zero-based indexes of store calls that answer with a 500.
    pub failing_stores: BTreeSet<usize>,
    pub stored: Mutex<Vec<Vec<u8>>>,
    pub store_calls: Mutex<usize>,
}

impl MockPacs {
    pub fn with_uids(uids: &[&str]) -> Self {
        let instances = uids
            .iter()
            .enumerate()
            .map(|(index, uid)| {
                (
                    format!("instance-{index}"),
                    json!({ "00080018": { "Value": uid } }),
                )
            })
            .collect();
        Self {
            instances,
            ..Self::default()
        }
    }

    pub fn store_call_count(&self) -> usize {
        *self.store_calls.lock().unwrap()
    }
}

impl PacsClient for MockPacs {
    fn list_instances(&self) -> Result<Vec<String>, UploaderError> {
        if let Some(status) = self.list_status {
            return Err(UploaderError::PacsStatus {
                status,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.instances.iter().map(|(id, _)| id.clone()).collect())
    }

    fn instance_tags(&self, instance_id: &str) -> Result<Value, UploaderError> {
        if self.broken_instances.contains(instance_id) {
            return Err(UploaderError::PacsStatus {
                status: 404,
                message: "unknown resource".to_string(),
            });
        }
        self.instances
            .iter()
            .find(|(id, _)| id == instance_id)
            .map(|(_, tags)| tags.clone())
            .ok_or_else(|| UploaderError::PacsHttp("no such instance".to_string()))
    }

    fn store_instance(&self, dicom: Vec<u8>) -> Result<(), UploaderError> {
        let mut calls = self.store_calls.lock().unwrap();
        let index = *calls;
        *calls += 1;
        if self.failing_stores.contains(&index) {
            return Err(UploaderError::PacsStatus {
                status: 500,
                message: "storage full".to_string(),
            });
        }
        self.stored.lock().unwrap().push(dicom);
        Ok(())
    }
}
