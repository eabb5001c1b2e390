use std::collections::BTreeSet;

use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::app::ProgressSink;
use crate::config::Settings;
use crate::error::UploaderError;

pub const DICOM_CONTENT_TYPE: &str = "application/dicom";

/// SOPInstanceUID (0008,0018) in DICOMweb JSON and in Orthanc's own notation.
const SOP_INSTANCE_UID_KEYS: [&str; 2] = ["00080018", "0008,0018"];

/// The slice of the PACS REST API the uploader needs.
pub trait PacsClient {
    /// Opaque ids of every stored instance.
    fn list_instances(&self) -> Result<Vec<String>, UploaderError>;
    fn instance_tags(&self, instance_id: &str) -> Result<Value, UploaderError>;
    fn store_instance(&self, dicom: Vec<u8>) -> Result<(), UploaderError>;
}

impl<T: PacsClient + ?Sized> PacsClient for &T {
    fn list_instances(&self) -> Result<Vec<String>, UploaderError> {
        (**self).list_instances()
    }

    fn instance_tags(&self, instance_id: &str) -> Result<Value, UploaderError> {
        (**self).instance_tags(instance_id)
    }

    fn store_instance(&self, dicom: Vec<u8>) -> Result<(), UploaderError> {
        (**self).store_instance(dicom)
    }
}

#[derive(Clone)]
pub struct OrthancHttpClient {
    client: Client,
    instances_url: String,
}

impl OrthancHttpClient {
    pub fn new(settings: &Settings) -> Result<Self, UploaderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("histo-upload/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| UploaderError::PacsHttp(err.to_string()))?,
        );
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| UploaderError::PacsHttp(err.to_string()))?;
        Ok(Self {
            client,
            instances_url: settings.instances_url(),
        })
    }

    fn handle_status(response: Response) -> Result<Response, UploaderError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "PACS request failed".to_string());
        Err(UploaderError::PacsStatus { status, message })
    }
}

impl PacsClient for OrthancHttpClient {
    fn list_instances(&self) -> Result<Vec<String>, UploaderError> {
        let response = self
            .client
            .get(&self.instances_url)
            .send()
            .map_err(|err| UploaderError::PacsHttp(err.to_string()))?;
        Self::handle_status(response)?
            .json()
            .map_err(|err| UploaderError::PacsHttp(err.to_string()))
    }

    fn instance_tags(&self, instance_id: &str) -> Result<Value, UploaderError> {
        let url = format!("{}/{}/tags", self.instances_url, instance_id);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| UploaderError::PacsHttp(err.to_string()))?;
        Self::handle_status(response)?
            .json()
            .map_err(|err| UploaderError::PacsHttp(err.to_string()))
    }

    fn store_instance(&self, dicom: Vec<u8>) -> Result<(), UploaderError> {
        let response = self
            .client
            .post(&self.instances_url)
            .header(CONTENT_TYPE, DICOM_CONTENT_TYPE)
            .body(dicom)
            .send()
            .map_err(|err| UploaderError::PacsHttp(err.to_string()))?;
        Self::handle_status(response)?;
        Ok(())
    }
}

/// Collects the SOPInstanceUID of every instance the PACS holds.
///
/// A failing listing is an error. A single instance whose tags cannot be
/// fetched is left out with a warning.
pub fn existing_sop_instance_uids<P: PacsClient>(
    pacs: &P,
    sink: &dyn ProgressSink,
) -> Result<BTreeSet<String>, UploaderError> {
    let mut uids = BTreeSet::new();
    for instance_id in pacs.list_instances()? {
        match pacs.instance_tags(&instance_id) {
            Ok(tags) => match sop_instance_uid_from_tags(&tags) {
                Some(uid) => {
                    uids.insert(uid);
                }
                None => sink.warn(format!("instance {instance_id} has no SOPInstanceUID tag")),
            },
            Err(err) => sink.warn(format!("skipping instance {instance_id}: {err}")),
        }
    }
    Ok(uids)
}

/// `Value` may be a plain string or a DICOMweb-style array.
pub fn sop_instance_uid_from_tags(tags: &Value) -> Option<String> {
    let value = SOP_INSTANCE_UID_KEYS
        .iter()
        .find_map(|key| tags.get(*key))
        .and_then(|entry| entry.get("Value"))?;
    let uid = match value {
        Value::String(uid) => uid.as_str(),
        Value::Array(items) => items.iter().find_map(Value::as_str)?,
        _ => return None,
    };
    let uid = uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
    (!uid.is_empty()).then(|| uid.to_string())
}
