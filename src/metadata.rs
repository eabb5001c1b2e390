use std::fs;

use camino::Utf8Path;
use serde::Deserialize;

use crate::domain::ImageMetadata;
use crate::error::UploaderError;

#[derive(Debug, Deserialize)]
struct ImageList {
    #[serde(rename = "image", default)]
    images: Vec<ImageElement>,
}

#[derive(Debug, Deserialize)]
struct ImageElement {
    #[serde(rename = "@src")]
    src: String,
    description: Option<String>,
    #[serde(rename = "originalURL")]
    original_url: Option<String>,
    magnification: Option<String>,
    uid: Option<String>,
    author: Option<String>,
}

/// Reads every `<image>` element of the metadata file, in document order.
pub fn read_metadata(path: &Utf8Path) -> Result<Vec<ImageMetadata>, UploaderError> {
    if !path.as_std_path().exists() {
        return Err(UploaderError::MetadataNotFound(path.to_owned()));
    }
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| UploaderError::Filesystem(format!("read {path}: {err}")))?;
    parse_metadata(&content)
}

pub fn parse_metadata(xml: &str) -> Result<Vec<ImageMetadata>, UploaderError> {
    let list: ImageList =
        quick_xml::de::from_str(xml).map_err(|err| UploaderError::MetadataParse(err.to_string()))?;
    list.images.into_iter().map(into_record).collect()
}

fn into_record(element: ImageElement) -> Result<ImageMetadata, UploaderError> {
    let src = element.src.trim().to_string();
    let required = |value: Option<String>, field: &'static str| {
        value
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| UploaderError::MalformedMetadata {
                src: src.clone(),
                field,
            })
    };

    Ok(ImageMetadata {
        description: required(element.description, "description")?,
        original_url: required(element.original_url, "originalURL")?,
        magnification: required(element.magnification, "magnification")?,
        uid: required(element.uid, "uid")?,
        author: element
            .author
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()),
        src,
    })
}
