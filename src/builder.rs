use camino::{Utf8Path, Utf8PathBuf};
use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject, OpenFileOptions};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use image::{ImageReader, RgbImage};

use crate::app::ProgressSink;
use crate::domain::{ImageMetadata, SopInstanceUid, UidRoot, generate_uid};
use crate::error::UploaderError;
use crate::store::Store;

pub const PATIENT_NAME: &str = "Unknown^Patient";
pub const PATIENT_ID: &str = "000000";
pub const MODALITY: &str = "OT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The file on disk already carries the expected SOPInstanceUID.
    Reused(Utf8PathBuf),
    Built(Utf8PathBuf),
}

impl BuildOutcome {
    pub fn path(&self) -> &Utf8Path {
        match self {
            BuildOutcome::Reused(path) | BuildOutcome::Built(path) => path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DicomBuilder {
    store: Store,
    uid_root: UidRoot,
}

impl DicomBuilder {
    pub fn new(store: Store, uid_root: UidRoot) -> Self {
        Self { store, uid_root }
    }

    pub fn build(&self, record: &ImageMetadata) -> Result<BuildOutcome, UploaderError> {
        let dest = self.store.dicom_path(&record.src);
        let sop_instance_uid = self.uid_root.sop_instance_uid(&record.uid)?;

        if dest.as_std_path().exists() {
            // an unreadable leftover is simply rebuilt
            if let Ok(stored) = read_sop_instance_uid(&dest) {
                if stored == sop_instance_uid.as_str() {
                    return Ok(BuildOutcome::Reused(dest));
                }
            }
        }

        let image = load_rgb_image(&self.store.image_path(&record.src))?;
        let dataset = secondary_capture(record, &sop_instance_uid, image, &dest)?;
        let file = dataset
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
                    .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid(sop_instance_uid.as_str()),
            )
            .map_err(|err| UploaderError::DicomWrite {
                path: dest.clone(),
                message: err.to_string(),
            })?;

        Store::write_file_atomic(&dest, |temp_path| {
            file.write_to_file(temp_path.as_std_path())
                .map_err(|err| UploaderError::DicomWrite {
                    path: dest.clone(),
                    message: err.to_string(),
                })
        })?;
        Ok(BuildOutcome::Built(dest))
    }

    /// Builds every record in order, stopping at the first failure.
    pub fn build_all(
        &self,
        records: &[ImageMetadata],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<BuildOutcome>, UploaderError> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let outcome = self.build(record)?;
            match &outcome {
                BuildOutcome::Reused(path) => sink.info(format!("{path} is up to date")),
                BuildOutcome::Built(path) => sink.info(format!("built {path} from {}", record.src)),
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

/// Reads the SOPInstanceUID of a DICOM file without loading its pixel data.
pub fn read_sop_instance_uid(path: &Utf8Path) -> Result<String, UploaderError> {
    let read_error = |message: String| UploaderError::DicomRead {
        path: path.to_owned(),
        message,
    };
    let obj = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path.as_std_path())
        .map_err(|err| read_error(err.to_string()))?;
    let uid = obj
        .element(tags::SOP_INSTANCE_UID)
        .map_err(|err| read_error(err.to_string()))?
        .to_str()
        .map_err(|err| read_error(err.to_string()))?;
    Ok(uid
        .trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string())
}

fn load_rgb_image(path: &Utf8Path) -> Result<RgbImage, UploaderError> {
    if !path.as_std_path().exists() {
        return Err(UploaderError::ImageNotFound(path.to_owned()));
    }
    let decode_error = |message: String| UploaderError::ImageDecode {
        path: path.to_owned(),
        message,
    };
    // content decides the decoder, not the extension
    let image = ImageReader::open(path.as_std_path())
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|err| decode_error(err.to_string()))?
        .decode()
        .map_err(|err| decode_error(err.to_string()))?;
    Ok(image.into_rgb8())
}

fn secondary_capture(
    record: &ImageMetadata,
    sop_instance_uid: &SopInstanceUid,
    image: RgbImage,
    dest: &Utf8Path,
) -> Result<InMemDicomObject, UploaderError> {
    let (width, height) = image.dimensions();
    let (Ok(columns), Ok(rows)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(UploaderError::ImageTooLarge {
            path: dest.to_owned(),
            width,
            height,
        });
    };

    let mut pixels = image.into_raw();
    // values must have even length
    if pixels.len() % 2 == 1 {
        pixels.push(0);
    }

    Ok(InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
        ),
        DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(sop_instance_uid.as_str()),
        ),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from(MODALITY)),
        DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from(PATIENT_NAME)),
        DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from(PATIENT_ID)),
        DataElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(generate_uid()),
        ),
        DataElement::new(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(generate_uid()),
        ),
        DataElement::new(
            tags::IMAGE_COMMENTS,
            VR::LT,
            PrimitiveValue::from(record.description.as_str()),
        ),
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(3_u16)),
        DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("RGB"),
        ),
        DataElement::new(tags::PLANAR_CONFIGURATION, VR::US, PrimitiveValue::from(0_u16)),
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(columns)),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(8_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(8_u16)),
        DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(7_u16)),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
        DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::from(pixels)),
    ]))
}
