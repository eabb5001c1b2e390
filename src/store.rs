use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Settings;
use crate::error::UploaderError;

/// Version-control placeholder kept in the otherwise generated DICOM directory.
pub const PLACEHOLDER_FILE: &str = ".gitignore";

/// Prefix of in-flight files written by [`Store::write_file_atomic`].
pub const TEMP_FILE_PREFIX: &str = ".histo-dcm";

#[derive(Debug, Clone)]
pub struct Store {
    image_dir: Utf8PathBuf,
    dicom_dir: Utf8PathBuf,
}

impl Store {
    pub fn new(settings: &Settings) -> Self {
        Self::new_with_paths(settings.image_dir.clone(), settings.dicom_dir.clone())
    }

    pub fn new_with_paths(image_dir: Utf8PathBuf, dicom_dir: Utf8PathBuf) -> Self {
        Self {
            image_dir,
            dicom_dir,
        }
    }

    pub fn image_path(&self, src: &str) -> Utf8PathBuf {
        self.image_dir.join(src)
    }

    /// `a.jpg` becomes `<dicom dir>/a.dcm`.
    pub fn dicom_path(&self, src: &str) -> Utf8PathBuf {
        self.dicom_dir.join(src).with_extension("dcm")
    }

    pub fn ensure_dicom_dir(&self) -> Result<(), UploaderError> {
        fs::create_dir_all(self.dicom_dir.as_std_path())
            .map_err(|err| UploaderError::Filesystem(format!("create {}: {err}", self.dicom_dir)))
    }

    /// Regular files of the DICOM directory sorted by name, without the placeholder.
    pub fn list_dicom_files(&self) -> Result<Vec<Utf8PathBuf>, UploaderError> {
        if !self.dicom_dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.dicom_dir.as_std_path())
            .map_err(|err| UploaderError::Filesystem(format!("read {}: {err}", self.dicom_dir)))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| UploaderError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
                UploaderError::Filesystem(format!("non UTF-8 path {}", path.display()))
            })?;
            let skipped = match path.file_name() {
                Some(name) => name == PLACEHOLDER_FILE || name.starts_with(TEMP_FILE_PREFIX),
                None => true,
            };
            if skipped || !path.is_file() {
                continue;
            }
            files.push(path);
        }
        files.sort();
        Ok(files)
    }

    /// Writes `write` output to a temp file next to `dest`, then moves it into place.
    pub fn write_file_atomic<F>(dest: &Utf8Path, write: F) -> Result<(), UploaderError>
    where
        F: FnOnce(&Utf8Path) -> Result<(), UploaderError>,
    {
        let parent = dest
            .parent()
            .ok_or_else(|| UploaderError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| UploaderError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| UploaderError::Filesystem(err.to_string()))?;
        let temp_path = Utf8Path::from_path(temp.path())
            .ok_or_else(|| UploaderError::Filesystem("invalid temp file path".to_string()))?;
        write(temp_path)?;
        temp.persist(dest.as_std_path())
            .map_err(|err| UploaderError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
