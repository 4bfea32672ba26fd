use log::{debug, info};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::Document;

/// File name of the generated document inside the output directory
pub const OUTPUT_FILE_NAME: &str = "openapi.json";

/// Writes an assembled document to disk
pub struct Generator<'d> {
    document: &'d Document,
}

impl<'d> Generator<'d> {
    pub fn new(document: &'d Document) -> Self {
        Self { document }
    }

    /// Serializes the document as pretty JSON into `<output_dir>/openapi.json`,
    /// creating the directory when missing. Returns the written path.
    pub fn generate(&self, output_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)?;

        let json = serde_json::to_string_pretty(self.document)?;
        let file_path = output_dir.join(OUTPUT_FILE_NAME);
        debug!("Writing {} bytes to {:?}", json.len(), file_path);

        let mut file = File::create(&file_path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;

        info!("Generated file: {:?}", file_path);
        Ok(file_path)
    }
}

/// Shorthand for `Generator::new(document).generate(output_dir)`
pub fn write_document(document: &Document, output_dir: impl AsRef<Path>) -> Result<PathBuf> {
    Generator::new(document).generate(output_dir)
}
