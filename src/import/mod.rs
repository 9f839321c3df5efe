use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, ScriptError};
use crate::models::Workout;

pub mod builtin;
pub mod json;
pub mod zwo;

pub use builtin::JustRideSource;
pub use json::{CatalogSource, JsonSource, WorkoutCatalog, WorkoutRecord};
pub use zwo::ZwoSource;

/// Anything that can produce a workout for the player.
///
/// The engine never distinguishes where a workout came from; local scripts,
/// bundled records and catalog rows all go through this trait.
pub trait WorkoutSource: Send {
    fn load_workout(&self) -> Result<Workout>;
}

impl<S: WorkoutSource + Sync + ?Sized> WorkoutSource for Arc<S> {
    fn load_workout(&self) -> Result<Workout> {
        (**self).load_workout()
    }
}

impl<S: WorkoutSource + ?Sized> WorkoutSource for Box<S> {
    fn load_workout(&self) -> Result<Workout> {
        (**self).load_workout()
    }
}

/// A workout file format that can be read from disk
pub trait ScriptFormat {
    /// Check if this format can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Wrap already-loaded file bytes in a source
    fn source_from_bytes(&self, id: String, data: Vec<u8>) -> Box<dyn WorkoutSource>;

    /// Get the format name
    fn get_format_name(&self) -> &'static str;
}

fn has_extension(file_path: &Path, extension: &str) -> bool {
    file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

struct ZwoFormat;

impl ScriptFormat for ZwoFormat {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "zwo")
    }

    fn source_from_bytes(&self, id: String, data: Vec<u8>) -> Box<dyn WorkoutSource> {
        Box::new(ZwoSource::new(id, data))
    }

    fn get_format_name(&self) -> &'static str {
        "ZWO"
    }
}

struct JsonFormat;

impl ScriptFormat for JsonFormat {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "json")
    }

    fn source_from_bytes(&self, _id: String, data: Vec<u8>) -> Box<dyn WorkoutSource> {
        Box::new(JsonSource::new(data))
    }

    fn get_format_name(&self) -> &'static str {
        "JSON"
    }
}

/// Picks a format by file extension and performs the file read, so that
/// parsers only ever see bytes.
pub struct ImportManager {
    formats: Vec<Box<dyn ScriptFormat + Send + Sync>>,
}

impl ImportManager {
    pub fn new() -> Self {
        let formats: Vec<Box<dyn ScriptFormat + Send + Sync>> =
            vec![Box::new(ZwoFormat), Box::new(JsonFormat)];

        Self { formats }
    }

    pub fn can_import_file(&self, file_path: &Path) -> bool {
        self.formats.iter().any(|format| format.can_import(file_path))
    }

    /// Read a workout file and return a source for it. The file stem is used
    /// as the workout id for formats that don't carry one.
    pub fn source_for_file(&self, file_path: &Path) -> Result<Box<dyn WorkoutSource>> {
        let format = self
            .formats
            .iter()
            .find(|format| format.can_import(file_path))
            .ok_or_else(|| ScriptError::UnsupportedFormat {
                format: file_path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or("none")
                    .to_string(),
            })?;

        let data = std::fs::read(file_path)?;
        let id = file_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("workout")
            .to_string();

        debug!(
            path = %file_path.display(),
            format = format.get_format_name(),
            bytes = data.len(),
            "Loaded workout file"
        );

        Ok(format.source_from_bytes(id, data))
    }

    /// Load a single workout file
    pub fn import_file(&self, file_path: &Path) -> Result<Workout> {
        self.source_for_file(file_path)?.load_workout()
    }

    /// Load every workout in a directory, skipping files that fail
    pub fn import_directory(&self, dir_path: &Path) -> Result<Vec<Workout>> {
        let mut workouts = Vec::new();

        for file_path in self.collect_importable_files(dir_path)? {
            match self.import_file(&file_path) {
                Ok(workout) => workouts.push(workout),
                Err(e) => {
                    warn!(path = %file_path.display(), error = %e, "Skipping workout file");
                }
            }
        }

        info!(
            dir = %dir_path.display(),
            count = workouts.len(),
            "Imported workout library"
        );
        Ok(workouts)
    }

    fn collect_importable_files(&self, dir_path: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in std::fs::read_dir(dir_path)? {
            let path = entry?.path();
            if path.is_file() && self.can_import_file(&path) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}
