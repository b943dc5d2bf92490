//! Manifest parsing.
//!
//! The manifest is a JSON document naming the files and directories to place
//! into an image. Two layouts are accepted: a flat object with `files` and
//! `directories` keys, and a wrapped object carrying the same keys plus
//! build defaults under `build_args`. A file entry is either a plain string
//! (used as both source and target path) or an `in`/`out` mapping.

use serde::Deserialize;
use std::io;

use crate::filesystem::image_error::ImageError;

/// One file entry of a manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FileEntry {
    /// A plain path, used both as source (under the base directory) and as
    /// target inside the image.
    Path(String),
    /// An explicit source/target mapping. A missing side defaults to the
    /// other one.
    Mapping {
        #[serde(rename = "in", alias = "input")]
        input: Option<String>,
        #[serde(rename = "out", alias = "output")]
        output: Option<String>,
    },
}

impl FileEntry {
    /// Returns the source path of the entry, relative to the base directory.
    ///
    /// # Errors
    /// - `ImageError::ManifestError` equivalent I/O error if neither side of
    ///   a mapping is present
    pub fn source(&self) -> Result<&str, ImageError> {
        match self {
            FileEntry::Path(path) => Ok(path),
            FileEntry::Mapping { input, output } => input
                .as_deref()
                .or(output.as_deref())
                .ok_or_else(|| empty_mapping()),
        }
    }

    /// Returns the target path of the entry inside the image.
    pub fn target(&self) -> Result<&str, ImageError> {
        match self {
            FileEntry::Path(path) => Ok(path),
            FileEntry::Mapping { input, output } => output
                .as_deref()
                .or(input.as_deref())
                .ok_or_else(|| empty_mapping()),
        }
    }
}

fn empty_mapping() -> ImageError {
    ImageError::IOError(io::Error::new(
        io::ErrorKind::InvalidInput,
        "a manifest file entry needs at least one of `in` and `out`",
    ))
}

/// Build settings a manifest may carry; each one is a default the CLI can
/// override.
#[derive(Debug, Default, Deserialize)]
pub struct BuildArgs {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub directories: Vec<String>,
    /// Requested FAT type, e.g. `"FAT16"`.
    pub variant: Option<String>,
    /// Image size in MB.
    pub size_mb: Option<u64>,
    /// Volume label.
    pub label: Option<String>,
}

/// A parsed manifest document.
#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    files: Vec<FileEntry>,
    #[serde(default)]
    directories: Vec<String>,
    /// Wrapped form: entries and defaults under one key.
    build_args: Option<BuildArgs>,
    /// Output image path, relative to the base directory.
    pub out: Option<String>,
}

impl Manifest {
    /// Parses a manifest from a JSON reader.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Manifest, ImageError> {
        serde_json::from_reader(reader).map_err(ImageError::from)
    }

    /// Returns all file entries, flat and wrapped forms combined.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().chain(
            self.build_args
                .iter()
                .flat_map(|args| args.files.iter()),
        )
    }

    /// Returns all explicit directory targets.
    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.directories
            .iter()
            .chain(
                self.build_args
                    .iter()
                    .flat_map(|args| args.directories.iter()),
            )
            .map(String::as_str)
    }

    /// Returns the wrapped build defaults, if any.
    pub fn build_args(&self) -> Option<&BuildArgs> {
        self.build_args.as_ref()
    }
}
