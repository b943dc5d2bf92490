//! Error types for FAT image construction.
//!
//! Every failure mode of the build pipeline is represented here. All errors
//! are raised before any partial output is returned: the engine either
//! produces a fully valid image or no image at all.

use std::io;
use thiserror::Error;

use super::fat_type::FATType;

/// Errors that can occur while constructing a FAT image.
#[derive(Error, Debug)]
pub enum ImageError {
    /// The requested image size is zero, not a multiple of the sector size,
    /// or too large to address with 32-bit sector counts.
    #[error("Invalid image size: `{0}` bytes. The size must be a positive multiple of 512 bytes.")]
    InvalidImageSize(u64),

    /// The volume label does not fit the 11-byte boot sector field.
    #[error("Invalid volume label: `{0}`. A label is at most 11 ASCII characters.")]
    InvalidLabel(String),

    /// The computed cluster count falls outside the legal range of the
    /// requested FAT type. The mismatch is reported, never silently corrected.
    #[error(
        "The requested type {requested} cannot host a layout of {clusters} clusters. \
         Legal ranges: FAT12 < 4085 <= FAT16 < 65525 <= FAT32."
    )]
    VariantMismatch { requested: FATType, clusters: u32 },

    /// The target size cannot host the required structures plus the content.
    #[error("Insufficient capacity: {0}")]
    CapacityExceeded(String),

    /// Two target paths collide, or a path names both a file and a directory
    /// at the same position.
    #[error("Conflicting target path: {0}")]
    PathConflict(String),

    /// All `~N` collision suffixes are taken within one directory.
    #[error("Exhausted 8.3 name suffixes for `{0}`: more than 9999 collisions in one directory.")]
    NameExhaustion(String),

    /// An internal invariant of the assembled image was violated. This is
    /// always fatal and never expected in correct operation.
    #[error("Integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    /// The manifest document could not be parsed.
    #[error("Manifest error: `{0}`")]
    ManifestError(serde_json::Error),

    /// Underlying I/O errors from reading source files or writing the image.
    #[error("IO Error: `{0}`")]
    IOError(io::Error),
}

/// Converts standard I/O errors into ImageError.
impl From<io::Error> for ImageError {
    fn from(err: io::Error) -> Self {
        ImageError::IOError(err)
    }
}

/// Converts manifest parsing errors into ImageError.
impl From<serde_json::Error> for ImageError {
    fn from(err: serde_json::Error) -> Self {
        ImageError::ManifestError(err)
    }
}
