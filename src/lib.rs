//!
//! mkfat: A library and CLI for building FAT12/16/32 filesystem images.
//!
//! This crate provides tools for:
//! - Planning the sector/cluster geometry of an image from a FAT type and size
//! - Allocating cluster chains and unique 8.3 short names
//! - Encoding directory entries, FAT tables and the boot sector
//! - Serializing a complete, mountable image into a single in-memory buffer
//! - Parsing the JSON manifest format describing an image's contents
//!
//! The build is deterministic: identical inputs produce byte-identical images.
//!
//! # Re-exports
//! - [`build_image`]: The image construction entry point
//! - [`ImageSpec`], [`FileSource`]: The build input contract
//! - [`FATType`]: Enum for the supported FAT variants
//! - [`ImageError`]: All construction failure modes

pub mod constants;
pub mod filesystem;
pub mod manifest;
pub mod traits;
pub mod utils;

/// The image construction entry point (see [`filesystem::image::build_image`]).
pub use crate::filesystem::image::build_image;
/// The build input contract (see [`filesystem::image`]).
pub use crate::filesystem::image::{FileSource, ImageSpec};
/// Enum for the supported FAT variants (see [`filesystem::fat_type::FATType`]).
pub use crate::filesystem::fat_type::FATType;
/// All construction failure modes (see [`filesystem::image_error::ImageError`]).
pub use crate::filesystem::image_error::ImageError;
