//! FAT directory entry structure and encoding.
//!
//! This module implements the 32-byte FAT directory entry record which
//! carries the metadata of every file and directory placed into an image:
//! 8.3 name, attributes, timestamps, starting cluster and byte length. It
//! also synthesizes the `.`/`..` entries of subdirectories and the volume
//! label entry of FAT12/16 roots.

use std::fmt;

use crate::constants::DIR_ENTRY_SIZE;
use crate::utils::{store_u16, store_u32};

/// Archive attribute bit, set on every regular file.
pub const ATTR_ARCHIVE: u8 = 0x20;
/// Directory attribute bit.
pub const ATTR_DIRECTORY: u8 = 0x10;
/// Volume label attribute bit.
pub const ATTR_VOLUME_ID: u8 = 0x08;

/// Fixed timestamp date written into every entry: 1980-01-01, the FAT epoch.
///
/// Encoded as `(year - 1980) << 9 | month << 5 | day`. Using a constant
/// instead of the wall clock makes rebuilding from identical inputs produce
/// bit-identical images.
pub const EPOCH_DATE: u16 = (1 << 5) | 1;
/// Fixed timestamp time written into every entry: midnight.
pub const EPOCH_TIME: u16 = 0;

/// A directory entry about to be written into an image.
///
/// Each entry encodes to exactly 32 bytes following the standard field
/// order:
/// name[11], attributes[1], reserved[1], create-time-tenths[1],
/// create-time[2], create-date[2], last-access-date[2],
/// first-cluster-high[2], write-time[2], write-date[2],
/// first-cluster-low[2], file-size[4].
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Filename in 8.3 format (8 characters name + 3 characters extension).
    name: [u8; 11],
    /// File attributes byte.
    attr: u8,
    /// First cluster of the entry's chain; 0 for empty files.
    fst_clus: u32,
    /// File size in bytes (0 for directories).
    file_size: u32,
}

impl DirEntry {
    /// Creates the entry of a regular file.
    ///
    /// # Parameters
    /// - `name`: The allocated 8.3 name slot
    /// - `fst_clus`: First cluster of the file's chain, 0 for an empty file
    /// - `file_size`: Length of the file content in bytes
    pub fn file(name: [u8; 11], fst_clus: u32, file_size: u32) -> Self {
        Self {
            name,
            attr: ATTR_ARCHIVE,
            fst_clus,
            file_size,
        }
    }

    /// Creates the entry of a subdirectory. Directories always store a zero
    /// byte length.
    pub fn directory(name: [u8; 11], fst_clus: u32) -> Self {
        Self {
            name,
            attr: ATTR_DIRECTORY,
            fst_clus,
            file_size: 0,
        }
    }

    /// Creates the `.` entry of a directory, pointing at its own chain.
    pub fn dot(own_clus: u32) -> Self {
        Self::directory(*b".          ", own_clus)
    }

    /// Creates the `..` entry of a directory, pointing at its parent's chain.
    ///
    /// # Parameters
    /// - `parent_clus`: The parent's first cluster; 0 when the parent is the
    ///   fixed FAT12/16 root, or the root cluster number under FAT32
    pub fn dot_dot(parent_clus: u32) -> Self {
        Self::directory(*b"..         ", parent_clus)
    }

    /// Creates the volume label entry leading a FAT12/16 root directory.
    pub fn volume_label(label: [u8; 11]) -> Self {
        Self {
            name: label,
            attr: ATTR_VOLUME_ID,
            fst_clus: 0,
            file_size: 0,
        }
    }

    /// Encodes the entry into its 32-byte on-disk record.
    pub fn encode(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut record = [0u8; DIR_ENTRY_SIZE];
        record[0..11].copy_from_slice(&self.name);
        record[11] = self.attr;
        // record[12]: NT reserved, record[13]: creation time tenths.
        store_u16(&mut record, 14, EPOCH_TIME); // creation time
        store_u16(&mut record, 16, EPOCH_DATE); // creation date
        store_u16(&mut record, 18, EPOCH_DATE); // last access date
        store_u16(&mut record, 20, (self.fst_clus >> 16) as u16);
        store_u16(&mut record, 22, EPOCH_TIME); // write time
        store_u16(&mut record, 24, EPOCH_DATE); // write date
        store_u16(&mut record, 26, self.fst_clus as u16);
        store_u32(&mut record, 28, self.file_size);
        record
    }
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" attr=0x{:02X} cluster={} {}B",
            String::from_utf8_lossy(&self.name),
            self.attr,
            self.fst_clus,
            self.file_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{u16_at, u32_at};

    #[test]
    fn file_entry_layout() {
        let entry = DirEntry::file(*b"HELLO   TXT", 0x0004_0003, 14);
        let record = entry.encode();

        assert_eq!(&record[0..11], b"HELLO   TXT");
        assert_eq!(record[11], ATTR_ARCHIVE);
        assert_eq!(u16_at(&record, 20), 0x0004); // first-cluster-high
        assert_eq!(u16_at(&record, 26), 0x0003); // first-cluster-low
        assert_eq!(u32_at(&record, 28), 14);
    }

    #[test]
    fn timestamps_are_the_fat_epoch() {
        let record = DirEntry::file(*b"HELLO   TXT", 2, 1).encode();
        assert_eq!(u16_at(&record, 14), 0);
        assert_eq!(u16_at(&record, 16), 0x0021);
        assert_eq!(u16_at(&record, 18), 0x0021);
        assert_eq!(u16_at(&record, 22), 0);
        assert_eq!(u16_at(&record, 24), 0x0021);
    }

    #[test]
    fn dot_entries_are_directories() {
        let dot = DirEntry::dot(5).encode();
        assert_eq!(&dot[0..11], b".          ");
        assert_eq!(dot[11], ATTR_DIRECTORY);
        assert_eq!(u16_at(&dot, 26), 5);

        let dot_dot = DirEntry::dot_dot(0).encode();
        assert_eq!(&dot_dot[0..11], b"..         ");
        assert_eq!(u16_at(&dot_dot, 26), 0);
        assert_eq!(u32_at(&dot_dot, 28), 0);
    }

    #[test]
    fn volume_label_attribute() {
        let record = DirEntry::volume_label(*b"MY_DISK    ").encode();
        assert_eq!(record[11], ATTR_VOLUME_ID);
        assert_eq!(u16_at(&record, 26), 0);
    }
}
