/// The size of a sector in bytes.
pub const SECTOR_SIZE: usize = 512;

/// The size of a directory entry in bytes.
pub const DIR_ENTRY_SIZE: usize = 32;

/// The number of FAT copies written to every image.
pub const FAT_COPIES: u8 = 2;
