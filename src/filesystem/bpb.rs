//! Boot sector and BIOS Parameter Block encoding.
//!
//! This module writes the first sector of an image: the jump stub, the BPB
//! geometry fields, the variant-specific extended block and the 0x55AA boot
//! signature. For FAT32 it also produces the FSInfo sector kept in the
//! reserved region.
//!
//! The field layout follows Microsoft's FAT specification; every offset
//! matches the structure a FAT driver parses back at mount time.

use super::fat_type::FATType;
use super::geometry::Geometry;
use crate::constants::SECTOR_SIZE;
use crate::utils::{store_u16, store_u32};

/// OEM identifier stamped into every boot sector.
const OEM_NAME: &[u8; 8] = b"MSWIN4.1";

/// Media descriptor for fixed disks.
const MEDIA_DESCRIPTOR: u8 = 0xF8;

/// Fixed volume serial number. A constant serial keeps rebuilds of identical
/// inputs bit-identical.
const VOLUME_ID: u32 = 0x1234_5678;

/// Sector number of the FSInfo structure (FAT32).
pub const FS_INFO_SECTOR: u16 = 1;

/// Sector number of the backup boot sector (FAT32).
pub const BACKUP_BOOT_SECTOR: u16 = 6;

/// Encodes the boot sector of an image.
///
/// # Parameters
/// - `geometry`: The planned layout providing every BPB field
/// - `label`: The volume label, already padded to its 11-byte slot
pub fn boot_sector(geometry: &Geometry, label: &[u8; 11]) -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    let fat32 = *geometry.fat_type() == FATType::FAT32;

    // Jump instruction over the BPB into the (empty) boot code.
    sector[0] = 0xEB;
    sector[1] = if fat32 { 0x58 } else { 0x3C };
    sector[2] = 0x90;
    sector[3..11].copy_from_slice(OEM_NAME);

    store_u16(&mut sector, 11, *geometry.bytes_per_sec());
    sector[13] = *geometry.sec_per_clus();
    store_u16(&mut sector, 14, *geometry.rsvd_sec_cnt());
    sector[16] = *geometry.num_fat();
    store_u16(&mut sector, 17, *geometry.root_ent_cnt());

    // The 16-bit total only fits small FAT12/16 volumes; everything else
    // moves to the 32-bit field.
    let tot_sec = *geometry.tot_sec();
    if !fat32 && tot_sec < 0x10000 {
        store_u16(&mut sector, 19, tot_sec as u16);
    } else {
        store_u32(&mut sector, 32, tot_sec);
    }

    sector[21] = MEDIA_DESCRIPTOR;
    if !fat32 {
        store_u16(&mut sector, 22, *geometry.fat_sz() as u16);
    }
    store_u16(&mut sector, 24, 63); // sectors per track
    store_u16(&mut sector, 26, 255); // head count
    store_u32(&mut sector, 28, 0); // hidden sectors

    if fat32 {
        store_u32(&mut sector, 36, *geometry.fat_sz());
        store_u16(&mut sector, 40, 0); // extended flags: mirrored FATs
        store_u16(&mut sector, 42, 0); // filesystem version 0.0
        store_u32(&mut sector, 44, *geometry.root_clus());
        store_u16(&mut sector, 48, FS_INFO_SECTOR);
        store_u16(&mut sector, 50, BACKUP_BOOT_SECTOR);
        // 52..64: reserved
        sector[64] = 0x80; // drive number
        sector[66] = 0x29; // extended boot signature
        store_u32(&mut sector, 67, VOLUME_ID);
        sector[71..82].copy_from_slice(label);
        sector[82..90].copy_from_slice(geometry.fat_type().fs_type_label());
    } else {
        sector[36] = 0x80; // drive number
        sector[38] = 0x29; // extended boot signature
        store_u32(&mut sector, 39, VOLUME_ID);
        sector[43..54].copy_from_slice(label);
        sector[54..62].copy_from_slice(geometry.fat_type().fs_type_label());
    }

    sector[510] = 0x55;
    sector[511] = 0xAA;
    sector
}

/// Encodes the FAT32 FSInfo sector.
///
/// # Parameters
/// - `free_count`: Number of free clusters after allocation
/// - `next_free`: Lowest cluster the next allocation would try
pub fn fs_info_sector(free_count: u32, next_free: u32) -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    store_u32(&mut sector, 0, 0x4161_5252); // lead signature "RRaA"
    store_u32(&mut sector, 484, 0x6141_7272); // struct signature "rrAa"
    store_u32(&mut sector, 488, free_count);
    store_u32(&mut sector, 492, next_free);
    store_u32(&mut sector, 508, 0xAA55_0000); // trail signature
    sector
}
