//! Image geometry planning.
//!
//! This module derives the complete sector/cluster layout of an image from
//! the requested FAT type and target size:
//! - Reserved region, FAT region, fixed root region and data region extents
//! - Sectors-per-cluster selection from the standard size bands
//! - FAT sizing by fixed-point iteration (the FAT size and the cluster count
//!   depend on each other)
//! - Structural capacity and cluster-count range validation

use getset::Getters;
use std::fmt::Write as FmtWrite;

use super::fat_type::FATType;
use super::image_error::ImageError;
use crate::constants::{FAT_COPIES, SECTOR_SIZE};
use crate::traits::LayoutDisplay;

/// Upper bound on FAT sizing iterations before giving up.
const MAX_FAT_SIZING_ROUNDS: u32 = 8;

/// The physical layout of a FAT image.
///
/// A Geometry is computed once by [`Geometry::plan`] and never mutated. It
/// satisfies `rsvd_sec_cnt + num_fat * fat_sz + root_dir_sectors +
/// data_sectors == tot_sec` for every accepted (type, size) pair.
#[derive(Debug, Getters)]
pub struct Geometry {
    /// The FAT type this layout was planned for.
    #[get = "pub"]
    fat_type: FATType,
    /// Number of bytes per sector.
    #[get = "pub"]
    bytes_per_sec: u16,
    /// Number of sectors per cluster.
    #[get = "pub"]
    sec_per_clus: u8,
    /// Number of reserved sectors from start of volume.
    #[get = "pub"]
    rsvd_sec_cnt: u16,
    /// Number of FAT copies.
    #[get = "pub"]
    num_fat: u8,
    /// Maximum number of root directory entries (0 for FAT32).
    #[get = "pub"]
    root_ent_cnt: u16,
    /// Total sectors on the volume.
    #[get = "pub"]
    tot_sec: u32,
    /// Sectors per FAT copy.
    #[get = "pub"]
    fat_sz: u32,
    /// Number of data clusters.
    #[get = "pub"]
    cluster_count: u32,
    /// First cluster of the root directory (FAT32 only, else 0).
    #[get = "pub"]
    root_clus: u32,
}

impl Geometry {
    /// Plans the layout of an image of `size_bytes` bytes for `fat_type`.
    ///
    /// # Returns
    /// - `Ok(Geometry)`: The planned layout
    /// - `Err(ImageError)`: If the size is malformed, too small for the
    ///   structural overhead, or yields a cluster count outside the legal
    ///   range of the requested FAT type
    ///
    /// # Errors
    /// - `ImageError::InvalidImageSize` if the size is zero, not a multiple
    ///   of the sector size, or overflows a 32-bit sector count
    /// - `ImageError::CapacityExceeded` if the size cannot host the boot
    ///   sector, the FAT copies and the root region
    /// - `ImageError::VariantMismatch` if the computed cluster count does not
    ///   fall in the requested type's range
    pub fn plan(fat_type: FATType, size_bytes: u64) -> Result<Geometry, ImageError> {
        let sector_size = SECTOR_SIZE as u64;
        if size_bytes == 0
            || size_bytes % sector_size != 0
            || size_bytes / sector_size > u32::MAX as u64
        {
            return Err(ImageError::InvalidImageSize(size_bytes));
        }

        let tot_sec = (size_bytes / sector_size) as u32;
        let rsvd_sec_cnt = fat_type.reserved_sectors();
        let root_dir_sectors = fat_type.root_dir_sectors();
        let num_fat = FAT_COPIES as u32;

        // Boot/reserved region, at least one sector per FAT copy and the
        // fixed root region must fit even with zero data clusters.
        let min_overhead = rsvd_sec_cnt + num_fat + root_dir_sectors;
        if tot_sec < min_overhead {
            return Err(ImageError::CapacityExceeded(format!(
                "{tot_sec} sectors cannot host the {min_overhead} structural \
                 overhead sectors of a {fat_type} volume"
            )));
        }

        let sec_per_clus = fat_type.sectors_per_cluster(tot_sec);
        let avail = tot_sec - rsvd_sec_cnt - root_dir_sectors;

        // The FAT size depends on the cluster count, which itself depends on
        // the FAT size. Iterate from a single sector, growing only: once a
        // size covers the cluster count it implies, the layout is stable.
        let mut fat_sz: u32 = 1;
        let mut converged = false;
        for _ in 0..MAX_FAT_SIZING_ROUNDS {
            if avail < num_fat * fat_sz {
                return Err(ImageError::CapacityExceeded(format!(
                    "{avail} sectors left for {num_fat} FAT copies of {fat_sz} sectors each"
                )));
            }
            let clusters = (avail - num_fat * fat_sz) / sec_per_clus as u32;
            // Entries 0 and 1 are reserved pseudo-entries.
            let needed = fat_type.fat_sectors(clusters + 2);
            if needed <= fat_sz {
                converged = true;
                break;
            }
            fat_sz = needed;
        }
        if !converged {
            return Err(ImageError::IntegrityCheckFailed(format!(
                "FAT sizing did not converge within {MAX_FAT_SIZING_ROUNDS} rounds"
            )));
        }

        let cluster_count = (avail - num_fat * fat_sz) / sec_per_clus as u32;
        let (min_clusters, max_clusters) = fat_type.cluster_range();
        if cluster_count < min_clusters || cluster_count >= max_clusters {
            return Err(ImageError::VariantMismatch {
                requested: fat_type,
                clusters: cluster_count,
            });
        }

        let geometry = Geometry {
            fat_type,
            bytes_per_sec: SECTOR_SIZE as u16,
            sec_per_clus,
            rsvd_sec_cnt: rsvd_sec_cnt as u16,
            num_fat: FAT_COPIES,
            root_ent_cnt: fat_type.root_entry_count(),
            tot_sec,
            fat_sz,
            cluster_count,
            root_clus: match fat_type {
                FATType::FAT32 => 2,
                _ => 0,
            },
        };
        log::debug!(
            "planned {} layout: {} sectors, {} sectors/cluster, {} clusters, {} sectors/FAT",
            fat_type,
            tot_sec,
            sec_per_clus,
            cluster_count,
            fat_sz
        );
        Ok(geometry)
    }

    /// Returns the size of a cluster in bytes.
    pub fn cluster_size(&self) -> u32 {
        self.bytes_per_sec as u32 * self.sec_per_clus as u32
    }

    /// Returns the starting sector of the first FAT.
    pub fn fat_start(&self) -> u32 {
        self.rsvd_sec_cnt as u32
    }

    /// Returns the starting sector of the fixed root directory region.
    ///
    /// For FAT32 this is where the data region begins, since the root
    /// directory lives in a cluster chain.
    pub fn root_start(&self) -> u32 {
        self.fat_start() + self.fat_sz * self.num_fat as u32
    }

    /// Returns the number of sectors occupied by the fixed root region.
    pub fn root_dir_sectors(&self) -> u32 {
        self.fat_type.root_dir_sectors()
    }

    /// Returns the starting sector of the data region.
    pub fn data_start(&self) -> u32 {
        self.root_start() + self.root_dir_sectors()
    }

    /// Returns the number of sectors in the data region, trailing partial
    /// cluster included.
    pub fn data_sectors(&self) -> u32 {
        self.tot_sec - self.data_start()
    }

    /// Converts a cluster number to its corresponding sector number.
    ///
    /// # Parameters
    /// - `cluster`: The cluster number to convert. Cluster 2 is the first
    ///   data cluster.
    pub fn cluster_to_sector(&self, cluster: u32) -> u32 {
        self.data_start() + (cluster - 2) * self.sec_per_clus as u32
    }

    /// Returns the byte offset of a cluster within the image.
    pub fn cluster_offset(&self, cluster: u32) -> usize {
        self.cluster_to_sector(cluster) as usize * self.bytes_per_sec as usize
    }
}

/// Implements the LayoutDisplay trait for Geometry
impl LayoutDisplay for Geometry {
    fn display_layout(&self, indent: u8) -> Result<String, std::fmt::Error> {
        let mut out = String::from("");
        let indent = " ".repeat(indent.into());

        writeln!(
            out,
            "{}┌{:─^55}┐",
            indent,
            format!(" {} Image Layout ", self.fat_type)
        )?;
        writeln!(
            out,
            "{}├{:^12}┬{:^12}┬{:^12}┬{:^16}┤",
            indent, "Region", "Start", "End", "Description"
        )?;
        writeln!(
            out,
            "{}├{:─<12}┼{:─<12}┼{:─<12}┼{:─<16}┤",
            indent, "", "", "", ""
        )?;

        writeln!(
            out,
            "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
            indent,
            "Reserved",
            0,
            self.fat_start(),
            "Boot + Reserved"
        )?;
        for i in 0..self.num_fat {
            let fat_i_start = self.fat_start() + i as u32 * self.fat_sz;
            let fat_i_end = fat_i_start + self.fat_sz;
            writeln!(
                out,
                "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
                indent,
                format!("FAT #{}", i),
                fat_i_start,
                fat_i_end,
                "FAT Tables"
            )?;
        }
        if *self.fat_type() != FATType::FAT32 {
            writeln!(
                out,
                "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
                indent,
                "Root Dir",
                self.root_start(),
                self.data_start(),
                "Root Directory"
            )?;
        }
        writeln!(
            out,
            "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
            indent,
            "Data",
            self.data_start(),
            self.tot_sec,
            "Cluster Data"
        )?;

        writeln!(
            out,
            "{}└{:─<12}┴{:─<12}┴{:─<12}┴{:─<16}┘",
            indent, "", "", "", ""
        )?;

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_add_up_to_total_sectors() {
        let cases = [
            (FATType::FAT12, 2 * 1024 * 1024),
            (FATType::FAT12, 1_474_560), // 1.44 MB floppy
            (FATType::FAT16, 8 * 1024 * 1024),
            (FATType::FAT16, 64 * 1024 * 1024),
            (FATType::FAT32, 64 * 1024 * 1024),
            (FATType::FAT32, 256 * 1024 * 1024),
        ];

        for (fat_type, size) in cases {
            let geom = Geometry::plan(fat_type, size).unwrap();
            let overhead = *geom.rsvd_sec_cnt() as u32
                + *geom.num_fat() as u32 * geom.fat_sz()
                + geom.root_dir_sectors();
            assert_eq!(overhead + geom.data_sectors(), *geom.tot_sec());
            assert_eq!(*geom.tot_sec() as u64, size / SECTOR_SIZE as u64);
            // Every planned cluster must have a FAT entry.
            assert!(
                fat_type.fat_bytes(geom.cluster_count() + 2)
                    <= *geom.fat_sz() as u64 * SECTOR_SIZE as u64
            );
        }
    }

    #[test]
    fn fat16_8mb_layout() {
        let geom = Geometry::plan(FATType::FAT16, 8 * 1024 * 1024).unwrap();
        assert_eq!(*geom.tot_sec(), 16_384);
        assert_eq!(*geom.sec_per_clus(), 2);
        assert_eq!(*geom.rsvd_sec_cnt(), 1);
        assert_eq!(*geom.root_ent_cnt(), 512);
        assert!(*geom.cluster_count() >= 4085 && *geom.cluster_count() < 65525);
    }

    #[test]
    fn undersized_fat32_is_a_capacity_error() {
        // 10 KB is not even a whole number of reserved sectors for FAT32.
        let err = Geometry::plan(FATType::FAT32, 10 * 1024).unwrap_err();
        assert!(matches!(err, ImageError::CapacityExceeded(_)));
    }

    #[test]
    fn oversized_fat12_is_a_variant_mismatch() {
        // 512 MB yields tens of thousands of clusters even at the largest
        // FAT12 cluster size.
        let err = Geometry::plan(FATType::FAT12, 512 * 1024 * 1024).unwrap_err();
        assert!(matches!(err, ImageError::VariantMismatch { .. }));
    }

    #[test]
    fn undersized_fat32_cluster_count_is_a_variant_mismatch() {
        // 16 MB holds far fewer than 65525 clusters.
        let err = Geometry::plan(FATType::FAT32, 16 * 1024 * 1024).unwrap_err();
        assert!(matches!(err, ImageError::VariantMismatch { .. }));
    }

    #[test]
    fn rejects_malformed_sizes() {
        assert!(matches!(
            Geometry::plan(FATType::FAT16, 0).unwrap_err(),
            ImageError::InvalidImageSize(0)
        ));
        assert!(matches!(
            Geometry::plan(FATType::FAT16, 8 * 1024 * 1024 + 17).unwrap_err(),
            ImageError::InvalidImageSize(_)
        ));
    }

    #[test]
    fn fat32_root_starts_at_cluster_two() {
        let geom = Geometry::plan(FATType::FAT32, 64 * 1024 * 1024).unwrap();
        assert_eq!(*geom.root_clus(), 2);
        assert_eq!(*geom.root_ent_cnt(), 0);
        assert_eq!(*geom.rsvd_sec_cnt(), 32);
    }
}
