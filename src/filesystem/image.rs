//! Image construction pipeline and serialization.
//!
//! This module implements the build entry point: it organizes the input
//! entries into a tree, plans the geometry, allocates cluster chains,
//! encodes directory tables and the FAT, and assembles every region into a
//! single buffer of exactly the requested size.

use log::debug;

use super::bpb;
use super::cluster::{ClusterAllocator, ClusterChain};
use super::dir_entry::DirEntry;
use super::fat_table::FatTable;
use super::fat_type::FATType;
use super::geometry::Geometry;
use super::image_error::ImageError;
use super::short_name::ShortNameAllocator;
use super::tree::{NodeKind, PathTree, ROOT};
use crate::constants::SECTOR_SIZE;
use crate::traits::LayoutDisplay;

/// The immutable description of one image build.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    /// The FAT type to produce.
    pub fat_type: FATType,
    /// Target image size in bytes; the output buffer has exactly this length.
    pub size_bytes: u64,
    /// Volume label, at most 11 ASCII characters.
    pub label: String,
}

/// One file to place into the image: its resolved content and target path.
#[derive(Debug, Clone)]
pub struct FileSource {
    /// Path of the file inside the image, `/`-separated.
    pub target: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

/// Builds a FAT image entirely in memory.
///
/// # Parameters
/// - `spec`: FAT type, target size and volume label
/// - `files`: ordered file contents and their target paths
/// - `dirs`: ordered target paths of explicitly empty directories
///
/// # Returns
/// - `Ok(Vec<u8>)`: A mountable image of exactly `spec.size_bytes` bytes
/// - `Err(ImageError)`: If the input is malformed or does not fit
///
/// Building twice from identical inputs yields byte-identical buffers: all
/// timestamps are fixed to the FAT epoch and allocation is deterministic.
pub fn build_image(
    spec: &ImageSpec,
    files: &[FileSource],
    dirs: &[String],
) -> Result<Vec<u8>, ImageError> {
    let label = pack_label(&spec.label)?;

    let file_targets: Vec<(&str, usize)> = files
        .iter()
        .map(|file| (file.target.as_str(), file.bytes.len()))
        .collect();
    let dir_targets: Vec<&str> = dirs.iter().map(String::as_str).collect();
    let tree = PathTree::build(&file_targets, &dir_targets)?;
    let (file_count, dir_count) = tree.counts();
    debug!("building {} image with {file_count} files and {dir_count} directories", spec.fat_type);

    let geometry = Geometry::plan(spec.fat_type, spec.size_bytes)?;
    if let Ok(layout) = geometry.display_layout(2) {
        debug!("\n{layout}");
    }

    // The fixed FAT12/16 root region must hold the label entry plus every
    // root child; it cannot grow.
    if *geometry.fat_type() != FATType::FAT32 {
        let needed = tree.children(ROOT).len() + 1;
        if needed > *geometry.root_ent_cnt() as usize {
            return Err(ImageError::CapacityExceeded(format!(
                "{needed} root directory entries needed but the {} root region holds {}",
                geometry.fat_type(),
                geometry.root_ent_cnt()
            )));
        }
    }

    let mut allocator = ClusterAllocator::new(&geometry);
    let chains = allocate_chains(&tree, &geometry, &mut allocator)?;

    let mut fat = FatTable::new(&geometry);
    for chain in &chains {
        fat.link_chain(chain);
    }

    let state = BuildState {
        tree: &tree,
        geometry: &geometry,
        files,
        chains: &chains,
    };
    state.serialize(spec, &label, &fat, &allocator)
}

/// Copies one sector-sized block into the buffer at a sector offset.
fn sector_copy(buf: &mut [u8], sector: u16, bytes: &[u8; SECTOR_SIZE]) {
    let offset = sector as usize * SECTOR_SIZE;
    buf[offset..offset + SECTOR_SIZE].copy_from_slice(bytes);
}

/// Packs the volume label into its 11-byte space-padded slot.
fn pack_label(label: &str) -> Result<[u8; 11], ImageError> {
    if label.len() > 11 || !label.is_ascii() {
        return Err(ImageError::InvalidLabel(label.to_string()));
    }
    let mut slot = [b' '; 11];
    slot[..label.len()].copy_from_slice(label.as_bytes());
    Ok(slot)
}

/// Allocates the cluster chain of every file and non-root directory in one
/// depth-first walk, plus the FAT32 root chain up front.
///
/// Returns the chains indexed by arena node; the FAT12/16 root keeps an
/// empty chain since it lives in the fixed region.
fn allocate_chains(
    tree: &PathTree,
    geometry: &Geometry,
    allocator: &mut ClusterAllocator,
) -> Result<Vec<ClusterChain>, ImageError> {
    let mut chains: Vec<ClusterChain> = vec![vec![]; tree.len()];

    if *geometry.fat_type() == FATType::FAT32 {
        chains[ROOT] = allocator.allocate_dir(tree.children(ROOT).len())?;
        if chains[ROOT].first() != Some(geometry.root_clus()) {
            return Err(ImageError::IntegrityCheckFailed(format!(
                "FAT32 root chain does not start at cluster {}",
                geometry.root_clus()
            )));
        }
    }

    allocate_subtree(tree, ROOT, allocator, &mut chains)?;
    debug!(
        "allocated {} clusters, {} free",
        geometry.cluster_count() - allocator.free_count(),
        allocator.free_count()
    );
    Ok(chains)
}

fn allocate_subtree(
    tree: &PathTree,
    dir: usize,
    allocator: &mut ClusterAllocator,
    chains: &mut Vec<ClusterChain>,
) -> Result<(), ImageError> {
    for &child in tree.children(dir) {
        match &tree.node(child).kind {
            NodeKind::Directory { children } => {
                // Every subdirectory table leads with its `.` and `..` entries.
                chains[child] = allocator.allocate_dir(children.len() + 2)?;
                allocate_subtree(tree, child, allocator, chains)?;
            }
            NodeKind::File { size, .. } => {
                chains[child] = allocator.allocate_file(*size as u64)?;
            }
        }
    }
    Ok(())
}

/// Read-only state shared by the directory encoder and the serializer.
struct BuildState<'a> {
    tree: &'a PathTree,
    geometry: &'a Geometry,
    files: &'a [FileSource],
    chains: &'a [ClusterChain],
}

impl BuildState<'_> {
    /// Encodes the entry table of one directory node.
    ///
    /// Short names are allocated per directory, in entry order. The FAT12/16
    /// root leads with the volume label entry; subdirectories lead with `.`
    /// and `..`.
    fn encode_directory(
        &self,
        dir: usize,
        label: &[u8; 11],
    ) -> Result<Vec<u8>, ImageError> {
        let mut table = Vec::new();
        let fat32 = *self.geometry.fat_type() == FATType::FAT32;

        if dir == ROOT {
            if !fat32 {
                table.extend_from_slice(&DirEntry::volume_label(*label).encode());
            }
        } else {
            let own = self.chains[dir][0];
            let parent = self.tree.node(dir).parent;
            let parent_clus = if parent == ROOT {
                // 0 for the fixed FAT12/16 root, the root cluster for FAT32.
                *self.geometry.root_clus()
            } else {
                self.chains[parent][0]
            };
            table.extend_from_slice(&DirEntry::dot(own).encode());
            table.extend_from_slice(&DirEntry::dot_dot(parent_clus).encode());
        }

        let mut names = ShortNameAllocator::new();
        for &child in self.tree.children(dir) {
            let node = self.tree.node(child);
            let name = names.allocate(&node.name)?;
            let fst_clus = self.chains[child].first().copied().unwrap_or(0);
            let entry = match node.kind {
                NodeKind::Directory { .. } => DirEntry::directory(name, fst_clus),
                NodeKind::File { size, .. } => DirEntry::file(name, fst_clus, size),
            };
            table.extend_from_slice(&entry.encode());
        }

        Ok(table)
    }

    /// Assembles every region into the final buffer.
    fn serialize(
        &self,
        spec: &ImageSpec,
        label: &[u8; 11],
        fat: &FatTable,
        allocator: &ClusterAllocator,
    ) -> Result<Vec<u8>, ImageError> {
        let geometry = self.geometry;
        let mut buf = vec![0u8; spec.size_bytes as usize];
        let fat32 = *geometry.fat_type() == FATType::FAT32;

        let boot = bpb::boot_sector(geometry, label);
        buf[..SECTOR_SIZE].copy_from_slice(&boot);

        if fat32 {
            let fs_info =
                bpb::fs_info_sector(allocator.free_count(), allocator.next_free_hint());
            sector_copy(&mut buf, bpb::FS_INFO_SECTOR, &fs_info);
            sector_copy(&mut buf, bpb::BACKUP_BOOT_SECTOR, &boot);
            sector_copy(&mut buf, bpb::BACKUP_BOOT_SECTOR + 1, &fs_info);
        }

        let fat_bytes = fat.encode(*geometry.fat_sz());
        for copy in 0..*geometry.num_fat() as u32 {
            let offset = (geometry.fat_start() + copy * geometry.fat_sz()) as usize * SECTOR_SIZE;
            buf[offset..offset + fat_bytes.len()].copy_from_slice(&fat_bytes);
        }

        // Directory tables and file contents.
        for index in 0..self.tree.len() {
            let node = self.tree.node(index);
            match &node.kind {
                NodeKind::Directory { .. } => {
                    let table = self.encode_directory(index, label)?;
                    if index == ROOT && !fat32 {
                        let offset = geometry.root_start() as usize * SECTOR_SIZE;
                        let region = geometry.root_dir_sectors() as usize * SECTOR_SIZE;
                        if table.len() > region {
                            return Err(ImageError::IntegrityCheckFailed(format!(
                                "root directory table of {} bytes exceeds its {region}-byte region",
                                table.len()
                            )));
                        }
                        buf[offset..offset + table.len()].copy_from_slice(&table);
                    } else {
                        self.write_chain(&mut buf, &self.chains[index], &table)?;
                    }
                }
                NodeKind::File { source, .. } => {
                    self.write_chain(&mut buf, &self.chains[index], &self.files[*source].bytes)?;
                }
            }
        }

        // Final integrity checkpoint: the buffer must be exactly the
        // requested size.
        if buf.len() as u64 != spec.size_bytes {
            return Err(ImageError::IntegrityCheckFailed(format!(
                "assembled {} bytes for a {}-byte image",
                buf.len(),
                spec.size_bytes
            )));
        }

        debug!("serialized {} bytes", buf.len());
        Ok(buf)
    }

    /// Writes `bytes` across the clusters of `chain`, zero-padding the tail
    /// of the last cluster.
    fn write_chain(
        &self,
        buf: &mut [u8],
        chain: &[u32],
        bytes: &[u8],
    ) -> Result<(), ImageError> {
        let cluster_size = self.geometry.cluster_size() as usize;
        if bytes.len() > chain.len() * cluster_size {
            return Err(ImageError::IntegrityCheckFailed(format!(
                "{} bytes do not fit a chain of {} clusters",
                bytes.len(),
                chain.len()
            )));
        }

        for (i, &cluster) in chain.iter().enumerate() {
            let start = i * cluster_size;
            if start >= bytes.len() {
                break;
            }
            let end = bytes.len().min(start + cluster_size);
            let offset = self.geometry.cluster_offset(cluster);
            if offset + (end - start) > buf.len() {
                return Err(ImageError::IntegrityCheckFailed(format!(
                    "cluster {cluster} lies beyond the end of the image"
                )));
            }
            buf[offset..offset + (end - start)].copy_from_slice(&bytes[start..end]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DIR_ENTRY_SIZE;
    use crate::utils::{u16_at, u32_at};

    fn spec(fat_type: FATType, size_bytes: u64) -> ImageSpec {
        ImageSpec {
            fat_type,
            size_bytes,
            label: "MY_DISK".to_string(),
        }
    }

    fn file(target: &str, bytes: &[u8]) -> FileSource {
        FileSource {
            target: target.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    /// Offset of the first entry of a FAT16 image's root directory.
    fn root_offset(buf: &[u8]) -> usize {
        let rsvd = u16_at(buf, 14) as usize;
        let fat_sz = u16_at(buf, 22) as usize;
        let num_fat = buf[16] as usize;
        (rsvd + num_fat * fat_sz) * SECTOR_SIZE
    }

    #[test]
    fn greeting_scenario() {
        let files = [file("greeting/hello.txt", b"Hello, world?!")];
        let image = build_image(&spec(FATType::FAT16, 8 * 1024 * 1024), &files, &[]).unwrap();

        assert_eq!(image.len(), 8 * 1024 * 1024);
        assert_eq!(&image[510..512], &[0x55, 0xAA]);

        // Root: volume label first, then the GREETING directory.
        let root = root_offset(&image);
        assert_eq!(&image[root..root + 11], b"MY_DISK    ");
        assert_eq!(image[root + 11], 0x08);

        let entry = root + DIR_ENTRY_SIZE;
        assert_eq!(&image[entry..entry + 11], b"GREETING   ");
        assert_eq!(image[entry + 11], 0x10);
        let greeting_clus = u16_at(&image, entry + 26) as u32;
        assert!(greeting_clus >= 2);

        // The GREETING table: `.`, `..`, then HELLO.TXT with 14 bytes.
        let geometry = Geometry::plan(FATType::FAT16, 8 * 1024 * 1024).unwrap();
        let table = geometry.cluster_offset(greeting_clus);
        assert_eq!(&image[table..table + 11], b".          ");
        assert_eq!(u16_at(&image, table + 26), greeting_clus as u16);
        assert_eq!(&image[table + 32..table + 43], b"..         ");
        assert_eq!(u16_at(&image, table + 32 + 26), 0);

        let hello = table + 2 * DIR_ENTRY_SIZE;
        assert_eq!(&image[hello..hello + 11], b"HELLO   TXT");
        assert_eq!(u32_at(&image, hello + 28), 14);

        // The file owns a one-cluster chain terminated in the FAT.
        let hello_clus = u16_at(&image, hello + 26) as usize;
        let fat_offset = u16_at(&image, 14) as usize * SECTOR_SIZE;
        assert_eq!(u16_at(&image, fat_offset + hello_clus * 2), 0xFFFF);

        // Content is placed at the cluster, zero-padded to its end.
        let content = geometry.cluster_offset(hello_clus as u32);
        assert_eq!(&image[content..content + 14], b"Hello, world?!");
        assert!(image[content + 14..content + geometry.cluster_size() as usize]
            .iter()
            .all(|&byte| byte == 0));
    }

    #[test]
    fn builds_are_deterministic() {
        let files = [
            file("boot/kernel.bin", &[0xAB; 5000]),
            file("readme.txt", b"hi"),
        ];
        let dirs = ["logs".to_string()];
        let spec = spec(FATType::FAT16, 16 * 1024 * 1024);

        let first = build_image(&spec, &files, &dirs).unwrap();
        let second = build_image(&spec, &files, &dirs).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_file_has_no_chain() {
        let files = [file("empty.bin", b"")];
        let image = build_image(&spec(FATType::FAT16, 8 * 1024 * 1024), &files, &[]).unwrap();

        let entry = root_offset(&image) + DIR_ENTRY_SIZE;
        assert_eq!(&image[entry..entry + 11], b"EMPTY   BIN");
        assert_eq!(u16_at(&image, entry + 26), 0);
        assert_eq!(u32_at(&image, entry + 28), 0);
    }

    #[test]
    fn fat32_root_is_a_cluster_chain() {
        let files = [file("hello.txt", b"hello")];
        let image = build_image(&spec(FATType::FAT32, 64 * 1024 * 1024), &files, &[]).unwrap();
        let geometry = Geometry::plan(FATType::FAT32, 64 * 1024 * 1024).unwrap();

        // No label entry in the FAT32 root; the first entry is the file.
        let root = geometry.cluster_offset(2);
        assert_eq!(&image[root..root + 11], b"HELLO   TXT");

        // Root chain terminates in the FAT.
        let fat_offset = u16_at(&image, 14) as usize * SECTOR_SIZE;
        assert_eq!(u32_at(&image, fat_offset + 2 * 4), 0x0FFF_FFFF);
    }

    #[test]
    fn content_spanning_multiple_clusters() {
        let payload: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let files = [file("big.bin", &payload)];
        let image = build_image(&spec(FATType::FAT16, 8 * 1024 * 1024), &files, &[]).unwrap();
        let geometry = Geometry::plan(FATType::FAT16, 8 * 1024 * 1024).unwrap();

        let entry = root_offset(&image) + DIR_ENTRY_SIZE;
        let first = u16_at(&image, entry + 26) as u32;

        // Follow the FAT chain and reassemble the content.
        let fat_offset = u16_at(&image, 14) as usize * SECTOR_SIZE;
        let mut cluster = first;
        let mut recovered = Vec::new();
        while cluster != 0xFFFF {
            let offset = geometry.cluster_offset(cluster);
            recovered.extend_from_slice(&image[offset..offset + geometry.cluster_size() as usize]);
            cluster = u16_at(&image, fat_offset + cluster as usize * 2) as u32;
        }
        assert_eq!(&recovered[..payload.len()], &payload[..]);
        assert_eq!(recovered.len(), 5 * geometry.cluster_size() as usize);
    }

    #[test]
    fn too_much_content_is_a_capacity_error() {
        // 9 MB of content can never fit an 8 MB image.
        let err = build_image(
            &spec(FATType::FAT16, 8 * 1024 * 1024),
            &[
                file("huge.bin", &vec![0u8; 7 * 1024 * 1024]),
                file("huge2.bin", &vec![0u8; 2 * 1024 * 1024]),
            ],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, ImageError::CapacityExceeded(_)));
    }

    #[test]
    fn overlong_label_is_rejected() {
        let err = build_image(
            &ImageSpec {
                fat_type: FATType::FAT16,
                size_bytes: 8 * 1024 * 1024,
                label: "TWELVE_CHARS".to_string(),
            },
            &[],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, ImageError::InvalidLabel(_)));
    }

    #[test]
    fn root_region_overflow_is_a_capacity_error() {
        // 512 root entries minus one label slot.
        let files: Vec<FileSource> = (0..512)
            .map(|i| file(&format!("file{i}.bin"), b"x"))
            .collect();
        let err = build_image(&spec(FATType::FAT16, 8 * 1024 * 1024), &files, &[]).unwrap_err();
        assert!(matches!(err, ImageError::CapacityExceeded(_)));
    }
}
