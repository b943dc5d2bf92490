//! 8.3 short name generation.
//!
//! Maps arbitrary target names to unique 11-byte short name slots within one
//! directory: uppercase, strip characters illegal in 8.3 names, truncate, and
//! resolve collisions with `~N` suffixes.

use std::collections::HashSet;

use super::image_error::ImageError;

/// Maximum `~N` suffix tried before giving up on a directory.
const MAX_SUFFIX: u32 = 9999;

/// Maximum base length kept from the original name.
const BASE_LEN: usize = 6;

/// Punctuation legal in an 8.3 name besides letters and digits.
const LEGAL_PUNCTUATION: &[u8] = b"!#$%&'()-@^_`{}~";

/// Allocates unique 8.3 names within a single directory.
///
/// One allocator instance exists per directory; names are handed out in
/// entry order, which makes collision numbering deterministic.
#[derive(Default)]
pub struct ShortNameAllocator {
    /// All 11-byte slots handed out so far.
    used: HashSet<[u8; 11]>,
    /// Truncated bases of all handed-out names, for the collision rule.
    bases: HashSet<Vec<u8>>,
}

impl ShortNameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `name` to a unique 11-byte short name slot.
    ///
    /// The base keeps at most 6 characters and the extension at most 3. A
    /// truncated name whose base is already present, or any direct collision,
    /// receives a `~N` suffix with the base re-truncated to leave room.
    ///
    /// # Errors
    /// - `ImageError::NameExhaustion` if all 9999 suffixes are taken
    pub fn allocate(&mut self, name: &str) -> Result<[u8; 11], ImageError> {
        let (base_raw, ext_raw) = sanitize(name);
        let base: &[u8] = &base_raw[..base_raw.len().min(BASE_LEN)];
        let ext: &[u8] = &ext_raw[..ext_raw.len().min(3)];
        let truncated = base_raw.len() > BASE_LEN;

        if !base.is_empty() {
            let candidate = pack(base, ext);
            if !self.used.contains(&candidate) && !(truncated && self.bases.contains(base)) {
                return Ok(self.remember(candidate, base));
            }
        }

        for n in 1..=MAX_SUFFIX {
            let suffix = format!("~{n}");
            let keep = (8 - suffix.len()).min(base.len());
            let mut stem = base[..keep].to_vec();
            stem.extend_from_slice(suffix.as_bytes());

            let candidate = pack(&stem, ext);
            if !self.used.contains(&candidate) {
                return Ok(self.remember(candidate, base));
            }
        }

        Err(ImageError::NameExhaustion(name.to_string()))
    }

    fn remember(&mut self, slot: [u8; 11], base: &[u8]) -> [u8; 11] {
        self.used.insert(slot);
        self.bases.insert(base.to_vec());
        slot
    }
}

/// Uppercases `name`, splits it on the last `.` and strips characters
/// illegal in an 8.3 name from both parts.
fn sanitize(name: &str) -> (Vec<u8>, Vec<u8>) {
    let (base, ext) = match name.rsplit_once('.') {
        Some((base, ext)) => (base, ext),
        None => (name, ""),
    };
    (strip_illegal(base), strip_illegal(ext))
}

fn strip_illegal(part: &str) -> Vec<u8> {
    part.bytes()
        .map(|byte| byte.to_ascii_uppercase())
        .filter(|byte| byte.is_ascii_alphanumeric() || LEGAL_PUNCTUATION.contains(byte))
        .collect()
}

/// Packs a base and an extension into the fixed 11-byte slot, space padded.
fn pack(base: &[u8], ext: &[u8]) -> [u8; 11] {
    let mut slot = [b' '; 11];
    slot[..base.len()].copy_from_slice(base);
    slot[8..8 + ext.len()].copy_from_slice(ext);
    slot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(s: &str) -> [u8; 11] {
        s.as_bytes().try_into().unwrap()
    }

    #[test]
    fn short_names_pass_through() {
        let mut names = ShortNameAllocator::new();
        assert_eq!(names.allocate("hello.txt").unwrap(), slot("HELLO   TXT"));
        assert_eq!(names.allocate("README").unwrap(), slot("README     "));
        assert_eq!(names.allocate("a.b").unwrap(), slot("A       B  "));
    }

    #[test]
    fn long_names_are_truncated() {
        let mut names = ShortNameAllocator::new();
        assert_eq!(
            names.allocate("longfilename.text").unwrap(),
            slot("LONGFI  TEX")
        );
    }

    #[test]
    fn colliding_truncations_get_numeric_suffixes() {
        let mut names = ShortNameAllocator::new();
        assert_eq!(
            names.allocate("longfilename1.txt").unwrap(),
            slot("LONGFI  TXT")
        );
        assert_eq!(
            names.allocate("longfilename2.txt").unwrap(),
            slot("LONGFI~1TXT")
        );
        assert_eq!(
            names.allocate("longfilename3.txt").unwrap(),
            slot("LONGFI~2TXT")
        );
    }

    #[test]
    fn truncated_name_with_known_base_is_suffixed_across_extensions() {
        let mut names = ShortNameAllocator::new();
        assert_eq!(
            names.allocate("longfilename.txt").unwrap(),
            slot("LONGFI  TXT")
        );
        // Different extension, same truncated base: still suffixed.
        assert_eq!(
            names.allocate("longfilename.dat").unwrap(),
            slot("LONGFI~1DAT")
        );
    }

    #[test]
    fn illegal_characters_are_stripped() {
        let mut names = ShortNameAllocator::new();
        assert_eq!(names.allocate("he llo+.txt").unwrap(), slot("HELLO   TXT"));
        assert_eq!(
            names.allocate("archive.tar.gz").unwrap(),
            slot("ARCHIV  GZ ")
        );
    }

    #[test]
    fn empty_base_goes_straight_to_suffix() {
        let mut names = ShortNameAllocator::new();
        assert_eq!(names.allocate("+++.cfg").unwrap(), slot("~1      CFG"));
        assert_eq!(names.allocate("***.cfg").unwrap(), slot("~2      CFG"));
    }

    #[test]
    fn suffix_retruncates_past_nine() {
        let mut names = ShortNameAllocator::new();
        for n in 0..11 {
            names.allocate(&format!("longfilename{n}.txt")).unwrap();
        }
        // The 11th collision needs a three-character suffix.
        assert_eq!(
            names.allocate("longfilename11.txt").unwrap(),
            slot("LONGF~11TXT")
        );
    }

    #[test]
    fn names_within_a_directory_are_pairwise_distinct() {
        let mut names = ShortNameAllocator::new();
        let mut seen = std::collections::HashSet::new();
        for n in 0..200 {
            let slot = names.allocate(&format!("collision_prone_name{n}.bin")).unwrap();
            assert!(seen.insert(slot));
        }
    }
}
