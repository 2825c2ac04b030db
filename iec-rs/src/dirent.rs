//! Directory entries.
//!
//! Entries travel from a [`DirSource`](crate::channel::dir::DirSource) through
//! the shared 33-byte [`EntryScratch`] into 32-byte listing lines in the
//! layout of a BASIC program line, which is what the host expects when it
//! loads a directory.

use std::fmt;
use std::rc::Rc;

use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Maximum length of an entry name.
pub const NAME_LENGTH: usize = 16;

/// Size of one rendered listing line.
pub const LINE_SIZE: usize = 32;

/// Size of the entry scratch buffer.
pub const SCRATCH_SIZE: usize = 33;

/// Data bytes per block, used for the block count column.
pub const BLOCK_DATA_SIZE: u64 = 254;

/// Padding byte for short names.
const NAME_PAD: u8 = 0xa0;

/// Nonzero link word emitted on every line. The host relinks the program.
const LINE_LINK: [u8; 2] = [0x01, 0x01];

/// Entry types as shown in the listing.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FileType {
    /// Deleted file.
    Del = 0,
    /// Sequential file.
    Seq = 1,
    /// Program file.
    Prg = 2,
    /// User file.
    Usr = 3,
    /// Relative file.
    Rel = 4,
    /// Subdirectory.
    Dir = 6,
}

impl FileType {
    /// Three-letter name used in listings.
    pub fn name(self) -> &'static str {
        match self {
            FileType::Del => "DEL",
            FileType::Seq => "SEQ",
            FileType::Prg => "PRG",
            FileType::Usr => "USR",
            FileType::Rel => "REL",
            FileType::Dir => "DIR",
        }
    }

    /// Parse a type from its listing name or first letter, ignoring case.
    pub fn parse(s: &str) -> Option<FileType> {
        let upper = s.to_ascii_uppercase();
        [
            FileType::Del,
            FileType::Seq,
            FileType::Prg,
            FileType::Usr,
            FileType::Rel,
            FileType::Dir,
        ]
        .into_iter()
        .find(|t| t.name() == upper || (upper.len() == 1 && t.name().starts_with(&upper)))
    }
}

impl TryFrom<u8> for FileType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FileType::Del),
            1 => Ok(FileType::Seq),
            2 => Ok(FileType::Prg),
            3 => Ok(FileType::Usr),
            4 => Ok(FileType::Rel),
            6 => Ok(FileType::Dir),
            other => Err(other),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry produced by a directory traversal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    /// Entry name as raw bytes.
    pub name: Vec<u8>,
    /// Entry type.
    pub file_type: FileType,
    /// Size in bytes.
    pub size: u64,
    /// Write protected.
    pub locked: bool,
}

impl DirEntry {
    /// Create an unlocked entry.
    pub fn new(name: impl Into<Vec<u8>>, file_type: FileType, size: u64) -> Self {
        Self {
            name: name.into(),
            file_type,
            size,
            locked: false,
        }
    }

    /// Size in blocks, rounded up and saturated at `u16::MAX`.
    pub fn blocks(&self) -> u16 {
        let blocks = self.size.div_ceil(BLOCK_DATA_SIZE);
        u16::try_from(blocks).unwrap_or(u16::MAX)
    }
}

/// Check a name against a pattern.
///
/// `?` matches any single byte, `*` matches whatever follows. Anything after
/// a `*` in the pattern is ignored.
pub fn matches_pattern(name: &[u8], pattern: &[u8]) -> bool {
    let mut name = name.iter();
    for &p in pattern {
        match p {
            b'*' => return true,
            b'?' => {
                if name.next().is_none() {
                    return false;
                }
            }
            c => {
                if name.next() != Some(&c) {
                    return false;
                }
            }
        }
    }
    name.next().is_none()
}

/// Selection criteria for a directory traversal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryFilter {
    /// Only entries of this type, if set.
    pub file_type: Option<FileType>,
    /// Name pattern. Shared with whoever parsed the command.
    pub pattern: Rc<[u8]>,
}

impl EntryFilter {
    /// Filter by pattern only.
    pub fn new(pattern: impl Into<Rc<[u8]>>) -> Self {
        Self {
            file_type: None,
            pattern: pattern.into(),
        }
    }

    /// Accept every entry.
    pub fn all() -> Self {
        Self::new(&b"*"[..])
    }

    /// Restrict to one entry type.
    pub fn with_type(mut self, file_type: FileType) -> Self {
        self.file_type = Some(file_type);
        self
    }

    /// Check an entry against the filter.
    pub fn accepts(&self, entry: &DirEntry) -> bool {
        if let Some(t) = self.file_type {
            if entry.file_type != t {
                return false;
            }
        }
        matches_pattern(&entry.name, &self.pattern)
    }
}

/// Scratch layout for one parsed entry (33 bytes, little-endian).
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EntryScratch {
    /// Size in blocks.
    pub blocks: U16,
    /// Type code in bits 0-2, bit 6 set when locked.
    pub typeflags: u8,
    /// Number of meaningful bytes in `name`.
    pub name_len: u8,
    /// Name, padded with 0xa0.
    pub name: [u8; NAME_LENGTH],
    /// Size in bytes, saturated.
    pub size: U32,
    /// Reserved, always zero.
    pub reserved: [u8; 9],
}

const _: () = assert!(std::mem::size_of::<EntryScratch>() == SCRATCH_SIZE);

const TYPE_MASK: u8 = 0x07;
const FLAG_LOCKED: u8 = 0x40;

impl Default for EntryScratch {
    fn default() -> Self {
        Self {
            blocks: U16::new(0),
            typeflags: 0,
            name_len: 0,
            name: [NAME_PAD; NAME_LENGTH],
            size: U32::new(0),
            reserved: [0; 9],
        }
    }
}

impl EntryScratch {
    /// Parse an entry into the scratch. Long names are truncated.
    pub fn load(&mut self, entry: &DirEntry) {
        let len = entry.name.len().min(NAME_LENGTH);
        *self = Self::default();
        self.blocks = U16::new(entry.blocks());
        self.typeflags = entry.file_type as u8 | if entry.locked { FLAG_LOCKED } else { 0 };
        self.name_len = len as u8;
        self.name[..len].copy_from_slice(&entry.name[..len]);
        self.size = U32::new(u32::try_from(entry.size).unwrap_or(u32::MAX));
    }

    /// Meaningful part of the name.
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    /// Entry type, if the scratch holds a valid one.
    pub fn file_type(&self) -> Option<FileType> {
        FileType::try_from(self.typeflags & TYPE_MASK).ok()
    }

    /// Check the lock flag.
    pub fn locked(&self) -> bool {
        self.typeflags & FLAG_LOCKED != 0
    }

    /// Render the listing line for this entry into `out`.
    ///
    /// Returns the number of bytes written, always [`LINE_SIZE`]. `out` must
    /// hold at least that many bytes.
    pub fn render_line(&self, out: &mut [u8]) -> usize {
        let line = &mut out[..LINE_SIZE];
        line.fill(b' ');

        let blocks = self.blocks.get();
        line[0..2].copy_from_slice(&LINE_LINK);
        line[2..4].copy_from_slice(&blocks.to_le_bytes());

        // Right-align names under the block column.
        let mut pos = 4 + match blocks {
            0..=9 => 3,
            10..=99 => 2,
            100..=999 => 1,
            _ => 0,
        };

        line[pos] = b'"';
        pos += 1;
        let name = self.name();
        line[pos..pos + name.len()].copy_from_slice(name);
        line[pos + name.len()] = b'"';
        pos += NAME_LENGTH + 1;

        // Splat column, always blank for closed files.
        pos += 1;

        let type_name = self.file_type().map_or("???", FileType::name);
        line[pos..pos + 3].copy_from_slice(type_name.as_bytes());
        pos += 3;
        if self.locked() {
            line[pos] = b'<';
        }

        line[LINE_SIZE - 1] = 0;
        LINE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern(b"GAME", b"GAME"));
        assert!(!matches_pattern(b"GAME", b"GAM"));
        assert!(!matches_pattern(b"GAM", b"GAME"));
        assert!(matches_pattern(b"GAME", b"G*"));
        assert!(matches_pattern(b"GAME", b"*"));
        assert!(matches_pattern(b"", b"*"));
        assert!(matches_pattern(b"GAME", b"G?ME"));
        assert!(!matches_pattern(b"GAME", b"G?M"));
        assert!(matches_pattern(b"GAME", b"G?M*"));
        // Everything after a star is ignored.
        assert!(matches_pattern(b"GAME", b"G*X"));
    }

    #[test]
    fn test_filter() {
        let prg = DirEntry::new("DEMO", FileType::Prg, 100);
        let seq = DirEntry::new("DATA", FileType::Seq, 100);

        let all = EntryFilter::all();
        assert!(all.accepts(&prg));
        assert!(all.accepts(&seq));

        let only_seq = EntryFilter::all().with_type(FileType::Seq);
        assert!(!only_seq.accepts(&prg));
        assert!(only_seq.accepts(&seq));

        let d = EntryFilter::new(&b"DE*"[..]);
        assert!(d.accepts(&prg));
        assert!(!d.accepts(&seq));
    }

    #[test]
    fn test_blocks() {
        assert_eq!(DirEntry::new("A", FileType::Prg, 0).blocks(), 0);
        assert_eq!(DirEntry::new("A", FileType::Prg, 1).blocks(), 1);
        assert_eq!(DirEntry::new("A", FileType::Prg, 254).blocks(), 1);
        assert_eq!(DirEntry::new("A", FileType::Prg, 255).blocks(), 2);
        assert_eq!(DirEntry::new("A", FileType::Prg, u64::MAX).blocks(), u16::MAX);
    }

    #[test]
    fn test_file_type_parse() {
        assert_eq!(FileType::parse("prg"), Some(FileType::Prg));
        assert_eq!(FileType::parse("S"), Some(FileType::Seq));
        assert_eq!(FileType::parse("DIR"), Some(FileType::Dir));
        assert_eq!(FileType::parse("xyz"), None);
        assert_eq!(FileType::try_from(5), Err(5));
    }

    #[test]
    fn test_scratch_load_truncates() {
        let mut scratch = EntryScratch::default();
        let mut entry = DirEntry::new("A_VERY_LONG_FILENAME.PRG", FileType::Usr, 1000);
        entry.locked = true;
        scratch.load(&entry);

        assert_eq!(scratch.name(), b"A_VERY_LONG_FILE");
        assert_eq!(scratch.blocks.get(), 4);
        assert_eq!(scratch.size.get(), 1000);
        assert_eq!(scratch.file_type(), Some(FileType::Usr));
        assert!(scratch.locked());
        assert_eq!(scratch.as_bytes().len(), SCRATCH_SIZE);
    }

    #[test]
    fn test_render_line() {
        let mut scratch = EntryScratch::default();
        scratch.load(&DirEntry::new("HELLO", FileType::Prg, 508));

        let mut out = [0xffu8; 40];
        assert_eq!(scratch.render_line(&mut out), LINE_SIZE);

        assert_eq!(&out[0..2], &LINE_LINK);
        assert_eq!(u16::from_le_bytes([out[2], out[3]]), 2);
        assert_eq!(&out[4..14], b"   \"HELLO\"");
        assert_eq!(&out[24..31], b"  PRG  ");
        assert_eq!(out[31], 0);
        // Bytes past the line are untouched.
        assert_eq!(out[32], 0xff);
    }

    #[test]
    fn test_render_line_wide_blocks() {
        let mut scratch = EntryScratch::default();
        let mut entry = DirEntry::new("0123456789ABCDEF", FileType::Seq, 254 * 1200);
        entry.locked = true;
        scratch.load(&entry);

        let mut out = [0u8; LINE_SIZE];
        scratch.render_line(&mut out);
        assert_eq!(&out[4..22], b"\"0123456789ABCDEF\"");
        assert_eq!(&out[23..27], b"SEQ<");
        assert_eq!(out[31], 0);
    }
}
