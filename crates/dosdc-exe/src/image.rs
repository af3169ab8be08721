//! Byte image of a loaded program.

use std::path::Path;

use dosdc_isa::SegOff;
use rustc_hash::FxHashSet;

use crate::header::{COM_ORIGIN, MZ_MAGIC, ZM_MAGIC, read_le16};
use crate::{ExeError, Result};

/// Where an image came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Raw bytes placed at an arbitrary address.
    Raw,
    Com,
    Mz,
}

/// Program bytes at a linear base address, with relocation sites.
///
/// MZ load modules are placed at linear 0, so segment values in the code
/// are load-relative.
#[derive(Clone, Debug)]
pub struct Image {
    pub data: Vec<u8>,
    /// Linear address of `data[0]`.
    pub base: u32,
    /// Linear addresses of relocated segment words.
    pub relocations: FxHashSet<u32>,
    pub entry: SegOff,
    pub stack: Option<SegOff>,
    pub format: Format,
}

impl Image {
    /// Image from raw bytecode (not an actual executable).
    pub fn from_bytecode(data: Vec<u8>, load_at: SegOff, entry: SegOff) -> Self {
        Self {
            data,
            base: load_at.linear(),
            relocations: FxHashSet::default(),
            entry,
            stack: None,
            format: Format::Raw,
        }
    }

    /// Flat COM image, loaded at 0000:0100.
    pub fn parse_com(data: &[u8]) -> Result<Self> {
        let limit = usize::from(u16::MAX - COM_ORIGIN) + 1;
        if data.is_empty() {
            return Err(ExeError::TooSmall);
        }
        if data.len() > limit {
            return Err(ExeError::ComTooLarge(data.len()));
        }
        let origin = SegOff::new(0, COM_ORIGIN);
        Ok(Self {
            data: data.to_vec(),
            base: origin.linear(),
            relocations: FxHashSet::default(),
            entry: origin,
            stack: Some(SegOff::new(0, 0xFFFE)),
            format: Format::Com,
        })
    }

    /// Load an executable from disk, choosing MZ or COM by magic.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    /// Parse bytes as MZ if they carry the magic, else as COM.
    pub fn parse(data: &[u8]) -> Result<Self> {
        match read_le16(data, 0) {
            Some(MZ_MAGIC | ZM_MAGIC) => Self::parse_mz(data),
            _ => Self::parse_com(data),
        }
    }

    /// One past the last linear address.
    pub fn end(&self) -> u32 {
        self.base + u32::try_from(self.data.len()).unwrap_or(u32::MAX - self.base)
    }

    pub fn contains(&self, linear: u32) -> bool {
        linear >= self.base && linear < self.end()
    }

    /// Bytes from `linear` to the end of the image.
    pub fn bytes_at(&self, linear: u32) -> Option<&[u8]> {
        if !self.contains(linear) {
            return None;
        }
        self.data.get((linear - self.base) as usize..)
    }

    pub fn read_u16(&self, linear: u32) -> Option<u16> {
        if !self.contains(linear) {
            return None;
        }
        read_le16(&self.data, (linear - self.base) as usize)
    }

    /// True if the word at `linear` is patched by the loader.
    pub fn is_relocated(&self, linear: u32) -> bool {
        self.relocations.contains(&linear)
    }

    /// True if segment values in this image can be checked against relocations.
    pub fn has_relocation_table(&self) -> bool {
        self.format == Format::Mz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytecode() {
        let image = Image::from_bytecode(vec![0xB8, 0x01, 0x00, 0xC3], SegOff::new(0x10, 0), SegOff::new(0x10, 0));
        assert_eq!(image.base, 0x100);
        assert_eq!(image.end(), 0x104);
        assert!(image.contains(0x103));
        assert!(!image.contains(0x104));
        assert!(!image.contains(0xFF));
        assert_eq!(image.read_u16(0x101), Some(1));
        assert_eq!(image.read_u16(0x103), None);
        assert_eq!(image.bytes_at(0x103), Some(&[0xC3][..]));
        assert!(!image.has_relocation_table());
    }

    #[test]
    fn test_parse_com() {
        let image = Image::parse_com(&[0xCD, 0x20]).unwrap();
        assert_eq!(image.format, Format::Com);
        assert_eq!(image.entry, SegOff::new(0, 0x100));
        assert_eq!(image.base, 0x100);
        assert_eq!(image.bytes_at(0x100), Some(&[0xCD, 0x20][..]));
    }

    #[test]
    fn test_com_limits() {
        assert!(matches!(Image::parse_com(&[]), Err(ExeError::TooSmall)));
        let big = vec![0x90; 0x1_0000];
        assert!(matches!(Image::parse_com(&big), Err(ExeError::ComTooLarge(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [0xB4, 0x4C, 0xCD, 0x21]).unwrap();
        let image = Image::load(file.path()).unwrap();
        assert_eq!(image.format, Format::Com);
        assert_eq!(image.data.len(), 4);

        let missing = file.path().with_extension("missing");
        assert!(matches!(Image::load(missing), Err(ExeError::Io(_))));
    }
}
