//! MZ header structure.

/// "MZ" little-endian.
pub const MZ_MAGIC: u16 = 0x5A4D;
/// "ZM", accepted by DOS as well.
pub const ZM_MAGIC: u16 = 0x4D5A;
/// Size of the fixed part of the header.
pub const MZ_HEADER_SIZE: usize = 0x1C;
pub const PAGE_SIZE: usize = 512;
pub const PARAGRAPH_SIZE: usize = 16;
/// Offset of a COM image inside its segment (after the PSP).
pub const COM_ORIGIN: u16 = 0x100;

/// Read little-endian u16 from bytes.
#[inline]
pub(crate) fn read_le16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Fixed MZ header fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MzHeader {
    pub magic: u16,
    /// Bytes used in the last page (0 means the whole page).
    pub last_page_bytes: u16,
    pub pages: u16,
    pub relocation_count: u16,
    pub header_paragraphs: u16,
    pub min_alloc: u16,
    pub max_alloc: u16,
    pub ss: u16,
    pub sp: u16,
    pub checksum: u16,
    pub ip: u16,
    pub cs: u16,
    pub relocation_offset: u16,
    pub overlay: u16,
}

impl MzHeader {
    /// Parse the fixed header, or `None` if `data` is shorter than it.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let w = |i: usize| read_le16(data, i * 2);
        Some(Self {
            magic: w(0)?,
            last_page_bytes: w(1)?,
            pages: w(2)?,
            relocation_count: w(3)?,
            header_paragraphs: w(4)?,
            min_alloc: w(5)?,
            max_alloc: w(6)?,
            ss: w(7)?,
            sp: w(8)?,
            checksum: w(9)?,
            ip: w(10)?,
            cs: w(11)?,
            relocation_offset: w(12)?,
            overlay: w(13)?,
        })
    }

    pub const fn has_valid_magic(&self) -> bool {
        self.magic == MZ_MAGIC || self.magic == ZM_MAGIC
    }

    pub const fn header_size(&self) -> usize {
        self.header_paragraphs as usize * PARAGRAPH_SIZE
    }

    /// File offset one past the last byte of the load module.
    pub const fn file_end(&self) -> usize {
        let full = self.pages as usize * PAGE_SIZE;
        if self.last_page_bytes == 0 || self.pages == 0 {
            full
        } else {
            full - PAGE_SIZE + self.last_page_bytes as usize
        }
    }
}
