//! MZ executable parser.

use dosdc_isa::SegOff;
use rustc_hash::FxHashSet;

use crate::header::{MZ_HEADER_SIZE, MzHeader, read_le16};
use crate::image::{Format, Image};
use crate::{ExeError, Result};

impl Image {
    /// Parse an MZ executable. The load module is placed at linear 0.
    pub fn parse_mz(data: &[u8]) -> Result<Self> {
        if data.len() < MZ_HEADER_SIZE {
            return Err(ExeError::TooSmall);
        }
        let header = MzHeader::parse(data).ok_or(ExeError::TooSmall)?;
        if !header.has_valid_magic() {
            return Err(ExeError::InvalidMagic);
        }

        let start = header.header_size();
        let end = header.file_end();
        if start < MZ_HEADER_SIZE || start > data.len() {
            return Err(ExeError::HeaderOutOfBounds);
        }
        if end < start || end > data.len() {
            return Err(ExeError::LoadModuleOutOfBounds);
        }
        let module = data[start..end].to_vec();
        let relocations = parse_relocations(data, &header, module.len())?;

        Ok(Self {
            data: module,
            base: 0,
            relocations,
            entry: SegOff::new(header.cs, header.ip),
            stack: Some(SegOff::new(header.ss, header.sp)),
            format: Format::Mz,
        })
    }
}

/// Read the relocation table into linear sites inside the load module.
fn parse_relocations(data: &[u8], header: &MzHeader, module_len: usize) -> Result<FxHashSet<u32>> {
    let table = usize::from(header.relocation_offset);
    let count = usize::from(header.relocation_count);
    if table + count * 4 > data.len() {
        return Err(ExeError::RelocationsOutOfBounds);
    }

    let mut sites = FxHashSet::default();
    for i in 0..count {
        let entry = table + i * 4;
        let off = read_le16(data, entry).ok_or(ExeError::RelocationsOutOfBounds)?;
        let seg = read_le16(data, entry + 2).ok_or(ExeError::RelocationsOutOfBounds)?;
        let site = SegOff::new(seg, off).linear();
        if site as usize + 2 > module_len {
            return Err(ExeError::RelocationSiteOutOfBounds(site));
        }
        sites.insert(site);
    }
    Ok(sites)
}
