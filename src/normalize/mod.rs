//! Archive metadata normalization.
//!
//! Archives produced by different build environments differ in entry
//! timestamps, file modes and entry order even when their contents match.
//! Copying that metadata from the published archive onto the rebuilt one
//! leaves only content differences for the diff step to find.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use zip::{DateTime, ZipArchive, ZipWriter};

use crate::error::{ProvError, Result};

const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_SIG: u32 = 0x0605_4b50;
const CENTRAL_HEADER_LEN: usize = 46;
const END_OF_CENTRAL_LEN: usize = 22;

/// Host system byte and external attributes of a central directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Attributes {
    pub host: u8,
    pub external: u32,
}

/// Rewrite `rebuilt` so each entry also present in `reference` carries the
/// reference's modification time and external attributes, with entries in
/// reference order.
///
/// Timestamps and attributes transfer independently. Entries missing from
/// the reference follow, in their original order. Entry data is copied
/// without recompression.
pub fn transfer_metadata(reference: &[u8], rebuilt: &[u8]) -> Result<Vec<u8>> {
    let mut source = ZipArchive::new(Cursor::new(reference))?;
    let mut dest = ZipArchive::new(Cursor::new(rebuilt))?;

    let source_order = entry_names(&mut source)?;
    let mut source_modified = HashMap::with_capacity(source_order.len());
    for i in 0..source.len() {
        let entry = source.by_index_raw(i)?;
        source_modified.insert(entry.name().to_string(), entry.last_modified());
    }

    let dest_names = entry_names(&mut dest)?;
    let dest_index: HashMap<&str, usize> = dest_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut order: Vec<usize> = source_order
        .iter()
        .filter_map(|name| dest_index.get(name.as_str()).copied())
        .collect();
    order.extend(
        dest_names
            .iter()
            .enumerate()
            .filter(|(_, name)| !source_modified.contains_key(name.as_str()))
            .map(|(i, _)| i),
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(rebuilt.len())));
    for i in order {
        let entry = dest.by_index_raw(i)?;
        let modified = source_modified
            .get(entry.name())
            .copied()
            .flatten()
            .or_else(|| entry.last_modified());
        match modified {
            Some(modified) => {
                let mode = entry.unix_mode();
                writer.raw_copy_file_touch(entry, modified, mode)?
            }
            None => writer.raw_copy_file(entry)?,
        }
    }
    let mut normalized = writer.finish()?.into_inner();

    let attributes: HashMap<Vec<u8>, Attributes> = central_directory(reference)?
        .into_iter()
        .map(|(_, name, attrs)| (name, attrs))
        .collect();
    for (offset, name, _) in central_directory(&normalized)? {
        if let Some(attrs) = attributes.get(&name) {
            set_attributes(&mut normalized, offset, *attrs);
        }
    }
    Ok(normalized)
}

fn entry_names<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index_raw(i)?.name().to_string());
    }
    Ok(names)
}

/// Offset, raw name and attributes of every central directory header.
pub(crate) fn central_directory(archive: &[u8]) -> Result<Vec<(usize, Vec<u8>, Attributes)>> {
    let eocd = find_end_of_central(archive)?;
    let count = read_u16(archive, eocd + 10)? as usize;
    let start = read_u32(archive, eocd + 16)?;
    if count == 0xFFFF || start == 0xFFFF_FFFF {
        return Err(ProvError::Unsupported("zip64 archives".into()));
    }

    let mut entries = Vec::with_capacity(count);
    let mut offset = start as usize;
    for _ in 0..count {
        if read_u32(archive, offset)? != CENTRAL_HEADER_SIG {
            return Err(malformed("bad central directory header"));
        }
        let name_len = read_u16(archive, offset + 28)? as usize;
        let extra_len = read_u16(archive, offset + 30)? as usize;
        let comment_len = read_u16(archive, offset + 32)? as usize;
        let name_start = offset + CENTRAL_HEADER_LEN;
        let name = archive
            .get(name_start..name_start + name_len)
            .ok_or_else(|| malformed("truncated entry name"))?
            .to_vec();
        let attrs = Attributes {
            host: archive[offset + 5],
            external: read_u32(archive, offset + 38)?,
        };
        entries.push((offset, name, attrs));
        offset = name_start + name_len + extra_len + comment_len;
    }
    Ok(entries)
}

fn set_attributes(archive: &mut [u8], offset: usize, attrs: Attributes) {
    archive[offset + 5] = attrs.host;
    archive[offset + 38..offset + 42].copy_from_slice(&attrs.external.to_le_bytes());
}

fn find_end_of_central(archive: &[u8]) -> Result<usize> {
    let last = archive
        .len()
        .checked_sub(END_OF_CENTRAL_LEN)
        .ok_or_else(|| malformed("archive too short"))?;
    let first = last.saturating_sub(u16::MAX as usize);
    (first..=last)
        .rev()
        .find(|&i| read_u32(archive, i).ok() == Some(END_OF_CENTRAL_SIG))
        .ok_or_else(|| malformed("no end of central directory record"))
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| malformed("truncated central directory"))
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| malformed("truncated central directory"))
}

fn malformed(message: &str) -> ProvError {
    ProvError::Parse {
        file: "zip central directory".into(),
        message: message.to_string(),
    }
}
