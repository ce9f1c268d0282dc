// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! TrueType font loading and glyph mapping for embedded report text

use std::path::Path;
use ttf_parser::Face;

use crate::{LeafscanError, Result};

/// A glyph as it will be written into a content stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub id: u16,
    /// Advance width in 1/1000 text-space units
    pub width: u16,
    pub ch: char,
}

/// A TrueType font file plus the metrics the PDF font descriptor needs.
/// All metrics are scaled to 1000 units per em.
pub struct TrueTypeFont {
    data: Vec<u8>,
    name: String,
    pub ascent: i64,
    pub descent: i64,
    pub cap_height: i64,
    pub bbox: [i64; 4],
}

impl TrueTypeFont {
    /// Load a font from disk. A missing file is reported as [`LeafscanError::FontNotFound`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(LeafscanError::FontNotFound(path.display().to_string()));
        }
        let data = std::fs::read(path)?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        Self::from_bytes(data, stem)
    }

    pub fn from_bytes(data: Vec<u8>, name: &str) -> Result<Self> {
        let (ascent, descent, cap_height, bbox) = {
            let face = parse(&data)?;
            let per_em = face.units_per_em() as i64;
            let scale = |v: i16| v as i64 * 1000 / per_em;
            let rect = face.global_bounding_box();
            (
                scale(face.ascender()),
                scale(face.descender()),
                scale(face.capital_height().unwrap_or(face.ascender())),
                [scale(rect.x_min), scale(rect.y_min), scale(rect.x_max), scale(rect.y_max)],
            )
        };

        Ok(Self {
            data,
            name: postscript_name(name),
            ascent,
            descent,
            cap_height,
            bbox,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map text to glyphs. Characters the font lacks map to glyph 0.
    pub fn glyphs(&self, text: &str) -> Result<Vec<Glyph>> {
        let face = parse(&self.data)?;
        let per_em = face.units_per_em() as u32;

        Ok(text
            .chars()
            .map(|ch| {
                let gid = face.glyph_index(ch).unwrap_or(ttf_parser::GlyphId(0));
                let advance = face.glyph_hor_advance(gid).unwrap_or(0) as u32;
                Glyph {
                    id: gid.0,
                    width: (advance * 1000 / per_em) as u16,
                    ch,
                }
            })
            .collect())
    }

    /// A copy of the font whose `glyf` table only holds the given glyphs and
    /// the components they reference. Glyph ids are unchanged, so the subset
    /// still works with an identity CID-to-GID map. Fonts without TrueType
    /// outlines are returned whole.
    pub fn subset(&self, glyph_ids: impl IntoIterator<Item = u16>) -> Result<Vec<u8>> {
        let data = self.data.as_slice();
        let tables = table_directory(data)?;
        let find = |tag: &[u8; 4]| find_table(data, &tables, tag);

        let (Some(glyf), Some(loca), Some(head), Some(maxp)) =
            (find(b"glyf")?, find(b"loca")?, find(b"head")?, find(b"maxp")?)
        else {
            return Ok(self.data.clone());
        };

        let num_glyphs = read_u16(maxp, 4)? as usize;
        let long_loca = read_u16(head, 50)? != 0;
        let offsets = (0..=num_glyphs)
            .map(|i| {
                if long_loca {
                    read_u32(loca, i * 4).map(|v| v as usize)
                } else {
                    read_u16(loca, i * 2).map(|v| v as usize * 2)
                }
            })
            .collect::<Result<Vec<usize>>>()?;
        let glyph = |gid: usize| glyf.get(offsets[gid]..offsets[gid + 1]).ok_or_else(malformed);

        // Glyph 0 is .notdef and must always be present
        let mut keep = vec![false; num_glyphs];
        let mut pending: Vec<usize> = std::iter::once(0)
            .chain(glyph_ids.into_iter().map(usize::from))
            .collect();
        while let Some(gid) = pending.pop() {
            if gid >= num_glyphs || keep[gid] {
                continue;
            }
            keep[gid] = true;
            pending.extend(composite_components(glyph(gid)?)?);
        }

        let mut new_glyf = Vec::new();
        let mut new_loca = Vec::with_capacity((num_glyphs + 1) * 4);
        for (gid, kept) in keep.iter().enumerate() {
            new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());
            if *kept {
                new_glyf.extend_from_slice(glyph(gid)?);
                pad4(&mut new_glyf);
            }
        }
        new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());

        let mut new_head = head.to_vec();
        if new_head.len() < 54 {
            return Err(malformed());
        }
        new_head[8..12].fill(0);
        new_head[50..52].copy_from_slice(&1u16.to_be_bytes());

        let mut out = Vec::with_capacity(SUBSET_TABLES.len());
        for tag in SUBSET_TABLES {
            let table = match tag {
                b"glyf" => std::mem::take(&mut new_glyf),
                b"loca" => std::mem::take(&mut new_loca),
                b"head" => std::mem::take(&mut new_head),
                _ => match find(tag)? {
                    Some(t) => t.to_vec(),
                    None => continue,
                },
            };
            out.push((*tag, table));
        }
        Ok(write_font(&out))
    }

    /// Width of `text` set at `size` points, in points
    pub fn text_width(&self, text: &str, size: f32) -> Result<f32> {
        let units: u32 = self.glyphs(text)?.iter().map(|g| g.width as u32).sum();
        Ok(units as f32 * size / 1000.0)
    }
}

fn parse(data: &[u8]) -> Result<Face<'_>> {
    Face::parse(data, 0).map_err(|e| LeafscanError::Report(format!("Invalid font: {}", e)))
}

// Tables a PDF viewer needs from an embedded TrueType font, in tag order
const SUBSET_TABLES: [&[u8; 4]; 13] = [
    b"OS/2", b"cmap", b"cvt ", b"fpgm", b"glyf", b"head", b"hhea", b"hmtx", b"loca", b"maxp",
    b"name", b"post", b"prep",
];

// Composite glyph flags
const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

struct TableRecord {
    tag: [u8; 4],
    offset: usize,
    length: usize,
}

fn malformed() -> LeafscanError {
    LeafscanError::Report("Malformed font tables".to_string())
}

fn read_u16(data: &[u8], at: usize) -> Result<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(malformed)
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(malformed)
}

fn table_directory(data: &[u8]) -> Result<Vec<TableRecord>> {
    let num_tables = read_u16(data, 4)? as usize;
    (0..num_tables)
        .map(|i| {
            let at = 12 + i * 16;
            let tag = data.get(at..at + 4).ok_or_else(malformed)?;
            Ok(TableRecord {
                tag: [tag[0], tag[1], tag[2], tag[3]],
                offset: read_u32(data, at + 8)? as usize,
                length: read_u32(data, at + 12)? as usize,
            })
        })
        .collect()
}

fn find_table<'a>(data: &'a [u8], tables: &[TableRecord], tag: &[u8; 4]) -> Result<Option<&'a [u8]>> {
    match tables.iter().find(|t| &t.tag == tag) {
        Some(t) => data.get(t.offset..t.offset + t.length).map(Some).ok_or_else(malformed),
        None => Ok(None),
    }
}

/// Glyph ids referenced by a composite glyph; empty for simple glyphs
fn composite_components(glyph: &[u8]) -> Result<Vec<usize>> {
    if glyph.len() < 10 || (read_u16(glyph, 0)? as i16) >= 0 {
        return Ok(Vec::new());
    }

    let mut components = Vec::new();
    let mut at = 10;
    loop {
        let flags = read_u16(glyph, at)?;
        components.push(read_u16(glyph, at + 2)? as usize);
        at += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 8 } else { 6 };
        at += if flags & WE_HAVE_A_SCALE != 0 {
            2
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            4
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            8
        } else {
            0
        };
        if flags & MORE_COMPONENTS == 0 {
            return Ok(components);
        }
    }
}

fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Serialize an sfnt from tables already sorted by tag
fn write_font(tables: &[([u8; 4], Vec<u8>)]) -> Vec<u8> {
    let count = tables.len() as u16;
    let entry_selector = 15 - count.leading_zeros() as u16;
    let search_range = (1u16 << entry_selector) * 16;

    let mut out = Vec::new();
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(&search_range.to_be_bytes());
    out.extend_from_slice(&entry_selector.to_be_bytes());
    out.extend_from_slice(&(count * 16 - search_range).to_be_bytes());

    let mut offset = 12 + tables.len() * 16;
    let mut head_offset = None;
    for (tag, table) in tables {
        out.extend_from_slice(tag);
        out.extend_from_slice(&checksum(table).to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(table.len() as u32).to_be_bytes());
        if tag == b"head" {
            head_offset = Some(offset);
        }
        offset += (table.len() + 3) & !3;
    }
    for (_, table) in tables {
        out.extend_from_slice(table);
        pad4(&mut out);
    }

    if let Some(at) = head_offset {
        let adjustment = 0xB1B0_AFBAu32.wrapping_sub(checksum(&out));
        out[at + 8..at + 12].copy_from_slice(&adjustment.to_be_bytes());
    }
    out
}

fn postscript_name(stem: &str) -> String {
    let name: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if name.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        name
    }
}
