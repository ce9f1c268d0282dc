// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Minimal page writer on top of lopdf
//!
//! Positions are given in millimetres from the top-left corner of an A4
//! portrait page, the way the report layout is described.

use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;

use super::font::{Glyph, TrueTypeFont};
use crate::Result;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
const PT_PER_MM: f32 = 72.0 / 25.4;
const FONT_RESOURCE: &[u8] = b"F1";

/// RGB colour, components in 0-1
pub type Rgb = [f32; 3];

pub fn mm(v: f32) -> f32 {
    v * PT_PER_MM
}

fn real(v: f32) -> Object {
    Object::Real(v.into())
}

/// Accumulates pages of drawing operations and writes them out as a PDF
pub struct PdfWriter<'f> {
    font: &'f TrueTypeFont,
    doc: Document,
    pages: Vec<Vec<Operation>>,
    images: Vec<(String, ObjectId)>,
    used_glyphs: BTreeMap<u16, Glyph>,
}

impl<'f> PdfWriter<'f> {
    pub fn new(font: &'f TrueTypeFont) -> Self {
        Self {
            font,
            doc: Document::with_version("1.5"),
            pages: Vec::new(),
            images: Vec::new(),
            used_glyphs: BTreeMap::new(),
        }
    }

    pub fn add_page(&mut self) {
        self.pages.push(Vec::new());
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.add_page();
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Width of `text` at `size` points, in millimetres
    pub fn text_width(&self, text: &str, size: f32) -> Result<f32> {
        Ok(self.font.text_width(text, size)? / PT_PER_MM)
    }

    /// Set one line of text with its baseline at `baseline` mm from the top
    pub fn text(&mut self, x: f32, baseline: f32, size: f32, color: Rgb, text: &str) -> Result<()> {
        let glyphs = self.font.glyphs(text)?;
        let mut encoded = Vec::with_capacity(glyphs.len() * 2);
        for glyph in glyphs {
            encoded.extend_from_slice(&glyph.id.to_be_bytes());
            self.used_glyphs.entry(glyph.id).or_insert(glyph);
        }

        let ops = self.ops();
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec![Object::Name(FONT_RESOURCE.to_vec()), real(size)]));
        ops.push(Operation::new("rg", color.iter().map(|&c| real(c)).collect()));
        ops.push(Operation::new("Td", vec![real(mm(x)), real(mm(PAGE_HEIGHT_MM - baseline))]));
        ops.push(Operation::new("Tj", vec![Object::String(encoded, StringFormat::Hexadecimal)]));
        ops.push(Operation::new("ET", vec![]));
        Ok(())
    }

    /// Stroke a rectangle outline
    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, stroke: Rgb, line_width: f32) {
        let ops = self.ops();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("w", vec![real(mm(line_width))]));
        ops.push(Operation::new("RG", stroke.iter().map(|&c| real(c)).collect()));
        ops.push(Operation::new(
            "re",
            vec![real(mm(x)), real(mm(PAGE_HEIGHT_MM - y - h)), real(mm(w)), real(mm(h))],
        ));
        ops.push(Operation::new("S", vec![]));
        ops.push(Operation::new("Q", vec![]));
    }

    /// Draw an image into the given box, scaled to fit and centred
    pub fn image(&mut self, img: &DynamicImage, x: f32, y: f32, w: f32, h: f32) -> Result<()> {
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let (px_w, px_h) = (rgb.width(), rgb.height());
        if px_w == 0 || px_h == 0 {
            return Ok(());
        }

        let mut jpeg = Vec::new();
        rgb.write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)?;

        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(px_w as i64),
                "Height" => Object::Integer(px_h as i64),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
        .with_compression(false);
        let id = self.doc.add_object(stream);
        let name = format!("Im{}", self.images.len());
        self.images.push((name.clone(), id));

        let scale = (w / px_w as f32).min(h / px_h as f32);
        let (draw_w, draw_h) = (px_w as f32 * scale, px_h as f32 * scale);
        let left = x + (w - draw_w) / 2.0;
        let top = y + (h - draw_h) / 2.0;

        let ops = self.ops();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                real(mm(draw_w)),
                real(0.0),
                real(0.0),
                real(mm(draw_h)),
                real(mm(left)),
                real(mm(PAGE_HEIGHT_MM - top - draw_h)),
            ],
        ));
        ops.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        ops.push(Operation::new("Q", vec![]));
        Ok(())
    }

    /// Write fonts, images and pages and serialize the document
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.pages.is_empty() {
            self.add_page();
        }

        let font_id = self.embed_font()?;
        let pages_id = self.doc.new_object_id();

        let mut xobjects = Dictionary::new();
        for (name, id) in &self.images {
            xobjects.set(name.as_bytes().to_vec(), Object::Reference(*id));
        }
        let resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => xobjects,
        };

        let pages = std::mem::take(&mut self.pages);
        let mut kids = Vec::with_capacity(pages.len());
        for operations in pages {
            let content = Content { operations };
            let content_id = self.doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        self.doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(count),
                "Resources" => resources,
                "MediaBox" => vec![real(0.0), real(0.0), real(mm(PAGE_WIDTH_MM)), real(mm(PAGE_HEIGHT_MM))],
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut out = Vec::new();
        self.doc.save_to(&mut out)?;
        Ok(out)
    }

    // Type0 font with Identity-H encoding: content strings carry raw glyph ids
    fn embed_font(&mut self) -> Result<ObjectId> {
        let font = self.font;
        let name = Object::Name(font.name().as_bytes().to_vec());

        let program = font.subset(self.used_glyphs.keys().copied())?;
        let font_file = self.doc.add_object(Stream::new(
            dictionary! { "Length1" => Object::Integer(program.len() as i64) },
            program,
        ));

        let descriptor = self.doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => name.clone(),
            "Flags" => Object::Integer(32),
            "FontBBox" => font.bbox.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>(),
            "ItalicAngle" => Object::Integer(0),
            "Ascent" => Object::Integer(font.ascent),
            "Descent" => Object::Integer(font.descent),
            "CapHeight" => Object::Integer(font.cap_height),
            "StemV" => Object::Integer(80),
            "FontFile2" => font_file,
        });

        let mut widths = Vec::with_capacity(self.used_glyphs.len() * 2);
        for glyph in self.used_glyphs.values() {
            widths.push(Object::Integer(glyph.id as i64));
            widths.push(Object::Array(vec![Object::Integer(glyph.width as i64)]));
        }

        let cid_font = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => name.clone(),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => Object::Integer(0),
            },
            "FontDescriptor" => descriptor,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let cmap = self.to_unicode_cmap();
        let to_unicode = self.doc.add_object(Stream::new(dictionary! {}, cmap));

        Ok(self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => name,
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font)],
            "ToUnicode" => to_unicode,
        }))
    }

    fn to_unicode_cmap(&self) -> Vec<u8> {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
        );

        // bfchar blocks are limited to 100 entries each
        let glyphs: Vec<&Glyph> = self.used_glyphs.values().filter(|g| g.id != 0).collect();
        for chunk in glyphs.chunks(100) {
            cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
            for glyph in chunk {
                let mut units = [0u16; 2];
                let utf16: String = glyph
                    .ch
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|u| format!("{:04X}", u))
                    .collect();
                cmap.push_str(&format!("<{:04X}> <{}>\n", glyph.id, utf16));
            }
            cmap.push_str("endbfchar\n");
        }

        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMap defineresource pop\n\
             end\n\
             end\n",
        );
        cmap.into_bytes()
    }
}
