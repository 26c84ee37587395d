use crate::error::{ConsentPdfError, Result};
use crate::types::Pt;
use std::fmt;
use std::path::PathBuf;

/// Largest font size the template may request.
const MAX_FONT_SIZE_PT: i32 = 72;

/// One of the two faces the consent template is typeset with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FaceId {
    Regular,
    Bold,
}

impl FaceId {
    pub const ALL: [FaceId; 2] = [FaceId::Regular, FaceId::Bold];

    pub fn logical_name(self) -> &'static str {
        match self {
            FaceId::Regular => "regular",
            FaceId::Bold => "bold",
        }
    }

    pub(crate) fn resource_name(self) -> &'static str {
        match self {
            FaceId::Regular => "F1",
            FaceId::Bold => "F2",
        }
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.logical_name())
    }
}

/// Where a face comes from. `Standard` uses the PDF base-14 Helvetica family,
/// which needs no font program and is always available.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FontSource {
    #[default]
    Standard,
    TrueTypeFile(PathBuf),
    TrueTypeBytes { name: String, data: Vec<u8> },
}

#[derive(Debug)]
pub(crate) enum FaceProgram {
    Standard,
    TrueType { data: Vec<u8> },
}

/// A loaded face with advance widths indexed by WinAnsi code (32..=255) in
/// 1/1000 em units.
#[derive(Debug)]
pub(crate) struct LoadedFace {
    pub(crate) id: FaceId,
    pub(crate) base_font: String,
    pub(crate) program: FaceProgram,
    pub(crate) widths: Vec<u16>,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) line_gap: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

pub(crate) const FIRST_CHAR: u8 = 32;
pub(crate) const LAST_CHAR: u8 = 255;

/// The fixed, pre-loaded set of faces used for measuring and drawing text.
///
/// Loaded once when the renderer is built and shared read-only between
/// renders.
#[derive(Debug)]
pub struct FontSet {
    regular: LoadedFace,
    bold: LoadedFace,
}

impl FontSet {
    pub fn standard() -> Self {
        Self {
            regular: LoadedFace::helvetica(FaceId::Regular),
            bold: LoadedFace::helvetica(FaceId::Bold),
        }
    }

    pub fn load(regular: &FontSource, bold: &FontSource) -> Result<Self> {
        Ok(Self {
            regular: LoadedFace::load(FaceId::Regular, regular)?,
            bold: LoadedFace::load(FaceId::Bold, bold)?,
        })
    }

    /// Maps a face identifier used by the template onto a loaded face.
    /// Accepts the logical names and the faces' PostScript names.
    pub fn resolve(&self, face: &str) -> Result<FaceId> {
        let key = face.trim().to_ascii_lowercase();
        for loaded in [&self.regular, &self.bold] {
            if key == loaded.id.logical_name() || key == loaded.base_font.to_ascii_lowercase() {
                return Ok(loaded.id);
            }
        }
        Err(ConsentPdfError::Configuration(format!(
            "unsupported font face '{face}' (expected one of: regular, bold, {}, {})",
            self.regular.base_font, self.bold.base_font
        )))
    }

    /// Rendered width of `text` set in `face` at `size`.
    pub fn measure(&self, text: &str, face: &str, size: Pt) -> Result<Pt> {
        let id = self.resolve(face)?;
        validate_font_size(size)?;
        Ok(self.measure_face(id, text, size))
    }

    pub fn line_height(&self, face: &str, size: Pt) -> Result<Pt> {
        let id = self.resolve(face)?;
        validate_font_size(size)?;
        Ok(self.face(id).line_height(size))
    }

    pub(crate) fn measure_face(&self, id: FaceId, text: &str, size: Pt) -> Pt {
        self.face(id).measure(text, size)
    }

    pub(crate) fn face(&self, id: FaceId) -> &LoadedFace {
        match id {
            FaceId::Regular => &self.regular,
            FaceId::Bold => &self.bold,
        }
    }

    pub(crate) fn faces(&self) -> [&LoadedFace; 2] {
        [&self.regular, &self.bold]
    }
}

pub(crate) fn validate_font_size(size: Pt) -> Result<()> {
    if size <= Pt::ZERO || size > Pt::from_i32(MAX_FONT_SIZE_PT) {
        return Err(ConsentPdfError::Configuration(format!(
            "unsupported font size {}pt (expected 0 < size <= {MAX_FONT_SIZE_PT})",
            size.to_f32()
        )));
    }
    Ok(())
}

impl LoadedFace {
    fn helvetica(id: FaceId) -> Self {
        let (base_font, table, bbox) = match id {
            FaceId::Regular => ("Helvetica", &HELVETICA_WIDTHS, (-166, -225, 1000, 931)),
            FaceId::Bold => ("Helvetica-Bold", &HELVETICA_BOLD_WIDTHS, (-170, -228, 1003, 962)),
        };
        Self {
            id,
            base_font: base_font.to_string(),
            program: FaceProgram::Standard,
            widths: table.to_vec(),
            ascent: 718,
            descent: -207,
            line_gap: 0,
            cap_height: 718,
            italic_angle: 0,
            bbox,
            missing_width: 278,
            is_fixed_pitch: false,
        }
    }

    fn load(id: FaceId, source: &FontSource) -> Result<Self> {
        match source {
            FontSource::Standard => Ok(Self::helvetica(id)),
            FontSource::TrueTypeFile(path) => {
                let data = std::fs::read(path).map_err(|err| ConsentPdfError::font_file(path, err))?;
                let fallback = path
                    .file_stem()
                    .and_then(|v| v.to_str())
                    .unwrap_or("EmbeddedFont")
                    .to_string();
                Self::from_truetype(id, data, &fallback)
                    .map_err(|err| ConsentPdfError::font_file(path, err))
            }
            FontSource::TrueTypeBytes { name, data } => Self::from_truetype(id, data.clone(), name)
                .map_err(|err| ConsentPdfError::resource_io(format!("font '{name}'"), err)),
        }
    }

    fn from_truetype(id: FaceId, data: Vec<u8>, fallback_name: &str) -> std::io::Result<Self> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("invalid font data: {err}"))
        })?;
        if face.tables().cff.is_some() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "CFF-flavoured OpenType fonts are not supported; use a TrueType outline font",
            ));
        }

        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let mut widths = Vec::with_capacity((LAST_CHAR - FIRST_CHAR) as usize + 1);
        for code in FIRST_CHAR..=LAST_CHAR {
            let advance = winansi_char(code)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|gid| face.glyph_hor_advance(gid))
                .unwrap_or(0);
            let scaled = (advance as f32 * scale).round() as i32;
            widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
        }
        let missing_width = widths.first().copied().unwrap_or(0);
        let ascent = scale_i16(face.ascender(), scale);
        let bbox = face.global_bounding_box();

        Ok(Self {
            id,
            base_font: postscript_name(&face).unwrap_or_else(|| sanitize_font_name(fallback_name)),
            widths,
            ascent,
            descent: scale_i16(face.descender(), scale),
            line_gap: scale_i16(face.line_gap(), scale),
            cap_height: face
                .capital_height()
                .map(|value| scale_i16(value, scale))
                .unwrap_or(ascent),
            italic_angle: face.italic_angle().map(|v| v.round() as i16).unwrap_or(0),
            bbox: (
                scale_i16(bbox.x_min, scale),
                scale_i16(bbox.y_min, scale),
                scale_i16(bbox.x_max, scale),
                scale_i16(bbox.y_max, scale),
            ),
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
            program: FaceProgram::TrueType { data },
        })
    }

    fn advance(&self, code: u8) -> u16 {
        if code < FIRST_CHAR {
            return 0;
        }
        self.widths
            .get((code - FIRST_CHAR) as usize)
            .copied()
            .unwrap_or(self.missing_width)
    }

    fn measure(&self, text: &str, size: Pt) -> Pt {
        let units: i64 = encode_winansi(text)
            .into_iter()
            .map(|code| i64::from(self.advance(code)))
            .sum();
        size.scale(units, 1000)
    }

    pub(crate) fn line_height(&self, size: Pt) -> Pt {
        let height_1000 = i64::from(self.ascent) - i64::from(self.descent) + i64::from(self.line_gap);
        if height_1000 <= 0 {
            return size;
        }
        size.scale(height_1000, 1000)
    }

    /// Distance from the top of a line box of `line_height` to the baseline.
    pub(crate) fn baseline_offset(&self, size: Pt, line_height: Pt) -> Pt {
        let glyph_height = size.scale(i64::from(self.ascent) - i64::from(self.descent), 1000);
        let half_leading = (line_height - glyph_height).max(Pt::ZERO) / 2;
        half_leading + size.scale(i64::from(self.ascent), 1000)
    }
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|entry| entry.name_id == ttf_parser::name::name_id::POST_SCRIPT_NAME)
        .find_map(|entry| entry.to_string())
        .map(|name| sanitize_font_name(&name))
        .filter(|name| !name.is_empty())
}

pub(crate) fn sanitize_font_name(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect()
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Encodes text as WinAnsi (cp1252) bytes. Characters outside the encoding
/// become `?`, both for measuring and drawing, so widths always match output.
pub(crate) fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| winansi_byte(ch).unwrap_or(b'?'))
        .collect()
}

pub(crate) fn winansi_byte(ch: char) -> Option<u8> {
    let byte = match ch {
        '\t' | '\n' | '\r' => b' ',
        '\u{0020}'..='\u{007E}' => ch as u8,
        '\u{00A0}'..='\u{00FF}' => ch as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

pub(crate) fn winansi_char(code: u8) -> Option<char> {
    let ch = match code {
        0x20..=0x7E | 0xA0..=0xFF => code as char,
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        _ => return None,
    };
    Some(ch)
}

// Advance widths of the standard Helvetica faces for WinAnsi codes 32..=255,
// taken from the Adobe core font metrics.
const HELVETICA_WIDTHS: [u16; 224] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 350,
    556, 350, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 350, 611, 350,
    350, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 350, 500, 667,
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

const HELVETICA_BOLD_WIDTHS: [u16; 224] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, 350,
    556, 350, 278, 556, 500, 1000, 556, 556, 333, 1000, 667, 333, 1000, 350, 611, 350,
    350, 278, 278, 500, 500, 350, 556, 1000, 333, 1000, 556, 333, 944, 350, 500, 667,
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278,
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556,
];
