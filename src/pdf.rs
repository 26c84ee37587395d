use crate::canvas::{Document, Element, ElementKind, Page};
use crate::font::{FIRST_CHAR, FaceProgram, FontSet, LAST_CHAR, LoadedFace, encode_winansi};
use crate::signature::EmbeddedImage;
use crate::types::{Color, Pt};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::io::{self, Write};

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const RESOURCES_ID: usize = 3;
const INFO_ID: usize = 4;
const PRODUCER: &str = "consent-pdf";

/// Serializes a laid out document. Output depends only on the document and
/// the font set, never on the clock or the environment.
pub fn write_document(document: &Document, fonts: &FontSet) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    write_document_to(document, fonts, &mut out)?;
    Ok(out)
}

/// Builds the whole file in memory, then writes it to `writer` in one call.
/// Returns the number of bytes written.
pub fn write_document_to<W: Write>(
    document: &Document,
    fonts: &FontSet,
    writer: &mut W,
) -> io::Result<usize> {
    let mut objects: Vec<String> = vec![String::new(); INFO_ID];

    let mut font_refs = Vec::new();
    for face in fonts.faces() {
        let id = push_font_objects(&mut objects, face);
        font_refs.push((face.id.resource_name(), id));
    }

    let mut image_refs = Vec::new();
    for image in document.images.values() {
        let smask_id = image.alpha_flate.as_ref().map(|alpha| {
            objects.push(image_smask_object(image, alpha));
            objects.len()
        });
        objects.push(image_object(image, smask_id));
        image_refs.push((image.resource_id.as_str(), objects.len()));
    }

    let mut digest_input = String::new();
    let mut kids = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        let content = page_content(page, document.page_size.height, fonts);
        digest_input.push_str(&content);
        objects.push(stream_object(&content));
        let content_id = objects.len();
        objects.push(format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
            PAGES_ID,
            fmt_pt(document.page_size.width),
            fmt_pt(document.page_size.height),
            RESOURCES_ID,
            content_id
        ));
        kids.push(format!("{} 0 R", objects.len()));
    }

    objects[CATALOG_ID - 1] = format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES_ID);
    objects[PAGES_ID - 1] = format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        kids.len()
    );
    objects[RESOURCES_ID - 1] = resources_object(&font_refs, &image_refs);
    objects[INFO_ID - 1] = info_object(document);

    digest_input.push_str(&objects[INFO_ID - 1]);
    let bytes = build_pdf(&objects, &file_id(&digest_input));
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// First 16 bytes of the SHA-256 of the page content and metadata, as hex.
fn file_id(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest[..16].iter().map(|byte| format!("{:02X}", byte)).collect()
}

fn build_pdf(objects: &[String], file_id: &str) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n");
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        out.extend_from_slice(obj.as_bytes());
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R /ID [<{}> <{}>] >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            CATALOG_ID,
            INFO_ID,
            file_id,
            file_id,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn page_content(page: &Page, page_height: Pt, fonts: &FontSet) -> String {
    let mut out = String::new();
    for element in page.elements.iter().chain(page.furniture.iter()) {
        draw_element(&mut out, element, page_height, fonts);
    }
    out
}

fn draw_element(out: &mut String, element: &Element, page_height: Pt, fonts: &FontSet) {
    let rect = element.rect;
    match &element.kind {
        ElementKind::TextRun {
            text,
            face,
            size,
            color,
        } => {
            if text.is_empty() {
                return;
            }
            let loaded = fonts.face(*face);
            let baseline = rect.y + loaded.baseline_offset(*size, rect.height);
            let _ = write!(
                out,
                "BT\n/{} {} Tf\n{} rg\n1 0 0 1 {} {} Tm\n({}) Tj\nET\n",
                face.resource_name(),
                fmt_pt(*size),
                color_operands(*color),
                fmt_pt(rect.x),
                fmt_pt(page_height - baseline),
                encode_pdf_text(text)
            );
        }
        ElementKind::Image { resource_id } => {
            let _ = write!(
                out,
                "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
                fmt_pt(rect.width),
                fmt_pt(rect.height),
                fmt_pt(rect.x),
                fmt_pt(page_height - rect.bottom()),
                resource_id
            );
        }
        ElementKind::Rule { thickness, color } => {
            let y = page_height - rect.y - rect.height / 2;
            let _ = write!(
                out,
                "q\n{} w\n{} RG\n{} {} m\n{} {} l\nS\nQ\n",
                fmt_pt(*thickness),
                color_operands(*color),
                fmt_pt(rect.x),
                fmt_pt(y),
                fmt_pt(rect.x + rect.width),
                fmt_pt(y)
            );
        }
    }
}

fn color_operands(color: Color) -> String {
    format!(
        "{} {} {}",
        fmt(clamp_unit(color.r)),
        fmt(clamp_unit(color.g)),
        fmt(clamp_unit(color.b))
    )
}

/// WinAnsi bytes as a literal string body. Non-ASCII bytes are written as
/// octal escapes so content streams stay 7-bit.
fn encode_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in encode_winansi(text) {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if !(0x20..0x7f).contains(&b) => {
                let _ = write!(out, "\\{:03o}", b);
            }
            b => out.push(b as char),
        }
    }
    out
}

fn push_font_objects(objects: &mut Vec<String>, face: &LoadedFace) -> usize {
    match &face.program {
        FaceProgram::Standard => {
            objects.push(format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                face.base_font
            ));
        }
        FaceProgram::TrueType { data } => {
            objects.push(font_file_object(data));
            let file_id = objects.len();
            objects.push(font_descriptor_object(face, file_id));
            let descriptor_id = objects.len();
            objects.push(truetype_font_object(face, descriptor_id));
        }
    }
    objects.len()
}

fn truetype_font_object(face: &LoadedFace, descriptor_id: usize) -> String {
    let widths = face
        .widths
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "<< /Type /Font /Subtype /TrueType /BaseFont /{} /FirstChar {} /LastChar {} /Widths [{}] /FontDescriptor {} 0 R /Encoding /WinAnsiEncoding >>",
        face.base_font, FIRST_CHAR, LAST_CHAR, widths, descriptor_id
    )
}

fn font_descriptor_object(face: &LoadedFace, font_file_id: usize) -> String {
    // Nonsymbolic, plus FixedPitch when the face is monospaced.
    let mut flags = 32;
    if face.is_fixed_pitch {
        flags |= 1;
    }
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV 80 /MissingWidth {} /FontFile2 {} 0 R >>",
        face.base_font,
        flags,
        face.bbox.0,
        face.bbox.1,
        face.bbox.2,
        face.bbox.3,
        face.italic_angle,
        face.ascent,
        face.descent,
        face.cap_height,
        face.missing_width,
        font_file_id
    )
}

fn font_file_object(data: &[u8]) -> String {
    let stream_data = encode_stream_data(data);
    format!(
        "<< /Length {} /Length1 {} /Filter /ASCIIHexDecode >>\nstream\n{}\nendstream",
        stream_data.len(),
        data.len(),
        stream_data
    )
}

fn image_object(image: &EmbeddedImage, smask_id: Option<usize>) -> String {
    let stream_data = encode_stream_data(&image.rgb_flate);
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode /FlateDecode]{} >>\nstream\n{}\nendstream",
        image.pixel_width,
        image.pixel_height,
        stream_data.len(),
        smask,
        stream_data
    )
}

fn image_smask_object(image: &EmbeddedImage, alpha: &[u8]) -> String {
    let stream_data = encode_stream_data(alpha);
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode /FlateDecode] >>\nstream\n{}\nendstream",
        image.pixel_width,
        image.pixel_height,
        stream_data.len(),
        stream_data
    )
}

fn encode_stream_data(data: &[u8]) -> String {
    let mut hex = ascii_hex_encode(data);
    hex.push('>');
    hex
}

fn ascii_hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32);
    for (index, byte) in data.iter().enumerate() {
        let _ = write!(&mut out, "{:02X}", byte);
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

fn resources_object(fonts: &[(&str, usize)], images: &[(&str, usize)]) -> String {
    let font_entries = fonts
        .iter()
        .map(|(name, id)| format!("/{} {} 0 R", name, id))
        .collect::<Vec<_>>()
        .join(" ");
    let mut dict = format!("<< /Font << {} >>", font_entries);
    if !images.is_empty() {
        let image_entries = images
            .iter()
            .map(|(name, id)| format!("/{} {} 0 R", name, id))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = write!(dict, " /XObject << {} >>", image_entries);
    }
    dict.push_str(" /ProcSet [/PDF /Text /ImageC] >>");
    dict
}

fn info_object(document: &Document) -> String {
    let info = &document.info;
    let mut entries = vec![format!("/Producer ({})", PRODUCER)];
    if !info.title.is_empty() {
        entries.push(format!("/Title ({})", encode_pdf_text(&info.title)));
    }
    if !info.subject.is_empty() {
        entries.push(format!("/Subject ({})", encode_pdf_text(&info.subject)));
    }
    if let Some(date) = &info.creation_date {
        entries.push(format!("/CreationDate ({})", encode_pdf_text(date)));
    }
    format!("<< {} >>", entries.join(" "))
}

fn stream_object(content: &str) -> String {
    let length = content.len();
    format!("<< /Length {} >>\nstream\n{}\nendstream", length, content)
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    format_milli((value as f64 * 1000.0).round() as i64)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        return format!("{}{}", sign, int_part);
    }
    let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
    while s.ends_with('0') {
        s.pop();
    }
    s
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.milli())
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::DocumentInfo;
    use crate::font::{FaceId, FontSource};
    use crate::signature::{ImageEmbedder, SignatureOutcome};
    use crate::types::{Rect, Size};
    use std::collections::BTreeMap;

    fn text_element(text: &str, y: i32) -> Element {
        Element {
            rect: Rect {
                x: Pt::from_i32(72),
                y: Pt::from_i32(y),
                width: Pt::from_i32(400),
                height: Pt::from_i32(14),
            },
            kind: ElementKind::text(text, FaceId::Regular, Pt::from_i32(11)),
        }
    }

    fn document(pages: Vec<Page>) -> Document {
        Document {
            page_size: Size::a4(),
            pages,
            images: BTreeMap::new(),
            info: DocumentInfo {
                title: "Consentimiento informado".to_string(),
                subject: "Caminos del Ser".to_string(),
                creation_date: Some("D:20260302150405-05'00'".to_string()),
            },
        }
    }

    fn page(index: usize, texts: &[&str]) -> Page {
        let mut page = Page::new(index);
        for (i, text) in texts.iter().enumerate() {
            page.elements.push(text_element(text, 72 + 14 * i as i32));
        }
        page
    }

    fn page_text(doc: &lopdf::Document, number: u32) -> String {
        let pages = doc.get_pages();
        let id = pages[&number];
        String::from_utf8_lossy(&doc.get_page_content(id).expect("content")).into_owned()
    }

    #[test]
    fn writes_a_parseable_multi_page_pdf() {
        let doc = document(vec![page(0, &["Hola (mundo)"]), page(1, &["Año"])]);
        let bytes = write_document(&doc, &FontSet::standard()).expect("pdf");
        assert!(bytes.starts_with(b"%PDF-1.7"));

        let parsed = lopdf::Document::load_mem(&bytes).expect("lopdf parse");
        assert_eq!(parsed.get_pages().len(), 2);
        assert!(page_text(&parsed, 1).contains("(Hola \\(mundo\\)) Tj"));
        assert!(page_text(&parsed, 2).contains("(A\\361o) Tj"));
        assert!(parsed.trailer.get(b"ID").is_ok());
    }

    #[test]
    fn output_is_deterministic_and_content_addressed() {
        let fonts = FontSet::standard();
        let a = write_document(&document(vec![page(0, &["uno"])]), &fonts).unwrap();
        let b = write_document(&document(vec![page(0, &["uno"])]), &fonts).unwrap();
        let c = write_document(&document(vec![page(0, &["dos"])]), &fonts).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn text_is_drawn_on_the_baseline_in_bottom_up_space() {
        let fonts = FontSet::standard();
        let mut out = String::new();
        draw_element(&mut out, &text_element("x", 100), Pt::from_i32(800), &fonts);
        let face = fonts.face(FaceId::Regular);
        let baseline = Pt::from_i32(100) + face.baseline_offset(Pt::from_i32(11), Pt::from_i32(14));
        let expected = format!("1 0 0 1 72 {} Tm", fmt_pt(Pt::from_i32(800) - baseline));
        assert!(out.contains(&expected), "{out}");
        assert!(out.contains("/F1 11 Tf"));
    }

    #[test]
    fn embeds_signature_with_soft_mask() {
        let uri = crate::signature::tests::png_data_uri(30, 10, true);
        let SignatureOutcome::Embedded(image) =
            ImageEmbedder.embed(&uri, Pt::from_i32(150), Pt::from_i32(60))
        else {
            panic!("expected embedded signature");
        };
        let mut first = page(0, &["Firma"]);
        first.elements.push(Element {
            rect: Rect {
                x: Pt::from_i32(72),
                y: Pt::from_i32(120),
                width: image.width,
                height: image.height,
            },
            kind: ElementKind::Image {
                resource_id: image.resource_id.clone(),
            },
        });
        let mut doc = document(vec![first]);
        doc.images.insert(image.resource_id.clone(), image);

        let bytes = write_document(&doc, &FontSet::standard()).unwrap();
        let parsed = lopdf::Document::load_mem(&bytes).expect("lopdf parse");
        assert!(page_text(&parsed, 1).contains("/ImSig Do"));
        let smasks = parsed
            .objects
            .values()
            .filter_map(|object| object.as_stream().ok())
            .filter(|stream| stream.dict.get(b"SMask").is_ok())
            .count();
        assert_eq!(smasks, 1);
    }

    #[test]
    fn embeds_truetype_program_with_descriptor() {
        let path = crate::font::tests::mono_font_path();
        let font_len = std::fs::metadata(&path).expect("font fixture").len() as i64;
        let fonts = FontSet::load(&FontSource::TrueTypeFile(path), &FontSource::Standard)
            .expect("truetype font");
        let bytes = write_document(&document(vec![page(0, &["Año"])]), &fonts).unwrap();
        let parsed = lopdf::Document::load_mem(&bytes).expect("lopdf parse");

        let dicts: Vec<&lopdf::Dictionary> = parsed
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .collect();
        let truetype = dicts
            .iter()
            .find(|dict| matches!(dict.get(b"Subtype").and_then(|v| v.as_name()), Ok(name) if name == b"TrueType"))
            .expect("TrueType font dictionary");
        assert!(matches!(
            truetype.get(b"BaseFont").and_then(|v| v.as_name()),
            Ok(name) if name == b"DejaVuSansMono"
        ));
        assert_eq!(
            truetype.get(b"Widths").and_then(|v| v.as_array()).map(Vec::len).ok(),
            Some(224)
        );

        let descriptor_id = truetype
            .get(b"FontDescriptor")
            .and_then(|v| v.as_reference())
            .expect("descriptor ref");
        let descriptor = parsed
            .get_object(descriptor_id)
            .and_then(|v| v.as_dict())
            .expect("descriptor");
        let file_id = descriptor
            .get(b"FontFile2")
            .and_then(|v| v.as_reference())
            .expect("FontFile2 ref");
        let program = parsed
            .get_object(file_id)
            .and_then(|v| v.as_stream())
            .expect("font program");
        assert_eq!(
            program.dict.get(b"Length1").and_then(|v| v.as_i64()).ok(),
            Some(font_len)
        );

        // Bold stays a base-14 face.
        assert!(dicts.iter().any(|dict| matches!(
            dict.get(b"BaseFont").and_then(|v| v.as_name()),
            Ok(name) if name == b"Helvetica-Bold"
        )));
        assert!(page_text(&parsed, 1).contains("(A\\361o) Tj"));
    }

    #[test]
    fn formats_numbers_without_trailing_zeros() {
        assert_eq!(format_milli(12_500), "12.5");
        assert_eq!(format_milli(-3_000), "-3");
        assert_eq!(format_milli(7), "0.007");
        assert_eq!(fmt(0.1), "0.1");
    }
}
