use crate::types::Pt;
use base64::Engine;
use std::io::{Cursor, Write};

/// Drawn in place of the signature when the image cannot be used.
pub const SIGNATURE_FALLBACK_TEXT: &str = "[Firma no disponible]";

pub(crate) const SIGNATURE_RESOURCE_ID: &str = "ImSig";

/// Signatures whose PNG header declares more than this in either direction
/// are rejected before any pixel data is decoded.
const MAX_SIGNATURE_PIXELS: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is not a data URI")]
    MissingDataUriPrefix,
    #[error("signature data URI has MIME type '{0}', expected image/png")]
    UnsupportedMime(String),
    #[error("signature data URI is not base64 encoded")]
    NotBase64,
    #[error("signature payload is empty")]
    EmptyPayload,
    #[error("signature payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("signature bytes are not a PNG image")]
    NotPng,
    #[error("signature PNG could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("signature image is {width}x{height} pixels")]
    BadDimensions { width: u32, height: u32 },
    #[error("signature samples could not be compressed: {0}")]
    Compress(#[from] std::io::Error),
}

/// A signature ready to be written as an image XObject.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedImage {
    pub resource_id: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Drawn size after fitting into the signature box.
    pub width: Pt,
    pub height: Pt,
    /// Flate-compressed 8-bit RGB samples.
    pub rgb_flate: Vec<u8>,
    /// Flate-compressed 8-bit alpha samples, present only when some pixel is
    /// not fully opaque.
    pub alpha_flate: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureFallback {
    pub text: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignatureOutcome {
    Embedded(EmbeddedImage),
    Fallback(SignatureFallback),
}

impl SignatureOutcome {
    pub fn is_embedded(&self) -> bool {
        matches!(self, SignatureOutcome::Embedded(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageEmbedder;

impl ImageEmbedder {
    /// Never fails: anything that cannot be embedded becomes a fallback
    /// carrying the reason.
    pub fn embed(&self, data_uri: &str, target_width: Pt, target_height: Pt) -> SignatureOutcome {
        match decode_signature(data_uri, target_width, target_height) {
            Ok(image) => SignatureOutcome::Embedded(image),
            Err(err) => {
                log::warn!("signature not embedded, using placeholder: {err}");
                SignatureOutcome::Fallback(SignatureFallback {
                    text: SIGNATURE_FALLBACK_TEXT,
                    reason: err.to_string(),
                })
            }
        }
    }
}

fn decode_signature(
    data_uri: &str,
    target_width: Pt,
    target_height: Pt,
) -> Result<EmbeddedImage, SignatureError> {
    let bytes = parse_png_data_uri(data_uri)?;
    if !matches!(image::guess_format(&bytes), Ok(image::ImageFormat::Png)) {
        return Err(SignatureError::NotPng);
    }
    let (pixel_width, pixel_height) =
        image::ImageReader::with_format(Cursor::new(&bytes), image::ImageFormat::Png)
            .into_dimensions()?;
    if pixel_width == 0
        || pixel_height == 0
        || pixel_width > MAX_SIGNATURE_PIXELS
        || pixel_height > MAX_SIGNATURE_PIXELS
    {
        return Err(SignatureError::BadDimensions {
            width: pixel_width,
            height: pixel_height,
        });
    }

    let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)?;
    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity(pixel_width as usize * pixel_height as usize * 3);
    let mut alpha = Vec::with_capacity(pixel_width as usize * pixel_height as usize);
    let mut translucent = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        translucent |= a != 255;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let (width, height) = fit_within(pixel_width, pixel_height, target_width, target_height);
    Ok(EmbeddedImage {
        resource_id: SIGNATURE_RESOURCE_ID.to_string(),
        pixel_width,
        pixel_height,
        width,
        height,
        rgb_flate: flate_compress(&rgb)?,
        alpha_flate: translucent.then(|| flate_compress(&alpha)).transpose()?,
    })
}

fn parse_png_data_uri(data_uri: &str) -> Result<Vec<u8>, SignatureError> {
    let rest = data_uri
        .trim()
        .strip_prefix("data:")
        .ok_or(SignatureError::MissingDataUriPrefix)?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or(SignatureError::MissingDataUriPrefix)?;
    let mut params = header.split(';');
    let mime = params.next().unwrap_or_default().trim();
    if !mime.eq_ignore_ascii_case("image/png") {
        return Err(SignatureError::UnsupportedMime(mime.to_string()));
    }
    if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
        return Err(SignatureError::NotBase64);
    }

    // Canvas exports are sometimes line-wrapped in transit.
    let compact: String = payload
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(SignatureError::EmptyPayload);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(compact.as_bytes())?;
    if bytes.is_empty() {
        return Err(SignatureError::EmptyPayload);
    }
    Ok(bytes)
}

/// Largest size with the image's aspect ratio that fits the box.
fn fit_within(pixel_width: u32, pixel_height: u32, box_width: Pt, box_height: Pt) -> (Pt, Pt) {
    let box_w = box_width.to_f32() as f64;
    let box_h = box_height.to_f32() as f64;
    let scale = (box_w / pixel_width as f64).min(box_h / pixel_height as f64);
    (
        Pt::from_f32((pixel_width as f64 * scale) as f32).min(box_width),
        Pt::from_f32((pixel_height as f64 * scale) as f32).min(box_height),
    )
}

fn flate_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Read;

    pub(crate) fn png_data_uri(width: u32, height: u32, transparent_background: bool) -> String {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            if x == y % width {
                image::Rgba([0, 0, 128, 255])
            } else if transparent_background {
                image::Rgba([0, 0, 0, 0])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    fn embed(uri: &str) -> SignatureOutcome {
        ImageEmbedder.embed(uri, Pt::from_i32(200), Pt::from_i32(80))
    }

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        flate2::read::ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .expect("inflate");
        out
    }

    fn fallback_reason(outcome: SignatureOutcome) -> String {
        match outcome {
            SignatureOutcome::Fallback(fallback) => {
                assert_eq!(fallback.text, SIGNATURE_FALLBACK_TEXT);
                fallback.reason
            }
            SignatureOutcome::Embedded(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn embeds_png_with_alpha_mask() {
        let SignatureOutcome::Embedded(image) = embed(&png_data_uri(40, 10, true)) else {
            panic!("expected embedded signature");
        };
        assert_eq!((image.pixel_width, image.pixel_height), (40, 10));
        assert_eq!(inflate(&image.rgb_flate).len(), 40 * 10 * 3);
        let alpha = inflate(image.alpha_flate.as_deref().expect("alpha"));
        assert_eq!(alpha.len(), 400);
        assert!(alpha.contains(&0) && alpha.contains(&255));
    }

    #[test]
    fn opaque_png_has_no_mask() {
        let SignatureOutcome::Embedded(image) = embed(&png_data_uri(8, 8, false)) else {
            panic!("expected embedded signature");
        };
        assert!(image.alpha_flate.is_none());
    }

    #[test]
    fn fits_box_preserving_aspect_ratio() {
        // 40x10 into 200x80: width bound, scale 5.
        let SignatureOutcome::Embedded(wide) = embed(&png_data_uri(40, 10, true)) else {
            panic!("expected embedded signature");
        };
        assert_eq!(wide.width, Pt::from_i32(200));
        assert_eq!(wide.height, Pt::from_i32(50));

        // 10x20 into 200x80: height bound, scale 4.
        let SignatureOutcome::Embedded(tall) = embed(&png_data_uri(10, 20, true)) else {
            panic!("expected embedded signature");
        };
        assert_eq!(tall.width, Pt::from_i32(40));
        assert_eq!(tall.height, Pt::from_i32(80));
    }

    #[test]
    fn accepts_wrapped_base64_and_mime_case() {
        let uri = png_data_uri(6, 6, true);
        let (head, payload) = uri.split_once(',').unwrap();
        let wrapped: Vec<String> = payload
            .as_bytes()
            .chunks(16)
            .map(|chunk| String::from_utf8(chunk.to_vec()).unwrap())
            .collect();
        let uri = format!("{},{}", head.replace("image/png", "IMAGE/PNG"), wrapped.join("\n"));
        assert!(embed(&uri).is_embedded());
    }

    #[test]
    fn invalid_inputs_fall_back() {
        assert!(fallback_reason(embed("")).contains("not a data URI"));
        assert!(fallback_reason(embed("data:image/png;base64,!!!invalid!!!")).contains("base64"));
        assert!(fallback_reason(embed("data:image/png;base64,")).contains("empty"));
        assert!(fallback_reason(embed("data:image/jpeg;base64,AAAA")).contains("image/jpeg"));
        assert!(fallback_reason(embed("data:image/png,rawbytes")).contains("base64"));
        let not_png = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(b"GIF89a not a png")
        );
        assert!(fallback_reason(embed(&not_png)).contains("not a PNG"));
    }

    #[test]
    fn oversized_header_is_rejected_without_decoding() {
        let reason = fallback_reason(embed(&png_data_uri(5000, 1, false)));
        assert!(reason.contains("5000x1"), "{reason}");
    }

    #[test]
    fn compresses_samples_losslessly() {
        let samples: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        let packed = flate_compress(&samples).expect("compress");
        assert_eq!(inflate(&packed), samples);
    }

    #[test]
    fn truncated_png_falls_back() {
        let uri = png_data_uri(20, 20, true);
        let (_, payload) = uri.split_once(',').unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(payload).unwrap();
        let truncated = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes[..bytes.len() / 2])
        );
        assert!(!embed(&truncated).is_embedded());
    }
}
