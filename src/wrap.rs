use crate::error::{ConsentPdfError, Result};
use crate::font::{FaceId, FontSet, validate_font_size};
use crate::types::Pt;

/// One wrapped line of text and its measured width.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub width: Pt,
    /// Set when the line is a single token wider than the wrap width. Such a
    /// token is never broken mid-word; the line overhangs instead.
    pub oversized: bool,
}

impl Line {
    fn blank() -> Self {
        Self {
            text: String::new(),
            width: Pt::ZERO,
            oversized: false,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

/// Greedy word wrapper. Holds no state between calls and never looks at
/// page state.
#[derive(Clone, Copy)]
pub struct LineWrapper<'a> {
    fonts: &'a FontSet,
}

impl<'a> LineWrapper<'a> {
    pub fn new(fonts: &'a FontSet) -> Self {
        Self { fonts }
    }

    pub fn wrap(&self, text: &str, face: &str, size: Pt, max_width: Pt) -> Result<Vec<Line>> {
        let face = self.fonts.resolve(face)?;
        self.wrap_face(text, face, size, max_width)
    }

    pub(crate) fn wrap_face(
        &self,
        text: &str,
        face: FaceId,
        size: Pt,
        max_width: Pt,
    ) -> Result<Vec<Line>> {
        validate_font_size(size)?;
        if max_width <= Pt::ZERO {
            return Err(ConsentPdfError::Configuration(format!(
                "wrap width must be positive, got {}pt",
                max_width.to_f32()
            )));
        }

        let mut lines = Vec::new();
        // Newlines separate paragraphs; each is wrapped on its own.
        for segment in text.trim().lines() {
            if segment.trim().is_empty() {
                lines.push(Line::blank());
                continue;
            }
            self.wrap_segment(segment, face, size, max_width, &mut lines);
        }
        Ok(lines)
    }

    fn wrap_segment(&self, segment: &str, face: FaceId, size: Pt, max_width: Pt, out: &mut Vec<Line>) {
        let measure = |s: &str| self.fonts.measure_face(face, s, size);
        let mut buffer = String::new();
        let mut buffer_width = Pt::ZERO;

        for token in segment.split_whitespace() {
            let candidate = if buffer.is_empty() {
                token.to_string()
            } else {
                format!("{buffer} {token}")
            };
            let candidate_width = measure(&candidate);
            if candidate_width <= max_width {
                buffer = candidate;
                buffer_width = candidate_width;
                continue;
            }

            if !buffer.is_empty() {
                out.push(Line {
                    text: std::mem::take(&mut buffer),
                    width: buffer_width,
                    oversized: false,
                });
                buffer_width = Pt::ZERO;
            }

            let token_width = measure(token);
            if token_width > max_width {
                out.push(Line {
                    text: token.to_string(),
                    width: token_width,
                    oversized: true,
                });
            } else {
                buffer = token.to_string();
                buffer_width = token_width;
            }
        }

        if !buffer.is_empty() {
            out.push(Line {
                text: buffer,
                width: buffer_width,
                oversized: false,
            });
        }
    }
}
