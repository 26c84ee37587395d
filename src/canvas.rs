use crate::font::FaceId;
use crate::signature::EmbeddedImage;
use crate::types::{Color, Pt, Rect, Size};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    /// A single run of text in one face. The run is drawn on the baseline of
    /// its rect; it is never re-wrapped after placement.
    TextRun {
        text: String,
        face: FaceId,
        size: Pt,
        color: Color,
    },
    Image {
        resource_id: String,
    },
    /// Horizontal rule across the element's width, centred vertically.
    Rule {
        thickness: Pt,
        color: Color,
    },
}

impl ElementKind {
    pub fn text(text: impl Into<String>, face: FaceId, size: Pt) -> Self {
        ElementKind::TextRun {
            text: text.into(),
            face,
            size,
            color: Color::BLACK,
        }
    }
}

/// An element with its final position on the page (top-down coordinates).
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub rect: Rect,
    pub kind: ElementKind,
}

impl Element {
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::TextRun { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Zero-based position of the page in the document.
    pub index: usize,
    /// Flowed content, appended only by the page flow.
    pub elements: Vec<Element>,
    /// Running footer drawn in the bottom margin once the page count is known.
    pub furniture: Vec<Element>,
}

impl Page {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            elements: Vec::new(),
            furniture: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(Element::text)
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().any(|text| text.contains(needle))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    pub title: String,
    pub subject: String,
    /// PDF date string (`D:YYYYMMDDHHmmSS+HH'mm'`), when the submission
    /// timestamp could be parsed.
    pub creation_date: Option<String>,
}

/// A fully laid out consent document. Produced once per render and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
    pub images: BTreeMap<String, EmbeddedImage>,
    pub info: DocumentInfo,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Flowed text in reading order, one entry per text run.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flat_map(Page::texts)
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.pages.iter().any(|page| page.contains_text(needle))
    }

    pub fn has_image(&self) -> bool {
        self.pages.iter().any(|page| {
            page.elements
                .iter()
                .any(|element| matches!(element.kind, ElementKind::Image { .. }))
        })
    }
}
