use crate::types::Pt;

/// A layout edge case that produced a valid but imperfect document.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutWarning {
    /// A single word wider than the content width; drawn unbroken.
    OversizedToken {
        page: usize,
        token: String,
        width: Pt,
        max_width: Pt,
    },
    /// A block taller than a page's usable height. It starts at the top
    /// margin of a fresh page instead of being kept together.
    BlockTallerThanPage {
        page: usize,
        height: Pt,
        usable_height: Pt,
    },
}

impl LayoutWarning {
    pub fn code(&self) -> &'static str {
        match self {
            LayoutWarning::OversizedToken { .. } => "LAYOUT_OVERSIZED_TOKEN",
            LayoutWarning::BlockTallerThanPage { .. } => "LAYOUT_BLOCK_TALLER_THAN_PAGE",
        }
    }

    pub fn page(&self) -> usize {
        match self {
            LayoutWarning::OversizedToken { page, .. }
            | LayoutWarning::BlockTallerThanPage { page, .. } => *page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Embedded { pixel_width: u32, pixel_height: u32 },
    Fallback { reason: String },
}

impl SignatureStatus {
    pub fn is_embedded(&self) -> bool {
        matches!(self, SignatureStatus::Embedded { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub page_count: usize,
    pub clause_count: usize,
    pub placed_lines: usize,
    pub output_bytes: usize,
    pub signature: SignatureStatus,
    pub warnings: Vec<LayoutWarning>,
}
