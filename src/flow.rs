use crate::canvas::{Element, ElementKind, Page};
use crate::debug::LayoutTrace;
use crate::error::{ConsentPdfError, Result};
use crate::metrics::LayoutWarning;
use crate::types::{Margins, Pt, Rect, Size};
use serde_json::json;

/// Vertical cursor over a sequence of pages.
///
/// Elements are placed top to bottom inside the margins. Before anything is
/// placed the flow checks that it fits above the bottom limit and starts a
/// new page when it does not. A page that holds no flow content never gets
/// broken, so a single oversized block cannot produce an endless run of
/// empty pages.
pub struct PageFlow {
    page_size: Size,
    margins: Margins,
    sealed: Vec<Page>,
    current: Page,
    cursor: Pt,
    warnings: Vec<LayoutWarning>,
    trace: Option<LayoutTrace>,
    trace_doc: String,
}

impl PageFlow {
    pub fn new(page_size: Size, margins: Margins) -> Result<Self> {
        let usable_width = page_size.width - margins.left - margins.right;
        let usable_height = page_size.height - margins.top - margins.bottom;
        if usable_width <= Pt::ZERO || usable_height <= Pt::ZERO {
            return Err(ConsentPdfError::Configuration(format!(
                "margins leave no content area on a {}x{}pt page",
                page_size.width.to_f32(),
                page_size.height.to_f32()
            )));
        }
        Ok(Self {
            page_size,
            margins,
            sealed: Vec::new(),
            current: Page::new(0),
            cursor: margins.top,
            warnings: Vec::new(),
            trace: None,
            trace_doc: String::new(),
        })
    }

    pub(crate) fn with_trace(mut self, trace: LayoutTrace, doc: impl Into<String>) -> Self {
        self.trace = Some(trace);
        self.trace_doc = doc.into();
        self
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn content_width(&self) -> Pt {
        self.page_size.width - self.margins.left - self.margins.right
    }

    pub fn bottom_limit(&self) -> Pt {
        self.page_size.height - self.margins.bottom
    }

    pub fn usable_height(&self) -> Pt {
        self.bottom_limit() - self.margins.top
    }

    pub fn cursor(&self) -> Pt {
        self.cursor
    }

    /// One-based number of the page currently being filled.
    pub fn page_number(&self) -> usize {
        self.current.index + 1
    }

    pub fn warnings(&self) -> &[LayoutWarning] {
        &self.warnings
    }

    /// Makes sure `required` fits below the cursor. Returns `true` when a new
    /// page was started.
    pub fn ensure_space(&mut self, required: Pt) -> bool {
        let usable = self.usable_height();
        let fits = self.cursor + required <= self.bottom_limit();
        let mut broke = false;
        if !fits && !self.current.is_empty() {
            self.break_page(required);
            broke = true;
        }
        if required > usable && self.cursor + required > self.bottom_limit() {
            self.warn(LayoutWarning::BlockTallerThanPage {
                page: self.page_number(),
                height: required,
                usable_height: usable,
            });
        }
        broke
    }

    /// Places `kind` across the full content width.
    pub fn place(&mut self, kind: ElementKind, height: Pt) -> Rect {
        let width = self.content_width();
        self.place_at(kind, Pt::ZERO, width, height)
    }

    /// Places `kind` at `indent` from the left margin.
    pub fn place_at(&mut self, kind: ElementKind, indent: Pt, width: Pt, height: Pt) -> Rect {
        self.ensure_space(height);
        let rect = self.push(kind, indent, width, height);
        self.cursor += height;
        rect
    }

    /// Places several elements side by side on one line of `height`. The
    /// row either fits on the current page or moves as a whole.
    pub fn place_row(&mut self, cells: Vec<(ElementKind, Pt, Pt)>, height: Pt) -> Vec<Rect> {
        self.ensure_space(height);
        let rects = cells
            .into_iter()
            .map(|(kind, indent, width)| self.push(kind, indent, width, height))
            .collect();
        self.cursor += height;
        rects
    }

    /// Vertical gap between blocks. Swallowed at the top of a page and
    /// clamped at the bottom limit, so it never causes a page break itself.
    /// The cursor never moves back up: a negative gap is ignored.
    pub fn advance(&mut self, gap: Pt) {
        if self.current.is_empty() || gap <= Pt::ZERO {
            return;
        }
        self.cursor = (self.cursor + gap).min(self.bottom_limit());
    }

    pub(crate) fn record_warning(&mut self, warning: LayoutWarning) {
        self.warn(warning);
    }

    /// Seals the page in progress and returns every page in order. An empty
    /// flow still yields one blank page.
    pub fn finish(mut self) -> Vec<Page> {
        self.sealed.push(self.current);
        self.sealed
    }

    fn push(&mut self, kind: ElementKind, indent: Pt, width: Pt, height: Pt) -> Rect {
        let rect = Rect {
            x: self.margins.left + indent,
            y: self.cursor,
            width,
            height,
        };
        self.current.elements.push(Element { rect, kind });
        rect
    }

    fn break_page(&mut self, required: Pt) {
        let from_page = self.page_number();
        let next = Page::new(self.current.index + 1);
        let sealed = std::mem::replace(&mut self.current, next);
        log::debug!(
            "page break {} -> {}: {}pt needed at cursor {}pt, limit {}pt",
            from_page,
            from_page + 1,
            required.to_f32(),
            self.cursor.to_f32(),
            self.bottom_limit().to_f32()
        );
        if let Some(trace) = &self.trace {
            trace.event(json!({
                "type": "layout.page_break",
                "doc": self.trace_doc,
                "from_page": from_page,
                "to_page": from_page + 1,
                "cursor_milli": self.cursor.milli(),
                "required_milli": required.milli(),
                "elements": sealed.elements.len(),
            }));
        }
        self.sealed.push(sealed);
        self.cursor = self.margins.top;
    }

    fn warn(&mut self, warning: LayoutWarning) {
        log::warn!("layout edge case {} on page {}", warning.code(), warning.page());
        if let Some(trace) = &self.trace {
            trace.event(json!({
                "type": "layout.warning",
                "doc": self.trace_doc,
                "code": warning.code(),
                "page": warning.page(),
            }));
        }
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FaceId;
    use proptest::prelude::*;

    fn flow() -> PageFlow {
        // 200pt usable height.
        PageFlow::new(Size::new(300.0, 300.0), Margins::all(50.0)).expect("flow")
    }

    fn line(text: &str) -> ElementKind {
        ElementKind::text(text, FaceId::Regular, Pt::from_i32(10))
    }

    #[test]
    fn places_elements_down_the_page() {
        let mut flow = flow();
        let a = flow.place(line("a"), Pt::from_i32(20));
        let b = flow.place(line("b"), Pt::from_i32(20));
        assert_eq!(a.y, Pt::from_i32(50));
        assert_eq!(b.y, Pt::from_i32(70));
        assert_eq!(a.x, Pt::from_i32(50));
        assert_eq!(a.width, Pt::from_i32(200));
        assert_eq!(flow.cursor(), Pt::from_i32(90));
        assert_eq!(flow.finish().len(), 1);
    }

    #[test]
    fn breaks_when_the_block_does_not_fit() {
        let mut flow = flow();
        flow.place(line("a"), Pt::from_i32(150));
        assert!(flow.ensure_space(Pt::from_i32(60)));
        assert_eq!(flow.cursor(), Pt::from_i32(50));
        assert_eq!(flow.page_number(), 2);
        let rect = flow.place(line("b"), Pt::from_i32(60));
        assert_eq!(rect.y, Pt::from_i32(50));

        let pages = flow.finish();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].elements.len(), 1);
        assert_eq!(pages[1].index, 1);
        assert!(pages[1].contains_text("b"));
    }

    #[test]
    fn exact_fit_stays_on_the_page() {
        let mut flow = flow();
        flow.place(line("a"), Pt::from_i32(150));
        assert!(!flow.ensure_space(Pt::from_i32(50)));
        flow.place(line("b"), Pt::from_i32(50));
        assert_eq!(flow.finish().len(), 1);
    }

    #[test]
    fn empty_page_is_never_broken() {
        let mut flow = flow();
        assert!(!flow.ensure_space(Pt::from_i32(500)));
        assert_eq!(flow.page_number(), 1);
        assert_eq!(
            flow.warnings(),
            &[LayoutWarning::BlockTallerThanPage {
                page: 1,
                height: Pt::from_i32(500),
                usable_height: Pt::from_i32(200),
            }]
        );
    }

    #[test]
    fn oversized_block_moves_to_a_fresh_page_once() {
        let mut flow = flow();
        flow.place(line("a"), Pt::from_i32(10));
        assert!(flow.ensure_space(Pt::from_i32(500)));
        assert_eq!(flow.page_number(), 2);
        assert_eq!(flow.cursor(), Pt::from_i32(50));
        assert_eq!(flow.warnings().len(), 1);
        assert_eq!(flow.warnings()[0].page(), 2);
    }

    #[test]
    fn advance_is_dropped_at_page_top_and_clamped_at_bottom() {
        let mut flow = flow();
        flow.advance(Pt::from_i32(30));
        assert_eq!(flow.cursor(), Pt::from_i32(50));
        flow.place(line("a"), Pt::from_i32(190));
        flow.advance(Pt::from_i32(30));
        assert_eq!(flow.cursor(), flow.bottom_limit());
        assert_eq!(flow.page_number(), 1);
    }

    #[test]
    fn negative_advance_never_moves_the_cursor_up() {
        let mut flow = flow();
        let first = flow.place(line("a"), Pt::from_i32(20));
        flow.advance(Pt::from_i32(-15));
        assert_eq!(flow.cursor(), first.bottom());
        let second = flow.place(line("b"), Pt::from_i32(10));
        assert!(second.y >= first.bottom());
    }

    #[test]
    fn row_cells_share_one_line() {
        let mut flow = flow();
        let rects = flow.place_row(
            vec![
                (line("Edad:"), Pt::ZERO, Pt::from_i32(30)),
                (line("15"), Pt::from_i32(35), Pt::from_i32(20)),
            ],
            Pt::from_i32(12),
        );
        assert_eq!(rects[0].y, rects[1].y);
        assert_eq!(rects[1].x, Pt::from_i32(85));
        assert_eq!(flow.cursor(), Pt::from_i32(62));
    }

    #[test]
    fn empty_flow_yields_one_page() {
        let pages = flow().finish();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].is_empty());
    }

    #[test]
    fn rejects_margins_without_content_area() {
        assert!(matches!(
            PageFlow::new(Size::new(100.0, 100.0), Margins::all(50.0)),
            Err(ConsentPdfError::Configuration(_))
        ));
    }

    proptest! {
        #[test]
        fn elements_stay_above_the_bottom_limit(
            heights in proptest::collection::vec(1u32..260, 1..80),
        ) {
            let mut flow = flow();
            let limit = flow.bottom_limit();
            let usable = flow.usable_height();
            for height in &heights {
                let before = flow.page_number();
                flow.place(line("x"), Pt::from_i32(*height as i32));
                prop_assert!(flow.page_number() <= before + 1);
            }
            let pages = flow.finish();
            for page in &pages {
                for element in &page.elements {
                    if element.rect.height <= usable {
                        prop_assert!(element.rect.bottom() <= limit);
                    } else {
                        prop_assert_eq!(element.rect.y, Pt::from_i32(50));
                    }
                }
            }
            for (index, page) in pages.iter().enumerate() {
                prop_assert_eq!(page.index, index);
                prop_assert!(!page.is_empty());
            }
        }
    }
}
