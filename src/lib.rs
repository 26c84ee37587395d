mod assemble;
mod canvas;
mod clause;
mod debug;
mod error;
mod flow;
mod font;
mod metrics;
mod pdf;
mod record;
mod signature;
mod types;
mod wrap;

pub use assemble::{Assembled, DocumentAssembler, LayoutSettings};
pub use canvas::{Document, DocumentInfo, Element, ElementKind, Page};
pub use clause::{Clause, ClauseTable, select_text};
pub use consent_audit::RenderReceipt;
use debug::LayoutTrace;
pub use error::{ConsentPdfError, Result};
pub use flow::PageFlow;
pub use font::{FaceId, FontSet, FontSource};
pub use metrics::{LayoutWarning, RenderReport, SignatureStatus};
pub use pdf::{write_document, write_document_to};
pub use record::{Acceptance, ConsentRecord, Demographics, Guardian, MAJORITY_AGE};
pub use signature::{
    EmbeddedImage, ImageEmbedder, SIGNATURE_FALLBACK_TEXT, SignatureError, SignatureFallback,
    SignatureOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
pub use types::{Color, Margins, Pt, Rect, Size};
pub use wrap::{Line, LineWrapper};

/// Renders consent records to PDF with a fixed template.
///
/// Holds only read-only data, so one renderer can be shared across threads
/// and every call lays its document out from scratch.
pub struct ConsentRenderer {
    settings: LayoutSettings,
    fonts: Arc<FontSet>,
    clauses: Arc<ClauseTable>,
    template_fingerprint: String,
    trace: Option<LayoutTrace>,
}

/// Bytes of one rendered document plus what is known about how it was laid
/// out.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub pdf: Vec<u8>,
    pub report: RenderReport,
    pub receipt: RenderReceipt,
}

impl ConsentRenderer {
    pub fn builder() -> ConsentRendererBuilder {
        ConsentRendererBuilder::new()
    }

    pub fn settings(&self) -> &LayoutSettings {
        &self.settings
    }

    pub fn fonts(&self) -> &FontSet {
        &self.fonts
    }

    pub fn clauses(&self) -> &ClauseTable {
        &self.clauses
    }

    /// SHA-256 of the clause table this renderer was built with.
    pub fn template_fingerprint(&self) -> &str {
        &self.template_fingerprint
    }

    /// Lays out `record` without serializing it.
    pub fn layout(&self, record: &ConsentRecord) -> Result<Assembled> {
        let assembler = DocumentAssembler::new(&self.settings, &self.fonts, &self.clauses)?;
        let Some(trace) = &self.trace else {
            return assembler.assemble(record);
        };
        let doc = trace_label(record);
        let assembled = assembler.with_trace(trace.clone(), &doc).assemble(record);
        trace.summary(&doc);
        assembled
    }

    pub fn render(&self, record: &ConsentRecord) -> Result<Vec<u8>> {
        let assembled = self.layout(record)?;
        self.serialize(&assembled.document)
    }

    /// Renders `record` and writes the finished file to `writer`; returns the
    /// number of bytes written. A failing writer is a `RenderIo` error.
    pub fn render_to_writer<W: std::io::Write>(
        &self,
        record: &ConsentRecord,
        writer: &mut W,
    ) -> Result<usize> {
        let assembled = self.layout(record)?;
        pdf::write_document_to(&assembled.document, &self.fonts, writer)
            .map_err(|err| ConsentPdfError::resource_io("pdf output", err))
    }

    pub fn render_with_report(&self, record: &ConsentRecord) -> Result<RenderOutput> {
        let assembled = self.layout(record)?;
        let pdf = self.serialize(&assembled.document)?;
        let page_count = assembled.document.page_count();
        let report = RenderReport {
            page_count,
            clause_count: self.clauses.len(),
            placed_lines: assembled.placed_lines,
            output_bytes: pdf.len(),
            signature: assembled.signature,
            warnings: assembled.warnings,
        };
        let receipt = RenderReceipt::new(
            self.template_fingerprint.clone(),
            &record.canonical_json(),
            &pdf,
            page_count,
            report.signature.is_embedded(),
        );
        log::debug!(
            "rendered consent document {}: {} pages, {} bytes",
            &receipt.document_sha256[..12],
            page_count,
            pdf.len()
        );
        Ok(RenderOutput {
            pdf,
            report,
            receipt,
        })
    }

    /// Renders independent records in parallel. Results keep input order and
    /// one failing record does not affect the others.
    pub fn render_many(&self, records: &[ConsentRecord]) -> Vec<Result<Vec<u8>>> {
        use rayon::prelude::*;

        records
            .par_iter()
            .map(|record| self.render(record))
            .collect()
    }

    fn serialize(&self, document: &Document) -> Result<Vec<u8>> {
        pdf::write_document(document, &self.fonts)
            .map_err(|err| ConsentPdfError::resource_io("pdf output", err))
    }
}

fn trace_label(record: &ConsentRecord) -> String {
    let digest = consent_audit::hex_sha256(record.canonical_json().as_bytes());
    digest[..12].to_string()
}

#[derive(Debug, Clone)]
pub struct ConsentRendererBuilder {
    settings: LayoutSettings,
    regular: FontSource,
    bold: FontSource,
    clauses: Option<ClauseTable>,
    layout_trace: Option<PathBuf>,
}

impl Default for ConsentRendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentRendererBuilder {
    pub fn new() -> Self {
        Self {
            settings: LayoutSettings::default(),
            regular: FontSource::Standard,
            bold: FontSource::Standard,
            clauses: None,
            layout_trace: None,
        }
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.settings.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.settings.margins = margins;
        self
    }

    pub fn margin_all(mut self, value: f32) -> Self {
        self.settings.margins = Margins::all(value);
        self
    }

    pub fn regular_font(mut self, source: FontSource) -> Self {
        self.regular = source;
        self
    }

    pub fn bold_font(mut self, source: FontSource) -> Self {
        self.bold = source;
        self
    }

    pub fn title_size(mut self, size: f32) -> Self {
        self.settings.title_size = Pt::from_f32(size);
        self
    }

    pub fn heading_size(mut self, size: f32) -> Self {
        self.settings.heading_size = Pt::from_f32(size);
        self
    }

    pub fn body_size(mut self, size: f32) -> Self {
        self.settings.body_size = Pt::from_f32(size);
        self
    }

    pub fn footer_size(mut self, size: f32) -> Self {
        self.settings.footer_size = Pt::from_f32(size);
        self
    }

    /// Line box height as a multiple of the font size (1.0 to 3.0).
    pub fn line_spacing(mut self, factor: f32) -> Self {
        self.settings.line_spacing_permille = if factor.is_finite() {
            (factor * 1000.0).round() as i32
        } else {
            0
        };
        self
    }

    pub fn block_gap(mut self, gap: f32) -> Self {
        self.settings.block_gap = Pt::from_f32(gap);
        self
    }

    pub fn signature_box(mut self, width: f32, height: f32) -> Self {
        self.settings.signature_box = Size::new(width, height);
        self
    }

    pub fn clause_table(mut self, table: ClauseTable) -> Self {
        self.clauses = Some(table);
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.settings.document_title = title.into();
        self
    }

    pub fn practice_name(mut self, name: impl Into<String>) -> Self {
        self.settings.practice_name = name.into();
        self
    }

    /// Writes a JSONL trace of page breaks and layout edge cases to `path`.
    pub fn layout_trace(mut self, path: impl Into<PathBuf>) -> Self {
        self.layout_trace = Some(path.into());
        self
    }

    /// Validates the settings and loads fonts and the trace file. Nothing
    /// here depends on a record, so a broken template fails before any
    /// consent is touched.
    pub fn build(self) -> Result<ConsentRenderer> {
        self.settings.validate()?;
        let fonts = FontSet::load(&self.regular, &self.bold)?;
        let clauses = self.clauses.unwrap_or_else(ClauseTable::standard);
        let trace = match &self.layout_trace {
            Some(path) => Some(LayoutTrace::create(path).map_err(|err| {
                ConsentPdfError::resource_io(format!("layout trace {}", path.display()), err)
            })?),
            None => None,
        };
        Ok(ConsentRenderer {
            template_fingerprint: clauses.fingerprint(),
            settings: self.settings,
            fonts: Arc::new(fonts),
            clauses: Arc::new(clauses),
            trace,
        })
    }
}
