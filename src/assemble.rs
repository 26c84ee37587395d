use crate::canvas::{Document, DocumentInfo, Element, ElementKind};
use crate::clause::ClauseTable;
use crate::debug::LayoutTrace;
use crate::error::{ConsentPdfError, Result};
use crate::flow::PageFlow;
use crate::font::{FaceId, FontSet, validate_font_size};
use crate::metrics::{LayoutWarning, SignatureStatus};
use crate::record::ConsentRecord;
use crate::signature::{EmbeddedImage, ImageEmbedder, SignatureOutcome};
use crate::types::{Color, Margins, Pt, Rect, Size};
use crate::wrap::{Line, LineWrapper};
use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;

const BLANK_VALUE: &str = "__________";

/// Page geometry, type sizes and fixed wording of the consent template.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSettings {
    pub page_size: Size,
    pub margins: Margins,
    pub title_size: Pt,
    pub heading_size: Pt,
    pub body_size: Pt,
    pub footer_size: Pt,
    /// Line box height as a multiple of the font size, in thousandths.
    pub line_spacing_permille: i32,
    /// Vertical space between blocks.
    pub block_gap: Pt,
    /// Box the signature image is fitted into.
    pub signature_box: Size,
    pub document_title: String,
    pub practice_name: String,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins {
                top: Pt::from_mm(20.0),
                right: Pt::from_mm(20.0),
                bottom: Pt::from_mm(22.0),
                left: Pt::from_mm(20.0),
            },
            title_size: Pt::from_i32(16),
            heading_size: Pt::from_i32(11),
            body_size: Pt::from_i32(10),
            footer_size: Pt::from_i32(8),
            line_spacing_permille: 1350,
            block_gap: Pt::from_i32(9),
            signature_box: Size::new(220.0, 80.0),
            document_title: "CONSENTIMIENTO INFORMADO".to_string(),
            practice_name: "Caminos del Ser".to_string(),
        }
    }
}

impl LayoutSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        for size in [
            self.title_size,
            self.heading_size,
            self.body_size,
            self.footer_size,
        ] {
            validate_font_size(size)?;
        }
        if !(1000..=3000).contains(&self.line_spacing_permille) {
            return Err(ConsentPdfError::Configuration(format!(
                "line spacing must be between 1.0 and 3.0, got {}",
                self.line_spacing_permille as f32 / 1000.0
            )));
        }
        if self.block_gap < Pt::ZERO {
            return Err(ConsentPdfError::Configuration(
                "block gap must not be negative".to_string(),
            ));
        }
        let flow = PageFlow::new(self.page_size, self.margins)?;
        let sig = self.signature_box;
        if sig.width <= Pt::ZERO
            || sig.height <= Pt::ZERO
            || sig.width > flow.content_width()
            || sig.height > flow.usable_height()
        {
            return Err(ConsentPdfError::Configuration(format!(
                "signature box {}x{}pt does not fit the content area",
                sig.width.to_f32(),
                sig.height.to_f32()
            )));
        }
        // The placeholder line must fit inside the box it stands in for.
        if sig.height < self.line_height(self.body_size) {
            return Err(ConsentPdfError::Configuration(format!(
                "signature box height {}pt is shorter than one body line",
                sig.height.to_f32()
            )));
        }
        if self.line_height(self.footer_size) > self.margins.bottom {
            return Err(ConsentPdfError::Configuration(
                "bottom margin is too small for the page footer".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn line_height(&self, size: Pt) -> Pt {
        size.scale(i64::from(self.line_spacing_permille), 1000)
    }
}

/// What one assembly produced besides the document itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub document: Document,
    pub placed_lines: usize,
    pub signature: SignatureStatus,
    pub warnings: Vec<LayoutWarning>,
}

/// Lays out one consent record. Built fresh for every render and consumed
/// by `assemble`, so no page state outlives a document.
pub struct DocumentAssembler<'a> {
    settings: &'a LayoutSettings,
    fonts: &'a FontSet,
    clauses: &'a ClauseTable,
    wrapper: LineWrapper<'a>,
    flow: PageFlow,
    images: BTreeMap<String, EmbeddedImage>,
    placed_lines: usize,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(
        settings: &'a LayoutSettings,
        fonts: &'a FontSet,
        clauses: &'a ClauseTable,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            fonts,
            clauses,
            wrapper: LineWrapper::new(fonts),
            flow: PageFlow::new(settings.page_size, settings.margins)?,
            images: BTreeMap::new(),
            placed_lines: 0,
        })
    }

    pub(crate) fn with_trace(mut self, trace: LayoutTrace, doc: &str) -> Self {
        self.flow = self.flow.with_trace(trace, doc);
        self
    }

    pub fn assemble(mut self, record: &ConsentRecord) -> Result<Assembled> {
        self.title_block()?;
        self.declaration(record)?;
        let clauses = self.clauses;
        for (index, clause) in clauses.iter().enumerate() {
            let title = format!("{}. {}", index + 1, clause.title);
            self.clause(&title, clause.select_text(record.is_minor()))?;
        }
        self.acceptance_block(record)?;
        self.summary(record)?;
        if record.is_minor() {
            self.guardian_block(record)?;
        }
        let signature = self.signature_block(record)?;

        let warnings = self.flow.warnings().to_vec();
        let mut pages = self.flow.finish();
        let total = pages.len();
        for page in &mut pages {
            page.furniture = footer(self.settings, self.fonts, page.index + 1, total);
        }
        log::debug!(
            "assembled consent document: {} pages, {} lines, {} warnings",
            total,
            self.placed_lines,
            warnings.len()
        );

        let demographics = record.demographics();
        let title = if demographics.full_name.trim().is_empty() {
            "Consentimiento informado".to_string()
        } else {
            format!("Consentimiento informado - {}", demographics.full_name.trim())
        };
        Ok(Assembled {
            document: Document {
                page_size: self.settings.page_size,
                pages,
                images: self.images,
                info: DocumentInfo {
                    title,
                    subject: self.settings.practice_name.clone(),
                    creation_date: record.submitted_at().map(pdf_date),
                },
            },
            placed_lines: self.placed_lines,
            signature,
            warnings,
        })
    }

    fn title_block(&mut self) -> Result<()> {
        let settings = self.settings;
        let width = self.flow.content_width();
        let title = self.wrap(&settings.document_title, FaceId::Bold, settings.title_size, width)?;
        self.place_centered(&title, FaceId::Bold, settings.title_size);
        let subtitle = self.wrap(&settings.practice_name, FaceId::Regular, settings.body_size, width)?;
        self.place_centered(&subtitle, FaceId::Regular, settings.body_size);
        self.flow.place(
            ElementKind::Rule {
                thickness: Pt::from_f32(0.75),
                color: Color::gray(0.4),
            },
            settings.block_gap,
        );
        self.flow.advance(settings.block_gap / 2);
        Ok(())
    }

    fn declaration(&mut self, record: &ConsentRecord) -> Result<()> {
        let text = declaration_text(record, &self.settings.practice_name);
        let size = self.settings.body_size;
        let lines = self.wrap(&text, FaceId::Regular, size, self.flow.content_width())?;
        self.flow.ensure_space(self.block_height(&lines, size));
        self.place_lines(&lines, FaceId::Regular, size, Pt::ZERO);
        self.flow.advance(self.settings.block_gap);
        Ok(())
    }

    /// Title and body are asked for as one block; the body lines then flow
    /// on their own if the block is taller than a page.
    fn clause(&mut self, title: &str, text: &str) -> Result<()> {
        let settings = self.settings;
        let width = self.flow.content_width();
        let title_lines = self.wrap(title, FaceId::Bold, settings.heading_size, width)?;
        let body_lines = self.wrap(text, FaceId::Regular, settings.body_size, width)?;
        let height = self.block_height(&title_lines, settings.heading_size)
            + self.block_height(&body_lines, settings.body_size);
        self.flow.ensure_space(height);
        self.place_lines(&title_lines, FaceId::Bold, settings.heading_size, Pt::ZERO);
        self.place_lines(&body_lines, FaceId::Regular, settings.body_size, Pt::ZERO);
        self.flow.advance(settings.block_gap);
        Ok(())
    }

    /// Answers recorded on the form. Per-clause rows follow table order and
    /// mark clauses the form left unanswered.
    fn acceptance_block(&mut self, record: &ConsentRecord) -> Result<()> {
        let acceptance = record.acceptance();
        if acceptance.is_empty() {
            return Ok(());
        }
        let clauses = self.clauses;
        let mut fields = Vec::new();
        if let Some(accepted) = acceptance.overall {
            let answer = if accepted { "Acepta" } else { "No acepta" };
            fields.push(("Aceptación de todas las cláusulas", answer.to_string()));
        }
        if !acceptance.clauses.is_empty() {
            for clause in clauses {
                let answer = match acceptance.clause(&clause.id) {
                    Some(true) => "Aceptada",
                    Some(false) => "No aceptada",
                    None => "Sin respuesta",
                };
                fields.push((clause.title.as_str(), answer.to_string()));
            }
            let unknown = acceptance
                .clauses
                .keys()
                .filter(|id| clauses.get(id).is_none())
                .count();
            if unknown > 0 {
                log::debug!("{unknown} recorded answers name clauses outside the template");
            }
        }
        self.field_block("ACEPTACIÓN DEL CONSENTIMIENTO", fields, None)
    }

    fn summary(&mut self, record: &ConsentRecord) -> Result<()> {
        let d = record.demographics();
        let submitted = display_timestamp(record);
        let fields = vec![
            ("Nombre completo", d.full_name.clone()),
            ("Tipo de documento", d.id_type.clone()),
            ("Número de documento", d.id_number.clone()),
            ("Edad", format!("{} años", d.age)),
            ("Correo electrónico", d.email.clone()),
            ("Teléfono", d.phone.clone()),
            ("Dirección", d.address.clone()),
            ("Ciudad", d.city.clone()),
            ("Departamento", d.department.clone()),
            ("País", d.country.clone()),
            ("Contacto de emergencia", d.emergency_contact_name.clone()),
            ("Teléfono de emergencia", d.emergency_contact_phone.clone()),
            ("Fecha de diligenciamiento", submitted),
        ];
        self.field_block("DATOS DEL CONSULTANTE", fields, None)
    }

    fn guardian_block(&mut self, record: &ConsentRecord) -> Result<()> {
        let fields = match record.guardian() {
            Some(guardian) => vec![
                ("Nombre", guardian.name.clone()),
                ("Documento", guardian.id_number.clone()),
                ("Parentesco", guardian.relation.clone()),
            ],
            None => Vec::new(),
        };
        self.field_block(
            "DATOS DEL ACUDIENTE O REPRESENTANTE LEGAL",
            fields,
            Some("No se registraron datos del acudiente."),
        )
    }

    /// A heading followed by one `Label: value` row per non-empty field.
    fn field_block(
        &mut self,
        heading: &str,
        fields: Vec<(&str, String)>,
        when_empty: Option<&str>,
    ) -> Result<()> {
        let settings = self.settings;
        let fields: Vec<(&str, String)> = fields
            .into_iter()
            .map(|(label, value)| (label, value.trim().to_string()))
            .filter(|(_, value)| !value.is_empty())
            .collect();
        if fields.is_empty() && when_empty.is_none() {
            return Ok(());
        }

        let width = self.flow.content_width();
        let heading_lines = self.wrap(heading, FaceId::Bold, settings.heading_size, width)?;
        let first_row = settings.line_height(settings.body_size);
        self.flow
            .ensure_space(self.block_height(&heading_lines, settings.heading_size) + first_row);
        self.place_lines(&heading_lines, FaceId::Bold, settings.heading_size, Pt::ZERO);

        if fields.is_empty() {
            let note = when_empty.unwrap_or_default();
            let lines = self.wrap(note, FaceId::Regular, settings.body_size, width)?;
            self.place_lines(&lines, FaceId::Regular, settings.body_size, Pt::ZERO);
        }
        for (label, value) in &fields {
            self.field_row(label, value)?;
        }
        self.flow.advance(settings.block_gap);
        Ok(())
    }

    fn field_row(&mut self, label: &str, value: &str) -> Result<()> {
        let size = self.settings.body_size;
        let line_height = self.settings.line_height(size);
        let width = self.flow.content_width();
        let label = format!("{label}: ");
        let label_width = self.fonts.measure_face(FaceId::Bold, &label, size);

        // A label that leaves less than a third of the line pushes the value
        // onto its own lines.
        let value_indent = if label_width * 3 <= width * 2 {
            label_width
        } else {
            Pt::ZERO
        };
        let value_lines = self.wrap(value, FaceId::Regular, size, width - value_indent)?;
        let mut rest = value_lines.as_slice();

        let mut cells = vec![(
            ElementKind::text(label.trim_end(), FaceId::Bold, size),
            Pt::ZERO,
            label_width,
        )];
        if value_indent > Pt::ZERO {
            if let Some((first, tail)) = rest.split_first() {
                cells.push((
                    ElementKind::text(first.text.clone(), FaceId::Regular, size),
                    value_indent,
                    first.width,
                ));
                self.note_oversized(first);
                rest = tail;
            }
        }
        self.flow.place_row(cells, line_height);
        self.placed_lines += 1;
        self.place_lines(rest, FaceId::Regular, size, value_indent);
        Ok(())
    }

    fn signature_block(&mut self, record: &ConsentRecord) -> Result<SignatureStatus> {
        let settings = self.settings;
        let width = self.flow.content_width();
        let body = settings.body_size;
        let body_line = settings.line_height(body);
        let sig_box = settings.signature_box;
        let outcome =
            ImageEmbedder.embed(record.signature_data_uri(), sig_box.width, sig_box.height);

        let heading = if record.is_minor() {
            "FIRMA DEL ACUDIENTE O REPRESENTANTE LEGAL"
        } else {
            "FIRMA DEL CONSULTANTE"
        };
        let heading_lines = self.wrap(heading, FaceId::Bold, settings.heading_size, width)?;
        let captions = signature_captions(record);
        let caption_lines = captions
            .iter()
            .map(|caption| self.wrap(caption, FaceId::Regular, body, width))
            .collect::<Result<Vec<_>>>()?;
        let rule_height = Pt::from_i32(6);
        let height = self.block_height(&heading_lines, settings.heading_size)
            + sig_box.height
            + rule_height
            + caption_lines
                .iter()
                .map(|lines| self.block_height(lines, body))
                .sum::<Pt>();

        // Heading, box, line and caption always share a page.
        self.flow.ensure_space(height);
        self.place_lines(&heading_lines, FaceId::Bold, settings.heading_size, Pt::ZERO);

        let status = match outcome {
            SignatureOutcome::Embedded(image) => {
                // Bottom-aligned so the strokes sit on the signature line.
                self.flow.advance(sig_box.height - image.height);
                self.flow.place_at(
                    ElementKind::Image {
                        resource_id: image.resource_id.clone(),
                    },
                    Pt::ZERO,
                    image.width,
                    image.height,
                );
                let status = SignatureStatus::Embedded {
                    pixel_width: image.pixel_width,
                    pixel_height: image.pixel_height,
                };
                self.images.insert(image.resource_id.clone(), image);
                status
            }
            SignatureOutcome::Fallback(fallback) => {
                self.flow.advance(sig_box.height - body_line);
                let text_width = self.fonts.measure_face(FaceId::Regular, fallback.text, body);
                self.flow.place_at(
                    ElementKind::text(fallback.text, FaceId::Regular, body),
                    Pt::ZERO,
                    text_width,
                    body_line,
                );
                self.placed_lines += 1;
                SignatureStatus::Fallback {
                    reason: fallback.reason,
                }
            }
        };

        self.flow.place_at(
            ElementKind::Rule {
                thickness: Pt::from_f32(0.75),
                color: Color::BLACK,
            },
            Pt::ZERO,
            sig_box.width,
            rule_height,
        );
        for lines in &caption_lines {
            self.place_lines(lines, FaceId::Regular, body, Pt::ZERO);
        }
        Ok(status)
    }

    fn wrap(&self, text: &str, face: FaceId, size: Pt, width: Pt) -> Result<Vec<Line>> {
        self.wrapper.wrap_face(text, face, size, width)
    }

    /// Height of `lines` as placed: blank lines take half a line.
    fn block_height(&self, lines: &[Line], size: Pt) -> Pt {
        let line_height = self.settings.line_height(size);
        lines
            .iter()
            .map(|line| {
                if line.is_blank() {
                    line_height / 2
                } else {
                    line_height
                }
            })
            .sum()
    }

    fn place_lines(&mut self, lines: &[Line], face: FaceId, size: Pt, indent: Pt) {
        let line_height = self.settings.line_height(size);
        for line in lines {
            if line.is_blank() {
                self.flow.advance(line_height / 2);
                continue;
            }
            self.flow.place_at(
                ElementKind::text(line.text.clone(), face, size),
                indent,
                line.width,
                line_height,
            );
            self.placed_lines += 1;
            self.note_oversized(line);
        }
    }

    fn place_centered(&mut self, lines: &[Line], face: FaceId, size: Pt) {
        let width = self.flow.content_width();
        let line_height = self.settings.line_height(size);
        for line in lines {
            let indent = ((width - line.width) / 2).max(Pt::ZERO);
            self.flow.place_at(
                ElementKind::text(line.text.clone(), face, size),
                indent,
                line.width,
                line_height,
            );
            self.placed_lines += 1;
            self.note_oversized(line);
        }
    }

    fn note_oversized(&mut self, line: &Line) {
        if line.oversized {
            let warning = LayoutWarning::OversizedToken {
                page: self.flow.page_number(),
                token: line.text.clone(),
                width: line.width,
                max_width: self.flow.content_width(),
            };
            self.flow.record_warning(warning);
        }
    }
}

fn footer(settings: &LayoutSettings, fonts: &FontSet, number: usize, total: usize) -> Vec<Element> {
    let size = settings.footer_size;
    let height = settings.line_height(size);
    let page_height = settings.page_size.height;
    let left = settings.margins.left;
    let right = settings.page_size.width - settings.margins.right;
    let y = page_height - settings.margins.bottom + (settings.margins.bottom - height) / 2;
    let gray = Color::gray(0.35);

    let counter = format!("Página {number} de {total}");
    let counter_width = fonts.measure_face(FaceId::Regular, &counter, size);
    let name_width = fonts.measure_face(FaceId::Regular, &settings.practice_name, size);
    let mut furniture = Vec::with_capacity(2);
    if !settings.practice_name.is_empty() {
        furniture.push(Element {
            rect: Rect {
                x: left,
                y,
                width: name_width,
                height,
            },
            kind: ElementKind::TextRun {
                text: settings.practice_name.clone(),
                face: FaceId::Regular,
                size,
                color: gray,
            },
        });
    }
    furniture.push(Element {
        rect: Rect {
            x: right - counter_width,
            y,
            width: counter_width,
            height,
        },
        kind: ElementKind::TextRun {
            text: counter,
            face: FaceId::Regular,
            size,
            color: gray,
        },
    });
    furniture
}

fn or_blank(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() { BLANK_VALUE } else { value }
}

fn declaration_text(record: &ConsentRecord, practice: &str) -> String {
    let d = record.demographics();
    let id_type = if d.id_type.trim().is_empty() {
        "documento"
    } else {
        d.id_type.trim()
    };
    let closing = "declaro que he leído y comprendido la información contenida en este \
                   documento, que he tenido la oportunidad de formular preguntas y que estas \
                   han sido resueltas de manera satisfactoria.";
    if record.is_minor() {
        let (name, id, relation) = match record.guardian() {
            Some(g) => (g.name.as_str(), g.id_number.as_str(), g.relation.as_str()),
            None => ("", "", ""),
        };
        format!(
            "Yo, {}, identificado(a) con documento No. {}, en calidad de {} y representante \
             legal de {}, identificado(a) con {} No. {}, de {} años de edad, {} En consecuencia, \
             otorgo mi consentimiento libre e informado para que el menor participe en el \
             proceso de acompañamiento ofrecido por {}.",
            or_blank(name),
            or_blank(id),
            or_blank(relation),
            or_blank(&d.full_name),
            id_type,
            or_blank(&d.id_number),
            d.age,
            closing,
            or_blank(practice)
        )
    } else {
        format!(
            "Yo, {}, identificado(a) con {} No. {}, mayor de edad, {} En consecuencia, otorgo \
             mi consentimiento libre e informado para participar en el proceso de \
             acompañamiento ofrecido por {}.",
            or_blank(&d.full_name),
            id_type,
            or_blank(&d.id_number),
            closing,
            or_blank(practice)
        )
    }
}

fn signature_captions(record: &ConsentRecord) -> Vec<String> {
    let d = record.demographics();
    let mut captions = Vec::with_capacity(3);
    match (record.is_minor(), record.guardian()) {
        (true, Some(guardian)) => {
            captions.push(format!("{} ({})", or_blank(&guardian.name), or_blank(&guardian.relation)));
            captions.push(format!("Documento No. {}", or_blank(&guardian.id_number)));
            captions.push(format!("En representación de {}", or_blank(&d.full_name)));
        }
        _ => {
            captions.push(or_blank(record.signer_name()).to_string());
            captions.push(format!("Documento No. {}", or_blank(&d.id_number)));
        }
    }
    let submitted = display_timestamp(record);
    if !submitted.is_empty() {
        captions.push(format!("Fecha: {submitted}"));
    }
    captions
}

fn display_timestamp(record: &ConsentRecord) -> String {
    match record.submitted_at() {
        Some(at) => at.format("%d/%m/%Y %H:%M (UTC%:z)").to_string(),
        None => record.submitted_at_iso().trim().to_string(),
    }
}

/// `D:YYYYMMDDHHmmSS` followed by the UTC offset in PDF form.
fn pdf_date(at: DateTime<FixedOffset>) -> String {
    let offset = at.offset().local_minus_utc();
    let zone = if offset == 0 {
        "Z".to_string()
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let minutes = offset.abs() / 60;
        format!("{sign}{:02}'{:02}'", minutes / 60, minutes % 60)
    };
    format!("D:{}{}", at.format("%Y%m%d%H%M%S"), zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;
    use crate::record::{Acceptance, Demographics, Guardian};

    fn record(age: u32, signature: &str) -> ConsentRecord {
        ConsentRecord::new(
            Demographics {
                full_name: "Valentina Ríos".to_string(),
                id_number: "1098765432".to_string(),
                id_type: "TI".to_string(),
                age,
                email: "vale@example.com".to_string(),
                city: "Bucaramanga".to_string(),
                ..Demographics::default()
            },
            Some(Guardian {
                name: "Claudia Ríos".to_string(),
                id_number: "63456789".to_string(),
                relation: "Madre".to_string(),
            }),
            signature,
            "2026-03-02T15:04:05-05:00",
        )
    }

    fn assemble(settings: &LayoutSettings, table: &ClauseTable, record: &ConsentRecord) -> Assembled {
        let fonts = FontSet::standard();
        DocumentAssembler::new(settings, &fonts, table)
            .expect("assembler")
            .assemble(record)
            .expect("assemble")
    }

    #[test]
    fn default_settings_are_valid() {
        LayoutSettings::default().validate().expect("valid defaults");
    }

    #[test]
    fn rejects_settings_that_cannot_be_laid_out() {
        let mut settings = LayoutSettings::default();
        settings.signature_box = Size::new(2000.0, 80.0);
        assert!(matches!(settings.validate(), Err(ConsentPdfError::Configuration(_))));

        let mut settings = LayoutSettings::default();
        settings.line_spacing_permille = 800;
        assert!(settings.validate().is_err());

        let mut settings = LayoutSettings::default();
        settings.margins.bottom = Pt::from_i32(4);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_signature_box_shorter_than_a_body_line() {
        let mut settings = LayoutSettings::default();
        settings.signature_box = Size::new(200.0, 4.0);
        assert!(matches!(settings.validate(), Err(ConsentPdfError::Configuration(_))));
    }

    #[test]
    fn placeholder_stays_below_heading_in_the_tightest_box() {
        let mut settings = LayoutSettings::default();
        let body_line = settings.line_height(settings.body_size);
        settings.signature_box = Size {
            width: Pt::from_i32(200),
            height: body_line,
        };
        settings.validate().expect("one body line is enough");
        let out = assemble(&settings, &ClauseTable::standard(), &record(34, ""));
        let last = out.document.pages.last().expect("page");
        let find = |needle: &str| {
            last.elements
                .iter()
                .find(|e| e.text() == Some(needle))
                .map(|e| e.rect)
                .expect("element")
        };
        let heading = find("FIRMA DEL CONSULTANTE");
        let placeholder = find(crate::signature::SIGNATURE_FALLBACK_TEXT);
        assert!(placeholder.y >= heading.bottom(), "{placeholder:?} overlaps {heading:?}");
    }

    #[test]
    fn recorded_answers_are_listed_per_clause() {
        let acceptance = Acceptance::overall(true)
            .with_clause("confidencialidad", true)
            .with_clause("sesiones", false);
        let rec = record(34, "").with_acceptance(acceptance);
        let out = assemble(&LayoutSettings::default(), &ClauseTable::standard(), &rec);
        let texts: Vec<&str> = out.document.texts().collect();
        let value_after = |label: &str| {
            let index = texts.iter().position(|t| *t == label).expect(label);
            texts[index + 1]
        };
        assert!(texts.contains(&"ACEPTACIÓN DEL CONSENTIMIENTO"));
        assert_eq!(value_after("Aceptación de todas las cláusulas:"), "Acepta");
        assert_eq!(value_after("Confidencialidad:"), "Aceptada");
        assert_eq!(value_after("Sesiones, puntualidad y cancelaciones:"), "No aceptada");
        assert_eq!(value_after("Alcance del servicio:"), "Sin respuesta");
    }

    #[test]
    fn records_without_answers_have_no_acceptance_block() {
        let out = assemble(
            &LayoutSettings::default(),
            &ClauseTable::standard(),
            &record(34, ""),
        );
        assert!(!out.document.contains_text("ACEPTACIÓN DEL CONSENTIMIENTO"));
    }

    #[test]
    fn empty_fields_are_skipped_in_the_summary() {
        let out = assemble(
            &LayoutSettings::default(),
            &ClauseTable::standard(),
            &record(30, ""),
        );
        let doc = &out.document;
        assert!(doc.contains_text("Ciudad:"));
        assert!(doc.contains_text("Bucaramanga"));
        assert!(!doc.contains_text("Dirección:"));
        assert!(!doc.contains_text("Teléfono de emergencia"));
    }

    #[test]
    fn minor_gets_guardian_block_and_guardian_declaration() {
        let out = assemble(
            &LayoutSettings::default(),
            &ClauseTable::standard(),
            &record(15, ""),
        );
        let doc = &out.document;
        assert!(doc.contains_text("DATOS DEL ACUDIENTE O REPRESENTANTE LEGAL"));
        assert!(doc.contains_text("Parentesco:"));
        assert!(doc.texts().any(|t| t.starts_with("Yo, Claudia Ríos")));
        assert!(doc.contains_text("FIRMA DEL ACUDIENTE"));
    }

    #[test]
    fn adult_never_shows_guardian_data() {
        let out = assemble(
            &LayoutSettings::default(),
            &ClauseTable::standard(),
            &record(34, ""),
        );
        let doc = &out.document;
        assert!(!doc.contains_text("ACUDIENTE O REPRESENTANTE"));
        assert!(!doc.contains_text("Claudia"));
        assert!(doc.texts().any(|t| t.starts_with("Yo, Valentina Ríos")));
    }

    #[test]
    fn fallback_signature_is_reported() {
        let out = assemble(
            &LayoutSettings::default(),
            &ClauseTable::standard(),
            &record(34, "data:image/png;base64,!!!invalid!!!"),
        );
        assert!(out.document.contains_text(crate::signature::SIGNATURE_FALLBACK_TEXT));
        assert!(!out.document.has_image());
        assert!(!out.signature.is_embedded());
    }

    #[test]
    fn footers_number_every_page() {
        let long = "palabra ".repeat(900);
        let table = ClauseTable::new(vec![Clause::new("largo", "Cláusula extensa", long)])
            .expect("table");
        let out = assemble(&LayoutSettings::default(), &table, &record(34, ""));
        let total = out.document.page_count();
        assert!(total >= 2);
        for page in &out.document.pages {
            let expected = format!("Página {} de {}", page.index + 1, total);
            assert!(page.furniture.iter().any(|e| e.text() == Some(expected.as_str())));
        }
    }

    #[test]
    fn signature_block_is_kept_on_one_page() {
        let out = assemble(
            &LayoutSettings::default(),
            &ClauseTable::standard(),
            &record(34, ""),
        );
        let last = out.document.pages.last().expect("page");
        assert!(last.contains_text("FIRMA DEL CONSULTANTE"));
        assert!(last.contains_text(crate::signature::SIGNATURE_FALLBACK_TEXT));
        assert!(last.contains_text("Documento No. 1098765432"));
    }

    #[test]
    fn oversized_words_are_reported() {
        let word = "x".repeat(200);
        let table = ClauseTable::new(vec![Clause::new("c", "C", word.clone())]).unwrap();
        let out = assemble(&LayoutSettings::default(), &table, &record(34, ""));
        assert!(out.warnings.iter().any(|w| matches!(
            w,
            LayoutWarning::OversizedToken { token, .. } if *token == word
        )));
    }

    #[test]
    fn pdf_dates_carry_the_offset() {
        let at = DateTime::parse_from_rfc3339("2026-03-02T15:04:05-05:00").unwrap();
        assert_eq!(pdf_date(at), "D:20260302150405-05'00'");
        let utc = DateTime::parse_from_rfc3339("2026-03-02T20:04:05Z").unwrap();
        assert_eq!(pdf_date(utc), "D:20260302200405Z");
    }
}
