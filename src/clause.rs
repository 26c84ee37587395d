use crate::error::{ConsentPdfError, Result};
use consent_audit::ClauseDigestInput;
use std::collections::BTreeSet;

/// One clause of the legal template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub id: String,
    pub title: String,
    pub adult_text: String,
    /// Wording used when the consultant is a minor. Falls back to
    /// `adult_text` when absent.
    pub minor_text: Option<String>,
}

impl Clause {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        adult_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            adult_text: adult_text.into(),
            minor_text: None,
        }
    }

    pub fn with_minor_text(mut self, text: impl Into<String>) -> Self {
        self.minor_text = Some(text.into());
        self
    }

    pub fn select_text(&self, is_minor: bool) -> &str {
        select_text(self, is_minor)
    }
}

pub fn select_text(clause: &Clause, is_minor: bool) -> &str {
    match (&clause.minor_text, is_minor) {
        (Some(minor), true) => minor,
        _ => &clause.adult_text,
    }
}

/// Ordered clause set. The order is the rendering order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseTable {
    clauses: Vec<Clause>,
}

impl ClauseTable {
    pub fn new(clauses: Vec<Clause>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for clause in &clauses {
            if clause.id.trim().is_empty() {
                return Err(ConsentPdfError::Configuration(
                    "clause id must not be empty".to_string(),
                ));
            }
            if !seen.insert(clause.id.as_str()) {
                return Err(ConsentPdfError::Configuration(format!(
                    "duplicate clause id '{}'",
                    clause.id
                )));
            }
            if clause.adult_text.trim().is_empty() {
                return Err(ConsentPdfError::Configuration(format!(
                    "clause '{}' has no text",
                    clause.id
                )));
            }
        }
        Ok(Self { clauses })
    }

    /// The practice's standard informed-consent clauses.
    pub fn standard() -> Self {
        let clauses = STANDARD_CLAUSES
            .iter()
            .map(|(id, title, adult, minor)| Clause {
                id: (*id).to_string(),
                title: (*title).to_string(),
                adult_text: (*adult).to_string(),
                minor_text: minor.map(str::to_string),
            })
            .collect();
        Self { clauses }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Clause> {
        self.clauses.iter()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Clause> {
        self.clauses.iter().find(|clause| clause.id == id)
    }

    /// SHA-256 over every clause, in order. Changes whenever any wording,
    /// title or the order changes.
    pub fn fingerprint(&self) -> String {
        consent_audit::template_fingerprint_sha256(self.clauses.iter().map(|clause| {
            ClauseDigestInput {
                id: &clause.id,
                title: &clause.title,
                adult_text: &clause.adult_text,
                minor_text: clause.minor_text.as_deref(),
            }
        }))
    }
}

impl<'a> IntoIterator for &'a ClauseTable {
    type Item = &'a Clause;
    type IntoIter = std::slice::Iter<'a, Clause>;

    fn into_iter(self) -> Self::IntoIter {
        self.clauses.iter()
    }
}

type StaticClause = (&'static str, &'static str, &'static str, Option<&'static str>);

const STANDARD_CLAUSES: &[StaticClause] = &[
    (
        "naturaleza",
        "Naturaleza del proceso",
        "El proceso de acompañamiento terapéutico consiste en un espacio de escucha, \
         orientación y trabajo personal conducido por un profesional. Se desarrolla a \
         través de sesiones individuales en las que se exploran pensamientos, emociones \
         y situaciones de vida con el propósito de favorecer el bienestar del consultante.",
        Some(
            "El proceso de acompañamiento terapéutico del menor consiste en un espacio de \
             escucha, orientación y trabajo personal conducido por un profesional, adaptado \
             a su edad y etapa de desarrollo. El acudiente o representante legal será \
             informado de los objetivos generales del proceso y podrá ser convocado a \
             sesiones de orientación familiar cuando el profesional lo considere pertinente.",
        ),
    ),
    (
        "objetivos",
        "Objetivos y alcance",
        "Los objetivos del proceso se acuerdan entre el consultante y el profesional y \
         pueden ajustarse a lo largo del acompañamiento. El profesional no garantiza \
         resultados específicos, pues estos dependen de múltiples factores, entre ellos \
         la participación activa del consultante.",
        None,
    ),
    (
        "confidencialidad",
        "Confidencialidad",
        "La información compartida durante las sesiones es confidencial y está protegida \
         por el secreto profesional. No será revelada a terceros sin la autorización \
         expresa y por escrito del consultante.",
        Some(
            "La información compartida por el menor durante las sesiones es confidencial y \
             está protegida por el secreto profesional. El acudiente o representante legal \
             recibirá información general sobre la evolución del proceso, sin que se revele \
             el contenido detallado de las conversaciones, salvo en las excepciones previstas \
             en la cláusula siguiente.",
        ),
    ),
    (
        "limites",
        "Límites de la confidencialidad",
        "El secreto profesional podrá levantarse cuando exista riesgo grave para la vida o \
         la integridad del consultante o de terceros, cuando lo ordene una autoridad judicial \
         competente o cuando la ley así lo exija. En tales casos solo se compartirá la \
         información estrictamente necesaria.",
        Some(
            "El secreto profesional podrá levantarse cuando exista riesgo grave para la vida o \
             la integridad del menor o de terceros, cuando se tenga conocimiento de situaciones \
             de abuso, maltrato o vulneración de derechos, que serán puestas en conocimiento del \
             acudiente y de las autoridades competentes, o cuando lo ordene una autoridad judicial.",
        ),
    ),
    (
        "voluntariedad",
        "Participación voluntaria y retiro",
        "La participación en el proceso es voluntaria. El consultante puede retirar su \
         consentimiento y dar por terminado el acompañamiento en cualquier momento, sin \
         que ello genere sanción alguna, informándolo preferiblemente con antelación.",
        Some(
            "La participación del menor en el proceso es voluntaria y se respetará su opinión \
             según su grado de madurez. El acudiente o representante legal puede retirar el \
             consentimiento en cualquier momento, informándolo preferiblemente con antelación.",
        ),
    ),
    (
        "beneficios_riesgos",
        "Beneficios y posibles incomodidades",
        "El proceso puede contribuir a una mayor comprensión de sí mismo, al manejo de \
         emociones y a la toma de decisiones. En algunos momentos pueden surgir emociones \
         intensas o incómodas al abordar situaciones personales, lo cual forma parte \
         habitual del trabajo terapéutico y será acompañado por el profesional.",
        None,
    ),
    (
        "sesiones",
        "Sesiones, puntualidad y cancelaciones",
        "Las sesiones tienen una duración aproximada de cincuenta minutos y se programan \
         de común acuerdo. Las cancelaciones deben informarse con al menos veinticuatro \
         horas de anticipación; de lo contrario, la sesión podrá considerarse realizada.",
        None,
    ),
    (
        "alcance",
        "Alcance del servicio",
        "Este servicio no constituye atención de urgencias. En caso de crisis o emergencia, \
         el consultante se compromete a acudir a los servicios de urgencias de su localidad \
         o a las líneas de atención dispuestas por las autoridades de salud.",
        Some(
            "Este servicio no constituye atención de urgencias. En caso de crisis o emergencia \
             del menor, el acudiente se compromete a acudir a los servicios de urgencias de su \
             localidad o a las líneas de atención dispuestas por las autoridades de salud.",
        ),
    ),
    (
        "datos_personales",
        "Tratamiento de datos personales",
        "El consultante autoriza el tratamiento de sus datos personales, incluidos los datos \
         sensibles relacionados con su salud, con la finalidad exclusiva de prestar el servicio, \
         llevar la historia del proceso y contactarle. Puede conocer, actualizar, rectificar \
         y solicitar la supresión de sus datos en cualquier momento.",
        Some(
            "El acudiente o representante legal autoriza el tratamiento de los datos personales \
             del menor, incluidos los datos sensibles relacionados con su salud, con la finalidad \
             exclusiva de prestar el servicio, llevar la historia del proceso y contactar al \
             acudiente. Se respetará en todo momento el interés superior del menor.",
        ),
    ),
    (
        "registro_digital",
        "Firma y registro digital",
        "El consultante acepta que este documento se diligencie y firme por medios digitales, \
         y que la firma manuscrita capturada en pantalla tenga la misma validez que su firma \
         sobre papel. Una copia del documento firmado le será enviada al correo electrónico \
         registrado.",
        Some(
            "El acudiente o representante legal acepta que este documento se diligencie y firme \
             por medios digitales, y que la firma manuscrita capturada en pantalla tenga la misma \
             validez que su firma sobre papel. Una copia del documento firmado le será enviada al \
             correo electrónico registrado.",
        ),
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_variant_only_for_minors() {
        let clause = Clause::new("c", "Título", "adulto").with_minor_text("menor");
        assert_eq!(select_text(&clause, false), "adulto");
        assert_eq!(select_text(&clause, true), "menor");
    }

    #[test]
    fn missing_minor_variant_falls_back_to_adult_text() {
        let clause = Clause::new("c", "Título", "adulto");
        assert_eq!(clause.select_text(true), "adulto");
    }

    #[test]
    fn standard_table_is_valid_and_ordered() {
        let table = ClauseTable::standard();
        assert!(!table.is_empty());
        let rebuilt = ClauseTable::new(table.iter().cloned().collect()).expect("valid table");
        assert_eq!(rebuilt, table);
        assert_eq!(table.iter().next().map(|c| c.id.as_str()), Some("naturaleza"));
        assert!(table.get("confidencialidad").is_some());
        assert!(table.iter().any(|c| c.minor_text.is_some()));
        assert!(table.iter().any(|c| c.minor_text.is_none()));
    }

    #[test]
    fn rejects_duplicate_and_empty_ids() {
        let dup = vec![
            Clause::new("a", "A", "uno"),
            Clause::new("a", "B", "dos"),
        ];
        assert!(matches!(
            ClauseTable::new(dup),
            Err(ConsentPdfError::Configuration(_))
        ));
        assert!(matches!(
            ClauseTable::new(vec![Clause::new(" ", "A", "uno")]),
            Err(ConsentPdfError::Configuration(_))
        ));
        assert!(matches!(
            ClauseTable::new(vec![Clause::new("a", "A", "")]),
            Err(ConsentPdfError::Configuration(_))
        ));
    }

    #[test]
    fn fingerprint_follows_wording_and_order() {
        let a = Clause::new("a", "A", "uno");
        let b = Clause::new("b", "B", "dos");
        let ab = ClauseTable::new(vec![a.clone(), b.clone()]).unwrap();
        let ba = ClauseTable::new(vec![b.clone(), a.clone()]).unwrap();
        let reworded =
            ClauseTable::new(vec![a.clone(), b.clone().with_minor_text("tres")]).unwrap();
        assert_eq!(ab.fingerprint(), ab.clone().fingerprint());
        assert_ne!(ab.fingerprint(), ba.fingerprint());
        assert_ne!(ab.fingerprint(), reworded.fingerprint());
        assert_eq!(ab.fingerprint().len(), 64);
    }
}
