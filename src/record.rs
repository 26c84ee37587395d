use crate::error::{ConsentPdfError, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Consultants younger than this sign through a guardian.
pub const MAJORITY_AGE: u32 = 18;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographics {
    pub full_name: String,
    pub id_number: String,
    pub id_type: String,
    pub age: u32,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub department: String,
    pub country: String,
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guardian {
    pub name: String,
    pub id_number: String,
    pub relation: String,
}

impl Guardian {
    fn is_blank(&self) -> bool {
        self.name.trim().is_empty()
            && self.id_number.trim().is_empty()
            && self.relation.trim().is_empty()
    }
}

/// What the signer ticked on the consent form. Forms either ask once for
/// the whole document, per clause, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall: Option<bool>,
    /// Answers keyed by clause id.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub clauses: BTreeMap<String, bool>,
}

/// Keys of a stored acceptance map that answer for the whole document
/// rather than for one clause.
const OVERALL_ACCEPTANCE_KEYS: [&str; 6] = [
    "acepta",
    "aceptado",
    "aceptaTerminos",
    "accepted",
    "all",
    "todas",
];

impl Acceptance {
    pub fn overall(accepted: bool) -> Self {
        Self {
            overall: Some(accepted),
            clauses: BTreeMap::new(),
        }
    }

    pub fn with_clause(mut self, id: impl Into<String>, accepted: bool) -> Self {
        self.clauses.insert(id.into(), accepted);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.overall.is_none() && self.clauses.is_empty()
    }

    pub fn clause(&self, id: &str) -> Option<bool> {
        self.clauses.get(id).copied()
    }

    /// Reads the stored `consentimiento` value: a bare flag, a yes/no
    /// string, or a map of answers. Map entries that are not answers are
    /// skipped.
    fn from_stored(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Bool(accepted) => Ok(Self::overall(accepted)),
            Value::String(text) => parse_answer(&text)
                .map(Self::overall)
                .ok_or_else(|| format!("consent answer '{text}' is neither yes nor no")),
            Value::Object(entries) => {
                let mut acceptance = Self::default();
                for (key, answer) in entries {
                    let answer = match answer {
                        Value::Bool(accepted) => Some(accepted),
                        Value::String(text) => parse_answer(&text),
                        _ => None,
                    };
                    let Some(accepted) = answer else {
                        continue;
                    };
                    if OVERALL_ACCEPTANCE_KEYS.contains(&key.as_str()) {
                        acceptance.overall = Some(accepted);
                    } else {
                        acceptance.clauses.insert(key, accepted);
                    }
                }
                Ok(acceptance)
            }
            other => Err(format!(
                "consent must be a flag or a map of clause answers, got {other}"
            )),
        }
    }
}

fn parse_answer(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "si" | "sí" | "true" | "yes" | "acepto" | "aceptado" | "aceptada" => Some(true),
        "no" | "false" | "no acepto" | "rechazado" | "rechazada" => Some(false),
        _ => None,
    }
}

/// One signed consent. Immutable once built; minor status is decided here
/// and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RecordPayload")]
pub struct ConsentRecord {
    demographics: Demographics,
    guardian: Option<Guardian>,
    is_minor: bool,
    signature_data_uri: String,
    submitted_at_iso: String,
    acceptance: Acceptance,
}

impl ConsentRecord {
    /// Guardian data is kept only for minors.
    pub fn new(
        demographics: Demographics,
        guardian: Option<Guardian>,
        signature_data_uri: impl Into<String>,
        submitted_at_iso: impl Into<String>,
    ) -> Self {
        let is_minor = demographics.age < MAJORITY_AGE;
        Self {
            demographics,
            guardian: guardian.filter(|g| is_minor && !g.is_blank()),
            is_minor,
            signature_data_uri: signature_data_uri.into(),
            submitted_at_iso: submitted_at_iso.into(),
            acceptance: Acceptance::default(),
        }
    }

    pub fn with_acceptance(mut self, acceptance: Acceptance) -> Self {
        self.acceptance = acceptance;
        self
    }

    /// Maps a stored payload (canonical camelCase or the older Spanish
    /// `demograficos` shape) onto a record.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| ConsentPdfError::Validation(err.to_string()))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|err| ConsentPdfError::Validation(err.to_string()))
    }

    pub fn demographics(&self) -> &Demographics {
        &self.demographics
    }

    pub fn guardian(&self) -> Option<&Guardian> {
        self.guardian.as_ref()
    }

    pub fn is_minor(&self) -> bool {
        self.is_minor
    }

    pub fn signature_data_uri(&self) -> &str {
        &self.signature_data_uri
    }

    pub fn submitted_at_iso(&self) -> &str {
        &self.submitted_at_iso
    }

    /// Answers given on the form; empty when the payload carried none.
    pub fn acceptance(&self) -> &Acceptance {
        &self.acceptance
    }

    pub fn submitted_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.submitted_at_iso.trim()).ok()
    }

    /// Name of whoever signs: the guardian for a minor, the consultant
    /// otherwise.
    pub fn signer_name(&self) -> &str {
        match (&self.guardian, self.is_minor) {
            (Some(guardian), true) if !guardian.name.trim().is_empty() => &guardian.name,
            _ => &self.demographics.full_name,
        }
    }

    /// Stable JSON form in the canonical field layout, used to fingerprint
    /// the record in render receipts.
    pub fn canonical_json(&self) -> String {
        let canonical = CanonicalRecord {
            demographics: CanonicalDemographics {
                base: &self.demographics,
                guardian_name: self.guardian.as_ref().map(|g| g.name.as_str()),
                guardian_id: self.guardian.as_ref().map(|g| g.id_number.as_str()),
                guardian_relation: self.guardian.as_ref().map(|g| g.relation.as_str()),
            },
            consent: &self.acceptance,
            signature_data_uri: &self.signature_data_uri,
            submitted_at_iso: &self.submitted_at_iso,
        };
        serde_json::to_string(&canonical).unwrap_or_default()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalRecord<'a> {
    demographics: CanonicalDemographics<'a>,
    #[serde(skip_serializing_if = "Acceptance::is_empty")]
    consent: &'a Acceptance,
    signature_data_uri: &'a str,
    submitted_at_iso: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalDemographics<'a> {
    #[serde(flatten)]
    base: &'a Demographics,
    #[serde(skip_serializing_if = "Option::is_none")]
    guardian_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guardian_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guardian_relation: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordPayload {
    #[serde(alias = "demograficos")]
    demographics: DemographicsPayload,
    #[serde(default, alias = "consentimiento")]
    consent: Option<Value>,
    #[serde(default, alias = "firmaDigital", alias = "firma")]
    signature_data_uri: Option<String>,
    #[serde(default, alias = "fecha", alias = "submittedAt")]
    submitted_at_iso: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct DemographicsPayload {
    #[serde(alias = "nombreCompleto")]
    full_name: Option<String>,
    #[serde(alias = "nombre", alias = "nombres")]
    first_name: Option<String>,
    #[serde(alias = "apellido", alias = "apellidos")]
    last_name: Option<String>,
    #[serde(
        alias = "cedula",
        alias = "numeroDocumento",
        alias = "documento",
        alias = "numeroIdentificacion"
    )]
    id_number: Option<Scalar>,
    #[serde(alias = "tipoDocumento", alias = "tipoIdentificacion")]
    id_type: Option<String>,
    #[serde(alias = "edad")]
    age: Option<Scalar>,
    #[serde(alias = "correo")]
    email: Option<String>,
    #[serde(alias = "telefono", alias = "celular")]
    phone: Option<Scalar>,
    #[serde(alias = "direccion")]
    address: Option<String>,
    #[serde(alias = "ciudad")]
    city: Option<String>,
    #[serde(alias = "departamento")]
    department: Option<String>,
    #[serde(alias = "pais")]
    country: Option<String>,
    #[serde(alias = "contactoEmergencia", alias = "nombreContactoEmergencia")]
    emergency_contact_name: Option<String>,
    #[serde(alias = "telefonoEmergencia", alias = "telefonoContactoEmergencia")]
    emergency_contact_phone: Option<Scalar>,
    #[serde(alias = "nombreAcudiente", alias = "acudiente")]
    guardian_name: Option<String>,
    #[serde(
        alias = "documentoAcudiente",
        alias = "cedulaAcudiente",
        alias = "guardianIdNumber"
    )]
    guardian_id: Option<Scalar>,
    #[serde(alias = "parentesco", alias = "relacionAcudiente")]
    guardian_relation: Option<String>,
}

/// Forms store numbers and phone numbers either as JSON numbers or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Int(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
            Scalar::Text(value) => value.trim().to_string(),
        }
    }

    fn to_age(&self) -> std::result::Result<u32, String> {
        let parsed = match self {
            Scalar::Int(value) => u32::try_from(*value).ok(),
            Scalar::Float(value) if value.fract() == 0.0 && *value >= 0.0 => {
                u32::try_from(*value as u64).ok()
            }
            Scalar::Float(_) => None,
            Scalar::Text(value) => value.trim().parse::<u32>().ok(),
        };
        match parsed {
            Some(age) if age <= 150 => Ok(age),
            _ => Err(format!("age '{}' is not a whole number of years", self.describe())),
        }
    }

    fn describe(&self) -> String {
        match self {
            Scalar::Int(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
            Scalar::Text(value) => value.clone(),
        }
    }
}

impl TryFrom<RecordPayload> for ConsentRecord {
    type Error = String;

    fn try_from(payload: RecordPayload) -> std::result::Result<Self, Self::Error> {
        let d = payload.demographics;
        let age = d
            .age
            .as_ref()
            .ok_or_else(|| "age is required to decide minor status".to_string())?
            .to_age()?;

        let full_name = match d.full_name.map(|name| name.trim().to_string()) {
            Some(name) if !name.is_empty() => name,
            _ => [d.first_name, d.last_name]
                .into_iter()
                .flatten()
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        };

        let text = |value: Option<String>| value.map(|v| v.trim().to_string()).unwrap_or_default();
        let scalar = |value: Option<Scalar>| value.map(Scalar::into_text).unwrap_or_default();

        let demographics = Demographics {
            full_name,
            id_number: scalar(d.id_number),
            id_type: text(d.id_type),
            age,
            email: text(d.email),
            phone: scalar(d.phone),
            address: text(d.address),
            city: text(d.city),
            department: text(d.department),
            country: text(d.country),
            emergency_contact_name: text(d.emergency_contact_name),
            emergency_contact_phone: scalar(d.emergency_contact_phone),
        };
        let guardian = Guardian {
            name: text(d.guardian_name),
            id_number: scalar(d.guardian_id),
            relation: text(d.guardian_relation),
        };

        let acceptance = match payload.consent {
            Some(value) => Acceptance::from_stored(value)?,
            None => Acceptance::default(),
        };

        Ok(ConsentRecord::new(
            demographics,
            Some(guardian),
            payload.signature_data_uri.unwrap_or_default(),
            payload.submitted_at_iso.unwrap_or_default(),
        )
        .with_acceptance(acceptance))
    }
}
