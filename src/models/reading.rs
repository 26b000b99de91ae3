use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SubjectId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Device,
    Manual,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Device => "device",
            SourceKind::Manual => "manual",
        }
    }
}

/// Vital signs captured in one reading. Every field is optional because
/// kiosks and nurses both submit partial measurements.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalSigns {
    /// `systolic/diastolic`, e.g. `120/80`.
    pub blood_pressure: Option<String>,
    /// Celsius.
    pub temperature: Option<f64>,
    pub spo2: Option<f64>,
    pub heart_rate: Option<f64>,
}

/// A timestamped vitals payload produced outside the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Backend record id, when the source has one.
    pub record_id: Option<String>,
    pub subject_id: SubjectId,
    pub source: SourceKind,
    pub captured_at: DateTime<Utc>,
    pub values: VitalSigns,
}

impl Reading {
    pub fn new(
        subject_id: SubjectId,
        source: SourceKind,
        captured_at: DateTime<Utc>,
        values: VitalSigns,
    ) -> Self {
        Self {
            record_id: None,
            subject_id,
            source,
            captured_at,
            values,
        }
    }

    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }
}
