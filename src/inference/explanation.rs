//! Templated explanation text
//!
//! Maps the predicted disease and a 0-100 severity score onto a fixed
//! severity band and renders a short advisory message.

use serde::Serialize;

/// Qualitative severity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBand {
    Low,
    Moderate,
    High,
}

impl SeverityBand {
    /// `< 20` low, `20..=50` moderate, `> 50` high
    pub fn from_severity(severity: u8) -> Self {
        match severity {
            0..=19 => SeverityBand::Low,
            20..=50 => SeverityBand::Moderate,
            _ => SeverityBand::High,
        }
    }

    pub fn level(&self) -> &'static str {
        match self {
            SeverityBand::Low => "low severity",
            SeverityBand::Moderate => "moderate severity",
            SeverityBand::High => "high severity",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            SeverityBand::Low => {
                "Monitor plant health and maintain proper watering and sunlight."
            }
            SeverityBand::Moderate => {
                "Remove affected leaves and improve airflow to prevent spread."
            }
            SeverityBand::High => {
                "Immediate treatment required. Consider fungicide or professional inspection."
            }
        }
    }
}

/// Severity score from a confidence in [0, 1]: `round(confidence * 100)`
pub fn severity_from_confidence(confidence: f32) -> u8 {
    (confidence * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Human-readable disease name (`_` replaced by spaces)
pub fn display_name(label: &str) -> String {
    label.replace('_', " ")
}

/// Render the explanation for a disease label and severity
pub fn generate_explanation(label: &str, severity: u8) -> String {
    let band = SeverityBand::from_severity(severity);

    format!(
        "\nAI detected {}.\n\n\
         Visual patterns indicate possible disease symptoms localized on leaf surface.\n\n\
         Severity level appears {}. {}\n",
        display_name(label),
        band.level(),
        band.advice()
    )
}
