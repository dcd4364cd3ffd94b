use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RfpId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequirementId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RfpStatus {
    New,
    InProgress,
    Review,
    Submitted,
    Archived,
}

impl RfpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Submitted => "submitted",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "in_progress" => Some(Self::InProgress),
            "review" => Some(Self::Review),
            "submitted" => Some(Self::Submitted),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rfp {
    pub id: RfpId,
    pub title: String,
    pub client_name: String,
    pub status: RfpStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_value: Option<Decimal>,
    pub document_text: String,
    pub created_at: DateTime<Utc>,
}

impl Rfp {
    /// Leading slice of the source document used in prompts.
    pub fn excerpt(&self, max_chars: usize) -> &str {
        match self.document_text.char_indices().nth(max_chars) {
            Some((index, _)) => &self.document_text[..index],
            None => &self.document_text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: RequirementId,
    pub rfp_id: RfpId,
    pub category: String,
    pub section: Option<String>,
    pub text: String,
    pub mandatory: bool,
    pub quantity: Option<u32>,
    pub unit: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Rfp, RfpId, RfpStatus};

    #[test]
    fn rfp_status_round_trips_from_storage_encoding() {
        let cases = [
            RfpStatus::New,
            RfpStatus::InProgress,
            RfpStatus::Review,
            RfpStatus::Submitted,
            RfpStatus::Archived,
        ];

        for status in cases {
            assert_eq!(RfpStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let rfp = Rfp {
            id: RfpId("RFP-1".to_string()),
            title: "Cable supply".to_string(),
            client_name: "Metro Rail".to_string(),
            status: RfpStatus::New,
            deadline: None,
            estimated_value: None,
            document_text: "Kabel für Außenanlagen".to_string(),
            created_at: Utc::now(),
        };

        assert_eq!(rfp.excerpt(5), "Kabel");
        assert_eq!(rfp.excerpt(500), rfp.document_text);
    }
}
