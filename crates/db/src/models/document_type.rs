use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Kinds of business documents that receive sequential numbers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Contract,
    HrDocument,
}

impl DocumentType {
    /// The short prefix embedded in issued document numbers.
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "INV",
            DocumentType::Contract => "CON",
            DocumentType::HrDocument => "HR",
        }
    }

    /// Resolve a prefix string back to its document type.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "INV" => Some(DocumentType::Invoice),
            "CON" => Some(DocumentType::Contract),
            "HR" => Some(DocumentType::HrDocument),
            _ => None,
        }
    }
}
