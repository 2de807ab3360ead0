use serde::{Deserialize, Serialize};

/// One piece of promotional knowledge. Its position in the store is its only
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    pub content: String,
}

impl Record {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Body of `POST /api/save`. Both fields are optional on the wire so that a
/// missing field is reported as a validation error rather than a parse error.
#[derive(Debug, Deserialize)]
pub struct SaveRecordRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl From<SaveRecordRequest> for Record {
    fn from(req: SaveRecordRequest) -> Self {
        Record::new(req.title.unwrap_or_default(), req.content.unwrap_or_default())
    }
}
