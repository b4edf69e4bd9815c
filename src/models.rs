use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const UNTITLED: &str = "Untitled";

/// Result envelope returned by every note operation.
///
/// `success` is the only field callers should trust before reading the rest;
/// `error_messages` only ever grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub success: bool,
    pub summary: String,
    pub content: String,
    pub related_concepts: Vec<String>,
    #[serde(default)]
    pub qa: Vec<QaPair>,
    #[serde(default)]
    pub error_messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl Note {
    // Unsuccessful envelope that still carries the caller's input
    pub fn failed(content: impl Into<String>, message: impl Into<String>) -> Self {
        let mut note = Self {
            title: UNTITLED.to_string(),
            success: false,
            summary: String::new(),
            content: content.into(),
            related_concepts: Vec::new(),
            qa: Vec::new(),
            error_messages: Vec::new(),
        };
        note.push_error(message);
        note
    }

    /// Record a failure cause. Repeated causes are kept once.
    pub fn push_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.error_messages.contains(&message) {
            self.error_messages.push(message);
        }
    }

    /// Decode a note that is already structured JSON. Missing fields fall
    /// back to empty values; Q&A entries without both halves are dropped.
    pub fn from_json_lenient(raw: &str) -> Result<Self, serde_json::Error> {
        let loose: LooseNote = serde_json::from_str(raw)?;
        Ok(Self {
            title: loose.title,
            success: true,
            summary: loose.summary,
            content: loose.content,
            related_concepts: loose.related_concepts,
            qa: loose
                .qa
                .into_iter()
                .filter_map(|item| match (item.question, item.answer) {
                    (Some(question), Some(answer)) => Some(QaPair { question, answer }),
                    _ => None,
                })
                .collect(),
            error_messages: Vec::new(),
        })
    }

    /// Schema handed to the model when extracting a note.
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "success": { "type": "boolean" },
                "summary": { "type": "string" },
                "content": { "type": "string" },
                "related_concepts": { "type": "array", "items": { "type": "string" } },
                "qa": qa_items_schema(),
                "error_messages": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title", "success", "summary", "content", "related_concepts"]
        })
    }
}

fn default_title() -> String {
    UNTITLED.to_string()
}

#[derive(Deserialize)]
struct LooseNote {
    #[serde(default = "default_title")]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    related_concepts: Vec<String>,
    #[serde(default)]
    qa: Vec<LooseQa>,
}

#[derive(Deserialize)]
struct LooseQa {
    question: Option<String>,
    answer: Option<String>,
}

// Structured extraction of a scraped article
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractedArticle {
    pub title: String,
    pub success: bool,
    pub summary: String,
    pub content: String,
    pub related_concepts: Vec<String>,
    #[serde(default)]
    pub error_messages: Vec<String>,
}

impl ExtractedArticle {
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "success": { "type": "boolean" },
                "summary": { "type": "string" },
                "content": { "type": "string" },
                "related_concepts": { "type": "array", "items": { "type": "string" } },
                "error_messages": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title", "success", "summary", "content", "related_concepts"]
        })
    }
}

impl From<ExtractedArticle> for Note {
    fn from(article: ExtractedArticle) -> Self {
        Self {
            title: article.title,
            success: article.success,
            summary: article.summary,
            content: article.content,
            related_concepts: article.related_concepts,
            qa: Vec::new(),
            error_messages: article.error_messages,
        }
    }
}

// Generated question / answer set
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QaSet {
    pub qa: Vec<QaPair>,
}

impl QaSet {
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": { "qa": qa_items_schema() },
            "required": ["qa"]
        })
    }
}

fn qa_items_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "answer": { "type": "string" }
            },
            "required": ["question", "answer"]
        }
    })
}

// Body of the scrape / parse endpoints
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub raw_content: String,
}

// Raw model output, validated by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_decode_keeps_every_field() {
        let raw = json!({
            "title": "Parsed Note",
            "summary": "Summary",
            "content": "Content",
            "related_concepts": ["A", "B"],
            "qa": [{ "question": "Q1", "answer": "A1" }]
        })
        .to_string();

        let note = Note::from_json_lenient(&raw).unwrap();

        assert!(note.success);
        assert_eq!(note.title, "Parsed Note");
        assert_eq!(note.summary, "Summary");
        assert_eq!(note.content, "Content");
        assert_eq!(note.related_concepts, vec!["A", "B"]);
        assert_eq!(
            note.qa,
            vec![QaPair {
                question: "Q1".into(),
                answer: "A1".into()
            }]
        );
        assert!(note.error_messages.is_empty());
    }

    #[test]
    fn lenient_decode_fills_defaults_and_drops_half_pairs() {
        let raw = r#"{"qa": [{"question": "orphan"}, {"question": "q", "answer": "a"}]}"#;
        let note = Note::from_json_lenient(raw).unwrap();

        assert_eq!(note.title, UNTITLED);
        assert_eq!(note.content, "");
        assert_eq!(note.qa.len(), 1);
    }

    #[test]
    fn lenient_decode_rejects_non_objects() {
        assert!(Note::from_json_lenient("invalid json").is_err());
        assert!(Note::from_json_lenient("[1, 2]").is_err());
    }

    #[test]
    fn push_error_ignores_duplicates() {
        let mut note = Note::failed("raw", "first");
        note.push_error("second");
        note.push_error("first");

        assert_eq!(note.error_messages, vec!["first", "second"]);
        assert_eq!(note.content, "raw");
        assert!(!note.success);
    }

    #[test]
    fn remote_note_requires_core_fields() {
        let missing = r#"{"title": "t", "success": true}"#;
        assert!(serde_json::from_str::<Note>(missing).is_err());

        let full = json!({
            "title": "t",
            "success": true,
            "summary": "s",
            "content": "c",
            "related_concepts": []
        });
        let note: Note = serde_json::from_value(full).unwrap();
        assert!(note.qa.is_empty());
    }
}
