//! Question payloads and answer verdicts
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Open,
    MultipleChoice,
}

/// Question document served by `GET /questions/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionData {
    /// Score category, e.g. `triangle`.
    #[serde(default)]
    pub shape: String,
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub answer: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_option_index: i32,
    #[serde(default)]
    pub image_filename: String,
    #[serde(default)]
    pub points: i32,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("malformed question payload: {source}; raw: {raw}")]
    Malformed {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

/// What the question-rendering surface needs to display a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionPrompt {
    pub question_type: QuestionType,
    pub text: String,
    pub options: Vec<String>,
    pub image_path: Option<String>,
}

/// Verdict reported back by the question surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerVerdict {
    pub correct: bool,
    pub points: i32,
    pub category: String,
}

impl AnswerVerdict {
    #[must_use]
    pub fn correct(points: i32, category: impl Into<String>) -> Self {
        Self {
            correct: true,
            points,
            category: category.into(),
        }
    }

    #[must_use]
    pub fn incorrect() -> Self {
        Self {
            correct: false,
            points: 0,
            category: String::new(),
        }
    }
}

impl QuestionData {
    /// Parse a question payload, keeping the raw body for diagnosis on failure.
    ///
    /// # Errors
    ///
    /// Returns [`QuestionError::Malformed`] if the payload is not a valid question.
    pub fn from_json(raw: &str) -> Result<Self, QuestionError> {
        serde_json::from_str(raw).map_err(|source| {
            log::warn!("Failed to parse question payload: {source}; raw: {raw}");
            QuestionError::Malformed {
                raw: raw.to_string(),
                source,
            }
        })
    }

    /// Exact comparison against the expected answer.
    #[must_use]
    pub fn is_correct(&self, answer: &str) -> bool {
        self.answer == answer
    }

    /// Score an answer into the verdict the session consumes.
    #[must_use]
    pub fn verdict(&self, answer: &str) -> AnswerVerdict {
        if self.is_correct(answer) {
            AnswerVerdict::correct(self.points, self.shape.clone())
        } else {
            AnswerVerdict::incorrect()
        }
    }

    #[must_use]
    pub fn prompt(&self) -> QuestionPrompt {
        let image = self.image_filename.trim();
        QuestionPrompt {
            question_type: self.question_type,
            text: self.question_text.clone(),
            options: self.options.clone(),
            image_path: (!image.is_empty()).then(|| image.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPLE: &str = r#"{
        "shape": "triangle",
        "question_text": "How many sides does a triangle have?",
        "question_type": "multiple_choice",
        "answer": "3",
        "options": ["2", "3", "4"],
        "correct_option_index": 1,
        "image_filename": "triangle.png",
        "points": 10
    }"#;

    #[test]
    fn parses_backend_question() {
        let question = QuestionData::from_json(MULTIPLE).unwrap();
        assert_eq!(question.question_type, QuestionType::MultipleChoice);
        assert_eq!(question.options.len(), 3);
        let prompt = question.prompt();
        assert_eq!(prompt.image_path.as_deref(), Some("triangle.png"));
        assert_eq!(prompt.options[question.correct_option_index as usize], "3");
    }

    #[test]
    fn open_question_tolerates_null_options() {
        let raw = r#"{"question_text": "2+2?", "question_type": "open", "answer": "4",
                      "options": null, "image_filename": "", "points": 5, "shape": "square"}"#;
        let question = QuestionData::from_json(raw).unwrap();
        assert!(question.options.is_empty());
        assert!(question.prompt().image_path.is_none());
        assert_eq!(question.verdict("4"), AnswerVerdict::correct(5, "square"));
        assert_eq!(question.verdict(" 4"), AnswerVerdict::incorrect());
    }

    #[test]
    fn malformed_payload_keeps_raw_body() {
        let raw = r#"{"question_text": "x", "question_type": "essay"}"#;
        let Err(QuestionError::Malformed { raw: kept, .. }) = QuestionData::from_json(raw) else {
            panic!("expected malformed error");
        };
        assert_eq!(kept, raw);
    }
}
