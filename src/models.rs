use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type QuestionId = u32;
pub type SectionId = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QuestionType {
    #[serde(rename = "single")]
    SingleChoice,
    #[serde(rename = "multiple")]
    MultipleSelect,
    #[serde(rename = "text")]
    ShortText,
    #[serde(rename = "essay")]
    Essay,
}

impl QuestionType {
    pub fn has_options(self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultipleSelect)
    }

    pub fn takes_list(self) -> bool {
        self == QuestionType::MultipleSelect
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    pub fn is_filled(&self) -> bool {
        match self {
            AnswerValue::Text(text) => !text.is_empty(),
            AnswerValue::Choices(choices) => !choices.is_empty(),
        }
    }

    pub fn display(&self) -> String {
        match self {
            AnswerValue::Text(text) => text.clone(),
            AnswerValue::Choices(choices) => choices.join(", "),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub section_id: SectionId,
    #[serde(rename = "type")]
    pub q_type: QuestionType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<AnswerValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub id: SectionId,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExamStatus {
    Live,
    Upcoming,
    Locked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub title: String,
    pub course_code: String,
    pub duration_minutes: u32,
    pub total_questions: usize,
    pub total_marks: u32,
    pub status: ExamStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    pub sections: Vec<Section>,
    pub questions: Vec<Question>,
}

impl Exam {
    pub fn duration_secs(&self) -> u64 {
        u64::from(self.duration_minutes) * 60
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
}

impl User {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub title: String,
    pub description: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub issue: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, issue: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            issue: issue.into(),
        }
    }
}

pub fn validate_exam(exam: &Exam) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    if exam.id.trim().is_empty() {
        issues.push(ValidationIssue::new("id", "must not be empty"));
    }
    if exam.title.trim().is_empty() {
        issues.push(ValidationIssue::new("title", "must not be empty"));
    }
    if exam.duration_minutes == 0 {
        issues.push(ValidationIssue::new("durationMinutes", "must be positive"));
    }
    if exam.sections.is_empty() {
        issues.push(ValidationIssue::new("sections", "must contain at least one section"));
    }
    if exam.questions.len() != exam.total_questions {
        issues.push(ValidationIssue::new(
            "questions",
            format!(
                "holds {} questions but totalQuestions is {}",
                exam.questions.len(),
                exam.total_questions
            ),
        ));
    }

    let mut section_ids = HashSet::new();
    for (i, s) in exam.sections.iter().enumerate() {
        if !section_ids.insert(s.id) {
            issues.push(ValidationIssue::new(format!("sections[{i}].id"), "must be unique"));
        }
        if s.title.trim().is_empty() {
            issues.push(ValidationIssue::new(format!("sections[{i}].title"), "must not be empty"));
        }
    }

    let mut question_ids = HashSet::new();
    for (i, q) in exam.questions.iter().enumerate() {
        if q.id == 0 {
            issues.push(ValidationIssue::new(format!("questions[{i}].id"), "must be positive"));
        }
        if !question_ids.insert(q.id) {
            issues.push(ValidationIssue::new(format!("questions[{i}].id"), "must be unique"));
        }
        if !section_ids.contains(&q.section_id) {
            issues.push(ValidationIssue::new(
                format!("questions[{i}].sectionId"),
                "must reference an existing section",
            ));
        }
        if q.text.trim().is_empty() {
            issues.push(ValidationIssue::new(format!("questions[{i}].text"), "must not be empty"));
        }

        match (q.q_type.has_options(), &q.options) {
            (true, None) => issues.push(ValidationIssue::new(
                format!("questions[{i}].options"),
                "is required for single/multiple",
            )),
            (true, Some(opts)) => {
                if opts.is_empty() {
                    issues.push(ValidationIssue::new(
                        format!("questions[{i}].options"),
                        "must contain at least one option",
                    ));
                }
                let mut seen = HashSet::new();
                for (j, opt) in opts.iter().enumerate() {
                    if opt.trim().is_empty() {
                        issues.push(ValidationIssue::new(
                            format!("questions[{i}].options[{j}]"),
                            "must not be empty",
                        ));
                    }
                    if !seen.insert(opt.as_str()) {
                        issues.push(ValidationIssue::new(
                            format!("questions[{i}].options[{j}]"),
                            "must be unique",
                        ));
                    }
                }
            }
            (false, Some(_)) => issues.push(ValidationIssue::new(
                format!("questions[{i}].options"),
                "must be absent for text/essay",
            )),
            (false, None) => {}
        }

        match (&q.correct_answer, q.q_type.takes_list()) {
            (Some(AnswerValue::Text(_)), true) | (Some(AnswerValue::Choices(_)), false) => {
                issues.push(ValidationIssue::new(
                    format!("questions[{i}].correctAnswer"),
                    "must match question type",
                ))
            }
            _ => {}
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
