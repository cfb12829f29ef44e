use crate::catalog::ExamCatalog;
use crate::models::{AnswerValue, QuestionId};
use crate::session::{SubmitReason, Submission};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownItem {
    pub question_id: QuestionId,
    pub question: String,
    pub your_answer: Option<String>,
    pub reference_answer: Option<String>,
    pub flagged: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsReport {
    pub exam_id: String,
    pub exam_title: String,
    pub course_code: String,
    pub total_questions: usize,
    pub total_marks: u32,
    pub answered: usize,
    pub unanswered: usize,
    pub flagged: usize,
    pub time_taken: String,
    pub reason: SubmitReason,
    pub submitted_at: String,
    pub breakdown: Vec<BreakdownItem>,
}

pub fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn build_report(catalog: &ExamCatalog, submission: &Submission) -> ResultsReport {
    let answers: HashMap<QuestionId, &AnswerValue> =
        submission.answers.iter().map(|(id, v)| (*id, v)).collect();
    let exam = catalog.exam();
    let breakdown = catalog
        .questions()
        .iter()
        .map(|q| BreakdownItem {
            question_id: q.id,
            question: q.text.clone(),
            your_answer: answers
                .get(&q.id)
                .filter(|v| v.is_filled())
                .map(|v| v.display()),
            reference_answer: q.correct_answer.as_ref().map(AnswerValue::display),
            flagged: submission.flagged.contains(&q.id),
        })
        .collect();

    ResultsReport {
        exam_id: exam.id.clone(),
        exam_title: exam.title.clone(),
        course_code: exam.course_code.clone(),
        total_questions: exam.total_questions,
        total_marks: exam.total_marks,
        answered: submission.answered,
        unanswered: submission.unanswered,
        flagged: submission.flagged.len(),
        time_taken: format_elapsed(submission.elapsed_secs),
        reason: submission.reason,
        submitted_at: submission.submitted_at.to_rfc3339(),
        breakdown,
    }
}
