use crate::answers::AnswerStore;
use crate::catalog::ExamCatalog;
use crate::cursor::Cursor;
use crate::error::SessionError;
use crate::flags::FlagStore;
use crate::models::{AnswerValue, Question, QuestionId, QuestionType, Section};
use crate::timer::{Clock, Countdown, Tick};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitReason {
    Confirmed,
    TimeExpired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub session_id: String,
    pub exam_id: String,
    pub reason: SubmitReason,
    pub answered: usize,
    pub unanswered: usize,
    pub flagged: Vec<QuestionId>,
    pub elapsed_secs: u64,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub answers: Vec<(QuestionId, AnswerValue)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPrompt {
    pub unanswered: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Running(u64),
    Submitted(Submission),
    Idle,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridEntry {
    pub question_id: QuestionId,
    pub number: usize,
    pub answered: bool,
    pub flagged: bool,
    pub current: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionGrid {
    pub section_id: u32,
    pub title: String,
    pub entries: Vec<GridEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRow {
    pub question_id: QuestionId,
    pub number: usize,
    pub section: String,
    pub text: String,
    pub answered: bool,
    pub flagged: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentQuestion {
    pub number: usize,
    pub section: Option<Section>,
    pub question: Question,
    pub answer: Option<AnswerValue>,
    pub flagged: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub exam_id: String,
    pub exam_title: String,
    pub cursor: Cursor,
    pub remaining_secs: u64,
    pub clock: Clock,
    pub clock_text: String,
    pub total_questions: usize,
    pub answered: usize,
    pub confirm_open: bool,
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentQuestion>,
    pub grid: Vec<SectionGrid>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub review: Vec<ReviewRow>,
}

#[derive(Debug)]
pub struct ExamSession {
    id: String,
    catalog: Arc<ExamCatalog>,
    cursor: Cursor,
    answers: AnswerStore,
    flags: FlagStore,
    countdown: Countdown,
    duration_secs: u64,
    confirm_open: bool,
    started_at: DateTime<Utc>,
    submitted: Option<SubmitReason>,
}

impl ExamSession {
    pub fn new(id: impl Into<String>, catalog: Arc<ExamCatalog>) -> Self {
        Self::with_duration(id, catalog.exam().duration_secs(), catalog)
    }

    pub fn with_duration(id: impl Into<String>, seconds: u64, catalog: Arc<ExamCatalog>) -> Self {
        Self {
            id: id.into(),
            catalog,
            cursor: Cursor::default(),
            answers: AnswerStore::new(),
            flags: FlagStore::new(),
            countdown: Countdown::new(seconds),
            duration_secs: seconds,
            confirm_open: false,
            started_at: Utc::now(),
            submitted: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn exam_id(&self) -> &str {
        self.catalog.id()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn remaining_secs(&self) -> u64 {
        self.countdown.remaining()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.is_some()
    }

    pub fn is_confirm_open(&self) -> bool {
        self.confirm_open
    }

    pub fn answer(&self, question_id: QuestionId) -> Option<&AnswerValue> {
        self.answers.get(question_id)
    }

    pub fn is_flagged(&self, question_id: QuestionId) -> bool {
        self.flags.is_flagged(question_id)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.cursor.index().and_then(|idx| self.catalog.question_at(idx))
    }

    pub fn current_section(&self) -> Option<&Section> {
        self.current_question().and_then(|q| self.catalog.section_of(q))
    }

    pub fn answered_count(&self) -> usize {
        self.answers.answered_count()
    }

    pub fn total_questions(&self) -> usize {
        self.catalog.exam().total_questions
    }

    pub fn unanswered_count(&self) -> usize {
        self.total_questions().saturating_sub(self.answered_count())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.submitted.is_some() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn lookup(&self, question_id: QuestionId) -> Result<&Question, SessionError> {
        self.catalog.question(question_id).ok_or_else(|| {
            error!(session = %self.id, question_id, "question id outside the catalog");
            SessionError::UnknownQuestion(question_id)
        })
    }

    pub fn set_answer(&mut self, question_id: QuestionId, value: AnswerValue) -> Result<(), SessionError> {
        self.ensure_open()?;
        let question = self.lookup(question_id)?;
        check_answer(question, &value)?;
        self.answers.set(question_id, value);
        Ok(())
    }

    pub fn select_option(&mut self, question_id: QuestionId, option: &str, checked: bool) -> Result<&AnswerValue, SessionError> {
        self.ensure_open()?;
        let question = self.lookup(question_id)?;
        if question.q_type != QuestionType::MultipleSelect {
            return Err(SessionError::NotMultipleSelect {
                question_id,
                q_type: question.q_type,
            });
        }
        if !is_option(question, option) {
            return Err(SessionError::UnknownOption {
                question_id,
                option: option.to_string(),
            });
        }
        Ok(self.answers.select_option(question_id, option, checked))
    }

    pub fn toggle_flag(&mut self, question_id: QuestionId) -> Result<bool, SessionError> {
        self.ensure_open()?;
        self.lookup(question_id)?;
        Ok(self.flags.toggle(question_id))
    }

    pub fn next(&mut self) -> Result<Cursor, SessionError> {
        self.ensure_open()?;
        self.cursor = self.cursor.next(self.catalog.len());
        Ok(self.cursor)
    }

    pub fn previous(&mut self) -> Result<Cursor, SessionError> {
        self.ensure_open()?;
        self.cursor = self.cursor.previous();
        Ok(self.cursor)
    }

    pub fn jump_to(&mut self, question_id: QuestionId) -> Result<Cursor, SessionError> {
        self.ensure_open()?;
        let index = self.catalog.index_of(question_id).ok_or_else(|| {
            error!(session = %self.id, question_id, "jump to a question outside the catalog");
            SessionError::UnknownQuestion(question_id)
        })?;
        self.cursor = self.cursor.jump(index);
        Ok(self.cursor)
    }

    pub fn request_submit(&mut self) -> Result<SubmitPrompt, SessionError> {
        self.ensure_open()?;
        self.confirm_open = true;
        Ok(SubmitPrompt {
            unanswered: self.unanswered_count(),
        })
    }

    pub fn cancel_submit(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.confirm_open = false;
        Ok(())
    }

    pub fn confirm_submit(&mut self) -> Result<Submission, SessionError> {
        self.ensure_open()?;
        if !self.confirm_open {
            return Err(SessionError::SubmitNotRequested);
        }
        Ok(self.finish(SubmitReason::Confirmed))
    }

    /// Advances the countdown by one period. Reaching zero submits the session.
    pub fn tick(&mut self) -> TickOutcome {
        if self.submitted.is_some() {
            return TickOutcome::Idle;
        }
        match self.countdown.tick() {
            Tick::Running(remaining) => TickOutcome::Running(remaining),
            Tick::Expired => TickOutcome::Submitted(self.finish(SubmitReason::TimeExpired)),
            Tick::Stopped => TickOutcome::Idle,
        }
    }

    fn finish(&mut self, reason: SubmitReason) -> Submission {
        self.countdown.stop();
        self.confirm_open = false;
        self.submitted = Some(reason);

        let mut answers: Vec<_> = self.answers.iter().map(|(id, v)| (id, v.clone())).collect();
        answers.sort_by_key(|(id, _)| *id);
        let submission = Submission {
            session_id: self.id.clone(),
            exam_id: self.catalog.id().to_string(),
            reason,
            answered: self.answered_count(),
            unanswered: self.unanswered_count(),
            flagged: self.flags.ids(),
            elapsed_secs: self.duration_secs.saturating_sub(self.countdown.remaining()),
            started_at: self.started_at,
            submitted_at: Utc::now(),
            answers,
        };
        info!(
            session = %self.id,
            exam = %submission.exam_id,
            reason = ?reason,
            answered = submission.answered,
            "exam session submitted"
        );
        submission
    }

    pub fn grid(&self) -> Vec<SectionGrid> {
        let current = self.cursor.index();
        self.catalog
            .by_section()
            .into_iter()
            .map(|group| SectionGrid {
                section_id: group.section.id,
                title: group.section.title.clone(),
                entries: group
                    .questions
                    .iter()
                    .map(|(idx, q)| GridEntry {
                        question_id: q.id,
                        number: idx + 1,
                        answered: self.answers.is_answered(q.id),
                        flagged: self.flags.is_flagged(q.id),
                        current: current == Some(*idx),
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn review_rows(&self) -> Vec<ReviewRow> {
        self.catalog
            .questions()
            .iter()
            .enumerate()
            .map(|(idx, q)| ReviewRow {
                question_id: q.id,
                number: idx + 1,
                section: self
                    .catalog
                    .section_of(q)
                    .map(|s| s.title.clone())
                    .unwrap_or_default(),
                text: q.text.clone(),
                answered: self.answers.is_answered(q.id),
                flagged: self.flags.is_flagged(q.id),
            })
            .collect()
    }

    pub fn view(&self) -> SessionView {
        let current = self.current_question().map(|q| CurrentQuestion {
            number: self.cursor.index().map_or(0, |i| i + 1),
            section: self.catalog.section_of(q).cloned(),
            question: q.clone(),
            answer: self.answers.get(q.id).cloned(),
            flagged: self.flags.is_flagged(q.id),
        });
        let clock = self.countdown.clock();
        SessionView {
            session_id: self.id.clone(),
            exam_id: self.catalog.id().to_string(),
            exam_title: self.catalog.exam().title.clone(),
            cursor: self.cursor,
            remaining_secs: self.countdown.remaining(),
            clock,
            clock_text: clock.to_string(),
            total_questions: self.total_questions(),
            answered: self.answered_count(),
            confirm_open: self.confirm_open,
            submitted: self.is_submitted(),
            current,
            grid: self.grid(),
            review: if self.cursor.is_review() {
                self.review_rows()
            } else {
                Vec::new()
            },
        }
    }
}

fn is_option(question: &Question, option: &str) -> bool {
    question
        .options
        .as_deref()
        .is_some_and(|opts| opts.iter().any(|o| o == option))
}

fn check_answer(question: &Question, value: &AnswerValue) -> Result<(), SessionError> {
    let question_id = question.id;
    match (question.q_type, value) {
        (QuestionType::MultipleSelect, AnswerValue::Choices(list)) => {
            if let Some(bad) = list.iter().find(|o| !is_option(question, o)) {
                return Err(SessionError::UnknownOption {
                    question_id,
                    option: bad.clone(),
                });
            }
            let mut seen = HashSet::new();
            if let Some(dup) = list.iter().find(|o| !seen.insert(o.as_str())) {
                return Err(SessionError::DuplicateOption {
                    question_id,
                    option: dup.clone(),
                });
            }
            Ok(())
        }
        (QuestionType::SingleChoice, AnswerValue::Text(text)) => {
            if !text.is_empty() && !is_option(question, text) {
                return Err(SessionError::UnknownOption {
                    question_id,
                    option: text.clone(),
                });
            }
            Ok(())
        }
        (QuestionType::ShortText | QuestionType::Essay, AnswerValue::Text(_)) => Ok(()),
        (QuestionType::MultipleSelect, AnswerValue::Text(_)) => Err(SessionError::AnswerShape {
            question_id,
            expected: "list",
        }),
        (_, AnswerValue::Choices(_)) => Err(SessionError::AnswerShape {
            question_id,
            expected: "single string",
        }),
    }
}
