use crate::models::{AnswerValue, QuestionId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    entries: HashMap<QuestionId, AnswerValue>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, question_id: QuestionId, value: AnswerValue) {
        self.entries.insert(question_id, value);
    }

    pub fn get(&self, question_id: QuestionId) -> Option<&AnswerValue> {
        self.entries.get(&question_id)
    }

    /// Checks or unchecks one option of a multiple-select answer.
    pub fn select_option(&mut self, question_id: QuestionId, option: &str, checked: bool) -> &AnswerValue {
        let mut selected = match self.entries.remove(&question_id) {
            Some(AnswerValue::Choices(list)) => list,
            _ => Vec::new(),
        };
        if checked {
            if !selected.iter().any(|o| o == option) {
                selected.push(option.to_string());
            }
        } else {
            selected.retain(|o| o != option);
        }
        self.entries
            .entry(question_id)
            .or_insert(AnswerValue::Choices(selected))
    }

    pub fn is_answered(&self, question_id: QuestionId) -> bool {
        self.get(question_id).is_some_and(AnswerValue::is_filled)
    }

    pub fn answered_count(&self) -> usize {
        self.entries.values().filter(|v| v.is_filled()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, &AnswerValue)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }
}
