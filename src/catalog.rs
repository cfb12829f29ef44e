use crate::error::CatalogError;
use crate::models::{validate_exam, Exam, Question, QuestionId, Section};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ExamCatalog {
    exam: Exam,
    positions: HashMap<QuestionId, usize>,
}

#[derive(Debug)]
pub struct SectionQuestions<'a> {
    pub section: &'a Section,
    pub questions: Vec<(usize, &'a Question)>,
}

impl ExamCatalog {
    pub fn load(exam: Exam) -> Result<Self, CatalogError> {
        validate_exam(&exam).map_err(|issues| CatalogError::Invalid {
            exam_id: exam.id.clone(),
            issues,
        })?;
        let positions = exam
            .questions
            .iter()
            .enumerate()
            .map(|(idx, q)| (q.id, idx))
            .collect();
        Ok(Self { exam, positions })
    }

    pub fn exam(&self) -> &Exam {
        &self.exam
    }

    pub fn id(&self) -> &str {
        &self.exam.id
    }

    pub fn len(&self) -> usize {
        self.exam.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exam.questions.is_empty()
    }

    pub fn questions(&self) -> &[Question] {
        &self.exam.questions
    }

    pub fn question_at(&self, index: usize) -> Option<&Question> {
        self.exam.questions.get(index)
    }

    pub fn index_of(&self, id: QuestionId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.index_of(id).and_then(|idx| self.question_at(idx))
    }

    pub fn section_of(&self, question: &Question) -> Option<&Section> {
        self.exam.sections.iter().find(|s| s.id == question.section_id)
    }

    pub fn by_section(&self) -> Vec<SectionQuestions<'_>> {
        self.exam
            .sections
            .iter()
            .map(|section| SectionQuestions {
                section,
                questions: self
                    .exam
                    .questions
                    .iter()
                    .enumerate()
                    .filter(|(_, q)| q.section_id == section.id)
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_exam;

    #[test]
    fn load_indexes_questions() {
        let catalog = ExamCatalog::load(sample_exam()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.index_of(3), Some(2));
        assert_eq!(catalog.index_of(42), None);
        let q = catalog.question(2).unwrap();
        assert_eq!(catalog.section_of(q).unwrap().title, "Choice");
    }

    #[test]
    fn load_rejects_malformed_exam() {
        let mut exam = sample_exam();
        exam.questions.pop();
        let err = ExamCatalog::load(exam).unwrap_err();
        match err {
            CatalogError::Invalid { exam_id, issues } => {
                assert_eq!(exam_id, "exam-t");
                assert!(!issues.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn by_section_partitions_in_order() {
        let catalog = ExamCatalog::load(sample_exam()).unwrap();
        let groups = catalog.by_section();
        assert_eq!(groups.len(), 2);
        let first: Vec<_> = groups[0].questions.iter().map(|(idx, q)| (*idx, q.id)).collect();
        assert_eq!(first, vec![(0, 1), (1, 2)]);
        assert_eq!(groups[1].questions[0].1.id, 3);
    }
}
