use crate::catalog::ExamCatalog;
use crate::error::CatalogError;
use crate::models::{AnswerValue, Announcement, Exam, ExamStatus, Question, QuestionType, Section, User};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern"));

#[derive(Debug, Clone, Serialize)]
pub struct InstructionItem {
    pub icon: &'static str,
    pub text: &'static str,
}

pub trait ContentSource: Send + Sync {
    fn exams(&self) -> Vec<Arc<ExamCatalog>>;

    fn exam(&self, exam_id: &str) -> Option<Arc<ExamCatalog>>;

    fn announcements(&self) -> Vec<Announcement>;

    fn instructions(&self) -> Vec<InstructionItem>;

    fn find_user(&self, identifier: &str) -> Option<User>;
}

pub struct MockContent {
    order: Vec<String>,
    exams: HashMap<String, Arc<ExamCatalog>>,
    users: Vec<User>,
}

impl MockContent {
    pub fn new() -> Result<Self, CatalogError> {
        Self::from_exams(vec![psychology_final(), mechanics_final(), calculus_quiz()])
    }

    pub fn from_exams(exams: Vec<Exam>) -> Result<Self, CatalogError> {
        let mut order = Vec::with_capacity(exams.len());
        let mut map = HashMap::new();
        for exam in exams {
            let id = exam.id.clone();
            if map.contains_key(&id) {
                return Err(CatalogError::Duplicate(id));
            }
            map.insert(id.clone(), Arc::new(ExamCatalog::load(exam)?));
            order.push(id);
        }
        Ok(Self {
            order,
            exams: map,
            users: vec![demo_user()],
        })
    }
}

impl ContentSource for MockContent {
    fn exams(&self) -> Vec<Arc<ExamCatalog>> {
        self.order
            .iter()
            .filter_map(|id| self.exams.get(id).cloned())
            .collect()
    }

    fn exam(&self, exam_id: &str) -> Option<Arc<ExamCatalog>> {
        self.exams.get(exam_id).cloned()
    }

    fn announcements(&self) -> Vec<Announcement> {
        vec![
            Announcement {
                title: "Scheduled System Maintenance".into(),
                description: "Please be advised of a system-wide maintenance on July 25th, from 2 AM to 4 AM.".into(),
                date: "July 22, 2024".into(),
            },
            Announcement {
                title: "Final Exam Proctoring Rules".into(),
                description: "Reminder: All final exams will be proctored. Please ensure your setup meets the requirements.".into(),
                date: "July 20, 2024".into(),
            },
            Announcement {
                title: "Action Required: Update Profile".into(),
                description: "Some student profiles are missing key information. Please update your profile before the exam period begins.".into(),
                date: "July 18, 2024".into(),
            },
        ]
    }

    fn instructions(&self) -> Vec<InstructionItem> {
        vec![
            InstructionItem {
                icon: "wifi",
                text: "Ensure you have a stable and reliable internet connection throughout the exam duration.",
            },
            InstructionItem {
                icon: "devices",
                text: "Use a compatible browser (Chrome, Firefox, or Safari recommended). Mobile devices are not supported.",
            },
            InstructionItem {
                icon: "notifications_off",
                text: "Close all other applications and browser tabs to avoid distractions.",
            },
            InstructionItem {
                icon: "verified_user",
                text: "This exam is subject to the university's academic integrity policy. Any form of cheating, plagiarism, or use of unauthorized materials is strictly prohibited.",
            },
        ]
    }

    fn find_user(&self, identifier: &str) -> Option<User> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }
        if let Some(user) = self
            .users
            .iter()
            .find(|u| u.id == identifier || u.email.eq_ignore_ascii_case(identifier))
        {
            return Some(user.clone());
        }
        // Login is simulated: unknown identifiers get a guest profile.
        let (name, email) = if EMAIL_RE.is_match(identifier) {
            let local = identifier.split('@').next().unwrap_or(identifier);
            (local.replace(['.', '_'], " "), identifier.to_string())
        } else {
            (format!("Student {identifier}"), String::new())
        };
        Some(User {
            id: identifier.to_string(),
            name,
            email,
            avatar: format!("https://picsum.photos/seed/{identifier}/200"),
        })
    }
}

fn demo_user() -> User {
    User {
        id: "12345".into(),
        name: "Alex Doe".into(),
        email: "alex.doe@university.edu".into(),
        avatar: "https://picsum.photos/seed/alex/200".into(),
    }
}

fn choice(id: u32, section_id: u32, q_type: QuestionType, text: &str, options: &[&str], correct: AnswerValue) -> Question {
    Question {
        id,
        section_id,
        q_type,
        text: text.to_string(),
        options: Some(options.iter().map(|o| o.to_string()).collect()),
        correct_answer: Some(correct),
    }
}

fn written(id: u32, section_id: u32, q_type: QuestionType, text: &str, correct: &str) -> Question {
    Question {
        id,
        section_id,
        q_type,
        text: text.to_string(),
        options: None,
        correct_answer: Some(AnswerValue::Text(correct.to_string())),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn fill_range(
    ids: std::ops::RangeInclusive<u32>,
    specific: Vec<Question>,
    filler: impl Fn(u32) -> Question,
) -> Vec<Question> {
    ids.map(|id| {
        specific
            .iter()
            .find(|q| q.id == id)
            .cloned()
            .unwrap_or_else(|| filler(id))
    })
    .collect()
}

fn psychology_final() -> Exam {
    let mut questions = Vec::new();

    questions.extend(fill_range(
        1..=20,
        vec![
            choice(
                12,
                1,
                QuestionType::SingleChoice,
                "According to cognitive dissonance theory, humans are motivated to do what?",
                &[
                    "Maintain consistency between their beliefs and actions.",
                    "Seek out information that confirms their existing beliefs.",
                    "Engage in rewarding behaviors regardless of their beliefs.",
                    "Change their beliefs to match the majority opinion.",
                ],
                AnswerValue::Text("Maintain consistency between their beliefs and actions.".into()),
            ),
            choice(
                13,
                1,
                QuestionType::SingleChoice,
                "Which of the following is an example of classical conditioning?",
                &[
                    "A dog learning to sit on command to receive a treat.",
                    "A cat running to its food bowl upon hearing the sound of a can opener.",
                    "A child cleaning their room to avoid being grounded.",
                    "A student studying hard to get good grades.",
                ],
                AnswerValue::Text("A cat running to its food bowl upon hearing the sound of a can opener.".into()),
            ),
        ],
        |id| {
            choice(
                id,
                1,
                QuestionType::SingleChoice,
                &format!("Question {id}: This is a multiple choice question testing fundamental concepts."),
                &["Option A", "Option B", "Option C", "Option D"],
                AnswerValue::Text("Option A".into()),
            )
        },
    ));

    questions.extend(fill_range(
        21..=30,
        vec![choice(
            23,
            2,
            QuestionType::MultipleSelect,
            "Which of the following are considered primary colors in the additive color model (RGB)?",
            &["Red", "Yellow", "Green", "Blue"],
            AnswerValue::Choices(strings(&["Red", "Green", "Blue"])),
        )],
        |id| {
            choice(
                id,
                2,
                QuestionType::MultipleSelect,
                &format!("Question {id}: Select all the correct options for this scenario."),
                &["Choice 1", "Choice 2", "Choice 3", "Choice 4", "Choice 5"],
                AnswerValue::Choices(strings(&["Choice 1", "Choice 3"])),
            )
        },
    ));

    questions.extend(fill_range(
        31..=45,
        vec![written(
            35,
            3,
            QuestionType::ShortText,
            "Who is considered the 'father of psychoanalysis'?",
            "Sigmund Freud",
        )],
        |id| {
            written(
                id,
                3,
                QuestionType::ShortText,
                &format!("Question {id}: Provide a concise term or phrase that defines the described phenomenon."),
                "Answer",
            )
        },
    ));

    questions.extend(fill_range(
        46..=50,
        vec![written(
            48,
            4,
            QuestionType::Essay,
            "Compare and contrast the theories of Sigmund Freud and Carl Jung regarding the unconscious mind.",
            "Answers may vary.",
        )],
        |id| {
            written(
                id,
                4,
                QuestionType::Essay,
                &format!("Question {id}: Write a detailed response explaining your reasoning on this essay topic."),
                "Essay response",
            )
        },
    ));

    questions.sort_by_key(|q| q.id);

    Exam {
        id: "exam-1".into(),
        title: "Introduction to Psychology - Final Exam".into(),
        course_code: "PSY101".into(),
        duration_minutes: 90,
        total_questions: 50,
        total_marks: 100,
        status: ExamStatus::Live,
        start_date: Some("24 July, 2024".into()),
        start_time: Some("10:00 AM".into()),
        sections: vec![
            Section { id: 1, title: "Multiple Choice".into() },
            Section { id: 2, title: "Multiple Select".into() },
            Section { id: 3, title: "Short Answer".into() },
            Section { id: 4, title: "Essay".into() },
        ],
        questions,
    }
}

fn mechanics_final() -> Exam {
    let questions = (1..=30)
        .map(|id| {
            choice(
                id,
                1,
                QuestionType::SingleChoice,
                &format!("Question {id}: Apply Newton's laws to the described system."),
                &["Option A", "Option B", "Option C", "Option D"],
                AnswerValue::Text("Option A".into()),
            )
        })
        .collect();
    Exam {
        id: "exam-2".into(),
        title: "Classical Mechanics - Final".into(),
        course_code: "PHY205".into(),
        duration_minutes: 120,
        total_questions: 30,
        total_marks: 60,
        status: ExamStatus::Upcoming,
        start_date: Some("28 July, 2024".into()),
        start_time: Some("2:00 PM".into()),
        sections: vec![Section { id: 1, title: "Multiple Choice".into() }],
        questions,
    }
}

fn calculus_quiz() -> Exam {
    let questions = (1..=10)
        .map(|id| {
            written(
                id,
                1,
                QuestionType::ShortText,
                &format!("Question {id}: Evaluate the given integral and simplify."),
                "Answer",
            )
        })
        .collect();
    Exam {
        id: "exam-3".into(),
        title: "Advanced Calculus - Quiz 2".into(),
        course_code: "MTH301".into(),
        duration_minutes: 45,
        total_questions: 10,
        total_marks: 20,
        status: ExamStatus::Locked,
        start_date: Some("1 August, 2024".into()),
        start_time: Some("11:30 AM".into()),
        sections: vec![Section { id: 1, title: "Short Answer".into() }],
        questions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_exam;

    #[test]
    fn mock_exams_are_valid_and_ordered() {
        let content = MockContent::new().unwrap();
        let ids: Vec<_> = content.exams().iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["exam-1", "exam-2", "exam-3"]);
    }

    #[test]
    fn psychology_final_keeps_specific_questions() {
        let content = MockContent::new().unwrap();
        let exam = content.exam("exam-1").unwrap();
        assert_eq!(exam.len(), 50);
        assert_eq!(exam.question_at(0).unwrap().id, 1);
        let q23 = exam.question(23).unwrap();
        assert_eq!(q23.q_type, QuestionType::MultipleSelect);
        assert_eq!(q23.options.as_ref().unwrap().len(), 4);
        assert!(exam.question(35).unwrap().text.contains("psychoanalysis"));
        let q40 = exam.question(40).unwrap();
        assert_eq!(exam.section_of(q40).unwrap().title, "Short Answer");
        assert_eq!(exam.by_section()[3].questions.len(), 5);
    }

    #[test]
    fn duplicate_exam_ids_are_rejected() {
        let err = MockContent::from_exams(vec![sample_exam(), sample_exam()]).err().unwrap();
        assert!(matches!(err, CatalogError::Duplicate(id) if id == "exam-t"));
    }

    #[test]
    fn find_user_by_email_or_guest() {
        let content = MockContent::new().unwrap();
        assert_eq!(content.find_user("ALEX.DOE@university.edu").unwrap().name, "Alex Doe");
        assert_eq!(content.find_user("12345").unwrap().id, "12345");
        let guest = content.find_user("jane.roe@school.org").unwrap();
        assert_eq!(guest.name, "jane roe");
        assert_eq!(guest.email, "jane.roe@school.org");
        assert_eq!(content.find_user("S-77").unwrap().name, "Student S-77");
        assert!(content.find_user("   ").is_none());
    }
}
