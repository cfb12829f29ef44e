use crate::models::QuestionId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct FlagStore {
    ids: BTreeSet<QuestionId>,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, question_id: QuestionId) -> bool {
        if self.ids.remove(&question_id) {
            false
        } else {
            self.ids.insert(question_id);
            true
        }
    }

    pub fn is_flagged(&self, question_id: QuestionId) -> bool {
        self.ids.contains(&question_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<QuestionId> {
        self.ids.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_is_its_own_inverse() {
        let mut flags = FlagStore::new();
        flags.toggle(7);
        let before = flags.ids();

        assert!(flags.toggle(3));
        assert!(!flags.toggle(3));
        assert_eq!(flags.ids(), before);

        assert!(!flags.toggle(7));
        assert!(flags.toggle(7));
        assert_eq!(flags.ids(), before);
    }

    #[test]
    fn membership() {
        let mut flags = FlagStore::new();
        assert!(flags.is_empty());
        flags.toggle(12);
        flags.toggle(4);
        assert!(flags.is_flagged(12));
        assert!(!flags.is_flagged(5));
        assert_eq!(flags.ids(), vec![4, 12]);
        assert_eq!(flags.len(), 2);
    }
}
