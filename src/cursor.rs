use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "index", rename_all = "lowercase")]
pub enum Cursor {
    Taking(usize),
    Review,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::Taking(0)
    }
}

impl Cursor {
    pub fn next(self, question_count: usize) -> Self {
        match self {
            Cursor::Taking(i) if i + 1 >= question_count => Cursor::Review,
            Cursor::Taking(i) => Cursor::Taking(i + 1),
            Cursor::Review => Cursor::Review,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            Cursor::Taking(i) => Cursor::Taking(i.saturating_sub(1)),
            Cursor::Review => Cursor::Review,
        }
    }

    pub fn jump(self, index: usize) -> Self {
        Cursor::Taking(index)
    }

    pub fn index(self) -> Option<usize> {
        match self {
            Cursor::Taking(i) => Some(i),
            Cursor::Review => None,
        }
    }

    pub fn is_review(self) -> bool {
        self == Cursor::Review
    }
}
