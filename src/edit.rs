use serde::{Deserialize, Serialize};

/// Body of `POST /edit/`: `{ filename, edit_type, params }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub filename: String,
    #[serde(flatten)]
    pub kind: EditKind,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "edit_type", content = "params", rename_all = "lowercase")]
pub enum EditKind {
    Cut { start: f64, end: f64 },
    Concat { segments: Vec<ConcatSegment> },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConcatSegment {
    pub path: String,
}

impl EditRequest {
    pub fn cut(filename: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            filename: filename.into(),
            kind: EditKind::Cut { start, end },
        }
    }

    pub fn concat<I, S>(filename: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filename: filename.into(),
            kind: EditKind::Concat {
                segments: paths
                    .into_iter()
                    .map(|p| ConcatSegment { path: p.into() })
                    .collect(),
            },
        }
    }

    pub fn edit_type(&self) -> &'static str {
        match self.kind {
            EditKind::Cut { .. } => "cut",
            EditKind::Concat { .. } => "concat",
        }
    }

    pub fn is_cut(&self) -> bool {
        matches!(self.kind, EditKind::Cut { .. })
    }
}
