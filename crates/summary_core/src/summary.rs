use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStyle {
    #[default]
    Markdown,
    Text,
}

/// One summarized time segment of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub cid: String,
    #[serde(default)]
    pub vid: String,
    #[serde(default)]
    pub slicer: String,
    #[serde(default)]
    pub style: ChapterStyle,
    /// Start time in seconds.
    pub start: f64,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub chapter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryState {
    #[default]
    Nothing,
    Doing,
    Done,
    /// The video has no transcript; a normal terminal state, not an error.
    NoTranscript,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub state: SummaryState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<Chapter>>,
}

impl Summary {
    pub fn doing() -> Self {
        Self {
            state: SummaryState::Doing,
            chapters: None,
        }
    }

    pub fn chapters(&self) -> &[Chapter] {
        self.chapters.as_deref().unwrap_or_default()
    }

    /// Folds a partial delivery into this summary: the state follows the
    /// newest payload and chapters are merged with [`merge_chapters`].
    pub fn merge(&mut self, partial: Summary) {
        self.state = partial.state;
        if let Some(incoming) = partial.chapters {
            let existing = self.chapters.take().unwrap_or_default();
            self.chapters = Some(merge_chapters(existing, incoming));
        }
    }
}

/// Chapter marker scraped from the host page, sent along with a summarize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageChapter {
    pub title: String,
    pub timestamp: String,
}

/// Last-write-wins union keyed by `cid`, then a stable sort by `start`.
///
/// A repeated `cid` keeps its original position before sorting, so chapters
/// sharing a start time keep their first-seen order.
pub fn merge_chapters(existing: Vec<Chapter>, incoming: Vec<Chapter>) -> Vec<Chapter> {
    let mut merged = existing;
    for chapter in incoming {
        match merged.iter_mut().find(|c| c.cid == chapter.cid) {
            Some(slot) => *slot = chapter,
            None => merged.push(chapter),
        }
    }
    merged.sort_by(|a, b| a.start.total_cmp(&b.start));
    merged
}
