use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::brief::{self, Brief};
use crate::chapter::{self, ChapterSequence};
use crate::error::StoryError;
use crate::generator::TextGenerator;
use crate::judge::Verdict;
use crate::refine::{self, RoundHistory, RoundId};
use crate::story::Story;
use crate::tweak;

/// What a session holds: one story, or a growing arc of chapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Mode {
    Short {
        story: Story,
        passed: bool,
    },
    Arc {
        chapters: ChapterSequence,
        ready_to_end: bool,
    },
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Short { .. } => "short",
            Mode::Arc { .. } => "arc",
        }
    }
}

/// Everything needed to resume work on a story.
///
/// Operations never mutate the receiver: each returns a new session, so a
/// failed stage leaves the previous state intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub request: String,
    pub brief: Brief,
    #[serde(flatten)]
    pub content: Mode,
    pub history: RoundHistory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn new(request: &str, brief: Brief, content: Mode, history: RoundHistory) -> Self {
        let now = Utc::now();
        Self {
            request: request.trim().to_owned(),
            brief,
            content,
            history,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn start_short(
        generator: &dyn TextGenerator,
        request: &str,
        max_rounds: u32,
    ) -> Result<Self, StoryError> {
        let generation = refine::generate(generator, request, max_rounds).await?;
        let content = Mode::Short {
            story: generation.story,
            passed: generation.passed,
        };
        Ok(Self::new(request, generation.brief, content, generation.history))
    }

    pub async fn start_arc(generator: &dyn TextGenerator, request: &str) -> Result<Self, StoryError> {
        let brief = brief::build_brief(generator, request).await?;
        let (first, verdict) = chapter::generate_first_chapter(generator, &brief).await?;

        let mut chapters = ChapterSequence::new();
        chapters.push(first);
        let mut history = RoundHistory::new();
        history.push(RoundId::chapter(1), verdict);

        let content = Mode::Arc {
            chapters,
            ready_to_end: false,
        };
        Ok(Self::new(request, brief, content, history))
    }

    /// Applies a user tweak to the story, or to the latest chapter of an
    /// unfinished arc.
    pub async fn tweak(
        &self,
        generator: &dyn TextGenerator,
        text: &str,
        rounds: u32,
    ) -> Result<Self, StoryError> {
        let mut next = self.clone();
        match &mut next.content {
            Mode::Short { story, passed } => {
                let (revised, verdict) =
                    tweak::apply_tweak(generator, &self.brief, story, text, rounds).await?;
                *story = revised;
                *passed = verdict.pass;
                next.history.push(RoundId::tweak(self.history.len() + 1), verdict);
            }
            Mode::Arc {
                chapters,
                ready_to_end,
            } => {
                if *ready_to_end {
                    return Err(StoryError::InvalidState(
                        "the arc has its finale; tweaks are closed".to_owned(),
                    ));
                }
                let Some(last) = chapters.last() else {
                    return Err(StoryError::InvalidState("the arc has no chapters".to_owned()));
                };
                let (revised, verdict) =
                    tweak::apply_tweak(generator, &self.brief, last, text, rounds).await?;
                chapters.replace_last(revised);
                next.history.push(RoundId::chapter_tweak(chapters.len()), verdict);
            }
        }
        next.updated_at = Utc::now();
        Ok(next)
    }

    pub async fn next_chapter(
        &self,
        generator: &dyn TextGenerator,
        end_in_next: bool,
    ) -> Result<Self, StoryError> {
        let chapters = self.open_arc("add a chapter")?;
        let (chapter, verdict) =
            chapter::generate_next_chapter(generator, &self.brief, chapters, end_in_next, false)
                .await?;
        Ok(self.with_chapter(chapter, RoundId::chapter(chapters.len() + 1), verdict, false))
    }

    /// Writes the finale. Once the arc is finished this returns the session
    /// unchanged.
    pub async fn finish_arc(&self, generator: &dyn TextGenerator) -> Result<Self, StoryError> {
        if let Mode::Arc {
            ready_to_end: true, ..
        } = self.content
        {
            tracing::info!("arc already has its finale");
            return Ok(self.clone());
        }
        let chapters = self.open_arc("finish the arc")?;
        let (chapter, verdict) =
            chapter::generate_next_chapter(generator, &self.brief, chapters, false, true).await?;
        Ok(self.with_chapter(chapter, RoundId::finale(chapters.len() + 1), verdict, true))
    }

    pub fn passed(&self) -> Option<bool> {
        match self.content {
            Mode::Short { passed, .. } => Some(passed),
            Mode::Arc { .. } => None,
        }
    }

    pub fn ready_to_end(&self) -> bool {
        matches!(
            self.content,
            Mode::Arc {
                ready_to_end: true,
                ..
            }
        )
    }

    /// The story, or every chapter separated by a blank line.
    pub fn text(&self) -> String {
        match &self.content {
            Mode::Short { story, .. } => story.to_string(),
            Mode::Arc { chapters, .. } => chapters.story_so_far(),
        }
    }

    fn open_arc(&self, action: &str) -> Result<&ChapterSequence, StoryError> {
        match &self.content {
            Mode::Short { .. } => Err(StoryError::InvalidState(format!(
                "cannot {action}: this is a short-story session"
            ))),
            Mode::Arc {
                ready_to_end: true, ..
            } => Err(StoryError::InvalidState(format!(
                "cannot {action}: the arc already has its finale"
            ))),
            Mode::Arc { chapters, .. } => Ok(chapters),
        }
    }

    fn with_chapter(
        &self,
        chapter: Story,
        round: RoundId,
        verdict: Verdict,
        finale: bool,
    ) -> Self {
        let mut next = self.clone();
        if let Mode::Arc {
            chapters,
            ready_to_end,
        } = &mut next.content
        {
            chapters.push(chapter);
            *ready_to_end = finale;
        }
        next.history.push(round, verdict);
        next.updated_at = Utc::now();
        next
    }
}
