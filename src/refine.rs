use std::fmt;

use serde::{Deserialize, Serialize};

use crate::brief::{self, Brief};
use crate::error::StoryError;
use crate::generator::TextGenerator;
use crate::judge::{self, Verdict};
use crate::story::{self, Story};

pub const DEFAULT_MAX_ROUNDS: u32 = 2;

/// Label of one history entry: a plain round number from the refinement
/// loop, or a tag such as `tweak-3` or `chapter-2 (finale)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoundId {
    Number(u32),
    Tagged(String),
}

impl RoundId {
    pub fn tweak(ordinal: usize) -> Self {
        RoundId::Tagged(format!("tweak-{ordinal}"))
    }

    pub fn chapter_tweak(chapter: usize) -> Self {
        RoundId::Tagged(format!("tweak-ch{chapter}"))
    }

    pub fn chapter(chapter: usize) -> Self {
        RoundId::Tagged(format!("chapter-{chapter}"))
    }

    pub fn finale(chapter: usize) -> Self {
        RoundId::Tagged(format!("chapter-{chapter} (finale)"))
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundId::Number(round) => write!(f, "{round}"),
            RoundId::Tagged(tag) => f.write_str(tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEntry {
    pub round: RoundId,
    pub verdict: Verdict,
}

/// Append-only log of every verdict recorded for a story or arc.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundHistory(Vec<RoundEntry>);

impl RoundHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, round: RoundId, verdict: Verdict) {
        self.0.push(RoundEntry { round, verdict });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&RoundEntry> {
        self.0.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoundEntry> {
        self.0.iter()
    }
}

/// Result of the full request-to-story pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub brief: Brief,
    pub story: Story,
    pub history: RoundHistory,
    pub passed: bool,
}

/// Brief, draft, then the judge/edit loop.
pub async fn generate(
    generator: &dyn TextGenerator,
    request: &str,
    max_rounds: u32,
) -> Result<Generation, StoryError> {
    let brief = brief::build_brief(generator, request).await?;
    let draft = story::draft(generator, &brief).await?;
    let (story, history, passed) = refine(generator, &brief, draft, max_rounds).await?;
    Ok(Generation {
        brief,
        story,
        history,
        passed,
    })
}

/// Judges up to `max_rounds` times, editing after each failing verdict, and
/// returns on the first pass. When no in-loop verdict passes, one final
/// judgement of the last edit is recorded as round `max_rounds + 1`.
pub async fn refine(
    generator: &dyn TextGenerator,
    brief: &Brief,
    mut story: Story,
    max_rounds: u32,
) -> Result<(Story, RoundHistory, bool), StoryError> {
    let mut history = RoundHistory::new();

    for round in 1..=max_rounds {
        let verdict = judge::judge(generator, brief, &story, None).await?;
        let pass = verdict.pass;
        tracing::info!(round, average = verdict.scores.average, pass, "review round");
        if pass {
            history.push(RoundId::Number(round), verdict);
            return Ok((story, history, true));
        }
        story = story::edit(generator, brief, &story, &verdict, None).await?;
        history.push(RoundId::Number(round), verdict);
    }

    let round = max_rounds.saturating_add(1);
    let verdict = judge::judge(generator, brief, &story, None).await?;
    let passed = verdict.pass;
    tracing::info!(round, average = verdict.scores.average, pass = passed, "final review");
    history.push(RoundId::Number(round), verdict);
    Ok((story, history, passed))
}
