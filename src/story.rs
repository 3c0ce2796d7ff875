use std::fmt;

use serde::{Deserialize, Serialize};

use crate::brief::Brief;
use crate::chapter::ChapterContext;
use crate::error::{Stage, StoryError};
use crate::generator::TextGenerator;
use crate::judge::Verdict;
use crate::normalize::normalize;
use crate::parse::ParseError;
use crate::prompts;

/// Plain-text story: one title line, then the body.
///
/// The text is normalized on every construction path, including
/// deserialization, so the no-markup invariant holds for any `Story` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Story(String);

impl Story {
    pub fn from_raw(raw: &str) -> Self {
        Story(normalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn title(&self) -> &str {
        self.0.lines().next().unwrap_or_default()
    }

    pub fn body(&self) -> &str {
        match self.0.split_once('\n') {
            Some((_, body)) => body,
            None => "",
        }
    }

    pub fn word_count(&self) -> usize {
        self.body().split_whitespace().count()
    }
}

impl From<String> for Story {
    fn from(raw: String) -> Self {
        Story::from_raw(&raw)
    }
}

impl From<Story> for String {
    fn from(story: Story) -> Self {
        story.0
    }
}

impl fmt::Display for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Drafter stage. No retries here: a weak draft is the judge's problem.
pub async fn draft(generator: &dyn TextGenerator, brief: &Brief) -> Result<Story, StoryError> {
    draft_with(generator, brief, None).await
}

pub async fn draft_chapter(
    generator: &dyn TextGenerator,
    brief: &Brief,
    chapter: &ChapterContext,
) -> Result<Story, StoryError> {
    draft_with(generator, brief, Some(chapter)).await
}

async fn draft_with(
    generator: &dyn TextGenerator,
    brief: &Brief,
    chapter: Option<&ChapterContext>,
) -> Result<Story, StoryError> {
    let request = prompts::draft(&brief.to_prompt_json(), chapter);
    let reply = generator
        .generate(&request)
        .await
        .map_err(StoryError::service(Stage::Draft))?;
    let story = story_from_reply(Stage::Draft, &reply)?;

    tracing::info!(
        chapter = ?chapter.map(|c| c.number),
        title = %story.title(),
        words = story.word_count(),
        "drafted story"
    );
    Ok(story)
}

/// Editor stage. The revision is not validated here; callers re-judge it.
pub async fn edit(
    generator: &dyn TextGenerator,
    brief: &Brief,
    story: &Story,
    verdict: &Verdict,
    tweak: Option<&str>,
) -> Result<Story, StoryError> {
    edit_with(generator, brief, story, verdict, tweak, None).await
}

pub async fn edit_chapter(
    generator: &dyn TextGenerator,
    brief: &Brief,
    story: &Story,
    verdict: &Verdict,
    chapter: &ChapterContext,
) -> Result<Story, StoryError> {
    edit_with(generator, brief, story, verdict, None, Some(chapter)).await
}

async fn edit_with(
    generator: &dyn TextGenerator,
    brief: &Brief,
    story: &Story,
    verdict: &Verdict,
    tweak: Option<&str>,
    chapter: Option<&ChapterContext>,
) -> Result<Story, StoryError> {
    let request = prompts::edit(
        &brief.to_prompt_json(),
        story.as_str(),
        &verdict.to_prompt_json(),
        tweak,
        chapter,
    );
    let reply = generator
        .generate(&request)
        .await
        .map_err(StoryError::service(Stage::Edit))?;
    let revised = story_from_reply(Stage::Edit, &reply)?;

    tracing::info!(
        chapter = ?chapter.map(|c| c.number),
        tweak = tweak.is_some(),
        words_before = story.word_count(),
        words_after = revised.word_count(),
        "edited story"
    );
    Ok(revised)
}

fn story_from_reply(stage: Stage, reply: &str) -> Result<Story, StoryError> {
    let story = Story::from_raw(reply);
    if story.is_empty() {
        return Err(StoryError::MalformedResponse {
            stage,
            source: ParseError::EmptyText,
        });
    }
    Ok(story)
}
