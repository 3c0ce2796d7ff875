use serde::{Deserialize, Serialize};

use crate::brief::Brief;
use crate::error::StoryError;
use crate::generator::TextGenerator;
use crate::judge::{self, Verdict};
use crate::story::{self, Story};

/// Ordered chapters of a multi-part arc, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterSequence(Vec<Story>);

impl ChapterSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chapter: Story) {
        self.0.push(chapter);
    }

    /// Replaces the most recent chapter. No-op on an empty sequence.
    pub fn replace_last(&mut self, chapter: Story) {
        if let Some(last) = self.0.last_mut() {
            *last = chapter;
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Story> {
        self.0.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Story> {
        self.0.iter()
    }

    pub fn story_so_far(&self) -> String {
        self.0
            .iter()
            .map(Story::as_str)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Where a chapter sits in its arc.
///
/// `end_in_next` and `end_now` are independent; callers should not set both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterContext {
    pub number: usize,
    pub story_so_far: String,
    pub end_in_next: bool,
    pub end_now: bool,
}

impl ChapterContext {
    pub fn following(chapters: &ChapterSequence, end_in_next: bool, end_now: bool) -> Self {
        Self {
            number: chapters.len() + 1,
            story_so_far: chapters.story_so_far(),
            end_in_next,
            end_now,
        }
    }
}

pub async fn generate_first_chapter(
    generator: &dyn TextGenerator,
    brief: &Brief,
) -> Result<(Story, Verdict), StoryError> {
    let context = ChapterContext::following(&ChapterSequence::new(), false, false);
    generate_chapter(generator, brief, &context).await
}

pub async fn generate_next_chapter(
    generator: &dyn TextGenerator,
    brief: &Brief,
    chapters: &ChapterSequence,
    end_in_next: bool,
    end_now: bool,
) -> Result<(Story, Verdict), StoryError> {
    let context = ChapterContext::following(chapters, end_in_next, end_now);
    generate_chapter(generator, brief, &context).await
}

/// Draft, judge, and at most one edit followed by a re-judge.
async fn generate_chapter(
    generator: &dyn TextGenerator,
    brief: &Brief,
    context: &ChapterContext,
) -> Result<(Story, Verdict), StoryError> {
    let chapter = story::draft_chapter(generator, brief, context).await?;
    let verdict = judge::judge_chapter(generator, brief, &chapter, context).await?;
    if verdict.pass {
        return Ok((chapter, verdict));
    }

    tracing::info!(
        chapter = context.number,
        average = verdict.scores.average,
        "chapter failed review; editing once"
    );
    let chapter = story::edit_chapter(generator, brief, &chapter, &verdict, context).await?;
    let verdict = judge::judge_chapter(generator, brief, &chapter, context).await?;
    Ok((chapter, verdict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::sample_brief;
    use crate::generator::scripted::ScriptedGenerator;
    use crate::judge::tests::verdict_reply;
    use crate::prompts;

    const PASSING: [u8; 7] = [9, 9, 9, 9, 9, 9, 9];
    const FAILING: [u8; 7] = [9, 9, 9, 9, 6, 9, 9];

    #[test]
    fn story_so_far_joins_chapters_in_order() {
        let mut chapters = ChapterSequence::new();
        chapters.push(Story::from_raw("One\nFirst."));
        chapters.push(Story::from_raw("Two\nSecond."));
        assert_eq!(chapters.story_so_far(), "One\nFirst.\n\nTwo\nSecond.");

        chapters.replace_last(Story::from_raw("Two Again\nSecond, revised."));
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters.last().map(Story::title), Some("Two Again"));
    }

    #[tokio::test]
    async fn passing_chapter_is_not_edited() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new([
            "Kit and the Yarn\nKit found a ball of yarn.".to_owned(),
            verdict_reply(PASSING),
        ]);
        let (chapter, verdict) = generate_first_chapter(&generator, &sample_brief()).await?;

        assert_eq!(chapter.title(), "Kit and the Yarn");
        assert!(verdict.pass);
        assert_eq!(generator.calls_with_system(prompts::EDITOR_SYSTEM), 0);
        assert!(generator.requests()[0].prompt.contains("CHAPTER 1"));
        Ok(())
    }

    #[tokio::test]
    async fn failing_chapter_is_edited_exactly_once() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new([
            "Kit Alone\nKit hid the yarn.".to_owned(),
            verdict_reply(FAILING),
            "Kit Shares\nKit shared the yarn.".to_owned(),
            verdict_reply(FAILING),
        ]);
        let mut chapters = ChapterSequence::new();
        chapters.push(Story::from_raw("Kit and the Yarn\nKit found a ball of yarn."));

        let (chapter, verdict) =
            generate_next_chapter(&generator, &sample_brief(), &chapters, false, true).await?;

        assert_eq!(chapter.title(), "Kit Shares");
        assert!(!verdict.pass);
        assert_eq!(generator.calls_with_system(prompts::EDITOR_SYSTEM), 1);
        assert_eq!(generator.calls_with_system(prompts::JUDGE_SYSTEM), 2);
        assert_eq!(generator.remaining(), 0);

        let requests = generator.requests();
        assert!(requests[0].prompt.contains("CHAPTER 2"));
        assert!(requests[0].prompt.contains("Kit found a ball of yarn."));
        assert!(requests[0].prompt.contains("FINAL chapter"));
        assert!(requests[2].prompt.contains("Kit found a ball of yarn."));
        Ok(())
    }
}
