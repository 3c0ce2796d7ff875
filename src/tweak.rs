use crate::brief::Brief;
use crate::error::StoryError;
use crate::generator::TextGenerator;
use crate::judge::{self, Verdict};
use crate::story::{self, Story};

pub const DEFAULT_TWEAK_ROUNDS: u32 = 2;

/// Canned tweaks offered by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TweakPreset {
    Shorter,
    Calmer,
    MoreDialogue,
    NewMoral,
}

impl TweakPreset {
    pub fn instruction(self) -> &'static str {
        match self {
            TweakPreset::Shorter => "Reduce to ~450 words. Simplify sentences further.",
            TweakPreset::Calmer => {
                "Lower stakes, slower cadence, extra reassurance in last two paragraphs."
            }
            TweakPreset::MoreDialogue => "Add gentle dialogue between characters with simple tags.",
            TweakPreset::NewMoral => {
                "Change the moral to 'kindness and sharing' clearly in the final line."
            }
        }
    }
}

/// Revises `story` toward a user's free-text tweak.
///
/// Always edits at least once. Stops early once a verdict both passes and
/// scores `requirements_satisfaction` >= 8; otherwise the last story and
/// verdict are returned as a best effort.
pub async fn apply_tweak(
    generator: &dyn TextGenerator,
    brief: &Brief,
    story: &Story,
    tweak: &str,
    rounds: u32,
) -> Result<(Story, Verdict), StoryError> {
    let tweak = tweak.trim();
    if tweak.is_empty() {
        return Err(StoryError::InvalidInput("tweak text is empty".to_owned()));
    }
    let rounds = rounds.max(1);

    let mut verdict = judge::judge(generator, brief, story, Some(tweak)).await?;
    let mut story = story.clone();

    for round in 1..=rounds {
        verdict.append_user_tweak(tweak);
        story = story::edit(generator, brief, &story, &verdict, Some(tweak)).await?;
        verdict = judge::judge(generator, brief, &story, Some(tweak)).await?;

        let satisfied = verdict.satisfies_tweak();
        tracing::info!(
            round,
            rounds,
            average = verdict.scores.average,
            pass = verdict.pass,
            requirements = ?verdict.requirements_satisfaction(),
            satisfied,
            "tweak round"
        );
        if satisfied {
            break;
        }
    }

    Ok((story, verdict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::sample_brief;
    use crate::generator::scripted::ScriptedGenerator;
    use crate::judge::tests::verdict_reply;
    use crate::prompts;

    const PASSING: [u8; 7] = [9, 9, 9, 9, 9, 9, 9];
    const IGNORED_TWEAK: [u8; 7] = [9, 9, 9, 9, 9, 9, 6];

    fn story() -> Story {
        Story::from_raw("Kit Shares\nKit shared the yarn with Mo.")
    }

    #[tokio::test]
    async fn preset_instruction_reaches_the_editor() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new([
            verdict_reply(IGNORED_TWEAK),
            "Kit Rests\nKit rested by the fire.".to_owned(),
            verdict_reply(PASSING),
        ]);
        let preset = TweakPreset::Calmer.instruction();
        apply_tweak(&generator, &sample_brief(), &story(), preset, 2).await?;

        let requests = generator.requests();
        assert!(requests[1].prompt.contains(&format!("USER TWEAK: {preset}")));
        Ok(())
    }

    #[tokio::test]
    async fn blank_tweak_is_rejected_before_any_call() {
        let generator = ScriptedGenerator::default();
        let err = apply_tweak(&generator, &sample_brief(), &story(), "   ", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, StoryError::InvalidInput(_)));
        assert!(generator.requests().is_empty());
    }

    #[tokio::test]
    async fn stops_once_the_tweak_is_satisfied() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new([
            verdict_reply(IGNORED_TWEAK),
            "Kit Sings\nKit shared the yarn and sang a song.".to_owned(),
            verdict_reply(PASSING),
        ]);
        let (revised, verdict) =
            apply_tweak(&generator, &sample_brief(), &story(), "add a song", 2).await?;

        assert_eq!(revised.title(), "Kit Sings");
        assert!(verdict.satisfies_tweak());
        assert_eq!(generator.calls_with_system(prompts::EDITOR_SYSTEM), 1);
        assert_eq!(generator.remaining(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn every_edit_carries_the_tweak_directive() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new([
            verdict_reply(IGNORED_TWEAK),
            "Kit Hums\nKit hummed.".to_owned(),
            verdict_reply(IGNORED_TWEAK),
            "Kit Hums Again\nKit hummed again.".to_owned(),
            verdict_reply(IGNORED_TWEAK),
        ]);
        let (revised, verdict) =
            apply_tweak(&generator, &sample_brief(), &story(), "add a song", 2).await?;

        assert_eq!(revised.title(), "Kit Hums Again");
        assert!(!verdict.satisfies_tweak());

        let edits = generator
            .requests()
            .into_iter()
            .filter(|r| r.system == prompts::EDITOR_SYSTEM)
            .collect::<Vec<_>>();
        assert_eq!(edits.len(), 2);
        for edit in &edits {
            assert!(edit.prompt.contains("USER TWEAK: add a song"));
            assert!(edit.prompt.contains("Let Kit offer the yarn earlier"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn zero_rounds_still_edits_once() -> anyhow::Result<()> {
        let generator = ScriptedGenerator::new([
            verdict_reply(IGNORED_TWEAK),
            "Kit Hums\nKit hummed.".to_owned(),
            verdict_reply(IGNORED_TWEAK),
        ]);
        apply_tweak(&generator, &sample_brief(), &story(), "add a song", 0).await?;
        assert_eq!(generator.calls_with_system(prompts::EDITOR_SYSTEM), 1);
        Ok(())
    }
}
