use std::fmt::Write as _;

use anyhow::Context as _;

use crate::cli::{ArcFinishArgs, ArcNextArgs, GenerateArgs, ModeArg, ServiceArgs, ShowArgs, TweakArgs};
use crate::config::ServiceConfig;
use crate::error::StoryError;
use crate::generator::OpenAiGenerator;
use crate::refine::RoundHistory;
use crate::session::Session;
use crate::session_store::{FileSessionStore, SessionStore as _};

pub async fn generate(service: &ServiceArgs, args: GenerateArgs) -> anyhow::Result<()> {
    let store = FileSessionStore::new(&args.state);
    if !args.force && store.exists().await? {
        anyhow::bail!(
            "session already exists: {} (use --force to overwrite)",
            store.path().display()
        );
    }

    let generator = build_generator(service)?;
    let session = match args.mode {
        ModeArg::Short => Session::start_short(&generator, &args.request, args.max_rounds)
            .await
            .map_err(|err| stage_failure("generate story", err))?,
        ModeArg::Arc => Session::start_arc(&generator, &args.request)
            .await
            .map_err(|err| stage_failure("generate first chapter", err))?,
    };

    store.save(&session).await?;
    tracing::info!(
        state = %store.path().display(),
        mode = session.content.name(),
        model = generator.model(),
        "saved session"
    );
    print_session(&session);
    Ok(())
}

pub async fn tweak(service: &ServiceArgs, args: TweakArgs) -> anyhow::Result<()> {
    let store = FileSessionStore::new(&args.state);
    let session = load_session(&store).await?;
    let generator = build_generator(service)?;

    let text = match (args.text.as_deref(), args.preset) {
        (Some(text), _) => text,
        (None, Some(preset)) => preset.instruction(),
        (None, None) => anyhow::bail!("either --text or --preset is required"),
    };
    let session = session
        .tweak(&generator, text, args.rounds)
        .await
        .map_err(|err| stage_failure("apply tweak", err))?;
    store.save(&session).await?;
    print_session(&session);
    Ok(())
}

pub async fn arc_next(service: &ServiceArgs, args: ArcNextArgs) -> anyhow::Result<()> {
    let store = FileSessionStore::new(&args.state);
    let session = load_session(&store).await?;
    let generator = build_generator(service)?;

    let session = session
        .next_chapter(&generator, args.end_in_next)
        .await
        .map_err(|err| stage_failure("generate next chapter", err))?;
    store.save(&session).await?;
    print_session(&session);
    Ok(())
}

pub async fn arc_finish(service: &ServiceArgs, args: ArcFinishArgs) -> anyhow::Result<()> {
    let store = FileSessionStore::new(&args.state);
    let session = load_session(&store).await?;
    if session.ready_to_end() {
        eprintln!("arc already finished");
        print_session(&session);
        return Ok(());
    }
    let generator = build_generator(service)?;

    let session = session
        .finish_arc(&generator)
        .await
        .map_err(|err| stage_failure("generate finale", err))?;
    store.save(&session).await?;
    print_session(&session);
    Ok(())
}

pub async fn show(args: ShowArgs) -> anyhow::Result<()> {
    let store = FileSessionStore::new(&args.state);
    let session = load_session(&store).await?;
    print_session(&session);
    Ok(())
}

fn build_generator(service: &ServiceArgs) -> anyhow::Result<OpenAiGenerator> {
    let config = ServiceConfig::load(service.config.as_deref())?
        .with_overrides(service.model.as_deref(), service.base_url.as_deref());
    OpenAiGenerator::new(&config).context("configure generation service")
}

async fn load_session(store: &FileSessionStore) -> anyhow::Result<Session> {
    store.load().await?.with_context(|| {
        format!(
            "no session at {} (run `generate` first)",
            store.path().display()
        )
    })
}

/// Names the failing stage in the context so `{err:#}` reads
/// "apply tweak (judge stage): ...".
fn stage_failure(action: &str, err: StoryError) -> anyhow::Error {
    let context = match err.stage() {
        Some(stage) => format!("{action} ({stage} stage)"),
        None => action.to_owned(),
    };
    anyhow::Error::new(err).context(context)
}

fn print_session(session: &Session) {
    eprint!("{}", render_summary(session));
    println!("{}", session.text());
}

/// One line per recorded verdict, then the session status.
pub fn render_summary(session: &Session) -> String {
    let mut out = render_history(&session.history);
    let status = match (session.passed(), session.ready_to_end()) {
        (Some(true), _) => "passed".to_owned(),
        (Some(false), _) => "best effort (did not pass review)".to_owned(),
        (None, true) => "arc finished".to_owned(),
        (None, false) => "arc in progress".to_owned(),
    };
    let _ = writeln!(out, "mode: {} | status: {status}", session.content.name());
    out
}

pub fn render_history(history: &RoundHistory) -> String {
    let mut out = String::new();
    for entry in history.iter() {
        let verdict = &entry.verdict;
        let _ = write!(
            out,
            "round {}: average {:.2} {}",
            entry.round,
            verdict.scores.average,
            if verdict.pass { "pass" } else { "fail" }
        );
        if !verdict.issues.is_empty() {
            let _ = write!(out, " ({})", verdict.issues.join("; "));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::Verdict;
    use crate::judge::tests::verdict_reply;
    use crate::refine::RoundId;

    #[test]
    fn stage_failures_name_the_stage() {
        let err = stage_failure(
            "apply tweak",
            StoryError::Service {
                stage: crate::error::Stage::Judge,
                source: crate::generator::ServiceError::Timeout,
            },
        );
        let rendered = format!("{err:#}");
        assert!(rendered.starts_with("apply tweak (judge stage): judge: generation service call failed"));

        let err = stage_failure("apply tweak", StoryError::InvalidInput("tweak text is empty".to_owned()));
        assert_eq!(format!("{err:#}"), "apply tweak: invalid input: tweak text is empty");
    }

    #[test]
    fn history_lists_every_round() -> anyhow::Result<()> {
        let mut history = RoundHistory::new();
        history.push(
            RoundId::Number(1),
            Verdict::from_reply(&verdict_reply([9, 9, 9, 9, 9, 9, 6]))?,
        );
        history.push(
            RoundId::tweak(2),
            Verdict::from_reply(&verdict_reply([9, 9, 9, 9, 9, 9, 9]))?,
        );

        let rendered = render_history(&history);
        assert_eq!(
            rendered,
            "round 1: average 8.57 fail (Sharing happens too late.)\n\
             round tweak-2: average 9.00 pass\n"
        );
        Ok(())
    }
}
