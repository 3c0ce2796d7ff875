use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::brief::Brief;
use crate::chapter::ChapterContext;
use crate::error::{Stage, StoryError};
use crate::generator::TextGenerator;
use crate::parse::{ParseError, parse_json_object};
use crate::prompts;
use crate::story::Story;

pub const PASS_MIN_SCORE: f64 = 8.0;
pub const PASS_MIN_AVERAGE: f64 = 8.5;
const SCORE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=10.0;

/// Tag prepended to a user tweak when it is appended to edit instructions.
pub const USER_TWEAK_TAG: &str = "USER TWEAK:";

/// Rubric dimensions, each scored 0-10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    AgeFit,
    Tone,
    Structure,
    Clarity,
    Safety,
    BedtimeSuitability,
    RequirementsSatisfaction,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::AgeFit,
        Dimension::Tone,
        Dimension::Structure,
        Dimension::Clarity,
        Dimension::Safety,
        Dimension::BedtimeSuitability,
        Dimension::RequirementsSatisfaction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::AgeFit => "age_fit",
            Dimension::Tone => "tone",
            Dimension::Structure => "structure",
            Dimension::Clarity => "clarity",
            Dimension::Safety => "safety",
            Dimension::BedtimeSuitability => "bedtime_suitability",
            Dimension::RequirementsSatisfaction => "requirements_satisfaction",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Dimension::ALL.into_iter().find(|d| d.as_str() == key)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rubric scores, serialized flat the way the judge emits them.
///
/// Numeric fields outside the rubric are kept in `extra`; they count toward
/// a derived average but never toward the pass rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    pub dimensions: BTreeMap<Dimension, f64>,
    pub extra: BTreeMap<String, f64>,
    pub average: f64,
}

impl Scores {
    /// Builds scores from rubric values; a missing `average` is derived.
    pub fn new(dimensions: impl IntoIterator<Item = (Dimension, f64)>, average: Option<f64>) -> Self {
        let dimensions = dimensions.into_iter().collect::<BTreeMap<_, _>>();
        let average = average.unwrap_or_else(|| mean_rounded(dimensions.values().copied()));
        Self {
            dimensions,
            extra: BTreeMap::new(),
            average,
        }
    }

    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        self.dimensions.get(&dimension).copied()
    }

    /// Every rubric dimension >= 8 and average >= 8.5. A missing dimension
    /// fails.
    pub fn passes(&self) -> bool {
        Dimension::ALL
            .into_iter()
            .all(|d| self.get(d).is_some_and(|score| score >= PASS_MIN_SCORE))
            && self.average >= PASS_MIN_AVERAGE
    }
}

impl TryFrom<Map<String, Value>> for Scores {
    type Error = ParseError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut dimensions = BTreeMap::new();
        let mut extra = BTreeMap::new();
        let mut average = None;

        for (key, value) in map {
            let Some(score) = value.as_f64() else {
                continue;
            };
            if !SCORE_RANGE.contains(&score) {
                return Err(ParseError::InvalidField {
                    field: "scores",
                    reason: format!("`{key}` is {score}, outside 0-10"),
                });
            }
            if key == "average" {
                average = Some(score);
            } else if let Some(dimension) = Dimension::from_key(&key) {
                dimensions.insert(dimension, score);
            } else {
                extra.insert(key, score);
            }
        }

        if dimensions.is_empty() && extra.is_empty() {
            return Err(ParseError::InvalidField {
                field: "scores",
                reason: "contains no numeric scores".to_owned(),
            });
        }

        let average = average.unwrap_or_else(|| {
            mean_rounded(dimensions.values().chain(extra.values()).copied())
        });

        Ok(Self {
            dimensions,
            extra,
            average,
        })
    }
}

impl From<Scores> for Map<String, Value> {
    fn from(scores: Scores) -> Self {
        let mut map = Map::new();
        for (dimension, score) in scores.dimensions {
            map.insert(dimension.as_str().to_owned(), Value::from(score));
        }
        for (key, score) in scores.extra {
            map.insert(key, Value::from(score));
        }
        map.insert("average".to_owned(), Value::from(scores.average));
        map
    }
}

impl Serialize for Scores {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Map::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Scores {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Scores::try_from(map).map_err(serde::de::Error::custom)
    }
}

fn mean_rounded(scores: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = scores.fold((0.0, 0usize), |(sum, count), s| (sum + s, count + 1));
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64 * 100.0).round() / 100.0
}

/// Structured judgement of one story.
///
/// `pass` is always derived from `scores`; whatever pass flag the service
/// claimed is only logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "VerdictRecord")]
pub struct Verdict {
    pub scores: Scores,
    pub pass: bool,
    pub issues: Vec<String>,
    pub edit_instructions: String,
}

#[derive(Deserialize)]
struct VerdictRecord {
    scores: Scores,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    edit_instructions: String,
}

impl From<VerdictRecord> for Verdict {
    fn from(record: VerdictRecord) -> Self {
        Verdict::new(record.scores, record.issues, record.edit_instructions)
    }
}

impl Verdict {
    pub fn new(scores: Scores, issues: Vec<String>, edit_instructions: String) -> Self {
        let pass = scores.passes();
        Self {
            scores,
            pass,
            issues,
            edit_instructions,
        }
    }

    pub fn from_reply(reply: &str) -> Result<Self, StoryError> {
        let object = parse_json_object(reply).map_err(StoryError::malformed(Stage::Judge))?;

        let scores = match object.get("scores") {
            Some(Value::Object(map)) => Scores::try_from(map.clone()),
            _ => Err(ParseError::MissingField("scores")),
        }
        .map_err(StoryError::malformed(Stage::Judge))?;

        let issues = match object.get("issues") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|issue| issue.trim().to_owned())
                .filter(|issue| !issue.is_empty())
                .collect(),
            Some(Value::String(issue)) if !issue.trim().is_empty() => vec![issue.trim().to_owned()],
            _ => Vec::new(),
        };
        let edit_instructions = object
            .get("edit_instructions")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_owned();

        let verdict = Verdict::new(scores, issues, edit_instructions);
        if let Some(claimed) = object.get("pass").and_then(Value::as_bool)
            && claimed != verdict.pass
        {
            tracing::warn!(
                claimed,
                computed = verdict.pass,
                average = verdict.scores.average,
                "judge pass flag disagrees with its scores; using computed value"
            );
        }
        Ok(verdict)
    }

    pub fn requirements_satisfaction(&self) -> Option<f64> {
        self.scores.get(Dimension::RequirementsSatisfaction)
    }

    /// Stop condition for tweak rounds: an overall pass is not enough, the
    /// tweak itself must be honoured.
    pub fn satisfies_tweak(&self) -> bool {
        self.pass
            && self
                .requirements_satisfaction()
                .is_some_and(|score| score >= PASS_MIN_SCORE)
    }

    /// Appends a tagged user directive, keeping whatever was there.
    pub fn append_user_tweak(&mut self, tweak: &str) {
        let directive = format!("{USER_TWEAK_TAG} {}", tweak.trim());
        self.edit_instructions = format!("{} {directive}", self.edit_instructions)
            .trim()
            .to_owned();
    }

    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

/// Judge stage. `tweak` is judging context only; "None" when absent.
pub async fn judge(
    generator: &dyn TextGenerator,
    brief: &Brief,
    story: &Story,
    tweak: Option<&str>,
) -> Result<Verdict, StoryError> {
    judge_with(generator, brief, story, tweak, None).await
}

pub async fn judge_chapter(
    generator: &dyn TextGenerator,
    brief: &Brief,
    story: &Story,
    chapter: &ChapterContext,
) -> Result<Verdict, StoryError> {
    judge_with(generator, brief, story, None, Some(chapter)).await
}

async fn judge_with(
    generator: &dyn TextGenerator,
    brief: &Brief,
    story: &Story,
    tweak: Option<&str>,
    chapter: Option<&ChapterContext>,
) -> Result<Verdict, StoryError> {
    let request = prompts::judge(&brief.to_prompt_json(), story.as_str(), tweak, chapter);
    let reply = generator
        .generate(&request)
        .await
        .map_err(StoryError::service(Stage::Judge))?;
    let verdict = Verdict::from_reply(&reply)?;

    tracing::info!(
        chapter = ?chapter.map(|c| c.number),
        average = verdict.scores.average,
        pass = verdict.pass,
        issues = verdict.issues.len(),
        "judged story"
    );
    Ok(verdict)
}
