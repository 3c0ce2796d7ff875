use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Stage, StoryError};
use crate::generator::TextGenerator;
use crate::parse::parse_json_object;
use crate::prompts;

/// Topics every brief must avoid, whatever the classifier says.
pub const SAFETY_TOPICS: [&str; 6] = [
    "violence",
    "bullying",
    "fear",
    "adult themes",
    "weapons",
    "darkness",
];

pub const DEFAULT_AGE_RANGE: &str = "5-10";
pub const DEFAULT_LENGTH_WORDS: u32 = 550;
pub const MIN_LENGTH_WORDS: u32 = 400;
pub const MAX_LENGTH_WORDS: u32 = 700;
const MAX_CHARACTERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    BedtimeCalm,
    Adventure,
    AnimalFriends,
    LearningMoral,
    Fantasy,
    Silly,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::BedtimeCalm,
        Category::Adventure,
        Category::AnimalFriends,
        Category::LearningMoral,
        Category::Fantasy,
        Category::Silly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::BedtimeCalm => "bedtime-calm",
            Category::Adventure => "adventure",
            Category::AnimalFriends => "animal-friends",
            Category::LearningMoral => "learning-moral",
            Category::Fantasy => "fantasy",
            Category::Silly => "silly",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == key)
            .ok_or_else(|| format!("is not a known category: {s:?}"))
    }
}

/// Structured story plan derived from a free-text request.
///
/// Every constructor goes through [`Brief::from_raw`], so a `Brief` always
/// carries defaults for missing fields and the full [`SAFETY_TOPICS`] set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBrief")]
pub struct Brief {
    pub title_hint: String,
    pub category: Category,
    pub setting: String,
    pub characters: Vec<String>,
    pub moral: String,
    pub tone: String,
    pub length_words: u32,
    pub avoid_topics: BTreeSet<String>,
    pub age_range: String,
}

/// Brief as the classifier may return it: anything can be missing.
#[derive(Debug, Default, Deserialize)]
pub struct RawBrief {
    #[serde(default)]
    title_hint: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    setting: Option<String>,
    #[serde(default)]
    characters: Option<Vec<String>>,
    #[serde(default)]
    moral: Option<String>,
    #[serde(default)]
    tone: Option<String>,
    #[serde(default)]
    length_words: Option<Value>,
    #[serde(default)]
    avoid_topics: Option<Vec<String>>,
    #[serde(default)]
    age_range: Option<String>,
}

impl TryFrom<RawBrief> for Brief {
    type Error = StoryError;

    fn try_from(raw: RawBrief) -> Result<Self, Self::Error> {
        Brief::from_raw(raw)
    }
}

impl Brief {
    pub fn from_raw(raw: RawBrief) -> Result<Self, StoryError> {
        let category_text = raw
            .category
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| StoryError::Classification {
                field: "category",
                reason: "is missing".to_owned(),
            })?;
        let category = category_text
            .parse::<Category>()
            .map_err(|reason| StoryError::Classification {
                field: "category",
                reason,
            })?;

        let mut characters = raw
            .characters
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>();
        if characters.is_empty() {
            return Err(StoryError::Classification {
                field: "characters",
                reason: "has no usable entries".to_owned(),
            });
        }
        if characters.len() > MAX_CHARACTERS {
            tracing::info!(
                characters = characters.len(),
                "brief has too many characters; keeping the first four"
            );
            characters.truncate(MAX_CHARACTERS);
        }
        if characters.len() < 2 {
            tracing::warn!(
                characters = characters.len(),
                "brief has fewer than two characters"
            );
        }

        let length_words = parse_length_words(raw.length_words)?;

        let mut avoid_topics = raw
            .avoid_topics
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>();
        avoid_topics.extend(SAFETY_TOPICS.iter().map(|t| (*t).to_owned()));

        Ok(Brief {
            title_hint: text_or(raw.title_hint, "A Cozy Bedtime Story"),
            category,
            setting: text_or(raw.setting, "a quiet, cozy village"),
            characters,
            moral: text_or(raw.moral, "kindness"),
            tone: text_or(raw.tone, "gentle and soothing"),
            length_words,
            avoid_topics,
            age_range: text_or(raw.age_range, DEFAULT_AGE_RANGE),
        })
    }

    /// Parses a classifier reply, repairing prose around the JSON object.
    pub fn from_reply(reply: &str) -> Result<Self, StoryError> {
        let object = parse_json_object(reply).map_err(StoryError::malformed(Stage::Classify))?;
        let raw: RawBrief = serde_json::from_value(Value::Object(object)).map_err(|err| {
            StoryError::Classification {
                field: "brief",
                reason: format!("has fields of the wrong type: {err}"),
            }
        })?;
        Brief::from_raw(raw)
    }

    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

fn text_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn parse_length_words(value: Option<Value>) -> Result<u32, StoryError> {
    let words = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_LENGTH_WORDS),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    let words = words
        .filter(|w| w.is_finite())
        .ok_or_else(|| StoryError::Classification {
            field: "length_words",
            reason: "is not a number".to_owned(),
        })?;

    Ok(words
        .round()
        .clamp(f64::from(MIN_LENGTH_WORDS), f64::from(MAX_LENGTH_WORDS)) as u32)
}

/// Classifier stage: turns a free-text request into a [`Brief`].
pub async fn build_brief(generator: &dyn TextGenerator, request: &str) -> Result<Brief, StoryError> {
    let request = request.trim();
    if request.is_empty() {
        return Err(StoryError::InvalidInput("story request is empty".to_owned()));
    }

    let reply = generator
        .generate(&prompts::classify(request))
        .await
        .map_err(StoryError::service(Stage::Classify))?;
    let brief = Brief::from_reply(&reply)?;

    tracing::info!(
        category = %brief.category,
        moral = %brief.moral,
        characters = brief.characters.len(),
        length_words = brief.length_words,
        "built brief"
    );
    Ok(brief)
}

#[cfg(test)]
pub(crate) fn sample_brief() -> Brief {
    Brief::from_reply(
        r#"{
            "title_hint": "Kit Shares",
            "category": "learning-moral",
            "setting": "a sunny farmhouse kitchen",
            "characters": ["Kit, a curious kitten", "Mo, a gentle mouse"],
            "moral": "sharing",
            "tone": "gentle and soothing",
            "length_words": 500,
            "avoid_topics": ["scary monsters"]
        }"#,
    )
    .expect("sample brief parses")
}
