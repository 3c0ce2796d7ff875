#![forbid(unsafe_code)]

pub mod brief;
pub mod chapter;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod generator;
pub mod judge;
pub mod logging;
pub mod normalize;
pub mod openai;
pub mod parse;
pub mod prompts;
pub mod refine;
pub mod session;
pub mod session_store;
pub mod story;
pub mod tweak;

pub use brief::{Brief, Category, build_brief};
pub use chapter::{ChapterSequence, generate_first_chapter, generate_next_chapter};
pub use error::{Stage, StoryError};
pub use generator::{GenerationRequest, OpenAiGenerator, ServiceError, TextGenerator};
pub use judge::{Verdict, judge};
pub use refine::{Generation, RoundHistory, RoundId, generate};
pub use session::{Mode, Session};
pub use story::{Story, draft, edit};
pub use tweak::apply_tweak;
