//! System directives and user prompts for each pipeline stage.

use crate::chapter::ChapterContext;
use crate::generator::GenerationRequest;

const CLASSIFY_MAX_TOKENS: u32 = 400;
const CLASSIFY_TEMPERATURE: f32 = 0.2;
const DRAFT_MAX_TOKENS: u32 = 1200;
const DRAFT_TEMPERATURE: f32 = 0.8;
const JUDGE_MAX_TOKENS: u32 = 500;
const JUDGE_TEMPERATURE: f32 = 0.1;
const EDIT_MAX_TOKENS: u32 = 1200;
const EDIT_TEMPERATURE: f32 = 0.6;

pub const CLASSIFIER_SYSTEM: &str = "\
You are a story brief classifier for a bedtime story generator.\n\
Turn the user's request into a compact JSON brief for children aged 5-10.\n\
Always output ONLY valid JSON with these keys:\n\
- title_hint: short phrase (string)\n\
- category: one of [\"bedtime-calm\",\"adventure\",\"animal-friends\",\"learning-moral\",\"fantasy\",\"silly\"]\n\
- setting: short phrase (string)\n\
- characters: array of 2-4 short descriptions\n\
- moral: short phrase (e.g. \"kindness\", \"courage\", \"sharing\")\n\
- tone: short phrase (e.g. \"gentle and soothing\")\n\
- length_words: integer between 400 and 700\n\
- avoid_topics: array of strings (always include unsafe topics)\n\
- age_range: \"5-10\"\n\
If the request is vague, choose safe defaults for a bedtime story.\n";

pub const STORYTELLER_SYSTEM: &str = "\
You are a bedtime storyteller writing for children aged 5-10.\n\
Write a calm, safe story from the provided brief.\n\
\n\
Rules:\n\
- 400-700 words, simple vocabulary, short sentences.\n\
- Clear structure: title line, then beginning, middle and end.\n\
- The FIRST LINE must be ONLY the title text (no quotes, no trailing punctuation).\n\
- Do NOT use markdown or labels: no '**', '#', backticks, 'Title:' or 'Title'.\n\
- Include a gentle conflict and a reassuring resolution.\n\
- End with a friendly one-sentence moral that echoes the brief.\n\
- Avoid violence, glorified bullying, fear, adult themes and dark imagery.\n\
- Keep the tone soothing even for adventures; stakes stay very low.\n\
- Use occasional dialogue with simple tags (\"said\", \"asked\").\n\
Output the title on its own line, then the story paragraphs. No commentary.\n";

pub const JUDGE_SYSTEM: &str = "\
You are a strict children's literature judge for ages 5-10.\n\
Evaluate the story against this rubric and return ONLY valid JSON.\n\
\n\
Rubric (scores 0-10):\n\
- age_fit: vocabulary and sentences suit ages 5-10\n\
- tone: bedtime-suitable, kind, calming\n\
- structure: clear beginning, middle and end with a small conflict and resolution\n\
- clarity: coherent and easy to follow\n\
- safety: avoids scary, violent or adult themes\n\
- bedtime_suitability: winds down and reassures at the end\n\
- requirements_satisfaction: follows the BRIEF and the USER_TWEAK\n\
\n\
Passing criteria: every individual score >= 8 AND average >= 8.5.\n\
\n\
Return JSON:\n\
{\n\
  \"scores\": {\n\
    \"age_fit\": int, \"tone\": int, \"structure\": int, \"clarity\": int,\n\
    \"safety\": int, \"bedtime_suitability\": int, \"requirements_satisfaction\": int,\n\
    \"average\": float\n\
  },\n\
  \"pass\": boolean,\n\
  \"issues\": [\"short bullet\", \"short bullet\"],\n\
  \"edit_instructions\": \"one concise paragraph of concrete edits\"\n\
}\n";

pub const EDITOR_SYSTEM: &str = "\
You are a careful children's story editor. Apply the judge's edit instructions\n\
AND the USER_TWEAK exactly. If the tweak conflicts with safety or age rules, safety wins.\n\
Keep the brief and tone intact. Keep the length at 400-700 words and preserve names and setting.\n\
Apply plot, setting and name changes consistently across the whole story.\n\
Formatting:\n\
- The FIRST LINE must be ONLY the title text (no quotes, no punctuation like ':').\n\
- No markdown or labels anywhere: no '**', '#', backticks, 'Title:'.\n\
Output ONLY the revised story (title + paragraphs). No commentary.\n";

pub fn classify(request: &str) -> GenerationRequest {
    GenerationRequest {
        system: CLASSIFIER_SYSTEM.to_owned(),
        prompt: format!(
            "User request:\n\"\"\"{request}\"\"\"\n\nReturn ONLY the JSON brief.\n"
        ),
        max_tokens: CLASSIFY_MAX_TOKENS,
        temperature: CLASSIFY_TEMPERATURE,
    }
}

pub fn draft(brief_json: &str, chapter: Option<&ChapterContext>) -> GenerationRequest {
    let mut prompt = format!("BRIEF (JSON):\n{brief_json}\n\n");
    match chapter {
        None => prompt.push_str("Write the story now. Title on first line.\n"),
        Some(chapter) => {
            push_story_so_far(&mut prompt, chapter);
            prompt.push_str(&format!(
                "Write CHAPTER {number} of a multi-part bedtime arc.\n\
- Give the chapter its own title on the first line.\n\
- Continue naturally from the story so far; keep names, setting and tone consistent.\n",
                number = chapter.number,
            ));
            prompt.push_str(finale_directive(chapter));
        }
    }

    GenerationRequest {
        system: STORYTELLER_SYSTEM.to_owned(),
        prompt,
        max_tokens: DRAFT_MAX_TOKENS,
        temperature: DRAFT_TEMPERATURE,
    }
}

pub fn judge(
    brief_json: &str,
    story: &str,
    tweak: Option<&str>,
    chapter: Option<&ChapterContext>,
) -> GenerationRequest {
    let mut prompt = format!(
        "BRIEF (JSON):\n{brief_json}\n\nUSER_TWEAK:\n{tweak}\n\n",
        tweak = tweak_or_none(tweak),
    );
    if let Some(chapter) = chapter {
        push_story_so_far(&mut prompt, chapter);
        prompt.push_str(&format!(
            "The story below is CHAPTER {number}; judge it as one part of the arc, including continuity.\n\n",
            number = chapter.number,
        ));
    }
    prompt.push_str(&format!(
        "STORY:\n\"\"\"{story}\"\"\"\n\nReturn ONLY the required JSON. No extra commentary.\n"
    ));

    GenerationRequest {
        system: JUDGE_SYSTEM.to_owned(),
        prompt,
        max_tokens: JUDGE_MAX_TOKENS,
        temperature: JUDGE_TEMPERATURE,
    }
}

pub fn edit(
    brief_json: &str,
    story: &str,
    verdict_json: &str,
    tweak: Option<&str>,
    chapter: Option<&ChapterContext>,
) -> GenerationRequest {
    let mut prompt = format!(
        "BRIEF (JSON):\n{brief_json}\n\nUSER_TWEAK (must implement):\n{tweak}\n\n",
        tweak = tweak_or_none(tweak),
    );
    if let Some(chapter) = chapter {
        push_story_so_far(&mut prompt, chapter);
        prompt.push_str(&format!(
            "The story below is CHAPTER {number}; keep it consistent with the story so far.\n",
            number = chapter.number,
        ));
        prompt.push_str(finale_directive(chapter));
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "STORY (to revise):\n\"\"\"{story}\"\"\"\n\n\
JUDGE VERDICT (JSON):\n{verdict_json}\n\n\
Revise the story accordingly and output only the revised story.\n"
    ));

    GenerationRequest {
        system: EDITOR_SYSTEM.to_owned(),
        prompt,
        max_tokens: EDIT_MAX_TOKENS,
        temperature: EDIT_TEMPERATURE,
    }
}

fn tweak_or_none(tweak: Option<&str>) -> &str {
    tweak
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("None")
}

fn push_story_so_far(prompt: &mut String, chapter: &ChapterContext) {
    if chapter.story_so_far.trim().is_empty() {
        prompt.push_str("STORY SO FAR:\n(none yet; this is the opening chapter)\n\n");
        return;
    }
    prompt.push_str(&format!(
        "STORY SO FAR:\n\"\"\"{}\"\"\"\n\n",
        chapter.story_so_far
    ));
}

// `end_in_next` and `end_now` are independent; both directives are emitted
// when a caller sets both.
fn finale_directive(chapter: &ChapterContext) -> &'static str {
    match (chapter.end_in_next, chapter.end_now) {
        (false, false) => "- End the chapter with a gentle, cozy hook toward the next chapter.\n",
        (true, false) => {
            "- The NEXT chapter will be the last: start gently gathering the threads toward a finale.\n"
        }
        (false, true) => {
            "- This is the FINAL chapter: resolve the arc warmly and close with the moral.\n"
        }
        (true, true) => {
            "- Start gathering the threads toward a finale.\n\
- This is the FINAL chapter: resolve the arc warmly and close with the moral.\n"
        }
    }
}
