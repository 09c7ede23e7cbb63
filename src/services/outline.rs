use crate::core::error::{BookError, BookResult};
use crate::core::state::{Character, Page};
use crate::services::llm::LlmClient;
use log::{debug, error, warn};
use serde::Deserialize;

pub const PAGE_COUNT: usize = 6;

const SYSTEM_PROMPT: &str = "You are a children's book author creating a coloring book story.

Given characters and a story idea, create a 6-page story outline. Each page should have:
1. A visual scene description (what to draw - be specific about character poses, setting, action)
2. 1-2 short dialogue lines

Output as JSON array with this format:
[
  {
    \"pageNumber\": 1,
    \"sceneDescription\": \"detailed visual description for the illustrator\",
    \"dialogue\": [\"Character: Line 1\", \"Character: Line 2\"]
  }
]

Keep it fun, age-appropriate for 5-7 year olds, with a simple adventure arc (beginning, challenge, resolution).";

#[derive(Deserialize)]
struct OutlineEntry {
    #[serde(rename = "pageNumber", default)]
    #[allow(dead_code)]
    page_number: Option<u32>,
    #[serde(rename = "sceneDescription")]
    scene_description: String,
    #[serde(default)]
    dialogue: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct OutlineGenerator {
    llm: Box<dyn LlmClient>,
}

impl OutlineGenerator {
    pub fn new(llm: Box<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    pub fn user_prompt(&self, characters: &[Character], story_idea: &str) -> String {
        let char_descriptions = characters
            .iter()
            .map(|c| format!("{}: {}", c.name, c.description))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Characters:\n{}\n\nStory idea: {}\n\nCreate a {}-page coloring book story.",
            char_descriptions, story_idea, PAGE_COUNT
        )
    }

    /// One text-generation call, no retry. Parse failures are fatal.
    pub async fn generate(&self, characters: &[Character], story_idea: &str) -> BookResult<Vec<Page>> {
        if characters.is_empty() {
            return Err(BookError::Workflow(
                "Please select at least one character".to_string(),
            ));
        }
        if story_idea.trim().is_empty() {
            return Err(BookError::Workflow(
                "Please describe your story idea".to_string(),
            ));
        }

        let prompt = self.user_prompt(characters, story_idea);
        let content = match self.llm.chat(self.system_prompt(), &prompt).await {
            Ok(c) => c,
            Err(BookError::Generation { status, message }) => {
                error!("Outline request rejected: {}", message);
                return Err(BookError::Generation {
                    status,
                    message: "Failed to generate story outline".to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        parse_outline(&content)
    }
}

/// Parses the completion into pending pages numbered 1..N.
pub fn parse_outline(content: &str) -> BookResult<Vec<Page>> {
    let clean_json = strip_code_blocks(content);
    debug!("Outline JSON: {}", clean_json);

    let entries: Vec<OutlineEntry> = serde_json::from_str(&clean_json).map_err(|e| {
        BookError::MalformedResponse(format!("Failed to parse outline JSON: {}", e))
    })?;

    if entries.is_empty() {
        return Err(BookError::MalformedResponse(
            "Outline contained no pages".to_string(),
        ));
    }
    if entries.len() != PAGE_COUNT {
        warn!("Expected {} pages, outline has {}", PAGE_COUNT, entries.len());
    }

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            Page::pending(
                i as u32 + 1,
                entry.scene_description,
                entry.dialogue.unwrap_or_default(),
            )
        })
        .collect())
}

/// Strips an opening fence (with its optional language tag) and the closing
/// fence independently, so a half-fenced reply still parses.
pub fn strip_code_blocks(s: &str) -> String {
    let mut s = s.trim();
    // Prose such as "Here you go:" on the lines before an opening fence.
    if !s.starts_with("```") {
        if let Some(nl) = s.find("\n```") {
            if nl + 4 < s.len() {
                s = &s[nl + 1..];
            }
        }
    }

    match s.strip_prefix("```") {
        Some(rest) => {
            let body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
            let body = match body.rfind("```") {
                Some(end) => &body[..end],
                None => body,
            };
            body.trim().to_string()
        }
        None => s.trim_end_matches("```").trim().to_string(),
    }
}
