//! Terminal front-end: prompts for each step and a progress bar for generation.

use crate::core::state::{PageStatus, Story};
use crate::services::characters::{badge, CharacterRegistry};
use crate::services::credentials::CredentialKind;
use crate::services::workflow::PipelineObserver;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{MultiSelect, Select, Text};
use std::fmt;
use std::sync::Mutex;

/// Rough per-image price shown before a run, in US dollars.
const COST_PER_IMAGE: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterAction {
    Next,
    AddCustom,
    ChangeKey,
}

impl fmt::Display for CharacterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacterAction::Next => write!(f, "Next: Story →"),
            CharacterAction::AddCustom => write!(f, "+ Add Custom Character"),
            CharacterAction::ChangeKey => write!(f, "← Change API Key"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewAction {
    Save,
    NewStory,
    Quit,
}

impl fmt::Display for PreviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewAction::Save => write!(f, "📥 Save for Printing"),
            PreviewAction::NewStory => write!(f, "← New Story"),
            PreviewAction::Quit => write!(f, "Quit"),
        }
    }
}

pub fn banner() {
    println!("🎨 Coloring Book Maker");
    println!("Create custom coloring books for your kids\n");
}

pub fn show_error(message: &str) {
    eprintln!("✗ {}", message);
}

/// Multi-select over the catalog, then asks what to do next.
pub fn choose_characters(registry: &mut CharacterRegistry) -> Result<CharacterAction> {
    println!("\nStep 2: Choose Your Characters");

    let options: Vec<String> = registry
        .all()
        .iter()
        .map(|c| format!("{} {} - {}", badge(c), c.name, c.description))
        .collect();
    let defaults: Vec<usize> = registry
        .all()
        .iter()
        .enumerate()
        .filter(|(_, c)| registry.is_selected(&c.id))
        .map(|(i, _)| i)
        .collect();

    let picked = MultiSelect::new("Characters:", options)
        .with_default(&defaults)
        .raw_prompt()?;
    let ids: Vec<String> = picked
        .iter()
        .filter_map(|o| registry.all().get(o.index).map(|c| c.id.clone()))
        .collect();
    registry.set_selection(&ids)?;

    let action = Select::new(
        "What next?",
        vec![
            CharacterAction::Next,
            CharacterAction::AddCustom,
            CharacterAction::ChangeKey,
        ],
    )
    .prompt()?;

    if action == CharacterAction::AddCustom {
        let name = Text::new("Character name (e.g., Mr. Whiskers):").prompt()?;
        let description = Text::new("Description:")
            .with_help_message("e.g., An orange tabby cat with a bow tie and round glasses")
            .prompt()?;
        match registry.add_custom(&name, &description) {
            Some(c) => println!("Added {} {}", badge(c), c.name),
            None => show_error("Name and description are both required"),
        }
    }
    Ok(action)
}

/// Which stored credential to drop before returning to setup.
pub fn choose_credential_to_change(kinds: &[CredentialKind]) -> Result<CredentialKind> {
    if let [only] = kinds {
        return Ok(*only);
    }
    let labels: Vec<&str> = kinds.iter().map(|k| k.label()).collect();
    let picked = Select::new("Which key?", labels).raw_prompt()?;
    Ok(kinds[picked.index])
}

/// `None` means the user left the prompt empty to go back.
pub fn ask_story_idea(previous: &str) -> Result<Option<String>> {
    println!("\nStep 3: Describe Your Story");
    let idea = Text::new("What's the story about?")
        .with_initial_value(previous)
        .with_help_message(
            "e.g., They go on a treasure hunt at the beach and find a message in a bottle. Leave empty to go back.",
        )
        .prompt()?;
    let idea = idea.trim();
    Ok(if idea.is_empty() {
        None
    } else {
        Some(idea.to_string())
    })
}

pub fn print_cost_estimate(pages: usize, provider: &str) {
    if provider == "openai" {
        println!(
            "This takes about 1-2 minutes. Each image costs ~${:.2} ({} pages ≈ ${:.2}).",
            COST_PER_IMAGE,
            pages,
            COST_PER_IMAGE * pages as f64
        );
    } else {
        println!("This takes about 1-2 minutes.");
    }
}

fn status_icon(status: PageStatus) -> &'static str {
    match status {
        PageStatus::Pending => "○",
        PageStatus::Generating => "⏳",
        PageStatus::Done => "✓",
        PageStatus::Error => "✗",
    }
}

pub fn show_preview(story: &Story) {
    println!("\n{}", story.title);
    println!("{}\n", story.subtitle);
    for (i, page) in story.pages.iter().enumerate() {
        let image = match (&page.image_url, page.status) {
            (Some(url), _) => url.as_str(),
            (None, PageStatus::Error) => "Error",
            (None, _) => "No image",
        };
        println!("{} Page {}: {}", status_icon(page.status), i + 1, image);
        if let Some(first) = page.dialogue.first() {
            println!("    {}", first);
        }
    }
}

pub fn preview_action() -> Result<PreviewAction> {
    Ok(Select::new(
        "\nWhat next?",
        vec![
            PreviewAction::Save,
            PreviewAction::NewStory,
            PreviewAction::Quit,
        ],
    )
    .prompt()?)
}

pub fn print_printing_tips() {
    println!("\n🖨️ Printing Tips");
    println!("• Open the file in your browser and print (Cmd+P / Ctrl+P)");
    println!("• Select \"Print to PDF\" or print directly");
    println!("• Use regular paper or thicker cardstock for best coloring");
}

/// Draws one progress bar over the pages of a run.
#[derive(Default)]
pub struct ProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bar) = self.bar.lock() {
            if let Some(bar) = bar.as_ref() {
                f(bar);
            }
        }
    }
}

impl PipelineObserver for ProgressObserver {
    fn on_outline_ready(&self, story: &Story) {
        println!("\nCreating Your Coloring Book...");
        let pb = ProgressBar::new(story.pages.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        if let Ok(mut bar) = self.bar.lock() {
            *bar = Some(pb);
        }
    }

    fn on_story_updated(&self, story: &Story) {
        let finished = story.pages.iter().filter(|p| p.status.is_terminal()).count();
        let current = story
            .pages
            .iter()
            .find(|p| p.status == PageStatus::Generating)
            .map(|p| format!("Page {}: {}", p.id, p.description))
            .unwrap_or_default();
        self.with_bar(|bar| {
            bar.set_position(finished as u64);
            bar.set_message(current);
        });
    }

    fn on_finished(&self, story: &Story) {
        let failed = story.count(PageStatus::Error);
        self.with_bar(|bar| {
            if failed == 0 {
                bar.finish_with_message("All pages ready");
            } else {
                bar.finish_with_message(format!("{} page(s) failed", failed));
            }
        });
    }
}
