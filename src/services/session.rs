use crate::core::error::{BookError, BookResult};
use crate::core::state::{Event, Step, Story};
use crate::services::characters::CharacterRegistry;
use crate::services::workflow::{PipelineDriver, PipelineObserver};
use log::{error, info};

/// One user's walk through setup, characters, story, generating and preview.
///
/// Every step change goes through `Step::apply`, so an out-of-order call is a
/// `Workflow` error and leaves the session untouched.
#[derive(Debug)]
pub struct Session {
    step: Step,
    characters: CharacterRegistry,
    story_idea: String,
    story: Option<Story>,
    last_error: Option<String>,
}

impl Session {
    pub fn new(has_credentials: bool) -> Self {
        Self {
            step: Step::initial(has_credentials),
            characters: CharacterRegistry::with_defaults(),
            story_idea: String::new(),
            story: None,
            last_error: None,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn characters(&self) -> &CharacterRegistry {
        &self.characters
    }

    pub fn characters_mut(&mut self) -> &mut CharacterRegistry {
        &mut self.characters
    }

    pub fn story_idea(&self) -> &str {
        &self.story_idea
    }

    pub fn story(&self) -> Option<&Story> {
        self.story.as_ref()
    }

    /// Message of the last failed run, cleared when a new run starts.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn fire(&mut self, event: Event) -> BookResult<()> {
        let next = self.step.apply(event)?;
        info!("Step {:?} -> {:?}", self.step, next);
        self.step = next;
        Ok(())
    }

    pub fn credentials_saved(&mut self) -> BookResult<()> {
        self.fire(Event::CredentialsSaved)
    }

    pub fn credentials_cleared(&mut self) -> BookResult<()> {
        self.fire(Event::CredentialsCleared)
    }

    pub fn confirm_characters(&mut self) -> BookResult<()> {
        if self.characters.selected().is_empty() {
            return Err(BookError::Workflow(
                "Please select at least one character".to_string(),
            ));
        }
        self.fire(Event::CharactersChosen)
    }

    pub fn back_to_characters(&mut self) -> BookResult<()> {
        self.fire(Event::BackToCharacters)
    }

    /// Runs the whole pipeline for `story_idea`.
    ///
    /// On success the session lands on the preview step holding the story.
    /// On an outline failure it returns to the story step with no story and
    /// the error is kept in `last_error`.
    pub async fn generate(
        &mut self,
        story_idea: &str,
        driver: &PipelineDriver,
        observer: &dyn PipelineObserver,
    ) -> BookResult<&Story> {
        let idea = story_idea.trim();
        if idea.is_empty() {
            return Err(BookError::Workflow(
                "Please describe your story idea".to_string(),
            ));
        }

        self.fire(Event::GenerationStarted)?;
        self.story_idea = idea.to_string();
        self.story = None;
        self.last_error = None;

        let characters = self.characters.selected();
        match driver.run(&characters, idea, observer).await {
            Ok(story) => {
                self.fire(Event::GenerationFinished)?;
                Ok(&*self.story.insert(story))
            }
            Err(e) => {
                error!("Generation error: {}", e);
                self.last_error = Some(e.to_string());
                self.fire(Event::GenerationFailed)?;
                Err(e)
            }
        }
    }

    /// Drops the current story and idea. The character selection survives.
    pub fn new_story(&mut self) -> BookResult<()> {
        self.fire(Event::NewStory)?;
        self.story = None;
        self.story_idea.clear();
        Ok(())
    }
}
