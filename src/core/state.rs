use crate::core::error::{BookError, BookResult};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub description: String, // Prompt fragment describing the look
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Pending,
    Generating,
    Done,
    Error,
}

impl PageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PageStatus::Done | PageStatus::Error)
    }

    /// Only pending -> generating and generating -> done/error are allowed.
    pub fn can_move_to(self, next: PageStatus) -> bool {
        matches!(
            (self, next),
            (PageStatus::Pending, PageStatus::Generating)
                | (PageStatus::Generating, PageStatus::Done)
                | (PageStatus::Generating, PageStatus::Error)
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Page {
    pub id: u32,
    pub description: String,
    #[serde(default)]
    pub dialogue: Vec<String>,
    pub image_url: Option<String>,
    pub status: PageStatus,
}

impl Page {
    pub fn pending(id: u32, description: String, dialogue: Vec<String>) -> Self {
        Self {
            id,
            description,
            dialogue,
            image_url: None,
            status: PageStatus::Pending,
        }
    }

    fn advance(&mut self, next: PageStatus) -> BookResult<()> {
        if !self.status.can_move_to(next) {
            return Err(BookError::Workflow(format!(
                "page {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> BookResult<()> {
        self.advance(PageStatus::Generating)
    }

    pub fn finish(&mut self, image_url: String) -> BookResult<()> {
        self.advance(PageStatus::Done)?;
        self.image_url = Some(image_url);
        Ok(())
    }

    pub fn fail(&mut self) -> BookResult<()> {
        self.advance(PageStatus::Error)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Story {
    pub title: String,
    pub subtitle: String,
    pub pages: Vec<Page>,
}

impl Story {
    pub fn new(characters: &[Character], story_idea: &str, pages: Vec<Page>) -> Self {
        let names = characters
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" & ");
        Self {
            title: format!("The Adventures of {}", names),
            subtitle: story_idea.to_string(),
            pages,
        }
    }

    /// Returns a copy with `page_index` replaced by the result of `update`.
    /// The original snapshot is left untouched.
    pub fn with_page<F>(&self, page_index: usize, update: F) -> BookResult<Story>
    where
        F: FnOnce(&mut Page) -> BookResult<()>,
    {
        let mut next = self.clone();
        let page = next.pages.get_mut(page_index).ok_or_else(|| {
            BookError::Workflow(format!("no page at index {}", page_index))
        })?;
        update(page)?;
        Ok(next)
    }

    pub fn count(&self, status: PageStatus) -> usize {
        self.pages.iter().filter(|p| p.status == status).count()
    }
}

/// The five screens of the maker, as an explicit machine.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Setup,
    Characters,
    Story,
    Generating,
    Preview,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    CredentialsSaved,
    CredentialsCleared,
    CharactersChosen,
    BackToCharacters,
    GenerationStarted,
    GenerationFinished,
    GenerationFailed,
    NewStory,
}

impl Step {
    /// The step a session should open on, given whether credentials were found.
    pub fn initial(has_credentials: bool) -> Self {
        if has_credentials {
            Step::Characters
        } else {
            Step::Setup
        }
    }

    pub fn apply(self, event: Event) -> BookResult<Step> {
        let next = match (self, event) {
            (Step::Setup, Event::CredentialsSaved) => Step::Characters,
            (Step::Characters, Event::CredentialsCleared) => Step::Setup,
            (Step::Characters, Event::CharactersChosen) => Step::Story,
            (Step::Story, Event::BackToCharacters) => Step::Characters,
            (Step::Story, Event::GenerationStarted) => Step::Generating,
            (Step::Generating, Event::GenerationFinished) => Step::Preview,
            (Step::Generating, Event::GenerationFailed) => Step::Story,
            (Step::Preview, Event::NewStory) => Step::Story,
            (from, ev) => {
                return Err(BookError::Workflow(format!(
                    "{:?} does not accept {:?}",
                    from, ev
                )))
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pages() -> Vec<Page> {
        vec![
            Page::pending(1, "Park".to_string(), vec!["James: Hi!".to_string()]),
            Page::pending(2, "Tree".to_string(), vec![]),
        ]
    }

    #[test]
    fn test_title_joins_names() {
        let chars = vec![
            Character {
                id: "james".to_string(),
                name: "James".to_string(),
                description: "dog".to_string(),
                is_default: true,
            },
            Character {
                id: "cheetah".to_string(),
                name: "Cheetah".to_string(),
                description: "cat".to_string(),
                is_default: true,
            },
        ];
        let story = Story::new(&chars, "A treehouse hunt", sample_pages());
        assert_eq!(story.title, "The Adventures of James & Cheetah");
        assert_eq!(story.subtitle, "A treehouse hunt");
    }

    #[test]
    fn test_page_status_only_moves_forward() {
        let mut page = Page::pending(1, "x".to_string(), vec![]);
        assert!(page.finish("u".to_string()).is_err());
        page.start().unwrap();
        page.finish("http://img/1.png".to_string()).unwrap();
        assert_eq!(page.status, PageStatus::Done);
        assert!(page.start().is_err());
        assert!(page.fail().is_err());
        assert_eq!(page.image_url.as_deref(), Some("http://img/1.png"));
    }

    #[test]
    fn test_with_page_leaves_snapshot_untouched() {
        let story = Story {
            title: "t".to_string(),
            subtitle: "s".to_string(),
            pages: sample_pages(),
        };
        let next = story.with_page(0, |p| p.start()).unwrap();
        assert_eq!(story.pages[0].status, PageStatus::Pending);
        assert_eq!(next.pages[0].status, PageStatus::Generating);
        assert!(story.with_page(5, |p| p.start()).is_err());
    }

    #[test]
    fn test_step_transitions() {
        assert_eq!(Step::initial(false), Step::Setup);
        assert_eq!(Step::initial(true), Step::Characters);

        let step = Step::Setup.apply(Event::CredentialsSaved).unwrap();
        let step = step.apply(Event::CharactersChosen).unwrap();
        let step = step.apply(Event::GenerationStarted).unwrap();
        assert_eq!(step, Step::Generating);
        assert_eq!(step.apply(Event::GenerationFailed).unwrap(), Step::Story);
        let step = step.apply(Event::GenerationFinished).unwrap();
        assert_eq!(step, Step::Preview);
        assert_eq!(step.apply(Event::NewStory).unwrap(), Step::Story);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(Step::Setup.apply(Event::GenerationStarted).is_err());
        assert!(Step::Preview.apply(Event::GenerationFinished).is_err());
        assert!(Step::Generating.apply(Event::NewStory).is_err());
    }
}
