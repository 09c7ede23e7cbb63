use crate::core::config::Config;
use crate::core::error::{BookError, BookResult};
use crate::core::state::{Character, Story};
use crate::services::image::{create_image_client, ImageGenerator, ProviderKeys, RetryPolicy};
use crate::services::llm::create_llm;
use crate::services::outline::OutlineGenerator;
use crate::utils::time::Sleeper;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

/// Receives a fresh, immutable snapshot after every page transition.
pub trait PipelineObserver: Send + Sync {
    fn on_outline_ready(&self, _story: &Story) {}
    fn on_story_updated(&self, _story: &Story) {}
    fn on_finished(&self, _story: &Story) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

pub struct PipelineDriver {
    outline: OutlineGenerator,
    images: ImageGenerator,
    sleeper: Arc<dyn Sleeper>,
    page_delay: Duration,
}

impl PipelineDriver {
    pub fn new(
        outline: OutlineGenerator,
        images: ImageGenerator,
        sleeper: Arc<dyn Sleeper>,
        page_delay: Duration,
    ) -> Self {
        Self {
            outline,
            images,
            sleeper,
            page_delay,
        }
    }

    /// Wires the outline and image clients from configuration.
    /// The outline always goes through OpenAI, whatever the image provider.
    pub fn from_config(
        config: &Config,
        keys: &ProviderKeys,
        relay_url: &str,
        sleeper: Arc<dyn Sleeper>,
    ) -> BookResult<Self> {
        let openai_key = keys
            .openai
            .as_deref()
            .ok_or_else(|| BookError::Credential("OpenAI API key is not set".to_string()))?;
        let llm = create_llm(&config.llm, openai_key);
        let client = create_image_client(&config.image, keys, relay_url, sleeper.clone())?;
        let images = ImageGenerator::new(
            client,
            RetryPolicy::from(&config.image.retry),
            sleeper.clone(),
        );
        Ok(Self::new(
            OutlineGenerator::new(llm),
            images,
            sleeper,
            Duration::from_millis(config.image.page_delay_ms),
        ))
    }

    pub fn provider(&self) -> &'static str {
        self.images.provider()
    }

    /// Outline first, then one image per page, strictly in order.
    ///
    /// An outline failure aborts before any page exists. A page failure is
    /// recorded on that page and the run moves on to the next one.
    pub async fn run(
        &self,
        characters: &[Character],
        story_idea: &str,
        observer: &dyn PipelineObserver,
    ) -> BookResult<Story> {
        info!("Generating story outline...");
        let pages = self.outline.generate(characters, story_idea).await?;

        let mut story = Story::new(characters, story_idea, pages);
        observer.on_outline_ready(&story);

        let total = story.pages.len();
        info!(
            "Generating {} pages with provider {}",
            total,
            self.images.provider()
        );

        for i in 0..total {
            story = story.with_page(i, |p| p.start())?;
            observer.on_story_updated(&story);

            let page = story.pages[i].clone();
            story = match self.images.generate(&page, characters).await {
                Ok(url) if !url.trim().is_empty() => story.with_page(i, |p| p.finish(url))?,
                Ok(_) => {
                    error!("Error generating page {}: provider returned an empty URL", page.id);
                    story.with_page(i, |p| p.fail())?
                }
                Err(e) => {
                    error!("Error generating page {}: {}", page.id, e);
                    story.with_page(i, |p| p.fail())?
                }
            };
            observer.on_story_updated(&story);

            if i + 1 < total {
                self.sleeper.sleep(self.page_delay).await;
            }
        }

        observer.on_finished(&story);
        Ok(story)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::PageStatus;
    use crate::services::characters::CharacterRegistry;
    use crate::services::image::ImageClient;
    use crate::services::llm::LlmClient;
    use crate::utils::time::RecordingSleeper;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const OUTLINE: &str = r#"```json
    [
        {"pageNumber": 1, "sceneDescription": "scene one", "dialogue": ["A: one"]},
        {"pageNumber": 2, "sceneDescription": "scene two", "dialogue": ["B: two"]},
        {"pageNumber": 3, "sceneDescription": "scene three"},
        {"pageNumber": 4, "sceneDescription": "scene four"},
        {"pageNumber": 5, "sceneDescription": "scene five"},
        {"pageNumber": 6, "sceneDescription": "scene six"}
    ]
    ```"#;

    #[derive(Debug)]
    struct MockLlmClient {
        reply: String,
        call_count: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn chat(&self, _system: &str, _user: &str) -> BookResult<String> {
            *self.call_count.lock().unwrap() += 1;
            Ok(self.reply.clone())
        }
    }

    /// Fails for every prompt containing one of `failing`.
    struct MockImageClient {
        failing: Vec<&'static str>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ImageClient for MockImageClient {
        async fn generate(&self, prompt: &str) -> BookResult<String> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            if self.failing.iter().any(|f| prompt.starts_with(f)) {
                return Err(BookError::with_status(400, "content policy violation"));
            }
            Ok(format!("https://img.example/{}.png", prompts.len()))
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        snapshots: Mutex<Vec<Story>>,
        finished: Mutex<bool>,
    }

    impl PipelineObserver for RecordingObserver {
        fn on_outline_ready(&self, story: &Story) {
            self.snapshots.lock().unwrap().push(story.clone());
        }
        fn on_story_updated(&self, story: &Story) {
            self.snapshots.lock().unwrap().push(story.clone());
        }
        fn on_finished(&self, _story: &Story) {
            *self.finished.lock().unwrap() = true;
        }
    }

    struct Harness {
        driver: PipelineDriver,
        llm_calls: Arc<Mutex<usize>>,
        prompts: Arc<Mutex<Vec<String>>>,
        sleeper: RecordingSleeper,
    }

    fn harness(reply: &str, failing: Vec<&'static str>) -> Harness {
        let llm_calls = Arc::new(Mutex::new(0));
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let sleeper = RecordingSleeper::new();
        let shared: Arc<dyn Sleeper> = Arc::new(sleeper.clone());

        let outline = OutlineGenerator::new(Box::new(MockLlmClient {
            reply: reply.to_string(),
            call_count: llm_calls.clone(),
        }));
        let images = ImageGenerator::new(
            Box::new(MockImageClient {
                failing,
                prompts: prompts.clone(),
            }),
            RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_secs(10),
            },
            shared.clone(),
        );
        Harness {
            driver: PipelineDriver::new(outline, images, shared, Duration::from_millis(1000)),
            llm_calls,
            prompts,
            sleeper,
        }
    }

    fn characters() -> Vec<Character> {
        CharacterRegistry::with_defaults().selected()
    }

    #[tokio::test]
    async fn test_full_run_reaches_terminal_states() -> BookResult<()> {
        let h = harness(OUTLINE, vec![]);
        let observer = RecordingObserver::default();
        let story = h.driver.run(&characters(), "Treasure hunt", &observer).await?;

        assert_eq!(story.title, "The Adventures of James & Cheetah");
        assert_eq!(story.pages.len(), 6);
        for page in &story.pages {
            assert_eq!(page.status, PageStatus::Done);
            assert!(!page.image_url.as_deref().unwrap_or("").is_empty());
        }
        assert_eq!(*h.llm_calls.lock().unwrap(), 1);
        assert!(*observer.finished.lock().unwrap());

        // Pages are requested strictly in outline order.
        let prompts = h.prompts.lock().unwrap();
        let order: Vec<_> = prompts
            .iter()
            .map(|p| p.split('\n').next().unwrap().to_string())
            .collect();
        assert_eq!(
            order,
            vec!["scene one", "scene two", "scene three", "scene four", "scene five", "scene six"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_page_does_not_stop_later_pages() -> BookResult<()> {
        let h = harness(OUTLINE, vec!["scene one", "scene four"]);
        let story = h.driver.run(&characters(), "Treasure hunt", &NoopObserver).await?;

        let statuses: Vec<_> = story.pages.iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![
                PageStatus::Error,
                PageStatus::Done,
                PageStatus::Done,
                PageStatus::Error,
                PageStatus::Done,
                PageStatus::Done
            ]
        );
        assert!(story.pages[0].image_url.is_none());
        assert_eq!(h.prompts.lock().unwrap().len(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_status_never_regresses_across_snapshots() -> BookResult<()> {
        let h = harness(OUTLINE, vec!["scene two"]);
        let observer = RecordingObserver::default();
        h.driver.run(&characters(), "Treasure hunt", &observer).await?;

        fn rank(s: PageStatus) -> u8 {
            match s {
                PageStatus::Pending => 0,
                PageStatus::Generating => 1,
                PageStatus::Done | PageStatus::Error => 2,
            }
        }

        let snapshots = observer.snapshots.lock().unwrap();
        // Outline snapshot plus two transitions per page.
        assert_eq!(snapshots.len(), 1 + 6 * 2);
        for pair in snapshots.windows(2) {
            assert_eq!(pair[0].pages.len(), pair[1].pages.len());
            for (before, after) in pair[0].pages.iter().zip(&pair[1].pages) {
                assert!(rank(after.status) >= rank(before.status));
                if before.status.is_terminal() {
                    assert_eq!(before.status, after.status);
                }
            }
        }
        // Only one page is in flight at a time.
        for snap in snapshots.iter() {
            assert!(snap.count(PageStatus::Generating) <= 1);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_delay_between_pages_only() -> BookResult<()> {
        let h = harness(OUTLINE, vec![]);
        h.driver.run(&characters(), "Treasure hunt", &NoopObserver).await?;
        assert_eq!(h.sleeper.calls(), vec![Duration::from_millis(1000); 5]);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_outline_aborts_before_pages() {
        let h = harness("I'd love to help! Here's a story...", vec![]);
        let observer = RecordingObserver::default();
        let result = h.driver.run(&characters(), "Treasure hunt", &observer).await;

        assert!(matches!(result, Err(BookError::MalformedResponse(_))));
        assert!(observer.snapshots.lock().unwrap().is_empty());
        assert!(h.prompts.lock().unwrap().is_empty());
        assert!(!*observer.finished.lock().unwrap());
    }

    #[test]
    fn test_from_config_needs_openai_key() {
        let config = Config::default();
        let sleeper: Arc<dyn Sleeper> = Arc::new(RecordingSleeper::new());
        let keys = ProviderKeys {
            replicate: Some("r8_token".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            PipelineDriver::from_config(&config, &keys, "http://relay", sleeper.clone()),
            Err(BookError::Credential(_))
        ));

        let keys = ProviderKeys {
            openai: Some("sk-test".to_string()),
            ..Default::default()
        };
        let driver = PipelineDriver::from_config(&config, &keys, "http://relay", sleeper).unwrap();
        assert_eq!(driver.provider(), "openai");
    }
}
