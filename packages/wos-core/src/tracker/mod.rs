//! Gift code tracker.
//!
//! Every tick fetches the code page, extracts the active codes, compares them
//! with the codes seen last time, mails the new ones and remembers the
//! current set. Expired codes are only logged.

use std::collections::BTreeSet;

use anyhow::Context;
use color_print::cprintln;
use log::{error, info};
use scraper::Html;

use crate::{
    config::TrackerConfig,
    scheduler::{Pipeline, TickReport},
    vision::text::TableExtractor,
};

pub mod fetch;
pub mod notify;
pub mod reconcile;
pub mod store;

pub use fetch::{HttpFetcher, PageFetcher};
pub use notify::{EmailNotifier, Notifier};
pub use reconcile::{reconcile, Reconciliation};
pub use store::TrackedCodes;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerOutcome {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    /// Whether the stored set was rewritten
    pub persisted: bool,
}

impl TickReport for TrackerOutcome {
    fn acted(&self) -> bool {
        !self.added.is_empty()
    }
}

pub struct CodeTracker {
    url: String,
    fetcher: Box<dyn PageFetcher>,
    extractor: TableExtractor,
    store: TrackedCodes,
    notifier: Option<Box<dyn Notifier>>,
}

impl CodeTracker {
    pub fn new(
        url: impl Into<String>,
        fetcher: impl PageFetcher + 'static,
        extractor: TableExtractor,
        store: TrackedCodes,
    ) -> Self {
        Self {
            url: url.into(),
            fetcher: Box::new(fetcher),
            extractor,
            store,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// Http fetching, the configured extraction rule, and mail if enabled
    pub fn from_config(config: &TrackerConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(&config.user_agent, config.timeout())?;
        let extractor = config
            .extract
            .compile()
            .context("invalid extraction rule")?;
        let mut tracker = Self::new(
            &config.url,
            fetcher,
            extractor,
            TrackedCodes::new(&config.history_file),
        );
        match &config.email {
            Some(email) if email.enabled => {
                tracker = tracker.with_notifier(EmailNotifier::new(email, &config.title, &config.url)?);
            }
            _ => info!("[CodeTracker]: email notification disabled"),
        }
        Ok(tracker)
    }

    pub fn store(&self) -> &TrackedCodes {
        &self.store
    }
}

impl Pipeline for CodeTracker {
    type Outcome = TrackerOutcome;

    fn name(&self) -> &str {
        "code tracker"
    }

    fn tick(&mut self) -> anyhow::Result<TrackerOutcome> {
        let page = self.fetcher.fetch(&self.url)?;
        let current = self.extractor.extract(&Html::parse_document(&page));
        info!("[CodeTracker]: {} active codes on {}", current.len(), self.url);

        let previous = self.store.load()?;
        let Reconciliation { added, removed } = reconcile(&previous, &current);

        if !added.is_empty() {
            cprintln!("<g><s>[CodeTracker]</s></g>: new codes: {:?}", added);
            match &self.notifier {
                Some(notifier) => {
                    if let Err(err) = notifier.notify(&added) {
                        error!("[CodeTracker]: failed to notify: {err:#}");
                    }
                }
                None => info!("[CodeTracker]: no notifier, skipped"),
            }
        }
        if !removed.is_empty() {
            info!("[CodeTracker]: expired codes removed: {:?}", removed);
        }

        let persisted = !(added.is_empty() && removed.is_empty());
        if persisted {
            self.store
                .save(&current)
                .with_context(|| format!("failed to persist codes to {:?}", self.store.path()))?;
        } else {
            info!("[CodeTracker]: no changes");
        }

        Ok(TrackerOutcome {
            added,
            removed,
            persisted,
        })
    }
}
