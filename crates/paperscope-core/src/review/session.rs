use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ReviewConfig;
use crate::error::{CoreError, Result};
use crate::models::{Dataset, Record};
use crate::storage::DatasetStore;

use super::highlight::Highlighter;
use super::machine::{self, ReviewAction, SessionEnd, Transition};

/// Interactive refinement over one dataset.
///
/// Every mutating action is persisted through the store before `apply`
/// returns, so a crash loses at most the action in flight. The cursor lives
/// here and is never written to the dataset.
pub struct ReviewSession<'a, S: DatasetStore> {
    dataset: &'a mut Dataset,
    store: S,
    config: ReviewConfig,
    highlighter: Highlighter,
    cursor: usize,
    ended: Option<SessionEnd>,
}

impl<'a, S: DatasetStore> ReviewSession<'a, S> {
    pub fn start(dataset: &'a mut Dataset, store: S, config: ReviewConfig) -> Result<Self> {
        let highlighter = Highlighter::new(&config.highlights)?;
        let cursor = if config.start_at_first_unreviewed {
            dataset.first_unreviewed().unwrap_or(0)
        } else {
            0
        };

        let mut session = Self {
            dataset,
            store,
            config,
            highlighter,
            cursor,
            ended: None,
        };
        session.refresh_highlights();
        info!(
            records = session.dataset.len(),
            cursor = session.cursor,
            "review session started"
        );
        Ok(session)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&Record> {
        self.dataset.get(self.cursor)
    }

    pub fn dataset(&self) -> &Dataset {
        self.dataset
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn ended(&self) -> Option<SessionEnd> {
        self.ended
    }

    pub fn apply(&mut self, action: ReviewAction) -> Result<Transition> {
        if self.ended.is_some() {
            return Err(CoreError::SessionFinished);
        }

        let (cursor, transition) =
            machine::step(self.dataset, self.cursor, &action, &self.config, Utc::now())?;
        self.cursor = cursor;

        if transition.is_mutation() {
            self.store.save(self.dataset)?;
            debug!(?transition, "review change persisted");
        }

        match &transition {
            Transition::Moved { .. } => self.refresh_highlights(),
            Transition::Ended(end) => {
                self.store.save(self.dataset)?;
                self.ended = Some(*end);
                let progress = self.dataset.progress();
                info!(
                    ?end,
                    selected = progress.selected,
                    rejected = progress.rejected,
                    unreviewed = progress.unreviewed,
                    "review session ended"
                );
            }
            _ => {}
        }

        Ok(transition)
    }

    /// Drive the session from a scripted action list. Invalid input is logged
    /// and skipped; running out of actions counts as an interruption.
    pub fn run<I>(&mut self, actions: I) -> Result<SessionEnd>
    where
        I: IntoIterator<Item = ReviewAction>,
    {
        for action in actions {
            match self.apply(action) {
                Ok(Transition::Ended(end)) => return Ok(end),
                Ok(_) => {}
                Err(e) if e.is_invalid_input() => warn!("ignored review action: {e}"),
                Err(e) => return Err(e),
            }
        }
        match self.ended {
            Some(end) => Ok(end),
            None => {
                self.apply(ReviewAction::Interrupt)?;
                Ok(SessionEnd::Interrupted)
            }
        }
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn refresh_highlights(&mut self) {
        if let Some(record) = self.dataset.get_mut(self.cursor) {
            self.highlighter.apply(record);
        }
    }
}
