//! Review transitions as plain functions over `(dataset, cursor)`.
//!
//! Nothing here touches the filesystem or the terminal; the session layer adds
//! persistence and the CLI decides how actions are collected.

use chrono::{DateTime, Utc};

use crate::config::ReviewConfig;
use crate::error::{CoreError, Result};
use crate::models::{Dataset, SelectionState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Select,
    Reject,
    Next,
    Previous,
    AssignCategory { category: String, label: String },
    ClearCategory { category: String },
    Quit,
    /// Reviewer cancelled (Ctrl-C). Persists like `Quit`.
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Classified {
        index: usize,
        state: SelectionState,
        changed: bool,
    },
    CategoryAssigned {
        index: usize,
        category: String,
        label: String,
        added: bool,
    },
    CategoryCleared {
        index: usize,
        category: String,
        removed: usize,
    },
    Moved {
        from: usize,
        to: usize,
    },
    /// `next` on the last record.
    EndOfList,
    /// `previous` on the first record.
    StartOfList,
    Ended(SessionEnd),
}

impl Transition {
    /// Whether the dataset changed and must be persisted.
    pub fn is_mutation(&self) -> bool {
        match self {
            Self::Classified { changed, .. } => *changed,
            Self::CategoryAssigned { added, .. } => *added,
            Self::CategoryCleared { removed, .. } => *removed > 0,
            Self::Moved { .. } | Self::EndOfList | Self::StartOfList | Self::Ended(_) => false,
        }
    }
}

/// Apply one action. On error nothing has been modified.
pub fn step(
    dataset: &mut Dataset,
    cursor: usize,
    action: &ReviewAction,
    config: &ReviewConfig,
    now: DateTime<Utc>,
) -> Result<(usize, Transition)> {
    let last = dataset.len().saturating_sub(1);
    let cursor = cursor.min(last);

    match action {
        ReviewAction::Select => classify(dataset, cursor, SelectionState::Selected, now),
        ReviewAction::Reject => classify(dataset, cursor, SelectionState::Rejected, now),
        ReviewAction::Next => {
            if dataset.is_empty() || cursor == last {
                Ok((cursor, Transition::EndOfList))
            } else {
                Ok((
                    cursor + 1,
                    Transition::Moved {
                        from: cursor,
                        to: cursor + 1,
                    },
                ))
            }
        }
        ReviewAction::Previous => {
            if cursor == 0 {
                Ok((cursor, Transition::StartOfList))
            } else {
                Ok((
                    cursor - 1,
                    Transition::Moved {
                        from: cursor,
                        to: cursor - 1,
                    },
                ))
            }
        }
        ReviewAction::AssignCategory { category, label } => {
            let record = dataset.get_mut(cursor).ok_or(CoreError::EmptyDataset)?;
            let valid = config
                .category(category)
                .is_some_and(|c| c.labels.iter().any(|l| l == label));
            if !valid {
                return Err(CoreError::InvalidCategory {
                    category: category.clone(),
                    label: label.clone(),
                });
            }

            let labels = record.categories.entry(category.clone()).or_default();
            let added = !labels.contains(label);
            if added {
                labels.push(label.clone());
            }
            Ok((
                cursor,
                Transition::CategoryAssigned {
                    index: cursor,
                    category: category.clone(),
                    label: label.clone(),
                    added,
                },
            ))
        }
        ReviewAction::ClearCategory { category } => {
            let record = dataset.get_mut(cursor).ok_or(CoreError::EmptyDataset)?;
            if config.category(category).is_none() {
                return Err(CoreError::InvalidCategory {
                    category: category.clone(),
                    label: "*".to_string(),
                });
            }
            let removed = record
                .categories
                .remove(category)
                .map(|labels| labels.len())
                .unwrap_or(0);
            Ok((
                cursor,
                Transition::CategoryCleared {
                    index: cursor,
                    category: category.clone(),
                    removed,
                },
            ))
        }
        ReviewAction::Quit => Ok((cursor, Transition::Ended(SessionEnd::Quit))),
        ReviewAction::Interrupt => Ok((cursor, Transition::Ended(SessionEnd::Interrupted))),
    }
}

fn classify(
    dataset: &mut Dataset,
    cursor: usize,
    state: SelectionState,
    now: DateTime<Utc>,
) -> Result<(usize, Transition)> {
    let record = dataset.get_mut(cursor).ok_or(CoreError::EmptyDataset)?;
    let changed = record.selection_state != state;
    if changed {
        record.selection_state = state;
        record.reviewed_at = Some(now);
    }
    Ok((
        cursor,
        Transition::Classified {
            index: cursor,
            state,
            changed,
        },
    ))
}
