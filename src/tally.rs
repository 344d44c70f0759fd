// src/tally.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::TallyError;
use crate::models::{OptionId, PollOption, VoteCounts};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TallyEntry {
    pub option_id: OptionId,
    pub text: String,
    pub votes: u64,
    /// 0..=100, unrounded.
    pub percentage: f64,
    pub viewer_choice: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tally {
    pub entries: Vec<TallyEntry>,
    pub total_votes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Original,
    Votes,
    Percentage,
}

/// Compute per-option counts and percentages for a poll.
///
/// Counts missing from `counts` are zero. Counts for ids that are not in
/// `options` do not contribute to the total. A `viewer_vote` that matches no
/// option marks nothing.
pub fn compute_tally(
    options: &[PollOption],
    counts: &VoteCounts,
    viewer_vote: Option<OptionId>,
) -> Result<Tally, TallyError> {
    if options.is_empty() {
        return Err(TallyError::NoOptions);
    }

    let mut seen = HashSet::with_capacity(options.len());
    let mut votes = Vec::with_capacity(options.len());
    for option in options {
        if !seen.insert(option.id) {
            return Err(TallyError::DuplicateOption(option.id));
        }
        let count = counts.get(&option.id).copied().unwrap_or(0);
        let count = u64::try_from(count).map_err(|_| TallyError::NegativeCount {
            option: option.id,
            count,
        })?;
        votes.push(count);
    }

    let total_votes: u64 = votes.iter().sum();

    let entries = options
        .iter()
        .zip(votes)
        .map(|(option, votes)| TallyEntry {
            option_id: option.id,
            text: option.text.clone(),
            votes,
            percentage: percentage(votes, total_votes),
            viewer_choice: viewer_vote == Some(option.id),
        })
        .collect();

    Ok(Tally { entries, total_votes })
}

fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        votes as f64 * 100.0 / total as f64
    }
}

/// Ids that carry counts but are not options of the poll.
pub fn orphaned_options(options: &[PollOption], counts: &VoteCounts) -> Vec<OptionId> {
    let known: HashSet<OptionId> = options.iter().map(|o| o.id).collect();
    let mut orphans: Vec<OptionId> = counts
        .keys()
        .filter(|id| !known.contains(id))
        .copied()
        .collect();
    orphans.sort();
    orphans
}

impl Tally {
    /// Entries reordered for display. Sorting is stable so equal bars never
    /// swap places between refreshes.
    pub fn sorted(&self, order: SortOrder) -> Vec<TallyEntry> {
        let mut entries = self.entries.clone();
        match order {
            SortOrder::Original => {}
            SortOrder::Votes => entries.sort_by(|a, b| b.votes.cmp(&a.votes)),
            SortOrder::Percentage => {
                entries.sort_by(|a, b| b.percentage.total_cmp(&a.percentage))
            }
        }
        entries
    }

    /// Sorted entries limited to the first `max_bars`.
    pub fn display(&self, order: SortOrder, max_bars: Option<usize>) -> Vec<TallyEntry> {
        let mut entries = self.sorted(order);
        if let Some(max) = max_bars {
            entries.truncate(max);
        }
        entries
    }

    pub fn entry(&self, option_id: OptionId) -> Option<&TallyEntry> {
        self.entries.iter().find(|e| e.option_id == option_id)
    }

    /// The tally after one more vote for `option_id` by the viewer, with
    /// every percentage recomputed. `None` if the option is not in the tally.
    pub fn with_vote(&self, option_id: OptionId) -> Option<Tally> {
        self.entry(option_id)?;

        let total_votes = self.total_votes + 1;
        let entries = self
            .entries
            .iter()
            .map(|entry| {
                let votes = if entry.option_id == option_id {
                    entry.votes + 1
                } else {
                    entry.votes
                };
                TallyEntry {
                    option_id: entry.option_id,
                    text: entry.text.clone(),
                    votes,
                    percentage: percentage(votes, total_votes),
                    viewer_choice: entry.option_id == option_id,
                }
            })
            .collect();

        Some(Tally { entries, total_votes })
    }
}
