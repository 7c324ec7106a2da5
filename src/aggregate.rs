use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::coerce::{format_percentage, format_vote_count};
use crate::domain::ClassifiedResult;

static YES_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\byes\b").unwrap());
static NO_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bno\b").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureGroup {
    pub title: String,
    pub measures: Vec<Measure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measure {
    pub name: String,
    pub description: String,
    pub yes_votes: String,
    pub no_votes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Race {
    pub title: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub position: String,
    pub votes: String,
    pub percentage: String,
}

/// Groups measure results by exact contest title, keeping first-seen order
/// for both groups and their members.
///
/// A choice containing the word "yes" reports its votes as yes votes, one
/// containing "no" as no votes; the other side renders as `NA`.
pub fn group_measures<'a, I>(entries: I) -> Vec<MeasureGroup>
where
    I: IntoIterator<Item = &'a ClassifiedResult>,
{
    group_by_contest(
        entries,
        |title| MeasureGroup {
            title,
            measures: Vec::new(),
        },
        |group, entry| {
            let votes = format_vote_count(entry.votes);
            let (yes_votes, no_votes) = if YES_WORD.is_match(&entry.choice_name) {
                (votes, format_vote_count(0))
            } else if NO_WORD.is_match(&entry.choice_name) {
                (format_vote_count(0), votes)
            } else {
                (format_vote_count(0), format_vote_count(0))
            };
            group.measures.push(Measure {
                name: entry.choice_name.clone(),
                description: String::new(),
                yes_votes,
                no_votes,
            });
        },
    )
}

/// Groups candidate results into races by exact contest title, keeping
/// first-seen order.
pub fn group_candidates<'a, I>(entries: I) -> Vec<Race>
where
    I: IntoIterator<Item = &'a ClassifiedResult>,
{
    group_by_contest(
        entries,
        |title| Race {
            title,
            candidates: Vec::new(),
        },
        |race, entry| {
            race.candidates.push(Candidate {
                name: entry.choice_name.clone(),
                position: String::new(),
                votes: format_vote_count(entry.votes),
                percentage: format_percentage(entry.percentage),
            });
        },
    )
}

fn group_by_contest<'a, I, G>(
    entries: I,
    mut open: impl FnMut(String) -> G,
    mut add: impl FnMut(&mut G, &ClassifiedResult),
) -> Vec<G>
where
    I: IntoIterator<Item = &'a ClassifiedResult>,
{
    let mut groups: Vec<G> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    for entry in entries {
        let slot = *index
            .entry(entry.contest_name.as_str())
            .or_insert_with(|| {
                groups.push(open(entry.contest_name.clone()));
                groups.len() - 1
            });
        add(&mut groups[slot], entry);
    }
    groups
}
