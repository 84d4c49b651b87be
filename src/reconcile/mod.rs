use std::fmt::{self, Display, Write};
use std::str::FromStr;

use thiserror::Error;

use crate::config::Config;
use crate::passwd::UserRecord;


/// Each user's subordinate range starts at their uid scaled by this factor,
/// which keeps ranges for distinct uids disjoint at the fixed length below.
pub const SUB_ID_MULTIPLIER: u64 = 100_000;
pub const SUB_ID_RANGE_LENGTH: u32 = 65_536;

#[derive(Debug, Error)]
pub enum MappingParseError {
    #[error("Missing field {field} on line {line}")]
    MissingField { line: usize, field: &'static str },
    #[error("Field {field} on line {line} is not a number: {source}")]
    NotANumber {
        line: usize,
        field: &'static str,
        source: std::num::ParseIntError,
    },
}

/// One `<name>:<start_id>:<length>` line of a subuid/subgid file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubordinateRange {
    pub name: String,
    pub start_id: u64,
    pub length: u32,
}

impl SubordinateRange {
    pub fn from_user(user: &UserRecord) -> Self {
        Self {
            name: user.name.clone(),
            start_id: u64::from(user.uid) * SUB_ID_MULTIPLIER,
            length: SUB_ID_RANGE_LENGTH,
        }
    }
}

impl Display for SubordinateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.start_id, self.length)
    }
}

impl FromStr for SubordinateRange {
    type Err = MappingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_line(s, 1)
    }
}

/// Result of a single reconciliation pass. `changed` is true when the desired
/// set differs from what is currently persisted; the caller decides whether to
/// write.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub ranges: Vec<SubordinateRange>,
    pub changed: bool,
}

/// Derives the desired mapping entries from a user snapshot. A user is
/// eligible when their uid clears the configured minimum and their name is
/// not a member of the exclusion set; the membership test is applied even
/// when the set is empty (an empty set excludes nobody). Output is sorted by
/// uid so platform enumeration order never reaches the rendered file.
pub fn desired_ranges(config: &Config, users: &[UserRecord]) -> Vec<SubordinateRange> {
    let mut eligible = users
        .iter()
        .filter(|user| user.uid >= config.minimum_user_id)
        .filter(|user| !config.filtered_user_names.contains(&user.name))
        .collect::<Vec<_>>();

    eligible.sort_unstable_by_key(|user| user.uid);

    eligible.into_iter().map(SubordinateRange::from_user).collect()
}

/// Pure reconciliation decision: compares the full desired set against the
/// full persisted set, tuple for tuple. Equal-length sets with different
/// members count as changed.
pub fn reconcile(
    config: &Config,
    users: &[UserRecord],
    persisted: &[SubordinateRange],
) -> Reconciliation {
    let ranges = desired_ranges(config, users);
    let changed = ranges != persisted;

    Reconciliation { ranges, changed }
}

pub fn render(ranges: &[SubordinateRange]) -> String {
    let mut out = String::new();

    for range in ranges {
        // Writing to a String cannot fail
        let _ = writeln!(out, "{range}");
    }

    out
}

pub fn parse_mapping_file(content: &str) -> Result<Vec<SubordinateRange>, MappingParseError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_line(line, i + 1))
        .collect()
}

fn parse_line(line: &str, lineno: usize) -> Result<SubordinateRange, MappingParseError> {
    let mut iter = line.trim().split(':');

    let name = iter
        .next()
        .filter(|name| !name.is_empty())
        .ok_or(MappingParseError::MissingField {
            line: lineno,
            field: "name",
        })?;
    let start_id = iter
        .next()
        .ok_or(MappingParseError::MissingField {
            line: lineno,
            field: "start id",
        })?
        .parse()
        .map_err(|source| MappingParseError::NotANumber {
            line: lineno,
            field: "start id",
            source,
        })?;
    let length = iter
        .next()
        .ok_or(MappingParseError::MissingField {
            line: lineno,
            field: "range length",
        })?
        .parse()
        .map_err(|source| MappingParseError::NotANumber {
            line: lineno,
            field: "range length",
            source,
        })?;

    Ok(SubordinateRange {
        name: name.to_owned(),
        start_id,
        length,
    })
}
