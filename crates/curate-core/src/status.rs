//! Task status codes and status-code sets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Outcome of one task invocation.
///
/// `Unset` is the only valid pre-invocation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Fail,
    Skip,
    Error,
    Unset,
    #[serde(rename = "NOTASK")]
    NoTask,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Success,
        Status::Fail,
        Status::Skip,
        Status::Error,
        Status::Unset,
        Status::NoTask,
    ];

    /// Numeric code: SUCCESS=0, FAIL=1, SKIP=2, ERROR=-1, UNSET=-2, NOTASK=-3
    pub fn code(&self) -> i32 {
        match self {
            Status::Success => 0,
            Status::Fail => 1,
            Status::Skip => 2,
            Status::Error => -1,
            Status::Unset => -2,
            Status::NoTask => -3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Status::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Fail => "FAIL",
            Status::Skip => "SKIP",
            Status::Error => "ERROR",
            Status::Unset => "UNSET",
            Status::NoTask => "NOTASK",
        }
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts `%FAIL`, `fail`, or a numeric code such as `1`.
impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let token = token.strip_prefix('%').unwrap_or(token);
        if let Ok(code) = token.parse::<i32>() {
            return Status::from_code(code).ok_or_else(|| format!("unknown status code: {code}"));
        }
        Status::ALL
            .into_iter()
            .find(|status| status.name().eq_ignore_ascii_case(token))
            .ok_or_else(|| format!("unknown status: {s}"))
    }
}

/// A set of status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusSet(u8);

impl StatusSet {
    pub const fn empty() -> Self {
        StatusSet(0)
    }

    pub fn all() -> Self {
        Self::of(&Status::ALL)
    }

    pub fn of(statuses: &[Status]) -> Self {
        StatusSet(statuses.iter().fold(0, |bits, s| bits | s.bit()))
    }

    /// Parse a list of statuses separated by whitespace and/or commas.
    pub fn parse(list: &str) -> Result<Self, String> {
        let mut set = StatusSet::empty();
        for token in list
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
        {
            set.insert(token.parse()?);
        }
        if set.is_empty() {
            return Err("expected at least one status code".to_string());
        }
        Ok(set)
    }

    pub fn contains(&self, status: Status) -> bool {
        self.0 & status.bit() != 0
    }

    pub fn insert(&mut self, status: Status) {
        self.0 |= status.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: Self) -> Self {
        StatusSet(self.0 | other.0)
    }

    pub fn intersection(self, other: Self) -> Self {
        StatusSet(self.0 & other.0)
    }

    pub fn difference(self, other: Self) -> Self {
        StatusSet(self.0 & !other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Status> + '_ {
        Status::ALL.into_iter().filter(|s| self.contains(*s))
    }
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|s| s.name()).collect();
        write!(f, "{{{}}}", names.join(","))
    }
}
