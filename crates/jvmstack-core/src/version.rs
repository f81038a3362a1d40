use std::cmp::Ordering;
use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Version token of an installed component. Equality is exact string
/// equality; ordering is only meaningful through [`compare_versions`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("version must not be empty"));
        }
        if trimmed
            .chars()
            .any(|ch| ch == '/' || ch == '\\' || ch.is_whitespace())
        {
            return Err(anyhow!(
                "version contains path separators or whitespace: {trimmed}"
            ));
        }
        if trimmed == "." || trimmed == ".." {
            return Err(anyhow!("version must not be a relative path token"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Version {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Version {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Version-aware ordering: semver when both sides parse, otherwise natural
/// ordering over digit and non-digit runs, then plain lexical order.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    if let (Ok(l), Ok(r)) = (semver::Version::parse(left), semver::Version::parse(right)) {
        return l.cmp(&r);
    }

    let left_runs = split_runs(left);
    let right_runs = split_runs(right);
    for (l, r) in left_runs.iter().zip(right_runs.iter()) {
        let ordering = match (l, r) {
            (Run::Number(l), Run::Number(r)) => l.cmp(r),
            (Run::Text(l), Run::Text(r)) => l.cmp(r),
            (Run::Number(_), Run::Text(_)) => Ordering::Greater,
            (Run::Text(_), Run::Number(_)) => Ordering::Less,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left_runs
        .len()
        .cmp(&right_runs.len())
        .then_with(|| left.cmp(right))
}

#[derive(Debug, PartialEq, Eq)]
enum Run<'a> {
    Number(u64),
    Text(&'a str),
}

fn split_runs(value: &str) -> Vec<Run<'_>> {
    let mut runs = Vec::new();
    let mut start = 0;
    let bytes = value.as_bytes();
    while start < bytes.len() {
        let numeric = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == numeric {
            end += 1;
        }
        let token = &value[start..end];
        if numeric {
            match token.parse::<u64>() {
                Ok(number) => runs.push(Run::Number(number)),
                Err(_) => runs.push(Run::Text(token)),
            }
        } else {
            let separator_only = token.chars().all(|ch| matches!(ch, '.' | '-' | '_' | '+'));
            if !separator_only {
                runs.push(Run::Text(token));
            }
        }
        start = end;
    }
    runs
}
