use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt;

/// Canonical anagram key: the characters of a word sorted by code point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The one signature function used by every stage of the pipeline.
pub fn of_word(word: &str) -> Signature {
    let mut chars: SmallVec<[char; 24]> = word.chars().collect();
    chars.sort_unstable();
    Signature(chars.into_iter().collect())
}

/// Words carried by a line. Blank lines carry none.
pub fn words(line: &str) -> impl Iterator<Item = &str> {
    line.split_whitespace()
}

/// Signature of a group line, taken from its first word
pub fn of_group_line(line: &str) -> Option<Signature> {
    words(line).next().map(of_word)
}

/// Renders a group as one line (without the trailing newline)
pub fn format_group<'a, I>(words: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    words.into_iter().join(" ")
}
