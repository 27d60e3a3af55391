// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pattern matching over buffered session output

use crate::shell::ConnectionError;
use lava_core::ExpectMatch;
use regex::Regex;

/// Compiled expect patterns, matched in buffer order
pub(crate) struct Patterns {
    regexes: Vec<Regex>,
}

impl Patterns {
    pub(crate) fn compile(patterns: &[String]) -> Result<Self, ConnectionError> {
        let regexes = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConnectionError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { regexes })
    }
}

/// Most unconsumed output kept; older text is dropped first
pub(crate) const MAX_BUFFER: usize = 1024 * 1024;

/// Output received from a session and not yet consumed
#[derive(Debug, Default)]
pub(crate) struct ExpectBuffer {
    text: String,
    /// Trailing bytes of a character split across reads
    partial: Vec<u8>,
}

impl ExpectBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);
        while !self.partial.is_empty() {
            match std::str::from_utf8(&self.partial) {
                Ok(text) => {
                    self.text.push_str(text);
                    self.partial.clear();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.partial[..valid]));
                    match e.error_len() {
                        // incomplete character; wait for the rest
                        None => {
                            self.partial.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.partial.drain(..valid + len);
                        }
                    }
                }
            }
        }
        self.trim();
    }

    pub(crate) fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
        self.trim();
    }

    fn trim(&mut self) {
        if self.text.len() <= MAX_BUFFER {
            return;
        }
        let mut cut = self.text.len() - MAX_BUFFER;
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        tracing::debug!(dropped = cut, "expect buffer full, dropping oldest output");
        self.text.drain(..cut);
    }

    /// Consume output up to the earliest match of any pattern.
    ///
    /// When two patterns match at the same offset the lower index wins.
    pub(crate) fn take_match(&mut self, patterns: &Patterns) -> Option<ExpectMatch> {
        let mut best: Option<(usize, usize, ExpectMatch)> = None;
        for (index, regex) in patterns.regexes.iter().enumerate() {
            let Some(captures) = regex.captures(&self.text) else {
                continue;
            };
            let Some(whole) = captures.get(0) else {
                continue;
            };
            if best.as_ref().is_some_and(|(start, _, _)| *start <= whole.start()) {
                continue;
            }
            let found = ExpectMatch {
                index,
                matched: whole.as_str().to_string(),
                groups: captures
                    .iter()
                    .skip(1)
                    .map(|group| group.map(|m| m.as_str().to_string()))
                    .collect(),
            };
            best = Some((whole.start(), whole.end(), found));
        }
        let (_, end, found) = best?;
        self.text.drain(..end);
        Some(found)
    }

    /// Consume one line, without its terminator
    pub(crate) fn take_line(&mut self) -> Option<String> {
        let end = self.text.find('\n')?;
        let line: String = self.text.drain(..=end).collect();
        Some(line.trim_end_matches(['\n', '\r']).to_string())
    }

    #[cfg(test)]
    pub(crate) fn as_str(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
#[path = "expect_tests.rs"]
mod tests;
