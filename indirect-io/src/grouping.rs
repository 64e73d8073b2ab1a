//! ASCII detector grouping maps.
//!
//! The format is a sequence of whitespace separated integers, `#` starting a
//! comment that runs to the end of the line:
//!
//! ```text
//! # two groups of two tubes
//! 2        number of groups
//! 1        spectrum number of the first group
//! 2        number of members
//! 1 2      member spectrum numbers
//! 2
//! 2
//! 3-4      ranges are inclusive
//! ```
//!
//! Member lists may span several lines and may be separated by commas.

use std::fs;
use std::path::Path;

use indirect_core::{DetectorGroup, DetectorGrouping};

use crate::{Error, Result};

/// Largest member count accepted for a single group.
pub const MAX_GROUP_MEMBERS: usize = 1 << 20;

struct Token<'a> {
    text: &'a str,
    line: usize,
}

struct Tokens<'a> {
    inner: std::vec::IntoIter<Token<'a>>,
    last_line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let mut tokens = Vec::new();
        let mut last_line = 0;
        for (index, raw) in text.lines().enumerate() {
            last_line = index + 1;
            let content = raw.split('#').next().unwrap_or_default();
            tokens.extend(
                content
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty())
                    .map(|t| Token {
                        text: t,
                        line: index + 1,
                    }),
            );
        }
        Self {
            inner: tokens.into_iter(),
            last_line,
        }
    }

    fn next_token(&mut self, what: &str) -> Result<Token<'a>> {
        self.inner.next().ok_or_else(|| Error::Grouping {
            line: self.last_line,
            message: format!("unexpected end of file, expected {what}"),
        })
    }

    fn next_number(&mut self, what: &str) -> Result<u32> {
        let token = self.next_token(what)?;
        parse_number(&token, what)
    }

    fn remaining(&self) -> usize {
        self.inner.len()
    }
}

fn parse_number(token: &Token<'_>, what: &str) -> Result<u32> {
    token.text.parse().map_err(|_| Error::Grouping {
        line: token.line,
        message: format!("expected {what}, found '{}'", token.text),
    })
}

/// Expands a member token (`7` or `3-9`) into spectrum numbers, refusing
/// ranges longer than `room`.
fn expand_members(token: &Token<'_>, room: usize) -> Result<Vec<u32>> {
    match token.text.split_once('-') {
        None => Ok(vec![parse_number(token, "member spectrum number")?]),
        Some((lo, hi)) => {
            let bound = |text: &str| {
                text.parse::<u32>().map_err(|_| Error::Grouping {
                    line: token.line,
                    message: format!("invalid range '{}'", token.text),
                })
            };
            let (lo, hi) = (bound(lo)?, bound(hi)?);
            if hi < lo {
                return Err(Error::Grouping {
                    line: token.line,
                    message: format!("descending range '{}'", token.text),
                });
            }
            let span = u64::from(hi - lo) + 1;
            if span > room as u64 {
                return Err(Error::Grouping {
                    line: token.line,
                    message: format!(
                        "range '{}' lists {span} members, more than the {room} the group has left",
                        token.text
                    ),
                });
            }
            Ok((lo..=hi).collect())
        }
    }
}

/// Parses the text of a grouping map.
///
/// # Errors
/// Returns [`Error::Grouping`] for malformed numbers, member lists that do
/// not match their declared count, or trailing content.
pub fn parse_grouping(text: &str) -> Result<DetectorGrouping> {
    let mut tokens = Tokens::new(text);
    let ngroups = tokens.next_number("number of groups")?;

    // Every group takes at least three tokens.
    let mut groups = Vec::with_capacity((ngroups as usize).min(tokens.remaining() / 3));
    for _ in 0..ngroups {
        let spectrum_no = tokens.next_number("group spectrum number")?;
        let count_token = tokens.next_token("number of members")?;
        let count = parse_number(&count_token, "number of members")? as usize;
        if count > MAX_GROUP_MEMBERS {
            return Err(Error::Grouping {
                line: count_token.line,
                message: format!(
                    "group {spectrum_no} declares {count} members, the limit is {MAX_GROUP_MEMBERS}"
                ),
            });
        }
        let mut members = Vec::with_capacity(count.min(tokens.remaining()));
        while members.len() < count {
            let token = tokens.next_token("member spectrum number")?;
            members.extend(expand_members(&token, count - members.len())?);
        }
        groups.push(DetectorGroup {
            spectrum_no,
            members,
        });
    }

    if let Some(extra) = tokens.inner.next() {
        return Err(Error::Grouping {
            line: extra.line,
            message: format!("unexpected trailing content '{}'", extra.text),
        });
    }
    Ok(DetectorGrouping::new(groups)?)
}

/// Reads a grouping map from disk.
///
/// # Errors
/// Returns an error if the file cannot be read or is malformed.
pub fn read_grouping_file<P: AsRef<Path>>(path: P) -> Result<DetectorGrouping> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let grouping = parse_grouping(&text)?;
    log::debug!(
        "loaded {} detector groups from {}",
        grouping.len(),
        path.display()
    );
    Ok(grouping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_with_comments_and_ranges() {
        let text = "# IN16B tubes\n2\n1\n2\n1 2 # first pair\n2\n4\n3-5,\n9\n";
        let grouping = parse_grouping(text).unwrap();
        assert_eq!(grouping.len(), 2);
        assert_eq!(grouping.groups()[0].members, vec![1, 2]);
        assert_eq!(grouping.groups()[1].spectrum_no, 2);
        assert_eq!(grouping.groups()[1].members, vec![3, 4, 5, 9]);
    }

    #[test]
    fn test_member_count_mismatch() {
        let err = parse_grouping("1\n1\n2\n1-3\n").unwrap_err();
        assert!(matches!(err, Error::Grouping { line: 4, .. }));

        let err = parse_grouping("1\n1\n3\n1 2\n").unwrap_err();
        assert!(err.to_string().contains("unexpected end of file"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            parse_grouping("1\n1\nx\n").unwrap_err(),
            Error::Grouping { line: 3, .. }
        ));
        assert!(parse_grouping("1\n1\n1\n5-2\n").is_err());
        assert!(parse_grouping("1\n1\n1\n1\n7\n").is_err());
    }

    #[test]
    fn test_oversized_counts_and_ranges_are_errors() {
        let err = parse_grouping("1\n1\n2\n1-3000000000\n").unwrap_err();
        assert!(matches!(err, Error::Grouping { line: 4, .. }));
        assert!(err.to_string().contains("more than the 2"));

        let err = parse_grouping("1\n1\n1000\n1-3\n").unwrap_err();
        assert!(err.to_string().contains("unexpected end of file"));

        let err = parse_grouping("1\n1\n3000000000\n1-3000000000\n").unwrap_err();
        assert!(matches!(err, Error::Grouping { line: 3, .. }));

        let err = parse_grouping("4000000000\n1\n1\n5\n").unwrap_err();
        assert!(err.to_string().contains("unexpected end of file"));
    }

    #[test]
    fn test_empty_group_is_rejected() {
        let err = parse_grouping("1\n1\n0\n").unwrap_err();
        assert!(matches!(err, Error::CoreError(_)));
    }

    #[test]
    fn test_read_grouping_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1\n7\n3\n10-12").unwrap();
        let grouping = read_grouping_file(file.path()).unwrap();
        assert_eq!(grouping.groups()[0].spectrum_no, 7);
        assert_eq!(grouping.groups()[0].members, vec![10, 11, 12]);
    }
}
