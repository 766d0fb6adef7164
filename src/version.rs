//! Lenient version parsing for the versions clusters report (`0.5`, `1.4.2`,
//! `2.0.0-abc123`, `v1.2`).

use std::cmp::Ordering;

use semver::Version;

/// Parse the leading `major[.minor[.patch]]` of `text`. Missing components
/// count as zero and anything after them is ignored.
pub fn parse(text: &str) -> Option<Version> {
    let text = text.trim().trim_start_matches(['v', 'V']);
    let mut numbers = text
        .split(['.', '-', '+'])
        .map_while(|part| part.parse::<u64>().ok());
    let major = numbers.next()?;
    Some(Version::new(
        major,
        numbers.next().unwrap_or(0),
        numbers.next().unwrap_or(0),
    ))
}

/// Compare two versions; `None` when either cannot be parsed.
pub fn compare(left: &str, right: &str) -> Option<Ordering> {
    Some(parse(left)?.cmp(&parse(right)?))
}

/// Whether `version` is at least `minimum`. Unparseable versions are not.
pub fn at_least(version: &str, minimum: &str) -> bool {
    compare(version, minimum).is_some_and(Ordering::is_ge)
}

/// Whether `version` is strictly below `limit`. Unparseable versions are not.
pub fn below(version: &str, limit: &str) -> bool {
    compare(version, limit).is_some_and(Ordering::is_lt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_parsing() {
        assert_eq!(parse("0.5"), Some(Version::new(0, 5, 0)));
        assert_eq!(parse("v1.4.2"), Some(Version::new(1, 4, 2)));
        assert_eq!(parse("2.0.0-abc123"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse("1.2-SNAPSHOT"), Some(Version::new(1, 2, 0)));
        assert_eq!(parse("latest"), None);
    }

    #[test]
    fn ordering() {
        assert!(at_least("1.10", "1.4"));
        assert!(at_least("2.0.0", "2.0"));
        assert!(!at_least("1.3.9", "1.4"));
        assert!(below("0.4.9", "0.5.0"));
        assert!(!below("0.5.0", "0.5.0"));
        assert!(!at_least("unknown", "1.0"));
        assert!(!below("unknown", "1.0"));
    }
}
