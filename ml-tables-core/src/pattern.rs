//! Column name patterns
//!
//! A pattern is either a literal column name or a glob where `*` matches any
//! run of characters and `?` matches exactly one.

use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};

/// Compiled column name pattern
#[derive(Clone)]
pub enum Pattern {
    /// Exact column name
    Literal(String),

    /// Glob compiled to an anchored regular expression
    Glob(String, Regex),
}

impl Pattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> Result<Self> {
        if !pattern.contains(['*', '?']) {
            return Ok(Pattern::Literal(pattern.to_string()));
        }
        let mut re = String::with_capacity(pattern.len() + 8);
        re.push('^');
        for c in pattern.chars() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        re.push('$');
        let compiled = Regex::new(&re)
            .map_err(|e| Error::InvalidArgument(format!("bad pattern '{pattern}': {e}")))?;
        Ok(Pattern::Glob(pattern.to_string(), compiled))
    }

    /// Compile several patterns
    pub fn all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Self>> {
        patterns.iter().map(|p| Self::new(p.as_ref())).collect()
    }

    /// Check if a column name matches
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Literal(s) => s == name,
            Pattern::Glob(_, re) => re.is_match(name),
        }
    }

    /// Source text of the pattern
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Literal(s) | Pattern::Glob(s, _) => s,
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.as_str())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Feature1", "Feature1", true)]
    #[test_case("Feature1", "Feature10", false)]
    #[test_case("Feature*", "Feature10", true)]
    #[test_case("Feature*", "Label", false)]
    #[test_case("F?", "F1", true)]
    #[test_case("F?", "F12", false)]
    #[test_case("a.b*", "axb", false ; "dots are literal")]
    fn test_matches(pattern: &str, name: &str, expected: bool) {
        assert_eq!(Pattern::new(pattern).unwrap().matches(name), expected);
    }
}
