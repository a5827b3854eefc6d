use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{LoadError, ParseError};

/// Initial memory image, parsed once and shared by every instance built from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    code: Vec<i64>,
}

impl Program {
    pub fn new(code: Vec<i64>) -> Self {
        Self { code }
    }

    /// Parses comma-separated decimal integers. No partial recovery: one bad
    /// token rejects the whole program.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::Empty);
        }
        let code = text
            .split(',')
            .enumerate()
            .map(|(index, raw)| {
                let token = raw.trim();
                token.parse::<i64>().map_err(|source| ParseError::InvalidToken {
                    index,
                    token: token.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { code })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text)?)
    }

    pub fn code(&self) -> &[i64] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl FromStr for Program {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Vec<i64>> for Program {
    fn from(code: Vec<i64>) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, value) in self.code.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_surrounding_whitespace() {
        let program = Program::parse(" 1, 0,0 ,0,99\n").unwrap();
        assert_eq!(program.code(), &[1, 0, 0, 0, 99]);
    }

    #[test]
    fn parses_negative_values() {
        let program: Program = "3,9,8,9,10,9,4,9,99,-1,8".parse().unwrap();
        assert_eq!(program.code()[9], -1);
        assert_eq!(program.len(), 11);
    }

    #[test]
    fn rejects_bad_token_with_position() {
        match Program::parse("1,2,x3,99") {
            Err(ParseError::InvalidToken { index, token, .. }) => {
                assert_eq!(index, 2);
                assert_eq!(token, "x3");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn rejects_trailing_comma_and_empty_text() {
        assert!(matches!(
            Program::parse("1,2,"),
            Err(ParseError::InvalidToken { index: 2, .. })
        ));
        assert_eq!(Program::parse("  \n"), Err(ParseError::Empty));
    }

    #[test]
    fn display_matches_source_format() {
        let text = "109,1,204,-1,99";
        assert_eq!(Program::parse(text).unwrap().to_string(), text);
    }
}
