//! # Relational Operators
//!
//! The fixed comparator set of the filter protocol. Every operator has a
//! canonical complement, and the negated spellings (`!=`, `!~`, `!<`, …)
//! map onto the complement of their base operator.

use super::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationalOperator {
    Equal,
    NotEqual,
    /// Regex partial match.
    Matches,
    DoesntMatch,
    EqualIcase,
    NotEqualIcase,
    /// Case-insensitive regex partial match.
    MatchesIcase,
    DoesntMatchIcase,
    Less,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
}

impl RelationalOperator {
    /// Look up an operator by its protocol spelling.
    pub fn from_name(name: &str) -> Result<Self, ParseError> {
        match name {
            "=" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            "~" => Ok(Self::Matches),
            "!~" => Ok(Self::DoesntMatch),
            "=~" => Ok(Self::EqualIcase),
            "!=~" => Ok(Self::NotEqualIcase),
            "~~" => Ok(Self::MatchesIcase),
            "!~~" => Ok(Self::DoesntMatchIcase),
            "<" => Ok(Self::Less),
            "!<" => Ok(Self::GreaterOrEqual),
            ">=" => Ok(Self::GreaterOrEqual),
            "!>=" => Ok(Self::Less),
            ">" => Ok(Self::Greater),
            "!>" => Ok(Self::LessOrEqual),
            "<=" => Ok(Self::LessOrEqual),
            "!<=" => Ok(Self::Greater),
            _ => Err(ParseError::UnknownOperator(name.to_string())),
        }
    }

    /// The complementary operator. Total: negating twice is the identity.
    pub fn negate(self) -> Self {
        match self {
            Self::Equal => Self::NotEqual,
            Self::NotEqual => Self::Equal,
            Self::Matches => Self::DoesntMatch,
            Self::DoesntMatch => Self::Matches,
            Self::EqualIcase => Self::NotEqualIcase,
            Self::NotEqualIcase => Self::EqualIcase,
            Self::MatchesIcase => Self::DoesntMatchIcase,
            Self::DoesntMatchIcase => Self::MatchesIcase,
            Self::Less => Self::GreaterOrEqual,
            Self::GreaterOrEqual => Self::Less,
            Self::Greater => Self::LessOrEqual,
            Self::LessOrEqual => Self::Greater,
        }
    }

    /// Canonical spelling.
    pub fn name(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Matches => "~",
            Self::DoesntMatch => "!~",
            Self::EqualIcase => "=~",
            Self::NotEqualIcase => "!=~",
            Self::MatchesIcase => "~~",
            Self::DoesntMatchIcase => "!~~",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::Greater => ">",
            Self::LessOrEqual => "<=",
        }
    }
}

impl std::fmt::Display for RelationalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
