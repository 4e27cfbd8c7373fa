//! Dice notation parsing and rolling
//!
//! Supports `NdX`, `NdX+M`, `NdX-M`, `NdXkhK` (keep highest K), `NdXklK`
//! (keep lowest K), and chains of those joined with `+`/`-`, e.g.
//! `2d6+1d4+3`. Advantage is expressed by callers as `2d20kh1`,
//! disadvantage as `2d20kl1`.
//!
//! The domain layer never owns a random source: rolling goes through an
//! injected [`DieRoller`], so rules stay deterministic under test.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Dice count and die size are both capped to keep payloads bounded.
pub const MAX_DICE: u32 = 1000;
pub const MAX_SIDES: u32 = 1000;

/// Source of individual die results.
///
/// Implementations must return a value in `1..=sides`.
pub trait DieRoller {
    fn roll_die(&mut self, sides: u32) -> u32;
}

/// Error when parsing dice notation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    /// The notation string is empty
    #[error("Empty dice notation")]
    Empty,
    /// Not a recognizable dice expression
    #[error("Invalid dice notation: {0}")]
    InvalidFormat(String),
    /// Dice count must be in [1, 1000]
    #[error("Dice count out of range: {0}")]
    DiceCountOutOfRange(u32),
    /// Die size must be in [1, 1000]
    #[error("Die size out of range: {0}")]
    DieSizeOutOfRange(u32),
    /// Keep count must be between 1 and the dice count
    #[error("Keep count out of range: {0}")]
    KeepOutOfRange(u32),
}

/// Keep-highest / keep-lowest selection on a dice term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Keep {
    Highest(u32),
    Lowest(u32),
}

/// A single `NdX` term with an optional keep selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceTerm {
    pub count: u32,
    pub sides: u32,
    pub keep: Option<Keep>,
}

impl DiceTerm {
    pub fn new(count: u32, sides: u32, keep: Option<Keep>) -> Result<Self, DiceParseError> {
        if count == 0 || count > MAX_DICE {
            return Err(DiceParseError::DiceCountOutOfRange(count));
        }
        if sides == 0 || sides > MAX_SIDES {
            return Err(DiceParseError::DieSizeOutOfRange(sides));
        }
        if let Some(Keep::Highest(k)) | Some(Keep::Lowest(k)) = keep {
            if k == 0 || k > count {
                return Err(DiceParseError::KeepOutOfRange(k));
            }
        }
        Ok(Self { count, sides, keep })
    }
}

impl fmt::Display for DiceTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.keep {
            Some(Keep::Highest(k)) => write!(f, "kh{}", k),
            Some(Keep::Lowest(k)) => write!(f, "kl{}", k),
            None => Ok(()),
        }
    }
}

/// A dice term with its sign within a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTerm {
    pub negative: bool,
    pub term: DiceTerm,
}

/// A parsed dice expression: one or more signed dice terms plus a net
/// integer modifier. `2d6+1d4+3-1` parses to two terms and modifier `+2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollSpec {
    pub terms: Vec<SignedTerm>,
    pub modifier: i32,
}

impl RollSpec {
    /// Parse dice notation. At least one dice term is required; bare
    /// integers are only valid as modifiers within a chain.
    pub fn parse(input: &str) -> Result<Self, DiceParseError> {
        let input: String = input
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if input.is_empty() {
            return Err(DiceParseError::Empty);
        }

        let mut terms = Vec::new();
        let mut modifier: i32 = 0;
        let mut rest = input.as_str();
        let mut negative = match rest.as_bytes().first() {
            Some(b'-') => {
                rest = &rest[1..];
                true
            }
            Some(b'+') => {
                rest = &rest[1..];
                false
            }
            _ => false,
        };

        while !rest.is_empty() {
            let end = rest
                .find(['+', '-'])
                .unwrap_or(rest.len());
            let token = &rest[..end];
            if token.is_empty() {
                return Err(DiceParseError::InvalidFormat(input.clone()));
            }

            if token.contains('d') {
                terms.push(SignedTerm {
                    negative,
                    term: Self::parse_term(token)?,
                });
            } else {
                let value: i32 = token
                    .parse()
                    .map_err(|_| DiceParseError::InvalidFormat(token.to_string()))?;
                modifier += if negative { -value } else { value };
            }

            if end == rest.len() {
                break;
            }
            negative = rest.as_bytes()[end] == b'-';
            rest = &rest[end + 1..];
            if rest.is_empty() {
                return Err(DiceParseError::InvalidFormat(input));
            }
        }

        if terms.is_empty() {
            return Err(DiceParseError::InvalidFormat(input));
        }

        Ok(Self { terms, modifier })
    }

    /// Parse a single `NdX[khK|klK]` token. A leading count is required
    /// except for the `dX` shorthand, which means `1dX`.
    fn parse_term(token: &str) -> Result<DiceTerm, DiceParseError> {
        let d_pos = token
            .find('d')
            .ok_or_else(|| DiceParseError::InvalidFormat(token.to_string()))?;

        let count: u32 = if d_pos == 0 {
            1
        } else {
            token[..d_pos]
                .parse()
                .map_err(|_| DiceParseError::InvalidFormat(token.to_string()))?
        };

        let after_d = &token[d_pos + 1..];
        let (sides_str, keep) = if let Some(kh) = after_d.find("kh") {
            let k: u32 = after_d[kh + 2..]
                .parse()
                .map_err(|_| DiceParseError::InvalidFormat(token.to_string()))?;
            (&after_d[..kh], Some(Keep::Highest(k)))
        } else if let Some(kl) = after_d.find("kl") {
            let k: u32 = after_d[kl + 2..]
                .parse()
                .map_err(|_| DiceParseError::InvalidFormat(token.to_string()))?;
            (&after_d[..kl], Some(Keep::Lowest(k)))
        } else {
            (after_d, None)
        };

        let sides: u32 = sides_str
            .parse()
            .map_err(|_| DiceParseError::InvalidFormat(token.to_string()))?;

        DiceTerm::new(count, sides, keep)
    }

    /// A single plain term, e.g. `RollSpec::simple(1, 20)` for `1d20`.
    pub fn simple(count: u32, sides: u32) -> Result<Self, DiceParseError> {
        Ok(Self {
            terms: vec![SignedTerm {
                negative: false,
                term: DiceTerm::new(count, sides, None)?,
            }],
            modifier: 0,
        })
    }

    /// `1d20` with a flat modifier.
    pub fn d20(modifier: i32) -> Self {
        Self {
            terms: vec![SignedTerm {
                negative: false,
                term: DiceTerm {
                    count: 1,
                    sides: 20,
                    keep: None,
                },
            }],
            modifier,
        }
    }

    /// `2d20kh1` plus modifier.
    pub fn d20_advantage(modifier: i32) -> Self {
        Self {
            terms: vec![SignedTerm {
                negative: false,
                term: DiceTerm {
                    count: 2,
                    sides: 20,
                    keep: Some(Keep::Highest(1)),
                },
            }],
            modifier,
        }
    }

    /// `2d20kl1` plus modifier.
    pub fn d20_disadvantage(modifier: i32) -> Self {
        Self {
            terms: vec![SignedTerm {
                negative: false,
                term: DiceTerm {
                    count: 2,
                    sides: 20,
                    keep: Some(Keep::Lowest(1)),
                },
            }],
            modifier,
        }
    }

    /// Add a flat modifier, returning the adjusted spec.
    pub fn plus(mut self, modifier: i32) -> Self {
        self.modifier += modifier;
        self
    }

    /// Double the dice count of every term (critical hits). The modifier
    /// is left untouched.
    pub fn doubled(mut self) -> Self {
        for signed in &mut self.terms {
            signed.term.count = (signed.term.count * 2).min(MAX_DICE);
        }
        self
    }

    /// Roll the expression through the provided roller.
    pub fn roll(&self, roller: &mut dyn DieRoller) -> RollOutcome {
        let mut rolls = Vec::new();
        let mut kept: Option<Vec<i32>> = None;
        let mut total: i64 = 0;

        for signed in &self.terms {
            let term = &signed.term;
            let mut term_rolls: Vec<i32> = (0..term.count)
                .map(|_| roller.roll_die(term.sides) as i32)
                .collect();
            rolls.extend(term_rolls.iter().copied());

            let term_total: i64 = match term.keep {
                Some(keep) => {
                    match keep {
                        Keep::Highest(_) => term_rolls.sort_unstable_by(|a, b| b.cmp(a)),
                        Keep::Lowest(_) => term_rolls.sort_unstable(),
                    }
                    let k = match keep {
                        Keep::Highest(k) | Keep::Lowest(k) => k as usize,
                    };
                    term_rolls.truncate(k);
                    kept.get_or_insert_with(Vec::new)
                        .extend(term_rolls.iter().copied());
                    term_rolls.iter().map(|&r| r as i64).sum()
                }
                None => term_rolls.iter().map(|&r| r as i64).sum(),
            };

            if signed.negative {
                total -= term_total;
            } else {
                total += term_total;
            }
        }

        RollOutcome {
            notation: self.to_string(),
            rolls,
            kept,
            modifier: self.modifier,
            total: (total + self.modifier as i64) as i32,
        }
    }

    /// Minimum possible total.
    pub fn min_total(&self) -> i32 {
        self.bound(|term| {
            if term.negative {
                -(max_term(&term.term) as i64)
            } else {
                kept_count(&term.term) as i64
            }
        })
    }

    /// Maximum possible total.
    pub fn max_total(&self) -> i32 {
        self.bound(|term| {
            if term.negative {
                -(kept_count(&term.term) as i64)
            } else {
                max_term(&term.term) as i64
            }
        })
    }

    fn bound(&self, per_term: impl Fn(&SignedTerm) -> i64) -> i32 {
        let sum: i64 = self.terms.iter().map(per_term).sum();
        (sum + self.modifier as i64) as i32
    }
}

fn kept_count(term: &DiceTerm) -> u32 {
    match term.keep {
        Some(Keep::Highest(k)) | Some(Keep::Lowest(k)) => k,
        None => term.count,
    }
}

fn max_term(term: &DiceTerm) -> u32 {
    kept_count(term) * term.sides
}

impl fmt::Display for RollSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, signed) in self.terms.iter().enumerate() {
            if signed.negative {
                write!(f, "-")?;
            } else if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{}", signed.term)?;
        }
        if self.modifier > 0 {
            write!(f, "+{}", self.modifier)?;
        } else if self.modifier < 0 {
            write!(f, "{}", self.modifier)?;
        }
        Ok(())
    }
}

/// Result of rolling a [`RollSpec`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollOutcome {
    /// Canonical notation of the rolled expression
    pub notation: String,
    /// Every die rolled, in roll order
    pub rolls: Vec<i32>,
    /// Dice that counted toward the total, when a keep selector applied
    pub kept: Option<Vec<i32>>,
    /// Net flat modifier
    pub modifier: i32,
    /// Final total
    pub total: i32,
}

impl RollOutcome {
    /// The natural (unmodified) face of a single-die roll, used for
    /// crit/fumble detection. `2d20kh1` reports the kept die.
    pub fn natural(&self) -> Option<i32> {
        match &self.kept {
            Some(kept) if kept.len() == 1 => Some(kept[0]),
            None if self.rolls.len() == 1 => Some(self.rolls[0]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds a fixed script of die faces, cycling when exhausted.
    pub struct ScriptedRoller {
        values: Vec<u32>,
        cursor: usize,
    }

    impl ScriptedRoller {
        pub fn new(values: Vec<u32>) -> Self {
            Self { values, cursor: 0 }
        }
    }

    impl DieRoller for ScriptedRoller {
        fn roll_die(&mut self, _sides: u32) -> u32 {
            let v = self.values[self.cursor % self.values.len()];
            self.cursor += 1;
            v
        }
    }

    #[test]
    fn test_parse_simple() {
        let spec = RollSpec::parse("2d6").unwrap();
        assert_eq!(spec.terms.len(), 1);
        assert_eq!(spec.terms[0].term.count, 2);
        assert_eq!(spec.terms[0].term.sides, 6);
        assert_eq!(spec.modifier, 0);
    }

    #[test]
    fn test_parse_shorthand() {
        let spec = RollSpec::parse("d20").unwrap();
        assert_eq!(spec.terms[0].term.count, 1);
        assert_eq!(spec.terms[0].term.sides, 20);
    }

    #[test]
    fn test_parse_with_modifiers() {
        let spec = RollSpec::parse("1d20+5").unwrap();
        assert_eq!(spec.modifier, 5);
        let spec = RollSpec::parse("1d20-3").unwrap();
        assert_eq!(spec.modifier, -3);
    }

    #[test]
    fn test_parse_keep_highest() {
        let spec = RollSpec::parse("2d20kh1").unwrap();
        assert_eq!(spec.terms[0].term.keep, Some(Keep::Highest(1)));
    }

    #[test]
    fn test_parse_keep_lowest() {
        let spec = RollSpec::parse("4d6kl3").unwrap();
        assert_eq!(spec.terms[0].term.keep, Some(Keep::Lowest(3)));
    }

    #[test]
    fn test_parse_chain() {
        let spec = RollSpec::parse("2d6+1d4+3-1").unwrap();
        assert_eq!(spec.terms.len(), 2);
        assert_eq!(spec.modifier, 2);
    }

    #[test]
    fn test_parse_negative_dice_term() {
        let spec = RollSpec::parse("2d6-1d4").unwrap();
        assert!(spec.terms[1].negative);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(RollSpec::parse(""), Err(DiceParseError::Empty)));
        assert!(RollSpec::parse("banana").is_err());
        assert!(RollSpec::parse("5").is_err());
        assert!(RollSpec::parse("1d20+").is_err());
        assert!(RollSpec::parse("d").is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(matches!(
            RollSpec::parse("0d6"),
            Err(DiceParseError::DiceCountOutOfRange(0))
        ));
        assert!(matches!(
            RollSpec::parse("1001d6"),
            Err(DiceParseError::DiceCountOutOfRange(1001))
        ));
        assert!(matches!(
            RollSpec::parse("1d0"),
            Err(DiceParseError::DieSizeOutOfRange(0))
        ));
        assert!(matches!(
            RollSpec::parse("1d1001"),
            Err(DiceParseError::DieSizeOutOfRange(1001))
        ));
        assert!(matches!(
            RollSpec::parse("2d20kh3"),
            Err(DiceParseError::KeepOutOfRange(3))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for notation in [
            "1d20",
            "2d6+3",
            "1d8-2",
            "2d20kh1",
            "2d20kl1+4",
            "2d6+1d4+2",
            "2d6-1d4-1",
            "4d6kl3+1d8",
        ] {
            let spec = RollSpec::parse(notation).unwrap();
            let reparsed = RollSpec::parse(&spec.to_string()).unwrap();
            assert_eq!(reparsed, spec, "round trip failed for {}", notation);
        }
    }

    #[test]
    fn test_outcome_notation_reparses_to_spec() {
        let spec = RollSpec::parse("2d6+1d4+3").unwrap();
        let mut roller = ScriptedRoller::new(vec![4, 2, 3]);
        let outcome = spec.roll(&mut roller);
        assert_eq!(RollSpec::parse(&outcome.notation).unwrap(), spec);
    }

    #[test]
    fn test_roll_totals() {
        let spec = RollSpec::parse("2d6+3").unwrap();
        let mut roller = ScriptedRoller::new(vec![4, 5]);
        let outcome = spec.roll(&mut roller);
        assert_eq!(outcome.rolls, vec![4, 5]);
        assert_eq!(outcome.kept, None);
        assert_eq!(outcome.modifier, 3);
        assert_eq!(outcome.total, 12);
    }

    #[test]
    fn test_roll_keep_highest() {
        let spec = RollSpec::parse("2d20kh1").unwrap();
        let mut roller = ScriptedRoller::new(vec![7, 16]);
        let outcome = spec.roll(&mut roller);
        assert_eq!(outcome.rolls, vec![7, 16]);
        assert_eq!(outcome.kept, Some(vec![16]));
        assert_eq!(outcome.total, 16);
        assert_eq!(outcome.natural(), Some(16));
    }

    #[test]
    fn test_roll_keep_lowest() {
        let spec = RollSpec::parse("2d20kl1").unwrap();
        let mut roller = ScriptedRoller::new(vec![7, 16]);
        let outcome = spec.roll(&mut roller);
        assert_eq!(outcome.kept, Some(vec![7]));
        assert_eq!(outcome.total, 7);
    }

    #[test]
    fn test_roll_negative_term() {
        let spec = RollSpec::parse("2d6-1d4").unwrap();
        let mut roller = ScriptedRoller::new(vec![5, 6, 3]);
        let outcome = spec.roll(&mut roller);
        assert_eq!(outcome.total, 8);
    }

    #[test]
    fn test_doubled_for_crit() {
        let spec = RollSpec::parse("1d8+3").unwrap().doubled();
        assert_eq!(spec.terms[0].term.count, 2);
        assert_eq!(spec.modifier, 3);
    }

    #[test]
    fn test_bounds() {
        let spec = RollSpec::parse("2d6+3").unwrap();
        assert_eq!(spec.min_total(), 5);
        assert_eq!(spec.max_total(), 15);

        let adv = RollSpec::parse("2d20kh1").unwrap();
        assert_eq!(adv.min_total(), 1);
        assert_eq!(adv.max_total(), 20);
    }
}
