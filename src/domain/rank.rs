use std::fmt::{self, Display};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CardoError;

const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BASE: usize = 36;

/// A rank string totally ordering siblings under one parent.
///
/// Ranks are base36 digit strings read as fractions in (0, 1); with trailing
/// zeros forbidden, lexicographic order equals numeric order, so plain string
/// comparison sorts siblings. New ranks are midpoints, so any number of cards
/// can be placed between two existing ones without rewriting the others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rank(String);

impl Rank {
    pub fn new(rank: &str) -> Result<Self, CardoError> {
        let valid = !rank.is_empty()
            && !rank.ends_with('0')
            && rank.bytes().all(|b| DIGITS.contains(&b));
        if !valid {
            return Err(CardoError::InvalidInput(format!(
                "Rank '{rank}' must be non-empty base36 without trailing zeros"
            )));
        }
        Ok(Self(rank.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Midpoint of the whole range, used for the first card under a parent.
    pub fn first() -> Self {
        Self("i".to_string())
    }

    /// A rank strictly between `lower` and `upper`.
    ///
    /// `None` bounds mean the open ends of the range.
    pub fn between(lower: Option<&Rank>, upper: Option<&Rank>) -> Result<Self, CardoError> {
        let a = lower.map(|r| r.0.as_str()).unwrap_or("");
        if let (Some(lo), Some(hi)) = (lower, upper)
            && lo >= hi
        {
            return Err(CardoError::InvalidInput(format!(
                "Rank bounds are not ordered: '{}' is not below '{}'",
                lo.0, hi.0
            )));
        }
        Ok(Self(midpoint(a, upper.map(|r| r.0.as_str()))))
    }

    pub fn after(lower: &Rank) -> Self {
        Self(midpoint(&lower.0, None))
    }

    pub fn before(upper: &Rank) -> Self {
        Self(midpoint("", Some(&upper.0)))
    }

    /// `count` evenly spaced ranks, used when rebalancing a sibling set.
    pub fn distribute(count: usize) -> Vec<Rank> {
        if count == 0 {
            return Vec::new();
        }
        let mut width = 1usize;
        let mut span = BASE as u64;
        while span < 2 * (count as u64 + 1) {
            width += 1;
            span *= BASE as u64;
        }
        (1..=count as u64)
            .map(|i| {
                let value = i * span / (count as u64 + 1);
                let mut digits = vec![b'0'; width];
                let mut v = value;
                for slot in digits.iter_mut().rev() {
                    *slot = DIGITS[(v % BASE as u64) as usize];
                    v /= BASE as u64;
                }
                let mut s = String::from_utf8(digits).expect("base36 digits are ascii");
                while s.ends_with('0') {
                    s.pop();
                }
                Rank(s)
            })
            .collect()
    }
}

impl Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Rank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Rank {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Rank::new(&s).map_err(serde::de::Error::custom)
    }
}

fn digit_value(b: u8) -> usize {
    match b {
        b'0'..=b'9' => (b - b'0') as usize,
        _ => (b - b'a') as usize + 10,
    }
}

/// Digit string strictly between `a` and `b` (`b == None` meaning 1.0).
fn midpoint(a: &str, b: Option<&str>) -> String {
    if let Some(b) = b {
        // Shared prefix stays; recurse on the first differing digit.
        let mut n = 0;
        while n < b.len() {
            let da = a.as_bytes().get(n).copied().unwrap_or(b'0');
            if da != b.as_bytes()[n] {
                break;
            }
            n += 1;
        }
        if n > 0 {
            return format!("{}{}", &b[..n], midpoint(a.get(n..).unwrap_or(""), Some(&b[n..])));
        }
    }

    let digit_a = a.as_bytes().first().map(|&d| digit_value(d)).unwrap_or(0);
    let digit_b = b
        .and_then(|b| b.as_bytes().first())
        .map(|&d| digit_value(d))
        .unwrap_or(BASE);

    if digit_b - digit_a > 1 {
        let mid = (digit_a + digit_b).div_ceil(2);
        return (DIGITS[mid] as char).to_string();
    }

    // Consecutive leading digits.
    match b {
        Some(b) if b.len() > 1 => (b.as_bytes()[0] as char).to_string(),
        _ => {
            format!("{}{}", DIGITS[digit_a] as char, midpoint(a.get(1..).unwrap_or(""), None))
        }
    }
}
