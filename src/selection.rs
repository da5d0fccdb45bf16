//! Parsing of subject selection expressions.
//!
//! | Input | Meaning |
//! |-------|---------|
//! | `all` | every subject |
//! | `none` | nothing; the run ends |
//! | `2-5` | inclusive range |
//! | `1,3,5` | explicit list; out-of-range entries are dropped |

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    None,
    /// Zero-based indices, in the order given.
    Indices(Vec<usize>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("invalid range '{0}', use a form like 1-5")]
    BadRange(String),
    #[error("range must lie between 1 and {max}")]
    RangeOutOfBounds { max: usize },
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("no valid indices selected (available: 1 to {max})")]
    Empty { max: usize },
}

/// Parse `expr` against `count` available subjects.
///
/// Returns the selection plus the 1-based entries that were out of range and
/// dropped from a list.
pub fn parse_selection(expr: &str, count: usize) -> Result<(Selection, Vec<usize>), SelectionError> {
    let choice = expr.trim().to_ascii_lowercase();
    match choice.as_str() {
        "none" => return Ok((Selection::None, Vec::new())),
        "all" => return Ok((Selection::Indices((0..count).collect()), Vec::new())),
        _ => {}
    }

    if choice.contains('-') {
        let (a, b) = choice
            .split_once('-')
            .ok_or_else(|| SelectionError::BadRange(choice.clone()))?;
        let (start, end) = match (a.trim().parse::<usize>(), b.trim().parse::<usize>()) {
            (Ok(s), Ok(e)) => (s, e),
            _ => return Err(SelectionError::BadRange(choice.clone())),
        };
        if !(1 <= start && start <= end && end <= count) {
            return Err(SelectionError::RangeOutOfBounds { max: count });
        }
        return Ok((Selection::Indices((start - 1..end).collect()), Vec::new()));
    }

    let mut picked = Vec::new();
    let mut dropped = Vec::new();
    for part in choice.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let n: usize = part
            .parse()
            .map_err(|_| SelectionError::NotANumber(part.to_string()))?;
        if (1..=count).contains(&n) {
            picked.push(n - 1);
        } else {
            dropped.push(n);
        }
    }
    if picked.is_empty() {
        return Err(SelectionError::Empty { max: count });
    }
    Ok((Selection::Indices(picked), dropped))
}
