//! Canonicalization of index references in model output.
//!
//! Prompts list files and abstractions as `"<index> # <label>"`, and models
//! echo them back either as bare integers or in that annotated form.
//! [`IndexRef`] accepts both; [`IndexRef::resolve`] turns either into a
//! bounds-checked `usize` so nothing past the validators sees the raw form.

use std::fmt;

use serde::Deserialize;

/// An index as the model wrote it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IndexRef {
    Int(i64),
    Text(String),
}

impl IndexRef {
    /// Parse and bounds-check against `0..bound`.
    pub fn resolve(&self, bound: usize) -> Result<usize, String> {
        let value = match self {
            IndexRef::Int(n) => *n,
            IndexRef::Text(s) => parse_annotated(s)?,
        };
        if value < 0 || value as u64 >= bound as u64 {
            return Err(format!("index {} out of range 0..{}", value, bound));
        }
        Ok(value as usize)
    }
}

impl fmt::Display for IndexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexRef::Int(n) => write!(f, "{}", n),
            IndexRef::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// `"3 # src/main.rs"` → `3`; `" 7 "` → `7`.
fn parse_annotated(raw: &str) -> Result<i64, String> {
    let head = raw.split('#').next().unwrap_or_default().trim();
    head.parse::<i64>()
        .map_err(|_| format!("cannot read an index from {:?}", raw))
}

/// Format an entry the way prompts list it.
pub fn annotated(index: usize, label: &str) -> String {
    format!("{} # {}", index, label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_and_annotated_forms() {
        assert_eq!(IndexRef::Int(2).resolve(3), Ok(2));
        assert_eq!(
            IndexRef::Text("1 # src/cache.rs".into()).resolve(3),
            Ok(1)
        );
        assert_eq!(IndexRef::Text(" 0 ".into()).resolve(3), Ok(0));
    }

    #[test]
    fn test_out_of_range_and_negative() {
        assert!(IndexRef::Int(3).resolve(3).is_err());
        assert!(IndexRef::Int(-1).resolve(3).is_err());
        assert!(IndexRef::Text("9 # nope".into()).resolve(3).is_err());
    }

    #[test]
    fn test_unparseable_text() {
        let err = IndexRef::Text("cache.rs".into()).resolve(3).unwrap_err();
        assert!(err.contains("cache.rs"));
    }

    #[test]
    fn test_deserializes_mixed_list() {
        let refs: Vec<IndexRef> = serde_yaml::from_str("- 0\n- \"2 # lib.rs\"\n").unwrap();
        assert_eq!(refs[0], IndexRef::Int(0));
        assert_eq!(refs[1], IndexRef::Text("2 # lib.rs".into()));
    }
}
