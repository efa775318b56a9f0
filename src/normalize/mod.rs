// src/normalize/mod.rs

use serde_json::Value;

pub mod amount;
pub mod column;
pub mod date;

pub use amount::normalize_amount;
pub use column::{normalize_row, normalize_temporal_column};
pub use date::normalize_date;

/// What a normalizer did with one value. Every variant carries the value to
/// send downstream, so normalization never fails its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// Parsed and rewritten into the backend representation.
    Converted(Value),
    /// Left as it was (possibly trimmed).
    Unchanged(Value),
    /// Looked like a locale value but did not parse; passed through raw.
    Degraded(Value),
}

impl Normalized {
    pub fn value(&self) -> &Value {
        match self {
            Normalized::Converted(v) | Normalized::Unchanged(v) | Normalized::Degraded(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Normalized::Converted(v) | Normalized::Unchanged(v) | Normalized::Degraded(v) => v,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Normalized::Degraded(_))
    }

    fn rank(&self) -> u8 {
        match self {
            Normalized::Unchanged(_) => 0,
            Normalized::Converted(_) => 1,
            Normalized::Degraded(_) => 2,
        }
    }

    /// Feed this value through a second step; the combined tag is the more
    /// severe of the two.
    pub fn then(self, step: impl FnOnce(Value) -> Normalized) -> Normalized {
        let first = self.rank();
        let next = step(self.into_value());
        if next.rank() >= first {
            next
        } else {
            match next.into_value() {
                v if first == 2 => Normalized::Degraded(v),
                v => Normalized::Converted(v),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn then_keeps_the_most_severe_tag() {
        let n = Normalized::Converted(json!("2026-01-05")).then(Normalized::Unchanged);
        assert_eq!(n, Normalized::Converted(json!("2026-01-05")));

        let n = Normalized::Unchanged(json!("1,x")).then(Normalized::Degraded);
        assert!(n.is_degraded());

        let n = Normalized::Unchanged(json!(1)).then(Normalized::Unchanged);
        assert_eq!(n, Normalized::Unchanged(json!(1)));
    }
}
