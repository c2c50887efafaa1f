//! Identifier definitions.

use std::fmt;

use serde::de::{self, Visitor};

use crate::{define_id, IdError};

// =============================================================================
// System-generated
// =============================================================================

define_id!(
    /// Identifies one proposed reallocation or combination awaiting a decision.
    ActionId,
    "act"
);

define_id!(
    /// Identifies one advisory pass over a fleet snapshot.
    PassId,
    "pass"
);

// =============================================================================
// Fleet-assigned
// =============================================================================

/// Identifier of a bus as assigned by the fleet source.
///
/// Source files use plain integers (`1`, `2`, ...) as often as strings, and
/// admin decisions arrive with either form, so comparison is done on the
/// normalized string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusId(String);

impl BusId {
    /// Build a bus ID from any displayable label.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(IdError::Empty);
        }
        if trimmed.contains('/') || trimmed.chars().any(char::is_control) {
            return Err(IdError::InvalidBusId(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for BusId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<u32> for BusId {
    fn from(n: u32) -> Self {
        Self(n.to_string())
    }
}

impl serde::Serialize for BusId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Numeric labels go back out as numbers so files round-trip unchanged.
        match self.0.parse::<u64>() {
            Ok(n) if n.to_string() == self.0 => serializer.serialize_u64(n),
            _ => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> serde::Deserialize<'de> for BusId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(BusIdVisitor)
    }
}

struct BusIdVisitor;

impl<'de> Visitor<'de> for BusIdVisitor {
    type Value = BusId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a bus id as a string or integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<BusId, E> {
        BusId::new(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<BusId, E> {
        Ok(BusId(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<BusId, E> {
        Ok(BusId(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<BusId, E> {
        // Spreadsheet exports write integral ids as `3.0`.
        // 2^63; anything at or past it would saturate in the cast.
        const LIMIT: f64 = 9_223_372_036_854_775_808.0;
        if v.is_finite() && v.fract() == 0.0 && v.abs() < LIMIT {
            Ok(BusId(format!("{}", v as i64)))
        } else {
            Err(E::custom(format!("bus id must be an in-range integer, got {v}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_action_id_roundtrip() {
        let id = ActionId::new();
        let parsed: ActionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(id.to_string().starts_with("act_"));
    }

    #[test]
    fn test_action_id_rejects_other_prefix() {
        let pass = PassId::new().to_string();
        let err = pass.parse::<ActionId>().unwrap_err();
        assert!(err.is_prefix_error());
    }

    #[test]
    fn test_action_id_rejects_garbage() {
        assert_eq!("".parse::<ActionId>().unwrap_err(), IdError::Empty);
        assert_eq!(
            "act01HV4Z2WQXKJNM8GPQY6VBKC3D".parse::<ActionId>().unwrap_err(),
            IdError::MissingSeparator
        );
        assert!(matches!(
            "act_nope".parse::<ActionId>().unwrap_err(),
            IdError::InvalidUlid(_)
        ));
    }

    #[test]
    fn test_action_ids_sort_by_creation() {
        let first = ActionId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ActionId::new();
        assert!(first < second);
    }

    #[test]
    fn test_bus_id_accepts_numbers_and_strings() {
        let from_int: BusId = serde_json::from_str("7").unwrap();
        let from_str: BusId = serde_json::from_str("\" 7 \"").unwrap();
        let from_float: BusId = serde_json::from_str("7.0").unwrap();
        assert_eq!(from_int, from_str);
        assert_eq!(from_int, from_float);
        assert_eq!(from_int.as_str(), "7");
    }

    #[test]
    fn test_bus_id_serializes_numeric_labels_as_numbers() {
        assert_eq!(serde_json::to_string(&BusId::from(12)).unwrap(), "12");
        let named = BusId::new("north-3").unwrap();
        assert_eq!(serde_json::to_string(&named).unwrap(), "\"north-3\"");
    }

    #[test]
    fn test_bus_id_rejects_empty_and_slashes() {
        assert_eq!(BusId::new("  ").unwrap_err(), IdError::Empty);
        assert!(matches!(
            BusId::new("a/b").unwrap_err(),
            IdError::InvalidBusId(_)
        ));
        assert!(serde_json::from_str::<BusId>("1.5").is_err());
    }

    #[test]
    fn test_bus_id_rejects_floats_out_of_integer_range() {
        assert!(serde_json::from_str::<BusId>("1e300").is_err());
        assert!(serde_json::from_str::<BusId>("-1e19").is_err());
        let big: BusId = serde_json::from_str("1e15").unwrap();
        assert_eq!(big.as_str(), "1000000000000000");
    }

    proptest! {
        #[test]
        fn prop_bus_id_numeric_json_roundtrip(n in 0u32..1_000_000) {
            let id = BusId::from(n);
            let json = serde_json::to_string(&id).unwrap();
            let back: BusId = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(id, back);
        }
    }
}
