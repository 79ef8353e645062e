use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single attribute value. Only flat JSON scalars are accepted; `null`
/// and objects fail to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Equality used by condition matching. Integers and floats compare
    /// numerically so that `1` and `1.0` are the same value.
    pub fn same_as(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a == b,
            (Scalar::Int(a), Scalar::Float(b)) | (Scalar::Float(b), Scalar::Int(a)) => {
                int_equals_float(*a, *b)
            }
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            _ => false,
        }
    }
}

/// Exact comparison: `f` must be integral and within `i64` range.
fn int_equals_float(i: i64, f: f64) -> bool {
    const LOWER: f64 = i64::MIN as f64;
    f.fract() == 0.0 && (LOWER..-LOWER).contains(&f) && f as i64 == i
}

/// An attribute is either one scalar or a flat list of scalars
/// (e.g. a subject's functional roles).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl AttributeValue {
    pub fn as_slice(&self) -> &[Scalar] {
        match self {
            AttributeValue::One(s) => std::slice::from_ref(s),
            AttributeValue::Many(items) => items,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::One(Scalar::Text(s.to_string()))
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::One(Scalar::Text(s))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::One(Scalar::Bool(b))
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::One(Scalar::Int(n))
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(items: Vec<&str>) -> Self {
        AttributeValue::Many(
            items
                .into_iter()
                .map(|s| Scalar::Text(s.to_string()))
                .collect(),
        )
    }
}

/// Named attributes of a subject, resource, or environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, AttributeValue)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_numeric_equality() {
        assert!(Scalar::Int(1).same_as(&Scalar::Float(1.0)));
        assert!(!Scalar::Int(1).same_as(&Scalar::Text("1".into())));
        assert!(!Scalar::Bool(true).same_as(&Scalar::Int(1)));
        assert!(!Scalar::Int(1).same_as(&Scalar::Float(1.5)));
    }

    #[test]
    fn test_scalar_int_float_equality_is_exact_above_2_pow_53() {
        let two_pow_53 = 9_007_199_254_740_992i64;
        assert!(Scalar::Int(two_pow_53).same_as(&Scalar::Float(two_pow_53 as f64)));
        assert!(!Scalar::Int(two_pow_53 + 1).same_as(&Scalar::Float(9_007_199_254_740_992.0)));
        assert!(!Scalar::Float(9_007_199_254_740_992.0).same_as(&Scalar::Int(two_pow_53 + 1)));
        assert!(!Scalar::Int(i64::MAX).same_as(&Scalar::Float(9_223_372_036_854_775_808.0)));
        assert!(Scalar::Int(i64::MIN).same_as(&Scalar::Float(i64::MIN as f64)));
        assert!(!Scalar::Int(0).same_as(&Scalar::Float(f64::NAN)));
    }

    #[test]
    fn test_attribute_value_decodes_scalars_and_lists() {
        let one: AttributeValue = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(one, AttributeValue::from("admin"));

        let many: AttributeValue = serde_json::from_str("[\"a\", 2, true]").unwrap();
        assert!(matches!(many, AttributeValue::Many(_)));
        assert_eq!(many.as_slice().len(), 3);
    }

    #[test]
    fn test_attribute_value_rejects_nested_shapes() {
        assert!(serde_json::from_str::<AttributeValue>("{\"a\": 1}").is_err());
        assert!(serde_json::from_str::<AttributeValue>("[[1]]").is_err());
        assert!(serde_json::from_str::<AttributeValue>("null").is_err());
    }

    #[test]
    fn test_attributes_builder() {
        let attrs = Attributes::new()
            .with("role", "accountant")
            .with("functionalRoles", vec!["approver", "poster"]);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("functionalRoles").unwrap().as_slice().len(), 2);
        assert!(attrs.get("missing").is_none());
    }
}
