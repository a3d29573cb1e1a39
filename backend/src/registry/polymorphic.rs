//! TypeId-aware JSON converters.
//!
//! A polymorphic value serializes as its own properties plus a `"typeId"`
//! discriminator. Decoding reads the discriminator first, resolves it through
//! the family's [`TypeRegistry`], then decodes the remaining properties into
//! the resolved concrete type.
//!
//! [`polymorphic_family!`] wires a family trait up with boxed cloning and the
//! serde impls for `Box<dyn Family>`.

use serde_json::{Map, Value};

use super::TypeRegistry;
use crate::error::{RegistryError, RegistryResult};

/// JSON property carrying the discriminator.
pub const TYPE_ID_KEY: &str = "typeId";

/// Tag a concrete configuration with its TypeId.
pub fn encode(type_id: &str, properties: Value) -> Result<Value, String> {
    let mut object = match properties {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(format!(
                "'{}' must serialize as a JSON object, got {}",
                type_id, other
            ))
        }
    };
    object.insert(TYPE_ID_KEY.to_string(), Value::String(type_id.to_string()));
    Ok(Value::Object(object))
}

/// Resolve the discriminator of `value` and decode the rest of it.
pub fn decode<F: ?Sized + 'static>(registry: &TypeRegistry<F>, value: Value) -> RegistryResult<Box<F>> {
    let family = registry.family().label();
    let Value::Object(mut object) = value else {
        return Err(RegistryError::MissingDiscriminator { family });
    };

    let type_id = match object.remove(TYPE_ID_KEY) {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => return Err(RegistryError::MissingDiscriminator { family }),
    };

    let registration = registry.resolve(&type_id)?;
    registration
        .deserialize(Value::Object(object))
        .map_err(|e| RegistryError::InvalidConfiguration {
            family,
            type_id,
            message: e.to_string(),
        })
}

/// Implements the object-safe plumbing of a polymorphic family.
///
/// Generates `$erased` (the supertrait providing boxed clone, JSON
/// configuration and downcasting), a blanket impl of it for every concrete
/// member, `Boxed<dyn $family>` for every member, and `Clone`, `Serialize`
/// and `Deserialize` for `Box<dyn $family>` through `$registry`.
macro_rules! polymorphic_family {
    ($family:ident, $erased:ident, $registry:expr) => {
        pub trait $erased: Send + Sync {
            fn clone_boxed(&self) -> Box<dyn $family>;
            fn config_json(&self) -> serde_json::Result<serde_json::Value>;
            fn as_any(&self) -> &dyn std::any::Any;
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
        }

        impl<T> $erased for T
        where
            T: $family + serde::Serialize + Clone + 'static,
        {
            fn clone_boxed(&self) -> Box<dyn $family> {
                Box::new(self.clone())
            }

            fn config_json(&self) -> serde_json::Result<serde_json::Value> {
                serde_json::to_value(self)
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }

        impl<T> $crate::registry::Boxed<dyn $family> for T
        where
            T: $family + 'static,
        {
            fn boxed(self) -> Box<dyn $family> {
                Box::new(self)
            }
        }

        impl Clone for Box<dyn $family> {
            fn clone(&self) -> Self {
                (**self).clone_boxed()
            }
        }

        impl serde::Serialize for Box<dyn $family> {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                use serde::ser::Error;
                let inner: &dyn $family = &**self;
                let properties = inner.config_json().map_err(S::Error::custom)?;
                let tagged = $crate::registry::polymorphic::encode(inner.type_key(), properties)
                    .map_err(S::Error::custom)?;
                serde::Serialize::serialize(&tagged, serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for Box<dyn $family> {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                use serde::de::Error;
                let value = <serde_json::Value as serde::Deserialize>::deserialize(deserializer)?;
                $crate::registry::polymorphic::decode($registry, value).map_err(D::Error::custom)
            }
        }
    };
}

pub(crate) use polymorphic_family;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use crate::transform::comparison::{Between, ComparisonOperation};
    use crate::transform::rules::{CopyFieldRule, MappingRule};
    use crate::transform::value::{Calculate, Substring, ValueTransformation};
    use serde_json::json;

    #[test]
    fn test_serialized_form_carries_type_id() {
        let stage: Box<dyn ValueTransformation> = Box::new(Substring::new(-1, i32::MAX));
        let value = serde_json::to_value(&stage).unwrap();
        assert_eq!(value["typeId"], json!("substring"));
        assert_eq!(value["startIndex"], json!(-1));
    }

    #[test]
    fn test_round_trip_preserves_concrete_type() {
        let stage: Box<dyn ValueTransformation> = Box::new(Calculate::new("${0} + 1.01", 2));
        let text = serde_json::to_string(&stage).unwrap();
        let back: Box<dyn ValueTransformation> = serde_json::from_str(&text).unwrap();

        let calc = back.as_any().downcast_ref::<Calculate>().unwrap();
        assert_eq!(calc.formula, "${0} + 1.01");
        assert_eq!(calc.decimal_places, 2);
    }

    #[test]
    fn test_missing_discriminator() {
        let err = decode(registry::comparisons(), json!({ "comparisonValue": "a" })).unwrap_err();
        assert!(matches!(err, RegistryError::MissingDiscriminator { family: "comparison" }));

        let err = decode(registry::comparisons(), json!("equals")).unwrap_err();
        assert!(matches!(err, RegistryError::MissingDiscriminator { .. }));
    }

    #[test]
    fn test_unknown_discriminator() {
        let result: Result<Box<dyn MappingRule>, _> = serde_json::from_value(json!({ "typeId": "teleport" }));
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Unknown rule typeId 'teleport'"));
    }

    #[test]
    fn test_invalid_properties() {
        let err = decode(
            registry::transformations(),
            json!({ "typeId": "substring", "startIndex": "first" }),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_clone_is_deep() {
        let original: Box<dyn ComparisonOperation> = Box::new(Between::new("1", "5"));
        let mut copy = original.clone();
        copy.as_any_mut().downcast_mut::<Between>().unwrap().comparison_value = "2".into();

        assert_eq!(original.as_any().downcast_ref::<Between>().unwrap().comparison_value, "1");
    }

    #[test]
    fn test_rule_round_trip() {
        let rule: Box<dyn MappingRule> = Box::new(CopyFieldRule::for_field("Code"));
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["typeId"], json!("copyField"));

        let back: Box<dyn MappingRule> = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(back.type_key(), "copyField");
        assert_eq!(serde_json::to_value(&back).unwrap(), value);
    }

    /// Serialize, decode and compare: same concrete type, same JSON.
    fn assert_round_trip<F>(original: &Box<F>, type_of: fn(&Box<F>) -> std::any::TypeId)
    where
        F: ?Sized + 'static,
        Box<F>: serde::Serialize + serde::de::DeserializeOwned,
    {
        let value = serde_json::to_value(original).unwrap();
        let back: Box<F> = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(type_of(&back), type_of(original), "type of {}", value);
        assert_eq!(serde_json::to_value(&back).unwrap(), value);
    }

    #[test]
    fn test_every_registered_transformation_round_trips() {
        let registry = registry::transformations();
        for id in registry.known_type_ids() {
            let original = registry.create(&id).unwrap();
            let value = serde_json::to_value(&original).unwrap();
            assert_eq!(value[TYPE_ID_KEY], json!(id));

            let back: Box<dyn ValueTransformation> = serde_json::from_value(value.clone()).unwrap();
            assert_eq!(back.type_key(), original.type_key());
            assert_eq!((*back.as_any()).type_id(), registry.resolve(&id).unwrap().rust_type());
            assert_eq!(serde_json::to_value(&back).unwrap(), value);
        }
    }

    #[test]
    fn test_every_registered_rule_round_trips() {
        let registry = registry::rules();
        for id in registry.known_type_ids() {
            let original = registry.create(&id).unwrap();
            let value = serde_json::to_value(&original).unwrap();
            assert_eq!(value[TYPE_ID_KEY], json!(id));

            let back: Box<dyn MappingRule> = serde_json::from_value(value.clone()).unwrap();
            assert_eq!(back.type_key(), original.type_key());
            assert_eq!((*back.as_any()).type_id(), registry.resolve(&id).unwrap().rust_type());
            assert_eq!(serde_json::to_value(&back).unwrap(), value);
        }
    }

    #[test]
    fn test_every_registered_comparison_round_trips() {
        let registry = registry::comparisons();
        for id in registry.known_type_ids() {
            let original = registry.create(&id).unwrap();
            let value = serde_json::to_value(&original).unwrap();
            assert_eq!(value[TYPE_ID_KEY], json!(id));

            let back: Box<dyn ComparisonOperation> = serde_json::from_value(value.clone()).unwrap();
            assert_eq!(back.type_key(), original.type_key());
            assert_eq!((*back.as_any()).type_id(), registry.resolve(&id).unwrap().rust_type());
            assert_eq!(serde_json::to_value(&back).unwrap(), value);
        }
    }

    #[test]
    fn test_configured_members_round_trip() {
        use crate::transform::comparison::{
            Contains, EndsWith, Equals, GreaterThan, GreaterThanOrEqual, LessThan, LessThanOrEqual, MatchesRegex,
            NotEquals, StartsWith,
        };
        use crate::transform::rules::{ConstantKind, ConstantValueRule, IgnoreRule, StaticValueRule};
        use crate::transform::value::{Interpolate, MapValues, RegexMatch};

        let stages: Vec<Box<dyn ValueTransformation>> = vec![
            Box::new(Interpolate::new("${1}, ${0}")),
            Box::new(MapValues::from_pairs([("FR", "France"), ("DE", "Germany")])),
            Box::new(RegexMatch::new(r"#[a-z]+")),
        ];
        for stage in &stages {
            assert_round_trip(stage, |s: &Box<dyn ValueTransformation>| (*s.as_any()).type_id());
        }

        let rules: Vec<Box<dyn MappingRule>> = vec![
            Box::new(StaticValueRule::new("EUR")),
            Box::new(ConstantValueRule::new(ConstantKind::NewUuid)),
            Box::new(IgnoreRule::default()),
        ];
        for rule in &rules {
            assert_round_trip(rule, |r: &Box<dyn MappingRule>| (*r.as_any()).type_id());
        }

        let comparisons: Vec<Box<dyn ComparisonOperation>> = vec![
            Box::new(Equals::new("a")),
            Box::new(NotEquals::new("b")),
            Box::new(GreaterThan::new("1")),
            Box::new(GreaterThanOrEqual::new("2")),
            Box::new(LessThan::new("3")),
            Box::new(LessThanOrEqual::new("4")),
            Box::new(Between::new("5", "9")),
            Box::new(Contains::new("x")),
            Box::new(StartsWith::new("y")),
            Box::new(EndsWith::new("z")),
            Box::new(MatchesRegex::new(r"^\d+$")),
        ];
        for comparison in &comparisons {
            assert_round_trip(comparison, |c: &Box<dyn ComparisonOperation>| (*c.as_any()).type_id());
        }
    }
}
