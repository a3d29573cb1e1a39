//! Type Registry - TypeId → concrete implementation
//!
//! Each polymorphic family (value transformations, mapping rules, comparison
//! operations) has one process-wide [`TypeRegistry`]. A registration records
//! how to build the concrete type from JSON and how to create a default
//! instance, so the TypeId-aware serde converters and the type selectors in the
//! API never switch over a closed list of kinds.
//!
//! Built-in types are registered explicitly on first access (see
//! [`builtins`]); consumers add their own with [`TypeRegistry::register`].

pub mod builtins;
pub mod polymorphic;

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{RegistryError, RegistryResult};
use crate::transform::comparison::ComparisonOperation;
use crate::transform::rules::MappingRule;
use crate::transform::value::ValueTransformation;

// =============================================================================
// Type metadata
// =============================================================================

/// Static metadata every registrable type carries.
///
/// `TYPE_ID` is persisted in every serialized configuration and must never
/// change once released.
pub trait TypeInfo {
    const TYPE_ID: &'static str;
    const DISPLAY_NAME: &'static str;
    const SHORT_NAME: &'static str;
    const DESCRIPTION: &'static str;
}

/// Moves a concrete value into its family's trait object.
pub trait Boxed<F: ?Sized> {
    fn boxed(self) -> Box<F>;
}

/// The polymorphic families the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Family {
    Transformation,
    Rule,
    Comparison,
}

impl Family {
    pub fn label(&self) -> &'static str {
        match self {
            Family::Transformation => "transformation",
            Family::Rule => "rule",
            Family::Comparison => "comparison",
        }
    }
}

/// Presentation metadata for a registered type (used to populate selectors).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub type_id: String,
    pub display_name: &'static str,
    pub short_name: &'static str,
    pub description: &'static str,
    pub family: Family,
}

// =============================================================================
// Registration
// =============================================================================

/// A resolved registry entry.
pub struct Registration<F: ?Sized> {
    descriptor: TypeDescriptor,
    rust_type: TypeId,
    rust_name: &'static str,
    deserialize: fn(Value) -> serde_json::Result<Box<F>>,
    create: fn() -> Box<F>,
}

impl<F: ?Sized> Clone for Registration<F> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            rust_type: self.rust_type,
            rust_name: self.rust_name,
            deserialize: self.deserialize,
            create: self.create,
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for Registration<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("type_id", &self.descriptor.type_id)
            .field("rust_name", &self.rust_name)
            .finish()
    }
}

impl<F: ?Sized> Registration<F> {
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The concrete Rust type registered under this TypeId.
    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Build an instance from its JSON properties (discriminator removed).
    pub fn deserialize(&self, properties: Value) -> serde_json::Result<Box<F>> {
        (self.deserialize)(properties)
    }

    /// Build a default-configured instance.
    pub fn create(&self) -> Box<F> {
        (self.create)()
    }
}

fn deserialize_as<C, F>(properties: Value) -> serde_json::Result<Box<F>>
where
    C: DeserializeOwned + Boxed<F>,
    F: ?Sized,
{
    serde_json::from_value::<C>(properties).map(Boxed::boxed)
}

fn create_default<C, F>() -> Box<F>
where
    C: Default + Boxed<F>,
    F: ?Sized,
{
    C::default().boxed()
}

// =============================================================================
// Registry
// =============================================================================

/// Concurrent TypeId → implementation map for one family.
///
/// Reads vastly outnumber writes (registration happens at startup), so a
/// `RwLock` around a plain map is enough. Lookups clone the entry and release
/// the lock before any deserialization runs, since nested configurations
/// resolve through the same registry.
pub struct TypeRegistry<F: ?Sized> {
    family: Family,
    entries: RwLock<HashMap<String, Registration<F>>>,
}

impl<F: ?Sized + 'static> TypeRegistry<F> {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Register `C` under its own TypeId.
    pub fn register<C>(&self) -> RegistryResult<()>
    where
        C: TypeInfo + DeserializeOwned + Default + Boxed<F> + 'static,
    {
        self.register_with_id::<C>(C::TYPE_ID)
    }

    /// Register `C` under an explicit TypeId (aliases for renamed types).
    ///
    /// Registering the same type twice under one id is a no-op; a different
    /// type under an existing id is rejected.
    pub fn register_with_id<C>(&self, type_id: &str) -> RegistryResult<()>
    where
        C: TypeInfo + DeserializeOwned + Default + Boxed<F> + 'static,
    {
        let mut entries = self.write();

        if let Some(existing) = entries.get(type_id) {
            if existing.rust_type == TypeId::of::<C>() {
                return Ok(());
            }
            return Err(RegistryError::DuplicateTypeId {
                family: self.family.label(),
                type_id: type_id.to_string(),
                existing: existing.rust_name,
                attempted: type_name::<C>(),
            });
        }

        entries.insert(
            type_id.to_string(),
            Registration {
                descriptor: TypeDescriptor {
                    type_id: type_id.to_string(),
                    display_name: C::DISPLAY_NAME,
                    short_name: C::SHORT_NAME,
                    description: C::DESCRIPTION,
                    family: self.family,
                },
                rust_type: TypeId::of::<C>(),
                rust_name: type_name::<C>(),
                deserialize: deserialize_as::<C, F>,
                create: create_default::<C, F>,
            },
        );
        Ok(())
    }

    /// Resolve a TypeId, failing with [`RegistryError::UnknownTypeId`].
    pub fn resolve(&self, type_id: &str) -> RegistryResult<Registration<F>> {
        self.try_resolve(type_id).ok_or_else(|| RegistryError::UnknownTypeId {
            family: self.family.label(),
            type_id: type_id.to_string(),
        })
    }

    pub fn try_resolve(&self, type_id: &str) -> Option<Registration<F>> {
        self.read().get(type_id).cloned()
    }

    pub fn is_registered(&self, type_id: &str) -> bool {
        self.read().contains_key(type_id)
    }

    /// Sorted list of every registered TypeId.
    pub fn known_type_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn descriptor(&self, type_id: &str) -> Option<TypeDescriptor> {
        self.read().get(type_id).map(|r| r.descriptor.clone())
    }

    /// Display metadata for every registered type, sorted by TypeId.
    pub fn descriptors(&self) -> Vec<TypeDescriptor> {
        let mut descriptors: Vec<TypeDescriptor> = self.read().values().map(|r| r.descriptor.clone()).collect();
        descriptors.sort_by(|a, b| a.type_id.cmp(&b.type_id));
        descriptors
    }

    /// Create a default-configured instance of a registered type.
    pub fn create(&self, type_id: &str) -> RegistryResult<Box<F>> {
        self.resolve(type_id).map(|r| r.create())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Registration<F>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Registration<F>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Process-wide registries
// =============================================================================

static TRANSFORMATIONS: Lazy<TypeRegistry<dyn ValueTransformation>> = Lazy::new(|| {
    let registry = TypeRegistry::new(Family::Transformation);
    builtins::register_transformations(&registry);
    registry
});

static RULES: Lazy<TypeRegistry<dyn MappingRule>> = Lazy::new(|| {
    let registry = TypeRegistry::new(Family::Rule);
    builtins::register_rules(&registry);
    registry
});

static COMPARISONS: Lazy<TypeRegistry<dyn ComparisonOperation>> = Lazy::new(|| {
    let registry = TypeRegistry::new(Family::Comparison);
    builtins::register_comparisons(&registry);
    registry
});

/// Registry of value transformations (pipeline stages).
pub fn transformations() -> &'static TypeRegistry<dyn ValueTransformation> {
    &TRANSFORMATIONS
}

/// Registry of mapping rules.
pub fn rules() -> &'static TypeRegistry<dyn MappingRule> {
    &RULES
}

/// Registry of comparison operations.
pub fn comparisons() -> &'static TypeRegistry<dyn ComparisonOperation> {
    &COMPARISONS
}

/// Descriptors of every registered type across all families.
pub fn all_descriptors() -> Vec<TypeDescriptor> {
    let mut all = transformations().descriptors();
    all.extend(rules().descriptors());
    all.extend(comparisons().descriptors());
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::comparison::{Equals, IsNull};
    use crate::transform::value::{Interpolate, MapValues};

    #[test]
    fn test_register_then_resolve() {
        let registry: TypeRegistry<dyn ValueTransformation> = TypeRegistry::new(Family::Transformation);
        registry.register::<Interpolate>().unwrap();

        let resolved = registry.resolve("interpolate").unwrap();
        assert_eq!(resolved.rust_type(), TypeId::of::<Interpolate>());
        assert_eq!(resolved.descriptor().family, Family::Transformation);
        assert!(registry.try_resolve("nope").is_none());
        assert!(matches!(
            registry.resolve("nope"),
            Err(RegistryError::UnknownTypeId { .. })
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let registry: TypeRegistry<dyn ValueTransformation> = TypeRegistry::new(Family::Transformation);
        registry.register::<Interpolate>().unwrap();

        // Same type again is a no-op
        assert!(registry.register::<Interpolate>().is_ok());

        // Different type under the same id is rejected, first one wins
        let err = registry.register_with_id::<MapValues>("interpolate").unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTypeId { .. }));
        assert_eq!(
            registry.resolve("interpolate").unwrap().rust_type(),
            TypeId::of::<Interpolate>()
        );
    }

    #[test]
    fn test_alias_registration() {
        let registry: TypeRegistry<dyn ComparisonOperation> = TypeRegistry::new(Family::Comparison);
        registry.register::<Equals>().unwrap();
        registry.register_with_id::<Equals>("eq").unwrap();

        assert_eq!(registry.known_type_ids(), vec!["eq", "equals"]);
        assert_eq!(registry.create("eq").unwrap().type_key(), "equals");
    }

    #[test]
    fn test_global_registries_hold_builtins() {
        for id in [
            "interpolate",
            "calculate",
            "map",
            "regexMatch",
            "substring",
            "combineFields",
            "conditional",
        ] {
            assert!(transformations().is_registered(id), "missing transformation {}", id);
        }
        for id in ["copyField", "combineFields", "staticValue", "constantValue", "ignore", "conditionalRule"] {
            assert!(rules().is_registered(id), "missing rule {}", id);
        }
        assert!(comparisons().is_registered(IsNull::TYPE_ID));
        assert_eq!(comparisons().known_type_ids().len(), 15);
    }

    #[test]
    fn test_registration_while_resolving() {
        let registry: TypeRegistry<dyn ComparisonOperation> = TypeRegistry::new(Family::Comparison);
        registry.register::<Equals>().unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| builtins::register_comparisons(&registry));
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        assert_eq!(registry.resolve("equals").unwrap().rust_type(), TypeId::of::<Equals>());
                        if let Some(found) = registry.try_resolve(IsNull::TYPE_ID) {
                            assert_eq!(found.rust_type(), TypeId::of::<IsNull>());
                        }
                        for id in registry.known_type_ids() {
                            assert!(registry.create(&id).is_ok(), "{} listed but not creatable", id);
                        }
                    }
                });
            }
        });

        assert_eq!(registry.known_type_ids().len(), 15);
    }

    #[test]
    fn test_concurrent_resolution() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| transformations().resolve("substring").map(|r| r.rust_name())))
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
    }
}
