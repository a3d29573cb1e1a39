//! Built-in registrations, run once when each registry is first accessed.

use super::TypeRegistry;
use crate::api::logs::log_error;
use crate::error::RegistryResult;
use crate::transform::comparison::{
    Between, ComparisonOperation, Contains, EndsWith, Equals, GreaterThan, GreaterThanOrEqual, IsEmpty,
    IsNotEmpty, IsNotNull, IsNull, LessThan, LessThanOrEqual, MatchesRegex, NotEquals, StartsWith,
};
use crate::transform::rules::{
    CombineFieldsRule, ConditionalRule, ConstantValueRule, CopyFieldRule, IgnoreRule, MappingRule,
    StaticValueRule,
};
use crate::transform::value::{
    Calculate, CombineFields, Conditional, Interpolate, MapValues, RegexMatch, Substring, ValueTransformation,
};

pub(super) fn register_transformations(registry: &TypeRegistry<dyn ValueTransformation>) {
    report(registry.register::<Interpolate>());
    report(registry.register::<Calculate>());
    report(registry.register::<MapValues>());
    report(registry.register::<RegexMatch>());
    report(registry.register::<Substring>());
    report(registry.register::<CombineFields>());
    report(registry.register::<Conditional>());
}

pub(super) fn register_rules(registry: &TypeRegistry<dyn MappingRule>) {
    report(registry.register::<CopyFieldRule>());
    report(registry.register::<CombineFieldsRule>());
    report(registry.register::<StaticValueRule>());
    report(registry.register::<ConstantValueRule>());
    report(registry.register::<IgnoreRule>());
    report(registry.register::<ConditionalRule>());
}

pub(super) fn register_comparisons(registry: &TypeRegistry<dyn ComparisonOperation>) {
    report(registry.register::<Equals>());
    report(registry.register::<NotEquals>());
    report(registry.register::<GreaterThan>());
    report(registry.register::<GreaterThanOrEqual>());
    report(registry.register::<LessThan>());
    report(registry.register::<LessThanOrEqual>());
    report(registry.register::<Between>());
    report(registry.register::<Contains>());
    report(registry.register::<StartsWith>());
    report(registry.register::<EndsWith>());
    report(registry.register::<IsNull>());
    report(registry.register::<IsNotNull>());
    report(registry.register::<IsEmpty>());
    report(registry.register::<IsNotEmpty>());
    report(registry.register::<MatchesRegex>());
}

fn report(result: RegistryResult<()>) {
    if let Err(e) = result {
        log_error(format!("Built-in registration rejected: {}", e));
    }
}
