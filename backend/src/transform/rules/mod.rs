//! Mapping rules - how a target field gets its value
//!
//! A [`MappingRule`] resolves one target field for one row. Rules that read
//! the row own one [`FieldTransformation`] per contributing source field;
//! context-free rules (static, constant, ignore) need no row at all.
//!
//! | TypeId | Rule |
//! |---|---|
//! | `copyField` | [`CopyFieldRule`] |
//! | `combineFields` | [`CombineFieldsRule`] |
//! | `staticValue` | [`StaticValueRule`] |
//! | `constantValue` | [`ConstantValueRule`] |
//! | `ignore` | [`IgnoreRule`] |
//! | `conditionalRule` | [`ConditionalRule`] |

mod combine;
mod conditional;
mod constant;
mod copy_field;
mod ignore;
mod static_value;

pub use combine::CombineFieldsRule;
pub use conditional::ConditionalRule;
pub use constant::{ConstantKind, ConstantValueRule};
pub use copy_field::CopyFieldRule;
pub use ignore::IgnoreRule;
pub use static_value::StaticValueRule;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use super::cancel::Cancellation;
use super::field::FieldTransformation;
use super::result::{ResultContext, TransformationResult};
use crate::models::TableDefinition;
use crate::registry::{self, polymorphic::polymorphic_family};

/// Resolves the value of one target field.
#[async_trait]
pub trait MappingRule: RuleErased + Debug {
    fn type_key(&self) -> &'static str;

    /// Source pipelines owned by this rule, one per contributing field.
    fn source_field_transformations(&self) -> &[FieldTransformation];

    fn source_field_transformations_mut(&mut self) -> &mut [FieldTransformation];

    /// Whether resolving needs the source record. Context-free rules
    /// override this to `false`.
    fn requires_record(&self) -> bool {
        true
    }

    /// An empty rule means "ignore this field".
    fn is_empty(&self) -> bool;

    /// Resolve the value for the row in `context`.
    ///
    /// `None` means the rule has nothing to contribute.
    async fn resolve(&self, context: &ResultContext, cancel: &Cancellation) -> Option<TransformationResult>;

    /// Names of the source fields read by this rule.
    fn source_fields(&self) -> Vec<String> {
        self.source_field_transformations()
            .iter()
            .map(|f| f.field_name().to_string())
            .collect()
    }

    /// Rebind source pipelines to the descriptors of a parsed table.
    fn bind(&mut self, table: &TableDefinition) {
        bind_sources(self.source_field_transformations_mut(), table);
    }

    fn display_name(&self) -> String {
        registry::rules()
            .descriptor(self.type_key())
            .map(|d| d.display_name.to_string())
            .unwrap_or_else(|| self.type_key().to_string())
    }
}

polymorphic_family!(MappingRule, RuleErased, registry::rules());

pub(crate) fn bind_sources(sources: &mut [FieldTransformation], table: &TableDefinition) {
    for source in sources {
        if let Some(field) = table.field(source.field_name()).map(Arc::clone) {
            source.set_field(field);
        }
    }
}
