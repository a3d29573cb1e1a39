use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::MappingRule;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::field::FieldTransformation;
use crate::transform::result::{ResultContext, TransformationResult};
use crate::transform::value::ValueTransformation;

/// Take the value of a single source field through its pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyFieldRule {
    #[serde(default)]
    pub source_field_transformations: Vec<FieldTransformation>,
}

impl CopyFieldRule {
    pub fn new(source: FieldTransformation) -> Self {
        Self {
            source_field_transformations: vec![source],
        }
    }

    pub fn for_field(name: impl Into<String>) -> Self {
        Self::new(FieldTransformation::for_field_name(name))
    }

    /// Append a stage to the source pipeline (builder style).
    pub fn then(mut self, transformation: Box<dyn ValueTransformation>) -> Self {
        if let Some(source) = self.source_field_transformations.first_mut() {
            source.add_transformation(transformation);
        }
        self
    }
}

impl TypeInfo for CopyFieldRule {
    const TYPE_ID: &'static str = "copyField";
    const DISPLAY_NAME: &'static str = "Copy field";
    const SHORT_NAME: &'static str = "Copy";
    const DESCRIPTION: &'static str = "Use the value of one source field, optionally transformed";
}

#[async_trait]
impl MappingRule for CopyFieldRule {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn source_field_transformations(&self) -> &[FieldTransformation] {
        &self.source_field_transformations
    }

    fn source_field_transformations_mut(&mut self) -> &mut [FieldTransformation] {
        &mut self.source_field_transformations
    }

    fn is_empty(&self) -> bool {
        self.source_field_transformations.is_empty()
    }

    async fn resolve(&self, context: &ResultContext, cancel: &Cancellation) -> Option<TransformationResult> {
        let source = self.source_field_transformations.first()?;
        Some(source.apply_record(context, cancel).await)
    }
}
