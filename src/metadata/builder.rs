use super::descriptor::{EmbeddableDescriptor, EntityDescriptor, EnumDescriptor, NamedQueryDescriptor};
use super::model::{self, Metamodel};
use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};

/// JSON form of a mapping document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub embeddables: Vec<EmbeddableDescriptor>,
    #[serde(default)]
    pub enumerations: Vec<EnumDescriptor>,
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
    #[serde(default)]
    pub named_queries: Vec<NamedQueryDescriptor>,
}

/// Collects descriptors and turns them into a validated [`Metamodel`].
#[derive(Debug, Clone, Default)]
pub struct MetamodelBuilder {
    document: MappingDocument,
}

impl MetamodelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, descriptor: EntityDescriptor) -> Self {
        self.document.entities.push(descriptor);
        self
    }

    pub fn embeddable(mut self, descriptor: EmbeddableDescriptor) -> Self {
        self.document.embeddables.push(descriptor);
        self
    }

    pub fn enumeration(mut self, descriptor: EnumDescriptor) -> Self {
        self.document.enumerations.push(descriptor);
        self
    }

    pub fn named_query(mut self, name: &str, query: &str) -> Self {
        self.document.named_queries.push(NamedQueryDescriptor {
            name: name.to_string(),
            query: query.to_string(),
        });
        self
    }

    /// Add everything declared in a JSON [`MappingDocument`].
    pub fn json(mut self, document: &str) -> Result<Self> {
        let parsed: MappingDocument = serde_json::from_str(document)?;
        self.document.embeddables.extend(parsed.embeddables);
        self.document.enumerations.extend(parsed.enumerations);
        self.document.entities.extend(parsed.entities);
        self.document.named_queries.extend(parsed.named_queries);
        Ok(self)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    /// Validate the descriptors. Named queries are parsed and translated
    /// here, so a broken one fails at startup rather than on first use.
    pub fn build(self) -> Result<Metamodel> {
        let MappingDocument {
            embeddables,
            enumerations,
            entities,
            named_queries,
        } = self.document;
        let model = model::resolve(entities, embeddables, enumerations, named_queries)?;

        for (name, query) in model.named_queries() {
            crate::query::check(&model, query)
                .map_err(|e| DbError::Mapping(format!("Named query '{}' is invalid: {}", name, e)))?;
        }

        log::debug!("Metamodel built with {} entity types", model.entities().count());
        Ok(model)
    }
}
