//! Process-wide catalogue of components, triggers, integrations, and
//! blueprints.
//!
//! Registration happens once at initialization through
//! [`RegistryBuilder`]; the built [`Registry`] is read-only. The registry
//! also vends the shared outbound HTTP client: the single transport pool
//! every component uses for external calls.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::canvas::blueprint::Blueprint;
use crate::component::{Component, Integration, Trigger};
use crate::schema::Field;

/// Errors raised by registry lookups.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("{kind} not found: {name}")]
    #[diagnostic(
        code(loomwork::registry::not_found),
        help("Component names are the stable identifier across canvas versions; check the registration list.")
    )]
    NotFound { kind: &'static str, name: String },
}

/// Catalogue entry describing a registered component or trigger for the
/// editor surface.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueEntry {
    pub name: String,
    pub label: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub configuration: Vec<Field>,
}

/// Read-only name → implementation catalogue.
pub struct Registry {
    components: FxHashMap<String, Arc<dyn Component>>,
    triggers: FxHashMap<String, Arc<dyn Trigger>>,
    integrations: FxHashMap<String, Arc<dyn Integration>>,
    blueprints: FxHashMap<String, Blueprint>,
    http: reqwest::Client,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn component(&self, name: &str) -> Result<Arc<dyn Component>, RegistryError> {
        self.components
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: "component",
                name: name.to_string(),
            })
    }

    pub fn trigger(&self, name: &str) -> Result<Arc<dyn Trigger>, RegistryError> {
        self.triggers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: "trigger",
                name: name.to_string(),
            })
    }

    pub fn integration(&self, name: &str) -> Result<Arc<dyn Integration>, RegistryError> {
        self.integrations
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: "integration",
                name: name.to_string(),
            })
    }

    pub fn blueprint(&self, name: &str) -> Result<Blueprint, RegistryError> {
        self.blueprints
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: "blueprint",
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn has_blueprint(&self, name: &str) -> bool {
        self.blueprints.contains_key(name)
    }

    /// The shared outbound HTTP client.
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Descriptors for every registered component and trigger.
    #[must_use]
    pub fn catalogue(&self) -> Vec<CatalogueEntry> {
        let mut entries: Vec<CatalogueEntry> = self
            .components
            .values()
            .map(|c| CatalogueEntry {
                name: c.name().to_string(),
                label: c.label().to_string(),
                description: c.description().to_string(),
                icon: c.icon().to_string(),
                color: c.color().to_string(),
                configuration: c.configuration(),
            })
            .chain(self.triggers.values().map(|t| CatalogueEntry {
                name: t.name().to_string(),
                label: t.label().to_string(),
                description: t.description().to_string(),
                icon: "bolt".to_string(),
                color: "gray".to_string(),
                configuration: t.configuration(),
            }))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("components", &self.components.len())
            .field("triggers", &self.triggers.len())
            .field("integrations", &self.integrations.len())
            .field("blueprints", &self.blueprints.len())
            .finish()
    }
}

/// Builder collecting registrations before the catalogue freezes.
#[derive(Default)]
pub struct RegistryBuilder {
    components: FxHashMap<String, Arc<dyn Component>>,
    triggers: FxHashMap<String, Arc<dyn Trigger>>,
    integrations: FxHashMap<String, Arc<dyn Integration>>,
    blueprints: FxHashMap<String, Blueprint>,
    http: Option<reqwest::Client>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn component(mut self, component: Arc<dyn Component>) -> Self {
        self.components
            .insert(component.name().to_string(), component);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Arc<dyn Trigger>) -> Self {
        self.triggers.insert(trigger.name().to_string(), trigger);
        self
    }

    #[must_use]
    pub fn integration(mut self, integration: Arc<dyn Integration>) -> Self {
        self.integrations
            .insert(integration.name().to_string(), integration);
        self
    }

    #[must_use]
    pub fn blueprint(mut self, blueprint: Blueprint) -> Self {
        self.blueprints.insert(blueprint.name.clone(), blueprint);
        self
    }

    /// Override the outbound HTTP client (tests, proxies).
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    #[must_use]
    pub fn build(self) -> Registry {
        Registry {
            components: self.components,
            triggers: self.triggers,
            integrations: self.integrations,
            blueprints: self.blueprints,
            http: self.http.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::NoopComponent;

    #[test]
    fn lookup_by_name() {
        let registry = Registry::builder()
            .component(Arc::new(NoopComponent))
            .build();
        assert!(registry.component("noop").is_ok());
        match registry.component("missing") {
            Err(err) => assert!(err.to_string().contains("component not found")),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn catalogue_is_sorted_by_name() {
        let registry = Registry::builder()
            .component(Arc::new(NoopComponent))
            .build();
        let entries = registry.catalogue();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "noop");
    }
}
