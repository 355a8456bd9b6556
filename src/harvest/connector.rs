//! Connector contract and the connector registry.

use crate::harvest::template::{BrokerDefinition, ConnectorTemplate, InvalidDefinition};
use crate::model::{Category, EntityDefinition};
use crate::traits::{InputBroker, OutputBroker};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Factory for one broker kind.
///
/// Implementors describe their arguments in [`template`](Connector::template)
/// and build the broker in [`build`](Connector::build). Callers go through
/// [`create_broker`](Connector::create_broker), which validates first.
pub trait Connector: Send + Sync {
    type Broker;

    /// Stable, side-effect-free description of the accepted arguments.
    fn template(&self) -> ConnectorTemplate;

    /// Builds a live broker from an already validated definition.
    fn build(&self, definition: BrokerDefinition) -> Result<Self::Broker, InvalidDefinition>;

    /// Validates `definition` against the template and only then builds.
    ///
    /// # Errors
    ///
    /// [`InvalidDefinition`] listing every violated constraint. No broker is
    /// constructed (and no I/O attempted) for a rejected definition.
    fn create_broker(
        &self,
        definition: &EntityDefinition,
    ) -> Result<Self::Broker, InvalidDefinition> {
        let validated = self.template().validate(definition)?;
        debug!(connector = %validated.type_key(), "Definition validated, building broker");
        self.build(validated)
    }
}

pub type InputConnector = dyn Connector<Broker = Box<dyn InputBroker>>;
pub type OutputConnector = dyn Connector<Broker = Box<dyn OutputBroker>>;

/// Thread-safe lookup of connectors by type key, one table per direction.
#[derive(Default)]
pub struct ConnectorRegistry {
    inbound: DashMap<String, Arc<InputConnector>>,
    outbound: DashMap<String, Arc<OutputConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an input connector under its template's type key,
    /// replacing any previous one.
    pub fn register_input(&self, connector: Arc<InputConnector>) {
        let type_key = connector.template().type_key;
        info!(connector = %type_key, "Registered input connector");
        self.inbound.insert(type_key, connector);
    }

    pub fn register_output(&self, connector: Arc<OutputConnector>) {
        let type_key = connector.template().type_key;
        info!(connector = %type_key, "Registered output connector");
        self.outbound.insert(type_key, connector);
    }

    pub fn input(&self, type_key: &str) -> Option<Arc<InputConnector>> {
        self.inbound.get(type_key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn output(&self, type_key: &str) -> Option<Arc<OutputConnector>> {
        self.outbound.get(type_key).map(|entry| Arc::clone(entry.value()))
    }

    /// Templates of every connector in `category`, sorted by type key.
    pub fn templates(&self, category: Category) -> Vec<ConnectorTemplate> {
        let mut templates: Vec<ConnectorTemplate> = match category {
            Category::Inbound => self.inbound.iter().map(|e| e.value().template()).collect(),
            Category::Outbound => self.outbound.iter().map(|e| e.value().template()).collect(),
        };
        templates.sort_by(|a, b| a.type_key.cmp(&b.type_key));
        templates
    }

    pub fn has_connector(&self, category: Category, type_key: &str) -> bool {
        match category {
            Category::Inbound => self.inbound.contains_key(type_key),
            Category::Outbound => self.outbound.contains_key(type_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::template::{Argument, ArgumentKind};
    use crate::testing::MockInput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConnector {
        built: Arc<AtomicUsize>,
    }

    impl Connector for CountingConnector {
        type Broker = Box<dyn InputBroker>;

        fn template(&self) -> ConnectorTemplate {
            ConnectorTemplate::new(
                "COUNTING",
                "Counting",
                vec![Argument::required("hostUrl", "Host URL", ArgumentKind::Url)],
            )
        }

        fn build(&self, _definition: BrokerDefinition) -> Result<Self::Broker, InvalidDefinition> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockInput::new(vec![])))
        }
    }

    #[test]
    fn test_rejected_definition_never_builds() {
        let built = Arc::new(AtomicUsize::new(0));
        let connector = CountingConnector {
            built: Arc::clone(&built),
        };

        let result = connector.create_broker(&EntityDefinition::new("COUNTING"));

        assert!(result.is_err());
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let ok = connector.create_broker(
            &EntityDefinition::new("COUNTING").with_property("hostUrl", "http://csw.example.com"),
        );
        assert!(ok.is_ok());
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_lookup_by_category() {
        let registry = ConnectorRegistry::new();
        registry.register_input(Arc::new(CountingConnector {
            built: Arc::new(AtomicUsize::new(0)),
        }));

        assert!(registry.input("COUNTING").is_some());
        assert!(registry.output("COUNTING").is_none());
        assert!(registry.has_connector(Category::Inbound, "COUNTING"));
        assert!(!registry.has_connector(Category::Outbound, "COUNTING"));
        assert_eq!(registry.templates(Category::Inbound).len(), 1);
        assert!(registry.templates(Category::Outbound).is_empty());
    }
}
