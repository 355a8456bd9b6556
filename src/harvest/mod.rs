//! Harvest module - connectors, definition validation and collection.
//!
//! This module provides the pieces that sit between raw configuration and the
//! job executor:
//! - **Templates**: [`ConnectorTemplate`] describes arguments, validation
//!   yields [`BrokerDefinition`]
//! - **Connectors**: [`Connector`] factories and the [`ConnectorRegistry`]
//! - **Extraction**: [`MetadataExtractor`] for enriching binary documents
//! - **Collector**: single-shot [`DataCollector`]
//! - **Formats**: concrete `FOLDER` and `CONSOLE` connectors

pub mod collector;
pub mod connector;
pub mod extract;
pub mod formats;
pub mod template;

// Re-export commonly used types
pub use template::{
    Argument, ArgumentKind, BrokerDefinition, ConnectorTemplate, InvalidDefinition, Violation,
};

pub use connector::{Connector, ConnectorRegistry, InputConnector, OutputConnector};

pub use extract::{enrich, ExtractError, MetadataExtractor};

pub use collector::{CollectSummary, DataCollector};
