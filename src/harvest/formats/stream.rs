//! `CONSOLE` connector: prints each record as one JSON line.

use crate::harvest::connector::Connector;
use crate::harvest::template::{BrokerDefinition, ConnectorTemplate, InvalidDefinition};
use crate::model::DataReference;
use crate::traits::{DataOutputError, OutputBroker, ReleaseError};
use async_trait::async_trait;
use std::io::Write;

pub const CONSOLE: &str = "CONSOLE";

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleConnector;

impl Connector for ConsoleConnector {
    type Broker = Box<dyn OutputBroker>;

    fn template(&self) -> ConnectorTemplate {
        ConnectorTemplate::new(CONSOLE, "Console", vec![])
    }

    fn build(&self, _definition: BrokerDefinition) -> Result<Self::Broker, InvalidDefinition> {
        Ok(Box::new(StreamOutput::new(CONSOLE, std::io::stdout())))
    }
}

/// Writes JSON lines to any [`Write`] sink.
pub struct StreamOutput {
    name: String,
    sink: Box<dyn Write + Send>,
}

impl StreamOutput {
    pub fn new(name: &str, sink: impl Write + Send + 'static) -> Self {
        Self {
            name: name.to_string(),
            sink: Box::new(sink),
        }
    }
}

fn envelope(reference: &DataReference) -> serde_json::Value {
    serde_json::json!({
        "id": reference.id(),
        "sourceUri": reference.source_uri(),
        "broker": reference.broker_uri(),
        "fetched": reference.fetch_timestamp().to_rfc3339(),
        "contentType": reference.content_type().mime(),
        "attributes": reference.attributes(),
        "content": String::from_utf8_lossy(reference.content()),
    })
}

#[async_trait]
impl OutputBroker for StreamOutput {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn publish(&mut self, reference: &DataReference) -> Result<(), DataOutputError> {
        let line = serde_json::to_string(&envelope(reference))
            .map_err(|e| DataOutputError::Rejected(e.to_string()))?;
        writeln!(self.sink, "{line}")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ReleaseError> {
        self.sink
            .flush()
            .map_err(|e| ReleaseError::new(&self.name, e.to_string()))
    }
}
