use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use tracing::debug;

use super::Producer;
use crate::error::ConfigurationError;

/// Collects producers during schema build.
#[derive(Default)]
pub struct ProducerRegistryBuilder {
    producers: IndexMap<String, Arc<dyn Producer>>,
}

impl ProducerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a producer under its definition id. Ids are unique.
    pub fn register(&mut self, producer: Arc<dyn Producer>) -> Result<(), ConfigurationError> {
        let producer_id = producer.definition().id.clone();
        if self.producers.contains_key(&producer_id) {
            return Err(ConfigurationError::DuplicateProducer { producer: producer_id });
        }
        debug!(
            producer_id = %producer_id,
            input_count = producer.definition().inputs.len(),
            "producer registered"
        );
        self.producers.insert(producer_id, producer);
        Ok(())
    }

    pub fn contains(&self, producer_id: &str) -> bool {
        self.producers.contains_key(producer_id)
    }

    pub fn build(self) -> ProducerRegistry {
        ProducerRegistry {
            producers: Arc::new(self.producers),
        }
    }
}

/// Immutable set of producers shared by every compiled pipeline.
#[derive(Clone, Default)]
pub struct ProducerRegistry {
    producers: Arc<IndexMap<String, Arc<dyn Producer>>>,
}

impl fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("producers", &self.producers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProducerRegistry {
    pub fn get(&self, producer_id: &str) -> Option<&Arc<dyn Producer>> {
        self.producers.get(producer_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}
