//! Node type registry.
//!
//! Node types are created through registered factory closures keyed by type
//! name. The explicit registry replaces any reflection-style lookup: a type
//! that is not registered simply cannot be instantiated.

use crate::config::RuntimeConfig;
use crate::error::{FlowError, Result};
use crate::types::NodeName;
use std::collections::HashMap;

use super::node::NodeKernel;
use super::nodes;

type KernelFactory =
    Box<dyn Fn(&NodeName, &RuntimeConfig) -> Result<Box<dyn NodeKernel>> + Send + Sync>;

#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, KernelFactory>,
}

impl NodeRegistry {
    /// An empty registry, for hosts that bring their own node types.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in node types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(nodes::media_player::TYPE_NAME, |name, config| {
            Ok(Box::new(nodes::media_player::MediaPlayerKernel::new(
                name, config,
            )))
        });
        registry.register(nodes::image_folder::TYPE_NAME, |_name, _config| {
            Ok(Box::new(nodes::image_folder::ImageFolderKernel::new()))
        });
        registry.register(nodes::dataset_generator::TYPE_NAME, |_name, _config| {
            Ok(Box::new(
                nodes::dataset_generator::DatasetGeneratorKernel::new(),
            ))
        });
        registry
    }

    /// Register a factory under `type_name`, replacing any previous one.
    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&NodeName, &RuntimeConfig) -> Result<Box<dyn NodeKernel>> + Send + Sync + 'static,
    {
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Instantiate a kernel of the given type.
    pub fn create(
        &self,
        type_name: &str,
        name: &NodeName,
        config: &RuntimeConfig,
    ) -> Result<Box<dyn NodeKernel>> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| FlowError::UnknownNodeType(type_name.to_string()))?;
        factory(name, config)
    }

    /// Registered type names, for diagnostics.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
