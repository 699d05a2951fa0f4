//! Dataset generator node.
//!
//! Consumes an image list through its critical input and assembles a
//! dataset description. The upstream image source is pulled automatically
//! when this node runs with no data on the wire, which makes this the
//! simplest end-to-end exercise of the dependency protocol.

use crate::bus::NodeParams;
use crate::error::{FlowError, Result};
use crate::graph::node::{KernelContext, NodeKernel};
use crate::graph::port::{Payload, PortRegistrar};
use crate::types::DataKind;
use tracing::info;

pub const TYPE_NAME: &str = "DatasetGenerator";

pub struct DatasetGeneratorKernel {
    dataset_name: String,
}

impl DatasetGeneratorKernel {
    pub fn new() -> Self {
        Self {
            dataset_name: "dataset".to_string(),
        }
    }
}

impl Default for DatasetGeneratorKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeKernel for DatasetGeneratorKernel {
    fn register_ports(&mut self, ports: &mut PortRegistrar<'_>) {
        ports.add_input("Images", &[DataKind::Image, DataKind::ImageGroup], true);
        ports.add_output("Dataset", &[DataKind::Dataset]);
    }

    fn update_params(&mut self, _ctx: &mut KernelContext<'_>, params: &NodeParams) -> Result<()> {
        if let Some(name) = params.get("dataset_name").and_then(|v| v.as_str()) {
            self.dataset_name = name.to_string();
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut KernelContext<'_>) -> Result<()> {
        let images = match ctx.input("Images") {
            Some(Payload::Value(value)) => value.clone(),
            Some(Payload::Frame(_)) => {
                return Err(FlowError::Params(
                    "Images input carried a frame payload".to_string(),
                ))
            }
            None => return Err(FlowError::Params("Images input has no data".to_string())),
        };
        let count = images.as_array().map(|a| a.len()).unwrap_or(0);
        info!(node = %ctx.node_name(), count, "assembled dataset");

        ctx.set_output(
            "Dataset",
            Payload::Value(serde_json::json!({
                "name": self.dataset_name,
                "images": images,
                "count": count,
            })),
        )
    }
}
