//! Image folder source node.
//!
//! Lists the image files in a configured directory and publishes the sorted
//! path list as a value payload, for dataset tooling downstream.

use crate::bus::NodeParams;
use crate::error::{FlowError, Result};
use crate::graph::node::{KernelContext, NodeKernel};
use crate::graph::port::{Payload, PortRegistrar};
use crate::types::DataKind;
use std::path::PathBuf;
use tracing::debug;

pub const TYPE_NAME: &str = "ImageFolder";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

#[derive(Default)]
pub struct ImageFolderKernel {
    folder: Option<PathBuf>,
}

impl ImageFolderKernel {
    pub fn new() -> Self {
        Self::default()
    }

    fn list_images(&self) -> Result<Vec<String>> {
        let folder = self
            .folder
            .as_ref()
            .ok_or_else(|| FlowError::Params("no folder_path configured".to_string()))?;
        let mut images = Vec::new();
        for entry in std::fs::read_dir(folder)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                images.push(path.to_string_lossy().into_owned());
            }
        }
        images.sort();
        Ok(images)
    }
}

impl NodeKernel for ImageFolderKernel {
    fn register_ports(&mut self, ports: &mut PortRegistrar<'_>) {
        ports.add_output("Images", &[DataKind::Image, DataKind::ImageGroup]);
    }

    fn update_params(&mut self, _ctx: &mut KernelContext<'_>, params: &NodeParams) -> Result<()> {
        if let Some(path) = params.get("folder_path").and_then(|v| v.as_str()) {
            self.folder = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut KernelContext<'_>) -> Result<()> {
        let images = self.list_images()?;
        debug!(node = %ctx.node_name(), count = images.len(), "listed images");
        ctx.set_output("Images", Payload::Value(serde_json::json!(images)))
    }
}
