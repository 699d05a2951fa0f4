//! Built-in node types.

pub mod dataset_generator;
pub mod image_folder;
pub mod media_player;
