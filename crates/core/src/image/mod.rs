//! Still image upscaling.

pub mod commands;
mod pipeline;

pub use commands::ImageOutputs;
pub use pipeline::ImagePipeline;
