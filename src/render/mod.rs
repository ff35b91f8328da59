//! Render-facing surface: resident view snapshots and GPU upload

pub mod view;
pub mod upload;

pub use upload::{GpuGridBuffer, WgpuUploader};
pub use view::{ResidentView, ViewBuilder};
