//! Sequence manifest load/save
//!
//! The manifest is the JSON sidecar written at import time next to the
//! binary chunk file. Loading assigns a fresh runtime [`SequenceId`] and
//! validates the descriptor before handing it to the streaming side.

use std::path::Path;

use crate::asset::descriptor::{SequenceDescriptor, SequenceId};
use crate::core::error::Error;
use crate::core::Result;

/// Write a descriptor as a JSON manifest
pub fn save_descriptor(path: &Path, descriptor: &SequenceDescriptor) -> Result<()> {
    let json = serde_json::to_string_pretty(descriptor)
        .map_err(|e| Error::Sequence(format!("manifest serialization failed: {}", e)))?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load and validate a descriptor from a JSON manifest
pub fn load_descriptor(path: &Path) -> Result<SequenceDescriptor> {
    let json = std::fs::read_to_string(path)?;
    let mut descriptor: SequenceDescriptor = serde_json::from_str(&json)
        .map_err(|e| Error::Sequence(format!("manifest parse failed: {}", e)))?;
    descriptor.id = SequenceId::next();
    descriptor.validate()?;
    Ok(descriptor)
}
