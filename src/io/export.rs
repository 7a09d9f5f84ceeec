//! Export per-star estimates to JSON.
//!
//! The export is meant to be easy to consume in notebooks or downstream scripts.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::StarEstimate;
use crate::error::AppError;

/// Schema of an exported batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateFile {
    pub tool: String,
    pub generated: DateTime<Utc>,
    pub stars: Vec<StarEstimate>,
}

/// Write the batch results to a JSON file.
pub fn write_estimates_json(path: &Path, stars: &[StarEstimate]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export JSON '{}': {e}", path.display())))?;

    let doc = EstimateFile {
        tool: "vsini".to_string(),
        generated: Utc::now(),
        stars: stars.to_vec(),
    };

    serde_json::to_writer_pretty(file, &doc)
        .map_err(|e| AppError::new(2, format!("Failed to write export JSON: {e}")))?;

    Ok(())
}
