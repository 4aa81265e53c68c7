//! Result Collector - reads what the grading script left behind

use serde_json::Value;
use std::path::Path;

/// Read the grading results file.
///
/// The file is optional and its content is untrusted: a missing, unreadable
/// or malformed file yields `None`, never an error.
pub async fn collect_results(path: &Path) -> Option<Value> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::info!(path = %path.display(), error = %e, "No grading results to collect");
            return None;
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Grading results are not valid JSON");
            None
        }
    }
}
