use crate::error::ModelError;
use std::path::Path;
use tracing::debug;

/// Parse a labels file of `index,label` lines; a bare `label` line is also
/// accepted. Labels are taken in line order and blank lines are skipped.
pub fn parse_labels(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(',') {
            Some((_index, label)) => label.trim().to_string(),
            None => line.to_string(),
        })
        .collect()
}

pub fn load_labels(path: &Path) -> Result<Vec<String>, ModelError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ModelError::Labels {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;

    let labels = parse_labels(&contents);
    if labels.is_empty() {
        return Err(ModelError::Labels {
            path: path.display().to_string(),
            details: "no labels found".to_string(),
        });
    }

    debug!("Loaded {} labels from {}", labels.len(), path.display());
    Ok(labels)
}
