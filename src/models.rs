use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A converted OBJ model and its material library, if one sits beside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub obj_file: String,
    pub mtl_file: Option<String>,
}

/// Lists `.obj` files in `dir`, sorted by name. A missing directory is empty.
pub async fn list_models(dir: &Path) -> std::io::Result<Vec<ModelEntry>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut names = BTreeSet::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            names.insert(name.to_string());
        }
    }

    Ok(names
        .iter()
        .filter_map(|name| name.strip_suffix(".obj"))
        .map(|stem| {
            let mtl = format!("{stem}.mtl");
            ModelEntry {
                obj_file: format!("{stem}.obj"),
                mtl_file: names.contains(&mtl).then_some(mtl),
            }
        })
        .collect())
}
