//! Saving and loading page index trees.
//!
//! JSON for anything a human may open, bincode when size matters. The
//! format follows the file extension.

use crate::error::{KnowledgeError, Result};
use crate::tree::PageIndexTree;
use std::fs;
use std::path::Path;

/// On-disk encoding of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    Json,
    Bincode,
}

impl SaveFormat {
    /// Pick the format from a file extension; anything unknown is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json,
        }
    }
}

/// Save a tree, choosing the format from the extension.
pub fn save_tree(tree: &PageIndexTree, path: &Path) -> Result<()> {
    let data = match SaveFormat::from_path(path) {
        SaveFormat::Json => serde_json::to_vec_pretty(tree)
            .map_err(|e| KnowledgeError::Serialization(e.to_string()))?,
        SaveFormat::Bincode => bincode::encode_to_vec(tree, bincode::config::standard())
            .map_err(|e| KnowledgeError::Serialization(e.to_string()))?,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| KnowledgeError::io(parent, e))?;
    }
    fs::write(path, &data).map_err(|e| KnowledgeError::io(path, e))
}

/// Load a tree and check its page ranges.
pub fn load_tree(path: &Path) -> Result<PageIndexTree> {
    if !tree_exists(path) {
        return Err(KnowledgeError::IndexNotFound(path.to_path_buf()));
    }

    let data = fs::read(path).map_err(|e| KnowledgeError::io(path, e))?;
    let tree: PageIndexTree = match SaveFormat::from_path(path) {
        SaveFormat::Json => serde_json::from_slice(&data)
            .map_err(|e| KnowledgeError::Serialization(e.to_string()))?,
        SaveFormat::Bincode => {
            let (tree, _) = bincode::decode_from_slice(&data, bincode::config::standard())
                .map_err(|e| KnowledgeError::Serialization(e.to_string()))?;
            tree
        }
    };

    tree.validate()?;
    Ok(tree)
}

/// Check if an index file exists at the given path.
pub fn tree_exists(path: &Path) -> bool {
    path.is_file()
}

/// Size of an index file in bytes.
pub fn tree_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| KnowledgeError::io(path, e))?;
    Ok(metadata.len())
}
