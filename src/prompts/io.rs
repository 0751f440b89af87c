//! Prompt-set export/import.
//!
//! The file is a JSON array of `{promptId, text, weight, cc, color}` objects.
//! Import is all-or-nothing: one bad entry rejects the whole file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ControllerBinding, PromptSet, WeightedPrompt};
use crate::error::CoreError;

/// One exported prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptEntry {
    #[serde(default)]
    pub prompt_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub weight: f32,
    #[serde(default)]
    pub cc: Option<u8>,
    /// Only written for channel-specific bindings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    #[serde(default)]
    pub color: String,
}

impl From<&WeightedPrompt> for PromptEntry {
    fn from(prompt: &WeightedPrompt) -> Self {
        Self {
            prompt_id: prompt.id.clone(),
            text: prompt.text.clone(),
            weight: prompt.weight,
            cc: prompt.binding.map(|b| b.control),
            channel: prompt.binding.and_then(|b| b.channel),
            color: prompt.color.clone(),
        }
    }
}

impl PromptEntry {
    fn into_prompt(self) -> WeightedPrompt {
        WeightedPrompt {
            id: self.prompt_id,
            text: self.text,
            weight: self.weight,
            binding: self.cc.map(|control| ControllerBinding {
                channel: self.channel,
                control,
            }),
            color: self.color,
        }
    }
}

pub fn to_entries(set: &PromptSet) -> Vec<PromptEntry> {
    set.iter().map(PromptEntry::from).collect()
}

/// Build a set from entries, rejecting the whole batch on the first bad one.
pub fn from_entries(entries: Vec<PromptEntry>) -> Result<PromptSet, CoreError> {
    let mut set = PromptSet::new();
    for (index, entry) in entries.into_iter().enumerate() {
        if entry.prompt_id.trim().is_empty() {
            return Err(CoreError::InvalidImportFormat(format!(
                "entry {} has no promptId",
                index
            )));
        }
        if entry.text.trim().is_empty() {
            return Err(CoreError::InvalidImportFormat(format!(
                "entry {} ({}) has no text",
                index, entry.prompt_id
            )));
        }
        set.insert(entry.into_prompt()).map_err(|e| match e {
            CoreError::InvalidPrompt(msg) => {
                CoreError::InvalidImportFormat(format!("entry {}: {}", index, msg))
            }
            other => other,
        })?;
    }
    Ok(set)
}

pub fn export_json(set: &PromptSet) -> Result<String, CoreError> {
    serde_json::to_string_pretty(&to_entries(set))
        .map_err(|e| CoreError::Io(format!("Failed to encode prompts: {}", e)))
}

pub fn import_json(json: &str) -> Result<PromptSet, CoreError> {
    let entries: Vec<PromptEntry> = serde_json::from_str(json)
        .map_err(|e| CoreError::InvalidImportFormat(e.to_string()))?;
    from_entries(entries)
}

pub fn save_to_file(set: &PromptSet, path: &Path) -> Result<(), CoreError> {
    let json = export_json(set)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, json)?;
    info!(path = %path.display(), count = set.len(), "Prompts exported");
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<PromptSet, CoreError> {
    let json = std::fs::read_to_string(path)?;
    let set = import_json(&json)?;
    info!(path = %path.display(), count = set.len(), "Prompts imported");
    Ok(set)
}
