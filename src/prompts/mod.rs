//! Weighted prompts and the set the user steers with.
//!
//! The set is ordered and keyed by prompt id. Which prompts are *active* is
//! decided together with the session's filtered-text set: nonzero weight and
//! text the backend has not rejected.

pub mod io;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::midi::ControlChange;
use crate::session::WirePrompt;

/// Upper end of the weight range a controller sweeps.
pub const MAX_CONTROLLER_WEIGHT: f32 = 2.0;

/// Stock prompt bank: `(colour, text)`.
const DEFAULT_BANK: [(&str, &str); 16] = [
    ("#9900ff", "Bossa Nova"),
    ("#5200ff", "Chillwave"),
    ("#ff25f6", "Drum and Bass"),
    ("#2af6de", "Post Punk"),
    ("#ffdd28", "Shoegaze"),
    ("#2af6de", "Funk"),
    ("#9900ff", "Chiptune"),
    ("#3dffab", "Lush Strings"),
    ("#d8ff3e", "Sparkling Arpeggios"),
    ("#d9b2ff", "Staccato Rhythms"),
    ("#3dffab", "Punchy Kick"),
    ("#ffdd28", "Dubstep"),
    ("#ff25f6", "K Pop"),
    ("#d8ff3e", "Neo Soul"),
    ("#5200ff", "Trip Hop"),
    ("#d9b2ff", "Thrash"),
];

/// A MIDI controller bound to a prompt. `channel: None` matches any channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerBinding {
    pub channel: Option<u8>,
    pub control: u8,
}

impl ControllerBinding {
    pub fn any_channel(control: u8) -> Self {
        Self {
            channel: None,
            control,
        }
    }

    pub fn matches(&self, cc: &ControlChange) -> bool {
        self.control == cc.control && self.channel.map_or(true, |ch| ch == cc.channel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPrompt {
    pub id: String,
    pub text: String,
    pub weight: f32,
    pub binding: Option<ControllerBinding>,
    pub color: String,
}

impl WeightedPrompt {
    /// An inactive prompt with no binding.
    pub fn new(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            weight: 0.0,
            binding: None,
            color: String::new(),
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_binding(mut self, binding: ControllerBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_string();
        self
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::InvalidPrompt("prompt id is empty".into()));
        }
        validate_text(&self.text)?;
        validate_weight(self.weight)
    }
}

fn validate_text(text: &str) -> Result<(), CoreError> {
    if text.trim().is_empty() {
        return Err(CoreError::InvalidPrompt("prompt text is empty".into()));
    }
    Ok(())
}

fn validate_weight(weight: f32) -> Result<(), CoreError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(CoreError::InvalidPrompt(format!(
            "weight must be a finite number >= 0, got {}",
            weight
        )));
    }
    Ok(())
}

/// Prompt texts the backend rejected for the current session.
///
/// Only grows; a new session starts with a new, empty set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredTexts {
    texts: HashSet<String>,
}

impl FilteredTexts {
    /// Returns `true` if the text was not already filtered.
    pub fn insert(&mut self, text: &str) -> bool {
        self.texts.insert(text.to_string())
    }

    pub fn contains(&self, text: &str) -> bool {
        self.texts.contains(text)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Sorted copy, for reporting.
    pub fn to_vec(&self) -> Vec<String> {
        let mut texts: Vec<String> = self.texts.iter().cloned().collect();
        texts.sort();
        texts
    }
}

/// Ordered mapping of prompt id to prompt. Ids are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptSet {
    prompts: Vec<WeightedPrompt>,
}

impl PromptSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, rejecting duplicate ids and invalid prompts.
    pub fn from_prompts(prompts: Vec<WeightedPrompt>) -> Result<Self, CoreError> {
        let mut set = Self::new();
        for prompt in prompts {
            set.insert(prompt)?;
        }
        Ok(set)
    }

    /// The sixteen stock prompts, `prompt-<i>` bound to CC `i`, with the first
    /// `active_count` at weight 1.
    pub fn default_bank(active_count: usize) -> Self {
        let prompts = DEFAULT_BANK
            .iter()
            .enumerate()
            .map(|(i, (color, text))| WeightedPrompt {
                id: format!("prompt-{}", i),
                text: (*text).to_string(),
                weight: if i < active_count { 1.0 } else { 0.0 },
                binding: Some(ControllerBinding::any_channel(i as u8)),
                color: (*color).to_string(),
            })
            .collect();
        Self { prompts }
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeightedPrompt> {
        self.prompts.iter()
    }

    pub fn get(&self, id: &str) -> Option<&WeightedPrompt> {
        self.prompts.iter().find(|p| p.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut WeightedPrompt, CoreError> {
        self.prompts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CoreError::InvalidPrompt(format!("unknown prompt id: {}", id)))
    }

    pub fn insert(&mut self, prompt: WeightedPrompt) -> Result<(), CoreError> {
        prompt.validate()?;
        if self.get(&prompt.id).is_some() {
            return Err(CoreError::InvalidPrompt(format!(
                "duplicate prompt id: {}",
                prompt.id
            )));
        }
        self.prompts.push(prompt);
        Ok(())
    }

    /// Append a new inactive prompt under a generated id.
    pub fn add_text(&mut self, text: &str) -> Result<String, CoreError> {
        let id = format!("prompt-{}", uuid::Uuid::new_v4().simple());
        self.insert(WeightedPrompt::new(&id, text))?;
        Ok(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<WeightedPrompt> {
        let index = self.prompts.iter().position(|p| p.id == id)?;
        Some(self.prompts.remove(index))
    }

    pub fn set_weight(&mut self, id: &str, weight: f32) -> Result<(), CoreError> {
        validate_weight(weight)?;
        self.get_mut(id)?.weight = weight;
        Ok(())
    }

    pub fn set_text(&mut self, id: &str, text: &str) -> Result<(), CoreError> {
        validate_text(text)?;
        self.get_mut(id)?.text = text.trim().to_string();
        Ok(())
    }

    pub fn set_binding(&mut self, id: &str, binding: Option<ControllerBinding>) -> Result<(), CoreError> {
        self.get_mut(id)?.binding = binding;
        Ok(())
    }

    /// Map a controller sweep onto every bound prompt's weight
    /// (`value / 127 * 2`). Returns the ids that changed.
    pub fn apply_control_change(&mut self, cc: &ControlChange) -> Vec<String> {
        let weight = cc.value.min(127) as f32 / 127.0 * MAX_CONTROLLER_WEIGHT;
        let mut changed = Vec::new();
        for prompt in self.prompts.iter_mut() {
            if prompt.binding.is_some_and(|b| b.matches(cc)) && prompt.weight != weight {
                prompt.weight = weight;
                changed.push(prompt.id.clone());
            }
        }
        changed
    }

    /// Prompts with nonzero weight whose text is not filtered, in set order.
    pub fn active(&self, filtered: &FilteredTexts) -> Vec<WirePrompt> {
        self.prompts
            .iter()
            .filter(|p| p.weight != 0.0 && !filtered.contains(&p.text))
            .map(|p| WirePrompt {
                text: p.text.clone(),
                weight: p.weight,
            })
            .collect()
    }
}
