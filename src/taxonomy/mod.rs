mod loader;

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::modality::Modality;

pub use loader::{load_builtin_v1, parse_label_tsv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionGroup {
    Body,
    Cerebral,
}

impl RegionGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Cerebral => "cerebral",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelDef {
    pub id: u8,
    pub name: String,
    pub group: RegionGroup,
}

/// Fixed class table shared by every subject of a run. CT-only runs use the
/// `body` group with the same ids and names.
#[derive(Debug, Clone)]
pub struct ClassTaxonomy {
    pub version: String,
    labels: BTreeMap<u8, LabelDef>,
}

impl ClassTaxonomy {
    pub fn new(version: &str, defs: Vec<LabelDef>) -> Self {
        let labels = defs.into_iter().map(|d| (d.id, d)).collect();
        Self {
            version: version.to_string(),
            labels,
        }
    }

    pub fn builtin() -> Result<Self> {
        Ok(Self::new("v1", load_builtin_v1()?))
    }

    pub fn get(&self, id: u8) -> Option<&LabelDef> {
        self.labels.get(&id)
    }

    pub fn name(&self, id: u8) -> Option<&str> {
        self.labels.get(&id).map(|d| d.name.as_str())
    }

    pub fn contains(&self, modality: Modality, id: u8) -> bool {
        match self.labels.get(&id) {
            Some(def) => modality_admits(modality, def.group),
            None => false,
        }
    }

    /// Ascending label ids available under `modality`.
    pub fn ids(&self, modality: Modality) -> Vec<u8> {
        self.labels
            .values()
            .filter(|d| modality_admits(modality, d.group))
            .map(|d| d.id)
            .collect()
    }

    pub fn size(&self, modality: Modality) -> usize {
        self.labels
            .values()
            .filter(|d| modality_admits(modality, d.group))
            .count()
    }

    pub fn labels(&self) -> impl Iterator<Item = &LabelDef> {
        self.labels.values()
    }
}

fn modality_admits(modality: Modality, group: RegionGroup) -> bool {
    match modality {
        Modality::PetCt => true,
        Modality::CtOnly => group == RegionGroup::Body,
    }
}
