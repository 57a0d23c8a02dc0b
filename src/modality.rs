use serde::{Deserialize, Serialize};

use crate::error::SubjectError;
use crate::volume::{ModalityTag, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    CtOnly,
    PetCt,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CtOnly => "CT_ONLY",
            Self::PetCt => "PET_CT",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference volumes picked for segmentation, as indices into the loaded set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalityDecision {
    pub modality: Modality,
    pub ct: usize,
    pub pet: Option<usize>,
}

pub fn classify_tags(tags: &[ModalityTag]) -> Result<Modality, SubjectError> {
    let ct = tags.iter().filter(|t| **t == ModalityTag::Ct).count();
    let pet = tags.iter().filter(|t| **t == ModalityTag::Pet).count();
    match (ct, pet) {
        (0, 0) => Err(SubjectError::UnsupportedModality(
            "no CT or PET series found".to_string(),
        )),
        (0, _) => Err(SubjectError::UnsupportedModality(format!(
            "{} PET series without CT; PET-only studies are not supported",
            pet
        ))),
        (_, 0) => Ok(Modality::CtOnly),
        _ => Ok(Modality::PetCt),
    }
}

/// Volumes must already be in series-name order; the first CT (and PET) wins.
pub fn resolve(volumes: &[Volume]) -> Result<(ModalityDecision, Vec<String>), SubjectError> {
    let tags: Vec<ModalityTag> = volumes.iter().map(|v| v.tag).collect();
    let modality = classify_tags(&tags)?;

    let mut warnings = Vec::new();
    let ct_ids: Vec<usize> = positions(&tags, ModalityTag::Ct);
    let pet_ids: Vec<usize> = positions(&tags, ModalityTag::Pet);
    let ct = ct_ids[0];
    for &extra in &ct_ids[1..] {
        warnings.push(format!(
            "additional CT series '{}' ignored; reference CT is '{}'",
            volumes[extra].series, volumes[ct].series
        ));
    }
    let pet = pet_ids.first().copied();
    if let Some(pet) = pet {
        for &extra in &pet_ids[1..] {
            warnings.push(format!(
                "additional PET series '{}' ignored; reference PET is '{}'",
                volumes[extra].series, volumes[pet].series
            ));
        }
    }

    Ok((ModalityDecision { modality, ct, pet }, warnings))
}

fn positions(tags: &[ModalityTag], want: ModalityTag) -> Vec<usize> {
    tags.iter()
        .enumerate()
        .filter(|(_, t)| **t == want)
        .map(|(i, _)| i)
        .collect()
}
