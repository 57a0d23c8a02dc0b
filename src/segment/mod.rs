mod command;

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use ndarray::Array3;

use crate::cancel::CancelToken;
use crate::error::{SubjectError, SubjectErrorKind, classify};
use crate::modality::Modality;
use crate::taxonomy::ClassTaxonomy;
use crate::volume::{Geometry, Volume};

pub use command::CommandPredictor;

const SPACING_TOLERANCE_MM: f32 = 1e-3;

/// Integer-labelled volume on the reference CT grid.
#[derive(Debug, Clone)]
pub struct LabelMask {
    pub geometry: Geometry,
    pub data: Array3<u8>,
}

impl LabelMask {
    pub fn present_ids(&self) -> BTreeSet<u8> {
        let mut seen = [false; 256];
        for &v in self.data.iter() {
            seen[v as usize] = true;
        }
        (1..=255u8).filter(|id| seen[*id as usize]).collect()
    }
}

pub struct PredictorInput<'a> {
    pub ct: &'a Volume,
    /// PET already resampled onto the CT grid.
    pub pet: Option<&'a Array3<f32>>,
    pub modality: Modality,
    pub workdir: &'a Path,
    pub cancel: &'a CancelToken,
}

/// What the model returned, before any validation.
#[derive(Debug, Clone)]
pub struct RawPrediction {
    pub geometry: Geometry,
    pub labels: Array3<f32>,
}

/// The segmentation model. Treated as a deterministic function of its inputs.
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;
    fn predict(&self, input: &PredictorInput<'_>) -> Result<RawPrediction>;
}

/// Calls the predictor and validates its output. Any predictor failure that is
/// not already typed becomes `PredictorCrash`.
pub fn segment(
    predictor: &dyn Predictor,
    input: &PredictorInput<'_>,
    taxonomy: &ClassTaxonomy,
) -> Result<LabelMask> {
    let raw = match predictor.predict(input) {
        Ok(raw) => raw,
        Err(err) => {
            if classify(&err) != SubjectErrorKind::Io {
                return Err(err);
            }
            return Err(SubjectError::PredictorCrash(format!("{:#}", err)).into());
        }
    };
    Ok(validate_prediction(
        raw,
        &input.ct.geometry,
        input.modality,
        taxonomy,
    )?)
}

pub fn validate_prediction(
    raw: RawPrediction,
    ct: &Geometry,
    modality: Modality,
    taxonomy: &ClassTaxonomy,
) -> Result<LabelMask, SubjectError> {
    let shape = raw.labels.dim();
    if [shape.0, shape.1, shape.2] != raw.geometry.dims {
        return Err(SubjectError::MalformedOutput(format!(
            "mask array shape {:?} disagrees with its header dims {:?}",
            shape, raw.geometry.dims
        )));
    }
    if !raw.geometry.same_grid(ct, SPACING_TOLERANCE_MM) {
        return Err(SubjectError::MalformedOutput(format!(
            "mask geometry {:?} @ {:?} mm does not match CT {:?} @ {:?} mm",
            raw.geometry.dims, raw.geometry.spacing, ct.dims, ct.spacing
        )));
    }

    let mut bad_value = None;
    let data = raw.labels.mapv(|v| {
        let rounded = v.round();
        if !v.is_finite() || (v - rounded).abs() > 1e-3 || !(0.0..=255.0).contains(&rounded) {
            bad_value.get_or_insert(v);
            0
        } else {
            rounded as u8
        }
    });
    if let Some(v) = bad_value {
        return Err(SubjectError::MalformedOutput(format!(
            "mask contains non-label value {}",
            v
        )));
    }

    let mask = LabelMask {
        geometry: ct.clone(),
        data,
    };
    let unknown: Vec<u8> = mask
        .present_ids()
        .into_iter()
        .filter(|id| !taxonomy.contains(modality, *id))
        .collect();
    if !unknown.is_empty() {
        return Err(SubjectError::MalformedOutput(format!(
            "label ids {:?} are outside the {} taxonomy ({} classes)",
            unknown,
            modality,
            taxonomy.size(modality)
        )));
    }
    Ok(mask)
}
