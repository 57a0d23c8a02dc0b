use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::io::{commit_atomic, partial_path};
use crate::pipeline::Stage;
use crate::segment::{PredictorInput, segment};
use crate::subject::SubjectStatus;
use crate::volume::nifti_io;
use crate::volume::resample::resample_nearest;

const PET_FILL: f32 = 0.0;

pub struct Stage3Segment;

impl Stage3Segment {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage3Segment {
    fn name(&self) -> &'static str {
        "stage3_segment"
    }

    fn run(&self, ctx: &mut Ctx<'_>) -> Result<()> {
        let decision = ctx.decision()?;
        let ct = ctx.reference_ct()?;
        let pet_on_ct = match ctx.reference_pet()? {
            Some(pet) => Some(resample_nearest(pet, &ct.geometry, PET_FILL)?),
            None => None,
        };

        let input = PredictorInput {
            ct,
            pet: pet_on_ct.as_ref(),
            modality: decision.modality,
            workdir: &ctx.output.temp_dir,
            cancel: ctx.env.cancel,
        };
        let mask = segment(ctx.env.predictor, &input, ctx.env.taxonomy)?;

        let tmp = partial_path(&ctx.output.mask_path);
        nifti_io::write_labels(&tmp, &mask.geometry, &mask.data)?;
        commit_atomic(&tmp, &ctx.output.mask_path)?;
        info!(
            subject = %ctx.subject.id,
            predictor = ctx.env.predictor.name(),
            labels = mask.present_ids().len(),
            path = %ctx.output.mask_path.display(),
            "label_mask_written"
        );

        ctx.pet_on_ct = pet_on_ct;
        ctx.mask = Some(mask);
        ctx.subject.advance(SubjectStatus::Segmented)?;
        Ok(())
    }
}
