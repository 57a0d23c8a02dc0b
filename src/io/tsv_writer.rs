use std::io::Write;
use std::path::Path;

use anyhow::Result;

use crate::io::write_atomic;
use crate::qc::{OrganSimilarityScore, QcResult};
use crate::taxonomy::ClassTaxonomy;

const RISK_HEADER: &str =
    "class_id\tregion\tstatus\tvoxels\tdistance\tthreshold\tat_risk\tdominant_feature\tdominant_z";

/// Per-organ scores of one subject, in class id order.
pub fn write_risk_tsv(path: &Path, qc: &QcResult) -> Result<()> {
    write_atomic(path, |w| {
        writeln!(w, "{}", RISK_HEADER)?;
        for score in &qc.scores {
            writeln!(w, "{}", risk_row(score))?;
        }
        Ok(())
    })
}

/// Label id to region name for every class of the taxonomy.
pub fn write_label_table(path: &Path, taxonomy: &ClassTaxonomy) -> Result<()> {
    write_atomic(path, |w| {
        writeln!(w, "label_id\tregion\tgroup")?;
        for label in taxonomy.labels() {
            writeln!(w, "{}\t{}\t{}", label.id, label.name, label.group.as_str())?;
        }
        Ok(())
    })
}

/// At-risk organs across the batch, one row per (subject, organ).
pub fn write_batch_qc_report<'a, I>(path: &Path, rows: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a OrganSimilarityScore)>,
{
    write_atomic(path, |w| {
        writeln!(w, "subject\t{}", RISK_HEADER)?;
        for (subject, score) in rows {
            writeln!(w, "{}\t{}", subject, risk_row(score))?;
        }
        Ok(())
    })
}

fn risk_row(score: &OrganSimilarityScore) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        score.class_id,
        score.region,
        score.status.as_str(),
        score.voxels,
        opt_f64(score.distance),
        opt_f64(score.threshold),
        score.at_risk,
        score.dominant_feature.map(|f| f.name()).unwrap_or("NA"),
        opt_f64(score.dominant_z),
    )
}

fn opt_f64(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.6}", v),
        None => "NA".to_string(),
    }
}
