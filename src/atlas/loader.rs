use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

use anyhow::Result;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::atlas::{
    ATLAS_SCHEMA_VERSION, AtlasDocument, ClassReference, FeatureStat, ReferenceAtlas,
};
use crate::error::AtlasError;
use crate::io::{open_maybe_gz, write_atomic};
use crate::qc::features::{Feature, N_FEATURES};

pub fn load_atlas(path: &Path) -> Result<ReferenceAtlas, AtlasError> {
    let mut content = String::new();
    open_maybe_gz(path)
        .and_then(|mut r| r.read_to_string(&mut content))
        .map_err(|source| AtlasError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
    parse_atlas(&content, path)
}

pub fn parse_atlas(content: &str, path: &Path) -> Result<ReferenceAtlas, AtlasError> {
    let doc: AtlasDocument =
        serde_json::from_str(content).map_err(|source| AtlasError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    validate_document(&doc).map_err(|reason| AtlasError::Invalid {
        path: path.to_path_buf(),
        reason,
    })
}

pub fn validate_document(doc: &AtlasDocument) -> Result<ReferenceAtlas, String> {
    if doc.schema_version != ATLAS_SCHEMA_VERSION {
        return Err(format!(
            "unsupported schema_version '{}' (expected {})",
            doc.schema_version, ATLAS_SCHEMA_VERSION
        ));
    }

    let mut seen = HashSet::new();
    let mut classes = BTreeMap::new();
    for entry in &doc.classes {
        let id = entry.class_id;
        if !(1..=120).contains(&id) {
            return Err(format!("class_id {} outside 1..=120", id));
        }
        if !seen.insert(id) {
            return Err(format!("duplicate class_id {}", id));
        }
        let d = entry.distance;
        if !d.mean.is_finite() || d.mean < 0.0 {
            return Err(format!("class {}: distance mean must be finite and >= 0", id));
        }
        if !d.std.is_finite() || d.std < 0.0 {
            return Err(format!("class {}: distance std must be finite and >= 0", id));
        }

        let mut features: [Option<FeatureStat>; N_FEATURES] = [None; N_FEATURES];
        for (name, stat) in &entry.features {
            let Some(feature) = Feature::from_name(name) else {
                return Err(format!("class {}: unknown feature '{}'", id, name));
            };
            if !stat.mean.is_finite() {
                return Err(format!("class {}: {} mean is not finite", id, name));
            }
            if !stat.std.is_finite() || stat.std <= 0.0 {
                return Err(format!("class {}: {} std must be finite and > 0", id, name));
            }
            features[feature.index()] = Some(*stat);
        }
        if features.iter().all(Option::is_none) {
            return Err(format!("class {}: no feature statistics", id));
        }
        classes.insert(
            id as u8,
            ClassReference::new(entry.always_expected, d, features),
        );
    }

    Ok(ReferenceAtlas::new(doc.metric, classes))
}

/// Writes `doc` as pretty JSON, gzip-compressed when `path` ends in `.gz`.
pub fn write_atlas(path: &Path, doc: &AtlasDocument) -> Result<()> {
    let gz = path.extension().and_then(|s| s.to_str()) == Some("gz");
    write_atomic(path, |w| {
        if gz {
            let mut encoder = GzEncoder::new(&mut *w, Compression::default());
            serde_json::to_writer_pretty(&mut encoder, doc)?;
            encoder.finish()?;
        } else {
            serde_json::to_writer_pretty(&mut *w, doc)?;
        }
        Ok(())
    })
}
