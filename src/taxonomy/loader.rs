use std::collections::HashSet;

use anyhow::{Result, bail};

use crate::taxonomy::{LabelDef, RegionGroup};

pub fn load_builtin_v1() -> Result<Vec<LabelDef>> {
    let content = include_str!("../../assets/taxonomy/labels_v1.tsv");
    parse_label_tsv(content, "built-in v1")
}

pub fn parse_label_tsv(content: &str, source: &str) -> Result<Vec<LabelDef>> {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut out = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = trimmed.split('\t').collect();
        if parts.len() != 3 {
            bail!("{}:{} malformed TSV (expected 3 columns)", source, line_no);
        }
        let id: u8 = match parts[0].trim().parse() {
            Ok(0) | Err(_) => bail!("{}:{} label id must be in 1..=255", source, line_no),
            Ok(id) => id,
        };
        let name = parts[1].trim();
        if name.is_empty() {
            bail!("{}:{} empty region name", source, line_no);
        }
        let group = match parts[2].trim() {
            "body" => RegionGroup::Body,
            "cerebral" => RegionGroup::Cerebral,
            other => bail!("{}:{} unknown region group '{}'", source, line_no, other),
        };
        if !seen_ids.insert(id) {
            bail!("{}:{} duplicate label id {}", source, line_no, id);
        }
        if !seen_names.insert(name.to_string()) {
            bail!("{}:{} duplicate region name '{}'", source, line_no, name);
        }
        out.push(LabelDef {
            id,
            name: name.to_string(),
            group,
        });
    }

    Ok(out)
}
