// src/placement/jplace.rs

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use super::{Placement, Pquery, PqueryName, Sample, SampleOptions};
use crate::tree::{Tree, parse_newick};

const DEFAULT_FIELDS: [&str; 5] = [
    "edge_num",
    "likelihood",
    "like_weight_ratio",
    "distal_length",
    "pendant_length",
];

#[derive(Deserialize)]
struct RawJplace {
    tree: String,
    #[serde(default)]
    fields: Option<Vec<String>>,
    placements: Vec<RawPquery>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNames {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct RawPquery {
    p: Vec<Vec<Value>>,
    #[serde(default)]
    n: Option<RawNames>,
    #[serde(default)]
    nm: Option<Vec<(String, f64)>>,
}

struct FieldIdx {
    edge_num: usize,
    lwr: Option<usize>,
    distal: Option<usize>,
    proximal: Option<usize>,
}

impl FieldIdx {
    fn new(fields: &[String]) -> Result<Self> {
        let find = |name: &str| fields.iter().position(|f| f == name);
        Ok(FieldIdx {
            edge_num: find("edge_num").context("fields lack \"edge_num\"")?,
            lwr: find("like_weight_ratio"),
            distal: find("distal_length"),
            proximal: find("proximal_length"),
        })
    }
}

fn number(row: &[Value], idx: usize, what: &str) -> Result<f64> {
    row.get(idx)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("placement field {what} missing or not a number"))
}

fn parse_placement(row: &[Value], idx: &FieldIdx, tree: &Tree) -> Result<Placement> {
    let raw_num = number(row, idx.edge_num, "edge_num")?;
    let edge_num = raw_num as i64;
    if edge_num as f64 != raw_num {
        bail!("edge_num {raw_num} is not an integer");
    }
    let edge = tree
        .edge_index_of(edge_num)
        .ok_or_else(|| anyhow!("edge_num {edge_num} does not exist in the reference tree"))?;
    let branch_length = tree.edge(edge).branch_length;

    let like_weight_ratio = match idx.lwr {
        Some(i) => number(row, i, "like_weight_ratio")?,
        None => 1.0,
    };
    // proximal_length is measured from the root side; jplace usually gives the distal one
    let proximal_length = match (idx.proximal, idx.distal) {
        (Some(i), _) => number(row, i, "proximal_length")?,
        (None, Some(i)) => branch_length - number(row, i, "distal_length")?,
        (None, None) => 0.0,
    }
    .clamp(0.0, branch_length.max(0.0));
    Ok(Placement {
        edge,
        like_weight_ratio,
        proximal_length,
    })
}

/// Parses jplace JSON text.
pub fn parse_jplace(text: &str) -> Result<Sample> {
    let raw: RawJplace = serde_json::from_str(text).context("parse jplace json")?;
    let tree = parse_newick(&raw.tree).context("parse jplace tree")?;
    let fields = raw
        .fields
        .unwrap_or_else(|| DEFAULT_FIELDS.iter().map(|s| s.to_string()).collect());
    let idx = FieldIdx::new(&fields)?;

    let mut pqueries = Vec::with_capacity(raw.placements.len());
    for (qi, rq) in raw.placements.into_iter().enumerate() {
        let placements = rq
            .p
            .iter()
            .map(|row| parse_placement(row, &idx, &tree))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("pquery {qi}"))?;

        let mut names: Vec<PqueryName> = match rq.n {
            Some(RawNames::One(name)) => vec![name],
            Some(RawNames::Many(list)) => list,
            None => Vec::new(),
        }
        .into_iter()
        .map(|name| PqueryName {
            name,
            multiplicity: 1.0,
        })
        .collect();
        names.extend(
            rq.nm
                .unwrap_or_default()
                .into_iter()
                .map(|(name, multiplicity)| PqueryName { name, multiplicity }),
        );

        pqueries.push(Pquery { placements, names });
    }

    Ok(Sample { tree, pqueries })
}

/// Reads one jplace file as-is.
pub fn read_jplace(path: &Path) -> Result<Sample> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("open {}", path.display()))?;
    parse_jplace(&text).with_context(|| format!("read {}", path.display()))
}

/// Reads one jplace file and applies the per-sample options.
pub fn read_sample(path: &Path, options: &SampleOptions) -> Result<Sample> {
    let mut sample = read_jplace(path)?;
    options.apply(&mut sample);
    Ok(sample)
}
