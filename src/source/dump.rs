//! Requirement source backed by a PostgreSQL plain-text backup.
//!
//! Reads the `standards_library` and `requirements_library` COPY blocks.
//! Standards that differ only by an implementation-group suffix (`IG1`,
//! `IG2`, ...) are folded into one tiered framework where each control keeps
//! the lowest group it appears in.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::InMemorySource;
use crate::error::{Result, UnifyError};
use crate::model::{Framework, RawRequirement};

const NULL: &str = "\\N";

static TIER_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bIG\s*([1-9])\b").expect("tier suffix regex"));
static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("slug regex"));

#[derive(Debug, Clone)]
struct StandardRow {
    id: String,
    display: String,
}

/// Where one source standard lands after tier folding.
#[derive(Debug, Clone)]
struct StandardTarget {
    framework_id: String,
    tier: Option<u8>,
}

pub fn load_dump(path: &Path) -> Result<InMemorySource> {
    let content = std::fs::read_to_string(path)?;
    let source = parse_dump(&content)?;
    info!(
        path = %path.display(),
        frameworks = source.frameworks.len(),
        requirements = source.len(),
        "loaded requirement dump"
    );
    Ok(source)
}

pub fn parse_dump(content: &str) -> Result<InMemorySource> {
    let standards_block =
        copy_block(content, "standards_library").ok_or_else(|| UnifyError::Source {
            message: "dump has no standards_library section".to_string(),
        })?;
    let requirements_block =
        copy_block(content, "requirements_library").ok_or_else(|| UnifyError::Source {
            message: "dump has no requirements_library section".to_string(),
        })?;

    let standards = parse_standards(standards_block)?;
    let (frameworks, targets) = fold_tiers(&standards);
    let requirements = parse_requirements(requirements_block, &targets)?;
    Ok(InMemorySource::new(frameworks, requirements))
}

/// Data lines between `COPY public.<table> ... FROM stdin;` and the `\.`
/// terminator.
fn copy_block<'a>(content: &'a str, table: &str) -> Option<&'a str> {
    let start = content.find(&format!("COPY public.{}", table))?;
    let marker = "FROM stdin;";
    let data_start = start + content[start..].find(marker)? + marker.len();
    let data = content[data_start..].trim_start_matches(['\r', '\n']);
    let end = data.find("\n\\.").map(|i| i + 1).or_else(|| {
        if data.starts_with("\\.") {
            Some(0)
        } else {
            None
        }
    })?;
    Some(&data[..end])
}

fn reader(block: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(block.as_bytes())
}

fn field(record: &csv::StringRecord, idx: usize) -> Option<String> {
    record
        .get(idx)
        .filter(|v| *v != NULL)
        .map(unescape_copy_field)
}

/// Undo COPY text-format escaping.
fn unescape_copy_field(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_standards(block: &str) -> Result<Vec<StandardRow>> {
    let mut rows = Vec::new();
    for record in reader(block).records() {
        let record = record?;
        let (Some(id), Some(name)) = (field(&record, 0), field(&record, 1)) else {
            continue;
        };
        let version = field(&record, 2).unwrap_or_default();
        let display = format!("{} {}", name, version).trim().to_string();
        rows.push(StandardRow { id, display });
    }
    Ok(rows)
}

fn slugify(name: &str) -> String {
    NON_SLUG
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

fn fold_tiers(standards: &[StandardRow]) -> (Vec<Framework>, HashMap<String, StandardTarget>) {
    // base display name -> (highest tier seen, first appearance index)
    let mut tiered: BTreeMap<String, (u8, usize)> = BTreeMap::new();
    let mut order: Vec<(usize, Framework)> = Vec::new();
    let mut targets = HashMap::new();

    for (idx, std_row) in standards.iter().enumerate() {
        if let Some(caps) = TIER_SUFFIX.captures(&std_row.display) {
            let tier: u8 = caps[1].parse().unwrap_or(1);
            let base = TIER_SUFFIX
                .replace(&std_row.display, "")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let entry = tiered.entry(base.clone()).or_insert((tier, idx));
            entry.0 = entry.0.max(tier);
            targets.insert(
                std_row.id.clone(),
                StandardTarget {
                    framework_id: slugify(&base),
                    tier: Some(tier),
                },
            );
        } else {
            let framework = Framework::new(slugify(&std_row.display), std_row.display.clone());
            targets.insert(
                std_row.id.clone(),
                StandardTarget {
                    framework_id: framework.id.to_string(),
                    tier: None,
                },
            );
            order.push((idx, framework));
        }
    }

    for (base, (max_tier, idx)) in tiered {
        let labels: Vec<String> = (1..=max_tier).map(|t| format!("IG{}", t)).collect();
        let mut framework = Framework::new(slugify(&base), base.clone());
        framework.tiers = labels;
        debug!(framework = %framework.id, tiers = max_tier, "folded tiered standard");
        order.push((idx, framework));
    }
    order.sort_by_key(|(idx, _)| *idx);
    (order.into_iter().map(|(_, f)| f).collect(), targets)
}

fn parse_tags(raw: Option<String>) -> Vec<String> {
    raw.map(|t| {
        t.trim_matches(|c| c == '{' || c == '}')
            .split(',')
            .map(|s| s.trim().trim_matches('"').to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_requirements(
    block: &str,
    targets: &HashMap<String, StandardTarget>,
) -> Result<Vec<RawRequirement>> {
    let mut out: Vec<RawRequirement> = Vec::new();
    let mut position: HashMap<(String, String), usize> = HashMap::new();
    let mut unknown_standards: HashSet<String> = HashSet::new();
    let mut inactive = 0usize;

    for record in reader(block).records() {
        let record = record?;
        if record.len() < 5 {
            continue;
        }
        let Some(standard_id) = field(&record, 1) else {
            continue;
        };
        let Some(target) = targets.get(&standard_id) else {
            unknown_standards.insert(standard_id);
            continue;
        };
        if field(&record, 11).is_some_and(|v| v == "f" || v == "false") {
            inactive += 1;
            continue;
        }

        let code = field(&record, 2).unwrap_or_default();
        let mut req = RawRequirement::new(
            target.framework_id.clone(),
            code.clone(),
            field(&record, 3).unwrap_or_default(),
            field(&record, 4).unwrap_or_default(),
        );
        req.tier = target.tier;
        req.category_hint = field(&record, 5).filter(|c| !c.trim().is_empty());
        req.tags = parse_tags(field(&record, 12));
        req.section = field(&record, 16).filter(|s| !s.trim().is_empty());

        let key = (target.framework_id.clone(), code);
        match position.get(&key) {
            // The same control listed under several groups keeps its lowest tier.
            Some(&existing) if target.tier.is_some() => {
                if let (Some(new_tier), Some(old_tier)) = (req.tier, out[existing].tier)
                    && new_tier < old_tier
                {
                    out[existing].tier = Some(new_tier);
                }
            }
            _ => {
                position.insert(key, out.len());
                out.push(req);
            }
        }
    }

    for standard in &unknown_standards {
        warn!(standard_id = %standard, "requirements reference an unknown standard; skipped");
    }
    if inactive > 0 {
        debug!(inactive, "skipped inactive requirements");
    }
    Ok(out)
}
