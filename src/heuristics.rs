use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::Deserialize;

/// Tunable matching heuristics, loadable from a small TOML file.
/// Everything has a default; a missing file means `HeuristicRules::default()`.
#[derive(Debug, Clone, Deserialize)]
pub struct HeuristicRules {
    pub version: u32,
    #[serde(default)]
    pub captions: CaptionLabels,
    #[serde(default)]
    pub locator: LocatorTuning,
}

/// Label words that open a caption or an in-text reference. A trailing
/// dot in a label is treated as optional when matching.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptionLabels {
    #[serde(default = "default_figure_labels")]
    pub figure_labels: Vec<String>,
    #[serde(default = "default_table_labels")]
    pub table_labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocatorTuning {
    /// How many following non-empty paragraphs may confirm that a bold
    /// line is an inline subtitle rather than more body emphasis.
    #[serde(default = "default_subtitle_lookahead")]
    pub subtitle_lookahead: usize,
}

fn default_figure_labels() -> Vec<String> {
    ["Figure", "Fig.", "圖", "图"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_table_labels() -> Vec<String> {
    ["Table", "Tab.", "表"].iter().map(|s| s.to_string()).collect()
}

fn default_subtitle_lookahead() -> usize {
    2
}

impl Default for CaptionLabels {
    fn default() -> Self {
        CaptionLabels {
            figure_labels: default_figure_labels(),
            table_labels: default_table_labels(),
        }
    }
}

impl Default for LocatorTuning {
    fn default() -> Self {
        LocatorTuning {
            subtitle_lookahead: default_subtitle_lookahead(),
        }
    }
}

impl Default for HeuristicRules {
    fn default() -> Self {
        HeuristicRules {
            version: 1,
            captions: CaptionLabels::default(),
            locator: LocatorTuning::default(),
        }
    }
}

impl HeuristicRules {
    pub fn from_toml_path(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("read heuristics file: {}", path.display()))?;
        let text = String::from_utf8(bytes).context("heuristics file is not utf-8")?;
        let rules: HeuristicRules = toml::from_str(&text)
            .with_context(|| format!("parse heuristics file: {}", path.display()))?;
        if rules.version != 1 {
            return Err(anyhow!(
                "unsupported heuristics version: {} (expected 1)",
                rules.version
            ));
        }
        Ok(rules)
    }
}
