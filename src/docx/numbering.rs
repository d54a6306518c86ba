//! Numbering definitions and counter replay. The visible label of a
//! numbered paragraph is reconstructed by walking paragraphs in document
//! order and advancing per-instance counters, then expanding the level's
//! label template.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::docx::xml::XmlNode;

static LEVEL_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"%([1-9])").expect("level token"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumFmt {
    Decimal,
    UpperRoman,
    LowerRoman,
    UpperLetter,
    LowerLetter,
    Bullet,
}

/// Unknown formats render as decimal; `decimalZero` is folded into
/// decimal as well.
pub fn parse_num_fmt(s: &str) -> NumFmt {
    match s {
        "upperRoman" => NumFmt::UpperRoman,
        "lowerRoman" => NumFmt::LowerRoman,
        "upperLetter" => NumFmt::UpperLetter,
        "lowerLetter" => NumFmt::LowerLetter,
        "bullet" => NumFmt::Bullet,
        _ => NumFmt::Decimal,
    }
}

pub fn format_counter(value: i64, fmt: NumFmt) -> String {
    match fmt {
        NumFmt::Decimal => value.to_string(),
        NumFmt::UpperRoman => to_roman(value),
        NumFmt::LowerRoman => to_roman(value).to_lowercase(),
        NumFmt::UpperLetter => to_alpha(value),
        NumFmt::LowerLetter => to_alpha(value).to_lowercase(),
        NumFmt::Bullet => "•".to_string(),
    }
}

fn to_roman(value: i64) -> String {
    if value <= 0 {
        return value.to_string();
    }
    const PAIRS: [(i64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut n = value;
    let mut out = String::new();
    for (v, sym) in PAIRS {
        while n >= v {
            out.push_str(sym);
            n -= v;
        }
    }
    out
}

fn to_alpha(value: i64) -> String {
    if value <= 0 {
        return value.to_string();
    }
    let mut n = value;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[derive(Clone, Debug)]
pub struct LevelDef {
    pub num_fmt: NumFmt,
    pub lvl_text: String,
    pub start: i64,
}

impl Default for LevelDef {
    fn default() -> Self {
        LevelDef {
            num_fmt: NumFmt::Decimal,
            lvl_text: String::new(),
            start: 1,
        }
    }
}

/// Parsed numbering-definitions part: instance map, per-level start
/// overrides and abstract level definitions.
#[derive(Debug, Default)]
pub struct NumberingTable {
    num_to_abstract: HashMap<i32, i32>,
    start_overrides: HashMap<(i32, i32), i64>,
    levels: HashMap<(i32, i32), LevelDef>,
}

impl NumberingTable {
    pub fn empty() -> Self {
        NumberingTable::default()
    }

    pub fn from_part(numbering_root: &XmlNode) -> Self {
        let mut table = NumberingTable::default();
        for num in numbering_root.children_named("w:num") {
            let num_id: i32 = match num.attr("w:numId").and_then(|v| v.parse().ok()) {
                Some(id) => id,
                None => continue,
            };
            if let Some(abs_id) = num
                .child("w:abstractNumId")
                .and_then(|a| a.attr("w:val"))
                .and_then(|v| v.parse().ok())
            {
                table.num_to_abstract.insert(num_id, abs_id);
            }
            for ovr in num.children_named("w:lvlOverride") {
                let ilvl: i32 = match ovr.attr("w:ilvl").and_then(|v| v.parse().ok()) {
                    Some(l) => l,
                    None => continue,
                };
                if let Some(start) = ovr
                    .child("w:startOverride")
                    .and_then(|s| s.attr("w:val"))
                    .and_then(|v| v.parse().ok())
                {
                    table.start_overrides.insert((num_id, ilvl), start);
                }
            }
        }
        for abs in numbering_root.children_named("w:abstractNum") {
            let abs_id: i32 = match abs.attr("w:abstractNumId").and_then(|v| v.parse().ok()) {
                Some(id) => id,
                None => continue,
            };
            for lvl in abs.children_named("w:lvl") {
                let ilvl: i32 = match lvl.attr("w:ilvl").and_then(|v| v.parse().ok()) {
                    Some(l) => l,
                    None => continue,
                };
                let mut def = LevelDef::default();
                if let Some(fmt) = lvl.child("w:numFmt").and_then(|f| f.attr("w:val")) {
                    def.num_fmt = parse_num_fmt(fmt);
                }
                if let Some(text) = lvl.child("w:lvlText").and_then(|t| t.attr("w:val")) {
                    def.lvl_text = text.to_string();
                }
                if let Some(start) = lvl
                    .child("w:start")
                    .and_then(|s| s.attr("w:val"))
                    .and_then(|v| v.parse().ok())
                {
                    def.start = start;
                }
                table.levels.insert((abs_id, ilvl), def);
            }
        }
        table
    }

    pub fn abstract_for(&self, num_id: i32) -> Option<i32> {
        self.num_to_abstract.get(&num_id).copied()
    }

    fn start_for(&self, num_id: i32, abstract_id: i32, ilvl: i32) -> i64 {
        if let Some(v) = self.start_overrides.get(&(num_id, ilvl)) {
            return *v;
        }
        self.levels
            .get(&(abstract_id, ilvl))
            .map(|d| d.start)
            .unwrap_or(1)
    }

    fn fmt_for(&self, abstract_id: i32, ilvl: i32) -> NumFmt {
        self.levels
            .get(&(abstract_id, ilvl))
            .map(|d| d.num_fmt)
            .unwrap_or(NumFmt::Decimal)
    }

    /// Expand the leaf level's label template against the counter state.
    /// Each `%k` token renders level k-1's counter in that level's own
    /// numeral format.
    pub fn compute_label(&self, abstract_id: i32, ilvl: i32, state: &CounterState) -> String {
        let leaf = self
            .levels
            .get(&(abstract_id, ilvl))
            .cloned()
            .unwrap_or_default();
        if leaf.num_fmt == NumFmt::Bullet {
            return "•".to_string();
        }
        if leaf.lvl_text.is_empty() {
            return format_counter(state.value(ilvl), leaf.num_fmt);
        }
        LEVEL_TOKEN_RE
            .replace_all(&leaf.lvl_text, |caps: &regex::Captures<'_>| {
                let k: i32 = caps[1].parse().unwrap_or(1);
                format_counter(state.value(k - 1), self.fmt_for(abstract_id, k - 1))
            })
            .into_owned()
    }
}

/// Live counters of one numbering instance during document-order replay.
#[derive(Debug, Default)]
pub struct CounterState {
    values: HashMap<i32, i64>,
    started: HashSet<i32>,
}

impl CounterState {
    /// Current counter of a level; levels that never ran display as 1.
    pub fn value(&self, lvl: i32) -> i64 {
        self.values.get(&lvl).copied().unwrap_or(1)
    }

    /// Count one paragraph at `ilvl`: seed every unstarted level up to
    /// it (the leaf seeds one below its start so the increment lands on
    /// the start), bump the leaf, reset deeper levels.
    pub fn advance(&mut self, table: &NumberingTable, num_id: i32, abstract_id: i32, ilvl: i32) {
        for l in 0..=ilvl {
            if self.started.contains(&l) {
                continue;
            }
            let mut seed = table.start_for(num_id, abstract_id, l);
            if l == ilvl {
                seed -= 1;
            }
            self.values.insert(l, seed);
            self.started.insert(l);
        }
        *self.values.entry(ilvl).or_insert(0) += 1;
        let deeper: Vec<i32> = self.values.keys().copied().filter(|l| *l > ilvl).collect();
        for l in deeper {
            self.values.insert(l, 0);
            self.started.remove(&l);
        }
    }
}
