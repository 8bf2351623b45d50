//! flags.rs — Range and CPA flag templates
//!
//! A flag is a (variable, value) pair published by the host when a condition
//! holds. Values are templates; `$[NAME]` macros are replaced with live
//! encounter values when the flag fires.

use serde::{Deserialize, Serialize};

use crate::relevance::Side;

/// Posted every cycle the range is below `below` (or every cycle when unset)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeFlag {
    #[serde(default)]
    pub below: Option<f64>,
    pub var: String,
    pub value: String,
}

impl RangeFlag {
    pub fn triggers(&self, range: f64) -> bool {
        match self.below {
            Some(t) if t > 0.0 => range < t,
            _ => true,
        }
    }
}

/// Posted once per CPA event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CpaFlag {
    pub var: String,
    pub value: String,
}

/// A flag after macro expansion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostedFlag {
    pub var: String,
    pub value: String,
}

/// Values available to flag templates
#[derive(Debug, Clone, Default)]
pub struct MacroContext<'a> {
    pub range: Option<f64>,
    pub cpa: Option<f64>,
    pub obstacle_id: &'a str,
    pub min_util_cpa: f64,
    pub max_util_cpa: f64,
    /// Bearing from the tow to the obstacle centroid, degrees true
    pub bearing: Option<f64>,
    pub side: Option<Side>,
    pub side_lock: Option<Side>,
}

/// Compact number rendering: two decimals, trailing zeros dropped
pub fn fmt_num(v: f64) -> String {
    let s = format!("{:.2}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-1".to_string(), fmt_num)
}

fn fmt_side(s: Option<Side>) -> String {
    s.map(|s| s.to_string()).unwrap_or_default()
}

impl MacroContext<'_> {
    pub fn expand(&self, template: &str) -> String {
        if !template.contains("$[") {
            return template.to_string();
        }
        template
            .replace("$[RNG]", &fmt_opt(self.range))
            .replace("$[CPA]", &fmt_opt(self.cpa))
            .replace("$[OID]", self.obstacle_id)
            .replace("$[MINU_CPA]", &fmt_num(self.min_util_cpa))
            .replace("$[MAXU_CPA]", &fmt_num(self.max_util_cpa))
            .replace("$[BNG]", &fmt_opt(self.bearing))
            .replace("$[SIDE]", &fmt_side(self.side))
            .replace("$[SLOCK]", &fmt_side(self.side_lock))
    }

    pub fn post(&self, var: &str, value: &str) -> PostedFlag {
        PostedFlag { var: var.to_string(), value: self.expand(value) }
    }
}
