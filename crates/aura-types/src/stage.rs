//! Pipeline stages and the fixed stage-weight table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialization,
    Script,
    Voice,
    Visuals,
    Compose,
    Render,
    Postprocess,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initialization => "initialization",
            Stage::Script => "script",
            Stage::Voice => "voice",
            Stage::Visuals => "visuals",
            Stage::Compose => "compose",
            Stage::Render => "render",
            Stage::Postprocess => "postprocess",
            Stage::Complete => "complete",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `(stage, base_percent, weight_percent)`. `base` is the overall-progress
/// floor entering the stage; `weight` is how much of the remaining 100% the
/// stage's own 0..100 progress is scaled into.
///
/// `Initialization` and `Complete` are bookends with no weight of their own:
/// Initialization's work is folded into Script's base (0), and Complete is
/// simply overall=100.
pub const STAGE_WEIGHTS: &[(Stage, u8, u8)] = &[
    (Stage::Script, 0, 25),
    (Stage::Voice, 25, 30),
    (Stage::Visuals, 55, 25),
    (Stage::Compose, 80, 0),
    (Stage::Render, 80, 15),
    (Stage::Postprocess, 95, 5),
];

/// Look up `(base, weight)` for a stage; `Initialization` floors at 0,
/// `Complete` floors at 100.
pub fn stage_weight(stage: Stage) -> (u8, u8) {
    match stage {
        Stage::Initialization => (0, 0),
        Stage::Complete => (100, 0),
        other => STAGE_WEIGHTS
            .iter()
            .find(|(s, _, _)| *s == other)
            .map(|(_, base, weight)| (*base, *weight))
            .unwrap_or((0, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_stage_has_a_weight_entry() {
        for stage in [
            Stage::Script,
            Stage::Voice,
            Stage::Visuals,
            Stage::Compose,
            Stage::Render,
            Stage::Postprocess,
        ] {
            let (base, _weight) = stage_weight(stage);
            // base must be non-decreasing in pipeline order; spot-check a few.
            assert!(base <= 100);
        }
    }

    #[test]
    fn bases_are_non_decreasing_in_pipeline_order() {
        let order = [
            Stage::Script,
            Stage::Voice,
            Stage::Visuals,
            Stage::Compose,
            Stage::Render,
            Stage::Postprocess,
        ];
        let mut last = 0u8;
        for stage in order {
            let (base, _) = stage_weight(stage);
            assert!(base >= last, "{stage} base regressed");
            last = base;
        }
    }
}
