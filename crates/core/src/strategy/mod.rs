// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Strategy selection
//!
//! Several implementations may claim a deploy, boot or test stage. Each
//! candidate says whether it accepts the device and job parameters and
//! carries a priority; the single best acceptor is used to build the stage.

use crate::action::{Action, ActionId, ActionTree, Parameters, PipelineId};
use crate::device::DeviceConfig;
use crate::error::LavaError;

/// One candidate implementation of a stage
pub trait Strategy {
    fn name(&self) -> &str;

    fn priority(&self) -> u32;

    /// Whether this candidate can handle the stage, with the reason when not
    fn accepts(&self, device: &DeviceConfig, parameters: &Parameters) -> (bool, String);

    /// The top-level action of the stage
    fn build(&self) -> Box<dyn Action>;

    /// Add the stage action to `pipeline`
    fn populate(
        &self,
        tree: &mut ActionTree,
        pipeline: PipelineId,
        parameters: Parameters,
    ) -> Result<ActionId, LavaError> {
        tree.push(pipeline, self.build(), Some(parameters))
    }
}

/// Choose the highest-priority candidate that accepts.
///
/// Equal best priorities are a configuration error. When nothing accepts,
/// the reason given by the highest-priority candidate is reported; earlier
/// registration wins among equal priorities.
pub fn select<'s, S: Strategy>(
    stage: &str,
    candidates: &'s [S],
    device: &DeviceConfig,
    parameters: &Parameters,
) -> Result<&'s S, LavaError> {
    let verdicts: Vec<(&S, bool, String)> = candidates
        .iter()
        .map(|c| {
            let (accepted, reason) = c.accepts(device, parameters);
            (c, accepted, reason)
        })
        .collect();

    let best = verdicts
        .iter()
        .filter(|(_, accepted, _)| *accepted)
        .map(|(c, _, _)| c.priority())
        .max();

    if let Some(best) = best {
        let tied: Vec<&S> = verdicts
            .iter()
            .filter(|(c, accepted, _)| *accepted && c.priority() == best)
            .map(|(c, _, _)| *c)
            .collect();
        if let [chosen] = tied.as_slice() {
            tracing::debug!(stage, strategy = chosen.name(), priority = best, "selected strategy");
            return Ok(chosen);
        }
        let names: Vec<&str> = tied.iter().map(|c| c.name()).collect();
        return Err(LavaError::configuration(format!(
            "Multiple {} strategies accept with priority {}: {}",
            stage,
            best,
            names.join(", ")
        )));
    }

    let mut informative: Option<&(&S, bool, String)> = None;
    for verdict in &verdicts {
        if informative.map_or(true, |(c, _, _)| verdict.0.priority() > c.priority()) {
            informative = Some(verdict);
        }
    }
    match informative {
        Some((c, _, reason)) => {
            tracing::debug!(stage, strategy = c.name(), reason = %reason, "no strategy accepted");
            Err(LavaError::job(format!(
                "No {} method accepted the job: {}",
                stage, reason
            )))
        }
        None => Err(LavaError::job(format!("No {} strategies available", stage))),
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
