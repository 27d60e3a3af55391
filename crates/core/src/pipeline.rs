// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline walker
//!
//! Validates, runs and cleans up the actions of a pipeline in program
//! order, recursing into child pipelines. Each action runs under the
//! tighter of its own deadline and the enclosing one.

use crate::action::{ActionMeta, ActionTree, PipelineId, RunContext, ValidateContext};
use crate::connection::Connection;
use crate::error::LavaError;
use crate::job::JobEnv;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Validate every action below `pipeline`.
///
/// Prior errors are cleared first so validation can be repeated. Errors are
/// collected rather than raised; the root pipeline raises a Job error when
/// any were found. A behavior failing with anything but a Job error stops
/// validation at once.
pub fn validate_actions(
    tree: &mut ActionTree,
    env: &JobEnv,
    pipeline: PipelineId,
) -> Result<(), LavaError> {
    for id in tree.actions(pipeline).to_vec() {
        let meta = tree.meta_mut(id);
        meta.errors.clear();
        base_validate(meta);

        let mut behavior = tree.take_behavior(id)?;
        let result = {
            let mut cx = ValidateContext::new(tree, env, id);
            behavior.validate(&mut cx)
        };
        tree.restore_behavior(id, behavior);
        match result {
            Ok(()) => {}
            Err(LavaError::Job(msg)) => {
                let meta = tree.meta_mut(id);
                let error = format!("{} {}: {}", meta.level(), meta.name, msg);
                meta.errors.push(error);
            }
            Err(e) => return Err(e),
        }

        if let Some(child) = tree.child(id) {
            validate_actions(tree, env, child)?;
        }
    }

    if tree.parent(pipeline).is_none() {
        let errors = tree.errors(pipeline);
        if !errors.is_empty() {
            return Err(LavaError::job(format!("Invalid job data: {:?}", errors)));
        }
    }
    Ok(())
}

fn base_validate(meta: &mut ActionMeta) {
    let name = meta.name.clone();
    if name.is_empty() {
        meta.errors.push("action has no name set".to_string());
    }
    if name.contains(char::is_whitespace) {
        meta.errors.push(format!(
            "Whitespace must not be used in action names, only descriptions or summaries: {}",
            name
        ));
    }
    if name.contains('_') {
        meta.errors
            .push(format!("Use - instead of _ in action names: {}", name));
    }
    if meta.summary.is_empty() {
        meta.errors.push(format!("action {} lacks a summary", name));
    }
    if meta.description.is_empty() {
        meta.errors
            .push(format!("action {} lacks a description", name));
    }
    if meta.section.is_none() {
        meta.errors.push(format!("action {} has no section set", name));
    }
}

/// Run the actions of `pipeline` in order.
///
/// The connection returned by one action is handed to the next; an action
/// returning `None` leaves the current connection in place. The first error
/// stops the pipeline.
pub fn run_actions<'a>(
    tree: &'a mut ActionTree,
    env: &'a mut JobEnv,
    pipeline: PipelineId,
    connection: &'a mut Option<Box<dyn Connection>>,
    max_end_time: Option<Instant>,
) -> BoxFuture<'a, Result<(), LavaError>> {
    Box::pin(async move {
        let root = tree.parent(pipeline).is_none();
        for id in tree.actions(pipeline).to_vec() {
            let meta = tree.meta(id);
            let name = meta.name.clone();
            let level = meta.level().to_string();
            let namespace = meta.namespace().to_string();
            let timeout = meta.timeout.clone();
            let skip_timeout = meta
                .parameters
                .get("timeout")
                .and_then(|t| t.get("skip"))
                .and_then(Value::as_bool)
                .unwrap_or(false);

            let start = Instant::now();
            let end = timeout.max_end_time(start, max_end_time);
            let budget = end
                .map(|end| format_secs(end.saturating_duration_since(start)))
                .unwrap_or_else(|| "unbounded".to_string());
            let message = format!("start: {} {} (timeout {}) [{}]", level, name, budget, namespace);
            if root {
                tracing::info!("{}", message);
            } else {
                tracing::debug!("{}", message);
            }

            let mut loan = tree.lend_behavior(id)?;
            let span = tracing::info_span!("action", level = %level, name = %name);
            let outcome = {
                let behavior = loan.behavior()?;
                let mut cx = RunContext::new(tree, env, id, end);
                let work = behavior.run(&mut cx, connection).instrument(span);
                match end {
                    Some(end) => tokio::time::timeout_at(end, work)
                        .await
                        .unwrap_or_else(|_| Err(timeout.expired(start.elapsed()))),
                    None => work.await,
                }
            };
            tree.restore_loan(loan);

            let elapsed = start.elapsed();
            let failed = outcome.is_err();
            let result = match outcome {
                Ok(replacement) => {
                    if let Some(replacement) = replacement {
                        *connection = Some(replacement);
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(level = %level, name = %name, error = %e, "{}", e);
                    tree.meta_mut(id)
                        .results
                        .insert("fail".to_string(), json!(e.to_string()));
                    Err(e)
                }
            };

            let meta = tree.meta_mut(id);
            meta.timeout.set_elapsed(elapsed);
            let message = format!(
                "end: {} {} (duration {}) [{}]",
                level,
                name,
                format_secs(elapsed),
                namespace
            );
            if root {
                tracing::info!("{}", message);
            } else {
                tracing::debug!("{}", message);
            }
            if !meta.results.is_empty() {
                let record = json!({
                    "definition": "lava",
                    "namespace": namespace,
                    "case": name,
                    "level": level,
                    "duration": format!("{:.02}", elapsed.as_secs_f64()),
                    "result": if failed || !meta.errors.is_empty() { "fail" } else { "pass" },
                    "extra": Value::Object(meta.results.clone()),
                });
                env.sink.results(&record);
            }

            if let Err(e) = result {
                if root && skip_timeout && matches!(e, LavaError::Timeout { .. }) {
                    tracing::warn!(
                        "skip_timeout is set for {} - continuing to next action block.",
                        name
                    );
                    continue;
                }
                return Err(e);
            }
        }
        Ok(())
    })
}

/// Run `cleanup` on every action below `pipeline`, in level order.
///
/// Errors are logged and never stop the remaining cleanups.
pub fn cleanup<'a>(
    tree: &'a mut ActionTree,
    env: &'a mut JobEnv,
    pipeline: PipelineId,
    connection: &'a mut Option<Box<dyn Connection>>,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        for id in tree.actions(pipeline).to_vec() {
            let name = tree.meta(id).name.clone();
            match tree.lend_behavior(id) {
                Ok(mut loan) => {
                    let result = match loan.behavior() {
                        Ok(behavior) => {
                            let mut cx = RunContext::new(tree, env, id, None);
                            behavior.cleanup(&mut cx, connection).await
                        }
                        Err(e) => Err(e),
                    };
                    tree.restore_loan(loan);
                    if let Err(e) = result {
                        tracing::error!("Failed to clean after action '{}': {}", name, e);
                    }
                }
                // the children still get their cleanup
                Err(e) => tracing::warn!(name = %name, "skipping cleanup: {}", e),
            }
            if let Some(child) = tree.child(id) {
                cleanup(tree, env, child, connection).await;
            }
        }
    })
}

fn format_secs(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
