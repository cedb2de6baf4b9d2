//! `mirrorstack up` - converge each stack onto its declaration

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{CancelToken, EventSink, ExecuteOptions, ObservedState, execute};
use serde_json::json;

use super::{Session, select};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::differ;
use crate::engine::executor::{Confirmation, FailFast, HumanSink, JsonSink, print_summary};
use crate::engine::planner::{Intent, prepare};
use crate::progress;
use crate::stacks::Stack;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let session = Session::open(ctx)?;

    let stacks = select(args.stack.stack)?;
    let total = stacks.len();
    for (i, stack) in stacks.into_iter().enumerate() {
        if ctx.human() && total > 1 {
            ui::step(i + 1, total, stack.description);
        }
        apply_stack(ctx, &session, stack, args, Intent::Converge)?;
    }

    Ok(())
}

/// Plan and execute one stack, then record the outcome
///
/// Fails if any operation failed or the run was cancelled, which stops
/// later stacks from running.
pub fn apply_stack(
    ctx: &Context,
    session: &Session,
    stack: &Stack,
    args: &ApplyArgs,
    intent: Intent,
) -> Result<()> {
    let provider = stack.providers(&session.config)?;
    if ctx.human() {
        ui::header(&stack.qualified_name(&session.config));
    }

    let prepared = prepare(
        stack,
        &session.config,
        &session.store,
        &provider,
        intent,
        !args.skip_refresh,
        ctx.human(),
    )?;
    let mut state = prepared.state;
    let mut observed = prepared.observed;
    let plan = prepared.plan;

    if ctx.human() {
        if let Some(report) = &prepared.refresh
            && !ctx.quiet
        {
            differ::display_refresh(report);
        }
        differ::display_plan(&plan, None);
    }

    if plan.is_empty() {
        print_exports(ctx, stack, &observed);
        return Ok(());
    }

    if intent == Intent::Destroy && ctx.human() && !args.dry_run {
        ui::warn(&format!(
            "This deletes {} resources managed by {}",
            plan.len(),
            stack.name
        ));
    }

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.unwrap_or(session.config.jobs).max(1),
        retry: session.config.retry.clone(),
        cancel: CancelToken::new(),
    };

    let bar = if ctx.human() && !ctx.quiet && !args.dry_run {
        progress::bar(plan.len() as u64, stack.name)
    } else {
        progress::hidden()
    };
    let sink: Box<dyn EventSink> = if ctx.json() {
        Box::new(JsonSink)
    } else {
        Box::new(HumanSink::new(bar.clone(), ctx.quiet))
    };
    let sink: Box<dyn EventSink> = if args.fail_fast {
        Box::new(FailFast::new(sink, opts.cancel.clone()))
    } else {
        sink
    };

    let mut confirm = Confirmation {
        assume_yes: args.yes,
    };
    let report = execute(
        &plan,
        &observed,
        &provider,
        &opts,
        &*sink,
        &mut confirm,
    )
    .with_context(|| format!("Failed to run plan for {}", stack.name))?;
    bar.finish_and_clear();

    if !args.dry_run {
        observed.apply_report(&plan, &report);
        state.record(&observed);
        session.store.save(&state)?;
        log::info!(
            "saved {} resources to {}",
            state.managed_count(),
            session.store.path_for(stack.name).display()
        );
    }

    if ctx.human() {
        print_summary(&report);
    }
    if !args.dry_run {
        print_exports(ctx, stack, &observed);
    }

    if report.cancelled() {
        bail!("Run of {} was cancelled", stack.name);
    }
    if !report.is_success() {
        bail!(
            "{} operations failed in {}",
            report.summary().failed,
            stack.name
        );
    }

    Ok(())
}

/// Print a stack's outputs
fn print_exports(ctx: &Context, stack: &Stack, observed: &ObservedState) {
    let exports = stack.exports(observed);
    if ctx.json() {
        let outputs: serde_json::Map<String, serde_json::Value> = exports
            .into_iter()
            .map(|(name, value)| (name.to_string(), json!(value)))
            .collect();
        println!("{}", json!({ "stack": stack.name, "outputs": outputs }));
        return;
    }
    if ctx.quiet || exports.iter().all(|(_, v)| v.is_none()) {
        return;
    }

    ui::section("Outputs");
    for (name, value) in exports {
        match value {
            Some(v) => ui::kv(name, &v),
            None => ui::kv(name, &"(unknown)".dimmed().to_string()),
        }
    }
}
