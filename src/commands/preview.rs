//! `mirrorstack preview` - show what `up` would change

use anyhow::Result;
use serde_json::json;

use super::{Session, select};
use crate::Context;
use crate::cli::PreviewArgs;
use crate::engine::planner::{Intent, prepare};
use crate::engine::differ;
use crate::ui;

pub fn run(ctx: &Context, args: &PreviewArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let target = args.target.as_deref();

    for stack in select(args.stack.stack)? {
        let provider = stack.providers(&session.config)?;
        if ctx.human() {
            ui::header(&stack.qualified_name(&session.config));
        }

        let prepared = prepare(
            stack,
            &session.config,
            &session.store,
            &provider,
            Intent::Converge,
            !args.skip_refresh,
            ctx.human(),
        )?;

        if ctx.json() {
            for op in prepared.plan.matching(target) {
                let line = json!({
                    "stack": stack.name,
                    "resource": op.key.to_string(),
                    "operation": op.kind,
                    "level": op.level,
                    "changes": op.changes,
                });
                println!("{line}");
            }
            continue;
        }

        if let Some(report) = &prepared.refresh
            && !ctx.quiet
        {
            differ::display_refresh(report);
        }
        differ::display_plan(&prepared.plan, target);
    }

    Ok(())
}
