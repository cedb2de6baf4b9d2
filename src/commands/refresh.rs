//! `mirrorstack refresh` - re-read live state into the state files

use anyhow::Result;
use serde_json::json;

use super::{Session, select};
use crate::Context;
use crate::cli::StackArgs;
use crate::engine::differ;
use crate::engine::planner::refresh_stack;
use crate::ui;

pub fn run(ctx: &Context, args: &StackArgs) -> Result<()> {
    let session = Session::open(ctx)?;

    for stack in select(args.stack)? {
        let provider = stack.providers(&session.config)?;
        let mut state = session.store.load(stack.name)?;
        let previous = state.observed()?;
        let declaration = stack.declare(&session.config)?;

        if ctx.human() {
            ui::header(&stack.qualified_name(&session.config));
        }
        let report = refresh_stack(
            stack,
            &declaration,
            &previous,
            &provider,
            &session.config.retry,
            ctx.human(),
        )?;

        state.record(&report.observed);
        session.store.save(&state)?;

        if ctx.json() {
            let line = json!({
                "stack": stack.name,
                "resources": report.observed.len(),
                "vanished": report.vanished.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "drifted": report.drifted.iter().map(ToString::to_string).collect::<Vec<_>>(),
            });
            println!("{line}");
        } else if !ctx.quiet {
            differ::display_refresh(&report);
            ui::success(&format!(
                "{} resources recorded in {}",
                report.observed.len(),
                session.store.path_for(stack.name).display()
            ));
        }
    }

    Ok(())
}
