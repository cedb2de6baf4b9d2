//! `mirrorstack destroy` - delete everything a stack manages
//!
//! Looked-up resources (the GitLab group) are never deleted.

use anyhow::Result;

use super::up::apply_stack;
use super::{Session, select};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::planner::Intent;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let session = Session::open(ctx)?;

    // Mirror first, then the repository it mirrors
    let stacks = select(args.stack.stack)?;
    let total = stacks.len();
    for (i, stack) in stacks.into_iter().rev().enumerate() {
        if ctx.human() && total > 1 {
            ui::step(i + 1, total, stack.description);
        }
        apply_stack(ctx, &session, stack, args, Intent::Destroy)?;
    }

    Ok(())
}
