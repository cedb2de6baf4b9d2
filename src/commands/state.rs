//! `mirrorstack state` - inspect local state files

use anyhow::Result;
use colored::Colorize;

use super::{Session, select};
use crate::Context;
use crate::cli::StateCommand;
use crate::state::StackState;
use crate::ui;

pub fn run(ctx: &Context, cmd: &StateCommand) -> Result<()> {
    let session = Session::open(ctx)?;

    match cmd {
        StateCommand::Show(args) => {
            for stack in select(args.stack)? {
                let state = session.store.load(stack.name)?;
                if ctx.json() {
                    println!("{}", serde_json::to_string(&state)?);
                } else {
                    show(&state, &session.store.path_for(stack.name).display().to_string());
                }
            }
        }
        StateCommand::Path(args) => {
            for stack in select(args.stack)? {
                println!("{}", session.store.path_for(stack.name).display());
            }
        }
    }

    Ok(())
}

fn show(state: &StackState, path: &str) {
    ui::header(&state.stack);
    ui::kv("File", path);
    ui::kv(
        "Updated",
        &state.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    ui::kv("Managed", &state.managed_count().to_string());

    if state.resources.is_empty() {
        ui::dim("No resources recorded");
        return;
    }

    ui::section("Resources");
    for entry in &state.resources {
        let marker = if entry.lookup {
            "(lookup)".dimmed().to_string()
        } else {
            String::new()
        };
        println!(
            "  {}.{} {} {}",
            entry.resource_type,
            entry.name.bold(),
            format!("id={}", ui::truncate(&entry.record.id, 40)).dimmed(),
            marker
        );
        for dep in &entry.depends_on {
            println!("      {} {}", "↳".dimmed(), dep);
        }
    }
}
