//! Plan and refresh display - mirrorstack-specific UI

use crate::ui;
use colored::Colorize;
use declarative::{OperationKind, Plan, RefreshReport, group_by_type};

/// Human-readable heading for a resource type
fn type_name(resource_type: &str) -> &str {
    match resource_type {
        "github_repository" => "Repositories (GitHub)",
        "github_branch_protection" => "Branch protection (GitHub)",
        "github_issue_label" => "Issue labels (GitHub)",
        "github_actions_secret" => "Actions secrets (GitHub)",
        "gitlab_project" => "Projects (GitLab)",
        "gitlab_group" => "Groups (GitLab)",
        other => other,
    }
}

/// Display a plan, optionally narrowed to a `type` or `type.name` target
pub fn display_plan(plan: &Plan, target: Option<&str>) {
    let ops = plan.matching(target);
    if ops.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Planned Changes".bold()
    );
    println!("│");

    for (resource_type, type_ops) in group_by_type(ops.iter().copied()) {
        println!("│ {}", type_name(resource_type).bold());

        for op in type_ops {
            let state_desc = match op.kind {
                OperationKind::Create => "(will create)".to_string(),
                OperationKind::Delete => "(will delete)".to_string(),
                OperationKind::Update => {
                    let names: Vec<&str> = op.changes.iter().map(|c| c.name.as_str()).collect();
                    format!("({})", names.join(", "))
                }
            };
            println!(
                "│   {} {:<30} {}",
                ui::kind_symbol(op.kind),
                op.key.name,
                state_desc.dimmed()
            );

            if op.kind == OperationKind::Update {
                for change in &op.changes {
                    let from = change
                        .from
                        .as_ref()
                        .map_or_else(|| "(unset)".to_string(), ui::format_value);
                    let to = change
                        .to
                        .as_ref()
                        .map_or_else(|| "(unset)".to_string(), ui::format_value);
                    println!(
                        "│       {}: {} → {}",
                        change.name.dimmed(),
                        from.red(),
                        to.green()
                    );
                }
            }
        }
        println!("│");
    }

    let summary = plan.summary();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to delete",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.deletes.to_string().red()
    );
    if target.is_some() && ops.len() < plan.len() {
        println!(
            "│ {}",
            format!("{} more outside the target", plan.len() - ops.len()).dimmed()
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}

/// Report what a refresh found
pub fn display_refresh(report: &RefreshReport) {
    for key in &report.vanished {
        ui::warn(&format!("{key} no longer exists remotely; it will be recreated"));
    }
    for key in &report.drifted {
        ui::warn(&format!("{key} was changed outside mirrorstack"));
    }
    if report.vanished.is_empty() && report.drifted.is_empty() {
        ui::dim("No drift detected");
    }
}
