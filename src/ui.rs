use colored::{ColoredString, Colorize};
use declarative::{OperationKind, OperationStatus, Value};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

// ============================================================================
// Plan and Run Symbols
// ============================================================================

/// Colored `+`, `~` or `-` for an operation kind
pub fn kind_symbol(kind: OperationKind) -> ColoredString {
    match kind {
        OperationKind::Create => kind.symbol().green(),
        OperationKind::Update => kind.symbol().yellow(),
        OperationKind::Delete => kind.symbol().red(),
    }
}

/// Colored marker for an operation status
pub fn status_symbol(status: OperationStatus) -> ColoredString {
    match status {
        OperationStatus::Pending => "○".dimmed(),
        OperationStatus::Running => "→".cyan(),
        OperationStatus::Succeeded => "✓".green(),
        OperationStatus::Failed => "✗".red(),
        OperationStatus::Skipped => "⊘".yellow(),
    }
}

/// Render a property value for display
///
/// Long strings are shortened so one property fits on a line.
pub fn format_value(value: &Value) -> String {
    let rendered = value.to_string();
    truncate(&rendered, 60)
}

/// Truncate a string for display, keeping the start
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

// ============================================================================
// Tests
// ============================================================================
