use colored::{ColoredString, Colorize};
use provision::{ProgressEvent, Severity};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
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

/// One program output line, tinted by severity
pub fn event_line(event: &ProgressEvent) -> String {
    format!(
        "{} {}",
        format!("[{}]", event.timestamp()).dimmed(),
        tint(event.severity, &event.line)
    )
}

fn tint(severity: Severity, line: &str) -> ColoredString {
    match severity {
        Severity::Error => line.red(),
        Severity::Warning => line.yellow(),
        Severity::Success => line.green(),
        Severity::Info => line.normal(),
    }
}

// ============================================================================
// Size Formatting
// ============================================================================

/// Normalize `lsblk` sizes for display ("29.8G" -> "29.8 GB")
pub fn format_lsblk_size(size: &str) -> String {
    let Some(unit) = size.chars().last().filter(char::is_ascii_alphabetic) else {
        return size.to_string();
    };
    let number = &size[..size.len() - unit.len_utf8()];
    match unit.to_ascii_uppercase() {
        'B' => format!("{number} B"),
        u @ ('K' | 'M' | 'G' | 'T' | 'P') => format!("{number} {u}B"),
        _ => size.to_string(),
    }
}
