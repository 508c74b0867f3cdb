//! Terminal styling for command output.

use console::Style;

/// Green check mark followed by `msg`.
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Red cross followed by `msg`.
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Yellow warning sign followed by `msg`.
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// `Jira → GitLab` direction label.
pub fn direction() -> String {
    Style::new()
        .blue()
        .bold()
        .apply_to("Jira → GitLab")
        .to_string()
}

/// Count line for a summary block, highlighted when non-zero.
pub fn count(label: &str, value: usize, alert: bool) -> String {
    let style = if alert && value > 0 {
        Style::new().red().bold()
    } else {
        Style::new()
    };
    format!("  {:<18}: {}", label, style.apply_to(value))
}
