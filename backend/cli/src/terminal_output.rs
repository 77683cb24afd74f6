//! Terminal output utilities: ANSI formatting, progress bar, result rendering.

use std::io::Write;

use nutrilens_core::AnalysisRecord;
use nutrilens_understanding::Diagnostic;

// ---------------------------------------------------------------------------
// ANSI Color/Style helpers
// ---------------------------------------------------------------------------

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

const PROGRESS_WIDTH: usize = 30;

/// Check if the terminal supports color output.
pub fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
        && (std::env::var("COLORTERM").is_ok()
            || std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false))
}

/// Styles text when color is enabled.
#[derive(Debug, Clone, Copy)]
pub struct Style {
    pub color: bool,
}

impl Style {
    pub fn detect() -> Self {
        Self {
            color: supports_color(),
        }
    }

    fn paint(&self, codes: &str, text: &str) -> String {
        if self.color {
            format!("{codes}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Formatted notes
// ---------------------------------------------------------------------------

/// Print a formatted INFO note to stderr.
pub fn note_info(msg: &str) {
    if supports_color() {
        eprintln!("{CYAN}{BOLD}ℹ{RESET} {msg}");
    } else {
        eprintln!("INFO: {msg}");
    }
}

/// Print a formatted WARNING note.
pub fn note_warn(msg: &str) {
    if supports_color() {
        eprintln!("{YELLOW}{BOLD}⚠{RESET} {msg}");
    } else {
        eprintln!("WARN: {msg}");
    }
}

/// Print a formatted ERROR note.
pub fn note_error(msg: &str) {
    if supports_color() {
        eprintln!("{RED}{BOLD}✗{RESET} {msg}");
    } else {
        eprintln!("ERROR: {msg}");
    }
}

/// Print a formatted SUCCESS note.
pub fn note_success(msg: &str) {
    if supports_color() {
        eprintln!("{GREEN}{BOLD}✓{RESET} {msg}");
    } else {
        eprintln!("OK: {msg}");
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// `[#########.....................]  30%`
pub fn progress_bar(percent: u8) -> String {
    let percent = percent.min(100) as usize;
    let filled = PROGRESS_WIDTH * percent / 100;
    format!(
        "[{}{}] {percent:>3}%",
        "#".repeat(filled),
        ".".repeat(PROGRESS_WIDTH - filled)
    )
}

/// Redraw the progress line in place.
pub fn draw_progress(writer: &mut impl Write, percent: u8) -> std::io::Result<()> {
    write!(writer, "\rUploading {}", progress_bar(percent))?;
    if percent >= 100 {
        writeln!(writer)?;
    }
    writer.flush()
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

pub fn render_record(record: &AnalysisRecord, style: Style) -> String {
    let mut out = String::new();
    out.push_str(&style.paint(BOLD, &record.name));
    out.push('\n');
    if !record.generic_name.is_empty() {
        out.push_str(&style.paint(DIM, &format!("({})", record.generic_name)));
        out.push('\n');
    }

    let facts = [("Dosage", &record.dosage), ("Frequency", &record.frequency)];
    for (label, value) in facts {
        if !value.is_empty() {
            out.push_str(&format!("{}: {value}\n", style.paint(BOLD, label)));
        }
    }

    if !record.plain_language_summary.is_empty() {
        out.push('\n');
        out.push_str(&record.plain_language_summary);
        out.push('\n');
    }

    push_list(&mut out, style, "Instructions", CYAN, &record.instructions);
    push_list(&mut out, style, "Warnings", YELLOW, &record.warnings);
    push_list(&mut out, style, "Side effects", RED, &record.side_effects);
    out
}

fn push_list(out: &mut String, style: Style, title: &str, color: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push('\n');
    out.push_str(&style.paint(&format!("{BOLD}{color}"), title));
    out.push('\n');
    for item in items {
        out.push_str(&format!("  - {item}\n"));
    }
}

pub fn render_diagnostic(diagnostic: &Diagnostic, style: Style) -> String {
    format!(
        "{}\n{}\n\n{}\n{}\n",
        style.paint(&format!("{BOLD}{YELLOW}"), &diagnostic.headline),
        diagnostic.detail,
        style.paint(DIM, "Raw response:"),
        diagnostic.raw_pretty
    )
}
