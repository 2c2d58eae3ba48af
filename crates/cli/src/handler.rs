//! Default change handler

use owo_colors::{OwoColorize, Stream, Style};
use std::path::Path;
use tracing::debug;
use watchit_core::Operation;

/// Plain-text line for one change
pub fn format_event(op: Operation, path: &Path) -> String {
    format!("op={} file={}", op.name(), path.display())
}

/// Print one line per change to stdout
///
/// The operation name is coloured only when stdout is a terminal.
pub fn print_event(op: Operation, path: &Path) {
    debug!("{}", format_event(op, path));
    let name = op.name();
    println!(
        "op={} file={}",
        name.if_supports_color(Stream::Stdout, |n| n.style(Style::new().cyan().bold())),
        path.display()
    );
}
