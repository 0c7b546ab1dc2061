//! Small line-preserving parsers for the config formats a tuned host carries.
//!
//! Each parser keeps unrelated lines (comments, blank lines, unknown keys)
//! untouched so a rewrite only changes what was asked for.

pub mod firmware;
pub mod fstab;
pub mod kv;
pub mod unit;

pub use firmware::FirmwareConfig;
pub use fstab::{Fstab, FstabEntry};
pub use kv::KeyValueFile;
pub use unit::UnitFile;

/// Joins lines back into file text with a trailing newline.
pub(crate) fn join_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
