//! Raw operation codes to the core vocabulary
//!
//! The only place that knows how raw source codes line up with
//! [`Operation`].

use crate::source::RawOp;
use watchit_core::Operation;

/// Translate a raw operation code
///
/// Unrecognized codes (including moves across directories) become
/// [`Operation::Unsupported`].
pub fn translate(raw: RawOp) -> Operation {
    match raw {
        RawOp::CREATE => Operation::Create,
        RawOp::WRITE => Operation::Write,
        RawOp::REMOVE => Operation::Remove,
        RawOp::RENAME => Operation::Rename,
        RawOp::CHMOD => Operation::Chmod,
        _ => Operation::Unsupported,
    }
}
