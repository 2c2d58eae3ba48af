//! Normalized file operations
//!
//! Every event delivered to a handler carries one of these kinds, whatever
//! raw source produced it.

use std::fmt;

/// Kind of change observed on a watched file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Operation {
    /// File created in a watched directory
    Create = 0,
    /// Watched file written to
    Write = 1,
    /// Watched file deleted
    Remove = 2,
    /// Watched file renamed
    Rename = 3,
    /// Watched file's permissions changed
    Chmod = 4,
    /// Anything the vocabulary does not cover yet
    Unsupported = 5,
}

impl Operation {
    /// All operations, in discriminant order
    pub const ALL: [Operation; 6] = [
        Operation::Create,
        Operation::Write,
        Operation::Remove,
        Operation::Rename,
        Operation::Chmod,
        Operation::Unsupported,
    ];

    /// Human-readable name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Write => "WRITE",
            Operation::Remove => "REMOVE",
            Operation::Rename => "RENAME",
            Operation::Chmod => "CHMOD",
            Operation::Unsupported => "UNSUPPORTED",
        }
    }

    /// Numeric discriminant
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Look up an operation by discriminant
    pub fn from_code(code: u32) -> Option<Operation> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }
}

/// Display name for a numeric operation code
///
/// Codes outside the vocabulary render as `"UNKNOWN"`.
pub fn operation_name(code: u32) -> &'static str {
    Operation::from_code(code).map_or("UNKNOWN", Operation::name)
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
