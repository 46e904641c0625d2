// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all scheduling phases.
// Recoverable conditions (a subscript that cannot be pipelined, say) become
// warnings collected in result structs; fatal ones are `thiserror` enums in
// the module that raises them and are converted here for reporting.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::id::OpId;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `W0100`, `E0200`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    /// A subscript access was left unpipelined.
    pub const W0100: DiagCode = DiagCode("W0100");
    /// No configured hardware unit executes an operation's opcode.
    pub const E0200: DiagCode = DiagCode("E0200");
    /// A resource slot was booked twice.
    pub const E0201: DiagCode = DiagCode("E0201");
    /// Malformed input IR.
    pub const E0300: DiagCode = DiagCode("E0300");
    /// A finished schedule failed verification.
    pub const E0301: DiagCode = DiagCode("E0301");
    /// Global registry misuse.
    pub const E0400: DiagCode = DiagCode("E0400");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Location ─────────────────────────────────────────────────────────────

/// Where a diagnostic points: a block, optionally narrowed to one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub block: String,
    pub op: Option<OpId>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Some(op) => write!(f, "{}:{}", self.block, op),
            None => write!(f, "{}", self.block),
        }
    }
}

// ── Diagnostic ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub location: Option<Location>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, location, or hint.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            location: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, message).with_code(code)
    }

    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Point the diagnostic at a block and operation.
    pub fn at(mut self, block: impl Into<String>, op: Option<OpId>) -> Self {
        self.location = Some(Location {
            block: block.into(),
            op,
        });
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        match &self.code {
            Some(code) => write!(f, "{}[{}]", level, code)?,
            None => write!(f, "{}", level)?,
        }
        if let Some(loc) = &self.location {
            write!(f, " at {}", loc)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
