// registry.rs — Global value registry
//
// Owns every named global value created during synthesis (memory-backed
// ports, scratch registers). Entries are created or fetched by name and
// live as long as the compilation unit. Teardown is two-phase: first every
// use in the function's blocks is rewired to a zero constant of the global's
// width (`detach_users`), then the entries are dropped (`release`).

use std::collections::BTreeMap;

use thiserror::Error;

use crate::ir::{Block, Operand, ParamType};

// ── Data types ──────────────────────────────────────────────────────────────

/// Widths a global may be declared with.
pub const SUPPORTED_WIDTHS: [u32; 5] = [1, 8, 16, 32, 64];

/// One registered global value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEntry {
    pub name: String,
    pub ty: ParamType,
}

impl GlobalEntry {
    /// Width of a zero constant that can stand in for this global.
    pub fn value_width(&self) -> u32 {
        match self.ty {
            ParamType::Int { width } => width,
            ParamType::Array { .. } | ParamType::Pointer { .. } => crate::ir::POINTER_WIDTH,
        }
    }
}

/// Lifecycle of the registry. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryPhase {
    Live,
    Detached,
    Released,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("global '{name}' already registered as {existing:?}, requested {requested:?}")]
    TypeMismatch {
        name: String,
        existing: ParamType,
        requested: ParamType,
    },
    #[error("unsupported bit width {width} for global '{name}'")]
    UnsupportedWidth { name: String, width: u32 },
    #[error("registry is {phase:?}; expected {expected:?}")]
    WrongPhase {
        phase: RegistryPhase,
        expected: RegistryPhase,
    },
}

// ── Registry ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct GlobalRegistry {
    entries: BTreeMap<String, GlobalEntry>,
    phase: RegistryPhase,
}

impl Default for GlobalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalRegistry {
    pub fn new() -> Self {
        GlobalRegistry {
            entries: BTreeMap::new(),
            phase: RegistryPhase::Live,
        }
    }

    pub fn phase(&self) -> RegistryPhase {
        self.phase
    }

    fn expect_phase(&self, expected: RegistryPhase) -> Result<(), RegistryError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(RegistryError::WrongPhase {
                phase: self.phase,
                expected,
            })
        }
    }

    /// Fetch the global named `name`, creating it with `ty` when absent.
    pub fn get_or_create(
        &mut self,
        name: &str,
        ty: ParamType,
    ) -> Result<&GlobalEntry, RegistryError> {
        self.expect_phase(RegistryPhase::Live)?;
        let width = match ty {
            ParamType::Int { width } => width,
            ParamType::Array { elem_width, .. } | ParamType::Pointer { elem_width } => elem_width,
        };
        if !SUPPORTED_WIDTHS.contains(&width) {
            return Err(RegistryError::UnsupportedWidth {
                name: name.to_string(),
                width,
            });
        }
        if let Some(existing) = self.entries.get(name) {
            if existing.ty != ty {
                return Err(RegistryError::TypeMismatch {
                    name: name.to_string(),
                    existing: existing.ty,
                    requested: ty,
                });
            }
        }
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| GlobalEntry {
                name: name.to_string(),
                ty,
            });
        log::trace!("global '{}' registered as {:?}", name, entry.ty);
        Ok(entry)
    }

    pub fn lookup(&self, name: &str) -> Option<&GlobalEntry> {
        self.entries.get(name)
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Phase one of shutdown: rewrite every `Operand::Global` naming a
    /// registered entry into a zero constant. Returns the number of edges
    /// rewritten.
    pub fn detach_users(&mut self, blocks: &mut [Block]) -> Result<usize, RegistryError> {
        self.expect_phase(RegistryPhase::Live)?;
        let mut rewritten = 0;
        for block in blocks.iter_mut() {
            for op in block.ops.iter_mut() {
                for operand in op.kind.operands_mut() {
                    let width = match operand {
                        Operand::Global(name) => match self.entries.get(name.as_str()) {
                            Some(entry) => entry.value_width(),
                            None => continue,
                        },
                        _ => continue,
                    };
                    *operand = Operand::constant(0, width);
                    rewritten += 1;
                }
            }
        }
        log::debug!(
            "detached {} use(s) of {} global(s)",
            rewritten,
            self.entries.len()
        );
        self.phase = RegistryPhase::Detached;
        Ok(rewritten)
    }

    /// Phase two of shutdown: drop all entries. Only legal after
    /// `detach_users`, so no operand can still name a released global.
    pub fn release(&mut self) -> Result<usize, RegistryError> {
        self.expect_phase(RegistryPhase::Detached)?;
        let count = self.entries.len();
        self.entries.clear();
        self.phase = RegistryPhase::Released;
        Ok(count)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, OpKind};

    fn int(width: u32) -> ParamType {
        ParamType::Int { width }
    }

    #[test]
    fn get_or_create_returns_existing() {
        let mut reg = GlobalRegistry::new();
        reg.get_or_create("state", int(8)).unwrap();
        reg.get_or_create("state", int(8)).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup("state").unwrap().ty, int(8));
    }

    #[test]
    fn type_mismatch_rejected() {
        let mut reg = GlobalRegistry::new();
        reg.get_or_create("g", int(8)).unwrap();
        let err = reg.get_or_create("g", int(16)).unwrap_err();
        assert!(matches!(err, RegistryError::TypeMismatch { .. }));
    }

    #[test]
    fn unsupported_width_rejected() {
        let mut reg = GlobalRegistry::new();
        let err = reg.get_or_create("odd", int(12)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnsupportedWidth {
                name: "odd".into(),
                width: 12
            }
        );
    }

    #[test]
    fn two_phase_shutdown_rewrites_uses() {
        let mut reg = GlobalRegistry::new();
        reg.get_or_create("g", int(16)).unwrap();

        let mut bb = Block::new("entry");
        bb.push(
            "t",
            16,
            OpKind::Binary {
                bin: BinOp::Add,
                lhs: Operand::Global("g".into()),
                rhs: Operand::Global("unregistered".into()),
            },
        );
        let mut blocks = vec![bb];

        assert_eq!(reg.detach_users(&mut blocks).unwrap(), 1);
        let operands = blocks[0].ops[0].kind.operands();
        assert_eq!(*operands[0], Operand::constant(0, 16));
        assert_eq!(*operands[1], Operand::Global("unregistered".into()));

        assert_eq!(reg.release().unwrap(), 1);
        assert!(reg.is_empty());
        assert_eq!(reg.phase(), RegistryPhase::Released);
    }

    #[test]
    fn release_before_detach_is_rejected() {
        let mut reg = GlobalRegistry::new();
        let err = reg.release().unwrap_err();
        assert_eq!(
            err,
            RegistryError::WrongPhase {
                phase: RegistryPhase::Live,
                expected: RegistryPhase::Detached
            }
        );
    }

    #[test]
    fn create_after_detach_is_rejected() {
        let mut reg = GlobalRegistry::new();
        reg.detach_users(&mut []).unwrap();
        assert!(reg.get_or_create("late", int(32)).is_err());
    }
}
