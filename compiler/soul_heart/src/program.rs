//! The compiled program.
//!
//! A [`Program`] owns its modules plus the tables they reference: the
//! string dictionary, the constant table, and the struct store. The
//! textual dump is canonical: `hash()` is an FNV-1a-64 fingerprint of
//! `to_heart()`, so structurally equal programs hash equally and the
//! text round-trip preserves the hash by construction.

use crate::ir::{Module, ModuleKind};
use soul_ir::types::StructStore;
use soul_ir::{ConstantTable, StringDictionary};

#[derive(Default)]
pub struct Program {
    pub modules: Vec<Module>,
    pub string_dictionary: StringDictionary,
    pub constant_table: ConstantTable,
    pub structs: StructStore,
    /// Index of the main processor module, when known.
    pub main_processor: Option<usize>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            modules: Vec::new(),
            string_dictionary: StringDictionary::new(),
            constant_table: ConstantTable::new(),
            structs: StructStore::new(),
            main_processor: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_with_name(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn main_processor(&self) -> Option<&Module> {
        self.main_processor.map(|i| &self.modules[i])
    }

    /// All processor/graph modules, for hosts enumerating candidates.
    pub fn processors(&self) -> impl Iterator<Item = &Module> {
        self.modules
            .iter()
            .filter(|m| m.kind != ModuleKind::Namespace)
    }

    /// Canonical text form.
    pub fn to_heart(&self) -> String {
        crate::printer::print_program(self)
    }

    /// Deterministic fingerprint for caching, derived from the canonical
    /// text.
    pub fn hash(&self) -> String {
        format!("{:016x}", fnv1a_64(self.to_heart().as_bytes()))
    }
}

fn fnv1a_64(data: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_is_stable() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn empty_program_round_trip_header() {
        let p = Program::new();
        let text = p.to_heart();
        assert!(text.starts_with("#SOUL-HEART"));
        assert_eq!(p.hash().len(), 16);
    }
}
