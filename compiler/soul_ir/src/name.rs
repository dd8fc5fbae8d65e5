//! Interned identifier names.
//!
//! Identical textual inputs produce identical [`Name`] handles, so name
//! comparison during parsing and resolution is a `u32` compare. The
//! interner is owned by one compilation and dropped with it; the internal
//! lock exists so interning works through `&self` (the parser holds a
//! shared reference to the interner while building the AST), not for
//! cross-thread sharing.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;

/// Handle to an interned string.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

impl Name {
    /// The pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

struct InternerState {
    map: FxHashMap<Box<str>, u32>,
    strings: Vec<Box<str>>,
}

/// String interner for identifiers.
///
/// Handles are stable for the lifetime of the interner.
pub struct StringInterner {
    state: RwLock<InternerState>,
}

impl StringInterner {
    pub fn new() -> Self {
        let mut state = InternerState {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        };
        state.map.insert("".into(), 0);
        state.strings.push("".into());
        StringInterner {
            state: RwLock::new(state),
        }
    }

    /// Intern a string, returning its stable handle.
    pub fn intern(&self, s: &str) -> Name {
        {
            let state = self.state.read();
            if let Some(&idx) = state.map.get(s) {
                return Name(idx);
            }
        }

        let mut state = self.state.write();
        // Re-check: another caller may have interned between the locks.
        if let Some(&idx) = state.map.get(s) {
            return Name(idx);
        }

        let idx = u32::try_from(state.strings.len()).expect("interner capacity exceeded");
        state.strings.push(s.into());
        state.map.insert(s.into(), idx);
        Name(idx)
    }

    /// Look up the text for a handle.
    pub fn lookup(&self, name: Name) -> String {
        let state = self.state.read();
        state.strings[name.0 as usize].to_string()
    }

    /// Number of distinct strings interned (including the empty string).
    pub fn len(&self) -> usize {
        self.state.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the empty string is always present
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        StringInterner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_identical_handles() {
        let interner = StringInterner::new();
        let a = interner.intern("frequency");
        let b = interner.intern("frequency");
        let c = interner.intern("freq");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.lookup(a), "frequency");
    }

    #[test]
    fn empty_string_pre_interned() {
        let interner = StringInterner::new();
        assert_eq!(interner.intern(""), Name::EMPTY);
        assert_eq!(interner.len(), 1);
    }
}
