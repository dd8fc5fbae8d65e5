//! Constant table for values too large to inline.
//!
//! Unsized-array literals live here; the AST and HEART refer to them by
//! handle. The handle-to-value mapping is injective modulo structural
//! equality: storing an equal value twice returns the same handle.

use crate::value::{ConstantHandle, Value};

/// Per-compilation storage for out-of-line constants.
#[derive(Clone, Default)]
pub struct ConstantTable {
    values: Vec<Value>,
}

impl ConstantTable {
    pub fn new() -> Self {
        ConstantTable { values: Vec::new() }
    }

    /// Store a value, returning the handle of an existing structurally
    /// equal value when there is one.
    pub fn add(&mut self, value: Value) -> ConstantHandle {
        if let Some(idx) = self.values.iter().position(|v| v == &value) {
            return ConstantHandle(idx as u32);
        }
        let idx = u32::try_from(self.values.len()).expect("constant table capacity exceeded");
        self.values.push(value);
        ConstantHandle(idx)
    }

    pub fn get(&self, handle: ConstantHandle) -> &Value {
        &self.values[handle.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantHandle, &Value)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (ConstantHandle(i as u32), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_share_a_handle() {
        let mut table = ConstantTable::new();
        let a = table.add(Value::int32(42));
        let b = table.add(Value::int32(42));
        let c = table.add(Value::int32(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.get(a), &Value::int32(42));
        assert_eq!(table.len(), 2);
    }
}
