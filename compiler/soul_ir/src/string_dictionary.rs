//! String-literal dictionary.
//!
//! String literals are stored once per compilation and referenced by
//! 32-bit handles. Handle 0 is the empty string, which doubles as the zero
//! initialiser for string-typed values.

use rustc_hash::FxHashMap;

/// Handle to a string in the dictionary.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct StringHandle(pub u32);

impl StringHandle {
    pub const EMPTY: StringHandle = StringHandle(0);
}

/// Per-compilation string-literal storage.
#[derive(Clone, Default)]
pub struct StringDictionary {
    strings: Vec<String>,
    map: FxHashMap<String, u32>,
}

impl StringDictionary {
    pub fn new() -> Self {
        let mut dict = StringDictionary {
            strings: Vec::new(),
            map: FxHashMap::default(),
        };
        dict.strings.push(String::new());
        dict.map.insert(String::new(), 0);
        dict
    }

    /// Store a string (once) and return its handle.
    pub fn handle_for_string(&mut self, s: &str) -> StringHandle {
        if let Some(&idx) = self.map.get(s) {
            return StringHandle(idx);
        }
        let idx =
            u32::try_from(self.strings.len()).expect("string dictionary capacity exceeded");
        self.strings.push(s.to_string());
        self.map.insert(s.to_string(), idx);
        StringHandle(idx)
    }

    pub fn string_for_handle(&self, handle: StringHandle) -> &str {
        &self.strings[handle.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the empty string is always present
    }

    pub fn iter(&self) -> impl Iterator<Item = (StringHandle, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (StringHandle(i as u32), s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_stable_and_deduplicated() {
        let mut dict = StringDictionary::new();
        let a = dict.handle_for_string("hello");
        let b = dict.handle_for_string("hello");
        let c = dict.handle_for_string("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(dict.string_for_handle(a), "hello");
        assert_eq!(dict.handle_for_string(""), StringHandle::EMPTY);
    }
}
