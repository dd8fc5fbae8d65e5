//! Struct definitions.
//!
//! Structures live in a per-compilation [`StructStore`]; a `Type` refers to
//! one by [`StructId`], so struct type equality is id equality.

use super::Type;

/// Handle to a structure in the store.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct StructId(pub u32);

/// One member of a structure.
#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    pub ty: Type,
    pub name: String,
}

/// A structure definition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Structure {
    pub name: String,
    pub members: Vec<Member>,
}

impl Structure {
    pub fn new(name: impl Into<String>) -> Self {
        Structure {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn add_member(&mut self, ty: Type, name: impl Into<String>) -> usize {
        self.members.push(Member {
            ty,
            name: name.into(),
        });
        self.members.len() - 1
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Per-compilation storage for structures.
#[derive(Clone, Default)]
pub struct StructStore {
    structs: Vec<Structure>,
}

impl StructStore {
    pub fn new() -> Self {
        StructStore {
            structs: Vec::new(),
        }
    }

    pub fn add(&mut self, s: Structure) -> StructId {
        let id = StructId(u32::try_from(self.structs.len()).expect("struct store capacity exceeded"));
        self.structs.push(s);
        id
    }

    #[inline]
    pub fn get(&self, id: StructId) -> &Structure {
        &self.structs[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: StructId) -> &mut Structure {
        &mut self.structs[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StructId, &Structure)> {
        self.structs
            .iter()
            .enumerate()
            .map(|(i, s)| (StructId(i as u32), s))
    }

    /// Find a structure by name.
    pub fn find(&self, name: &str) -> Option<StructId> {
        self.structs
            .iter()
            .position(|s| s.name == name)
            .map(|i| StructId(i as u32))
    }
}
