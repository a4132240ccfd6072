use super::NamedMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDescId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u32);

/// Runtime type descriptor for a registered class of objects: a unique
/// name, a single parent, and the interfaces the class declares.
#[derive(Debug, Clone)]
pub struct TypeDesc {
    pub name: String,
    pub parent: Option<TypeDescId>,
    pub interfaces: Vec<InterfaceId>,
}

/// Registry of type descriptors with single-parent derivation chains and
/// interface lookup.
///
/// Grammar values and target-generator extensions register their
/// descriptors here so that holders of an erased handle can test
/// derivation and discover capabilities without downcasting.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    descs: Vec<TypeDesc>,
    by_name: NamedMap<TypeDescId>,
    interfaces: NamedMap<InterfaceId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Registering an already-known name returns
    /// the existing id unchanged.
    pub fn register(&mut self, name: &str, parent: Option<TypeDescId>) -> TypeDescId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = TypeDescId(self.descs.len() as u32);
        self.descs.push(TypeDesc {
            name: name.to_owned(),
            parent,
            interfaces: vec![],
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn register_interface(&mut self, name: &str) -> InterfaceId {
        if let Some(id) = self.interfaces.get(name) {
            return *id;
        }
        let id = InterfaceId(self.interfaces.len() as u32);
        self.interfaces.insert(name, id);
        id
    }

    /// Declare that `ty` implements `interface`.
    pub fn declare_interface(&mut self, ty: TypeDescId, interface: InterfaceId) {
        let desc = &mut self.descs[ty.0 as usize];
        if !desc.interfaces.contains(&interface) {
            desc.interfaces.push(interface);
        }
    }

    pub fn get(&self, id: TypeDescId) -> &TypeDesc {
        &self.descs[id.0 as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<TypeDescId> {
        self.by_name.get(name).copied()
    }

    /// Walk the parent chain to test derivation. A type derives from
    /// itself.
    pub fn is_derived_from(&self, ty: TypeDescId, ancestor: TypeDescId) -> bool {
        let mut current = Some(ty);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.descs[id.0 as usize].parent;
        }
        false
    }

    /// Dynamic interface lookup: whether `ty` or any ancestor declares
    /// `interface`.
    pub fn implements(&self, ty: TypeDescId, interface: InterfaceId) -> bool {
        let mut current = Some(ty);
        while let Some(id) = current {
            let desc = &self.descs[id.0 as usize];
            if desc.interfaces.contains(&interface) {
                return true;
            }
            current = desc.parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::TypeRegistry;

    #[test]
    fn test_derivation_chain() {
        let mut registry = TypeRegistry::new();
        let node = registry.register("Node", None);
        let statement = registry.register("Statement", Some(node));
        let loop_stmt = registry.register("Loop", Some(statement));
        let other = registry.register("Other", None);

        assert!(registry.is_derived_from(loop_stmt, node));
        assert!(registry.is_derived_from(loop_stmt, loop_stmt));
        assert!(!registry.is_derived_from(node, loop_stmt));
        assert!(!registry.is_derived_from(other, node));
    }

    #[test]
    fn test_interface_lookup_walks_parents() {
        let mut registry = TypeRegistry::new();
        let containing = registry.register_interface("Containing");
        let base = registry.register("Base", None);
        let derived = registry.register("Derived", Some(base));
        registry.declare_interface(base, containing);

        assert!(registry.implements(derived, containing));
    }
}
