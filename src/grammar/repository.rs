use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, trace};

use crate::basic::NamedMap;

use super::{
    CharGroupDefinition, GrammarError, GrammarModule, GrammarValue, QualifiedName, ResolvedSymbol,
    SymbolDefinition, SymbolFlags, Term,
};

/// The persistent, mutable store of the grammar.
///
/// All grammar state is reachable from the root module by qualified
/// name. The repository carries a version counter that increments on
/// every mutation; caches built from grammar data (resolved symbols,
/// the lexer's NFA) remember the version they were built at and
/// revalidate on mismatch. Mutation is legal while a parse is running
/// and takes effect for parser states created afterwards.
pub struct GrammarRepository {
    root: Rc<RefCell<GrammarModule>>,
    version: u64,
    resolved: RefCell<HashMap<String, ResolvedSymbol>>,
}

impl Default for GrammarRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarRepository {
    pub fn new() -> Self {
        Self {
            root: GrammarModule::shared("root"),
            version: 1,
            resolved: RefCell::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> Rc<RefCell<GrammarModule>> {
        self.root.clone()
    }

    /// The current mutation counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn bump(&mut self) {
        self.version += 1;
        self.resolved.borrow_mut().clear();
    }

    /// Create (or fetch) the module at `name`, creating intermediate
    /// modules along the way.
    pub fn add_module(&mut self, name: &str) -> Result<Rc<RefCell<GrammarModule>>, GrammarError> {
        let qname = QualifiedName::parse(name);
        let mut current = self.root.clone();
        for part in &qname.parts {
            let existing = current.borrow().entries.get(part).cloned();
            let next = match existing {
                Some(GrammarValue::Module(module)) => module,
                Some(other) => {
                    trace!("add_module: `{part}` is a {}", other.kind());
                    return Err(GrammarError::WrongKind {
                        name: part.clone(),
                        expected: "module",
                    });
                }
                None => {
                    let module = GrammarModule::shared(part);
                    current
                        .borrow_mut()
                        .entries
                        .insert(part, GrammarValue::Module(module.clone()));
                    module
                }
            };
            current = next;
        }
        self.bump();
        Ok(current)
    }

    /// Store `value` under `name`. The parent path must already resolve
    /// to a module, and the leaf must be free: redefining a live name
    /// fails with [GrammarError::Redefinition] — remove it first.
    pub fn set_value(&mut self, name: &str, value: GrammarValue) -> Result<(), GrammarError> {
        let qname = QualifiedName::parse(name);
        let Some((leaf, path)) = qname.parts.split_last() else {
            return Err(GrammarError::NotFound(name.to_owned()));
        };
        let module = self.navigate_to_module(path, name)?;

        if let GrammarValue::Module(new_module) = &value {
            self.check_module_chain(new_module, name)?;
        }

        let mut module = module.borrow_mut();
        if module.entries.contains_key(leaf) {
            return Err(GrammarError::Redefinition(name.to_owned()));
        }
        debug!("grammar: defining `{name}` ({})", value.kind());
        module.entries.insert(leaf, value);
        drop(module);
        self.bump();
        Ok(())
    }

    /// Remove and return the value at `name`.
    pub fn remove_value(&mut self, name: &str) -> Result<GrammarValue, GrammarError> {
        let qname = QualifiedName::parse(name);
        let Some((leaf, path)) = qname.parts.split_last() else {
            return Err(GrammarError::NotFound(name.to_owned()));
        };
        let module = self.navigate_to_module(path, name)?;
        let removed = module
            .borrow_mut()
            .entries
            .remove(leaf)
            .ok_or_else(|| GrammarError::NotFound(name.to_owned()))?;
        debug!("grammar: removed `{name}`");
        self.bump();
        Ok(removed)
    }

    /// Install a reference entry: lookups of `from` transparently yield
    /// the value at `to`.
    pub fn add_reference(&mut self, from: &str, to: &str) -> Result<(), GrammarError> {
        self.set_value(from, GrammarValue::Reference(QualifiedName::parse(to)))
    }

    /// Fetch the value at `name` together with its owning module.
    /// References are followed transparently; reference cycles fail.
    pub fn get_value(
        &self,
        name: &str,
    ) -> Result<(GrammarValue, Rc<RefCell<GrammarModule>>), GrammarError> {
        let qname = QualifiedName::parse(name);
        let mut guard = HashSet::new();
        self.lookup(&qname, None, &mut guard)
    }

    /// Like [GrammarRepository::get_value], resolving unanchored names
    /// against `context` (falling back through its parent chain) before
    /// the root.
    pub fn get_value_in(
        &self,
        qname: &QualifiedName,
        context: Option<&Rc<RefCell<GrammarModule>>>,
    ) -> Result<(GrammarValue, Rc<RefCell<GrammarModule>>), GrammarError> {
        let mut guard = HashSet::new();
        self.lookup(qname, context, &mut guard)
    }

    fn lookup(
        &self,
        qname: &QualifiedName,
        context: Option<&Rc<RefCell<GrammarModule>>>,
        guard: &mut HashSet<String>,
    ) -> Result<(GrammarValue, Rc<RefCell<GrammarModule>>), GrammarError> {
        if !guard.insert(qname.to_string()) {
            return Err(GrammarError::CircularReference(qname.to_string()));
        }

        let start = if qname.rooted { None } else { context };
        if let Some(module) = start {
            // Try the context module, then its parent chain.
            let mut chain_guard = HashSet::new();
            let mut current = module.clone();
            loop {
                if let Ok(found) = self.lookup_from(&current, qname, guard) {
                    return Ok(found);
                }
                let module_name = current.borrow().name.clone();
                if !chain_guard.insert(module_name.clone()) {
                    return Err(GrammarError::CircularModuleChain(module_name));
                }
                let parent = current.borrow().parent.clone();
                match parent {
                    Some(parent_name) => {
                        let (value, _) = self.lookup(&parent_name, None, guard)?;
                        let GrammarValue::Module(parent_module) = value else {
                            return Err(GrammarError::WrongKind {
                                name: parent_name.to_string(),
                                expected: "module",
                            });
                        };
                        current = parent_module;
                    }
                    None => break,
                }
            }
        }
        self.lookup_from(&self.root, qname, guard)
    }

    fn lookup_from(
        &self,
        start: &Rc<RefCell<GrammarModule>>,
        qname: &QualifiedName,
        guard: &mut HashSet<String>,
    ) -> Result<(GrammarValue, Rc<RefCell<GrammarModule>>), GrammarError> {
        let mut owner = start.clone();
        let mut value: Option<GrammarValue> = None;
        for (index, part) in qname.parts.iter().enumerate() {
            let entry = owner
                .borrow()
                .entries
                .get(part)
                .cloned()
                .ok_or_else(|| GrammarError::NotFound(qname.to_string()))?;
            let entry = self.follow_reference(entry, &owner, guard)?;
            if index + 1 == qname.parts.len() {
                value = Some(entry);
            } else {
                let GrammarValue::Module(module) = entry else {
                    return Err(GrammarError::WrongKind {
                        name: part.clone(),
                        expected: "module",
                    });
                };
                owner = module;
            }
        }
        value
            .map(|value| (value, owner))
            .ok_or_else(|| GrammarError::NotFound(qname.to_string()))
    }

    fn follow_reference(
        &self,
        value: GrammarValue,
        owner: &Rc<RefCell<GrammarModule>>,
        guard: &mut HashSet<String>,
    ) -> Result<GrammarValue, GrammarError> {
        match value {
            GrammarValue::Reference(target) => {
                let (resolved, _) = self.lookup(&target, Some(owner), guard)?;
                Ok(resolved)
            }
            other => Ok(other),
        }
    }

    /// Fetch a named char group definition.
    pub fn get_char_group(
        &self,
        qname: &QualifiedName,
        context: Option<&Rc<RefCell<GrammarModule>>>,
    ) -> Result<Rc<CharGroupDefinition>, GrammarError> {
        let (value, _) = self.get_value_in(qname, context)?;
        match value {
            GrammarValue::CharGroup(group) => Ok(group),
            _ => Err(GrammarError::WrongKind {
                name: qname.to_string(),
                expected: "char group",
            }),
        }
    }

    /// Resolve a symbol to its flattened view, walking the inheritance
    /// chain field by field. Results are cached at the current version.
    pub fn resolve_symbol(
        &self,
        qname: &QualifiedName,
        context: Option<&Rc<RefCell<GrammarModule>>>,
    ) -> Result<ResolvedSymbol, GrammarError> {
        let key = qname.to_string();
        if let Some(cached) = self.resolved.borrow().get(&key) {
            if cached.version == self.version {
                return Ok(cached.clone());
            }
        }

        let (value, owner) = self.get_value_in(qname, context)?;
        let GrammarValue::Symbol(symbol) = value else {
            return Err(GrammarError::WrongKind {
                name: key,
                expected: "symbol",
            });
        };

        let resolved = self.flatten_symbol(&key, symbol, owner)?;
        self.resolved.borrow_mut().insert(key, resolved.clone());
        Ok(resolved)
    }

    fn flatten_symbol(
        &self,
        name: &str,
        symbol: Rc<SymbolDefinition>,
        owner: Rc<RefCell<GrammarModule>>,
    ) -> Result<ResolvedSymbol, GrammarError> {
        let mut term = None;
        let mut handler = None;
        let mut vars: Option<NamedMap<_>> = None;
        let mut flags = None;
        let mut priority = None;

        let mut visited: HashSet<*const SymbolDefinition> = HashSet::new();
        let mut current = symbol;
        let mut current_owner = owner;
        loop {
            if !visited.insert(Rc::as_ptr(&current)) {
                return Err(GrammarError::CircularInheritance(name.to_owned()));
            }
            term = term.or_else(|| current.term.clone());
            handler = handler.or_else(|| current.handler.clone());
            flags = flags.or(current.flags);
            priority = priority.or(current.priority);
            if vars.is_none() {
                vars = current.vars.clone();
            }

            let Some(parent_name) = current.parent.clone() else {
                break;
            };
            let (value, parent_owner) =
                self.get_value_in(&parent_name, Some(&current_owner))?;
            let GrammarValue::Symbol(parent) = value else {
                return Err(GrammarError::WrongKind {
                    name: parent_name.to_string(),
                    expected: "symbol",
                });
            };
            current = parent;
            current_owner = parent_owner;
        }

        let term = term.ok_or(GrammarError::WrongKind {
            name: name.to_owned(),
            expected: "term-bearing symbol",
        })?;

        Ok(ResolvedSymbol {
            name: name.to_owned(),
            term,
            handler,
            vars: vars.unwrap_or_default(),
            flags: flags.unwrap_or(SymbolFlags::NONE),
            priority: priority.unwrap_or(0),
            version: self.version,
        })
    }

    /// Hook a production into a declared parsing dimension: the
    /// dimension's target symbol (an alternate) gains a new branch
    /// referencing `prod`, weighted by `priority`.
    pub fn hook_into_dimension(
        &mut self,
        dimension: &str,
        prod: &str,
        priority: i32,
    ) -> Result<(), GrammarError> {
        let (value, _) = self.get_value(dimension)?;
        let GrammarValue::Dimension(dim) = value else {
            return Err(GrammarError::WrongKind {
                name: dimension.to_owned(),
                expected: "parsing dimension",
            });
        };
        let target = dim.target.to_string();
        let resolved = self.resolve_symbol(&dim.target, None)?;
        let Term::Alternate { terms, priorities } = resolved.term.as_ref() else {
            return Err(GrammarError::WrongKind {
                name: target,
                expected: "alternate-bearing symbol",
            });
        };

        let mut terms = terms.clone();
        let mut priorities = priorities.clone();
        terms.insert(0, Term::reference(prod));
        priorities.insert(0, priority);

        let (old, _) = self.get_value(&target)?;
        let GrammarValue::Symbol(old_symbol) = old else {
            return Err(GrammarError::WrongKind {
                name: target,
                expected: "symbol",
            });
        };
        let mut replacement = (*old_symbol).clone();
        replacement.term = Some(Term::alternate_with(terms, priorities));
        self.remove_value(&target)?;
        self.set_value(&target, GrammarValue::Symbol(Rc::new(replacement)))?;
        debug!("grammar: hooked `{prod}` into dimension `{dimension}`");
        Ok(())
    }

    /// Reverse [GrammarRepository::hook_into_dimension] by production
    /// name.
    pub fn unhook_from_dimension(
        &mut self,
        dimension: &str,
        prod: &str,
    ) -> Result<(), GrammarError> {
        let (value, _) = self.get_value(dimension)?;
        let GrammarValue::Dimension(dim) = value else {
            return Err(GrammarError::WrongKind {
                name: dimension.to_owned(),
                expected: "parsing dimension",
            });
        };
        let target = dim.target.to_string();
        let resolved = self.resolve_symbol(&dim.target, None)?;
        let Term::Alternate { terms, priorities } = resolved.term.as_ref() else {
            return Err(GrammarError::WrongKind {
                name: target,
                expected: "alternate-bearing symbol",
            });
        };

        let removed_name = QualifiedName::parse(prod);
        let mut kept_terms = vec![];
        let mut kept_priorities = vec![];
        for (term, priority) in terms.iter().zip(priorities.iter()) {
            let is_hooked = matches!(
                term.as_ref(),
                Term::Reference { target } if *target == removed_name
            );
            if !is_hooked {
                kept_terms.push(term.clone());
                kept_priorities.push(*priority);
            }
        }

        let (old, _) = self.get_value(&target)?;
        let GrammarValue::Symbol(old_symbol) = old else {
            return Err(GrammarError::WrongKind {
                name: target,
                expected: "symbol",
            });
        };
        let mut replacement = (*old_symbol).clone();
        replacement.term = Some(Term::alternate_with(kept_terms, kept_priorities));
        self.remove_value(&target)?;
        self.set_value(&target, GrammarValue::Symbol(Rc::new(replacement)))?;
        debug!("grammar: unhooked `{prod}` from dimension `{dimension}`");
        Ok(())
    }

    fn navigate_to_module(
        &self,
        path: &[String],
        full_name: &str,
    ) -> Result<Rc<RefCell<GrammarModule>>, GrammarError> {
        let mut current = self.root.clone();
        for part in path {
            let entry = current
                .borrow()
                .entries
                .get(part)
                .cloned()
                .ok_or_else(|| GrammarError::NotFound(full_name.to_owned()))?;
            let mut guard = HashSet::new();
            let entry = self.follow_reference(entry, &current, &mut guard)?;
            let GrammarValue::Module(module) = entry else {
                return Err(GrammarError::WrongKind {
                    name: part.clone(),
                    expected: "module",
                });
            };
            current = module;
        }
        Ok(current)
    }

    fn check_module_chain(
        &self,
        module: &Rc<RefCell<GrammarModule>>,
        name: &str,
    ) -> Result<(), GrammarError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut parent = module.borrow().parent.clone();
        while let Some(parent_name) = parent {
            if !visited.insert(parent_name.to_string()) {
                return Err(GrammarError::CircularModuleChain(name.to_owned()));
            }
            let Ok((value, _)) = self.get_value_in(&parent_name, None) else {
                // Parents may be installed later; the chain is rechecked
                // on lookup.
                return Ok(());
            };
            let GrammarValue::Module(parent_module) = value else {
                return Err(GrammarError::WrongKind {
                    name: parent_name.to_string(),
                    expected: "module",
                });
            };
            if Rc::ptr_eq(&parent_module, module) {
                return Err(GrammarError::CircularModuleChain(name.to_owned()));
            }
            parent = parent_module.borrow().parent.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::grammar::{
        GrammarError, GrammarValue, QualifiedName, SymbolDefinition, SymbolFlags, Term,
    };

    use super::GrammarRepository;

    fn symbol(name: &str) -> GrammarValue {
        GrammarValue::Symbol(Rc::new(
            SymbolDefinition::new(name).with_term(Term::constant(name)),
        ))
    }

    #[test]
    fn test_set_get_remove_roundtrip() {
        let mut repo = GrammarRepository::new();
        repo.add_module("root.Main").unwrap();
        repo.set_value("root.Main.Statement", symbol("Statement"))
            .unwrap();

        let (value, owner) = repo.get_value("root.Main.Statement").unwrap();
        assert!(matches!(value, GrammarValue::Symbol(_)));
        assert_eq!(owner.borrow().name, "Main");

        repo.remove_value("root.Main.Statement").unwrap();
        assert!(matches!(
            repo.get_value("root.Main.Statement"),
            Err(GrammarError::NotFound(name)) if name == "root.Main.Statement"
        ));
    }

    #[test]
    fn test_mutation_isolation() {
        // Adding then removing a production leaves lookups
        // indistinguishable from never having added it.
        let mut repo = GrammarRepository::new();
        repo.add_module("root.Main").unwrap();
        let before = repo.get_value("root.Main.Extra").unwrap_err();
        repo.set_value("root.Main.Extra", symbol("Extra")).unwrap();
        repo.remove_value("root.Main.Extra").unwrap();
        assert_eq!(repo.get_value("root.Main.Extra").unwrap_err(), before);
    }

    #[test]
    fn test_redefinition_rejected() {
        let mut repo = GrammarRepository::new();
        repo.add_module("root.Main").unwrap();
        repo.set_value("root.Main.Statement", symbol("Statement"))
            .unwrap();
        assert!(matches!(
            repo.set_value("root.Main.Statement", symbol("Statement")),
            Err(GrammarError::Redefinition(name)) if name == "root.Main.Statement"
        ));
    }

    #[test]
    fn test_version_bumps_on_mutation() {
        let mut repo = GrammarRepository::new();
        let v0 = repo.version();
        repo.add_module("root.Main").unwrap();
        let v1 = repo.version();
        assert!(v1 > v0);
        repo.set_value("root.Main.Statement", symbol("Statement"))
            .unwrap();
        assert!(repo.version() > v1);
    }

    #[test]
    fn test_references_are_transparent() {
        let mut repo = GrammarRepository::new();
        repo.add_module("root.Main").unwrap();
        repo.set_value("root.Main.Statement", symbol("Statement"))
            .unwrap();
        repo.add_reference("root.Main.Alias", "root.Main.Statement")
            .unwrap();

        let (value, _) = repo.get_value("root.Main.Alias").unwrap();
        assert!(matches!(value, GrammarValue::Symbol(_)));
    }

    #[test]
    fn test_reference_cycle_detected() {
        let mut repo = GrammarRepository::new();
        repo.add_module("root.Main").unwrap();
        repo.add_reference("root.Main.A", "root.Main.B").unwrap();
        repo.add_reference("root.Main.B", "root.Main.A").unwrap();

        assert!(matches!(
            repo.get_value("root.Main.A"),
            Err(GrammarError::CircularReference(_))
        ));
    }

    #[test]
    fn test_symbol_inheritance_fills_missing_fields() {
        let mut repo = GrammarRepository::new();
        repo.add_module("root.Main").unwrap();
        repo.set_value(
            "root.Main.Base",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("Base")
                    .with_term(Term::constant("base"))
                    .with_flags(SymbolFlags::ROOT_PROD)
                    .with_priority(5),
            )),
        )
        .unwrap();
        repo.set_value(
            "root.Main.Derived",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("Derived")
                    .with_parent(QualifiedName::parse("root.Main.Base"))
                    .with_priority(9),
            )),
        )
        .unwrap();

        let resolved = repo
            .resolve_symbol(&QualifiedName::parse("root.Main.Derived"), None)
            .unwrap();
        // Own field wins, missing fields come from the parent.
        assert_eq!(resolved.priority, 9);
        assert!(resolved.flags.contains(SymbolFlags::ROOT_PROD));
        assert!(matches!(resolved.term.as_ref(), Term::Const { text } if text == "base"));
    }

    #[test]
    fn test_circular_inheritance_detected() {
        let mut repo = GrammarRepository::new();
        repo.add_module("root.Main").unwrap();
        repo.set_value(
            "root.Main.A",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("A").with_parent(QualifiedName::parse("root.Main.B")),
            )),
        )
        .unwrap();
        repo.set_value(
            "root.Main.B",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("B").with_parent(QualifiedName::parse("root.Main.A")),
            )),
        )
        .unwrap();

        assert!(matches!(
            repo.resolve_symbol(&QualifiedName::parse("root.Main.A"), None),
            Err(GrammarError::CircularInheritance(_))
        ));
    }

    #[test]
    fn test_resolution_cache_invalidates_on_mutation() {
        let mut repo = GrammarRepository::new();
        repo.add_module("root.Main").unwrap();
        repo.set_value(
            "root.Main.Prod",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("Prod")
                    .with_term(Term::constant("old"))
                    .with_priority(1),
            )),
        )
        .unwrap();

        let first = repo
            .resolve_symbol(&QualifiedName::parse("root.Main.Prod"), None)
            .unwrap();
        assert_eq!(first.priority, 1);

        repo.remove_value("root.Main.Prod").unwrap();
        repo.set_value(
            "root.Main.Prod",
            GrammarValue::Symbol(Rc::new(
                SymbolDefinition::new("Prod")
                    .with_term(Term::constant("new"))
                    .with_priority(2),
            )),
        )
        .unwrap();

        let second = repo
            .resolve_symbol(&QualifiedName::parse("root.Main.Prod"), None)
            .unwrap();
        assert_eq!(second.priority, 2);
    }
}
