//! Lexically scoped symbol table with free-variable promotion.
//!
//! Scopes form a stack: the bottom scope is the global program, and one scope
//! is pushed per function-body compilation. Resolving a name defined in an
//! enclosing function re-binds it as a `Free` symbol in every scope between
//! the definer and the user; each scope retains the captured originals so the
//! compiler can emit the capture sequence when the function closes.

use ahash::AHashMap;

/// Where a resolved name lives, which decides the load opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    /// Captured from an enclosing function; loaded from the closure.
    Free,
    /// The name of the function currently being compiled, for self-reference.
    Function,
}

/// A resolved binding: name, scope, and slot index within that scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

#[derive(Debug, Default)]
struct Scope {
    store: AHashMap<String, Symbol>,
    /// Original symbols captured from enclosing scopes, in capture order.
    free_symbols: Vec<Symbol>,
    num_definitions: usize,
}

/// Facts about a scope returned when it is popped.
#[derive(Debug)]
pub struct LeftScope {
    /// The captured originals, in the order `OpGetFree` indexes them.
    pub free_symbols: Vec<Symbol>,
    /// How many local slots the scope defined.
    pub num_definitions: usize,
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table with only the global scope. Built-ins are registered
    /// separately so hosts control the ordered list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Pushes a fresh scope for a function body.
    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pops the current scope, returning its free list and local count.
    ///
    /// # Panics
    /// Panics if called on the global scope; enter/leave calls are paired by
    /// the compiler.
    pub fn leave_scope(&mut self) -> LeftScope {
        assert!(self.scopes.len() > 1, "cannot leave the global scope");
        let scope = self.scopes.pop().expect("scope stack is never empty");
        LeftScope {
            free_symbols: scope.free_symbols,
            num_definitions: scope.num_definitions,
        }
    }

    /// Defines `name` in the current scope, allocating the next slot index.
    ///
    /// Redefinition allocates a fresh slot; the store simply forgets the old
    /// binding, which is what lets a session re-`let` a name.
    pub fn define(&mut self, name: &str) -> Symbol {
        let depth = self.scopes.len() - 1;
        let scope_kind = if depth == 0 {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let scope = &mut self.scopes[depth];
        let symbol = Symbol {
            name: name.to_string(),
            scope: scope_kind,
            index: scope.num_definitions,
        };
        scope.num_definitions += 1;
        scope.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Registers a built-in at its fixed position in the ordered list.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.scopes[0].store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Binds the enclosing function's own name in the current scope.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        let depth = self.scopes.len() - 1;
        self.scopes[depth].store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Resolves `name`, promoting across scopes as needed.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        self.resolve_at(self.scopes.len() - 1, name)
    }

    fn resolve_at(&mut self, depth: usize, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.scopes[depth].store.get(name) {
            return Some(symbol.clone());
        }
        if depth == 0 {
            return None;
        }
        let outer = self.resolve_at(depth - 1, name)?;
        match outer.scope {
            // Globals and built-ins are reachable from any depth directly.
            SymbolScope::Global | SymbolScope::Builtin => Some(outer),
            _ => Some(self.promote_free(depth, outer)),
        }
    }

    /// Records `original` in the free list at `depth` and re-binds the name
    /// there as a `Free` symbol. The original is retained because the
    /// enclosing compiler needs its scope and index to emit the capture.
    fn promote_free(&mut self, depth: usize, original: Symbol) -> Symbol {
        let scope = &mut self.scopes[depth];
        scope.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name,
            scope: SymbolScope::Free,
            index: scope.free_symbols.len() - 1,
        };
        scope.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(name: &str, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope: SymbolScope::Global,
            index,
        }
    }

    fn local(name: &str, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope: SymbolScope::Local,
            index,
        }
    }

    #[test]
    fn define_and_resolve_globals() {
        let mut table = SymbolTable::new();
        assert_eq!(table.define("a"), global("a", 0));
        assert_eq!(table.define("b"), global("b", 1));
        assert_eq!(table.resolve("a"), Some(global("a", 0)));
        assert_eq!(table.resolve("b"), Some(global("b", 1)));
        assert_eq!(table.resolve("missing"), None);
    }

    #[test]
    fn locals_shadow_and_globals_stay_reachable() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.enter_scope();
        table.define("a");
        table.define("b");
        assert_eq!(table.resolve("a"), Some(local("a", 0)));
        assert_eq!(table.resolve("b"), Some(local("b", 1)));
        let left = table.leave_scope();
        assert_eq!(left.num_definitions, 2);
        assert_eq!(table.resolve("a"), Some(global("a", 0)));
    }

    #[test]
    fn builtins_resolve_from_any_depth_without_capture() {
        let mut table = SymbolTable::new();
        let expected = Symbol {
            name: "len".to_string(),
            scope: SymbolScope::Builtin,
            index: 0,
        };
        table.define_builtin(0, "len");
        table.enter_scope();
        table.enter_scope();
        assert_eq!(table.resolve("len"), Some(expected));
        assert!(table.leave_scope().free_symbols.is_empty());
    }

    #[test]
    fn free_variables_are_promoted_through_intermediate_scopes() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.enter_scope();
        table.define("b");
        table.enter_scope();
        table.define("c");

        // `a` is global: no promotion. `b` is an enclosing local: promoted.
        assert_eq!(table.resolve("a"), Some(global("a", 0)));
        assert_eq!(
            table.resolve("b"),
            Some(Symbol {
                name: "b".to_string(),
                scope: SymbolScope::Free,
                index: 0,
            })
        );

        let inner = table.leave_scope();
        assert_eq!(inner.free_symbols, vec![local("b", 0)]);
    }

    #[test]
    fn doubly_nested_capture_promotes_at_every_level() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.define("a");
        table.enter_scope();
        table.enter_scope();

        let resolved = table.resolve("a").expect("a resolves");
        assert_eq!(resolved.scope, SymbolScope::Free);
        assert_eq!(resolved.index, 0);

        // The innermost scope captured the middle scope's promotion, which
        // itself captured the defining local.
        let innermost = table.leave_scope();
        assert_eq!(
            innermost.free_symbols,
            vec![Symbol {
                name: "a".to_string(),
                scope: SymbolScope::Free,
                index: 0,
            }]
        );
        let middle = table.leave_scope();
        assert_eq!(middle.free_symbols, vec![local("a", 0)]);
    }

    #[test]
    fn function_name_resolves_to_function_scope() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.define_function_name("outer");
        assert_eq!(
            table.resolve("outer"),
            Some(Symbol {
                name: "outer".to_string(),
                scope: SymbolScope::Function,
                index: 0,
            })
        );
    }

    #[test]
    fn shadowing_the_function_name_wins() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.define_function_name("f");
        table.define("f");
        assert_eq!(table.resolve("f"), Some(local("f", 0)));
    }
}
