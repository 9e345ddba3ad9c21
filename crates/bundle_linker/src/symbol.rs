//! Stable two-level identifier table with union-find merge.
//!
//! Grounded on the REDESIGN FLAGS note in spec.md §9: "implement union-find
//! as two flat arrays indexed by a two-level symbol reference (outer =
//! module index, inner = symbol index)". `SymbolMap` stores one `Vec<Symbol>`
//! per module (the outer array) and each [`Symbol`] carries its own `link`
//! (a pointer back into the same space) rather than maintaining a second
//! parallel structure, which keeps `follow`/`union` allocation-free.

use ahashmap::AHashMap;

/// A stable handle to a symbol: `(module index, symbol index within that
/// module)`. Never a pointer — modules and their symbol vectors are
/// arena-indexed, matching the "never graph-of-objects ownership" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref {
    pub source_index: u32,
    pub inner_index: u32,
}

impl Ref {
    pub fn new(source_index: u32, inner_index: u32) -> Self {
        Self {
            source_index,
            inner_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Unbound,
    Hoisted,
    HoistedFunction,
    Other,
    Class,
    Generator,
    Import,
    ConstOrLet,
    Label,
}

impl SymbolKind {
    pub fn is_hoisted(&self) -> bool {
        matches!(self, SymbolKind::Hoisted | SymbolKind::HoistedFunction)
    }
}

/// When a symbol is bound to a CJS-style import, codegen must rewrite every
/// use as a property access on the namespace object rather than a bare
/// identifier (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceAlias {
    pub namespace_ref: Ref,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub use_count_estimate: u32,
    pub namespace_alias: Option<NamespaceAlias>,
    pub must_not_be_renamed: bool,
    /// Union-find parent. A symbol whose `link == self_ref` is a root.
    link: Ref,
}

/// Owns every module's symbol table and performs union-find merges across
/// module boundaries (an import-ref merged with its resolved export-ref, per
/// spec.md §4.3's second pass).
#[derive(Debug, Default)]
pub struct SymbolMap {
    tables: Vec<Vec<Symbol>>,
}

impl SymbolMap {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    /// Reserves a symbol table for a new module and returns its source
    /// index.
    pub fn new_module(&mut self) -> u32 {
        let idx = self.tables.len() as u32;
        self.tables.push(Vec::new());
        idx
    }

    pub fn declare(
        &mut self,
        source_index: u32,
        name: impl Into<String>,
        kind: SymbolKind,
    ) -> Ref {
        let table = &mut self.tables[source_index as usize];
        let inner_index = table.len() as u32;
        let this_ref = Ref::new(source_index, inner_index);
        table.push(Symbol {
            name: name.into(),
            kind,
            use_count_estimate: 0,
            namespace_alias: None,
            must_not_be_renamed: false,
            link: this_ref,
        });
        this_ref
    }

    pub fn get(&self, r: Ref) -> &Symbol {
        &self.tables[r.source_index as usize][r.inner_index as usize]
    }

    pub fn get_mut(&mut self, r: Ref) -> &mut Symbol {
        &mut self.tables[r.source_index as usize][r.inner_index as usize]
    }

    fn link_of(&self, r: Ref) -> Ref {
        self.tables[r.source_index as usize][r.inner_index as usize].link
    }

    fn set_link(&mut self, r: Ref, target: Ref) {
        self.tables[r.source_index as usize][r.inner_index as usize].link = target;
    }

    /// Finds the current root of `r`'s union-find chain, compressing the
    /// path as it walks. Safe to call mid-phase; `follow_all_symbols` is
    /// only required to run once, serially, before parallel readers (the
    /// chunk emitter) look at final names.
    pub fn follow(&mut self, r: Ref) -> Ref {
        let mut root = r;
        loop {
            let parent = self.link_of(root);
            if parent == root {
                break;
            }
            root = parent;
        }
        // path compression
        let mut cur = r;
        while cur != root {
            let next = self.link_of(cur);
            self.set_link(cur, root);
            cur = next;
        }
        root
    }

    /// Merges `a` and `b` into the same union-find set. The root of `a`'s
    /// chain is chosen to survive (matches `import_ref` being merged *into*
    /// `export_ref`'s chain in spec.md §4.3: `merge_into(import_ref, export_ref)`
    /// keeps `export_ref`'s root, which is the one codegen will have already
    /// emitted a declaration for).
    pub fn union(&mut self, a: Ref, b: Ref) {
        let root_a = self.follow(a);
        let root_b = self.follow(b);
        if root_a != root_b {
            self.set_link(root_a, root_b);
        }
    }

    /// Serial "final follow" pass required before any parallel reader in
    /// §4.9 reads symbol names (spec.md §5's shared-resource policy).
    pub fn follow_all_symbols(&mut self) {
        for source_index in 0..self.tables.len() as u32 {
            for inner_index in 0..self.tables[source_index as usize].len() as u32 {
                let r = Ref::new(source_index, inner_index);
                self.follow(r);
            }
        }
    }

    /// The final name of `r` after renaming/union-find have both settled.
    /// Callers should have renamed the *root* of every chain; this simply
    /// follows to the root (path is fully compressed by this point) and
    /// reads its name.
    pub fn final_name(&self, r: Ref) -> &str {
        let mut root = r;
        loop {
            let parent = self.link_of(root);
            if parent == root {
                break;
            }
            root = parent;
        }
        &self.get(root).name
    }

    pub fn module_count(&self) -> usize {
        self.tables.len()
    }

    pub fn symbols_in(&self, source_index: u32) -> impl Iterator<Item = (Ref, &Symbol)> {
        self.tables[source_index as usize]
            .iter()
            .enumerate()
            .map(move |(i, s)| (Ref::new(source_index, i as u32), s))
    }

    /// Every top-level unbound identifier across the whole graph, used by
    /// the renamer to seed its reserved-name set (spec.md §4.8).
    pub fn all_unbound_names(&self) -> AHashMap<String, ()> {
        let mut out = AHashMap::default();
        for table in &self.tables {
            for sym in table {
                if sym.kind == SymbolKind::Unbound {
                    out.insert(sym.name.clone(), ());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn union_find_converges_to_single_root() {
        let mut map = SymbolMap::new();
        let m0 = map.new_module();
        let m1 = map.new_module();
        let a = map.declare(m0, "a", SymbolKind::ConstOrLet);
        let b = map.declare(m1, "b_imported", SymbolKind::Import);
        map.union(b, a);
        assert_eq!(map.follow(b), map.follow(a));
    }

    #[test]
    fn path_compression_keeps_follow_stable() {
        let mut map = SymbolMap::new();
        let m0 = map.new_module();
        let a = map.declare(m0, "a", SymbolKind::ConstOrLet);
        let b = map.declare(m0, "b", SymbolKind::ConstOrLet);
        let c = map.declare(m0, "c", SymbolKind::ConstOrLet);
        map.union(a, b);
        map.union(b, c);
        let root = map.follow(a);
        assert_eq!(map.follow(b), root);
        assert_eq!(map.follow(c), root);
    }
}
