//! The linker's top-level arena: every module, the shared symbol table, the
//! entry-point list and the config that governs a single link. Analogous in
//! role (not in algorithm — see `tree_shaker.rs` for the BFS) to
//! `unused_finder::graph::Graph`, which is likewise "one arena plus one
//! path-to-id map, mutated in place across passes".

use ahashmap::AHashMap;

use crate::bitset::BitSet;
use crate::config::LinkerConfig;
use crate::model::{
    EntryPoint, EntryPointStatus, Module, ModuleFlags, Part, ResolvedExport, SourceIndex,
};
use crate::runtime::{self, RuntimeRefs};
use crate::symbol::{Ref, SymbolKind, SymbolMap};

pub struct LinkGraph {
    pub modules: Vec<Module>,
    pub symbols: SymbolMap,
    pub entry_points: Vec<EntryPoint>,
    pub config: LinkerConfig,
    pub runtime: RuntimeRefs,
    pub path_to_source_index: AHashMap<String, SourceIndex>,
}

impl LinkGraph {
    pub fn module(&self, source_index: SourceIndex) -> &Module {
        &self.modules[source_index as usize]
    }
    pub fn module_mut(&mut self, source_index: SourceIndex) -> &mut Module {
        &mut self.modules[source_index as usize]
    }

    pub fn entry_point_count(&self) -> usize {
        self.entry_points.len()
    }

    /// Appends a module imported dynamically via `import()` to the entry
    /// list, as §4.1 requires when code splitting is enabled. Entry points
    /// are added "in user-specified order first, then in the order dynamic
    /// imports are discovered" (spec.md §5); callers must only invoke this
    /// after the user-specified entries have all been registered.
    ///
    /// Every `BitSet` already allocated in the graph was sized to the
    /// entry-point count at `build()` time, so adding a bit here must grow
    /// each of them in place (`ModuleClassifier` is the only caller, and it
    /// runs before any phase sets a bit, so every grown set is still all
    /// zero).
    pub fn add_dynamic_entry_point(&mut self, source_index: SourceIndex) -> usize {
        let bit = self.entry_points.len();
        self.entry_points.push(EntryPoint {
            source_index,
            bit,
            status: EntryPointStatus::Dynamic,
        });
        self.module_mut(source_index)
            .flags
            .insert(ModuleFlags::IS_ENTRY_POINT);

        let new_bit_count = self.entry_points.len();
        for module in &mut self.modules {
            module.entry_bits.grow(new_bit_count);
            for part in &mut module.parts {
                part.entry_bits.grow(new_bit_count);
            }
        }
        bit
    }

    pub fn new_part(&self) -> Part {
        Part::new(self.entry_point_count())
    }

    pub fn new_bitset(&self) -> BitSet {
        BitSet::new(self.entry_point_count())
    }
}

/// Constructs a [`LinkGraph`] one module/part/import-record at a time. This
/// is the replacement for real parsing (out of scope, spec.md §1): tests and
/// the CLI's JSON-document loader both go through this builder rather than
/// hand-assembling `Module`/`Part` literals with correctly-synchronized
/// indices.
pub struct ModuleGraphBuilder {
    config: LinkerConfig,
    symbols: SymbolMap,
    modules: Vec<Module>,
    path_to_source_index: AHashMap<String, SourceIndex>,
    user_entry_paths: Vec<String>,
    entry_point_count_hint: usize,
}

impl ModuleGraphBuilder {
    pub fn new(config: LinkerConfig, entry_point_count_hint: usize) -> Self {
        let mut symbols = SymbolMap::new();
        // Reserve source index 0 for the runtime module up front so every
        // real module the caller adds afterwards lands at index >= 1, and
        // `build()` only has to fill the reserved slot in rather than
        // renumber anything.
        let reserved = symbols.new_module();
        debug_assert_eq!(reserved, runtime::RUNTIME_SOURCE_INDEX);
        Self {
            config,
            symbols,
            modules: Vec::new(),
            path_to_source_index: AHashMap::default(),
            user_entry_paths: Vec::new(),
            entry_point_count_hint,
        }
    }

    /// Registers a module and returns its source index. `abs_path` must be
    /// unique and absolute-looking (callers, not this builder, enforce
    /// actual filesystem absoluteness — see the `abspath` crate at the CLI
    /// boundary).
    pub fn add_module(&mut self, abs_path: impl Into<String>, flags: ModuleFlags) -> SourceIndex {
        let abs_path = abs_path.into();
        let source_index = self.symbols.new_module();
        debug_assert_eq!(
            source_index as usize,
            self.modules.len() + 1,
            "source index must line up with the runtime-reserved offset"
        );
        // exportsRef/moduleRef are essential per-module attributes (spec
        // data model §3), allocated up front so every phase from export
        // resolution onward can rely on them existing; wrapperRef is
        // allocated lazily, only for modules the classifier marks cjsWrap.
        let exports_ref = self.symbols.declare(source_index, "exports", SymbolKind::Other);
        let module_ref = self.symbols.declare(source_index, "module", SymbolKind::Other);
        self.modules.push(Module {
            source_index,
            abs_path: abs_path.clone(),
            flags,
            classifier: Default::default(),
            output_format: self.config.output_format.into(),
            module_name: self.config.module_name.clone(),
            parts: Vec::new(),
            import_records: Vec::new(),
            named_imports: Default::default(),
            named_exports: Default::default(),
            export_star_import_record_indices: Vec::new(),
            resolved_exports: Default::default(),
            exports_ref: Some(exports_ref),
            module_ref: Some(module_ref),
            wrapper_ref: None,
            ns_export_part_index: None,
            entry_export_tail_part_index: None,
            cjs_wrapper_part_index: None,
            entry_bits: BitSet::new(self.entry_point_count_hint),
            distance_from_entry_point: None,
        });
        self.path_to_source_index.insert(abs_path, source_index);
        source_index
    }

    pub fn declare_symbol(
        &mut self,
        source_index: SourceIndex,
        name: impl Into<String>,
        kind: SymbolKind,
    ) -> Ref {
        self.symbols.declare(source_index, name, kind)
    }

    pub fn add_part(&mut self, source_index: SourceIndex, part: Part) -> usize {
        let module = &mut self.modules[(source_index - 1) as usize];
        module.parts.push(part);
        module.parts.len() - 1
    }

    pub fn add_import_record(
        &mut self,
        source_index: SourceIndex,
        record: crate::model::ImportRecord,
    ) -> usize {
        let module = &mut self.modules[(source_index - 1) as usize];
        module.import_records.push(record);
        module.import_records.len() - 1
    }

    pub fn add_named_export(&mut self, source_index: SourceIndex, alias: impl Into<String>, r: Ref) {
        self.modules[(source_index - 1) as usize]
            .named_exports
            .insert(alias.into(), r);
    }

    pub fn add_named_import(
        &mut self,
        source_index: SourceIndex,
        import_ref: Ref,
        named_import: crate::model::NamedImport,
    ) {
        self.modules[(source_index - 1) as usize]
            .named_imports
            .insert(import_ref, named_import);
    }

    pub fn add_export_star(&mut self, source_index: SourceIndex, import_record_index: usize) {
        self.modules[(source_index - 1) as usize]
            .export_star_import_record_indices
            .push(import_record_index);
    }

    pub fn mark_user_entry_point(&mut self, abs_path: &str) {
        self.user_entry_paths.push(abs_path.to_string());
    }

    pub fn resolve_path(&self, abs_path: &str) -> Option<SourceIndex> {
        self.path_to_source_index.get(abs_path).copied()
    }

    pub fn build(mut self) -> LinkGraph {
        let entry_point_count = self.user_entry_paths.len();
        let mut entry_points = Vec::with_capacity(entry_point_count);
        for (bit, path) in self.user_entry_paths.iter().enumerate() {
            let source_index = *self
                .path_to_source_index
                .get(path)
                .unwrap_or_else(|| panic!("entry point {path} was never added as a module"));
            entry_points.push(EntryPoint {
                source_index,
                bit,
                status: EntryPointStatus::UserSpecified,
            });
            self.modules[(source_index - 1) as usize]
                .flags
                .insert(ModuleFlags::IS_ENTRY_POINT);
        }

        // Resize every bitset now that the true entry-point count is known;
        // the hint given at construction time may have been wrong (tests
        // often don't know it up front).
        for module in &mut self.modules {
            module.entry_bits = BitSet::new(entry_point_count);
            for part in &mut module.parts {
                part.entry_bits = BitSet::new(entry_point_count);
            }
        }

        let (runtime_module, runtime_refs) =
            runtime::build_runtime_module(&mut self.symbols, entry_point_count);

        let mut modules = Vec::with_capacity(self.modules.len() + 1);
        modules.push(runtime_module);
        modules.extend(self.modules);
        debug_assert!(modules
            .iter()
            .enumerate()
            .all(|(i, m)| m.source_index as usize == i));

        let mut path_to_source_index = self.path_to_source_index;
        path_to_source_index.insert("<runtime>".to_string(), runtime::RUNTIME_SOURCE_INDEX);

        LinkGraph {
            modules,
            symbols: self.symbols,
            entry_points,
            config: self.config,
            runtime: runtime_refs,
            path_to_source_index,
        }
    }
}

/// Convenience alias used by export-resolution code: the result is keyed by
/// alias the same way `Module::resolved_exports` is.
pub type ResolvedExportMap = AHashMap<String, ResolvedExport>;
