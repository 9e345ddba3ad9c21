//! The data model from spec.md §3: modules, parts, import records, entry
//! points, chunks and resolved exports.
//!
//! Everything here is plain data addressed by arena index (`SourceIndex`,
//! `PartIndex`, `ImportRecordIndex`) rather than by reference, per the
//! REDESIGN FLAGS note: "implement with plain indices into an arena of
//! modules, never with graph-of-objects ownership."

use ahashmap::AHashMap;

use crate::bitset::BitSet;
use crate::symbol::Ref;

pub type SourceIndex = u32;
pub type PartIndex = usize;
pub type ImportRecordIndex = usize;

bitflags::bitflags! {
    /// Flags computed by the external scanner and handed to the linker
    /// as-is (spec.md §3's Module flag list, minus the two the classifier
    /// computes itself — `cjsStyleExports`/`cjsWrap` live in [`ClassifierFlags`]
    /// since they mutate during the §4.1 fixpoint).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ModuleFlags: u16 {
        const HAS_ES6_EXPORTS   = 0x0001;
        const HAS_ES6_SYNTAX    = 0x0002;
        const HAS_CJS_FEATURES  = 0x0004;
        const USES_EXPORTS_REF  = 0x0008;
        const USES_MODULE_REF   = 0x0010;
        const HAS_LAZY_EXPORT   = 0x0020;
        const WAS_TYPESCRIPT    = 0x0040;
        /// A `package.json` `sideEffects:false` module, renamed here to
        /// read as a module property rather than a double negative.
        const HAS_NO_SIDE_EFFECTS = 0x0080;
        const IS_ENTRY_POINT    = 0x0100;
    }
}

bitflags::bitflags! {
    /// The two bits the §4.1 fixpoint mutates in place.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ClassifierFlags: u8 {
        const CJS_STYLE_EXPORTS = 0x01;
        const CJS_WRAP          = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportRecordKind {
    StmtImport,
    RequireCall,
    DynamicImport,
}

#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub kind: ImportRecordKind,
    /// Absent when the target could not be resolved to an in-graph module
    /// (an external package); resolution itself is out of scope here, the
    /// linker only consumes the result.
    pub resolved_source_index: Option<SourceIndex>,
    pub path_text: String,
    pub does_not_use_exports: bool,
    pub wrap_with_to_module: bool,
    /// Set by the tree-shaker (§4.5) when an `export * from` target turns
    /// out to be CJS/external and must be evaluated at run time.
    pub is_export_star_run_time_eval: bool,
}

impl ImportRecord {
    pub fn new(kind: ImportRecordKind, path_text: impl Into<String>) -> Self {
        Self {
            kind,
            resolved_source_index: None,
            path_text: path_text.into(),
            does_not_use_exports: false,
            wrap_with_to_module: false,
            is_export_star_run_time_eval: false,
        }
    }

    pub fn resolved(mut self, source_index: SourceIndex) -> Self {
        self.resolved_source_index = Some(source_index);
        self
    }

    pub fn is_external(&self) -> bool {
        self.resolved_source_index.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NamedImport {
    pub alias: String,
    pub namespace_ref: Option<Ref>,
    pub import_record_index: ImportRecordIndex,
    pub was_exported: bool,
}

/// One token of a statement's "printed" form. Since the real lexer/parser
/// and printer are external collaborators (spec.md §1's out-of-scope list),
/// parts carry this tiny token stream instead of a full AST: enough for the
/// emitter (§4.9) to substitute final symbol names without needing to
/// understand JS grammar.
#[derive(Debug, Clone)]
pub enum StmtToken {
    Text(String),
    Ident(Ref),
}

pub type Stmt = Vec<StmtToken>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolUse {
    pub count_estimate: u32,
    pub is_assigned: bool,
}

#[derive(Debug, Clone)]
pub struct Part {
    pub stmts: Vec<Stmt>,
    /// (symbol, is_top_level)
    pub declared_symbols: Vec<(Ref, bool)>,
    pub symbol_uses: AHashMap<Ref, SymbolUse>,
    pub import_record_indices: Vec<ImportRecordIndex>,
    pub local_dependencies: Vec<PartIndex>,
    pub non_local_dependencies: Vec<(SourceIndex, PartIndex)>,
    pub can_be_removed_if_unused: bool,
    pub force_tree_shaking: bool,
    pub is_namespace_export: bool,
    pub entry_bits: BitSet,
}

impl Part {
    pub fn new(entry_point_count: usize) -> Self {
        Self {
            stmts: Vec::new(),
            declared_symbols: Vec::new(),
            symbol_uses: AHashMap::default(),
            import_record_indices: Vec::new(),
            local_dependencies: Vec::new(),
            non_local_dependencies: Vec::new(),
            can_be_removed_if_unused: true,
            force_tree_shaking: false,
            is_namespace_export: false,
            entry_bits: BitSet::new(entry_point_count),
        }
    }

    pub fn is_included(&self) -> bool {
        !self.entry_bits.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedExport {
    pub target_ref: Ref,
    pub target_source_index: SourceIndex,
    pub is_from_export_star: bool,
    pub is_ambiguous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPointStatus {
    UserSpecified,
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub source_index: SourceIndex,
    pub bit: usize,
    pub status: EntryPointStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Preserve,
    Iife,
    CommonJs,
    Esm,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub source_index: SourceIndex,
    pub abs_path: String,
    pub flags: ModuleFlags,
    pub classifier: ClassifierFlags,
    pub output_format: OutputFormat,
    pub module_name: Option<String>,

    pub parts: Vec<Part>,
    pub import_records: Vec<ImportRecord>,

    pub named_imports: AHashMap<Ref, NamedImport>,
    pub named_exports: AHashMap<String, Ref>,
    pub export_star_import_record_indices: Vec<ImportRecordIndex>,

    pub resolved_exports: AHashMap<String, ResolvedExport>,

    pub exports_ref: Option<Ref>,
    pub module_ref: Option<Ref>,
    pub wrapper_ref: Option<Ref>,

    /// Reserved index of the synthesized namespace-export part (§4.4),
    /// appended once during that phase. `None` until then.
    pub ns_export_part_index: Option<PartIndex>,
    /// Reserved index of the entry-point export tail part (§4.4), only
    /// present on modules that are entry points.
    pub entry_export_tail_part_index: Option<PartIndex>,
    /// Reserved index of the CJS-wrapper part (§4.1/§4.9), only present on
    /// modules that end up `cjsWrap`.
    pub cjs_wrapper_part_index: Option<PartIndex>,

    pub entry_bits: BitSet,
    pub distance_from_entry_point: Option<u32>,
}

impl Module {
    pub fn is_cjs_style_exports(&self) -> bool {
        self.classifier.contains(ClassifierFlags::CJS_STYLE_EXPORTS)
    }
    pub fn is_cjs_wrap(&self) -> bool {
        self.classifier.contains(ClassifierFlags::CJS_WRAP)
    }
    pub fn has_es6_syntax(&self) -> bool {
        self.flags.contains(ModuleFlags::HAS_ES6_SYNTAX)
    }
    pub fn has_no_side_effects(&self) -> bool {
        self.flags.contains(ModuleFlags::HAS_NO_SIDE_EFFECTS)
    }
    pub fn is_entry_point(&self) -> bool {
        self.flags.contains(ModuleFlags::IS_ENTRY_POINT)
    }
}
