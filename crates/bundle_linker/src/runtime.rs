//! The runtime module: fixed identifier helpers (`__commonJS`, `__toModule`,
//! `__export`, `__exportStar`, `__assign`, `__pow`, `__rest`,
//! `__publicField`, `__privateGet`/`Set`/`Method`, `__async`) that the rest
//! of the linker treats as an always-present, ordinary, tree-shakeable
//! module (spec.md §3's invariant: "The runtime module ... is always
//! reachable and itself tree-shaken").
//!
//! Naming is esbuild's (the system spec.md distills); the macro-driven
//! "shortcut constant" shape used to declare each one is adapted from
//! `turbopack-ecmascript::runtime_functions`, which takes the same
//! "table of well-known helper names" approach for its own runtime.

use crate::model::{Module, ModuleFlags, Part, StmtToken};
use crate::symbol::{Ref, SymbolKind, SymbolMap};

pub const RUNTIME_SOURCE_INDEX: u32 = 0;

macro_rules! runtime_helpers {
    ($($const_name:ident => $js_name:literal),+ $(,)?) => {
        pub struct RuntimeRefs {
            $(pub $const_name: Ref,)+
        }

        const HELPER_NAMES: &[&str] = &[$($js_name),+];

        impl RuntimeRefs {
            fn build(symbols: &mut SymbolMap, parts: &mut Vec<Part>, entry_point_count: usize) -> Self {
                $(
                    let $const_name = symbols.declare(RUNTIME_SOURCE_INDEX, $js_name, SymbolKind::HoistedFunction);
                    {
                        let mut part = Part::new(entry_point_count);
                        part.declared_symbols.push(($const_name, true));
                        part.stmts.push(vec![
                            StmtToken::Text(concat!("function ", $js_name, "(...) { /* runtime helper */ }").to_string()),
                        ]);
                        parts.push(part);
                    }
                )+
                Self { $($const_name,)+ }
            }
        }
    };
}

runtime_helpers! {
    common_js => "__commonJS",
    to_module => "__toModule",
    export => "__export",
    export_star => "__exportStar",
    assign => "__assign",
    pow => "__pow",
    rest => "__rest",
    public_field => "__publicField",
    private_get => "__privateGet",
    private_set => "__privateSet",
    private_method => "__privateMethod",
    async_helper => "__async",
}

pub fn is_runtime_helper_name(name: &str) -> bool {
    HELPER_NAMES.contains(&name)
}

/// Builds the runtime pseudo-module. Always module 0 in the graph; callers
/// must reserve `RUNTIME_SOURCE_INDEX` via `SymbolMap::new_module` (as the
/// very first call, before any real module) so this can declare symbols
/// against it.
pub fn build_runtime_module(symbols: &mut SymbolMap, entry_point_count: usize) -> (Module, RuntimeRefs) {
    debug_assert!(
        symbols.symbols_in(RUNTIME_SOURCE_INDEX).next().is_none(),
        "runtime module's symbol table must still be empty when helpers are declared"
    );

    let mut parts = Vec::new();
    let refs = RuntimeRefs::build(symbols, &mut parts, entry_point_count);

    let module = Module {
        source_index: RUNTIME_SOURCE_INDEX,
        abs_path: "<runtime>".to_string(),
        flags: ModuleFlags::empty(),
        classifier: Default::default(),
        output_format: crate::model::OutputFormat::Esm,
        module_name: None,
        parts,
        import_records: Vec::new(),
        named_imports: Default::default(),
        named_exports: Default::default(),
        export_star_import_record_indices: Vec::new(),
        resolved_exports: Default::default(),
        exports_ref: None,
        module_ref: None,
        wrapper_ref: None,
        ns_export_part_index: None,
        entry_export_tail_part_index: None,
        cjs_wrapper_part_index: None,
        entry_bits: crate::bitset::BitSet::new(entry_point_count),
        distance_from_entry_point: None,
    };
    (module, refs)
}
