//! Links parsed module graphs into output chunks.
//!
//! Public entry point is [`link`], which runs every phase in spec.md §2's
//! data-flow order: Classifier → ExportResolver → ImportBinder (first
//! pass) → NamespaceExportSynthesizer → ImportBinder (second pass) →
//! TreeShaker → Chunker → CrossChunkLinker → Renamer/Minifier →
//! ChunkEmitter. Phases §4.1-§4.8 run on the calling thread; §4.9 fans out
//! with `rayon` (spec.md §5).

pub mod bitset;
pub mod chunk_emitter;
pub mod chunker;
pub mod classifier;
pub mod config;
pub mod cross_chunk_linker;
pub mod export_resolver;
pub mod graph;
pub mod import_binder;
pub mod model;
pub mod ns_export;
pub mod renamer;
pub mod runtime;
pub mod symbol;
pub mod tree_shaker;

pub use chunk_emitter::OutputFile;
pub use config::LinkerConfig;
pub use graph::{LinkGraph, ModuleGraphBuilder};
pub use linker_diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog, Severity};

use tracing::debug_span;

use chunk_emitter::ChunkEmitter;
use chunker::Chunker;
use classifier::ModuleClassifier;
use cross_chunk_linker::CrossChunkLinker;
use export_resolver::ExportResolver;
use import_binder::ImportBinder;
use ns_export::NamespaceExportSynthesizer;
use renamer::Renamer;
use tree_shaker::TreeShaker;

/// The result of a single link: either the emitted output files, or nothing
/// if a fatal (error-level) diagnostic was produced. Diagnostics are always
/// returned so the caller can print warnings even on a successful link.
pub struct LinkResult {
    pub outputs: Vec<OutputFile>,
    pub diagnostics: DiagnosticLog,
}

/// Runs the full linker pipeline over an already-built [`LinkGraph`]
/// (produced by [`ModuleGraphBuilder`] from a parsed module graph).
///
/// Per spec.md §5: "the linker stops after §4.3 (import-binding) ... and
/// returns no output files" if a fatal diagnostic was raised. Everything
/// up to and including §4.3 still runs so the caller sees every collected
/// diagnostic, not just the first.
pub fn link(mut graph: LinkGraph) -> LinkResult {
    let mut diagnostics = DiagnosticLog::new();

    {
        let _span = debug_span!("classify", modules = graph.modules.len()).entered();
        ModuleClassifier::run(&mut graph);
    }
    {
        let _span = debug_span!("resolve_exports").entered();
        ExportResolver::run(&mut graph);
    }

    let bindings = {
        let _span = debug_span!("bind_imports").entered();
        ImportBinder::bind(&mut graph, &mut diagnostics)
    };

    if diagnostics.has_errors() {
        return LinkResult {
            outputs: Vec::new(),
            diagnostics,
        };
    }

    {
        let _span = debug_span!("synthesize_namespace_exports").entered();
        NamespaceExportSynthesizer::run(&mut graph);
    }
    {
        let _span = debug_span!("wire_import_bindings").entered();
        ImportBinder::wire_second_pass(&mut graph, &bindings);
    }
    {
        let _span = debug_span!("tree_shake").entered();
        TreeShaker::run(&mut graph);
    }

    let chunks = {
        let _span = debug_span!("chunk", entry_points = graph.entry_point_count()).entered();
        Chunker::run(&graph)
    };

    let links = {
        let _span = debug_span!("cross_chunk_link", chunks = chunks.len()).entered();
        CrossChunkLinker::run(&mut graph, &chunks)
    };

    {
        let _span = debug_span!(
            "rename",
            minify = graph.config.minify_identifiers
        )
        .entered();
        Renamer::run(&mut graph);
    }

    let outputs = {
        let _span = debug_span!("emit_chunks", chunks = chunks.len()).entered();
        ChunkEmitter::emit_all(&graph, &chunks, &links)
    };

    LinkResult {
        outputs,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::model::{self, ModuleFlags, Part, StmtToken, SymbolUse};
    use crate::symbol::SymbolKind;

    /// End-to-end scenario S1 from spec.md §8: a `sideEffects:false`
    /// package with an unused named import keeps the importer's own
    /// side-effecting statement and drops the package entirely.
    #[test]
    fn s1_unused_side_effect_free_import_drops_the_package() {
        let config = LinkerConfig::default();
        let mut builder = ModuleGraphBuilder::new(config, 1);

        let pkg = builder.add_module(
            "/node_modules/demo-pkg/index.js",
            ModuleFlags::HAS_ES6_SYNTAX | ModuleFlags::HAS_NO_SIDE_EFFECTS,
        );
        let foo = builder.declare_symbol(pkg, "foo", SymbolKind::ConstOrLet);
        builder.add_named_export(pkg, "foo", foo);
        let mut pkg_part = Part::new(0);
        pkg_part.declared_symbols.push((foo, true));
        pkg_part.stmts.push(vec![StmtToken::Text("const foo = 123;".to_string())]);
        pkg_part.can_be_removed_if_unused = true;
        builder.add_part(pkg, pkg_part);
        let mut pkg_log_part = Part::new(0);
        pkg_log_part.stmts.push(vec![StmtToken::Text("console.log('hello');".to_string())]);
        pkg_log_part.can_be_removed_if_unused = true;
        builder.add_part(pkg, pkg_log_part);

        let entry = builder.add_module("/entry.js", ModuleFlags::HAS_ES6_SYNTAX);
        let rec = builder.add_import_record(
            entry,
            model::ImportRecord::new(model::ImportRecordKind::StmtImport, "demo-pkg").resolved(pkg),
        );
        let import_ref = builder.declare_symbol(entry, "foo", SymbolKind::Import);
        builder.add_named_import(
            entry,
            import_ref,
            model::NamedImport {
                alias: "foo".to_string(),
                namespace_ref: None,
                import_record_index: rec,
                was_exported: false,
            },
        );
        let mut entry_part = Part::new(0);
        entry_part.import_record_indices.push(rec);
        entry_part.stmts.push(vec![StmtToken::Text("console.log('unused import');".to_string())]);
        entry_part.symbol_uses.insert(
            import_ref,
            SymbolUse {
                count_estimate: 0,
                is_assigned: false,
            },
        );
        entry_part.can_be_removed_if_unused = false;
        builder.add_part(entry, entry_part);

        builder.mark_user_entry_point("/entry.js");
        let graph = builder.build();

        let result = link(graph);
        assert!(!result.diagnostics.has_errors());
        assert_eq!(result.outputs.len(), 1);
        let contents = &result.outputs[0].contents;
        assert!(contents.contains("unused import"));
        assert!(!contents.contains("hello"), "pkg's side-effecting statement must not be emitted");
        assert!(!contents.contains("const foo"), "pkg's export must not be emitted");
    }
}
