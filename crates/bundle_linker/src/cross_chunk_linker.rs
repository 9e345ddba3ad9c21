//! §4.7: compute per-chunk imports/exports of symbols declared in other
//! chunks, and emit the import/export statements that stitch chunks back
//! together at load time.
//!
//! The "build a declared-symbol → owner map, then diff each chunk's used
//! symbols against it" shape is the same two-step `unused_finder::graph`
//! uses for "collect every declaration once, then every reference looks
//! itself up" — generalized here from file-granularity to chunk-granularity.

use ahashmap::AHashMap;

use crate::chunker::Chunk;
use crate::graph::LinkGraph;
use crate::symbol::Ref;

/// One `import { a, b as r } from './otherChunk.js'` (or a bare
/// side-effect-only `import './otherChunk.js'`) that a chunk must emit.
///
/// `bindings` deliberately stores `Ref`s rather than resolved names: this
/// phase runs before `Renamer::run` (spec.md §2's Chunker → CrossChunkLinker
/// → Renamer/Minifier order), so any name baked in here would be the
/// pre-rename name. `chunk_emitter.rs` resolves `graph.symbols.final_name`
/// at emission time, after renaming has finished, the same way it already
/// does for `ChunkExport::refs`.
#[derive(Debug, Clone)]
pub struct ChunkImport {
    pub from_chunk: usize,
    /// Exported refs this chunk imports — empty for a bare side-effect
    /// import.
    pub bindings: Vec<Ref>,
}

/// The `export { a, b }` clause a non-entry chunk emits, naming exactly the
/// symbols other chunks import from it.
#[derive(Debug, Clone, Default)]
pub struct ChunkExport {
    pub refs: Vec<Ref>,
}

#[derive(Debug, Clone, Default)]
pub struct CrossChunkLinks {
    pub imports: Vec<Vec<ChunkImport>>,
    pub exports: Vec<ChunkExport>,
}

pub struct CrossChunkLinker;

impl CrossChunkLinker {
    pub fn run(graph: &mut LinkGraph, chunks: &[Chunk]) -> CrossChunkLinks {
        // declaredSymbol -> owning chunk index, built once up front so every
        // cross-chunk use looks itself up rather than re-scanning chunks.
        let mut declared_in: AHashMap<Ref, usize> = AHashMap::default();
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            for &source_index in &chunk.files {
                for part in &graph.module(source_index).parts {
                    if part.entry_bits != chunk.signature {
                        continue;
                    }
                    for &(declared, is_top_level) in &part.declared_symbols {
                        if is_top_level {
                            declared_in.insert(declared, chunk_index);
                        }
                    }
                }
            }
        }

        // A cjsWrap module's `require_X` binding is declared by the chunk
        // emitter directly (spec.md §4.9), not by any one `Part`, so it
        // never shows up in the loop above; register it against whichever
        // chunk actually carries the module's contents.
        for module in &graph.modules {
            let Some(wrapper_ref) = module.wrapper_ref else {
                continue;
            };
            if let Some((chunk_index, _)) = chunks
                .iter()
                .enumerate()
                .find(|(_, c)| c.files.contains(&module.source_index))
            {
                declared_in.insert(wrapper_ref, chunk_index);
            }
        }

        let mut imports: Vec<AHashMap<usize, Vec<Ref>>> = vec![AHashMap::default(); chunks.len()];
        let mut exports: Vec<ChunkExport> = vec![ChunkExport::default(); chunks.len()];
        let mut side_effect_only: Vec<ahashmap::AHashSet<usize>> =
            vec![Default::default(); chunks.len()];

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            for &source_index in &chunk.files {
                for part in &graph.module(source_index).parts {
                    if part.entry_bits != chunk.signature {
                        continue;
                    }
                    for &used in part.symbol_uses.keys() {
                        // A namespace-aliased import is satisfied by a
                        // property access off the CJS wrapper's namespace
                        // ref, not by the original alias symbol; import the
                        // namespace ref itself (spec.md §4.7).
                        let resolved = graph.symbols.follow(used);
                        let effective = match graph.symbols.get(resolved).namespace_alias.as_ref() {
                            Some(alias) => graph.symbols.follow(alias.namespace_ref),
                            None => resolved,
                        };
                        let Some(&owner_chunk) = declared_in.get(&effective) else {
                            continue;
                        };
                        if owner_chunk == chunk_index {
                            continue;
                        }
                        imports[chunk_index]
                            .entry(owner_chunk)
                            .or_default()
                            .push(effective);
                        exports[owner_chunk].refs.push(effective);
                    }
                }
            }

            // Every entry-point chunk additionally imports every other
            // chunk sharing a set bit, even with no named imports, so that
            // the shared chunk's side effects run in the right order.
            if chunk.is_entry_point {
                for (other_index, other) in chunks.iter().enumerate() {
                    if other_index == chunk_index {
                        continue;
                    }
                    let shares_bit = chunk
                        .signature
                        .iter_set_bits()
                        .any(|b| other.signature.get(b));
                    if shares_bit {
                        imports[chunk_index].entry(other_index).or_default();
                        side_effect_only[chunk_index].insert(other_index);
                    }
                }
            }
        }

        for export in &mut exports {
            export.refs.sort();
            export.refs.dedup();
        }

        // Sorted by chunk name then alias name for determinism (spec.md §4.7).
        let mut chunk_imports: Vec<Vec<ChunkImport>> = Vec::with_capacity(chunks.len());
        for (chunk_index, by_owner) in imports.into_iter().enumerate() {
            let mut owners: Vec<usize> = by_owner.keys().copied().collect();
            owners.sort_by_key(|&o| chunks[o].name.clone());
            let mut out = Vec::with_capacity(owners.len());
            for owner in owners {
                let mut bindings = by_owner[&owner].clone();
                bindings.sort();
                bindings.dedup();
                if side_effect_only[chunk_index].contains(&owner) && bindings.is_empty() {
                    out.push(ChunkImport {
                        from_chunk: owner,
                        bindings: Vec::new(),
                    });
                } else if !bindings.is_empty() {
                    out.push(ChunkImport {
                        from_chunk: owner,
                        bindings,
                    });
                }
            }
            chunk_imports.push(out);
        }

        CrossChunkLinks {
            imports: chunk_imports,
            exports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::chunker::Chunker;
    use crate::classifier::ModuleClassifier;
    use crate::config::LinkerConfig;
    use crate::export_resolver::ExportResolver;
    use crate::graph::ModuleGraphBuilder;
    use crate::import_binder::ImportBinder;
    use crate::model::{ImportRecord, ImportRecordKind, ModuleFlags, NamedImport, Part, StmtToken, SymbolUse};
    use crate::ns_export::NamespaceExportSynthesizer;
    use crate::symbol::SymbolKind;
    use crate::tree_shaker::TreeShaker;
    use linker_diagnostics::DiagnosticLog;

    fn build_shared_entry_graph() -> LinkGraph {
        let mut config = LinkerConfig::default();
        config.code_splitting = true;
        let mut builder = ModuleGraphBuilder::new(config, 2);

        let shared = builder.add_module("/shared.js", ModuleFlags::HAS_ES6_SYNTAX);
        let foo = builder.declare_symbol(shared, "foo", SymbolKind::ConstOrLet);
        builder.add_named_export(shared, "foo", foo);
        let mut shared_part = Part::new(0);
        shared_part.declared_symbols.push((foo, true));
        shared_part
            .stmts
            .push(vec![StmtToken::Text("const foo = 123;".to_string())]);
        builder.add_part(shared, shared_part);

        for (path, alias_name) in [("/a.js", "a"), ("/b.js", "b")] {
            let m = builder.add_module(path, ModuleFlags::HAS_ES6_SYNTAX);
            let rec = builder.add_import_record(
                m,
                ImportRecord::new(ImportRecordKind::StmtImport, "./shared").resolved(shared),
            );
            let import_ref = builder.declare_symbol(m, "foo", SymbolKind::Import);
            builder.add_named_import(
                m,
                import_ref,
                NamedImport {
                    alias: "foo".to_string(),
                    namespace_ref: None,
                    import_record_index: rec,
                    was_exported: false,
                },
            );
            let mut part = Part::new(0);
            part.import_record_indices.push(rec);
            part.symbol_uses
                .insert(import_ref, SymbolUse { count_estimate: 1, is_assigned: false });
            part.stmts.push(vec![StmtToken::Ident(import_ref)]);
            builder.add_part(m, part);
            builder.mark_user_entry_point(path);
            let _ = alias_name;
        }

        let mut graph = builder.build();
        ModuleClassifier::run(&mut graph);
        ExportResolver::run(&mut graph);
        let mut diagnostics = DiagnosticLog::new();
        let bindings = ImportBinder::bind(&mut graph, &mut diagnostics);
        NamespaceExportSynthesizer::run(&mut graph);
        ImportBinder::wire_second_pass(&mut graph, &bindings);
        TreeShaker::run(&mut graph);
        graph
    }

    #[test]
    fn shared_symbol_is_imported_by_both_entry_chunks() {
        let mut graph = build_shared_entry_graph();
        let chunks = Chunker::run(&graph);
        let links = CrossChunkLinker::run(&mut graph, &chunks);

        let shared_chunk_index = chunks.iter().position(|c| !c.is_entry_point).unwrap();
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            if chunk_index == shared_chunk_index {
                continue;
            }
            let imports_shared = links.imports[chunk_index]
                .iter()
                .any(|imp| imp.from_chunk == shared_chunk_index && !imp.bindings.is_empty());
            assert!(imports_shared, "chunk {} should import foo from the shared chunk", chunk.name);
        }
        assert_eq!(links.exports[shared_chunk_index].refs.len(), 1);
    }

    /// Regression test: `CrossChunkLinker::run` runs before `Renamer::run`
    /// (spec.md §2), so a cross-chunk import must resolve its printed name
    /// at emission time, not bake in the pre-rename name. Exercise this
    /// with `minify_identifiers = true`, which renames every symbol, across
    /// the two entry chunks that both import the shared chunk's `foo`.
    #[test]
    fn cross_chunk_import_and_export_use_the_post_rename_name() {
        let mut graph = build_shared_entry_graph();
        graph.config.minify_identifiers = true;

        let chunks = Chunker::run(&graph);
        let links = CrossChunkLinker::run(&mut graph, &chunks);
        crate::renamer::Renamer::run(&mut graph);

        let shared_chunk_index = chunks.iter().position(|c| !c.is_entry_point).unwrap();
        let shared_export_ref = links.exports[shared_chunk_index].refs[0];
        let final_name = graph.symbols.final_name(shared_export_ref).to_string();
        assert_ne!(final_name, "foo", "minification must actually rename the shared symbol");

        let outputs = crate::chunk_emitter::ChunkEmitter::emit_all(&graph, &chunks, &links);
        let shared_output = &outputs[shared_chunk_index].contents;
        assert!(
            shared_output.contains(&format!("export {{ {final_name} }};")),
            "shared chunk must export under the post-rename name, got: {shared_output}"
        );

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            if chunk_index == shared_chunk_index {
                continue;
            }
            let contents = &outputs[chunk_index].contents;
            assert!(
                contents.contains(&final_name),
                "chunk {} must import the shared symbol under its post-rename name {final_name}, got: {contents}",
                chunk.name
            );
            assert!(
                !contents.contains("import { foo"),
                "chunk {} must not import the shared symbol under its stale pre-rename name",
                chunk.name
            );
        }
    }
}
