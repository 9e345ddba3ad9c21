//! §4.6: assign parts to chunks keyed by entry-bit signature, compute
//! deterministic chunk names, and order files within each chunk.

use ahashmap::AHashMap;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::bitset::BitSet;
use crate::graph::LinkGraph;
use crate::model::SourceIndex;

pub struct Chunk {
    pub signature: BitSet,
    pub name: String,
    pub is_entry_point: bool,
    pub entry_bit: Option<usize>,
    /// Files contributing at least one included part, in final emission
    /// order (runtime first, then CJS-wrapped files, then DFS post-order,
    /// each tier sorted by distance-from-entry-point then path).
    pub files: Vec<SourceIndex>,
}

pub struct Chunker;

impl Chunker {
    pub fn run(graph: &LinkGraph) -> Vec<Chunk> {
        let mut by_signature: AHashMap<Vec<u64>, BitSet> = AHashMap::default();
        let mut signature_order: Vec<Vec<u64>> = Vec::new();

        for module in &graph.modules {
            let has_included_part = module.parts.iter().any(|p| p.is_included());
            if !has_included_part {
                continue;
            }
            // parts in one file can in principle carry different
            // signatures (tree-shaken independently); a file contributes
            // to one chunk per distinct signature among its parts.
            for part in &module.parts {
                if !part.is_included() {
                    continue;
                }
                let key = Self::signature_key(&part.entry_bits);
                by_signature.entry(key.clone()).or_insert_with(|| {
                    signature_order.push(key.clone());
                    part.entry_bits.clone()
                });
            }
        }

        // deterministic order: sort signature keys themselves (spec.md §5:
        // "Chunk results are collected ... same sort key as their
        // signature's canonical form").
        signature_order.sort();

        let mut chunks: Vec<Chunk> = Vec::new();
        for key in &signature_order {
            let signature = by_signature[key].clone();
            let entry_bit = Self::single_entry_bit(&signature);
            let name = Self::chunk_name(graph, &signature, entry_bit);
            let files = Self::order_files(graph, &signature);
            chunks.push(Chunk {
                is_entry_point: entry_bit.is_some(),
                entry_bit,
                signature,
                name,
                files,
            });
        }
        chunks
    }

    fn signature_key(bits: &BitSet) -> Vec<u64> {
        bits.iter_set_bits().map(|b| b as u64).collect()
    }

    fn single_entry_bit(signature: &BitSet) -> Option<usize> {
        if signature.count_set() == 1 {
            signature.iter_set_bits().next()
        } else {
            None
        }
    }

    fn chunk_name(graph: &LinkGraph, signature: &BitSet, entry_bit: Option<usize>) -> String {
        let bases: Vec<String> = signature
            .iter_set_bits()
            .filter_map(|bit| {
                graph
                    .entry_points
                    .iter()
                    .find(|e| e.bit == bit)
                    .map(|e| Self::pretty_base_name(&graph.module(e.source_index).abs_path))
            })
            .collect();

        if let Some(_bit) = entry_bit {
            if let Some(single_entry) = graph.entry_points.iter().find(|e| Some(e.bit) == entry_bit) {
                if graph.entry_point_count() == 1 {
                    if let Some(output_file) = &graph.config.abs_output_file {
                        return output_file.clone();
                    }
                }
                return format!("{}.js", Self::pretty_base_name(&graph.module(single_entry.source_index).abs_path));
            }
        }

        let concatenated = bases.join("_");
        if bases.len() < 2 && concatenated.len() <= 64 {
            return format!("{concatenated}.js");
        }

        let mut hasher = Sha1::new();
        hasher.update(concatenated.as_bytes());
        let digest = hasher.finalize();
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
        let short = &encoded[..8.min(encoded.len())];
        format!("chunk.{short}.js")
    }

    fn pretty_base_name(abs_path: &str) -> String {
        let file_name = abs_path.rsplit('/').next().unwrap_or(abs_path);
        file_name
            .rsplit_once('.')
            .map(|(base, _ext)| base)
            .unwrap_or(file_name)
            .to_string()
    }

    /// Orders files in a chunk: runtime first unconditionally, then
    /// CJS-wrapped files, then all others, each tier sorted by distance
    /// ascending then absolute path as tie-break (spec.md §4.6).
    fn order_files(graph: &LinkGraph, signature: &BitSet) -> Vec<SourceIndex> {
        let mut contributing: Vec<SourceIndex> = Vec::new();
        for module in &graph.modules {
            let contributes = module
                .parts
                .iter()
                .any(|p| p.is_included() && p.entry_bits == *signature);
            if contributes {
                contributing.push(module.source_index);
            }
        }

        let runtime_idx = crate::runtime::RUNTIME_SOURCE_INDEX;
        let (runtime, rest): (Vec<_>, Vec<_>) =
            contributing.into_iter().partition(|&s| s == runtime_idx);
        let (mut cjs_wrapped, mut others): (Vec<_>, Vec<_>) =
            rest.into_iter().partition(|&s| graph.module(s).is_cjs_wrap());

        let sort_key = |s: &SourceIndex| {
            let module = graph.module(*s);
            (module.distance_from_entry_point.unwrap_or(u32::MAX), module.abs_path.clone())
        };
        cjs_wrapped.sort_by_key(sort_key);
        others.sort_by_key(sort_key);

        let mut out = runtime;
        out.extend(cjs_wrapped);
        out.extend(others);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
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

    #[test]
    fn shared_module_between_two_entries_forms_its_own_chunk() {
        let mut config = LinkerConfig::default();
        config.code_splitting = true;
        let mut builder = ModuleGraphBuilder::new(config, 2);

        let shared = builder.add_module("/shared.js", ModuleFlags::HAS_ES6_SYNTAX);
        let foo = builder.declare_symbol(shared, "foo", SymbolKind::ConstOrLet);
        builder.add_named_export(shared, "foo", foo);
        let mut shared_part = Part::new(0);
        shared_part.declared_symbols.push((foo, true));
        shared_part.stmts.push(vec![StmtToken::Text("const foo = 123;".to_string())]);
        builder.add_part(shared, shared_part);

        let a = builder.add_module("/a.js", ModuleFlags::HAS_ES6_SYNTAX);
        let a_rec = builder.add_import_record(
            a,
            ImportRecord::new(ImportRecordKind::StmtImport, "./shared").resolved(shared),
        );
        let a_import_ref = builder.declare_symbol(a, "foo", SymbolKind::Import);
        builder.add_named_import(
            a,
            a_import_ref,
            NamedImport {
                alias: "foo".to_string(),
                namespace_ref: None,
                import_record_index: a_rec,
                was_exported: false,
            },
        );
        let mut a_part = Part::new(0);
        a_part.import_record_indices.push(a_rec);
        a_part.symbol_uses.insert(a_import_ref, SymbolUse { count_estimate: 1, is_assigned: false });
        a_part.stmts.push(vec![StmtToken::Ident(a_import_ref)]);
        builder.add_part(a, a_part);

        let b = builder.add_module("/b.js", ModuleFlags::HAS_ES6_SYNTAX);
        let b_rec = builder.add_import_record(
            b,
            ImportRecord::new(ImportRecordKind::StmtImport, "./shared").resolved(shared),
        );
        let b_import_ref = builder.declare_symbol(b, "foo", SymbolKind::Import);
        builder.add_named_import(
            b,
            b_import_ref,
            NamedImport {
                alias: "foo".to_string(),
                namespace_ref: None,
                import_record_index: b_rec,
                was_exported: false,
            },
        );
        let mut b_part = Part::new(0);
        b_part.import_record_indices.push(b_rec);
        b_part.symbol_uses.insert(b_import_ref, SymbolUse { count_estimate: 1, is_assigned: false });
        b_part.stmts.push(vec![StmtToken::Ident(b_import_ref)]);
        builder.add_part(b, b_part);

        builder.mark_user_entry_point("/a.js");
        builder.mark_user_entry_point("/b.js");
        let mut graph = builder.build();

        ModuleClassifier::run(&mut graph);
        ExportResolver::run(&mut graph);
        let mut diagnostics = DiagnosticLog::new();
        let bindings = ImportBinder::bind(&mut graph, &mut diagnostics);
        NamespaceExportSynthesizer::run(&mut graph);
        ImportBinder::wire_second_pass(&mut graph, &bindings);
        TreeShaker::run(&mut graph);

        let chunks = Chunker::run(&graph);
        assert_eq!(chunks.len(), 3, "a-only, b-only, and shared chunks");
        assert!(chunks.iter().any(|c| c.name == "a.js"));
        assert!(chunks.iter().any(|c| c.name == "b.js"));
        assert!(chunks.iter().any(|c| !c.is_entry_point));
    }
}
