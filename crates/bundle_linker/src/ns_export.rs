//! §4.4: synthesize each module's `__export(exports, {...})` part and, for
//! ESM entry points, the entry-point export tail.
//!
//! Grounded on the "lazy appended parts" REDESIGN FLAGS note: these parts
//! are always appended to the end of a file's part array, never inserted,
//! and their indices are cached on the module so later phases (the tree
//! shaker, the emitter) can recognize them without a linear scan.

use crate::graph::LinkGraph;
use crate::model::{ModuleFlags, OutputFormat, Part, SourceIndex, Stmt, StmtToken};
use crate::symbol::Ref;

pub struct NamespaceExportSynthesizer;

impl NamespaceExportSynthesizer {
    pub fn run(graph: &mut LinkGraph) {
        let num_modules = graph.modules.len();
        for source_index in 0..num_modules as SourceIndex {
            Self::synthesize_namespace_part(graph, source_index);
        }
        for source_index in 0..num_modules as SourceIndex {
            if graph.module(source_index).is_entry_point() {
                Self::synthesize_entry_tail(graph, source_index);
            }
        }
    }

    fn synthesize_namespace_part(graph: &mut LinkGraph, source_index: SourceIndex) {
        let module = graph.module(source_index);
        if module.is_cjs_style_exports() {
            // CJS modules' exports object is the real run-time `exports`
            // argument to the wrapper; there is nothing to synthesize.
            return;
        }

        let mut aliases: Vec<String> = module
            .resolved_exports
            .keys()
            .filter(|alias| alias.as_str() != "*")
            .filter(|alias| {
                let resolved = &module.resolved_exports[alias.as_str()];
                !resolved.is_ambiguous
            })
            .cloned()
            .collect();
        aliases.sort();

        let mut stmts: Vec<Stmt> = Vec::new();
        stmts.push(vec![StmtToken::Text("var ".to_string()), StmtToken::Ident(
            module.exports_ref.expect("exports_ref always allocated"),
        ), StmtToken::Text(" = {};".to_string())]);

        let export_ref_pairs: Vec<(String, Ref)> = aliases
            .iter()
            .map(|alias| (alias.clone(), module.resolved_exports[alias].target_ref))
            .collect();

        if !export_ref_pairs.is_empty() {
            let mut export_call: Stmt = vec![
                StmtToken::Ident(graph.runtime.export),
                StmtToken::Text("(".to_string()),
                StmtToken::Ident(module.exports_ref.expect("exports_ref always allocated")),
                StmtToken::Text(", {".to_string()),
            ];
            for (i, (alias, target_ref)) in export_ref_pairs.iter().enumerate() {
                if i > 0 {
                    export_call.push(StmtToken::Text(", ".to_string()));
                }
                export_call.push(StmtToken::Text(format!("{alias}: () => ")));
                export_call.push(StmtToken::Ident(*target_ref));
            }
            export_call.push(StmtToken::Text("});".to_string()));
            stmts.push(export_call);
        }

        let mut part = graph.new_part();
        part.stmts = stmts;
        part.can_be_removed_if_unused = false;
        part.force_tree_shaking = true;
        part.is_namespace_export = true;
        part.declared_symbols.push((
            graph.module(source_index).exports_ref.expect("exports_ref always allocated"),
            true,
        ));
        for (_, target_ref) in &export_ref_pairs {
            part.symbol_uses.insert(
                *target_ref,
                crate::model::SymbolUse {
                    count_estimate: 1,
                    is_assigned: false,
                },
            );
        }
        if !export_ref_pairs.is_empty() {
            part.symbol_uses.insert(
                graph.runtime.export,
                crate::model::SymbolUse {
                    count_estimate: 1,
                    is_assigned: false,
                },
            );
        }

        let part_index = graph.module_mut(source_index).parts.len();
        graph.module_mut(source_index).parts.push(part);
        graph.module_mut(source_index).ns_export_part_index = Some(part_index);
    }

    fn synthesize_entry_tail(graph: &mut LinkGraph, source_index: SourceIndex) {
        let module = graph.module(source_index);
        let is_esm_output = matches!(module.output_format, OutputFormat::Esm);
        if !is_esm_output || module.is_cjs_wrap() {
            if module.is_cjs_wrap() {
                Self::synthesize_cjs_wrapped_tail(graph, source_index);
            }
            return;
        }

        let mut aliases: Vec<String> = module
            .resolved_exports
            .keys()
            .filter(|alias| alias.as_str() != "*")
            .cloned()
            .collect();
        aliases.sort();

        let mut stmts: Vec<Stmt> = Vec::new();
        for alias in &aliases {
            let resolved = module.resolved_exports[alias].clone();
            let local_ref = resolved.target_ref;
            let is_ns_bound = graph.symbols.get(local_ref).namespace_alias.is_some();
            if is_ns_bound {
                stmts.push(vec![
                    StmtToken::Text("const temp_".to_string()),
                    StmtToken::Text(alias.clone()),
                    StmtToken::Text(" = ".to_string()),
                    StmtToken::Ident(local_ref),
                    StmtToken::Text(format!("; export {{ temp_{alias} as {alias} }};")),
                ]);
            } else {
                stmts.push(vec![
                    StmtToken::Text("export { ".to_string()),
                    StmtToken::Ident(local_ref),
                    StmtToken::Text(format!(" as {alias} }};")),
                ]);
            }
        }

        let mut part = graph.new_part();
        part.stmts = stmts;
        part.can_be_removed_if_unused = false;
        part.force_tree_shaking = true;
        for alias in &aliases {
            let target_ref = module.resolved_exports[alias].target_ref;
            part.symbol_uses.insert(
                target_ref,
                crate::model::SymbolUse {
                    count_estimate: 1,
                    is_assigned: false,
                },
            );
        }

        let part_index = graph.module_mut(source_index).parts.len();
        graph.module_mut(source_index).parts.push(part);
        graph.module_mut(source_index).entry_export_tail_part_index = Some(part_index);
    }

    /// The tail emitted for a CJS-wrapped entry point, keyed by output
    /// format per the table in spec.md §4.4.
    fn synthesize_cjs_wrapped_tail(graph: &mut LinkGraph, source_index: SourceIndex) {
        let module = graph.module(source_index);
        let wrapper_ref = module.wrapper_ref.expect("cjsWrap module always has wrapper_ref");
        let has_module_name = module.module_name.is_some();

        let mut stmt: Stmt = Vec::new();
        match module.output_format {
            OutputFormat::Preserve => {
                stmt.push(StmtToken::Ident(wrapper_ref));
                stmt.push(StmtToken::Text("();".to_string()));
            }
            OutputFormat::Iife if !has_module_name => {
                stmt.push(StmtToken::Ident(wrapper_ref));
                stmt.push(StmtToken::Text("();".to_string()));
            }
            OutputFormat::Iife => {
                stmt.push(StmtToken::Text("return ".to_string()));
                stmt.push(StmtToken::Ident(wrapper_ref));
                stmt.push(StmtToken::Text("();".to_string()));
            }
            OutputFormat::CommonJs => {
                stmt.push(StmtToken::Text("module.exports = ".to_string()));
                stmt.push(StmtToken::Ident(wrapper_ref));
                stmt.push(StmtToken::Text("();".to_string()));
            }
            OutputFormat::Esm => {
                stmt.push(StmtToken::Text("export default ".to_string()));
                stmt.push(StmtToken::Ident(wrapper_ref));
                stmt.push(StmtToken::Text("();".to_string()));
            }
        }

        let mut part = graph.new_part();
        part.stmts = vec![stmt];
        part.can_be_removed_if_unused = false;
        part.force_tree_shaking = true;
        part.symbol_uses.insert(
            wrapper_ref,
            crate::model::SymbolUse {
                count_estimate: 1,
                is_assigned: false,
            },
        );

        let part_index = graph.module_mut(source_index).parts.len();
        graph.module_mut(source_index).parts.push(part);
        graph.module_mut(source_index).entry_export_tail_part_index = Some(part_index);
    }
}
