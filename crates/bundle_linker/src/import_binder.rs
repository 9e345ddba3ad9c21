//! §4.3: match each named import to an export, following re-export chains.
//!
//! The tortoise-and-hare cycle detector is grounded on the REDESIGN FLAGS
//! note in spec.md §9 ("pointer cycles across files ... handled by a
//! tortoise-and-hare index pair rather than by retaining parent pointers");
//! the two-pass split (bind, then wire non-local dependencies once namespace
//! exports exist) mirrors the same "compute now, wire later" shape
//! `unused_finder::import_export_info` uses to separate "what does this file
//! import" from "what does that resolve to".

use ahashmap::AHashMap;

use crate::graph::LinkGraph;
use crate::model::{PartIndex, SourceIndex};
use crate::symbol::{NamespaceAlias, Ref};
use linker_diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog, SourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Found,
    CommonJs,
    CommonJsWithoutExports,
    External,
    NoMatch,
    Ambiguous,
    ProbablyTypeScriptType,
}

/// A successful binding recorded for the second pass.
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub source_index: SourceIndex,
    pub target_ref: Ref,
}

pub struct ImportBinder;

impl ImportBinder {
    /// First pass: resolves every named import to an outcome, rewriting
    /// CJS-bound import symbols with a namespace alias in place, and
    /// returns the bindings the second pass needs.
    pub fn bind(graph: &mut LinkGraph, diagnostics: &mut DiagnosticLog) -> AHashMap<Ref, Binding> {
        let mut bindings = AHashMap::default();
        let num_modules = graph.modules.len();

        for source_index in 0..num_modules as SourceIndex {
            let import_refs: Vec<Ref> = graph
                .module(source_index)
                .named_imports
                .keys()
                .copied()
                .collect();
            for import_ref in import_refs {
                Self::bind_one(graph, source_index, import_ref, diagnostics, &mut bindings);
            }
        }

        bindings
    }

    fn bind_one(
        graph: &mut LinkGraph,
        importing_source_index: SourceIndex,
        import_ref: Ref,
        diagnostics: &mut DiagnosticLog,
        bindings: &mut AHashMap<Ref, Binding>,
    ) {
        let named_import = graph.module(importing_source_index).named_imports[&import_ref].clone();
        let importer_is_typescript = graph
            .module(importing_source_index)
            .flags
            .contains(crate::model::ModuleFlags::WAS_TYPESCRIPT);
        let record = &graph.module(importing_source_index).import_records[named_import.import_record_index];

        let Some(mut target) = record.resolved_source_index else {
            return; // outcome External: nothing further to do
        };
        let mut alias = named_import.alias.clone();
        let span = SourceSpan {
            source_index: importing_source_index,
            lo: 0,
            hi: 0,
        };

        let mut hare_target = target;
        let mut hare_alias = alias.clone();
        let mut step_parity = false;

        loop {
            let target_module = graph.module(target);

            if target_module.is_cjs_style_exports() {
                let has_no_cjs_exports_at_all = !target_module
                    .flags
                    .contains(crate::model::ModuleFlags::USES_EXPORTS_REF)
                    && !target_module
                        .flags
                        .contains(crate::model::ModuleFlags::USES_MODULE_REF)
                    && !target_module
                        .flags
                        .contains(crate::model::ModuleFlags::HAS_LAZY_EXPORT);
                let namespace_ref = target_module
                    .exports_ref
                    .expect("exports_ref is allocated for every module");
                graph.symbols.get_mut(import_ref).namespace_alias = Some(NamespaceAlias {
                    namespace_ref,
                    alias: alias.clone(),
                });
                if has_no_cjs_exports_at_all {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::ImportAlwaysUndefined {
                            alias: alias.clone(),
                        },
                        Some(span),
                    ));
                    return;
                }
                return;
            }

            let Some(resolved) = target_module.resolved_exports.get(&alias).cloned() else {
                if importer_is_typescript && named_import.was_exported {
                    return; // ProbablyTypeScriptType: silently dropped
                }
                diagnostics.push(Diagnostic::error(
                    DiagnosticKind::NoMatchingExport {
                        alias: alias.clone(),
                    },
                    Some(span),
                ));
                return;
            };

            if resolved.is_ambiguous {
                diagnostics.push(Diagnostic::error(
                    DiagnosticKind::AmbiguousImport {
                        alias: alias.clone(),
                    },
                    Some(span),
                ));
                return;
            }

            bindings.insert(
                import_ref,
                Binding {
                    source_index: resolved.target_source_index,
                    target_ref: resolved.target_ref,
                },
            );

            // If the export we landed on is itself bound to an import in
            // its own file, keep chasing the chain.
            let next = graph
                .module(resolved.target_source_index)
                .named_imports
                .get(&resolved.target_ref)
                .cloned();
            let Some(next_named_import) = next else {
                return; // Found: landed on a real declaration
            };
            let next_record = &graph.module(resolved.target_source_index).import_records
                [next_named_import.import_record_index];
            let Some(next_target) = next_record.resolved_source_index else {
                return; // chain ends at an external module; caller treats it as found-external
            };

            target = next_target;
            alias = next_named_import.alias.clone();

            // Tortoise-and-hare: the hare advances two steps for every one
            // tortoise step; a match means we looped.
            if step_parity {
                let hare_module = graph.module(hare_target);
                if let Some(hare_resolved) = hare_module.resolved_exports.get(&hare_alias) {
                    if let Some(hare_next) = graph
                        .module(hare_resolved.target_source_index)
                        .named_imports
                        .get(&hare_resolved.target_ref)
                    {
                        let hare_next_record = &graph.module(hare_resolved.target_source_index)
                            .import_records[hare_next.import_record_index];
                        if let Some(hare_next_target) = hare_next_record.resolved_source_index {
                            hare_target = hare_next_target;
                            hare_alias = hare_next.alias.clone();
                        }
                    }
                }
                if hare_target == target && hare_alias == alias {
                    diagnostics.push(Diagnostic::error(
                        DiagnosticKind::ImportCycle {
                            alias: alias.clone(),
                        },
                        Some(span),
                    ));
                    return;
                }
            }
            step_parity = !step_parity;
        }
    }

    /// Second pass (run after §4.4 namespace synthesis): for each recorded
    /// binding, appends a non-local dependency from every importing part to
    /// every exporting part, and unions the import-ref into the export-ref's
    /// union-find chain so both share a final name after renaming.
    pub fn wire_second_pass(graph: &mut LinkGraph, bindings: &AHashMap<Ref, Binding>) {
        for (&import_ref, binding) in bindings {
            graph.symbols.union(import_ref, binding.target_ref);

            let exporting_parts: Vec<PartIndex> = graph
                .module(binding.source_index)
                .parts
                .iter()
                .enumerate()
                .filter(|(_, part)| {
                    part.declared_symbols
                        .iter()
                        .any(|(r, _)| *r == binding.target_ref)
                })
                .map(|(i, _)| i)
                .collect();
            if exporting_parts.is_empty() {
                continue;
            }

            let importing_source_index = import_ref.source_index;
            let importing_parts: Vec<PartIndex> = graph
                .module(importing_source_index)
                .parts
                .iter()
                .enumerate()
                .filter(|(_, part)| part.symbol_uses.contains_key(&import_ref))
                .map(|(i, _)| i)
                .collect();

            for part_index in importing_parts {
                let part = &mut graph.module_mut(importing_source_index).parts[part_index];
                for &exporting_part in &exporting_parts {
                    part.non_local_dependencies
                        .push((binding.source_index, exporting_part));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkerConfig;
    use crate::export_resolver::ExportResolver;
    use crate::graph::ModuleGraphBuilder;
    use crate::model::{ImportRecord, ImportRecordKind, ModuleFlags, NamedImport};
    use crate::symbol::SymbolKind;

    /// `a` imports `foo` re-exported by `b` from `c`; binding should chase
    /// the chain and land on `c`'s real declaration.
    #[test]
    fn binds_through_a_re_export_chain() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let c = builder.add_module("/c.js", ModuleFlags::HAS_ES6_SYNTAX);
        let foo = builder.declare_symbol(c, "foo", SymbolKind::ConstOrLet);
        builder.add_named_export(c, "foo", foo);

        let b = builder.add_module("/b.js", ModuleFlags::HAS_ES6_SYNTAX);
        let b_rec = builder.add_import_record(b, ImportRecord::new(ImportRecordKind::StmtImport, "./c").resolved(c));
        let b_import_ref = builder.declare_symbol(b, "foo", SymbolKind::Import);
        builder.add_named_import(
            b,
            b_import_ref,
            NamedImport {
                alias: "foo".to_string(),
                namespace_ref: None,
                import_record_index: b_rec,
                was_exported: true,
            },
        );
        builder.add_named_export(b, "foo", b_import_ref);

        let a = builder.add_module("/a.js", ModuleFlags::HAS_ES6_SYNTAX);
        let a_rec = builder.add_import_record(a, ImportRecord::new(ImportRecordKind::StmtImport, "./b").resolved(b));
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

        builder.mark_user_entry_point("/a.js");
        let mut graph = builder.build();

        ExportResolver::run(&mut graph);
        let mut diagnostics = DiagnosticLog::new();
        let bindings = ImportBinder::bind(&mut graph, &mut diagnostics);

        assert!(!diagnostics.has_errors());
        let binding = bindings.get(&a_import_ref).expect("a's import must bind");
        assert_eq!(binding.target_ref, foo);
        assert_eq!(binding.source_index, c);
    }

    #[test]
    fn missing_export_is_a_no_match_error() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let pkg = builder.add_module("/pkg.js", ModuleFlags::HAS_ES6_SYNTAX);

        let entry = builder.add_module("/entry.js", ModuleFlags::HAS_ES6_SYNTAX);
        let rec = builder.add_import_record(entry, ImportRecord::new(ImportRecordKind::StmtImport, "./pkg").resolved(pkg));
        let import_ref = builder.declare_symbol(entry, "missing", SymbolKind::Import);
        builder.add_named_import(
            entry,
            import_ref,
            NamedImport {
                alias: "missing".to_string(),
                namespace_ref: None,
                import_record_index: rec,
                was_exported: false,
            },
        );

        builder.mark_user_entry_point("/entry.js");
        let mut graph = builder.build();

        ExportResolver::run(&mut graph);
        let mut diagnostics = DiagnosticLog::new();
        let bindings = ImportBinder::bind(&mut graph, &mut diagnostics);

        assert!(diagnostics.has_errors());
        assert!(bindings.get(&import_ref).is_none());
    }

    /// A TypeScript import that was itself re-exported, but never matched
    /// to a real export, is a silently-dropped "probably a type" import,
    /// not an error (spec.md §4.3/§7).
    #[test]
    fn typescript_probably_type_import_does_not_error() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let pkg = builder.add_module("/pkg.js", ModuleFlags::HAS_ES6_SYNTAX);

        let entry = builder.add_module(
            "/entry.ts",
            ModuleFlags::HAS_ES6_SYNTAX | ModuleFlags::WAS_TYPESCRIPT,
        );
        let rec = builder.add_import_record(entry, ImportRecord::new(ImportRecordKind::StmtImport, "./pkg").resolved(pkg));
        let import_ref = builder.declare_symbol(entry, "SomeType", SymbolKind::Import);
        builder.add_named_import(
            entry,
            import_ref,
            NamedImport {
                alias: "SomeType".to_string(),
                namespace_ref: None,
                import_record_index: rec,
                was_exported: true,
            },
        );

        builder.mark_user_entry_point("/entry.ts");
        let mut graph = builder.build();

        ExportResolver::run(&mut graph);
        let mut diagnostics = DiagnosticLog::new();
        let bindings = ImportBinder::bind(&mut graph, &mut diagnostics);

        assert!(!diagnostics.has_errors());
        assert!(bindings.get(&import_ref).is_none());
    }

    /// Two independent `export *` chains that disagree on the target for
    /// the same alias make the importer's binding `ambiguous`.
    #[test]
    fn ambiguous_star_export_target_is_an_error() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let c1 = builder.add_module("/c1.js", ModuleFlags::HAS_ES6_SYNTAX);
        let c1_foo = builder.declare_symbol(c1, "foo", SymbolKind::ConstOrLet);
        builder.add_named_export(c1, "foo", c1_foo);

        let c2 = builder.add_module("/c2.js", ModuleFlags::HAS_ES6_SYNTAX);
        let c2_foo = builder.declare_symbol(c2, "foo", SymbolKind::ConstOrLet);
        builder.add_named_export(c2, "foo", c2_foo);

        let a = builder.add_module("/a.js", ModuleFlags::HAS_ES6_SYNTAX);
        let ar1 = builder.add_import_record(a, ImportRecord::new(ImportRecordKind::StmtImport, "./c1").resolved(c1));
        builder.add_export_star(a, ar1);
        let ar2 = builder.add_import_record(a, ImportRecord::new(ImportRecordKind::StmtImport, "./c2").resolved(c2));
        builder.add_export_star(a, ar2);

        let entry = builder.add_module("/entry.js", ModuleFlags::HAS_ES6_SYNTAX);
        let entry_rec = builder.add_import_record(entry, ImportRecord::new(ImportRecordKind::StmtImport, "./a").resolved(a));
        let import_ref = builder.declare_symbol(entry, "foo", SymbolKind::Import);
        builder.add_named_import(
            entry,
            import_ref,
            NamedImport {
                alias: "foo".to_string(),
                namespace_ref: None,
                import_record_index: entry_rec,
                was_exported: false,
            },
        );

        builder.mark_user_entry_point("/entry.js");
        let mut graph = builder.build();

        ExportResolver::run(&mut graph);
        let mut diagnostics = DiagnosticLog::new();
        let bindings = ImportBinder::bind(&mut graph, &mut diagnostics);

        assert!(diagnostics.has_errors());
        assert!(bindings.get(&import_ref).is_none());
    }
}
