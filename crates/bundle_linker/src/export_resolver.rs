//! §4.2: build per-module `resolvedExports`, including export-star
//! propagation with cycle detection.

use ahashmap::AHashSet;

use crate::graph::LinkGraph;
use crate::model::{ResolvedExport, SourceIndex};

pub struct ExportResolver;

impl ExportResolver {
    pub fn run(graph: &mut LinkGraph) {
        // Seed every module's resolvedExports from its own direct exports
        // plus the synthetic "*" alias, before any star-propagation reads
        // a sibling's direct exports.
        for module in graph.modules.iter_mut() {
            module.resolved_exports.clear();
            let exports_ref = module
                .exports_ref
                .expect("exports_ref is allocated for every module when it is added to the graph");
            for (alias, &target_ref) in module.named_exports.iter() {
                module.resolved_exports.insert(
                    alias.clone(),
                    ResolvedExport {
                        target_ref,
                        target_source_index: module.source_index,
                        is_from_export_star: false,
                        is_ambiguous: false,
                    },
                );
            }
            module.resolved_exports.insert(
                "*".to_string(),
                ResolvedExport {
                    target_ref: exports_ref,
                    target_source_index: module.source_index,
                    is_from_export_star: false,
                    is_ambiguous: false,
                },
            );
        }

        let num_modules = graph.modules.len();
        for source_index in 0..num_modules as SourceIndex {
            if graph.module(source_index).export_star_import_record_indices.is_empty() {
                continue;
            }
            let mut visited = AHashSet::default();
            let additions = Self::collect_export_star_additions(graph, source_index, &mut visited);
            let module = graph.module_mut(source_index);
            for (alias, incoming) in additions {
                match module.resolved_exports.get(&alias) {
                    None => {
                        module.resolved_exports.insert(alias, incoming);
                    }
                    Some(existing) if !existing.is_from_export_star => {
                        // direct export shadows the star re-export
                    }
                    Some(existing) => {
                        if existing.target_ref != incoming.target_ref {
                            let mut ambiguous = existing.clone();
                            ambiguous.is_ambiguous = true;
                            module.resolved_exports.insert(alias, ambiguous);
                        }
                    }
                }
            }
        }
    }

    /// Walks the export-star graph reachable from `source_index` and
    /// collects every (alias → export) contributed by a target module's
    /// *direct* named exports (excluding `default`), skipping targets that
    /// are `cjsStyleExports` (handled at run time via `__exportStar`
    /// instead, spec.md §4.2).
    fn collect_export_star_additions(
        graph: &LinkGraph,
        source_index: SourceIndex,
        visited: &mut AHashSet<SourceIndex>,
    ) -> Vec<(String, ResolvedExport)> {
        if !visited.insert(source_index) {
            return Vec::new();
        }
        let module = graph.module(source_index);
        let mut out = Vec::new();
        for &record_index in &module.export_star_import_record_indices {
            let Some(target) = module.import_records[record_index].resolved_source_index else {
                continue;
            };
            let target_module = graph.module(target);
            if target_module.is_cjs_style_exports() {
                continue;
            }
            for (alias, &target_ref) in target_module.named_exports.iter() {
                if alias == "default" {
                    continue;
                }
                out.push((
                    alias.clone(),
                    ResolvedExport {
                        target_ref,
                        target_source_index: target,
                        is_from_export_star: true,
                        is_ambiguous: false,
                    },
                ));
            }
            out.extend(Self::collect_export_star_additions(graph, target, visited));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::config::LinkerConfig;
    use crate::graph::ModuleGraphBuilder;
    use crate::model::{ImportRecord, ImportRecordKind, ModuleFlags};
    use crate::symbol::SymbolKind;

    #[test]
    fn star_export_of_same_target_through_two_paths_is_not_ambiguous() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let c = builder.add_module("/c.js", ModuleFlags::HAS_ES6_SYNTAX);
        let foo = builder.declare_symbol(c, "foo", SymbolKind::ConstOrLet);
        builder.add_named_export(c, "foo", foo);

        let b1 = builder.add_module("/b1.js", ModuleFlags::HAS_ES6_SYNTAX);
        let b1r = builder.add_import_record(b1, ImportRecord::new(ImportRecordKind::StmtImport, "./c").resolved(c));
        builder.add_export_star(b1, b1r);

        let b2 = builder.add_module("/b2.js", ModuleFlags::HAS_ES6_SYNTAX);
        let b2r = builder.add_import_record(b2, ImportRecord::new(ImportRecordKind::StmtImport, "./c").resolved(c));
        builder.add_export_star(b2, b2r);

        let a = builder.add_module("/a.js", ModuleFlags::HAS_ES6_SYNTAX);
        let ar1 = builder.add_import_record(a, ImportRecord::new(ImportRecordKind::StmtImport, "./b1").resolved(b1));
        builder.add_export_star(a, ar1);
        let ar2 = builder.add_import_record(a, ImportRecord::new(ImportRecordKind::StmtImport, "./b2").resolved(b2));
        builder.add_export_star(a, ar2);

        builder.mark_user_entry_point("/a.js");
        let mut graph = builder.build();

        ExportResolver::run(&mut graph);

        let resolved = &graph.module(a).resolved_exports["foo"];
        assert!(!resolved.is_ambiguous);
        assert_eq!(resolved.target_source_index, c);
    }
}
