//! §4.5: mark parts reachable from entry points through local and non-local
//! part dependencies, then hoist cross-chunk assignments so a write to a
//! top-level symbol never ends up separated from the variable it writes to.
//!
//! The `includeFile`/`includePart` mutual recursion is grounded directly on
//! `unused_finder::graph::Graph::bfs_step`'s frontier-expansion shape,
//! generalized from "file reachable via import edge" to "file/part
//! reachable via any of several edge kinds, tagged per entry bit" rather
//! than a single boolean visited set.

use ahashmap::AHashSet;

use crate::graph::LinkGraph;
use crate::model::{ImportRecordKind, PartIndex, SourceIndex};

pub struct TreeShaker;

impl TreeShaker {
    pub fn run(graph: &mut LinkGraph) {
        let entry_points: Vec<(SourceIndex, usize)> = graph
            .entry_points
            .iter()
            .map(|e| (e.source_index, e.bit))
            .collect();
        for (source_index, bit) in entry_points {
            Self::include_file(graph, source_index, bit, 0, &mut AHashSet::default());
        }
        Self::hoist_cross_chunk_assignments(graph);
    }

    fn include_file(
        graph: &mut LinkGraph,
        source_index: SourceIndex,
        bit: usize,
        distance: u32,
        recursion_guard: &mut AHashSet<SourceIndex>,
    ) {
        {
            let module = graph.module_mut(source_index);
            module.distance_from_entry_point = Some(
                module
                    .distance_from_entry_point
                    .map_or(distance, |d| d.min(distance)),
            );
            if module.entry_bits.get(bit) {
                return;
            }
            module.entry_bits.set(bit);
        }

        if !recursion_guard.insert(source_index) {
            return;
        }

        let tree_shaking = graph.config.tree_shaking;
        let is_runtime = source_index == crate::runtime::RUNTIME_SOURCE_INDEX;
        let own_entry_tail = graph.module(source_index).entry_export_tail_part_index;
        let part_count = graph.module(source_index).parts.len();

        for part_index in 0..part_count {
            // The entry-point export tail of a *different* entry point's
            // module never belongs to this traversal; it only matters when
            // `source_index` is that entry's own module, which is already
            // guaranteed here since tails are per-module.
            if Some(part_index) == own_entry_tail && !graph.module(source_index).is_entry_point() {
                continue;
            }

            let stmt_import_targets: Vec<(SourceIndex, bool)> = {
                let module = graph.module(source_index);
                let part = &module.parts[part_index];
                part.import_record_indices
                    .iter()
                    .filter_map(|&rec_idx| {
                        let record = &module.import_records[rec_idx];
                        if record.kind != ImportRecordKind::StmtImport {
                            return None;
                        }
                        record
                            .resolved_source_index
                            .map(|target| (target, graph.module(target).has_no_side_effects()))
                    })
                    .collect()
            };

            let mut part_has_side_effect_import = false;
            for (target, ignore_if_unused) in stmt_import_targets {
                if ignore_if_unused {
                    continue;
                }
                Self::include_file(graph, target, bit, distance + 1, recursion_guard);
                part_has_side_effect_import = true;
            }
            if part_has_side_effect_import {
                graph.module_mut(source_index).parts[part_index].can_be_removed_if_unused = false;
            }

            let should_include = {
                let part = &graph.module(source_index).parts[part_index];
                !part.can_be_removed_if_unused || (!tree_shaking && !is_runtime)
            };
            if should_include {
                Self::include_part(graph, source_index, part_index, bit, distance + 1, recursion_guard);
            }
        }

        if graph.module(source_index).is_entry_point() {
            let export_parts: Vec<PartIndex> = {
                let module = graph.module(source_index);
                let mut parts = AHashSet::default();
                for resolved in module.resolved_exports.values() {
                    if resolved.target_source_index != source_index {
                        continue;
                    }
                    for (idx, part) in module.parts.iter().enumerate() {
                        if part.declared_symbols.iter().any(|(r, _)| *r == resolved.target_ref) {
                            parts.insert(idx);
                        }
                    }
                }
                parts.into_iter().collect()
            };
            for part_index in export_parts {
                Self::include_part(graph, source_index, part_index, bit, distance + 1, recursion_guard);
            }
        }

        recursion_guard.remove(&source_index);
    }

    fn include_part(
        graph: &mut LinkGraph,
        source_index: SourceIndex,
        part_index: PartIndex,
        bit: usize,
        distance: u32,
        recursion_guard: &mut AHashSet<SourceIndex>,
    ) {
        {
            let part = &mut graph.module_mut(source_index).parts[part_index];
            if part.entry_bits.get(bit) {
                return;
            }
            part.entry_bits.set(bit);
        }

        Self::include_file(graph, source_index, bit, distance, recursion_guard);

        let local_deps: Vec<PartIndex> = graph.module(source_index).parts[part_index]
            .local_dependencies
            .clone();
        for dep in local_deps {
            Self::include_part(graph, source_index, dep, bit, distance + 1, recursion_guard);
        }

        let non_local_deps: Vec<(SourceIndex, PartIndex)> = graph.module(source_index).parts[part_index]
            .non_local_dependencies
            .clone();
        for (dep_source, dep_part) in non_local_deps {
            Self::include_part(graph, dep_source, dep_part, bit, distance + 1, recursion_guard);
        }

        let require_and_dynamic_targets: Vec<(SourceIndex, bool)> = {
            let module = graph.module(source_index);
            let part = &module.parts[part_index];
            part.import_record_indices
                .iter()
                .filter_map(|&rec_idx| {
                    let record = &module.import_records[rec_idx];
                    let is_require_like = matches!(
                        record.kind,
                        ImportRecordKind::RequireCall | ImportRecordKind::DynamicImport
                    );
                    if !is_require_like || record.is_external() {
                        return None;
                    }
                    record
                        .resolved_source_index
                        .map(|target| (target, record.kind == ImportRecordKind::RequireCall))
                })
                .collect()
        };
        for (target, is_bare_require) in require_and_dynamic_targets {
            Self::include_file(graph, target, bit, distance + 1, recursion_guard);
            let wrapper_ref = graph.module(target).wrapper_ref;
            let part = &mut graph.module_mut(source_index).parts[part_index];
            if let Some(wrapper_ref) = wrapper_ref {
                part.symbol_uses
                    .entry(wrapper_ref)
                    .or_insert(crate::model::SymbolUse {
                        count_estimate: 0,
                        is_assigned: false,
                    })
                    .count_estimate += 1;
            }
            if !is_bare_require {
                let to_module = graph.runtime.to_module;
                graph.module_mut(source_index).parts[part_index]
                    .symbol_uses
                    .entry(to_module)
                    .or_insert(crate::model::SymbolUse {
                        count_estimate: 0,
                        is_assigned: false,
                    })
                    .count_estimate += 1;
            }
        }

        let export_star_targets: Vec<usize> = graph.module(source_index).export_star_import_record_indices.clone();
        for rec_idx in export_star_targets {
            let record = &graph.module(source_index).import_records[rec_idx];
            let is_cjs_or_external = record.is_external()
                || record
                    .resolved_source_index
                    .map(|t| graph.module(t).is_cjs_style_exports())
                    .unwrap_or(false);
            if !is_cjs_or_external {
                continue;
            }
            if !graph.module(source_index).parts[part_index]
                .import_record_indices
                .contains(&rec_idx)
            {
                continue;
            }
            graph.module_mut(source_index).import_records[rec_idx].is_export_star_run_time_eval = true;
            let export_star_ref = graph.runtime.export_star;
            graph.module_mut(source_index).parts[part_index]
                .symbol_uses
                .entry(export_star_ref)
                .or_insert(crate::model::SymbolUse {
                    count_estimate: 0,
                    is_assigned: false,
                })
                .count_estimate += 1;
        }
    }

    fn hoist_cross_chunk_assignments(graph: &mut LinkGraph) {
        let num_modules = graph.modules.len();
        for source_index in 0..num_modules as SourceIndex {
            let part_count = graph.module(source_index).parts.len();
            // A tiny local union-find over this file's parts, keyed by
            // index; merged into `entry_bits` with a final OR pass.
            let mut parent: Vec<PartIndex> = (0..part_count).collect();
            fn find(parent: &mut [PartIndex], mut x: PartIndex) -> PartIndex {
                while parent[x] != x {
                    parent[x] = parent[parent[x]];
                    x = parent[x];
                }
                x
            }

            for part_index in 0..part_count {
                let assigned_refs: Vec<crate::symbol::Ref> = graph.module(source_index).parts[part_index]
                    .symbol_uses
                    .iter()
                    .filter(|(_, u)| u.is_assigned)
                    .map(|(r, _)| *r)
                    .collect();
                for r in assigned_refs {
                    if r.source_index != source_index {
                        continue;
                    }
                    for (other_index, other_part) in graph.module(source_index).parts.iter().enumerate() {
                        if other_part.declared_symbols.iter().any(|(d, _)| *d == r) {
                            let root_a = find(&mut parent, part_index);
                            let root_b = find(&mut parent, other_index);
                            if root_a != root_b {
                                parent[root_a] = root_b;
                            }
                        }
                    }
                }
            }

            let mut groups: std::collections::HashMap<PartIndex, Vec<PartIndex>> = std::collections::HashMap::new();
            for i in 0..part_count {
                let root = find(&mut parent, i);
                groups.entry(root).or_default().push(i);
            }
            for members in groups.values() {
                if members.len() < 2 {
                    continue;
                }
                let mut merged = graph.new_bitset();
                for &m in members {
                    merged.union_with(&graph.module(source_index).parts[m].entry_bits);
                }
                for &m in members {
                    graph.module_mut(source_index).parts[m].entry_bits = merged.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkerConfig;
    use crate::graph::ModuleGraphBuilder;
    use crate::model::{ImportRecord, ImportRecordKind, ModuleFlags, Part, StmtToken};

    /// A bare `import "pkg"` of a `sideEffects:false` package is never
    /// recursed into: the package's file stays unreachable (spec.md §4.5,
    /// scenario S2).
    #[test]
    fn side_effect_free_bare_import_is_not_recursed_into() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let pkg = builder.add_module(
            "/pkg.js",
            ModuleFlags::HAS_ES6_SYNTAX | ModuleFlags::HAS_NO_SIDE_EFFECTS,
        );
        let mut pkg_part = Part::new(0);
        pkg_part.stmts.push(vec![StmtToken::Text("console.log('hello');".to_string())]);
        pkg_part.can_be_removed_if_unused = true;
        builder.add_part(pkg, pkg_part);

        let entry = builder.add_module("/entry.js", ModuleFlags::HAS_ES6_SYNTAX);
        let rec = builder.add_import_record(
            entry,
            ImportRecord::new(ImportRecordKind::StmtImport, "pkg").resolved(pkg),
        );
        let mut entry_part = Part::new(0);
        entry_part.import_record_indices.push(rec);
        entry_part.stmts.push(vec![StmtToken::Text("console.log('entry');".to_string())]);
        entry_part.can_be_removed_if_unused = false;
        builder.add_part(entry, entry_part);

        builder.mark_user_entry_point("/entry.js");
        let mut graph = builder.build();

        TreeShaker::run(&mut graph);

        assert!(
            graph.module(pkg).entry_bits.is_empty(),
            "a sideEffects:false bare import must not pull its target into the bundle"
        );
        assert!(!graph.module(entry).entry_bits.is_empty());
    }

    /// The same import, but with an explicit `require("pkg")` alongside the
    /// bare `import`, must still pull the package in (spec.md scenario S3).
    #[test]
    fn explicit_require_still_includes_a_side_effect_free_package() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let pkg = builder.add_module(
            "/pkg.js",
            ModuleFlags::HAS_ES6_SYNTAX | ModuleFlags::HAS_NO_SIDE_EFFECTS,
        );
        let mut pkg_part = Part::new(0);
        pkg_part.stmts.push(vec![StmtToken::Text("console.log('hello');".to_string())]);
        pkg_part.can_be_removed_if_unused = true;
        builder.add_part(pkg, pkg_part);

        let entry = builder.add_module("/entry.js", ModuleFlags::HAS_ES6_SYNTAX);
        let require_rec = builder.add_import_record(
            entry,
            ImportRecord::new(ImportRecordKind::RequireCall, "pkg").resolved(pkg),
        );
        let mut entry_part = Part::new(0);
        entry_part.import_record_indices.push(require_rec);
        entry_part.stmts.push(vec![StmtToken::Text("require('pkg');".to_string())]);
        entry_part.can_be_removed_if_unused = false;
        builder.add_part(entry, entry_part);

        builder.mark_user_entry_point("/entry.js");
        let mut graph = builder.build();

        TreeShaker::run(&mut graph);

        assert!(
            !graph.module(pkg).entry_bits.is_empty(),
            "an explicit require() must include the package regardless of sideEffects:false"
        );
    }
}
