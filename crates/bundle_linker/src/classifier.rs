//! §4.1: decide `cjsStyleExports` / `cjsWrap` for every module via fixpoint.
//!
//! Grounded on `unused_finder::graph::Graph::bfs_step`'s shape — a work-list
//! loop over a shared `Vec<GraphFile>` that keeps going until nothing
//! changes — generalized from "BFS over import edges" to "propagate two
//! bits until fixpoint", which is what the same loop skeleton needs here.

use ahashmap::AHashSet;

use crate::graph::LinkGraph;
use crate::model::{ClassifierFlags, ImportRecordKind, ModuleFlags, OutputFormat, SourceIndex};
use crate::symbol::SymbolKind;

pub struct ModuleClassifier;

impl ModuleClassifier {
    /// Runs every propagation rule to a fixpoint, promotes any module
    /// imported statically by a `cjsStyleExports` module to `cjsWrap`,
    /// discovers new dynamic entry points when code splitting is enabled,
    /// and finally `cjsWrap`s any IIFE/ESM entry point (including one just
    /// discovered) that is itself `cjsStyleExports`.
    pub fn run(graph: &mut LinkGraph) {
        Self::seed(graph);
        Self::propagate_to_fixpoint(graph);
        Self::promote_cjs_wrap(graph);
        Self::discover_dynamic_entry_points(graph);
        Self::promote_entry_point_cjs_wrap(graph);
    }

    fn seed(graph: &mut LinkGraph) {
        for module in graph.modules.iter_mut() {
            let lazy_cjs_shaped = module.flags.contains(ModuleFlags::HAS_LAZY_EXPORT)
                && !module.flags.contains(ModuleFlags::HAS_ES6_SYNTAX);
            if module.flags.contains(ModuleFlags::HAS_CJS_FEATURES) || lazy_cjs_shaped {
                module.classifier.insert(ClassifierFlags::CJS_STYLE_EXPORTS);
            }
        }
    }

    fn propagate_to_fixpoint(graph: &mut LinkGraph) {
        loop {
            let mut changed = false;

            // Rules 1-3 and the export-star rule (4) all flow "from an
            // importer's record to the imported module", so collect the
            // edges once per round rather than borrowing `graph.modules`
            // mutably while iterating it.
            let num_modules = graph.modules.len();
            for source_index in 0..num_modules as SourceIndex {
                let module = graph.module(source_index);
                if module.is_cjs_style_exports() {
                    continue;
                }
                let code_splitting = graph.config.code_splitting;
                let mut edges = Vec::new();
                for record in &module.import_records {
                    let Some(target) = record.resolved_source_index else {
                        continue;
                    };
                    match record.kind {
                        ImportRecordKind::StmtImport => edges.push(target),
                        ImportRecordKind::RequireCall => edges.push(target),
                        ImportRecordKind::DynamicImport if !code_splitting => edges.push(target),
                        ImportRecordKind::DynamicImport => {}
                    }
                }
                for target in edges {
                    let target_module = graph.module(target);
                    let already_cjs = target_module.is_cjs_style_exports();
                    let is_lazy_esm_export =
                        target_module.flags.contains(ModuleFlags::HAS_LAZY_EXPORT)
                            && target_module.flags.contains(ModuleFlags::HAS_ES6_SYNTAX);
                    if !already_cjs && !target_module.has_es6_syntax() && !is_lazy_esm_export {
                        graph
                            .module_mut(target)
                            .classifier
                            .insert(ClassifierFlags::CJS_STYLE_EXPORTS);
                        changed = true;
                    }
                }
            }

            // Rule 4: export-star propagation under cycles, visited-set
            // guarded per source module being tested.
            for source_index in 0..num_modules as SourceIndex {
                if graph.module(source_index).is_cjs_style_exports() {
                    continue;
                }
                let mut visited = AHashSet::default();
                if Self::export_star_reaches_cjs(graph, source_index, &mut visited) {
                    graph
                        .module_mut(source_index)
                        .classifier
                        .insert(ClassifierFlags::CJS_STYLE_EXPORTS);
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }

    fn export_star_reaches_cjs(
        graph: &LinkGraph,
        source_index: SourceIndex,
        visited: &mut AHashSet<SourceIndex>,
    ) -> bool {
        if !visited.insert(source_index) {
            return false;
        }
        let module = graph.module(source_index);
        for &record_index in &module.export_star_import_record_indices {
            let Some(target) = module.import_records[record_index].resolved_source_index else {
                continue;
            };
            if graph.module(target).is_cjs_style_exports() {
                return true;
            }
            if Self::export_star_reaches_cjs(graph, target, visited) {
                return true;
            }
        }
        false
    }

    /// Rule 5: any module statically imported by a `cjsStyleExports` module
    /// must be `cjsWrap`; entry points whose output format is IIFE or ESM
    /// must also `cjsWrap` if they are themselves `cjsStyleExports`.
    fn promote_cjs_wrap(graph: &mut LinkGraph) {
        let num_modules = graph.modules.len();
        let mut to_wrap = Vec::new();
        for source_index in 0..num_modules as SourceIndex {
            let module = graph.module(source_index);
            if !module.is_cjs_style_exports() {
                continue;
            }
            for record in &module.import_records {
                if record.kind == ImportRecordKind::StmtImport {
                    if let Some(target) = record.resolved_source_index {
                        to_wrap.push(target);
                    }
                }
            }
        }
        for target in to_wrap {
            Self::mark_cjs_wrap(graph, target);
        }
    }

    /// Rule 5's entry-point half: any entry point (user-specified or
    /// dynamically discovered) whose output format is IIFE or ESM must
    /// `cjsWrap` if it is itself `cjsStyleExports`.
    fn promote_entry_point_cjs_wrap(graph: &mut LinkGraph) {
        let source_indices: Vec<SourceIndex> = graph.entry_points.iter().map(|e| e.source_index).collect();
        for source_index in source_indices {
            let module = graph.module(source_index);
            let needs_wrap = module.is_cjs_style_exports()
                && matches!(module.output_format, OutputFormat::Iife | OutputFormat::Esm);
            if needs_wrap {
                Self::mark_cjs_wrap(graph, source_index);
            }
        }
    }

    /// §4.1's closing rule: "converts `import()` of a non-external module
    /// into an entry point when code splitting is enabled, appending it to
    /// the entry list with `entryPointStatus = dynamic`". Scans every
    /// module's import records once; a target reached by more than one
    /// dynamic `import()` is only added as an entry point the first time.
    fn discover_dynamic_entry_points(graph: &mut LinkGraph) {
        if !graph.config.code_splitting {
            return;
        }
        let num_modules = graph.modules.len();
        let mut targets: Vec<SourceIndex> = Vec::new();
        for source_index in 0..num_modules as SourceIndex {
            for record in &graph.module(source_index).import_records {
                if record.kind != ImportRecordKind::DynamicImport {
                    continue;
                }
                if let Some(target) = record.resolved_source_index {
                    if !graph.module(target).is_entry_point() {
                        targets.push(target);
                    }
                }
            }
        }
        let mut seen = AHashSet::default();
        for target in targets {
            if seen.insert(target) {
                graph.add_dynamic_entry_point(target);
            }
        }
    }

    fn mark_cjs_wrap(graph: &mut LinkGraph, source_index: SourceIndex) {
        let module = graph.module(source_index);
        if module.is_cjs_wrap() {
            return;
        }
        let wrapper_name = format!("require_{source_index}");
        let wrapper_ref = graph
            .symbols
            .declare(source_index, wrapper_name, SymbolKind::HoistedFunction);
        let module = graph.module_mut(source_index);
        module.classifier.insert(ClassifierFlags::CJS_WRAP);
        module.wrapper_ref = Some(wrapper_ref);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::config::LinkerConfig;
    use crate::graph::ModuleGraphBuilder;
    use crate::model::{ImportRecord, ImportRecordKind, ModuleFlags};

    #[test]
    fn legacy_cjs_shaped_import_target_is_marked_cjs_style() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let a = builder.add_module("/a.js", ModuleFlags::HAS_ES6_SYNTAX);
        let b = builder.add_module("/b.js", ModuleFlags::empty());
        builder.add_import_record(a, ImportRecord::new(ImportRecordKind::StmtImport, "./b").resolved(b));
        builder.mark_user_entry_point("/a.js");
        let mut graph = builder.build();

        ModuleClassifier::run(&mut graph);

        assert!(graph.module(b).is_cjs_style_exports());
        assert!(graph.module(b).is_cjs_wrap());
        assert!(!graph.module(a).is_cjs_style_exports());
    }

    #[test]
    fn export_star_cycle_terminates_and_propagates() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let a = builder.add_module("/a.js", ModuleFlags::HAS_ES6_SYNTAX);
        let b = builder.add_module("/b.js", ModuleFlags::HAS_ES6_SYNTAX);
        let c = builder.add_module("/c.js", ModuleFlags::HAS_CJS_FEATURES);
        let ar = builder.add_import_record(a, ImportRecord::new(ImportRecordKind::StmtImport, "./b").resolved(b));
        builder.add_export_star(a, ar);
        let br = builder.add_import_record(b, ImportRecord::new(ImportRecordKind::StmtImport, "./a").resolved(a));
        builder.add_export_star(b, br);
        let _ = c;
        builder.mark_user_entry_point("/a.js");
        let mut graph = builder.build();

        ModuleClassifier::run(&mut graph);

        // neither a nor b reaches a cjs module through the cycle, so both
        // stay static; this only asserts the fixpoint loop terminates.
        assert!(!graph.module(a).is_cjs_style_exports());
        assert!(!graph.module(b).is_cjs_style_exports());
    }

    /// spec.md §4.1's closing rule: a non-external `import()` target becomes
    /// its own dynamic entry point once code splitting is enabled.
    #[test]
    fn dynamic_import_becomes_a_dynamic_entry_point_under_code_splitting() {
        let mut config = LinkerConfig::default();
        config.code_splitting = true;
        let mut builder = ModuleGraphBuilder::new(config, 1);
        let lazy = builder.add_module("/lazy.js", ModuleFlags::HAS_ES6_SYNTAX);
        let entry = builder.add_module("/entry.js", ModuleFlags::HAS_ES6_SYNTAX);
        builder.add_import_record(entry, ImportRecord::new(ImportRecordKind::DynamicImport, "./lazy").resolved(lazy));
        builder.mark_user_entry_point("/entry.js");
        let mut graph = builder.build();

        assert_eq!(graph.entry_point_count(), 1);
        ModuleClassifier::run(&mut graph);

        assert_eq!(graph.entry_point_count(), 2, "the dynamic import target must join the entry list");
        assert!(graph.module(lazy).is_entry_point());
        let dynamic_entry = graph
            .entry_points
            .iter()
            .find(|e| e.source_index == lazy)
            .expect("lazy.js must be registered as an entry point");
        assert_eq!(dynamic_entry.status, crate::model::EntryPointStatus::Dynamic);
        // every already-allocated BitSet must have grown to match, not just
        // the ones created after the new entry point was added.
        assert_eq!(graph.module(entry).entry_bits.bit_count(), 2);
        assert_eq!(graph.module(lazy).entry_bits.bit_count(), 2);
    }

    /// Under the rule-3 default (code splitting off), the same dynamic
    /// import instead marks its target `cjsStyleExports` and does not add
    /// an entry point, since `import()` lowers to a require-returning
    /// promise.
    #[test]
    fn dynamic_import_without_code_splitting_marks_target_cjs_style() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 1);
        let lazy = builder.add_module("/lazy.js", ModuleFlags::HAS_ES6_SYNTAX);
        let entry = builder.add_module("/entry.js", ModuleFlags::HAS_ES6_SYNTAX);
        builder.add_import_record(entry, ImportRecord::new(ImportRecordKind::DynamicImport, "./lazy").resolved(lazy));
        builder.mark_user_entry_point("/entry.js");
        let mut graph = builder.build();

        ModuleClassifier::run(&mut graph);

        assert_eq!(graph.entry_point_count(), 1);
        assert!(!graph.module(lazy).is_entry_point());
        assert!(graph.module(lazy).is_cjs_style_exports());
    }
}
