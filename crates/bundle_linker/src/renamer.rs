//! §4.8: either collision-avoiding renaming or frequency-weighted
//! minification, selected by `LinkerConfig::minify_identifiers`.
//!
//! Both modes walk "top-level scope, then every nested scope", the same
//! traversal shape `unused_finder::graph`'s BFS uses for files — here over
//! symbol scopes instead of import edges. Re-exports whose import-ref was
//! merged into its export-ref's union-find chain (§4.3's second pass)
//! automatically share a name here: renaming only ever touches chain roots,
//! and `SymbolMap::final_name` always reads through to the root.

use ahashmap::{AHashMap, AHashSet};

use crate::graph::LinkGraph;
use crate::runtime;
use crate::symbol::{Ref, SymbolKind};

/// Ordinary ASCII keywords that can never be identifiers in emitted code,
/// reserved in both renamer modes regardless of what the input graph uses.
const JS_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "false", "finally", "for", "function", "if", "import", "in",
    "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true", "try",
    "typeof", "var", "void", "while", "with", "let", "static", "yield", "await", "enum",
];

pub struct Renamer;

impl Renamer {
    pub fn run(graph: &mut LinkGraph) {
        if graph.config.minify_identifiers {
            Self::minify(graph);
        } else {
            Self::rename(graph);
        }
        // Every union-find chain must be fully compressed, serially, before
        // any parallel §4.9 reader calls `final_name` (spec.md §5's
        // shared-resource policy).
        graph.symbols.follow_all_symbols();
    }

    fn reserved_names(graph: &LinkGraph) -> AHashSet<String> {
        let mut reserved: AHashSet<String> = JS_KEYWORDS.iter().map(|s| s.to_string()).collect();
        for name in graph.symbols.all_unbound_names().into_keys() {
            reserved.insert(name);
        }
        reserved
    }

    /// Collision-avoiding mode: every renameable root keeps its original
    /// name unless that name is already taken, in which case a numeric
    /// suffix is appended and retried. All top-level declarations across
    /// the bundle share one used-name map — post-bundle they live in one
    /// flat namespace, same as the minifier's slot space (spec.md §4.8).
    fn rename(graph: &mut LinkGraph) {
        let reserved = Self::reserved_names(graph);
        let mut used_top_level: AHashSet<String> = reserved.clone();
        let mut retry_counters: AHashMap<String, u32> = AHashMap::default();

        let roots = Self::renameable_roots(graph);
        for r in roots {
            let original = graph.symbols.get(r).name.clone();
            let mut candidate = original.clone();
            while used_top_level.contains(&candidate) {
                let counter = retry_counters.entry(original.clone()).or_insert(0);
                *counter += 1;
                candidate = format!("{original}{}", counter);
            }
            used_top_level.insert(candidate.clone());
            graph.symbols.get_mut(r).name = candidate;
        }
    }

    /// Every union-find root that is renameable: actually declared by some
    /// part (a symbol nothing declares is never printed, so renaming it
    /// would be observationally meaningless), not a runtime helper (their
    /// names are part of the fixed runtime protocol), not
    /// `mustNotBeRenamed`, and not namespace-bound (those render as a
    /// property access, not a bare identifier, so their own name is never
    /// printed).
    fn renameable_roots(graph: &mut LinkGraph) -> Vec<Ref> {
        let mut declared_refs: Vec<Ref> = Vec::new();
        let module_count = graph.symbols.module_count() as u32;
        for source_index in 0..module_count {
            for part in &graph.module(source_index).parts {
                for &(declared, _) in &part.declared_symbols {
                    declared_refs.push(declared);
                }
            }
        }

        let mut seen_roots = AHashSet::default();
        let mut out = Vec::new();
        for r in declared_refs {
            let root = graph.symbols.follow(r);
            if !seen_roots.insert(root) {
                continue;
            }
            let sym = graph.symbols.get(root);
            if sym.must_not_be_renamed || sym.namespace_alias.is_some() {
                continue;
            }
            if runtime::is_runtime_helper_name(&sym.name) {
                continue;
            }
            out.push(root);
        }
        out
    }

    /// Minify mode: every renameable root is assigned a slot, slots are
    /// sorted by total use-count (own declaration counts as one use)
    /// descending with index ascending as tie-break, then handed out short
    /// names in that order from a base-52-then-base-64 generator, skipping
    /// any name in the reserved set (spec.md §4.8).
    fn minify(graph: &mut LinkGraph) {
        let reserved = Self::reserved_names(graph);
        let roots = Self::renameable_roots(graph);

        let mut total_uses: AHashMap<Ref, u64> = AHashMap::default();
        for r in &roots {
            total_uses.insert(*r, 1); // the declaration itself
        }
        let module_count = graph.symbols.module_count() as u32;
        for source_index in 0..module_count {
            for part in &graph.module(source_index).parts {
                for (&used, usage) in &part.symbol_uses {
                    let root = graph.symbols.follow(used);
                    if let Some(count) = total_uses.get_mut(&root) {
                        *count += usage.count_estimate as u64;
                    }
                }
            }
        }

        let mut slots: Vec<(Ref, u64)> = roots.into_iter().map(|r| (r, total_uses[&r])).collect();
        // descending use-count, ascending ref as a stable, deterministic
        // tie-break (acts as "slot index ascending" since `Ref` ordering is
        // (source_index, inner_index), the order roots were discovered in).
        slots.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut generator = ShortNameGenerator::new();
        for (r, _) in slots {
            let mut name = generator.next_name();
            while reserved.contains(&name) {
                name = generator.next_name();
            }
            graph.symbols.get_mut(r).name = name;
        }
    }
}

/// Generates `a`, `b`, … `z`, `A`, … `Z`, `$`, `_`, then `aa`, `ab`, … —
/// base-52 for the first character (letters only, since identifiers can't
/// start with a digit) and base-64 (letters, digits, `$`, `_`) thereafter.
struct ShortNameGenerator {
    next_index: u64,
}

const HEAD_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ$_";
const TAIL_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ$_0123456789";

impl ShortNameGenerator {
    fn new() -> Self {
        Self { next_index: 0 }
    }

    fn next_name(&mut self) -> String {
        let mut index = self.next_index;
        self.next_index += 1;

        let head_len = HEAD_ALPHABET.len() as u64;
        let tail_len = TAIL_ALPHABET.len() as u64;

        let mut chars = Vec::new();
        let head_digit = index % head_len;
        chars.push(HEAD_ALPHABET[head_digit as usize]);
        index /= head_len;

        while index > 0 {
            index -= 1;
            let digit = index % tail_len;
            chars.push(TAIL_ALPHABET[digit as usize]);
            index /= tail_len;
        }

        chars.reverse();
        String::from_utf8(chars).expect("alphabet is ASCII")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::config::LinkerConfig;
    use crate::graph::ModuleGraphBuilder;
    use crate::model::ModuleFlags;

    #[test]
    fn short_name_generator_rolls_over_to_two_letters_without_collisions() {
        let mut gen = ShortNameGenerator::new();
        let names: Vec<String> = (0..60).map(|_| gen.next_name()).collect();
        assert_eq!(names[0], "a");
        assert_eq!(names.len() - names.iter().filter(|n| n.len() == 1).count(), 6);
        assert_eq!(names[54], "aa");
        assert_eq!(names.iter().collect::<AHashSet<_>>().len(), names.len());
    }

    #[test]
    fn collision_avoiding_rename_keeps_distinct_names_distinct() {
        let mut builder = ModuleGraphBuilder::new(LinkerConfig::default(), 0);
        let m0 = builder.add_module("/a.js", ModuleFlags::HAS_ES6_SYNTAX);
        let m1 = builder.add_module("/b.js", ModuleFlags::HAS_ES6_SYNTAX);
        let a = builder.declare_symbol(m0, "foo", SymbolKind::ConstOrLet);
        let b = builder.declare_symbol(m1, "foo", SymbolKind::ConstOrLet);
        let mut part_a = crate::model::Part::new(0);
        part_a.declared_symbols.push((a, true));
        builder.add_part(m0, part_a);
        let mut part_b = crate::model::Part::new(0);
        part_b.declared_symbols.push((b, true));
        builder.add_part(m1, part_b);
        let mut graph = builder.build();

        Renamer::run(&mut graph);

        assert_ne!(graph.symbols.final_name(a), graph.symbols.final_name(b));
    }

    #[test]
    fn minify_assigns_shortest_name_to_most_used_symbol() {
        let mut config = LinkerConfig::default();
        config.minify_identifiers = true;
        let mut builder = ModuleGraphBuilder::new(config, 0);
        let m0 = builder.add_module("/a.js", ModuleFlags::HAS_ES6_SYNTAX);
        let hot = builder.declare_symbol(m0, "hot", SymbolKind::ConstOrLet);
        let cold = builder.declare_symbol(m0, "cold", SymbolKind::ConstOrLet);
        let mut part = crate::model::Part::new(0);
        part.declared_symbols.push((hot, true));
        part.declared_symbols.push((cold, true));
        for _ in 0..10 {
            part.symbol_uses
                .entry(hot)
                .or_insert(crate::model::SymbolUse { count_estimate: 0, is_assigned: false })
                .count_estimate += 1;
        }
        builder.add_part(m0, part);
        let mut graph = builder.build();

        Renamer::run(&mut graph);

        assert_eq!(graph.symbols.final_name(hot), "a");
        assert_eq!(graph.symbols.final_name(cold), "b");
    }
}
