//! §4.9: order files within a chunk, produce concatenated output, and merge
//! per-file source-map chunks. Runs one task per chunk in parallel and, in
//! each task, one subtask per file, mirroring the `par_iter`/`flatten` shape
//! `unused_finder::graph::Graph::bfs_step` already uses for its own
//! parallel frontier expansion (spec.md §5: "one task per chunk ... one
//! subtask per file in the chunk in parallel").
//!
//! The real printer (serializing an AST back to source text with mapping
//! chunks) is an external collaborator (spec.md §1's out-of-scope list);
//! here `render_stmt` stands in for it, resolving each part's token stream
//! directly since that token stream already *is* this crate's printable
//! representation (see `model::StmtToken`'s doc comment).

use base64::Engine;
use rayon::prelude::*;
use sourcemap::SourceMapBuilder;

use crate::bitset::BitSet;
use crate::chunker::Chunk;
use crate::config::SourceMapMode;
use crate::cross_chunk_linker::CrossChunkLinks;
use crate::graph::LinkGraph;
use crate::model::{ModuleFlags, OutputFormat, SourceIndex, Stmt, StmtToken};
use crate::runtime;

pub struct OutputFile {
    pub abs_path: String,
    pub contents: String,
    /// Present whenever `SourceMapMode` is not `None`; written to a sibling
    /// `<abs_path>.map` file unless the mode is `Inline`, in which case the
    /// caller should skip writing it separately (the URL comment already
    /// embeds it as a data URL — see `ChunkEmitter::emit_chunk`).
    pub source_map_json: Option<String>,
}

pub struct ChunkEmitter;

impl ChunkEmitter {
    /// Emits every chunk in parallel. Must run only after `Renamer::run`
    /// (and therefore `SymbolMap::follow_all_symbols`) has completed — no
    /// writer touches the symbol map past that point, so every reader here
    /// only ever reads, matching spec.md §5's shared-resource policy.
    pub fn emit_all(graph: &LinkGraph, chunks: &[Chunk], links: &CrossChunkLinks) -> Vec<OutputFile> {
        chunks
            .par_iter()
            .enumerate()
            .map(|(chunk_index, chunk)| Self::emit_chunk(graph, chunks, links, chunk_index, chunk))
            .collect()
    }

    fn emit_chunk(
        graph: &LinkGraph,
        chunks: &[Chunk],
        links: &CrossChunkLinks,
        chunk_index: usize,
        chunk: &Chunk,
    ) -> OutputFile {
        // One subtask per file, run in parallel; each returns its own
        // rendered block plus any deferred entry-point tail lines.
        let per_file: Vec<(Vec<String>, Vec<String>)> = chunk
            .files
            .par_iter()
            .map(|&source_index| Self::render_file(graph, &chunk.signature, source_index))
            .collect();

        let mut body_lines: Vec<String> = Vec::new();
        let mut tail_lines: Vec<String> = Vec::new();
        for (file_lines, tail) in per_file {
            body_lines.extend(file_lines);
            tail_lines.extend(tail);
        }

        if graph.config.mangle_syntax {
            body_lines = Self::merge_adjacent_declarations(body_lines);
        }

        let mut out: Vec<String> = Vec::new();

        for import in &links.imports[chunk_index] {
            let from_name = &chunks[import.from_chunk].name;
            if import.bindings.is_empty() {
                out.push(format!("import \"./{from_name}\";"));
            } else {
                let mut names: Vec<&str> = import
                    .bindings
                    .iter()
                    .map(|r| graph.symbols.final_name(*r))
                    .collect();
                names.sort_unstable();
                out.push(format!("import {{ {} }} from \"./{from_name}\";", names.join(", ")));
            }
        }

        let wrap_in_iife = matches!(graph.config.output_format, OutputFormat::Iife);
        if wrap_in_iife {
            match &graph.config.module_name {
                Some(name) => out.push(format!("var {name} = (() => {{")),
                None => out.push("(() => {".to_string()),
            }
        }

        out.extend(body_lines);
        out.extend(tail_lines);

        let export = &links.exports[chunk_index];
        if !chunk.is_entry_point && !export.refs.is_empty() {
            let mut names: Vec<&str> = export
                .refs
                .iter()
                .map(|r| graph.symbols.final_name(*r))
                .collect();
            names.sort_unstable();
            out.push(format!("export {{ {} }};", names.join(", ")));
        }

        if wrap_in_iife {
            out.push("})();".to_string());
        }

        let source_map_json = if graph.config.source_map != SourceMapMode::None {
            Some(Self::build_source_map(graph, chunk, &out))
        } else {
            None
        };

        let mut contents = out.join("\n");
        contents.push('\n');
        match graph.config.source_map {
            SourceMapMode::LinkedWithComment => {
                contents.push_str(&format!("//# sourceMappingURL={}.map\n", chunk.name));
            }
            SourceMapMode::Inline => {
                if let Some(json) = &source_map_json {
                    let encoded =
                        base64::engine::general_purpose::STANDARD.encode(json.as_bytes());
                    contents.push_str(&format!(
                        "//# sourceMappingURL=data:application/json;base64,{encoded}\n"
                    ));
                }
            }
            SourceMapMode::None | SourceMapMode::ExternalWithoutComment => {}
        }

        OutputFile {
            abs_path: chunk.name.clone(),
            contents,
            source_map_json,
        }
    }

    /// Renders one file's contribution to a chunk: the namespace-export
    /// part's statements first (the "prefix"), then every other included
    /// part in declaration order, CJS-wrapped in `__commonJS` when the
    /// module is `cjsWrap`. The entry-point export tail is returned
    /// separately since it's emitted once, after every file, not inline
    /// (spec.md §4.9's assembly order).
    fn render_file(graph: &LinkGraph, signature: &BitSet, source_index: SourceIndex) -> (Vec<String>, Vec<String>) {
        let module = graph.module(source_index);
        let mut prefix_lines = Vec::new();
        let mut normal_lines = Vec::new();
        let mut tail_lines = Vec::new();

        for (part_index, part) in module.parts.iter().enumerate() {
            if part.entry_bits != *signature {
                continue;
            }
            let lines: Vec<String> = part.stmts.iter().map(|stmt| Self::render_stmt(graph, stmt)).collect();
            if Some(part_index) == module.ns_export_part_index {
                prefix_lines.extend(lines);
            } else if Some(part_index) == module.entry_export_tail_part_index {
                tail_lines.extend(lines);
            } else {
                normal_lines.extend(lines);
            }
        }

        let mut body = Vec::new();
        let is_runtime = source_index == runtime::RUNTIME_SOURCE_INDEX;
        if !is_runtime {
            body.push(format!("// {}", module.abs_path));
        }

        if module.is_cjs_wrap() {
            let wrapper_name = graph.symbols.final_name(
                module.wrapper_ref.expect("cjsWrap module always has wrapper_ref"),
            );
            let common_js = graph.symbols.final_name(graph.runtime.common_js);
            body.push(format!("var {wrapper_name} = {common_js}((exports, module) => {{"));
            for line in prefix_lines.into_iter().chain(normal_lines) {
                body.push(format!("  {line}"));
            }
            body.push("});".to_string());
        } else {
            // Not cjsWrap: either a static ESM module or a cjsStyleExports
            // module with no wrapper (entry-point-only CJS), so its own
            // statements (and any ES import/export lines) sit outside any
            // closure — there isn't one.
            body.extend(prefix_lines);
            body.extend(normal_lines);
        }

        (body, tail_lines)
    }

    fn render_stmt(graph: &LinkGraph, stmt: &Stmt) -> String {
        stmt.iter()
            .map(|token| match token {
                StmtToken::Text(text) => text.clone(),
                StmtToken::Ident(r) => graph.symbols.final_name(*r).to_string(),
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// A minification hint (spec.md §4.9 step 4): adjacent `var`/`let`/
    /// `const` declarations of the same kind collapse into one statement.
    /// Operates on rendered text since parts carry token streams, not a
    /// real AST, to merge against.
    fn merge_adjacent_declarations(lines: Vec<String>) -> Vec<String> {
        const KEYWORDS: [&str; 3] = ["var ", "let ", "const "];
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        for line in lines {
            let this_kw = KEYWORDS.iter().find(|kw| line.starts_with(*kw));
            if let (Some(kw), Some(prev)) = (this_kw, out.last_mut()) {
                if prev.starts_with(kw) && prev.ends_with(';') {
                    let merged_tail = line.trim_start_matches(kw).trim_end_matches(';').to_string();
                    prev.truncate(prev.len() - 1); // drop trailing ';'
                    prev.push_str(", ");
                    prev.push_str(&merged_tail);
                    prev.push(';');
                    continue;
                }
            }
            out.push(line);
        }
        out
    }

    /// A coarse but honest source map: the token-stream data model carries
    /// no per-statement original line/column (the real lexer/printer that
    /// would is out of scope, spec.md §1), so this maps each *emitted
    /// line* back to line 0, column 0 of the module that produced it —
    /// enough to satisfy "maps back to some original location within the
    /// right source file" (spec.md §8 property 7) without claiming a
    /// precision this crate's inputs don't carry.
    fn build_source_map(graph: &LinkGraph, chunk: &Chunk, out_lines: &[String]) -> String {
        let mut builder = SourceMapBuilder::new(Some(&chunk.name));

        let mut path_comment_to_source: Vec<(usize, SourceIndex)> = Vec::new();
        for &source_index in &chunk.files {
            builder.add_source(&graph.module(source_index).abs_path);
        }
        for (line_no, line) in out_lines.iter().enumerate() {
            if let Some(path) = line.strip_prefix("// ") {
                if let Some(source_index) = chunk.files.iter().copied().find(|&s| graph.module(s).abs_path == path) {
                    path_comment_to_source.push((line_no, source_index));
                }
            }
        }

        let mut current_source: Option<SourceIndex> = None;
        let mut marker_iter = path_comment_to_source.into_iter().peekable();
        for line_no in 0..out_lines.len() {
            if let Some(&(marker_line, source_index)) = marker_iter.peek() {
                if marker_line == line_no {
                    current_source = Some(source_index);
                    marker_iter.next();
                }
            }
            if let Some(source_index) = current_source {
                let path = graph.module(source_index).abs_path.clone();
                builder.add(line_no as u32, 0, 0, 0, Some(path.as_str()), None);
            }
        }

        let sm = builder.into_sourcemap();
        let mut buf: Vec<u8> = Vec::new();
        sm.to_writer(&mut buf).expect("serializing the generated source map should never fail");
        String::from_utf8(buf).expect("source map JSON is always valid UTF-8")
    }
}
