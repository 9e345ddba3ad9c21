//! JSON document schema for a serialized linker input, since this crate has
//! no parser of its own to produce a [`bundle_linker::graph::LinkGraph`]
//! from real source files (spec.md §1's out-of-scope list). Mirrors the
//! `serde`-derived config struct's own camelCase convention.

use ahashmap::AHashMap;
use anyhow::{bail, Context, Result};
use bundle_linker::graph::ModuleGraphBuilder;
use bundle_linker::model::{ImportRecord, ImportRecordKind, ModuleFlags, NamedImport};
use bundle_linker::symbol::{Ref, SymbolKind};
use bundle_linker::LinkerConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDocument {
    #[serde(default)]
    pub config: LinkerConfig,
    pub entry_points: Vec<String>,
    pub modules: Vec<InputModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputModule {
    pub path: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<InputSymbol>,
    #[serde(default)]
    pub named_exports: Vec<InputNamedExport>,
    #[serde(default)]
    pub import_records: Vec<InputImportRecord>,
    #[serde(default)]
    pub named_imports: Vec<InputNamedImport>,
    #[serde(default)]
    pub export_stars: Vec<usize>,
    #[serde(default)]
    pub parts: Vec<InputPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSymbol {
    pub name: String,
    #[serde(default = "default_symbol_kind")]
    pub kind: String,
}

fn default_symbol_kind() -> String {
    "other".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputNamedExport {
    pub alias: String,
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputImportRecord {
    pub kind: String,
    pub path: String,
    /// Absolute path of the resolved target module, or absent for an
    /// external (unresolvable) import.
    #[serde(default)]
    pub resolved: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputNamedImport {
    pub symbol: String,
    pub alias: String,
    pub import_record: usize,
    #[serde(default)]
    pub was_exported: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPart {
    pub stmts: Vec<Vec<InputToken>>,
    #[serde(default)]
    pub declared_symbols: Vec<String>,
    #[serde(default)]
    pub symbol_uses: Vec<InputSymbolUse>,
    #[serde(default)]
    pub import_records: Vec<usize>,
    #[serde(default)]
    pub local_dependencies: Vec<usize>,
    #[serde(default = "default_true")]
    pub can_be_removed_if_unused: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSymbolUse {
    pub symbol: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub assigned: bool,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InputToken {
    Text { text: String },
    Ident { ident: String },
}

fn parse_symbol_kind(kind: &str) -> Result<SymbolKind> {
    Ok(match kind {
        "unbound" => SymbolKind::Unbound,
        "hoisted" => SymbolKind::Hoisted,
        "hoistedFunction" => SymbolKind::HoistedFunction,
        "other" => SymbolKind::Other,
        "class" => SymbolKind::Class,
        "generator" => SymbolKind::Generator,
        "import" => SymbolKind::Import,
        "constOrLet" => SymbolKind::ConstOrLet,
        "label" => SymbolKind::Label,
        other => bail!("unknown symbol kind \"{other}\""),
    })
}

fn parse_module_flags(flags: &[String]) -> Result<ModuleFlags> {
    let mut out = ModuleFlags::empty();
    for flag in flags {
        out |= match flag.as_str() {
            "hasEs6Exports" => ModuleFlags::HAS_ES6_EXPORTS,
            "hasEs6Syntax" => ModuleFlags::HAS_ES6_SYNTAX,
            "hasCjsFeatures" => ModuleFlags::HAS_CJS_FEATURES,
            "usesExportsRef" => ModuleFlags::USES_EXPORTS_REF,
            "usesModuleRef" => ModuleFlags::USES_MODULE_REF,
            "hasLazyExport" => ModuleFlags::HAS_LAZY_EXPORT,
            "wasTypeScript" => ModuleFlags::WAS_TYPESCRIPT,
            "hasNoSideEffects" => ModuleFlags::HAS_NO_SIDE_EFFECTS,
            other => bail!("unknown module flag \"{other}\""),
        };
    }
    Ok(out)
}

fn parse_import_record_kind(kind: &str) -> Result<ImportRecordKind> {
    Ok(match kind {
        "stmtImport" => ImportRecordKind::StmtImport,
        "requireCall" => ImportRecordKind::RequireCall,
        "dynamicImport" => ImportRecordKind::DynamicImport,
        other => bail!("unknown import record kind \"{other}\""),
    })
}

/// Builds a [`bundle_linker::graph::LinkGraph`] from a parsed
/// [`InputDocument`]. Modules are registered in a first pass (so forward
/// references between modules resolve), then filled in in a second pass.
pub fn build_graph(doc: InputDocument) -> Result<bundle_linker::graph::LinkGraph> {
    let mut builder = ModuleGraphBuilder::new(doc.config, doc.entry_points.len());

    let mut source_indices = Vec::with_capacity(doc.modules.len());
    for module in &doc.modules {
        let flags = parse_module_flags(&module.flags)
            .with_context(|| format!("module \"{}\"", module.path))?;
        source_indices.push(builder.add_module(module.path.clone(), flags));
    }

    for (module, &source_index) in doc.modules.iter().zip(&source_indices) {
        let mut symbol_by_name: AHashMap<String, Ref> = AHashMap::default();
        for symbol in &module.symbols {
            let kind = parse_symbol_kind(&symbol.kind)
                .with_context(|| format!("module \"{}\", symbol \"{}\"", module.path, symbol.name))?;
            let r = builder.declare_symbol(source_index, symbol.name.clone(), kind);
            symbol_by_name.insert(symbol.name.clone(), r);
        }

        let resolve = |name: &str| -> Result<Ref> {
            symbol_by_name
                .get(name)
                .copied()
                .with_context(|| format!("module \"{}\" has no symbol \"{name}\"", module.path))
        };

        for export in &module.named_exports {
            let r = resolve(&export.symbol)?;
            builder.add_named_export(source_index, export.alias.clone(), r);
        }

        let mut record_indices = Vec::with_capacity(module.import_records.len());
        for record in &module.import_records {
            let kind = parse_import_record_kind(&record.kind)
                .with_context(|| format!("module \"{}\"", module.path))?;
            let mut import_record = ImportRecord::new(kind, record.path.clone());
            if let Some(resolved_path) = &record.resolved {
                let target = builder.resolve_path(resolved_path).with_context(|| {
                    format!(
                        "module \"{}\" imports unresolvable path \"{resolved_path}\"",
                        module.path
                    )
                })?;
                import_record = import_record.resolved(target);
            }
            record_indices.push(builder.add_import_record(source_index, import_record));
        }

        for export_star in &module.export_stars {
            let Some(&record_index) = record_indices.get(*export_star) else {
                bail!(
                    "module \"{}\" has an export-star referencing out-of-range import record {export_star}",
                    module.path
                );
            };
            builder.add_export_star(source_index, record_index);
        }

        for named_import in &module.named_imports {
            let r = resolve(&named_import.symbol)?;
            let Some(&import_record_index) = record_indices.get(named_import.import_record) else {
                bail!(
                    "module \"{}\" named import references out-of-range import record {}",
                    module.path,
                    named_import.import_record
                );
            };
            builder.add_named_import(
                source_index,
                r,
                NamedImport {
                    alias: named_import.alias.clone(),
                    namespace_ref: None,
                    import_record_index,
                    was_exported: named_import.was_exported,
                },
            );
        }

        for part in &module.parts {
            let mut built_part = bundle_linker::model::Part::new(0);
            built_part.can_be_removed_if_unused = part.can_be_removed_if_unused;
            for name in &part.declared_symbols {
                built_part.declared_symbols.push((resolve(name)?, true));
            }
            for use_ in &part.symbol_uses {
                built_part.symbol_uses.insert(
                    resolve(&use_.symbol)?,
                    bundle_linker::model::SymbolUse {
                        count_estimate: use_.count,
                        is_assigned: use_.assigned,
                    },
                );
            }
            for &idx in &part.import_records {
                let Some(&record_index) = record_indices.get(idx) else {
                    bail!(
                        "module \"{}\" part references out-of-range import record {idx}",
                        module.path
                    );
                };
                built_part.import_record_indices.push(record_index);
            }
            built_part.local_dependencies = part.local_dependencies.clone();
            for stmt in &part.stmts {
                let mut built_stmt = Vec::with_capacity(stmt.len());
                for token in stmt {
                    built_stmt.push(match token {
                        InputToken::Text { text } => bundle_linker::model::StmtToken::Text(text.clone()),
                        InputToken::Ident { ident } => bundle_linker::model::StmtToken::Ident(resolve(ident)?),
                    });
                }
                built_part.stmts.push(built_stmt);
            }
            builder.add_part(source_index, built_part);
        }
    }

    for entry_path in &doc.entry_points {
        builder.resolve_path(entry_path).with_context(|| {
            format!("entry point \"{entry_path}\" does not match any module's \"path\"")
        })?;
        builder.mark_user_entry_point(entry_path);
    }

    Ok(builder.build())
}
