//! Model source templates and the values rendered into them

use serde::Serialize;
use strata_migrate::{ColumnSpec, ModelDescriptor, SqlType};
use tinytemplate::TinyTemplate;

use crate::error::{CodegenError, CodegenResult};

/// Present in every generated file; only files carrying it are ever removed
pub const GENERATED_MARKER: &str = "Generated by `strata sync`";

pub static MODEL_TEMPLATE: &str = r#"//! Model for the `{table_name}` table.
//!
//! Generated by `strata sync` from the migration files; changes are overwritten.

use serde::\{Deserialize, Serialize\};

use super::{base_trait};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct {struct_name} \{
{{ for field in fields }}{{ if field.renamed }}    #[serde(rename = "{field.column}")]
    #[sqlx(rename = "{field.column}")]
{{ endif }}    pub {field.name}: {field.rust_type},
{{ endfor }}\}

impl {base_trait} for {struct_name} \{
    const TABLE_NAME: &'static str = "{table_name}";
\}
"#;

pub static INDEX_TEMPLATE: &str = r#"//! Data-access models.
//!
//! Generated by `strata sync` from the migration files; changes are overwritten.

/// Implemented by every generated model
pub trait {base_trait} \{
    /// Table the model is stored in
    const TABLE_NAME: &'static str;
\}
{{ for model in models }}
pub mod {model.module};
pub use {model.module}::{model.struct_name};
{{ endfor }}"#;

const STRICT_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod",
    "move", "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true",
    "try", "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final",
    "macro", "override", "priv", "typeof", "unsized", "virtual", "yield",
];

#[derive(Debug, Clone, Serialize)]
pub struct FieldContext {
    pub name: String,
    pub column: String,
    pub rust_type: String,
    pub renamed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelContext {
    pub table_name: String,
    pub struct_name: String,
    pub module: String,
    pub base_trait: String,
    pub fields: Vec<FieldContext>,
}

#[derive(Serialize)]
struct IndexContext<'a> {
    base_trait: &'a str,
    models: &'a [ModelContext],
}

impl ModelContext {
    pub fn new(model: &ModelDescriptor, base_trait: &str) -> Self {
        let fields = model
            .columns
            .iter()
            .map(|column| {
                let name = rust_ident(&column.name.to_lowercase());
                FieldContext {
                    renamed: name != column.name,
                    name,
                    column: column.name.clone(),
                    rust_type: rust_type(column),
                }
            })
            .collect();

        Self {
            table_name: model.table_name.clone(),
            struct_name: struct_name(&model.table_name),
            module: module_name(&model.table_name),
            base_trait: base_trait.to_string(),
            fields,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.rs", self.module)
    }
}

/// `user_profiles` -> `UserProfiles`
pub fn struct_name(table_name: &str) -> String {
    table_name
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn module_name(table_name: &str) -> String {
    rust_ident(&table_name.to_lowercase())
}

/// Keywords get a trailing underscore
fn rust_ident(name: &str) -> String {
    if STRICT_KEYWORDS.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

/// Field type for a column; nullable columns become `Option<T>`
pub fn rust_type(column: &ColumnSpec) -> String {
    let base = match column.sql_type {
        SqlType::Varchar(_) | SqlType::Text => "String",
        SqlType::Integer => "i32",
        SqlType::BigInt => "i64",
        SqlType::Decimal { .. } => "rust_decimal::Decimal",
        SqlType::Boolean => "bool",
        SqlType::Timestamp => "chrono::NaiveDateTime",
        SqlType::Date => "chrono::NaiveDate",
        SqlType::Json => "serde_json::Value",
        SqlType::Uuid => "uuid::Uuid",
    };
    if column.nullable {
        format!("Option<{}>", base)
    } else {
        base.to_string()
    }
}

/// Compiled model templates
pub struct ModelRenderer<'a> {
    templates: TinyTemplate<'a>,
}

impl<'a> ModelRenderer<'a> {
    pub fn new() -> CodegenResult<Self> {
        let mut templates = TinyTemplate::new();
        templates.set_default_formatter(&tinytemplate::format_unescaped);
        templates.add_template("model", MODEL_TEMPLATE)?;
        templates.add_template("index", INDEX_TEMPLATE)?;
        Ok(Self { templates })
    }

    pub fn render_model(&self, context: &ModelContext) -> CodegenResult<String> {
        if struct_name(&context.table_name).is_empty() {
            return Err(CodegenError::InvalidName {
                what: "a model struct",
                value: context.table_name.clone(),
            });
        }
        Ok(self.templates.render("model", context)?)
    }

    pub fn render_index(&self, base_trait: &str, models: &[ModelContext]) -> CodegenResult<String> {
        Ok(self
            .templates
            .render("index", &IndexContext { base_trait, models })?)
    }
}
