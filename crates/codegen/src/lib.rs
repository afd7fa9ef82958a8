//! # strata-codegen
//!
//! Renders the data-access mirror: one Rust model per table, rebuilt by
//! replaying the authored migrations in order.

pub mod error;
pub mod synchronizer;
pub mod templates;
pub mod writer;

pub use error::{CodegenError, CodegenResult};
pub use synchronizer::ModelSynchronizer;
pub use templates::{ModelContext, ModelRenderer, GENERATED_MARKER};
pub use writer::CodeWriter;
