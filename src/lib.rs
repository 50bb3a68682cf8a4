//! Jenkins declarative pipeline → GitHub Actions converter.
//!
//! `convert::convert` runs the whole pipeline; the phase modules are public
//! for hosts that want the IR, the job graph or the score on their own.

pub mod codegen;
pub mod config;
pub mod convert;
pub mod error;
pub mod graph;
pub mod ir;
pub mod lower;
pub mod parse;
pub mod score;
pub mod translate;
pub mod wasm;

pub use config::ConvertOptions;
pub use convert::{analyze, convert, ConversionOutput};
pub use error::ConvertError;
