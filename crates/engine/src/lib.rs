//! Script side of the HXP preprocessor.
//!
//! [`Preprocessor::process`] takes one document mixing markup with
//! embedded script blocks and returns a single static markup document:
//! blocks execute in a shared per-document context, declarations carry
//! across blocks and into included files, output can be captured into a
//! buffer, and `$if`/`$elseif`/`$else`/`$end` directives gate regions of
//! output.
//!
//! Recoverable failures never abort a document; they are rendered
//! in-band as `<< Error: … >>` / `<< Undefined: name >>` envelopes so
//! the single return value is always the full document.

mod engine;
mod error;
mod eval;
mod hooks;
mod literal;
mod resolve;
mod rewrite;
mod runtime;
mod value;

pub use engine::{Options, Preprocessor, ProcessOptions};
pub use error::EngineError;
pub use hooks::{Hook, HookContext, relative_url_hook};
pub use literal::render as render_literal;
pub use resolve::{FsLoader, MemoryLoader, SourceLoader, resolve_include};
pub use runtime::{BlockSignal, ConditionalScope};
pub use value::Value;
