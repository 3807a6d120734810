//! Rendering of IR modules into host-language source.

pub mod rust;

use crate::ir::Module;

pub use rust::RustBackend;

pub trait Backend {
    fn render(&self, module: &Module) -> String;
}
