//! Binary SPIR-V rewriting against a reflection-derived interface
//! layout.
//!
//! The GLSL front end emits modules decorated with whatever bindings
//! and locations it liked; [`transform_spirv`] re-emits such a module
//! with the decorations, capabilities and entry point interface
//! dictated by a [`layout::VariableInfoMap`]. Input modules are trusted
//! compiler output; mismatches against the map are caller bugs and
//! panic.

use spirv_headers as spv;

mod diag;
mod resolve;
mod rewrite;
#[cfg(test)]
mod testing;
mod words;

pub use diag::validate_words;
pub use rewrite::{transform_spirv, TransformOptions};
pub use words::*;

pub(crate) fn is_interface_storage(class: spv::StorageClass) -> bool {
    [
        spv::StorageClass::Uniform,
        spv::StorageClass::StorageBuffer,
        spv::StorageClass::UniformConstant,
        spv::StorageClass::Input,
        spv::StorageClass::Output,
    ]
    .contains(&class)
}
