//! Interface layout assignment for GLSL programs targeting Vulkan.
//!
//! Program reflection goes in, one [`VariableInfoMap`] per shader stage
//! comes out: every interface variable's descriptor set, binding,
//! location, component and transform feedback slot in the target binding
//! model. The maps are the read-only contract consumed by the SPIR-V
//! rewriter.

mod assign;
mod info;
pub mod names;
mod reflect;
mod stage;

pub use assign::*;
pub use info::*;
pub use reflect::*;
pub use stage::*;
