//! Names of interface variables synthesized by the GLSL front end. The
//! allocator and the front end agree on these by construction.

use crate::ShaderStage;

/// Driver-level uniforms shared by every stage of every pipeline.
pub const DRIVER_UNIFORMS_BLOCK: &str = "driverUniforms";

/// Storage block holding all atomic counters of a stage.
pub const ATOMIC_COUNTERS_BLOCK: &str = "atomicCounters";

/// Prefix of the per-buffer storage blocks used when transform feedback
/// is emulated; the buffer index is appended.
pub const XFB_EMULATION_BUFFER_PREFIX: &str = "xfbBuffer";

/// Uniform block holding the non-opaque default uniforms of a stage.
pub fn default_uniforms_block(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "defaultUniformsVS",
        ShaderStage::TessControl => "defaultUniformsTCS",
        ShaderStage::TessEval => "defaultUniformsTES",
        ShaderStage::Geometry => "defaultUniformsGS",
        ShaderStage::Fragment => "defaultUniformsFS",
        ShaderStage::Compute => "defaultUniformsCS",
    }
}

pub fn xfb_emulation_buffer(index: u32) -> String {
    format!("{}{}", XFB_EMULATION_BUFFER_PREFIX, index)
}

/// Output variable mirroring a captured built-in varying, e.g.
/// `xfbPositionOut` for `gl_Position`.
pub fn xfb_builtin_out(builtin: &str) -> String {
    assert!(builtin.starts_with("gl_"), "not a built-in: {}", builtin);
    format!("xfb{}Out", &builtin["gl_".len()..])
}
