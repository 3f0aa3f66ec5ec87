//! Linked-program reflection consumed by the allocator. Produced by the
//! GLSL front end and the varying packer; read-only here. Every list
//! keeps the front end's enumeration order, which makes assignment
//! deterministic.

use crate::StageSet;

/// One vertex attribute (stage-local input) with its GLSL location.
#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub location: u32,
    pub component: Option<u32>,
}

/// One fragment shader output. `location` is `None` for outputs the
/// source left without an explicit layout qualifier.
#[derive(Clone, Debug)]
pub struct FragmentOutput {
    pub name: String,
    pub location: Option<u32>,
    pub component: Option<u32>,
}

/// One register of the varying packing table. A varying spanning
/// several registers appears once per register.
#[derive(Clone, Debug)]
pub struct PackedVarying {
    /// Mapped name of the varying, or of the field for struct members.
    pub name: String,
    /// Mapped name of the enclosing struct instance for struct members.
    pub struct_name: Option<String>,
    /// Index of the field within the enclosing struct.
    pub field_index: u32,
    /// Element index for arrays of varyings.
    pub array_index: u32,
    /// Row index within a matrix varying.
    pub row_index: u32,
    /// Assigned register row; becomes the location.
    pub register_row: u32,
    /// Assigned register column; becomes the component when non-zero.
    pub register_column: u32,
    pub is_matrix: bool,
    /// Stages on either side of the interface that carry this varying.
    pub stages: StageSet,
}

/// A varying declared in the program but optimized out of some stages.
#[derive(Clone, Debug)]
pub struct InactiveVarying {
    pub name: String,
    /// Stages where the variable is declared but unused.
    pub stages: StageSet,
}

/// A uniform or storage interface block.
#[derive(Clone, Debug)]
pub struct InterfaceBlock {
    /// Mapped name of the block type; nameless blocks have only this.
    pub name: String,
    pub active_stages: StageSet,
    /// Element index for arrays of blocks; `None` for plain blocks.
    pub array_element: Option<u32>,
}

/// An opaque uniform: sampler, texture or image.
#[derive(Clone, Debug)]
pub struct OpaqueUniform {
    /// Mapped name including array indices, e.g. `u_tex[0][0]`.
    pub name: String,
    pub active_stages: StageSet,
}

#[derive(Clone, Copy, Debug)]
pub struct AtomicCounterBuffer {
    pub active_stages: StageSet,
}

/// Transform feedback capture setup.
#[derive(Clone, Debug)]
pub struct TransformFeedback {
    /// Single interleaved capture buffer vs. one buffer per varying.
    pub interleaved: bool,
    /// Captured varyings in capture order.
    pub varyings: Vec<XfbVarying>,
    /// Byte stride of each capture buffer.
    pub buffer_strides: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct XfbVarying {
    pub name: String,
    /// Captured scalar components, rows times columns for matrices.
    pub components: u32,
}

/// Everything the allocator reads about a linked program.
#[derive(Clone, Debug, Default)]
pub struct ProgramReflection {
    pub active_stages: StageSet,
    pub attributes: Vec<Attribute>,
    pub fragment_outputs: Vec<FragmentOutput>,
    pub varyings: Vec<PackedVarying>,
    pub inactive_varyings: Vec<InactiveVarying>,
    pub uniform_blocks: Vec<InterfaceBlock>,
    pub storage_blocks: Vec<InterfaceBlock>,
    pub atomic_counter_buffers: Vec<AtomicCounterBuffer>,
    pub textures: Vec<OpaqueUniform>,
    pub images: Vec<OpaqueUniform>,
    pub transform_feedback: Option<TransformFeedback>,
}
