use bitflags::bitflags;
use derive_more::Display;
use enum_map::{Enum, EnumMap};

/// Per-stage table, e.g. one `VariableInfoMap` per active stage.
pub type ShaderMap<T> = EnumMap<ShaderStage, T>;

#[derive(Clone, Copy, Debug, Display, Enum, Eq, Hash, PartialEq)]
pub enum ShaderStage {
    #[display(fmt = "vert")]
    Vertex,
    #[display(fmt = "tesc")]
    TessControl,
    #[display(fmt = "tese")]
    TessEval,
    #[display(fmt = "geom")]
    Geometry,
    #[display(fmt = "frag")]
    Fragment,
    #[display(fmt = "comp")]
    Compute,
}

impl ShaderStage {
    /// All stages in pipeline order.
    pub const ALL: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::TessControl,
        ShaderStage::TessEval,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];
}

bitflags! {
    pub struct StageSet: u8 {
        const VERTEX = 1 << 0;
        const TESS_CONTROL = 1 << 1;
        const TESS_EVAL = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
    }
}

impl Default for StageSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<ShaderStage> for StageSet {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::TessControl => Self::TESS_CONTROL,
            ShaderStage::TessEval => Self::TESS_EVAL,
            ShaderStage::Geometry => Self::GEOMETRY,
            ShaderStage::Fragment => Self::FRAGMENT,
            ShaderStage::Compute => Self::COMPUTE,
        }
    }
}

impl StageSet {
    #[inline]
    pub fn contains_stage(self, stage: ShaderStage) -> bool {
        self.contains(stage.into())
    }

    /// Stages present in the set, in pipeline order.
    pub fn stages(self) -> impl Iterator<Item = ShaderStage> {
        ShaderStage::ALL
            .iter()
            .copied()
            .filter(move |&stage| self.contains_stage(stage))
    }
}
