use fnv::FnvHashMap;

use crate::{ShaderStage, StageSet};

/// Transform feedback capture slot. Either the whole triple is known or
/// the variable is not captured, hence a single optional struct.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct XfbInfo {
    pub buffer: u32,
    pub offset: u32,
    pub stride: u32,
}

/// Where one shader interface variable lives in the target binding
/// model.
///
/// Fields start out unassigned and are written at most once by the
/// allocator; the rewriter only reads them. A variable can be present
/// but inactive in a stage, in which case nothing is assigned and the
/// rewriter neutralizes it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VariableInfo {
    descriptor_set: Option<u32>,
    binding: Option<u32>,
    location: Option<u32>,
    component: Option<u32>,
    active_stages: StageSet,
    xfb: Option<XfbInfo>,
}

impl VariableInfo {
    #[inline]
    pub fn descriptor_set(&self) -> Option<u32> {
        self.descriptor_set
    }

    #[inline]
    pub fn binding(&self) -> Option<u32> {
        self.binding
    }

    #[inline]
    pub fn location(&self) -> Option<u32> {
        self.location
    }

    #[inline]
    pub fn component(&self) -> Option<u32> {
        self.component
    }

    #[inline]
    pub fn xfb(&self) -> Option<XfbInfo> {
        self.xfb
    }

    #[inline]
    pub fn active_stages(&self) -> StageSet {
        self.active_stages
    }

    #[inline]
    pub fn is_active(&self, stage: ShaderStage) -> bool {
        self.active_stages.contains_stage(stage)
    }

    pub fn add_stage(&mut self, stage: ShaderStage) {
        self.active_stages |= stage.into();
    }

    pub fn add_stages(&mut self, stages: StageSet) {
        self.active_stages |= stages;
    }

    pub fn set_descriptor_set(&mut self, set: u32) {
        assert!(self.descriptor_set.is_none(), "descriptor set set twice");
        self.descriptor_set = Some(set);
    }

    pub fn set_binding(&mut self, binding: u32) {
        assert!(self.binding.is_none(), "binding set twice");
        self.binding = Some(binding);
    }

    pub fn set_location(&mut self, location: u32) {
        assert!(self.location.is_none(), "location set twice");
        self.location = Some(location);
    }

    pub fn set_component(&mut self, component: u32) {
        assert!(self.component.is_none(), "component set twice");
        self.component = Some(component);
    }

    pub fn set_xfb(&mut self, xfb: XfbInfo) {
        assert!(self.xfb.is_none(), "transform feedback slot set twice");
        self.xfb = Some(xfb);
    }
}

/// Interface variable records for one shader stage, keyed by mapped GLSL
/// name. Interface blocks, nameless ones included, key by the block
/// type's name.
#[derive(Clone, Debug, Default)]
pub struct VariableInfoMap {
    map: FnvHashMap<String, VariableInfo>,
}

impl VariableInfoMap {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a fresh record for `name`. Every name is assigned from
    /// exactly one place.
    pub fn add(&mut self, name: impl Into<String>) -> &mut VariableInfo {
        let name = name.into();
        assert!(
            !self.map.contains_key(&name),
            "duplicate interface variable: {}",
            name,
        );
        self.map.entry(name).or_default()
    }

    pub fn get_or_add(&mut self, name: impl Into<String>) -> &mut VariableInfo {
        self.map.entry(name.into()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&VariableInfo> {
        self.map.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut VariableInfo> {
        self.map.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableInfo)> {
        self.map.iter().map(|(name, info)| (name.as_str(), info))
    }
}
