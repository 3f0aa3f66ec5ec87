use derivative::Derivative;
use enum_map::{enum_map, Enum, EnumMap};
use fnv::FnvHashMap;
use log::{debug, trace};
use more_asserts::assert_le;

use crate::names;
use crate::reflect::*;
use crate::{ShaderMap, ShaderStage, StageSet, VariableInfoMap, XfbInfo};

/// Resource categories, each with its own descriptor set and binding
/// counter.
#[derive(Clone, Copy, Debug, Enum, Eq, Hash, PartialEq)]
pub enum DescriptorCategory {
    /// Default uniform blocks plus emulated transform feedback buffers.
    UniformsAndXfb,
    Textures,
    /// Uniform/storage blocks, atomic counters and images.
    ShaderResources,
    DriverUniforms,
}

/// How transform feedback capture reaches the GPU.
#[derive(Clone, Copy, Debug, Derivative, Eq, PartialEq)]
#[derivative(Default)]
pub enum XfbMode {
    /// Hardware capture; the rewriter injects the capability and the
    /// buffer/stride/offset decorations.
    #[derivative(Default)]
    Extension,
    /// Capture through storage buffers written by shader code; the
    /// rewriter sees plain storage blocks and nothing else.
    Emulation,
}

#[derive(Clone, Debug)]
pub struct AssignOptions {
    /// Descriptor set index used for each resource category.
    pub descriptor_sets: EnumMap<DescriptorCategory, u32>,
    pub xfb_mode: XfbMode,
}

impl Default for AssignOptions {
    fn default() -> Self {
        Self {
            descriptor_sets: enum_map! {
                DescriptorCategory::UniformsAndXfb => 0,
                DescriptorCategory::Textures => 1,
                DescriptorCategory::ShaderResources => 2,
                DescriptorCategory::DriverUniforms => 3,
            },
            xfb_mode: Default::default(),
        }
    }
}

/// Allocation cursor, owned by the allocator for the duration of one
/// program assignment. Resources named identically in several stages
/// reuse their first assignment.
#[derive(Clone, Debug)]
pub struct ProgramInterfaceInfo {
    descriptor_sets: EnumMap<DescriptorCategory, u32>,
    next_binding: EnumMap<DescriptorCategory, u32>,
    assigned: FnvHashMap<String, (u32, u32)>,
    locations_used_for_xfb: u32,
}

impl ProgramInterfaceInfo {
    fn new(options: &AssignOptions) -> Self {
        Self {
            descriptor_sets: options.descriptor_sets.clone(),
            next_binding: Default::default(),
            assigned: Default::default(),
            locations_used_for_xfb: 0,
        }
    }

    fn set(&self, category: DescriptorCategory) -> u32 {
        self.descriptor_sets[category]
    }

    /// Set and binding for a named resource, allocating on first use.
    fn resource_binding(
        &mut self,
        category: DescriptorCategory,
        name: &str,
    ) -> (u32, u32) {
        let set = self.set(category);
        if let Some(&assigned) = self.assigned.get(name) {
            assert_eq!(assigned.0, set, "category changed for {}", name);
            return assigned;
        }
        let binding = self.next_binding[category];
        self.next_binding[category] += 1;
        debug!("binding {}.{} -> {}", set, binding, name);
        self.assigned.insert(name.to_owned(), (set, binding));
        (set, binding)
    }
}

/// Builds the per-stage variable info maps for a linked program.
///
/// Runs once per program link. The result is deterministic: identical
/// reflection input yields identical maps.
pub fn assign_program_interface(
    reflection: &ProgramReflection,
    options: &AssignOptions,
) -> ShaderMap<VariableInfoMap> {
    trace!(
        "assign_program_interface(active_stages: {:?})",
        reflection.active_stages,
    );

    let mut maps = ShaderMap::<VariableInfoMap>::default();
    let mut interface = ProgramInterfaceInfo::new(options);

    for stage in reflection.active_stages.stages() {
        let map = &mut maps[stage];
        match stage {
            ShaderStage::Vertex => assign_attribute_locations(reflection, map),
            ShaderStage::Fragment => assign_output_locations(reflection, map),
            _ => {}
        }
        if stage != ShaderStage::Compute {
            assign_varying_locations(reflection, stage, map);
        }
        assign_uniform_bindings(reflection, stage, &mut interface, map);
        assign_texture_bindings(reflection, stage, &mut interface, map);
        assign_non_texture_bindings(reflection, stage, &mut interface, map);
    }

    if let Some(xfb) = &reflection.transform_feedback {
        let stage = transform_feedback_stage(reflection.active_stages);
        let map = &mut maps[stage];
        match options.xfb_mode {
            XfbMode::Extension => {
                assign_xfb_extension(xfb, stage, &mut interface, map)
            }
            XfbMode::Emulation => {
                assign_xfb_emulation(xfb, stage, &mut interface, map)
            }
        }
    }

    maps
}

/// The last vertex processing stage, whose outputs are captured.
fn transform_feedback_stage(active: StageSet) -> ShaderStage {
    if active.contains_stage(ShaderStage::Geometry) {
        ShaderStage::Geometry
    } else if active.contains_stage(ShaderStage::TessEval) {
        ShaderStage::TessEval
    } else {
        assert!(active.contains_stage(ShaderStage::Vertex));
        ShaderStage::Vertex
    }
}

fn assign_attribute_locations(
    reflection: &ProgramReflection,
    map: &mut VariableInfoMap,
) {
    for attr in reflection.attributes.iter() {
        let info = map.add(attr.name.as_str());
        info.set_location(attr.location);
        if let Some(component) = attr.component {
            info.set_component(component);
        }
        info.add_stage(ShaderStage::Vertex);
    }
}

fn assign_output_locations(
    reflection: &ProgramReflection,
    map: &mut VariableInfoMap,
) {
    // Legacy gl_FragColor/gl_FragData never take part in assignment.
    let user_outputs: Vec<_> = reflection
        .fragment_outputs
        .iter()
        .filter(|out| !out.name.starts_with("gl_"))
        .collect();
    for out in user_outputs.iter() {
        let location = out.location.unwrap_or_else(|| {
            // Without an explicit location there must be a single user
            // output, and it lands on color attachment 0.
            assert_eq!(
                user_outputs.len(),
                1,
                "implicit location with several outputs",
            );
            0
        });
        let info = map.add(out.name.as_str());
        info.set_location(location);
        if let Some(component) = out.component {
            info.set_component(component);
        }
        info.add_stage(ShaderStage::Fragment);
    }
}

fn assign_varying_locations(
    reflection: &ProgramReflection,
    stage: ShaderStage,
    map: &mut VariableInfoMap,
) {
    for varying in reflection.varyings.iter() {
        if !varying.stages.contains_stage(stage) {
            continue;
        }
        // Struct fields share the location given to field zero.
        if varying.struct_name.is_some() && varying.field_index > 0 {
            continue;
        }
        // Array elements and matrix rows share the first register.
        if varying.array_index != 0 || varying.row_index != 0 {
            continue;
        }

        let name = varying.struct_name.as_deref().unwrap_or(&varying.name);
        let info = map.get_or_add(name);
        info.set_location(varying.register_row);
        if varying.register_column > 0 {
            assert!(varying.struct_name.is_none());
            assert!(!varying.is_matrix);
            info.set_component(varying.register_column);
        }
        info.add_stage(stage);
    }

    // Inactive varyings still get a record so the rewriter can find and
    // neutralize them.
    for inactive in reflection.inactive_varyings.iter() {
        if !inactive.stages.contains_stage(stage) {
            continue;
        }
        if inactive.name.starts_with("gl_") {
            continue;
        }
        map.get_or_add(inactive.name.as_str());
    }
}

fn assign_uniform_bindings(
    reflection: &ProgramReflection,
    stage: ShaderStage,
    interface: &mut ProgramInterfaceInfo,
    map: &mut VariableInfoMap,
) {
    let name = names::default_uniforms_block(stage);
    let (set, binding) = interface
        .resource_binding(DescriptorCategory::UniformsAndXfb, name);
    let info = map.add(name);
    info.set_descriptor_set(set);
    info.set_binding(binding);
    info.add_stage(stage);

    // One driver uniform binding, shared identically by every stage.
    let (set, binding) = interface.resource_binding(
        DescriptorCategory::DriverUniforms,
        names::DRIVER_UNIFORMS_BLOCK,
    );
    let info = map.add(names::DRIVER_UNIFORMS_BLOCK);
    info.set_descriptor_set(set);
    info.set_binding(binding);
    info.add_stages(reflection.active_stages);
}

fn assign_texture_bindings(
    reflection: &ProgramReflection,
    stage: ShaderStage,
    interface: &mut ProgramInterfaceInfo,
    map: &mut VariableInfoMap,
) {
    for texture in reflection.textures.iter() {
        assign_opaque_binding(
            texture,
            DescriptorCategory::Textures,
            stage,
            interface,
            map,
        );
    }
}

fn assign_non_texture_bindings(
    reflection: &ProgramReflection,
    stage: ShaderStage,
    interface: &mut ProgramInterfaceInfo,
    map: &mut VariableInfoMap,
) {
    for block in reflection.uniform_blocks.iter() {
        assign_block_binding(block, stage, interface, map);
    }
    for block in reflection.storage_blocks.iter() {
        assign_block_binding(block, stage, interface, map);
    }

    // All atomic counters of a stage share one implicit storage block.
    let counters_active = reflection
        .atomic_counter_buffers
        .iter()
        .any(|buffer| buffer.active_stages.contains_stage(stage));
    if counters_active {
        let (set, binding) = interface.resource_binding(
            DescriptorCategory::ShaderResources,
            names::ATOMIC_COUNTERS_BLOCK,
        );
        let info = map.add(names::ATOMIC_COUNTERS_BLOCK);
        info.set_descriptor_set(set);
        info.set_binding(binding);
        info.add_stage(stage);
    }

    for image in reflection.images.iter() {
        assign_opaque_binding(
            image,
            DescriptorCategory::ShaderResources,
            stage,
            interface,
            map,
        );
    }
}

fn assign_block_binding(
    block: &InterfaceBlock,
    stage: ShaderStage,
    interface: &mut ProgramInterfaceInfo,
    map: &mut VariableInfoMap,
) {
    if !block.active_stages.contains_stage(stage) {
        return;
    }
    // Only element zero of a block array carries the binding.
    if block.array_element.unwrap_or(0) != 0 {
        return;
    }
    let (set, binding) = interface
        .resource_binding(DescriptorCategory::ShaderResources, &block.name);
    let info = map.add(block.name.as_str());
    info.set_descriptor_set(set);
    info.set_binding(binding);
    info.add_stage(stage);
}

fn assign_opaque_binding(
    uniform: &OpaqueUniform,
    category: DescriptorCategory,
    stage: ShaderStage,
    interface: &mut ProgramInterfaceInfo,
    map: &mut VariableInfoMap,
) {
    if !uniform.active_stages.contains_stage(stage) {
        return;
    }
    if !name_is_index_zero(&uniform.name) {
        return;
    }
    let name = strip_array_indices(&uniform.name);
    let (set, binding) = interface.resource_binding(category, &name);
    let info = map.add(name);
    info.set_descriptor_set(set);
    info.set_binding(binding);
    info.add_stage(stage);
}

fn assign_xfb_extension(
    xfb: &TransformFeedback,
    stage: ShaderStage,
    interface: &mut ProgramInterfaceInfo,
    map: &mut VariableInfoMap,
) {
    // Synthetic capture outputs go past every location in use.
    let next_location = map
        .iter()
        .filter_map(|(_, info)| info.location())
        .max()
        .map_or(0, |location| location + 1);

    let mut offset = 0;
    for (index, varying) in xfb.varyings.iter().enumerate() {
        let slot = if xfb.interleaved {
            let stride = xfb.buffer_strides[0];
            let varying_offset = offset;
            offset += 4 * varying.components;
            assert_le!(offset, stride);
            XfbInfo { buffer: 0, offset: varying_offset, stride }
        } else {
            XfbInfo {
                buffer: index as u32,
                offset: 0,
                stride: xfb.buffer_strides[index],
            }
        };

        let info = if varying.name.starts_with("gl_") {
            // Built-ins keep their undecorated output; capture goes
            // through a synthesized twin at a fresh location.
            let info = map.add(names::xfb_builtin_out(&varying.name));
            info.set_location(next_location + interface.locations_used_for_xfb);
            interface.locations_used_for_xfb += 1;
            info
        } else {
            map.get_mut(&varying.name).unwrap_or_else(|| {
                panic!("captured varying missing: {}", varying.name)
            })
        };
        info.set_xfb(slot);
        info.add_stage(stage);
    }
}

fn assign_xfb_emulation(
    xfb: &TransformFeedback,
    stage: ShaderStage,
    interface: &mut ProgramInterfaceInfo,
    map: &mut VariableInfoMap,
) {
    for index in 0..xfb.buffer_strides.len() as u32 {
        let name = names::xfb_emulation_buffer(index);
        let (set, binding) = interface
            .resource_binding(DescriptorCategory::UniformsAndXfb, &name);
        let info = map.add(name);
        info.set_descriptor_set(set);
        info.set_binding(binding);
        info.add_stage(stage);
    }
}

/// True for the array element whose outer indices are all zero; the
/// innermost index enumerates elements and may vary.
fn name_is_index_zero(name: &str) -> bool {
    let indices: Vec<_> = array_indices(name).collect();
    let outer = indices.len().saturating_sub(1);
    indices[..outer].iter().all(|index| *index == "0")
}

fn array_indices(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices('[').map(move |(start, _)| {
        let end = name[start..].find(']').expect("unbalanced bracket") + start;
        &name[start + 1..end]
    })
}

/// Drops every `[k]` from a name: `u_tex[0][0]` becomes `u_tex`.
fn strip_array_indices(name: &str) -> String {
    let mut stripped = String::with_capacity(name.len());
    let mut depth = 0;
    for c in name.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }
    stripped
}
