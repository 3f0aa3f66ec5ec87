//! End-to-end rewrites of hand-assembled vertex and fragment modules.

use glaze_spirv::{
    instruction_header, transform_spirv, InstIter, Instruction, MAGIC,
};
use layout::{
    assign_program_interface, Attribute, PackedVarying, ProgramReflection,
    ShaderStage, StageSet, VariableInfoMap, XfbInfo,
};
use spirv_headers as spv;

const INPUT: u32 = spv::StorageClass::Input as u32;
const OUTPUT: u32 = spv::StorageClass::Output as u32;
const UNIFORM: u32 = spv::StorageClass::Uniform as u32;
const PRIVATE: u32 = spv::StorageClass::Private as u32;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn inst(op: spv::Op, operands: &[u32]) -> Vec<u32> {
    let mut words = vec![instruction_header(op, 1 + operands.len())];
    words.extend_from_slice(operands);
    words
}

fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn entry_point(interface: &[u32]) -> Vec<u32> {
    let mut operands = vec![spv::ExecutionModel::Vertex as u32, 1];
    operands.extend(string_words("main"));
    operands.extend_from_slice(interface);
    inst(spv::Op::EntryPoint, &operands)
}

fn name(id: u32, name: &str) -> Vec<u32> {
    let mut operands = vec![id];
    operands.extend(string_words(name));
    inst(spv::Op::Name, &operands)
}

fn module(bound: u32, insts: &[Vec<u32>]) -> Vec<u32> {
    let mut words = vec![MAGIC, 0x0001_0000, 0, bound, 0];
    for inst in insts {
        words.extend_from_slice(inst);
    }
    words
}

fn instructions(module: &[u32]) -> Vec<Instruction<'_>> {
    InstIter::new(module).collect()
}

fn decorations_of(module: &[u32], id: u32) -> Vec<(u32, u32)> {
    InstIter::new(module)
        .filter(|inst| {
            inst.op() == Some(spv::Op::Decorate) && inst.operand(0) == id
        })
        .map(|inst| (inst.operand(1), inst.operand(2)))
        .collect()
}

/// Vertex module with one input (%10) and one vec4 output (%11) read
/// through an access chain in the function body.
fn vertex_module() -> Vec<u32> {
    module(20, &[
        inst(spv::Op::Capability, &[spv::Capability::Shader as u32]),
        entry_point(&[10, 11]),
        name(10, "a_position"),
        name(11, "v_color"),
        inst(spv::Op::Decorate, &[10, spv::Decoration::Location as u32, 0]),
        inst(spv::Op::Decorate, &[11, spv::Decoration::Location as u32, 1]),
        // Decorates an id the layout knows nothing about.
        inst(spv::Op::Decorate, &[
            9,
            spv::Decoration::RelaxedPrecision as u32,
        ]),
        inst(spv::Op::TypeFloat, &[2, 32]),
        inst(spv::Op::TypeVector, &[13, 2, 4]),
        inst(spv::Op::TypePointer, &[3, INPUT, 2]),
        inst(spv::Op::TypePointer, &[4, OUTPUT, 13]),
        inst(spv::Op::TypePointer, &[14, OUTPUT, 2]),
        inst(spv::Op::TypeVoid, &[5]),
        inst(spv::Op::TypeFunction, &[6, 5]),
        inst(spv::Op::TypeInt, &[7, 32, 0]),
        inst(spv::Op::Constant, &[7, 9, 0]),
        inst(spv::Op::Variable, &[3, 10, INPUT]),
        inst(spv::Op::Variable, &[4, 11, OUTPUT]),
        inst(spv::Op::Function, &[5, 1, 0, 6]),
        inst(spv::Op::Label, &[8]),
        inst(spv::Op::AccessChain, &[14, 12, 11, 9]),
        inst(spv::Op::Return, &[]),
        inst(spv::Op::FunctionEnd, &[]),
    ])
}

fn vertex_map(color_location: Option<u32>) -> VariableInfoMap {
    let mut map = VariableInfoMap::new();
    let info = map.add("a_position");
    info.set_location(0);
    info.add_stage(ShaderStage::Vertex);
    let info = map.add("v_color");
    if let Some(location) = color_location {
        info.set_location(location);
        info.add_stage(ShaderStage::Vertex);
    }
    map
}

#[test]
fn remaps_locations() {
    init_log();
    let spirv = vertex_module();
    let out = transform_spirv(
        &spirv,
        &vertex_map(Some(2)),
        ShaderStage::Vertex,
        &Default::default(),
    );

    // Unmoved variables come out byte for byte.
    assert_eq!(
        decorations_of(&out, 10),
        vec![(spv::Decoration::Location as u32, 0)],
    );
    // The remapped location replaces the compiler's pick.
    assert_eq!(
        decorations_of(&out, 11),
        vec![(spv::Decoration::Location as u32, 2)],
    );

    // Ids outside the layout keep their decorations byte for byte.
    let unknown = InstIter::new(&out)
        .find(|inst| {
            inst.op() == Some(spv::Op::Decorate) && inst.operand(0) == 9
        })
        .unwrap();
    assert_eq!(unknown.operands(), &[
        9,
        spv::Decoration::RelaxedPrecision as u32,
    ]);
}

#[test]
fn untouched_opcodes_are_bit_identical() {
    init_log();
    let spirv = vertex_module();
    let out = transform_spirv(
        &spirv,
        &vertex_map(Some(2)),
        ShaderStage::Vertex,
        &Default::default(),
    );

    let untouched = [
        spv::Op::TypeFloat,
        spv::Op::TypeVector,
        spv::Op::TypeVoid,
        spv::Op::TypeFunction,
        spv::Op::TypeInt,
        spv::Op::Constant,
        spv::Op::Label,
        spv::Op::Return,
        spv::Op::FunctionEnd,
    ];
    for &op in untouched.iter() {
        let before: Vec<_> = InstIter::new(&spirv)
            .filter(|inst| inst.op() == Some(op))
            .map(|inst| inst.words().to_vec())
            .collect();
        let after: Vec<_> = InstIter::new(&out)
            .filter(|inst| inst.op() == Some(op))
            .map(|inst| inst.words().to_vec())
            .collect();
        assert_eq!(before, after, "{:?}", op);
    }
}

#[test]
fn neutralizes_inactive_output() {
    init_log();
    let spirv = vertex_module();
    // No location and no active stage: dead in this stage.
    let out = transform_spirv(
        &spirv,
        &vertex_map(None),
        ShaderStage::Vertex,
        &Default::default(),
    );

    // Dropped from the entry point interface.
    let entry = instructions(&out)
        .into_iter()
        .find(|inst| inst.op() == Some(spv::Op::EntryPoint))
        .unwrap();
    let interface = &entry.operands()[4..];
    assert_eq!(interface, &[10]);

    // All its decorations are gone.
    assert_eq!(decorations_of(&out, 11), vec![]);

    // Output pointer types %4 and %14 got Private twins 20 and 21, and
    // the variable and its access chain moved over.
    let variable = instructions(&out)
        .into_iter()
        .find(|inst| {
            inst.op() == Some(spv::Op::Variable) && inst.operand(1) == 11
        })
        .unwrap();
    assert_eq!(variable.operands(), &[20, 11, PRIVATE]);

    let chain = instructions(&out)
        .into_iter()
        .find(|inst| inst.op() == Some(spv::Op::AccessChain))
        .unwrap();
    assert_eq!(chain.operands(), &[21, 12, 11, 9]);

    let clones: Vec<_> = instructions(&out)
        .into_iter()
        .filter(|inst| {
            inst.op() == Some(spv::Op::TypePointer)
                && inst.operand(1) == PRIVATE
        })
        .map(|inst| inst.operands().to_vec())
        .collect();
    assert_eq!(clones, vec![vec![20, PRIVATE, 13], vec![21, PRIVATE, 2]]);

    // The header accounts for both synthesized ids.
    assert_eq!(out[3], 22);
}

#[test]
fn injects_transform_feedback() {
    init_log();
    let spirv = vertex_module();
    let mut map = vertex_map(Some(0));
    map.get_mut("v_color")
        .unwrap()
        .set_xfb(XfbInfo { buffer: 0, offset: 0, stride: 16 });

    let out = transform_spirv(
        &spirv,
        &map,
        ShaderStage::Vertex,
        &Default::default(),
    );

    let insts = instructions(&out);
    assert_eq!(insts[0].op(), Some(spv::Op::Capability));
    assert_eq!(insts[0].operand(0), spv::Capability::Shader as u32);
    // The capture capability lands right after the one it extends.
    assert_eq!(insts[1].op(), Some(spv::Op::Capability));
    assert_eq!(
        insts[1].operand(0),
        spv::Capability::TransformFeedback as u32,
    );
    let extra_capabilities = insts
        .iter()
        .filter(|inst| {
            inst.op() == Some(spv::Op::Capability)
                && inst.operand(0)
                    == spv::Capability::TransformFeedback as u32
        })
        .count();
    assert_eq!(extra_capabilities, 1);

    // Capture mode follows the filtered entry point.
    assert_eq!(insts[2].op(), Some(spv::Op::EntryPoint));
    assert_eq!(insts[3].op(), Some(spv::Op::ExecutionMode));
    assert_eq!(insts[3].operands(), &[1, spv::ExecutionMode::Xfb as u32]);

    // Buffer, stride and offset ride along with the location.
    assert_eq!(decorations_of(&out, 11), vec![
        (spv::Decoration::Location as u32, 0),
        (spv::Decoration::XfbBuffer as u32, 0),
        (spv::Decoration::XfbStride as u32, 16),
        (spv::Decoration::Offset as u32, 0),
    ]);
}

#[test]
fn remaps_nameless_uniform_block() {
    init_log();
    let spirv = module(30, &[
        inst(spv::Op::Capability, &[spv::Capability::Shader as u32]),
        entry_point(&[]),
        name(20, "UniBlock"),
        inst(spv::Op::Decorate, &[
            22,
            spv::Decoration::DescriptorSet as u32,
            0,
        ]),
        inst(spv::Op::Decorate, &[22, spv::Decoration::Binding as u32, 0]),
        inst(spv::Op::TypeFloat, &[2, 32]),
        inst(spv::Op::TypeStruct, &[20, 2]),
        inst(spv::Op::TypePointer, &[21, UNIFORM, 20]),
        inst(spv::Op::Variable, &[21, 22, UNIFORM]),
    ]);

    let mut map = VariableInfoMap::new();
    let info = map.add("UniBlock");
    info.set_descriptor_set(2);
    info.set_binding(3);
    info.add_stage(ShaderStage::Vertex);

    let out = transform_spirv(
        &spirv,
        &map,
        ShaderStage::Vertex,
        &Default::default(),
    );
    assert_eq!(decorations_of(&out, 22), vec![
        (spv::Decoration::DescriptorSet as u32, 2),
        (spv::Decoration::Binding as u32, 3),
    ]);
}

#[test]
fn allocated_layout_drives_the_rewrite() {
    init_log();
    let reflection = ProgramReflection {
        active_stages: StageSet::VERTEX | StageSet::FRAGMENT,
        attributes: vec![Attribute {
            name: "a_position".to_owned(),
            location: 0,
            component: None,
        }],
        varyings: vec![PackedVarying {
            name: "v_color".to_owned(),
            struct_name: None,
            field_index: 0,
            array_index: 0,
            row_index: 0,
            register_row: 3,
            register_column: 0,
            is_matrix: false,
            stages: StageSet::VERTEX | StageSet::FRAGMENT,
        }],
        ..Default::default()
    };
    let maps = assign_program_interface(&reflection, &Default::default());

    let out = transform_spirv(
        &vertex_module(),
        &maps[ShaderStage::Vertex],
        ShaderStage::Vertex,
        &Default::default(),
    );
    assert_eq!(
        decorations_of(&out, 11),
        vec![(spv::Decoration::Location as u32, 3)],
    );
}

#[test]
fn leaves_builtins_alone() {
    init_log();
    let decorate = inst(spv::Op::Decorate, &[
        33,
        spv::Decoration::Invariant as u32,
    ]);
    let spirv = module(40, &[
        inst(spv::Op::Capability, &[spv::Capability::Shader as u32]),
        entry_point(&[33]),
        name(31, "gl_PerVertex"),
        decorate.clone(),
        inst(spv::Op::TypeFloat, &[2, 32]),
        inst(spv::Op::TypeStruct, &[31, 2]),
        inst(spv::Op::TypePointer, &[32, OUTPUT, 31]),
        inst(spv::Op::Variable, &[32, 33, OUTPUT]),
    ]);

    let out = transform_spirv(
        &spirv,
        &VariableInfoMap::new(),
        ShaderStage::Vertex,
        &Default::default(),
    );

    // The built-in block stays in the interface, keeps its decoration
    // and its pointer type is never cloned.
    let entry = instructions(&out)
        .into_iter()
        .find(|inst| inst.op() == Some(spv::Op::EntryPoint))
        .unwrap();
    assert_eq!(entry.operands().last(), Some(&33));
    let kept = instructions(&out)
        .into_iter()
        .find(|inst| inst.op() == Some(spv::Op::Decorate))
        .unwrap();
    assert_eq!(kept.words(), &decorate[..]);
    assert_eq!(out[3], 40);
}
