//! Pre-pass over the declarations region. Rewriting needs every
//! interface id resolved to its layout record, and the transform
//! feedback decision depends on the whole interface, so this scan runs
//! to completion before the first output word is written.

use layout::{ShaderStage, VariableInfo, VariableInfoMap};
use num_traits::FromPrimitive;
use spirv_headers as spv;

use crate::is_interface_storage;
use crate::words::{Id, InstIter, Instruction, Word, BOUND_INDEX};

/// What an interface id resolved to.
#[derive(Clone, Copy, Debug)]
pub(crate) enum VarInfo<'map> {
    /// A `gl_` built-in. Accounted for but never renumbered.
    Builtin,
    Var(&'map VariableInfo),
}

/// Id-indexed tables built by the resolution scan. Slots stay `None`
/// for ids that are not names or interface variables.
#[derive(Debug)]
pub(crate) struct Resolution<'map> {
    names: Vec<Option<String>>,
    vars: Vec<Option<VarInfo<'map>>>,
    pub(crate) has_transform_feedback_output: bool,
}

impl<'map> Resolution<'map> {
    pub(crate) fn resolve(
        module: &[Word],
        map: &'map VariableInfoMap,
        stage: ShaderStage,
    ) -> Self {
        let bound = module[BOUND_INDEX] as usize;
        let mut this = Self {
            names: vec![None; bound],
            vars: vec![None; bound],
            has_transform_feedback_output: false,
        };
        for inst in InstIter::new(module) {
            match inst.op() {
                // Declarations all precede the function bodies.
                Some(spv::Op::Function) => break,
                Some(spv::Op::Name) => this.visit_name(&inst),
                Some(spv::Op::TypeArray) => {
                    this.propagate_name(inst.operand(0), inst.operand(1))
                }
                Some(spv::Op::TypePointer) => {
                    this.propagate_name(inst.operand(0), inst.operand(2))
                }
                Some(spv::Op::Variable) => {
                    this.visit_variable(&inst, map, stage)
                }
                _ => {}
            }
        }
        this
    }

    pub(crate) fn name(&self, id: Id) -> Option<&str> {
        self.names[id as usize].as_deref()
    }

    pub(crate) fn var(&self, id: Id) -> Option<VarInfo<'map>> {
        self.vars[id as usize]
    }

    fn visit_name(&mut self, inst: &Instruction<'_>) {
        let target = inst.operand(0) as usize;
        let (name, _) = inst.string_at(1);
        // Compiler output names each id at most once.
        assert!(
            self.names[target].is_none(),
            "duplicate name for %{}: {}",
            target,
            name,
        );
        self.names[target] = Some(name.to_owned());
    }

    /// Carries a type's name onto its array and pointer wrappers so a
    /// nameless block still resolves through its block type.
    fn propagate_name(&mut self, to: Id, from: Id) {
        if let Some(name) = self.names[from as usize].clone() {
            self.names[to as usize] = Some(name);
        }
    }

    fn visit_variable(
        &mut self,
        inst: &Instruction<'_>,
        map: &'map VariableInfoMap,
        stage: ShaderStage,
    ) {
        let type_id = inst.operand(0) as usize;
        let id = inst.operand(1) as usize;
        let storage_class = match spv::StorageClass::from_u32(inst.operand(2))
        {
            Some(class) if is_interface_storage(class) => class,
            _ => return,
        };

        // Blocks, nameless ones included, are keyed by their block
        // type's name rather than the instance name.
        let type_name = self.names[type_id].as_deref();
        let var_name = match storage_class {
            spv::StorageClass::Uniform | spv::StorageClass::StorageBuffer => {
                type_name
            }
            _ => self.names[id].as_deref(),
        };

        let type_is_builtin =
            type_name.map_or(false, |name| name.starts_with("gl_"));
        if type_is_builtin
            || var_name.map_or(false, |name| name.starts_with("gl_"))
        {
            self.vars[id] = Some(VarInfo::Builtin);
            return;
        }

        let name = var_name
            .unwrap_or_else(|| panic!("unnamed interface variable %{}", id));
        let info = map.get(name).unwrap_or_else(|| {
            panic!("interface variable missing from layout: {}", name)
        });
        self.vars[id] = Some(VarInfo::Var(info));

        if info.xfb().is_some()
            && stage != ShaderStage::Fragment
            && info.is_active(stage)
        {
            self.has_transform_feedback_output = true;
        }
    }
}
