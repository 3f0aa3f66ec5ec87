//! The rewriting scan. Consumes the resolution tables and emits a new
//! module with the target layout applied. Declarations and function
//! bodies follow different rules, so the scan is a two-state machine
//! that switches over at the first `OpFunction` and never switches
//! back.

use derivative::Derivative;
use fnv::FnvHashMap;
use layout::{ShaderStage, VariableInfoMap};
use log::{debug, trace};
use num_traits::FromPrimitive;
use smallvec::SmallVec;
use spirv_headers as spv;

use crate::resolve::{Resolution, VarInfo};
use crate::words::{
    instruction_header, Id, InstIter, Instruction, ModuleWriter, Word,
};

/// Caller-controlled tweaks applied during rewriting.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransformOptions {
    /// Strip `EarlyFragmentTests` from the entry point.
    pub remove_early_fragment_tests: bool,
}

#[derive(Clone, Copy, Debug, Derivative, Eq, PartialEq)]
#[derivative(Default)]
enum Section {
    #[derivative(Default)]
    Declarations,
    Functions,
}

/// Rewrites `spirv` so its decorations, capabilities, entry point
/// interface and output storage classes match the layout in `map`.
///
/// Runs the resolution scan first, then a single rewriting scan; the
/// output buffer is complete when this returns. The input is trusted
/// compiler output and any mismatch against `map` panics.
pub fn transform_spirv(
    spirv: &[Word],
    map: &VariableInfoMap,
    stage: ShaderStage,
    options: &TransformOptions,
) -> Vec<Word> {
    trace!("transform_spirv(stage: {}, words: {})", stage, spirv.len());

    let transformer = Transformer {
        stage,
        options: *options,
        resolution: Resolution::resolve(spirv, map, stage),
        writer: ModuleWriter::from_header(spirv),
        section: Default::default(),
        private_types: Default::default(),
    };
    let words = transformer.run(spirv);

    #[cfg(debug_assertions)]
    {
        if let Err(err) = crate::diag::validate_words(&words) {
            log::warn!("transformed module failed validation: {}", err);
        }
    }

    words
}

#[derive(Debug)]
struct Transformer<'a> {
    stage: ShaderStage,
    options: TransformOptions,
    resolution: Resolution<'a>,
    writer: ModuleWriter,
    section: Section,
    /// Output pointer types cloned with `Private` storage, by original
    /// type id.
    private_types: FnvHashMap<Id, Id>,
}

impl<'a> Transformer<'a> {
    fn run(mut self, spirv: &[Word]) -> Vec<Word> {
        for inst in InstIter::new(spirv) {
            let emitted = match self.section {
                Section::Declarations => self.rewrite_declaration(&inst),
                Section::Functions => self.rewrite_function_body(&inst),
            };
            if emitted.is_none() {
                self.writer.copy_instruction(inst.words());
            }
        }
        self.writer.into_words()
    }

    /// `Some(())` when the instruction was emitted here, replaced or
    /// dropped; `None` lets the caller copy it verbatim.
    fn rewrite_declaration(&mut self, inst: &Instruction<'_>) -> Option<()> {
        match inst.op()? {
            spv::Op::Capability => self.rewrite_capability(inst),
            spv::Op::EntryPoint => self.rewrite_entry_point(inst),
            spv::Op::Decorate => self.rewrite_decorate(inst),
            spv::Op::TypePointer => self.rewrite_type_pointer(inst),
            spv::Op::Variable => self.rewrite_variable(inst),
            spv::Op::ExecutionMode => self.rewrite_execution_mode(inst),
            spv::Op::Function => {
                self.section = Section::Functions;
                None
            }
            _ => None,
        }
    }

    fn rewrite_function_body(&mut self, inst: &Instruction<'_>) -> Option<()> {
        match inst.op()? {
            spv::Op::AccessChain
            | spv::Op::InBoundsAccessChain
            | spv::Op::PtrAccessChain
            | spv::Op::InBoundsPtrAccessChain => {
                self.rewrite_access_chain(inst)
            }
            _ => None,
        }
    }

    fn rewrite_capability(&mut self, inst: &Instruction<'_>) -> Option<()> {
        if !self.resolution.has_transform_feedback_output {
            return None;
        }
        match spv::Capability::from_u32(inst.operand(0))? {
            spv::Capability::Shader
            | spv::Capability::Geometry
            | spv::Capability::Tessellation => {}
            _ => return None,
        }
        // The capture decorations emitted later require the capability.
        self.writer.copy_instruction(inst.words());
        self.writer.push_instruction(
            spv::Op::Capability,
            &[spv::Capability::TransformFeedback as Word],
        );
        debug!("injected TransformFeedback capability");
        Some(())
    }

    fn rewrite_entry_point(&mut self, inst: &Instruction<'_>) -> Option<()> {
        // Operands: execution model, entry point id, name, interface.
        let (_, name_words) = inst.string_at(2);
        let interface_start = 2 + name_words;
        let interface = &inst.operands()[interface_start..];

        let kept: SmallVec<[Word; 8]> = interface
            .iter()
            .copied()
            .filter(|&id| self.keep_interface_id(id))
            .collect();

        let mut words: SmallVec<[Word; 16]> = SmallVec::new();
        words.extend_from_slice(&inst.words()[..1 + interface_start]);
        words.extend_from_slice(&kept);
        words[0] = instruction_header(spv::Op::EntryPoint, words.len());
        self.writer.copy_instruction(&words);

        if self.resolution.has_transform_feedback_output {
            let entry_id = inst.operand(1);
            self.writer.push_instruction(
                spv::Op::ExecutionMode,
                &[entry_id, spv::ExecutionMode::Xfb as Word],
            );
        }
        Some(())
    }

    fn keep_interface_id(&self, id: Id) -> bool {
        match self.resolution.var(id) {
            Some(VarInfo::Var(info)) => info.is_active(self.stage),
            _ => true,
        }
    }

    fn rewrite_decorate(&mut self, inst: &Instruction<'_>) -> Option<()> {
        let id = inst.operand(0);
        let info = match self.resolution.var(id) {
            Some(VarInfo::Var(info)) => info,
            // Built-ins and non-interface ids keep their decorations.
            _ => return None,
        };
        if !info.is_active(self.stage) {
            // Inactive variables lose their decorations entirely.
            return Some(());
        }

        let decoration = spv::Decoration::from_u32(inst.operand(1))?;
        let value = match decoration {
            spv::Decoration::Location => info.location(),
            spv::Decoration::Binding => info.binding(),
            spv::Decoration::DescriptorSet => info.descriptor_set(),
            _ => return None,
        };
        let value = value.unwrap_or_else(|| {
            panic!("{:?} not assigned for %{}", decoration, id)
        });
        assert_eq!(inst.words().len(), 4);
        let offset = self.writer.copy_instruction(inst.words());
        self.writer.patch(offset + 3, value);

        if decoration == spv::Decoration::Location {
            // Component and capture slots ride along with the location.
            if let Some(component) = info.component() {
                self.clone_decoration(
                    inst,
                    spv::Decoration::Component,
                    component,
                );
            }
            if self.stage != ShaderStage::Fragment {
                if let Some(xfb) = info.xfb() {
                    self.clone_decoration(
                        inst,
                        spv::Decoration::XfbBuffer,
                        xfb.buffer,
                    );
                    self.clone_decoration(
                        inst,
                        spv::Decoration::XfbStride,
                        xfb.stride,
                    );
                    self.clone_decoration(
                        inst,
                        spv::Decoration::Offset,
                        xfb.offset,
                    );
                }
            }
        }
        Some(())
    }

    fn clone_decoration(
        &mut self,
        inst: &Instruction<'_>,
        decoration: spv::Decoration,
        value: Word,
    ) {
        let offset = self.writer.copy_instruction(inst.words());
        self.writer.patch(offset + 2, decoration as Word);
        self.writer.patch(offset + 3, value);
    }

    fn rewrite_type_pointer(&mut self, inst: &Instruction<'_>) -> Option<()> {
        if spv::StorageClass::from_u32(inst.operand(1))
            != Some(spv::StorageClass::Output)
        {
            return None;
        }
        let id = inst.operand(0);
        let pointee = inst.operand(2);
        // Built-in composite types cannot be cloned safely.
        let pointee_builtin = self
            .resolution
            .name(pointee)
            .map_or(false, |name| name.starts_with("gl_"));
        if pointee_builtin {
            return None;
        }

        // Keep the original and add a Private twin, so an inactive
        // output can change storage class without breaking the type
        // graph.
        self.writer.copy_instruction(inst.words());
        let private_id = self.writer.alloc_id();
        self.writer.push_instruction(
            spv::Op::TypePointer,
            &[private_id, spv::StorageClass::Private as Word, pointee],
        );
        self.private_types.insert(id, private_id);
        Some(())
    }

    fn rewrite_variable(&mut self, inst: &Instruction<'_>) -> Option<()> {
        let id = inst.operand(1);
        let info = match self.resolution.var(id) {
            Some(VarInfo::Var(info)) => info,
            _ => return None,
        };
        if info.is_active(self.stage) {
            return None;
        }
        let storage_class = spv::StorageClass::from_u32(inst.operand(2))?;
        // The front end prunes unused inputs before they get here.
        assert_ne!(
            storage_class,
            spv::StorageClass::Input,
            "inactive input variable %{}",
            id,
        );
        if storage_class != spv::StorageClass::Output {
            return None;
        }

        let offset = self.writer.copy_instruction(inst.words());
        self.writer.patch(offset + 1, self.private_type(inst.operand(0)));
        self.writer.patch(offset + 3, spv::StorageClass::Private as Word);
        Some(())
    }

    fn rewrite_execution_mode(
        &mut self,
        inst: &Instruction<'_>,
    ) -> Option<()> {
        let mode = spv::ExecutionMode::from_u32(inst.operand(1))?;
        if mode == spv::ExecutionMode::EarlyFragmentTests
            && self.options.remove_early_fragment_tests
        {
            debug!("dropped EarlyFragmentTests");
            return Some(());
        }
        None
    }

    fn rewrite_access_chain(&mut self, inst: &Instruction<'_>) -> Option<()> {
        let base = inst.operand(2);
        let info = match self.resolution.var(base) {
            Some(VarInfo::Var(info)) => info,
            _ => return None,
        };
        if info.is_active(self.stage) {
            return None;
        }

        // The base variable went Private; its chain must follow.
        let offset = self.writer.copy_instruction(inst.words());
        self.writer.patch(offset + 1, self.private_type(inst.operand(0)));
        Some(())
    }

    fn private_type(&self, type_id: Id) -> Id {
        *self.private_types.get(&type_id).unwrap_or_else(|| {
            panic!("no private clone for output type %{}", type_id)
        })
    }
}
