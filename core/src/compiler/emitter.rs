//! Instruction buffer with symbolic jump targets.
//!
//! Operands are variable-length, so the byte distance of a jump depends on
//! the encoded size of every instruction it crosses, including jumps whose
//! own distances are not known yet. Instructions are therefore collected with
//! [`Operand::Fwd`], [`Operand::Back`] and [`Operand::Abs`] references to
//! labels and only turned into bytes by [`Emitter::finish`].
//!
//! ## Layout
//!
//! Every instruction starts at its smallest possible size. Each pass
//! recomputes all label positions and operand values and grows instructions
//! whose operands no longer fit. Sizes only ever grow and are bounded, so the
//! passes reach a fixed point after which every operand encodes in exactly
//! the space reserved for it.

use smallvec::SmallVec;

use crate::Vec;
use crate::bytecode::codec::encoded_len;
use crate::bytecode::{Assembler, Opcode};

use super::error::CompileErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Label(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operand {
    Imm(u32),
    /// Distance from the end of this instruction forward to the label.
    Fwd(Label),
    /// Distance from the end of this instruction back to the label.
    Back(Label),
    /// Absolute offset of the label.
    Abs(Label),
}

impl From<u32> for Operand {
    fn from(value: u32) -> Self {
        Operand::Imm(value)
    }
}

#[derive(Debug, Clone)]
struct Inst {
    op: Opcode,
    operands: SmallVec<[Operand; 3]>,
}

/// Index of an instruction slot, used to fill a reserved slot later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot(usize);

/// Result of laying out the buffer.
pub(crate) struct Layout {
    pub code: Vec<u8>,
    labels: Vec<u32>,
}

impl Layout {
    pub fn offset(&self, label: Label) -> u32 {
        self.labels[label.0 as usize]
    }
}

#[derive(Default)]
pub(crate) struct Emitter {
    /// `None` marks a reserved slot that was never filled; it emits nothing.
    insts: Vec<Option<Inst>>,
    /// Instruction index each label is bound before.
    labels: Vec<Option<usize>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Binds `label` to the position of the next emitted instruction.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.insts.len());
    }

    /// A label bound here.
    pub fn here(&mut self) -> Label {
        let label = self.new_label();
        self.bind(label);
        label
    }

    pub fn emit(&mut self, op: Opcode, operands: &[Operand]) {
        debug_assert_eq!(operands.len(), op.operand_count(), "wrong operand count for {op:?}");
        self.insts.push(Some(Inst {
            op,
            operands: operands.iter().copied().collect(),
        }));
    }

    /// Reserves a slot for an instruction decided later.
    pub fn reserve(&mut self) -> Slot {
        self.insts.push(None);
        Slot(self.insts.len() - 1)
    }

    pub fn fill(&mut self, slot: Slot, op: Opcode, operands: &[Operand]) {
        self.insts[slot.0] = Some(Inst {
            op,
            operands: operands.iter().copied().collect(),
        });
    }

    /// Resolves every label and encodes the buffer.
    pub fn finish(self) -> Result<Layout, CompileErrorKind> {
        let targets = self
            .labels
            .iter()
            .enumerate()
            .map(|(idx, bound)| bound.ok_or(CompileErrorKind::UnresolvedLabel(idx as u32)))
            .collect::<Result<Vec<usize>, _>>()?;

        let mut sizes: Vec<usize> = self
            .insts
            .iter()
            .map(|inst| match inst {
                Some(inst) => 1 + inst.operands.len(),
                None => 0,
            })
            .collect();

        let mut starts = Vec::with_capacity(self.insts.len() + 1);
        loop {
            starts.clear();
            let mut pos = 0;
            for size in &sizes {
                starts.push(pos);
                pos += size;
            }
            starts.push(pos);

            let mut grew = false;
            for (idx, inst) in self.insts.iter().enumerate() {
                let Some(inst) = inst else { continue };
                let end = starts[idx] + sizes[idx];
                let size = 1 + inst
                    .operands
                    .iter()
                    .map(|operand| encoded_len(resolve(*operand, end, &starts, &targets)))
                    .sum::<usize>();
                if size > sizes[idx] {
                    sizes[idx] = size;
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        let mut asm = Assembler::new();
        let mut values: SmallVec<[u32; 3]> = SmallVec::new();
        for (idx, inst) in self.insts.iter().enumerate() {
            let Some(inst) = inst else { continue };
            debug_assert_eq!(asm.position(), starts[idx]);
            let end = starts[idx] + sizes[idx];
            values.clear();
            values.extend(
                inst.operands
                    .iter()
                    .map(|operand| resolve(*operand, end, &starts, &targets)),
            );
            asm.emit(inst.op, &values);
        }

        let labels = targets.iter().map(|&inst| starts[inst] as u32).collect();
        Ok(Layout {
            code: asm.into_bytes(),
            labels,
        })
    }
}

fn resolve(operand: Operand, end: usize, starts: &[usize], targets: &[usize]) -> u32 {
    let at = |label: Label| starts[targets[label.0 as usize]];
    let value = match operand {
        Operand::Imm(value) => return value,
        Operand::Fwd(label) => at(label).saturating_sub(end),
        Operand::Back(label) => end.saturating_sub(at(label)),
        Operand::Abs(label) => at(label),
    };
    value as u32
}
