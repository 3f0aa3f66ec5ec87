#![cfg(test)]

use spirv_headers as spv;

use crate::words::{instruction_header, MAGIC};

pub(crate) fn header(bound: u32) -> Vec<u32> {
    vec![MAGIC, 0x0001_0000, 0, bound, 0]
}

pub(crate) fn inst(op: spv::Op, operands: &[u32]) -> Vec<u32> {
    let mut words = vec![instruction_header(op, 1 + operands.len())];
    words.extend_from_slice(operands);
    words
}

/// Instruction with a NUL-padded string between two operand runs, e.g.
/// `OpName %id "name"` or `OpEntryPoint model %id "name" interface...`.
pub(crate) fn inst_with_string(
    op: spv::Op,
    before: &[u32],
    string: &str,
    after: &[u32],
) -> Vec<u32> {
    let mut operands = before.to_vec();
    operands.extend(string_words(string));
    operands.extend_from_slice(after);
    inst(op, &operands)
}

pub(crate) fn string_words(s: &str) -> Vec<u32> {
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

pub(crate) fn module(bound: u32, insts: &[Vec<u32>]) -> Vec<u32> {
    let mut words = header(bound);
    for inst in insts {
        words.extend_from_slice(inst);
    }
    words
}
