//! Byte-code script machine: opcode tables, operand decoding, label tables,
//! script instances and the interpreter loop.

use thiserror::Error;

pub mod disasm;
pub mod instance;
pub mod labels;
pub mod opcodes;
pub mod operands;
pub mod vm;

pub use disasm::{disassemble, Instruction};
pub use instance::{CompareFlags, ScriptClass, ScriptImage, ScriptInstance, ScriptList, ScriptTable};
pub use labels::{
    compute_label_table, find_label_forward, validate_jumps, DanglingJump, LabelTable,
    SCRIPT_STACK_SIZE,
};
pub use opcodes::{Condition, GameVariant, Op, OpcodeInfo, OpcodeTable};
pub use operands::{decode_operands, Operand, OperandList, VariantSource};
pub use vm::{ListRequest, Machine, Outcome};

/// Failure raised while decoding or executing one script instance. The
/// scheduler treats every variant as fatal for that instance only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("jump to undefined label {label}")]
    InvalidLabel { label: u8 },
    #[error("label index {label} exceeds the {SCRIPT_STACK_SIZE}-entry label table")]
    LabelIndexOutOfRange { label: u8 },
    #[error("local variable index {index} out of range")]
    VariableIndexOutOfRange { index: u8 },
    #[error("global variable index {index} out of range")]
    GlobalIndexOutOfRange { index: u8 },
    #[error("object index {index} out of range")]
    ObjectIndexOutOfRange { index: u8 },
    #[error("object parameter {param} is not one of 1..=6")]
    InvalidObjectParam { param: u8 },
    #[error("zone index {index} out of range")]
    ZoneIndexOutOfRange { index: i16 },
    #[error("byte code ends inside the instruction at offset {offset:#06x}")]
    UnexpectedEnd { offset: usize },
    #[error("unknown variant operand tag {tag}")]
    UnknownVariantTag { tag: u8 },
    #[error("division by zero")]
    DivisionByZero,
    #[error("operand {index} is not a {expected}")]
    OperandMismatch { index: usize, expected: &'static str },
    #[error("{mnemonic} does not accept operand value {value}")]
    InvalidOperand { mnemonic: &'static str, value: i16 },
    #[error("script index {index} is not in the loaded table")]
    ScriptIndexOutOfRange { index: u16 },
    #[error("instance ran {limit} instructions without yielding")]
    InstructionBudgetExhausted { limit: u32 },
    #[error("script image of {len} bytes exceeds the 16-bit program counter")]
    ImageTooLarge { len: usize },
}
