use std::fmt;

use serde::Serialize;

use super::opcodes::OpcodeTable;
use super::operands::{instructions, Operand};
use super::ScriptError;

/// One line of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u8,
    /// `None` for opcodes with no handler in the table.
    pub mnemonic: Option<&'static str>,
    pub operands: Vec<Operand>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: ", self.offset)?;
        match self.mnemonic {
            Some(mnemonic) => f.write_str(mnemonic)?,
            None => write!(f, "db {:#04x}", self.opcode)?,
        }
        for (i, operand) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "{operand}")?;
        }
        Ok(())
    }
}

impl Serialize for Instruction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lists every instruction of `image`. Jump targets are shown as
/// `label N`; decoding errors end the listing with the error.
pub fn disassemble(image: &[u8], table: &OpcodeTable) -> Result<Vec<Instruction>, ScriptError> {
    instructions(image, 0, table)
        .map(|decoded| {
            let decoded = decoded?;
            let mut operands: Vec<Operand> = decoded.operands.as_slice().to_vec();
            if let Some(target) = decoded.info.and_then(|info| info.op.jump_target()) {
                if let Some(Operand::Byte(label)) = operands.get(target.operand) {
                    operands[target.operand] = Operand::Label(*label);
                }
            }
            Ok(Instruction {
                offset: decoded.offset,
                opcode: decoded.opcode,
                mnemonic: decoded.info.map(|info| info.mnemonic),
                operands,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::opcodes::GameVariant;

    #[test]
    fn renders_jumps_as_labels() {
        let fw = OpcodeTable::for_variant(GameVariant::FutureWars);
        // label 3; compareVar 0, #5; gotoIfSup 3; loop var1 label 3; ??; endScript
        let image = [
            0x1E, 0x03, 0x0F, 0x00, 0x00, 0x00, 0x05, 0x20, 0x03, 0x27, 0x01, 0x03, 0x12, 0x51,
        ];
        let lines: Vec<String> = disassemble(&image, fw)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "0000: label label 3",
                "0002: compareVar 0, #5",
                "0007: gotoIfSup label 3",
                "0009: loop 1, label 3",
                "000c: db 0x12",
                "000d: endScript",
            ]
        );
    }

    #[test]
    fn truncated_image_is_an_error() {
        let fw = OpcodeTable::for_variant(GameVariant::FutureWars);
        assert_eq!(
            disassemble(&[0x52, 0x00], fw),
            Err(ScriptError::UnexpectedEnd { offset: 2 })
        );
    }
}
