//! Label tables and the static passes built on the shared instruction walker.

use serde::Serialize;

use super::opcodes::{Op, OpcodeTable};
use super::operands::{instructions, DecodedInstruction};
use super::ScriptError;

/// Number of label slots per script.
pub const SCRIPT_STACK_SIZE: usize = 64;

/// Offsets of numbered labels within one script image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTable {
    slots: [Option<u16>; SCRIPT_STACK_SIZE],
}

impl Default for LabelTable {
    fn default() -> Self {
        LabelTable {
            slots: [None; SCRIPT_STACK_SIZE],
        }
    }
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(label: u8) -> Result<usize, ScriptError> {
        let slot = usize::from(label);
        if slot < SCRIPT_STACK_SIZE {
            Ok(slot)
        } else {
            Err(ScriptError::LabelIndexOutOfRange { label })
        }
    }

    pub fn get(&self, label: u8) -> Result<Option<u16>, ScriptError> {
        Ok(self.slots[Self::slot(label)?])
    }

    /// Offset of a defined label, failing with `InvalidLabel` when unset.
    pub fn resolve(&self, label: u8) -> Result<u16, ScriptError> {
        self.get(label)?.ok_or(ScriptError::InvalidLabel { label })
    }

    pub fn define(&mut self, label: u8, offset: u16) -> Result<(), ScriptError> {
        self.slots[Self::slot(label)?] = Some(offset);
        Ok(())
    }

    pub fn remove(&mut self, label: u8) -> Result<(), ScriptError> {
        self.slots[Self::slot(label)?] = None;
        Ok(())
    }

    pub fn defined(&self) -> impl Iterator<Item = (u8, u16)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(label, offset)| offset.map(|offset| (label as u8, offset)))
    }
}

fn label_definition(instruction: &DecodedInstruction) -> Result<Option<u8>, ScriptError> {
    match instruction.info {
        Some(info) if info.op == Op::Label => instruction.operands.byte(0).map(Some),
        _ => Ok(None),
    }
}

fn offset_of(pos: usize) -> Result<u16, ScriptError> {
    u16::try_from(pos).map_err(|_| ScriptError::ImageTooLarge { len: pos })
}

/// Scans the whole image once and records where each label definition ends.
/// A truncated trailing instruction ends the scan. Definitions past the last
/// slot are skipped here and fail when the instance executes them.
pub fn compute_label_table(image: &[u8], table: &OpcodeTable) -> Result<LabelTable, ScriptError> {
    let mut labels = LabelTable::new();
    for instruction in instructions(image, 0, table) {
        let instruction = match instruction {
            Ok(instruction) => instruction,
            Err(ScriptError::UnexpectedEnd { offset }) => {
                log::debug!("label scan stopped at truncated instruction {offset:#06x}");
                break;
            }
            Err(err) => return Err(err),
        };
        if let Some(label) = label_definition(&instruction)? {
            if labels.define(label, offset_of(instruction.next)?).is_err() {
                log::warn!(
                    "label {label} at {:#06x} is outside the label table, skipping",
                    instruction.offset
                );
            }
        }
    }
    Ok(labels)
}

/// Finds the first definition of `label` at or after `start`, ignoring any
/// earlier definition.
pub fn find_label_forward(
    image: &[u8],
    start: usize,
    label: u8,
    table: &OpcodeTable,
) -> Result<u16, ScriptError> {
    LabelTable::slot(label)?;
    for instruction in instructions(image, start, table) {
        let Ok(instruction) = instruction else { break };
        if label_definition(&instruction)? == Some(label) {
            return offset_of(instruction.next);
        }
    }
    Err(ScriptError::InvalidLabel { label })
}

/// A jump whose target label is not defined by the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingJump {
    pub offset: usize,
    pub mnemonic: &'static str,
    pub label: u8,
}

/// Reports every goto, conditional goto, loop and nearest jump whose label
/// does not resolve statically.
pub fn validate_jumps(image: &[u8], table: &OpcodeTable) -> Result<Vec<DanglingJump>, ScriptError> {
    let labels = compute_label_table(image, table)?;
    let mut dangling = Vec::new();
    for instruction in instructions(image, 0, table) {
        let Ok(instruction) = instruction else { break };
        let Some(info) = instruction.info else {
            continue;
        };
        let Some(target) = info.op.jump_target() else {
            continue;
        };
        let label = instruction.operands.byte(target.operand)?;
        let resolved = if target.nearest {
            find_label_forward(image, instruction.next, label, table).is_ok()
        } else {
            matches!(labels.get(label), Ok(Some(_)))
        };
        if !resolved {
            dangling.push(DanglingJump {
                offset: instruction.offset,
                mnemonic: info.mnemonic,
                label,
            });
        }
    }
    Ok(dangling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::opcodes::GameVariant;

    fn fw() -> &'static OpcodeTable {
        OpcodeTable::for_variant(GameVariant::FutureWars)
    }

    // label 2; loadBg "\x1E\x07"; label 5; goto 2; endScript
    const IMAGE: &[u8] = &[
        0x1E, 0x02, 0x3D, 0x1E, 0x07, 0x00, 0x1E, 0x05, 0x1F, 0x02, 0x51,
    ];

    #[test]
    fn records_offset_after_each_label() {
        let labels = compute_label_table(IMAGE, fw()).unwrap();
        assert_eq!(labels.get(2).unwrap(), Some(2));
        assert_eq!(labels.get(5).unwrap(), Some(8));
        assert_eq!(labels.get(7).unwrap(), None);
        assert_eq!(labels.defined().count(), 2);
    }

    #[test]
    fn label_table_is_deterministic() {
        assert_eq!(
            compute_label_table(IMAGE, fw()).unwrap(),
            compute_label_table(IMAGE, fw()).unwrap()
        );
        assert!(validate_jumps(IMAGE, fw()).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_label_definition_is_skipped() {
        // label 64; label 3; endScript
        let labels = compute_label_table(&[0x1E, 64, 0x1E, 0x03, 0x51], fw()).unwrap();
        assert_eq!(labels.defined().collect::<Vec<_>>(), vec![(3, 4)]);
    }

    #[test]
    fn scan_continues_past_end_script() {
        let labels = compute_label_table(&[0x51, 0x1E, 0x01], fw()).unwrap();
        assert_eq!(labels.get(1).unwrap(), Some(3));
    }

    #[test]
    fn forward_search_skips_earlier_definitions() {
        let os = OpcodeTable::for_variant(GameVariant::OperationStealth);
        // label 1; label 1; endScript
        let image = [0x1E, 0x01, 0x1E, 0x01, 0x51];
        assert_eq!(find_label_forward(&image, 0, 1, os).unwrap(), 2);
        assert_eq!(find_label_forward(&image, 2, 1, os).unwrap(), 4);
        assert_eq!(
            find_label_forward(&image, 4, 1, os),
            Err(ScriptError::InvalidLabel { label: 1 })
        );
    }

    #[test]
    fn reports_dangling_jumps() {
        let os = OpcodeTable::for_variant(GameVariant::OperationStealth);
        // label 1; goto 3; loop var0 label 1; gotoIfEquNearest 1; endScript
        let image = [0x1E, 0x01, 0x1F, 0x03, 0x27, 0x00, 0x01, 0x89, 0x01, 0x51];
        let dangling = validate_jumps(&image, os).unwrap();
        assert_eq!(
            dangling,
            vec![
                DanglingJump {
                    offset: 2,
                    mnemonic: "goto",
                    label: 3
                },
                DanglingJump {
                    offset: 7,
                    mnemonic: "gotoIfEquNearest",
                    label: 1
                },
            ]
        );
    }
}
