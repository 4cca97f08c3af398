use std::fmt;

use arrayvec::ArrayVec;
use byteorder::{BigEndian, ByteOrder};

use super::opcodes::{OpcodeInfo, OpcodeTable};
use super::ScriptError;

/// Longest signature in either opcode table.
pub const MAX_OPERANDS: usize = 8;

/// Value source selected by a `c` operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantSource {
    Immediate(i16),
    /// Tag 1 local, 2 global, 3 mouse x, 4 mouse y, 5 random below `index`,
    /// 8/9 packed/unpacked size of resource `index`.
    Indexed { tag: u8, index: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Byte(u8),
    Word(i16),
    Variant(VariantSource),
    Label(u8),
    Str(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Byte(value) => write!(f, "{value}"),
            Operand::Word(value) => write!(f, "{value}"),
            Operand::Variant(VariantSource::Immediate(value)) => write!(f, "#{value}"),
            Operand::Variant(VariantSource::Indexed { tag, index }) => match tag {
                1 => write!(f, "var[{index}]"),
                2 => write!(f, "globalVars[{index}]"),
                3 => write!(f, "mouse.x"),
                4 => write!(f, "mouse.y"),
                5 => write!(f, "rand({index})"),
                8 => write!(f, "file[{index}].packedSize"),
                9 => write!(f, "file[{index}].unpackedSize"),
                _ => write!(f, "?{tag}[{index}]"),
            },
            Operand::Label(index) => write!(f, "label {index}"),
            Operand::Str(text) => write!(f, "{text:?}"),
        }
    }
}

/// Decoded operands of one instruction, with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperandList(ArrayVec<Operand, MAX_OPERANDS>);

impl OperandList {
    pub fn as_slice(&self) -> &[Operand] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn byte(&self, index: usize) -> Result<u8, ScriptError> {
        match self.0.get(index) {
            Some(Operand::Byte(value)) | Some(Operand::Label(value)) => Ok(*value),
            _ => Err(ScriptError::OperandMismatch {
                index,
                expected: "byte",
            }),
        }
    }

    pub fn word(&self, index: usize) -> Result<i16, ScriptError> {
        match self.0.get(index) {
            Some(Operand::Word(value)) => Ok(*value),
            _ => Err(ScriptError::OperandMismatch {
                index,
                expected: "word",
            }),
        }
    }

    pub fn variant(&self, index: usize) -> Result<VariantSource, ScriptError> {
        match self.0.get(index) {
            Some(Operand::Variant(source)) => Ok(*source),
            _ => Err(ScriptError::OperandMismatch {
                index,
                expected: "variant",
            }),
        }
    }

    pub fn string(&self, index: usize) -> Result<&str, ScriptError> {
        match self.0.get(index) {
            Some(Operand::Str(text)) => Ok(text),
            _ => Err(ScriptError::OperandMismatch {
                index,
                expected: "string",
            }),
        }
    }
}

/// Decodes the operands described by `signature` starting at `pos`, returning
/// them with the offset of the next instruction.
///
/// This is the only place operand widths are known; execution, label
/// precomputation, the forward label search and the disassembler all go
/// through it.
pub fn decode_operands(
    image: &[u8],
    pos: usize,
    signature: &str,
) -> Result<(OperandList, usize), ScriptError> {
    let mut cursor = Cursor { image, pos };
    let mut operands = ArrayVec::new();
    for kind in signature.bytes() {
        let operand = match kind {
            b'b' => Operand::Byte(cursor.byte()?),
            b'w' => Operand::Word(cursor.word()?),
            b'l' => Operand::Label(cursor.byte()?),
            b'c' => {
                let tag = cursor.byte()?;
                let source = if tag == 0 {
                    VariantSource::Immediate(cursor.word()?)
                } else {
                    VariantSource::Indexed {
                        tag,
                        index: cursor.byte()?,
                    }
                };
                Operand::Variant(source)
            }
            b's' => Operand::Str(cursor.string()?),
            // `x` ends the script and carries no operand.
            _ => continue,
        };
        operands.push(operand);
    }
    Ok((OperandList(operands), cursor.pos))
}

/// One instruction as laid out in an image. Opcodes without a handler decode
/// to `info: None` and occupy a single byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub offset: usize,
    pub opcode: u8,
    pub info: Option<&'static OpcodeInfo>,
    pub operands: OperandList,
    pub next: usize,
}

pub fn decode_instruction(
    image: &[u8],
    pos: usize,
    table: &OpcodeTable,
) -> Result<DecodedInstruction, ScriptError> {
    let opcode = *image
        .get(pos)
        .ok_or(ScriptError::UnexpectedEnd { offset: pos })?;
    let Some(info) = table.lookup(opcode) else {
        return Ok(DecodedInstruction {
            offset: pos,
            opcode,
            info: None,
            operands: OperandList::default(),
            next: pos + 1,
        });
    };
    let (operands, next) = decode_operands(image, pos + 1, info.signature)?;
    Ok(DecodedInstruction {
        offset: pos,
        opcode,
        info: Some(info),
        operands,
        next,
    })
}

/// Walks an image instruction by instruction from `start`. A decoding error is
/// yielded once and ends the walk.
pub fn instructions<'a>(
    image: &'a [u8],
    start: usize,
    table: &'a OpcodeTable,
) -> impl Iterator<Item = Result<DecodedInstruction, ScriptError>> + 'a {
    let mut pos = start;
    std::iter::from_fn(move || {
        if pos >= image.len() {
            return None;
        }
        match decode_instruction(image, pos, table) {
            Ok(instruction) => {
                pos = instruction.next;
                Some(Ok(instruction))
            }
            Err(err) => {
                pos = image.len();
                Some(Err(err))
            }
        }
    })
}

struct Cursor<'a> {
    image: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ScriptError> {
        let bytes = self
            .image
            .get(self.pos..self.pos + len)
            .ok_or(ScriptError::UnexpectedEnd { offset: self.pos })?;
        self.pos += len;
        Ok(bytes)
    }

    fn byte(&mut self) -> Result<u8, ScriptError> {
        Ok(self.take(1)?[0])
    }

    fn word(&mut self) -> Result<i16, ScriptError> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    fn string(&mut self) -> Result<String, ScriptError> {
        let rest = self
            .image
            .get(self.pos..)
            .ok_or(ScriptError::UnexpectedEnd { offset: self.pos })?;
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ScriptError::UnexpectedEnd { offset: self.pos })?;
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(text)
    }
}
