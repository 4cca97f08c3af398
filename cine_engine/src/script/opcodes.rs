//! Opcode tables for both game variants.
//!
//! Slot `n` describes opcode byte `n + 1`; opcode `0` and empty slots have no
//! handler. A signature lists the operands that follow the opcode byte:
//! `b` byte, `w` big-endian word, `c` tagged variant, `l` label definition,
//! `s` NUL-terminated string and `x` for the script terminator.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::instance::CompareFlags;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum GameVariant {
    #[default]
    FutureWars,
    OperationStealth,
}

/// Test applied to the compare flags by the conditional jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Sup,
    SupEqu,
    Inf,
    InfEqu,
    Equ,
    Diff,
}

impl Condition {
    pub fn holds(self, flags: CompareFlags) -> bool {
        let eq = flags.contains(CompareFlags::EQ);
        match self {
            Condition::Sup => flags.contains(CompareFlags::GT) && !eq,
            Condition::SupEqu => flags.intersects(CompareFlags::GT | CompareFlags::EQ),
            Condition::Inf => flags.contains(CompareFlags::LT) && !eq,
            Condition::InfEqu => flags.intersects(CompareFlags::LT | CompareFlags::EQ),
            Condition::Equ => eq,
            Condition::Diff => !eq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    ModifyObjectParam,
    GetObjectParam,
    AddObjectParam,
    SubObjectParam,
    MulObjectParam,
    DivObjectParam,
    CompareObjectParam,
    SetupObject,
    CheckCollision,
    LoadVar,
    AddVar,
    SubVar,
    MulVar,
    DivVar,
    CompareVar,
    ModifyObjectParam2,
    /// Overlay list operations carry the overlay kind.
    AddOverlay(u8),
    RemoveOverlay(u8),
    AddToBgList,
    AddFilledSpriteToBgList,
    ClearBgIncrustList,
    Label,
    Goto,
    GotoIf(Condition),
    RemoveLabel,
    Loop,
    StartGlobalScript,
    StopGlobalScript,
    LoadResource,
    LoadBackground,
    LoadCollisionTable,
    LoadPart,
    ClosePart,
    LoadNewPrcName,
    RequestCheckPendingDataLoad,
    FadeIn,
    FadeOut,
    TransformPaletteRange,
    SetDefaultMenuColor2,
    RotatePalette,
    Break,
    EndScript,
    Message,
    LoadGlobalVar,
    CompareGlobalVar,
    Comment,
    FreePartRange,
    UnloadAllMasks,
    InitializeZoneData,
    SetZone,
    SetDefaultMenuColor,
    AllowPlayerInput,
    DisallowPlayerInput,
    ChangeDataDisk,
    LoadMusic,
    PlayMusic,
    FadeOutMusic,
    StopMusic,
    PlaySample,
    PlaySampleAlt,
    DisableSystemMenu,
    AddSequence,
    RemoveSequence,
    IsSequenceRunning,
    GotoIfNearest(Condition),
    StartObjectScript,
    StopObjectScript,
    AddBackground,
    RemoveBackground,
    LoadAbs,
    UseBackground,
    UseScrollBackground,
    SetBgVScroll,
    AddGfxElement,
    RemoveGfxElement,
    /// Decodes its operands and does nothing else.
    Nop,
}

/// How a jump opcode names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTarget {
    /// Position of the label operand within the decoded operands.
    pub operand: usize,
    /// Resolved by scanning forward instead of through the label table.
    pub nearest: bool,
}

impl Op {
    pub fn jump_target(self) -> Option<JumpTarget> {
        match self {
            Op::Goto | Op::GotoIf(_) => Some(JumpTarget {
                operand: 0,
                nearest: false,
            }),
            Op::Loop => Some(JumpTarget {
                operand: 1,
                nearest: false,
            }),
            Op::GotoIfNearest(_) => Some(JumpTarget {
                operand: 0,
                nearest: true,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub op: Op,
    pub mnemonic: &'static str,
    pub signature: &'static str,
}

const fn slot(index: usize, op: Op, mnemonic: &'static str, signature: &'static str) -> Entry {
    Entry {
        index,
        info: Some(OpcodeInfo {
            op,
            mnemonic,
            signature,
        }),
    }
}

const fn clear(index: usize) -> Entry {
    Entry { index, info: None }
}

#[derive(Clone, Copy)]
struct Entry {
    index: usize,
    info: Option<OpcodeInfo>,
}

const FUTURE_WARS_LEN: usize = 0x7C;
const OPERATION_STEALTH_LEN: usize = 0xAA;

const COMMON: &[Entry] = &[
    slot(0x00, Op::ModifyObjectParam, "modifyObjectParam", "bbw"),
    slot(0x01, Op::GetObjectParam, "getObjectParam", "bbb"),
    slot(0x02, Op::AddObjectParam, "addObjectParam", "bbw"),
    slot(0x03, Op::SubObjectParam, "subObjectParam", "bbw"),
    slot(0x04, Op::MulObjectParam, "mulObjectParam", "bbw"),
    slot(0x05, Op::DivObjectParam, "divObjectParam", "bbw"),
    slot(0x06, Op::CompareObjectParam, "compareObjectParam", "bbw"),
    slot(0x07, Op::SetupObject, "setupObject", "bwwww"),
    slot(0x08, Op::CheckCollision, "checkCollision", "bwwww"),
    slot(0x09, Op::LoadVar, "loadVar", "bc"),
    slot(0x0A, Op::AddVar, "addVar", "bc"),
    slot(0x0B, Op::SubVar, "subVar", "bc"),
    slot(0x0C, Op::MulVar, "mulVar", "bc"),
    slot(0x0D, Op::DivVar, "divVar", "bc"),
    slot(0x0E, Op::CompareVar, "compareVar", "bc"),
    slot(0x0F, Op::ModifyObjectParam2, "modifyObjectParam2", "bbb"),
    slot(0x13, Op::AddOverlay(0), "addSpriteOverlay", "b"),
    slot(0x14, Op::RemoveOverlay(0), "removeSpriteOverlay", "b"),
    slot(0x15, Op::AddToBgList, "addToBgList", "b"),
    slot(0x16, Op::AddOverlay(1), "addOverlay1", "b"),
    slot(0x17, Op::RemoveOverlay(1), "removeOverlay1", "b"),
    slot(0x18, Op::AddOverlay(4), "addOverlayType4", "b"),
    slot(0x19, Op::RemoveOverlay(4), "removeOverlayType4", "b"),
    slot(0x1A, Op::AddFilledSpriteToBgList, "addFilledSpriteToBgList", "b"),
    slot(0x1B, Op::ClearBgIncrustList, "clearBgIncrustList", ""),
    slot(0x1D, Op::Label, "label", "l"),
    slot(0x1E, Op::Goto, "goto", "b"),
    slot(0x1F, Op::GotoIf(Condition::Sup), "gotoIfSup", "b"),
    slot(0x20, Op::GotoIf(Condition::SupEqu), "gotoIfSupEqu", "b"),
    slot(0x21, Op::GotoIf(Condition::Inf), "gotoIfInf", "b"),
    slot(0x22, Op::GotoIf(Condition::InfEqu), "gotoIfInfEqu", "b"),
    slot(0x23, Op::GotoIf(Condition::Equ), "gotoIfEqu", "b"),
    slot(0x24, Op::GotoIf(Condition::Diff), "gotoIfDiff", "b"),
    slot(0x25, Op::RemoveLabel, "removeLabel", "b"),
    slot(0x26, Op::Loop, "loop", "bb"),
    slot(0x31, Op::StartGlobalScript, "startGlobalScript", "b"),
    slot(0x32, Op::StopGlobalScript, "stopGlobalScript", "b"),
    slot(0x3B, Op::LoadResource, "loadResource", "s"),
    slot(0x3C, Op::LoadBackground, "loadBg", "s"),
    slot(0x3D, Op::LoadCollisionTable, "loadCt", "s"),
    slot(0x3F, Op::LoadPart, "loadPart", "s"),
    slot(0x40, Op::ClosePart, "closePart", ""),
    slot(0x41, Op::LoadNewPrcName, "loadNewPrcName", "bs"),
    slot(0x42, Op::RequestCheckPendingDataLoad, "requestCheckPendingDataLoad", ""),
    slot(0x45, Op::FadeIn, "blitAndFade", ""),
    slot(0x46, Op::FadeOut, "fadeToBlack", ""),
    slot(0x47, Op::TransformPaletteRange, "transformPaletteRange", "bbwww"),
    slot(0x49, Op::SetDefaultMenuColor2, "setDefaultMenuColor2", "b"),
    slot(0x4A, Op::RotatePalette, "palRotate", "bbb"),
    slot(0x4F, Op::Break, "break", ""),
    slot(0x50, Op::EndScript, "endScript", "x"),
    slot(0x51, Op::Message, "message", "bwwww"),
    slot(0x52, Op::LoadGlobalVar, "loadGlobalVar", "bc"),
    slot(0x53, Op::CompareGlobalVar, "compareGlobalVar", "bc"),
    slot(0x59, Op::Comment, "comment", "s"),
    slot(0x5A, Op::FreePartRange, "freePartRange", "bb"),
    slot(0x5B, Op::UnloadAllMasks, "unloadAllMasks", ""),
    slot(0x65, Op::InitializeZoneData, "initializeZoneData", ""),
    slot(0x66, Op::SetZone, "setZoneDataEntry", "bw"),
    slot(0x68, Op::SetDefaultMenuColor, "setDefaultMenuColor", "b"),
    slot(0x69, Op::AllowPlayerInput, "allowPlayerInput", ""),
    slot(0x6A, Op::DisallowPlayerInput, "disallowPlayerInput", ""),
    slot(0x6B, Op::ChangeDataDisk, "changeDataDisk", "b"),
    slot(0x6D, Op::LoadMusic, "loadMusic", "s"),
    slot(0x6E, Op::PlayMusic, "playMusic", ""),
    slot(0x6F, Op::FadeOutMusic, "fadeOutMusic", ""),
    slot(0x70, Op::StopMusic, "stopSample", ""),
    slot(0x77, Op::PlaySample, "playSample", "bbwbww"),
    slot(0x78, Op::PlaySample, "playSample", "bbwbww"),
    slot(0x79, Op::DisableSystemMenu, "disableSystemMenu", "b"),
    slot(0x7A, Op::AddOverlay(5), "addOverlay5", "b"),
    slot(0x7B, Op::RemoveOverlay(5), "removeOverlay5", "b"),
];

const OPERATION_STEALTH_ONLY: &[Entry] = &[
    slot(0x3F, Op::Nop, "loadPart", "s"),
    clear(0x40),
    slot(0x78, Op::PlaySampleAlt, "playSampleAlt", "bbwbww"),
    slot(0x7F, Op::AddSequence, "addSeqListElement", "bbbbwww"),
    slot(0x80, Op::RemoveSequence, "removeSeq", "bb"),
    slot(0x82, Op::Nop, "op82", "bbbww"),
    slot(0x83, Op::IsSequenceRunning, "isSeqRunning", "bb"),
    slot(0x84, Op::GotoIfNearest(Condition::Sup), "gotoIfSupNearest", "b"),
    slot(0x85, Op::GotoIfNearest(Condition::SupEqu), "gotoIfSupEquNearest", "b"),
    slot(0x86, Op::GotoIfNearest(Condition::Inf), "gotoIfInfNearest", "b"),
    slot(0x87, Op::GotoIfNearest(Condition::InfEqu), "gotoIfInfEquNearest", "b"),
    slot(0x88, Op::GotoIfNearest(Condition::Equ), "gotoIfEquNearest", "b"),
    slot(0x89, Op::GotoIfNearest(Condition::Diff), "gotoIfDiffNearest", "b"),
    slot(0x8B, Op::StartObjectScript, "startObjectScript", "b"),
    slot(0x8C, Op::StopObjectScript, "stopObjectScript", "b"),
    slot(0x8E, Op::AddBackground, "addBackground", "bs"),
    slot(0x8F, Op::RemoveBackground, "removeBackground", "b"),
    slot(0x90, Op::LoadAbs, "loadAbs", "bs"),
    slot(0x91, Op::UseBackground, "useBg", "b"),
    slot(0x9D, Op::UseScrollBackground, "useBgScroll", "b"),
    slot(0x9E, Op::SetBgVScroll, "setAdditionalBgVScroll", "c"),
    slot(0xA0, Op::AddGfxElement, "addGfxElementA0", "ww"),
    slot(0xA1, Op::RemoveGfxElement, "removeGfxElementA0", "ww"),
    slot(0xA2, Op::Nop, "opA2", "ww"),
    slot(0xA3, Op::Nop, "opA3", "ww"),
];

const fn build<const N: usize>(layers: &[&[Entry]]) -> [Option<OpcodeInfo>; N] {
    let mut slots = [None; N];
    let mut layer = 0;
    while layer < layers.len() {
        let entries = layers[layer];
        let mut i = 0;
        while i < entries.len() {
            let entry = entries[i];
            if entry.index < N {
                slots[entry.index] = entry.info;
            }
            i += 1;
        }
        layer += 1;
    }
    slots
}

static FUTURE_WARS_SLOTS: [Option<OpcodeInfo>; FUTURE_WARS_LEN] = build(&[COMMON]);
static OPERATION_STEALTH_SLOTS: [Option<OpcodeInfo>; OPERATION_STEALTH_LEN] =
    build(&[COMMON, OPERATION_STEALTH_ONLY]);

static FUTURE_WARS: OpcodeTable = OpcodeTable {
    variant: GameVariant::FutureWars,
    slots: &FUTURE_WARS_SLOTS,
};
static OPERATION_STEALTH: OpcodeTable = OpcodeTable {
    variant: GameVariant::OperationStealth,
    slots: &OPERATION_STEALTH_SLOTS,
};

/// Immutable opcode table shared by every instance of an engine.
#[derive(Debug)]
pub struct OpcodeTable {
    variant: GameVariant,
    slots: &'static [Option<OpcodeInfo>],
}

impl OpcodeTable {
    pub fn for_variant(variant: GameVariant) -> &'static OpcodeTable {
        match variant {
            GameVariant::FutureWars => &FUTURE_WARS,
            GameVariant::OperationStealth => &OPERATION_STEALTH,
        }
    }

    pub fn variant(&self) -> GameVariant {
        self.variant
    }

    /// Number of opcode values the table covers (`1..=len`).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn lookup(&self, opcode: u8) -> Option<&'static OpcodeInfo> {
        let slot = usize::from(opcode).checked_sub(1)?;
        self.slots.get(slot)?.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_differ_where_variants_diverge() {
        let fw = OpcodeTable::for_variant(GameVariant::FutureWars);
        let os = OpcodeTable::for_variant(GameVariant::OperationStealth);
        assert_eq!(fw.len(), 0x7C);
        assert_eq!(os.len(), 0xAA);

        assert_eq!(fw.lookup(0x41).map(|info| info.op), Some(Op::ClosePart));
        assert!(os.lookup(0x41).is_none());
        assert_eq!(fw.lookup(0x40).map(|info| info.op), Some(Op::LoadPart));
        assert_eq!(os.lookup(0x40).map(|info| info.op), Some(Op::Nop));
        assert_eq!(os.lookup(0x79).map(|info| info.op), Some(Op::PlaySampleAlt));
        assert!(fw.lookup(0x85).is_none());
        assert_eq!(
            os.lookup(0x85).map(|info| info.op),
            Some(Op::GotoIfNearest(Condition::Sup))
        );
    }

    #[test]
    fn opcode_zero_and_gaps_have_no_handler() {
        let fw = OpcodeTable::for_variant(GameVariant::FutureWars);
        assert!(fw.lookup(0).is_none());
        assert!(fw.lookup(0x11).is_none());
        assert!(fw.lookup(0xFF).is_none());
        assert_eq!(fw.lookup(0x1E).map(|info| info.signature), Some("l"));
        assert_eq!(fw.lookup(0x51).map(|info| info.signature), Some("x"));
    }

    #[test]
    fn conditions_follow_compare_flags() {
        assert!(Condition::Sup.holds(CompareFlags::GT));
        assert!(!Condition::Sup.holds(CompareFlags::EQ));
        assert!(Condition::SupEqu.holds(CompareFlags::EQ));
        assert!(Condition::Inf.holds(CompareFlags::LT));
        assert!(Condition::InfEqu.holds(CompareFlags::LT));
        assert!(Condition::Equ.holds(CompareFlags::EQ));
        assert!(Condition::Diff.holds(CompareFlags::empty()));
        assert!(!Condition::Diff.holds(CompareFlags::EQ));
    }
}
