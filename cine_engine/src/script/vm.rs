//! Interpreter loop. One call to [`Machine::execute`] runs a single instance
//! until it yields, ends or fails.

use std::rc::Rc;

use log::{trace, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use super::instance::{CompareFlags, ScriptClass, ScriptImage, ScriptInstance};
use super::labels::find_label_forward;
use super::opcodes::{GameVariant, Op, OpcodeInfo, OpcodeTable};
use super::operands::{decode_instruction, OperandList, VariantSource};
use super::ScriptError;
use crate::host::{HostEvent, ScriptHost};
use crate::state::{DataKind, EngineState, ObjectParam};

/// How an `execute` call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// `break` was reached; the instance resumes after it next tick.
    Yielded,
    /// `endScript` was reached; the instance is due for removal.
    Ended,
    /// The instance was already a tombstone.
    Skipped,
}

/// Script list change requested by an instruction. The scheduler applies
/// requests after the requesting instance yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListRequest {
    StartGlobal { script: u16 },
    StopGlobal { script: u16 },
    StartObject { script: u16 },
    StopObject { script: u16 },
    End { class: ScriptClass, script: u16 },
}

enum Flow {
    Continue,
    Yield,
    End,
}

#[derive(Clone, Copy)]
enum Arith {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

impl Arith {
    fn apply(self, current: i16, value: i16) -> Result<i16, ScriptError> {
        Ok(match self {
            Arith::Assign => value,
            Arith::Add => current.wrapping_add(value),
            Arith::Sub => current.wrapping_sub(value),
            Arith::Mul => current.wrapping_mul(value),
            Arith::Div => {
                if value == 0 {
                    return Err(ScriptError::DivisionByZero);
                }
                current.wrapping_div(value)
            }
        })
    }
}

struct Frame<'a> {
    instance: &'a mut ScriptInstance,
    state: &'a mut EngineState,
    host: &'a mut dyn ScriptHost,
    class: ScriptClass,
    script: u16,
}

pub struct Machine {
    opcodes: &'static OpcodeTable,
    rng: StdRng,
    budget: Option<u32>,
    requests: Vec<ListRequest>,
}

impl Machine {
    /// `seed` drives the `rand` operand so runs are reproducible.
    pub fn new(variant: GameVariant, seed: u64) -> Self {
        Machine {
            opcodes: OpcodeTable::for_variant(variant),
            rng: StdRng::seed_from_u64(seed),
            budget: None,
            requests: Vec::new(),
        }
    }

    /// Caps the instructions one `execute` call may run before it fails.
    pub fn with_budget(mut self, budget: Option<u32>) -> Self {
        self.budget = budget;
        self
    }

    pub fn opcodes(&self) -> &'static OpcodeTable {
        self.opcodes
    }

    pub fn variant(&self) -> GameVariant {
        self.opcodes.variant()
    }

    pub fn take_requests(&mut self) -> Vec<ListRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn execute(
        &mut self,
        instance: &mut ScriptInstance,
        class: ScriptClass,
        state: &mut EngineState,
        host: &mut dyn ScriptHost,
    ) -> Result<Outcome, ScriptError> {
        let Some(script) = instance.script_index() else {
            return Ok(Outcome::Skipped);
        };
        let image = Rc::clone(instance.image());
        let resume = instance.pc;
        let mut frame = Frame {
            instance,
            state,
            host,
            class,
            script,
        };
        let result = self.run_quantum(&image, &mut frame);
        // Only a break saves the position.
        if result != Ok(Outcome::Yielded) {
            frame.instance.pc = resume;
        }
        result
    }

    fn run_quantum(
        &mut self,
        image: &ScriptImage,
        frame: &mut Frame<'_>,
    ) -> Result<Outcome, ScriptError> {
        let (class, script) = (frame.class, frame.script);
        let mut executed = 0u32;
        loop {
            if let Some(limit) = self.budget {
                if executed >= limit {
                    return Err(ScriptError::InstructionBudgetExhausted { limit });
                }
            }
            executed += 1;

            let pc = usize::from(frame.instance.pc);
            let decoded = decode_instruction(image.bytes(), pc, self.opcodes)?;
            frame.instance.pc = to_pc(decoded.next)?;
            let Some(info) = decoded.info else {
                if decoded.opcode == 0 {
                    trace!("{class:?} script {script} {pc:04x}: padding byte");
                } else {
                    warn!(
                        "{class:?} script {script} {pc:04x}: skipping opcode {:#04x} with no handler",
                        decoded.opcode
                    );
                }
                continue;
            };
            if log::log_enabled!(log::Level::Trace) {
                let operands: Vec<String> = decoded
                    .operands
                    .as_slice()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                trace!(
                    "{class:?} script {script} {pc:04x}: {} {}",
                    info.mnemonic,
                    operands.join(", ")
                );
            }

            match self.step(info, &decoded.operands, image.bytes(), frame)? {
                Flow::Continue => {}
                Flow::Yield => return Ok(Outcome::Yielded),
                Flow::End => return Ok(Outcome::Ended),
            }
        }
    }

    fn step(
        &mut self,
        info: &OpcodeInfo,
        ops: &OperandList,
        image: &[u8],
        frame: &mut Frame<'_>,
    ) -> Result<Flow, ScriptError> {
        match info.op {
            Op::ModifyObjectParam => {
                *object_param(frame.state, ops.byte(0)?, ops.byte(1)?)? = ops.word(2)?;
            }
            Op::GetObjectParam => {
                let value = *object_param(frame.state, ops.byte(0)?, ops.byte(1)?)?;
                *frame.instance.local_mut(ops.byte(2)?)? = value;
            }
            Op::AddObjectParam => self.object_arith(Arith::Add, ops, frame)?,
            Op::SubObjectParam => self.object_arith(Arith::Sub, ops, frame)?,
            Op::MulObjectParam => self.object_arith(Arith::Mul, ops, frame)?,
            Op::DivObjectParam => self.object_arith(Arith::Div, ops, frame)?,
            Op::CompareObjectParam => {
                let current = *object_param(frame.state, ops.byte(0)?, ops.byte(1)?)?;
                frame.instance.compare = CompareFlags::compare(current, ops.word(2)?);
            }
            Op::SetupObject => {
                let object = frame.state.object_mut(ops.byte(0)?)?;
                object.x = ops.word(1)?;
                object.y = ops.word(2)?;
                object.mask = ops.word(3)?;
                object.frame = ops.word(4)?;
            }
            Op::CheckCollision => {
                let hit = check_collision(frame, ops)?;
                frame.instance.compare = if hit {
                    CompareFlags::EQ
                } else {
                    CompareFlags::empty()
                };
            }
            Op::LoadVar => self.local_arith(Arith::Assign, ops, frame)?,
            Op::AddVar => self.local_arith(Arith::Add, ops, frame)?,
            Op::SubVar => self.local_arith(Arith::Sub, ops, frame)?,
            Op::MulVar => self.local_arith(Arith::Mul, ops, frame)?,
            Op::DivVar => self.local_arith(Arith::Div, ops, frame)?,
            Op::CompareVar => {
                let current = frame.instance.local(ops.byte(0)?)?;
                let value = self.resolve(ops.variant(1)?, frame)?;
                frame.instance.compare = CompareFlags::compare(current, value);
            }
            Op::ModifyObjectParam2 => {
                let value = frame.instance.local(ops.byte(2)?)?;
                *object_param(frame.state, ops.byte(0)?, ops.byte(1)?)? = value;
            }
            Op::AddOverlay(overlay) => frame.host.dispatch(HostEvent::AddOverlay {
                object: ops.byte(0)?,
                overlay,
            }),
            Op::RemoveOverlay(overlay) => frame.host.dispatch(HostEvent::RemoveOverlay {
                object: ops.byte(0)?,
                overlay,
            }),
            Op::AddToBgList => frame.host.dispatch(HostEvent::AddToBgList {
                object: ops.byte(0)?,
            }),
            Op::AddFilledSpriteToBgList => {
                frame.host.dispatch(HostEvent::AddFilledSpriteToBgList {
                    object: ops.byte(0)?,
                })
            }
            Op::ClearBgIncrustList => frame.host.dispatch(HostEvent::ClearBgIncrustList),
            Op::Label => {
                let pc = frame.instance.pc;
                frame.instance.labels.define(ops.byte(0)?, pc)?;
            }
            Op::Goto => {
                frame.instance.pc = frame.instance.labels.resolve(ops.byte(0)?)?;
            }
            Op::GotoIf(condition) => {
                if condition.holds(frame.instance.compare) {
                    frame.instance.pc = frame.instance.labels.resolve(ops.byte(0)?)?;
                }
            }
            Op::RemoveLabel => frame.instance.labels.remove(ops.byte(0)?)?,
            Op::Loop => {
                let counter = frame.instance.local_mut(ops.byte(0)?)?;
                *counter = counter.wrapping_sub(1);
                if *counter >= 0 {
                    frame.instance.pc = frame.instance.labels.resolve(ops.byte(1)?)?;
                }
            }
            Op::GotoIfNearest(condition) => {
                if condition.holds(frame.instance.compare) {
                    let start = usize::from(frame.instance.pc);
                    frame.instance.pc =
                        find_label_forward(image, start, ops.byte(0)?, self.opcodes)?;
                }
            }
            Op::StartGlobalScript => self.requests.push(ListRequest::StartGlobal {
                script: ops.byte(0)?.into(),
            }),
            Op::StopGlobalScript => self.requests.push(ListRequest::StopGlobal {
                script: ops.byte(0)?.into(),
            }),
            Op::StartObjectScript => self.requests.push(ListRequest::StartObject {
                script: ops.byte(0)?.into(),
            }),
            Op::StopObjectScript => self.requests.push(ListRequest::StopObject {
                script: ops.byte(0)?.into(),
            }),
            Op::LoadResource => frame.host.dispatch(HostEvent::LoadResource {
                name: ops.string(0)?.to_string(),
            }),
            Op::LoadBackground => frame.host.dispatch(HostEvent::LoadBackground {
                name: ops.string(0)?.to_string(),
            }),
            Op::LoadCollisionTable => frame.host.dispatch(HostEvent::LoadCollisionTable {
                name: ops.string(0)?.to_string(),
            }),
            Op::LoadPart => frame.host.dispatch(HostEvent::LoadPart {
                name: ops.string(0)?.to_string(),
            }),
            Op::ClosePart => frame.host.dispatch(HostEvent::ClosePart),
            Op::LoadNewPrcName => {
                let kind = ops.byte(0)?;
                let kind = DataKind::from_operand(kind).ok_or(ScriptError::InvalidOperand {
                    mnemonic: info.mnemonic,
                    value: kind.into(),
                })?;
                frame.state.pending.set(kind, ops.string(1)?.to_string());
            }
            Op::RequestCheckPendingDataLoad => frame.state.check_pending_load = true,
            Op::FadeIn => frame.host.dispatch(HostEvent::FadeIn),
            Op::FadeOut => frame.host.dispatch(HostEvent::FadeOut),
            Op::TransformPaletteRange => {
                frame.host.dispatch(HostEvent::TransformPaletteRange {
                    first: ops.byte(0)?,
                    count: ops.byte(1)?,
                    r: ops.word(2)?,
                    g: ops.word(3)?,
                    b: ops.word(4)?,
                })
            }
            Op::SetDefaultMenuColor2 => frame.state.menu_color2 = ops.byte(0)?,
            Op::RotatePalette => frame.host.dispatch(HostEvent::RotatePalette {
                first: ops.byte(0)?,
                last: ops.byte(1)?,
                enabled: ops.byte(2)?,
            }),
            Op::Break => return Ok(Flow::Yield),
            Op::EndScript => {
                self.requests.push(ListRequest::End {
                    class: frame.class,
                    script: frame.script,
                });
                return Ok(Flow::End);
            }
            Op::Message => frame.host.dispatch(HostEvent::Message {
                message: ops.byte(0)?,
                x: ops.word(1)?,
                y: ops.word(2)?,
                width: ops.word(3)?,
                color: ops.word(4)?,
            }),
            Op::LoadGlobalVar => {
                let value = self.resolve(ops.variant(1)?, frame)?;
                *frame.state.global_mut(ops.byte(0)?)? = value;
            }
            Op::CompareGlobalVar => {
                let index = ops.byte(0)?;
                let source = ops.variant(1)?;
                frame.instance.compare = if self.variant() == GameVariant::FutureWars
                    && usize::from(index) == frame.state.globals.len()
                    && matches!(source, VariantSource::Immediate(_))
                {
                    // Future Wars compares this slot against an immediate and
                    // expects it to always match.
                    CompareFlags::EQ
                } else {
                    let current = frame.state.global(index)?;
                    let value = self.resolve(source, frame)?;
                    CompareFlags::compare(current, value)
                };
            }
            Op::Comment | Op::Nop => {}
            Op::FreePartRange => frame.host.dispatch(HostEvent::FreePartRange {
                first: ops.byte(0)?,
                count: ops.byte(1)?,
            }),
            Op::UnloadAllMasks => frame.host.dispatch(HostEvent::UnloadAllMasks),
            Op::InitializeZoneData => {
                for (zone, value) in frame.state.zones.iter_mut().zip(0..) {
                    *zone = value;
                }
            }
            Op::SetZone => {
                *frame.state.zone_mut(ops.byte(0)?.into())? = ops.word(1)?;
            }
            Op::SetDefaultMenuColor => frame.state.menu_color = ops.byte(0)?,
            Op::AllowPlayerInput => frame.state.player_input_allowed = true,
            Op::DisallowPlayerInput => frame.state.player_input_allowed = false,
            Op::ChangeDataDisk => frame.host.dispatch(HostEvent::ChangeDataDisk {
                disk: ops.byte(0)?,
            }),
            Op::LoadMusic => frame.host.dispatch(HostEvent::LoadMusic {
                name: ops.string(0)?.to_string(),
            }),
            Op::PlayMusic => frame.host.dispatch(HostEvent::PlayMusic),
            Op::FadeOutMusic => frame.host.dispatch(HostEvent::FadeOutMusic),
            Op::StopMusic => frame.host.dispatch(HostEvent::StopMusic),
            Op::PlaySample => play_sample(ops, frame.host, true)?,
            Op::PlaySampleAlt => play_sample(ops, frame.host, false)?,
            Op::DisableSystemMenu => frame.state.system_menu_disabled = ops.byte(0)? != 0,
            Op::AddSequence => frame.host.dispatch(HostEvent::AddSequence {
                object: ops.byte(0)?,
                params: [
                    ops.byte(1)?.into(),
                    ops.byte(2)?.into(),
                    ops.byte(3)?.into(),
                    ops.word(4)?,
                    ops.word(5)?,
                    ops.word(6)?,
                ],
            }),
            Op::RemoveSequence => frame.host.dispatch(HostEvent::RemoveSequence {
                object: ops.byte(0)?,
                param: ops.byte(1)?,
            }),
            Op::IsSequenceRunning => {
                let playing = frame
                    .host
                    .is_animation_playing(ops.byte(0)?, ops.byte(1)?);
                frame.instance.compare = if playing {
                    CompareFlags::EQ
                } else {
                    CompareFlags::empty()
                };
            }
            Op::AddBackground => frame.host.dispatch(HostEvent::AddBackground {
                slot: ops.byte(0)?,
                name: ops.string(1)?.to_string(),
            }),
            Op::RemoveBackground => frame.host.dispatch(HostEvent::RemoveBackground {
                slot: ops.byte(0)?,
            }),
            Op::LoadAbs => frame.host.dispatch(HostEvent::LoadAbs {
                slot: ops.byte(0)?,
                name: ops.string(1)?.to_string(),
            }),
            Op::UseBackground => frame.host.dispatch(HostEvent::UseBackground {
                slot: ops.byte(0)?,
            }),
            Op::UseScrollBackground => frame.host.dispatch(HostEvent::UseScrollBackground {
                slot: ops.byte(0)?,
            }),
            Op::SetBgVScroll => {
                frame.state.bg_vscroll = self.resolve(ops.variant(0)?, frame)?;
            }
            Op::AddGfxElement => frame.host.dispatch(HostEvent::AddGfxElement {
                object: ops.word(0)?,
                param: ops.word(1)?,
            }),
            Op::RemoveGfxElement => frame.host.dispatch(HostEvent::RemoveGfxElement {
                object: ops.word(0)?,
                param: ops.word(1)?,
            }),
        }
        Ok(Flow::Continue)
    }

    /// Reads the value a `c` operand names.
    fn resolve(&mut self, source: VariantSource, frame: &Frame<'_>) -> Result<i16, ScriptError> {
        let (tag, index) = match source {
            VariantSource::Immediate(value) => return Ok(value),
            VariantSource::Indexed { tag, index } => (tag, index),
        };
        match tag {
            1 => frame.instance.local(index),
            2 => frame.state.global(index),
            3 => Ok(frame.host.mouse_position().0),
            4 => Ok(frame.host.mouse_position().1),
            5 => Ok(if index == 0 {
                0
            } else {
                self.rng.gen_range(0..index).into()
            }),
            8 => Ok(frame.state.resource(index).packed as i16),
            9 => Ok(frame.state.resource(index).unpacked as i16),
            _ => Err(ScriptError::UnknownVariantTag { tag }),
        }
    }

    fn local_arith(
        &mut self,
        arith: Arith,
        ops: &OperandList,
        frame: &mut Frame<'_>,
    ) -> Result<(), ScriptError> {
        let value = self.resolve(ops.variant(1)?, frame)?;
        let local = frame.instance.local_mut(ops.byte(0)?)?;
        *local = arith.apply(*local, value)?;
        Ok(())
    }

    fn object_arith(
        &mut self,
        arith: Arith,
        ops: &OperandList,
        frame: &mut Frame<'_>,
    ) -> Result<(), ScriptError> {
        let slot = object_param(frame.state, ops.byte(0)?, ops.byte(1)?)?;
        *slot = arith.apply(*slot, ops.word(2)?)?;
        Ok(())
    }
}

fn to_pc(pos: usize) -> Result<u16, ScriptError> {
    u16::try_from(pos).map_err(|_| ScriptError::ImageTooLarge { len: pos })
}

fn object_param(state: &mut EngineState, object: u8, param: u8) -> Result<&mut i16, ScriptError> {
    let param = ObjectParam::try_from(param)?;
    Ok(state.object_mut(object)?.param_mut(param))
}

/// Tests `zones` columns to the right of the object's offset position for a
/// zone whose entry equals the wanted value.
fn check_collision(frame: &Frame<'_>, ops: &OperandList) -> Result<bool, ScriptError> {
    let object = frame.state.object(ops.byte(0)?)?;
    let x = object.x.wrapping_add(ops.word(1)?);
    let y = object.y.wrapping_add(ops.word(2)?);
    let zones = ops.word(3)?;
    let wanted = ops.word(4)?;
    for column in 0..zones {
        let zone = frame.host.zone_at(x.wrapping_add(column), y);
        if frame.state.zone(zone)? == wanted {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Operands: animation, channel, unused word, unused byte, volume, flag.
/// A flag of `-1` starts the sample; anything else resets the channel.
fn play_sample(
    ops: &OperandList,
    host: &mut dyn ScriptHost,
    remap_channel: bool,
) -> Result<(), ScriptError> {
    let animation = ops.byte(0)?;
    let mut channel = ops.byte(1)?;
    let mut volume = ops.word(4)?;
    let flag = ops.word(5)?;
    if !(0..=63).contains(&volume) {
        volume = 63;
    }
    if remap_channel {
        if channel >= 10 {
            channel -= 10;
        }
        volume = volume.max(50);
    }
    host.dispatch(if flag == -1 {
        HostEvent::PlaySample {
            animation,
            channel,
            volume,
        }
    } else {
        HostEvent::ResetChannel { channel }
    });
    Ok(())
}
