use cine_formats::{ObjectRecord, PartEntry};
use serde::Serialize;

use crate::script::ScriptError;

pub const NUM_GLOBAL_VARS: usize = 255;
pub const NUM_OBJECTS: usize = 255;
pub const NUM_ZONES: usize = 16;

/// Script-visible parameters of one object, addressed 1..=6 by the
/// object-parameter opcodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObjectState {
    pub x: i16,
    pub y: i16,
    pub mask: i16,
    pub frame: i16,
    pub costume: i16,
    pub part: i16,
}

impl From<&ObjectRecord> for ObjectState {
    fn from(record: &ObjectRecord) -> Self {
        ObjectState {
            x: record.x,
            y: record.y,
            mask: record.mask as i16,
            frame: record.frame,
            costume: record.costume,
            part: record.part as i16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectParam {
    X,
    Y,
    Mask,
    Frame,
    Costume,
    Part,
}

impl TryFrom<u8> for ObjectParam {
    type Error = ScriptError;

    fn try_from(param: u8) -> Result<Self, Self::Error> {
        Ok(match param {
            1 => ObjectParam::X,
            2 => ObjectParam::Y,
            3 => ObjectParam::Mask,
            4 => ObjectParam::Frame,
            5 => ObjectParam::Costume,
            6 => ObjectParam::Part,
            _ => return Err(ScriptError::InvalidObjectParam { param }),
        })
    }
}

impl ObjectState {
    pub fn param(&self, param: ObjectParam) -> i16 {
        match param {
            ObjectParam::X => self.x,
            ObjectParam::Y => self.y,
            ObjectParam::Mask => self.mask,
            ObjectParam::Frame => self.frame,
            ObjectParam::Costume => self.costume,
            ObjectParam::Part => self.part,
        }
    }

    pub fn param_mut(&mut self, param: ObjectParam) -> &mut i16 {
        match param {
            ObjectParam::X => &mut self.x,
            ObjectParam::Y => &mut self.y,
            ObjectParam::Mask => &mut self.mask,
            ObjectParam::Frame => &mut self.frame,
            ObjectParam::Costume => &mut self.costume,
            ObjectParam::Part => &mut self.part,
        }
    }
}

/// Sizes of one loaded resource, read by the file-size operand tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceSize {
    pub packed: u32,
    pub unpacked: u32,
}

impl From<&PartEntry> for ResourceSize {
    fn from(entry: &PartEntry) -> Self {
        ResourceSize {
            packed: entry.packed_size,
            unpacked: entry.unpacked_size,
        }
    }
}

/// Which file a `loadNewPrcName` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Procedure,
    Relation,
    Object,
    Message,
}

impl DataKind {
    pub fn from_operand(kind: u8) -> Option<Self> {
        match kind {
            0 => Some(DataKind::Procedure),
            1 => Some(DataKind::Relation),
            2 => Some(DataKind::Object),
            3 => Some(DataKind::Message),
            _ => None,
        }
    }
}

/// File names recorded by scripts, loaded once a script requests it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingLoads {
    pub procedure: Option<String>,
    pub relation: Option<String>,
    pub object: Option<String>,
    pub message: Option<String>,
}

impl PendingLoads {
    pub fn set(&mut self, kind: DataKind, name: String) {
        let slot = match kind {
            DataKind::Procedure => &mut self.procedure,
            DataKind::Relation => &mut self.relation,
            DataKind::Object => &mut self.object,
            DataKind::Message => &mut self.message,
        };
        *slot = Some(name);
    }

    pub fn is_empty(&self) -> bool {
        self.procedure.is_none()
            && self.relation.is_none()
            && self.object.is_none()
            && self.message.is_none()
    }
}

/// Tables shared by every script instance of one engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineState {
    pub globals: Vec<i16>,
    pub objects: Vec<ObjectState>,
    pub zones: [i16; NUM_ZONES],
    #[serde(skip)]
    pub resources: Vec<ResourceSize>,
    pub pending: PendingLoads,
    pub check_pending_load: bool,
    pub player_input_allowed: bool,
    pub system_menu_disabled: bool,
    pub menu_color: u8,
    pub menu_color2: u8,
    pub bg_vscroll: i16,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState {
            globals: vec![0; NUM_GLOBAL_VARS],
            objects: vec![ObjectState::default(); NUM_OBJECTS],
            zones: [0; NUM_ZONES],
            resources: Vec::new(),
            pending: PendingLoads::default(),
            check_pending_load: false,
            player_input_allowed: true,
            system_menu_disabled: false,
            menu_color: 0,
            menu_color2: 0,
            bg_vscroll: 0,
        }
    }
}

impl EngineState {
    pub fn global(&self, index: u8) -> Result<i16, ScriptError> {
        self.globals
            .get(usize::from(index))
            .copied()
            .ok_or(ScriptError::GlobalIndexOutOfRange { index })
    }

    pub fn global_mut(&mut self, index: u8) -> Result<&mut i16, ScriptError> {
        self.globals
            .get_mut(usize::from(index))
            .ok_or(ScriptError::GlobalIndexOutOfRange { index })
    }

    pub fn object(&self, index: u8) -> Result<&ObjectState, ScriptError> {
        self.objects
            .get(usize::from(index))
            .ok_or(ScriptError::ObjectIndexOutOfRange { index })
    }

    pub fn object_mut(&mut self, index: u8) -> Result<&mut ObjectState, ScriptError> {
        self.objects
            .get_mut(usize::from(index))
            .ok_or(ScriptError::ObjectIndexOutOfRange { index })
    }

    pub fn zone(&self, index: i16) -> Result<i16, ScriptError> {
        usize::try_from(index)
            .ok()
            .and_then(|slot| self.zones.get(slot).copied())
            .ok_or(ScriptError::ZoneIndexOutOfRange { index })
    }

    pub fn zone_mut(&mut self, index: i16) -> Result<&mut i16, ScriptError> {
        usize::try_from(index)
            .ok()
            .and_then(|slot| self.zones.get_mut(slot))
            .ok_or(ScriptError::ZoneIndexOutOfRange { index })
    }

    /// Sizes of resource slot `index`; empty slots read as zero.
    pub fn resource(&self, index: u8) -> ResourceSize {
        self.resources
            .get(usize::from(index))
            .copied()
            .unwrap_or_default()
    }

    /// Replaces the object table; slots past the end of `records` are reset.
    pub fn load_objects(&mut self, records: &[ObjectRecord]) {
        if records.len() > NUM_OBJECTS {
            log::warn!(
                "object table holds {} records, keeping the first {NUM_OBJECTS}",
                records.len()
            );
        }
        self.objects = records
            .iter()
            .take(NUM_OBJECTS)
            .map(ObjectState::from)
            .chain(std::iter::repeat(ObjectState::default()))
            .take(NUM_OBJECTS)
            .collect();
    }

    /// Returns the recorded file names once a script has asked for them to
    /// be loaded, clearing both the request and the names.
    pub fn take_pending_loads(&mut self) -> Option<PendingLoads> {
        if !self.check_pending_load {
            return None;
        }
        self.check_pending_load = false;
        Some(std::mem::take(&mut self.pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_params_are_addressed_from_one() {
        let mut object = ObjectState::default();
        *object.param_mut(ObjectParam::try_from(2).unwrap()) = 40;
        assert_eq!(object.y, 40);
        assert_eq!(object.param(ObjectParam::Y), 40);
        assert_eq!(
            ObjectParam::try_from(0),
            Err(ScriptError::InvalidObjectParam { param: 0 })
        );
        assert!(ObjectParam::try_from(7).is_err());
    }

    #[test]
    fn bounds_are_reported_per_table() {
        let mut state = EngineState::default();
        assert!(state.global(254).is_ok());
        assert_eq!(
            state.global(255),
            Err(ScriptError::GlobalIndexOutOfRange { index: 255 })
        );
        assert!(state.object_mut(255).is_err());
        assert_eq!(
            state.zone(-1),
            Err(ScriptError::ZoneIndexOutOfRange { index: -1 })
        );
        assert!(state.zone_mut(16).is_err());
        assert_eq!(state.resource(9), ResourceSize::default());
    }

    #[test]
    fn loading_objects_resets_unlisted_slots() {
        let mut state = EngineState::default();
        state.objects[3].x = 99;
        let record = ObjectRecord {
            x: 12,
            y: 34,
            mask: 1,
            frame: 2,
            costume: -1,
            name: "porte".to_string(),
            part: 0,
        };
        state.load_objects(&[record]);
        assert_eq!(state.objects.len(), NUM_OBJECTS);
        assert_eq!(state.objects[0].x, 12);
        assert_eq!(state.objects[0].costume, -1);
        assert_eq!(state.objects[3], ObjectState::default());
    }

    #[test]
    fn pending_loads_wait_for_request() {
        let mut state = EngineState::default();
        state
            .pending
            .set(DataKind::Procedure, "AUTO00.PRC".to_string());
        assert_eq!(state.take_pending_loads(), None);

        state.check_pending_load = true;
        let loads = state.take_pending_loads().unwrap();
        assert_eq!(loads.procedure.as_deref(), Some("AUTO00.PRC"));
        assert!(state.pending.is_empty());
        assert_eq!(state.take_pending_loads(), None);
    }
}
