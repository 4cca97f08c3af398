use std::rc::Rc;

use bitflags::bitflags;
use serde::Serialize;

use super::labels::{compute_label_table, LabelTable};
use super::opcodes::OpcodeTable;
use super::ScriptError;

/// Number of local variables owned by each instance.
pub const NUM_LOCAL_VARS: usize = 50;

bitflags! {
    /// Result of the last comparison, consumed by the conditional jumps.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CompareFlags: u16 {
        const EQ = 1;
        const GT = 2;
        const LT = 4;
    }
}

impl CompareFlags {
    pub fn compare(lhs: i16, rhs: i16) -> Self {
        match lhs.cmp(&rhs) {
            std::cmp::Ordering::Equal => CompareFlags::EQ,
            std::cmp::Ordering::Greater => CompareFlags::GT,
            std::cmp::Ordering::Less => CompareFlags::LT,
        }
    }
}

/// Which list an instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptClass {
    Global,
    Object,
}

/// Immutable byte code of one script plus the label table computed from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptImage {
    bytes: Vec<u8>,
    labels: LabelTable,
}

impl ScriptImage {
    pub fn new(bytes: Vec<u8>, table: &OpcodeTable) -> Result<Self, ScriptError> {
        if bytes.len() > usize::from(u16::MAX) {
            return Err(ScriptError::ImageTooLarge { len: bytes.len() });
        }
        let labels = compute_label_table(&bytes, table)?;
        Ok(ScriptImage { bytes, labels })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }
}

/// Script images addressed by script index, shared by every instance.
#[derive(Debug, Clone, Default)]
pub struct ScriptTable {
    images: Vec<Rc<ScriptImage>>,
}

impl ScriptTable {
    pub fn from_images<I>(images: I, table: &OpcodeTable) -> Result<Self, ScriptError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let images = images
            .into_iter()
            .map(|bytes| ScriptImage::new(bytes, table).map(Rc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScriptTable { images })
    }

    pub fn get(&self, index: u16) -> Result<&Rc<ScriptImage>, ScriptError> {
        self.images
            .get(usize::from(index))
            .ok_or(ScriptError::ScriptIndexOutOfRange { index })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<ScriptImage>> {
        self.images.iter()
    }
}

/// One running script. The label table and locals belong to the instance;
/// the byte code is shared.
#[derive(Debug, Clone)]
pub struct ScriptInstance {
    script_index: Option<u16>,
    image: Rc<ScriptImage>,
    pub pc: u16,
    pub labels: LabelTable,
    pub locals: [i16; NUM_LOCAL_VARS],
    pub compare: CompareFlags,
}

impl ScriptInstance {
    pub fn new(script_index: u16, image: Rc<ScriptImage>) -> Self {
        ScriptInstance {
            script_index: Some(script_index),
            labels: *image.labels(),
            image,
            pc: 0,
            locals: [0; NUM_LOCAL_VARS],
            compare: CompareFlags::empty(),
        }
    }

    /// `None` once the instance has been tombstoned.
    pub fn script_index(&self) -> Option<u16> {
        self.script_index
    }

    pub fn is_tombstone(&self) -> bool {
        self.script_index.is_none()
    }

    pub fn tombstone(&mut self) {
        self.script_index = None;
    }

    pub fn image(&self) -> &Rc<ScriptImage> {
        &self.image
    }

    pub fn local(&self, index: u8) -> Result<i16, ScriptError> {
        self.locals
            .get(usize::from(index))
            .copied()
            .ok_or(ScriptError::VariableIndexOutOfRange { index })
    }

    pub fn local_mut(&mut self, index: u8) -> Result<&mut i16, ScriptError> {
        self.locals
            .get_mut(usize::from(index))
            .ok_or(ScriptError::VariableIndexOutOfRange { index })
    }
}

/// Ordered instances of one class. Stopped instances stay in place as
/// tombstones until `purge` so positions stay valid during a tick.
#[derive(Debug, Clone, Default)]
pub struct ScriptList {
    instances: Vec<ScriptInstance>,
}

impl ScriptList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instance: ScriptInstance) {
        self.instances.push(instance);
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&ScriptInstance> {
        self.instances.get(position)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut ScriptInstance> {
        self.instances.get_mut(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScriptInstance> {
        self.instances.iter()
    }

    /// Tombstones the first live instance running `script_index`.
    pub fn stop_first(&mut self, script_index: u16) -> bool {
        match self
            .instances
            .iter_mut()
            .find(|instance| instance.script_index == Some(script_index))
        {
            Some(instance) => {
                instance.tombstone();
                true
            }
            None => false,
        }
    }

    /// Drops tombstones, returning how many were removed.
    pub fn purge(&mut self) -> usize {
        let before = self.instances.len();
        self.instances.retain(|instance| !instance.is_tombstone());
        before - self.instances.len()
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }

    /// Script indices of live instances in list order.
    pub fn active(&self) -> Vec<u16> {
        self.instances
            .iter()
            .filter_map(ScriptInstance::script_index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::opcodes::GameVariant;

    fn table() -> ScriptTable {
        let opcodes = OpcodeTable::for_variant(GameVariant::FutureWars);
        ScriptTable::from_images(vec![vec![0x51], vec![0x1E, 0x04, 0x51]], opcodes).unwrap()
    }

    #[test]
    fn instances_copy_the_precomputed_labels() {
        let table = table();
        let image = table.get(1).unwrap();
        let mut instance = ScriptInstance::new(1, Rc::clone(image));
        assert_eq!(instance.labels.get(4).unwrap(), Some(2));

        instance.labels.remove(4).unwrap();
        assert_eq!(image.labels().get(4).unwrap(), Some(2));
        assert!(instance.locals.iter().all(|&value| value == 0));
        assert_eq!(
            instance.local(50),
            Err(ScriptError::VariableIndexOutOfRange { index: 50 })
        );
    }

    #[test]
    fn stop_tombstones_first_match_only() {
        let table = table();
        let mut list = ScriptList::new();
        for index in [0, 1, 0] {
            list.push(ScriptInstance::new(index, Rc::clone(table.get(index).unwrap())));
        }

        assert!(list.stop_first(0));
        assert_eq!(list.active(), vec![1, 0]);
        assert_eq!(list.len(), 3);
        assert!(!list.stop_first(7));

        assert_eq!(list.purge(), 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn missing_script_index_is_reported() {
        assert_eq!(
            table().get(2).err(),
            Some(ScriptError::ScriptIndexOutOfRange { index: 2 })
        );
    }

    #[test]
    fn compare_sets_exactly_one_flag() {
        assert_eq!(CompareFlags::compare(5, 3), CompareFlags::GT);
        assert_eq!(CompareFlags::compare(3, 5), CompareFlags::LT);
        assert_eq!(CompareFlags::compare(-1, -1), CompareFlags::EQ);
        assert_eq!(CompareFlags::compare(-32768, 32767), CompareFlags::LT);
    }
}
