use std::collections::{HashMap, HashSet};
use std::{cell::RefCell, rc::Rc};

use serde::Serialize;

/// Side effect requested by a script. The machine never waits on a result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostEvent {
    AddOverlay {
        object: u8,
        overlay: u8,
    },
    RemoveOverlay {
        object: u8,
        overlay: u8,
    },
    AddToBgList {
        object: u8,
    },
    AddFilledSpriteToBgList {
        object: u8,
    },
    ClearBgIncrustList,
    LoadResource {
        name: String,
    },
    LoadBackground {
        name: String,
    },
    LoadCollisionTable {
        name: String,
    },
    LoadPart {
        name: String,
    },
    ClosePart,
    FadeIn,
    FadeOut,
    TransformPaletteRange {
        first: u8,
        count: u8,
        r: i16,
        g: i16,
        b: i16,
    },
    RotatePalette {
        first: u8,
        last: u8,
        enabled: u8,
    },
    Message {
        message: u8,
        x: i16,
        y: i16,
        width: i16,
        color: i16,
    },
    FreePartRange {
        first: u8,
        count: u8,
    },
    UnloadAllMasks,
    ChangeDataDisk {
        disk: u8,
    },
    LoadMusic {
        name: String,
    },
    PlayMusic,
    FadeOutMusic,
    StopMusic,
    PlaySample {
        animation: u8,
        channel: u8,
        volume: i16,
    },
    ResetChannel {
        channel: u8,
    },
    AddSequence {
        object: u8,
        params: [i16; 6],
    },
    RemoveSequence {
        object: u8,
        param: u8,
    },
    AddBackground {
        name: String,
        slot: u8,
    },
    RemoveBackground {
        slot: u8,
    },
    LoadAbs {
        name: String,
        slot: u8,
    },
    UseBackground {
        slot: u8,
    },
    UseScrollBackground {
        slot: u8,
    },
    AddGfxElement {
        object: i16,
        param: i16,
    },
    RemoveGfxElement {
        object: i16,
        param: i16,
    },
}

/// Seam between the script machine and whatever renders, plays and reads
/// input for it.
pub trait ScriptHost {
    fn dispatch(&mut self, event: HostEvent);

    fn mouse_position(&self) -> (i16, i16) {
        (0, 0)
    }

    /// Zone number painted at a screen position of the collision page.
    fn zone_at(&self, _x: i16, _y: i16) -> i16 {
        0
    }

    fn is_animation_playing(&self, _object: u8, _param: u8) -> bool {
        false
    }
}

/// Host that records every event and answers queries from fixed data.
/// Clones share the same event log.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    events: Rc<RefCell<Vec<HostEvent>>>,
    pub mouse: (i16, i16),
    pub zones: HashMap<(i16, i16), i16>,
    pub playing: HashSet<(u8, u8)>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.borrow().clone()
    }

    pub fn take_events(&self) -> Vec<HostEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl ScriptHost for RecordingHost {
    fn dispatch(&mut self, event: HostEvent) {
        self.events.borrow_mut().push(event);
    }

    fn mouse_position(&self) -> (i16, i16) {
        self.mouse
    }

    fn zone_at(&self, x: i16, y: i16) -> i16 {
        self.zones.get(&(x, y)).copied().unwrap_or(0)
    }

    fn is_animation_playing(&self, object: u8, param: u8) -> bool {
        self.playing.contains(&(object, param))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_host_shares_its_log_between_clones() {
        let observer = RecordingHost::new();
        let mut host = observer.clone();
        host.dispatch(HostEvent::PlayMusic);
        host.dispatch(HostEvent::LoadBackground {
            name: "SALLE.PI1".to_string(),
        });

        assert_eq!(
            observer.events(),
            vec![
                HostEvent::PlayMusic,
                HostEvent::LoadBackground {
                    name: "SALLE.PI1".to_string()
                },
            ]
        );
        assert_eq!(observer.take_events().len(), 2);
        assert!(host.events().is_empty());
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let json = serde_json::to_value(HostEvent::ChangeDataDisk { disk: 2 }).unwrap();
        assert_eq!(json["kind"], "change_data_disk");
        assert_eq!(json["disk"], 2);
    }

    #[test]
    fn queries_come_from_fixture_data() {
        let mut host = RecordingHost::new();
        host.zones.insert((10, 20), 3);
        host.playing.insert((4, 1));
        assert_eq!(host.zone_at(10, 20), 3);
        assert_eq!(host.zone_at(11, 20), 0);
        assert!(host.is_animation_playing(4, 1));
        assert!(!host.is_animation_playing(4, 2));
    }
}
