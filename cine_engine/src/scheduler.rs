use std::rc::Rc;

use cine_formats::ObjectRecord;
use log::{debug, warn};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::host::ScriptHost;
use crate::script::{
    ListRequest, Machine, OpcodeTable, Outcome, ScriptClass, ScriptError, ScriptInstance,
    ScriptList, ScriptTable,
};
use crate::state::{EngineState, PendingLoads, ResourceSize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutedScript {
    pub class: ScriptClass,
    pub script: u16,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortedScript {
    pub class: ScriptClass,
    pub script: u16,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRequest {
    pub request: ListRequest,
    pub error: String,
}

/// What one call to [`Engine::run_tick`] did, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u32,
    pub executed: Vec<ExecutedScript>,
    pub aborted: Vec<AbortedScript>,
    pub failed_requests: Vec<FailedRequest>,
    pub purged: usize,
    pub active_objects: Vec<u16>,
    pub active_globals: Vec<u16>,
}

impl TickReport {
    fn new(tick: u32) -> Self {
        TickReport {
            tick,
            executed: Vec::new(),
            aborted: Vec::new(),
            failed_requests: Vec::new(),
            purged: 0,
            active_objects: Vec::new(),
            active_globals: Vec::new(),
        }
    }
}

/// Owns the script tables, both instance lists and the shared state, and
/// drives them one tick at a time.
pub struct Engine<H: ScriptHost> {
    config: EngineConfig,
    machine: Machine,
    state: EngineState,
    host: H,
    procedures: ScriptTable,
    relations: ScriptTable,
    globals: ScriptList,
    objects: ScriptList,
    tick: u32,
}

impl<H: ScriptHost> Engine<H> {
    pub fn new(config: EngineConfig, host: H) -> Self {
        let machine = Machine::new(config.variant, config.rng_seed)
            .with_budget(config.instruction_budget);
        Engine {
            config,
            machine,
            state: EngineState::default(),
            host,
            procedures: ScriptTable::default(),
            relations: ScriptTable::default(),
            globals: ScriptList::new(),
            objects: ScriptList::new(),
            tick: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn opcodes(&self) -> &'static OpcodeTable {
        self.machine.opcodes()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn globals(&self) -> &ScriptList {
        &self.globals
    }

    pub fn objects(&self) -> &ScriptList {
        &self.objects
    }

    pub fn procedures(&self) -> &ScriptTable {
        &self.procedures
    }

    pub fn relations(&self) -> &ScriptTable {
        &self.relations
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Installs a procedure table without touching running instances.
    pub fn load_procedures<I>(&mut self, images: I) -> Result<(), ScriptError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        self.procedures = ScriptTable::from_images(images, self.machine.opcodes())?;
        debug!("loaded {} procedures", self.procedures.len());
        Ok(())
    }

    /// Swaps in a new procedure table, drops every global instance and
    /// enqueues the boot script again.
    pub fn replace_procedures<I>(&mut self, images: I) -> Result<(), ScriptError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        self.load_procedures(images)?;
        self.globals.clear();
        self.boot()
    }

    /// Swaps in a new relation table and drops every object instance.
    pub fn load_relations<I>(&mut self, images: I) -> Result<(), ScriptError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        self.relations = ScriptTable::from_images(images, self.machine.opcodes())?;
        self.objects.clear();
        debug!("loaded {} object scripts", self.relations.len());
        Ok(())
    }

    pub fn load_objects(&mut self, records: &[ObjectRecord]) {
        self.state.load_objects(records);
    }

    pub fn set_resources(&mut self, resources: Vec<ResourceSize>) {
        self.state.resources = resources;
    }

    pub fn boot(&mut self) -> Result<(), ScriptError> {
        self.start_global_script(self.config.boot_script)
    }

    pub fn start_global_script(&mut self, script: u16) -> Result<(), ScriptError> {
        let image = self.procedures.get(script)?;
        self.globals.push(ScriptInstance::new(script, Rc::clone(image)));
        debug!("started global script {script}");
        Ok(())
    }

    pub fn stop_global_script(&mut self, script: u16) -> bool {
        let stopped = self.globals.stop_first(script);
        debug!("stop global script {script}: {}", found(stopped));
        stopped
    }

    pub fn start_object_script(&mut self, script: u16) -> Result<(), ScriptError> {
        let image = self.relations.get(script)?;
        self.objects.push(ScriptInstance::new(script, Rc::clone(image)));
        debug!("started object script {script}");
        Ok(())
    }

    pub fn stop_object_script(&mut self, script: u16) -> bool {
        let stopped = self.objects.stop_first(script);
        debug!("stop object script {script}: {}", found(stopped));
        stopped
    }

    /// Names recorded by `loadNewPrcName`, once a script has asked for them.
    pub fn take_pending_loads(&mut self) -> Option<PendingLoads> {
        self.state.take_pending_loads()
    }

    /// Runs every object instance, then every global instance, then purges
    /// tombstones from both lists.
    pub fn run_tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut report = TickReport::new(self.tick);
        self.run_list(ScriptClass::Object, &mut report);
        self.run_list(ScriptClass::Global, &mut report);

        report.purged = self.objects.purge() + self.globals.purge();
        if report.purged > 0 {
            debug!("tick {}: purged {} finished instances", self.tick, report.purged);
        }
        report.active_objects = self.objects.active();
        report.active_globals = self.globals.active();
        report
    }

    fn run_list(&mut self, class: ScriptClass, report: &mut TickReport) {
        let mut position = 0;
        loop {
            let list = match class {
                ScriptClass::Global => &mut self.globals,
                ScriptClass::Object => &mut self.objects,
            };
            let Some(instance) = list.get_mut(position) else {
                break;
            };
            let script = instance.script_index();
            let result = self
                .machine
                .execute(instance, class, &mut self.state, &mut self.host);
            match (result, script) {
                (Ok(Outcome::Skipped), _) | (_, None) => {}
                (Ok(outcome), Some(script)) => report.executed.push(ExecutedScript {
                    class,
                    script,
                    outcome,
                }),
                (Err(err), Some(script)) => {
                    warn!("{class:?} script {script} aborted after resuming at {:#06x}: {err}", instance.pc);
                    instance.tombstone();
                    report.aborted.push(AbortedScript {
                        class,
                        script,
                        error: err.to_string(),
                    });
                }
            }
            self.apply_requests(report);
            position += 1;
        }
    }

    fn apply_requests(&mut self, report: &mut TickReport) {
        for request in self.machine.take_requests() {
            let result = match request {
                ListRequest::StartGlobal { script } => self.start_global_script(script),
                ListRequest::StopGlobal { script } => {
                    self.stop_global_script(script);
                    Ok(())
                }
                ListRequest::StartObject { script } => self.start_object_script(script),
                ListRequest::StopObject { script } => {
                    self.stop_object_script(script);
                    Ok(())
                }
                ListRequest::End { class, script } => {
                    match class {
                        ScriptClass::Global => self.globals.stop_first(script),
                        ScriptClass::Object => self.objects.stop_first(script),
                    };
                    Ok(())
                }
            };
            if let Err(err) = result {
                warn!("tick {}: {request:?} failed: {err}", self.tick);
                report.failed_requests.push(FailedRequest {
                    request,
                    error: err.to_string(),
                });
            }
        }
    }
}

fn found(stopped: bool) -> &'static str {
    if stopped {
        "stopped"
    } else {
        "not running"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;

    fn engine(procedures: Vec<Vec<u8>>) -> Engine<RecordingHost> {
        let mut engine = Engine::new(EngineConfig::default(), RecordingHost::new());
        engine.load_procedures(procedures).unwrap();
        engine
    }

    #[test]
    fn boot_enqueues_configured_script() {
        // 0: endScript, 1: break
        let mut engine = engine(vec![vec![0x51], vec![0x50]]);
        engine.boot().unwrap();
        assert_eq!(engine.globals().active(), vec![1]);

        let report = engine.run_tick();
        assert_eq!(
            report.executed,
            vec![ExecutedScript {
                class: ScriptClass::Global,
                script: 1,
                outcome: Outcome::Yielded
            }]
        );
        assert_eq!(report.active_globals, vec![1]);
    }

    #[test]
    fn missing_boot_script_is_an_error() {
        let mut engine = engine(vec![vec![0x51]]);
        assert_eq!(
            engine.boot(),
            Err(ScriptError::ScriptIndexOutOfRange { index: 1 })
        );
    }

    #[test]
    fn failed_start_request_is_reported() {
        // startGlobalScript 9; break
        let mut engine = engine(vec![vec![], vec![0x32, 0x09, 0x50]]);
        engine.boot().unwrap();
        let report = engine.run_tick();
        assert_eq!(
            report.failed_requests,
            vec![FailedRequest {
                request: ListRequest::StartGlobal { script: 9 },
                error: "script index 9 is not in the loaded table".to_string(),
            }]
        );
        assert_eq!(report.active_globals, vec![1]);
    }

    #[test]
    fn replacing_procedures_restarts_from_boot_script() {
        let mut engine = engine(vec![vec![0x50], vec![0x50]]);
        engine.start_global_script(0).unwrap();
        engine.start_global_script(0).unwrap();
        engine.replace_procedures(vec![vec![0x51], vec![0x50]]).unwrap();
        assert_eq!(engine.globals().active(), vec![1]);
    }
}
