//! VM root: owns every module, the instance arena, per-module ready queues, the VM-wide suspended
//! list, and the global scalar/array storage shared by every module and instance.

use crate::call_frame::CallFrame;
use crate::instance::{Instance, InstanceId, InstanceState};
use crate::module::Module;
use std::time::Duration;

pub const MAX_WORLD_VARS: usize = 256;
pub const MAX_GLOBAL_VARS: usize = 64;

/// A `(module_index, script_number)` pair identifying a static script descriptor across all
/// loaded modules, used for VM-wide lookups like `ACS_Execute`.
#[derive(Debug, Clone, Copy)]
pub struct ScriptRef {
    pub module_index: usize,
    pub script_number: i32,
}

pub struct Vm {
    pub modules: Vec<Module>,
    pub instances: Vec<Option<Instance>>,
    pub ready_queues: Vec<Vec<InstanceId>>,
    pub suspended: Vec<InstanceId>,
    pub world_vars: [i32; MAX_WORLD_VARS],
    pub global_vars: [i32; MAX_GLOBAL_VARS],
    pub world_arrays: Vec<Vec<i32>>,
    pub global_arrays: Vec<Vec<i32>>,
    pub tics: u64,
    pub active_scripts: usize,
    pub call_stack: Vec<CallFrame>,
    pub print_buffer: String,
    pub tic_duration: Duration,
    pub verbose: bool,
}

impl Vm {
    pub fn new(modules: Vec<Module>, tic_duration: Duration, verbose: bool) -> Self {
        let ready_queues = modules.iter().map(|_| Vec::new()).collect();
        Vm {
            modules,
            instances: Vec::new(),
            ready_queues,
            suspended: Vec::new(),
            world_vars: [0; MAX_WORLD_VARS],
            global_vars: [0; MAX_GLOBAL_VARS],
            world_arrays: (0..MAX_WORLD_VARS).map(|_| Vec::new()).collect(),
            global_arrays: (0..MAX_GLOBAL_VARS).map(|_| Vec::new()).collect(),
            tics: 0,
            active_scripts: 0,
            call_stack: Vec::new(),
            print_buffer: String::new(),
            tic_duration,
            verbose,
        }
    }

    pub fn alloc_instance(&mut self, instance: Instance) -> InstanceId {
        self.instances.push(Some(instance));
        self.active_scripts += 1;
        InstanceId(self.instances.len() - 1)
    }

    pub fn instance(&self, id: InstanceId) -> &Instance {
        self.instances[id.0].as_ref().expect("instance id must be live")
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
        self.instances[id.0].as_mut().expect("instance id must be live")
    }

    pub fn release_instance(&mut self, id: InstanceId) {
        if self.instances[id.0].take().is_some() {
            self.active_scripts = self.active_scripts.saturating_sub(1);
        }
    }

    /// Finds a *ready or suspended* instance running the script numbered `number`, searching
    /// ready queues first and then the suspended list — used by `ScriptWait` and `ACS_Execute`.
    pub fn find_instance_by_script_number(&self, number: i32) -> Option<InstanceId> {
        for queue in &self.ready_queues {
            for &id in queue {
                if self.instance(id).script_number == number {
                    return Some(id);
                }
            }
        }
        self.suspended
            .iter()
            .copied()
            .find(|&id| self.instance(id).script_number == number)
    }

    /// Reads a world-array element; out-of-bounds (beyond current length) reads return 0 without
    /// growing the backing storage.
    pub fn read_world_array(&self, slot: usize, index: usize) -> i32 {
        self.world_arrays
            .get(slot)
            .and_then(|v| v.get(index))
            .copied()
            .unwrap_or(0)
    }

    /// Writes a world-array element, auto-growing the backing vector to `index + 1 + 1000`
    /// zero-filled elements if needed.
    pub fn write_world_array(&mut self, slot: usize, index: usize, value: i32) {
        let v = &mut self.world_arrays[slot];
        if index >= v.len() {
            v.resize(index + 1 + 1000, 0);
        }
        v[index] = value;
    }

    pub fn read_global_array(&self, slot: usize, index: usize) -> i32 {
        self.global_arrays
            .get(slot)
            .and_then(|v| v.get(index))
            .copied()
            .unwrap_or(0)
    }

    pub fn write_global_array(&mut self, slot: usize, index: usize, value: i32) {
        let v = &mut self.global_arrays[slot];
        if index >= v.len() {
            v.resize(index + 1 + 1000, 0);
        }
        v[index] = value;
    }

    /// Inserts `id` into module `module_index`'s ready queue, keeping it sorted nondecreasing by
    /// `resume_time`; ties favor the incoming (later) element, matching the reference's
    /// `enq_script`/`run_sooner` scan-forward-then-insert-before behavior.
    pub fn enqueue_ready(&mut self, module_index: usize, id: InstanceId) {
        let resume_time = self.instance(id).resume_time;
        let queue = &mut self.ready_queues[module_index];
        let pos = queue
            .iter()
            .position(|&existing| self.instances[existing.0].as_ref().unwrap().resume_time > resume_time)
            .unwrap_or(queue.len());
        queue.insert(pos, id);
    }

    /// Re-enqueues every waiter of a just-terminated instance, in the order they joined the
    /// waiter chain, and releases the terminated instance.
    pub fn finish_termination(&mut self, id: InstanceId) {
        let waiters = std::mem::take(&mut self.instance_mut(id).waiters);
        for waiter in waiters {
            let module_index = self.instance(waiter).module_index;
            self.instance_mut(waiter).state = InstanceState::Running;
            self.enqueue_ready(module_index, waiter);
        }
        self.release_instance(id);
    }
}
