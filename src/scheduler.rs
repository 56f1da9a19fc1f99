//! Scheduler: boots every OPEN script, then drives the cooperative run loop, advancing a tic
//! counter and dispatching ready instances to the interpreter until no module has ready work.

use crate::diagnostics::{self, Level};
use crate::instance::{Instance, InstanceId, InstanceState};
use crate::interpreter::{self, TurnOutcome};
use crate::module::ScriptType;
use crate::vm::Vm;

/// Creates one instance per OPEN-type script across all modules, in module-then-script-list
/// order, and enqueues them — run before the run loop starts.
pub fn boot(vm: &mut Vm) {
    for module_index in 0..vm.modules.len() {
        let scripts: Vec<(i32, i32, i32, usize)> = vm.modules[module_index]
            .scripts
            .iter()
            .filter(|s| s.script_type == ScriptType::Open)
            .map(|s| (s.number, s.num_vars, s.arrays.total_size, s.start))
            .collect();
        for (number, num_vars, total_array_size, start) in scripts {
            let instance = Instance::new(module_index, number, num_vars, total_array_size, start);
            let id = vm.alloc_instance(instance);
            vm.enqueue_ready(module_index, id);
            diagnostics::emit(Level::Debug, &format!("starting script {}", number));
        }
    }
}

/// Runs until every module's ready queue is empty. Returns on the first fatal error.
pub fn run(vm: &mut Vm) -> Result<(), crate::error::VmError> {
    loop {
        if !any_ready(vm) {
            break;
        }
        for module_index in 0..vm.modules.len() {
            loop {
                let next = vm
                    .ready_queues
                    .get(module_index)
                    .and_then(|q| q.first())
                    .copied();
                let Some(id) = next else { break };
                if vm.instance(id).resume_time > vm.tics {
                    break;
                }
                vm.ready_queues[module_index].remove(0);
                run_one_turn(vm, module_index, id)?;
            }
        }
        next_tic(vm);
    }
    Ok(())
}

fn any_ready(vm: &Vm) -> bool {
    vm.ready_queues.iter().any(|q| !q.is_empty())
}

fn next_tic(vm: &mut Vm) {
    if vm.active_scripts > 0 {
        std::thread::sleep(vm.tic_duration);
        vm.tics += 1;
    }
}

fn run_one_turn(vm: &mut Vm, module_index: usize, id: InstanceId) -> Result<(), crate::error::VmError> {
    vm.instance_mut(id).state = InstanceState::Running;
    let outcome = interpreter::run_turn(vm, module_index, id)?;
    post_turn(vm, module_index, id, outcome)
}

fn post_turn(
    vm: &mut Vm,
    module_index: usize,
    id: InstanceId,
    outcome: TurnOutcome,
) -> Result<(), crate::error::VmError> {
    match outcome {
        TurnOutcome::Waiting => {
            // Already linked onto the target's waiter chain by the interpreter; nothing to do.
        }
        TurnOutcome::Terminated => {
            diagnostics::emit(
                Level::Debug,
                &format!("script {} finished running", vm.instance(id).script_number),
            );
            vm.finish_termination(id);
        }
        TurnOutcome::Suspended => {
            vm.instance_mut(id).state = InstanceState::Suspended;
            vm.suspended.push(id);
        }
        TurnOutcome::Delayed => {
            vm.instance_mut(id).state = InstanceState::Delayed;
            vm.enqueue_ready(module_index, id);
        }
        TurnOutcome::RanOutOfTurn => {
            // The reference leaves this branch as a TODO ("tic limit exceeded"); this
            // implementation terminates the instance as an explicit policy decision.
            log::warn!(
                "script {} exceeded its turn budget; terminating",
                vm.instance(id).script_number
            );
            vm.finish_termination(id);
        }
    }
    Ok(())
}
