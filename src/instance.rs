//! Live script instances: one per running/waiting/suspended invocation of a [`Script`] descriptor.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Terminated,
    Running,
    Suspended,
    Delayed,
    Waiting,
}

/// A handle into the VM's flat instance arena, avoiding raw owning pointers for the otherwise
/// cyclic instance/module/waiter-chain graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub usize);

/// A live invocation of a script: fresh locals, local-array storage, and scheduling state.
#[derive(Debug, Clone)]
pub struct Instance {
    pub module_index: usize,
    pub script_number: i32,
    pub vars: Vec<i32>,
    pub arrays: Vec<i32>,
    pub delay_amount: i32,
    pub resume_time: u64,
    pub ip: usize,
    pub waiters: Vec<InstanceId>,
    pub state: InstanceState,
}

impl Instance {
    pub fn new(module_index: usize, script_number: i32, num_vars: i32, total_array_size: i32, start: usize) -> Self {
        Instance {
            module_index,
            script_number,
            vars: vec![0; num_vars.max(0) as usize],
            arrays: vec![0; total_array_size.max(0) as usize],
            delay_amount: 0,
            resume_time: 0,
            ip: start,
            waiters: Vec::new(),
            state: InstanceState::Running,
        }
    }
}
