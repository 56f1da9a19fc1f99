//! The stack-based interpreter: decodes and executes one script instance's turn, from wherever
//! it last left off until it terminates, suspends, delays, or waits.

use crate::call_frame::CallFrame;
use crate::diagnostics::{self, Level};
use crate::error::VmError;
use crate::instance::{InstanceId, InstanceState};
use crate::op_code::OpCode;
use crate::vm::Vm;

/// What an instance was doing when its turn ended, for the scheduler to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Waiting,
    Terminated,
    Suspended,
    Delayed,
    RanOutOfTurn,
}

const STACK_MIN_CAPACITY: usize = 1000;

/// Per-turn mutable context: the evaluation stack, instruction pointer, and the module/instance
/// currently executing. Not shared across instances or across turns.
struct Turn<'vm> {
    vm: &'vm mut Vm,
    module_index: usize,
    instance_id: InstanceId,
    stack: Vec<i32>,
    ip: usize,
    /// Depth of `vm.call_stack` when this turn began, so frames this turn pushed can be unwound
    /// on any exit that isn't a balanced `RETURNVOID`/`RETURNVAL` — the call stack is VM-global
    /// and shared across instances, so leaving a frame behind would corrupt the next instance's
    /// var/array routing.
    call_depth_at_entry: usize,
}

impl<'vm> Turn<'vm> {
    fn push(&mut self, value: i32) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<i32, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn current_module(&self) -> usize {
        self.vm
            .call_stack
            .last()
            .map(|f| f.function_module)
            .unwrap_or(self.module_index)
    }

    fn code(&self) -> &[u8] {
        &self.vm.modules[self.current_module()].object.data
    }

    fn small_code(&self) -> bool {
        self.vm.modules[self.current_module()].object.small_code
    }

    fn read_u8(&mut self) -> Result<u8, VmError> {
        let code = self.code();
        let b = *code.get(self.ip).ok_or(VmError::IpOutOfBounds {
            ip: self.ip,
            size: code.len(),
        })?;
        self.ip += 1;
        Ok(b)
    }

    fn read_i32(&mut self) -> Result<i32, VmError> {
        let code = self.code();
        if self.ip + 4 > code.len() {
            return Err(VmError::IpOutOfBounds {
                ip: self.ip,
                size: code.len(),
            });
        }
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&code[self.ip..self.ip + 4]);
        self.ip += 4;
        Ok(i32::from_le_bytes(buf))
    }

    /// Reads one "byte operand" — always a single byte regardless of small/fixed mode, used by
    /// var-index and array-table-index operands.
    fn read_index(&mut self) -> Result<usize, VmError> {
        Ok(self.read_u8()? as usize)
    }

    /// Reads a line-special id: 1 byte in small-code mode, 4 bytes otherwise.
    fn read_special_id(&mut self) -> Result<i32, VmError> {
        if self.small_code() {
            Ok(self.read_u8()? as i32)
        } else {
            self.read_i32()
        }
    }

    fn decode_opcode(&mut self) -> Result<OpCode, VmError> {
        if self.small_code() {
            let first = self.read_u8()?;
            let second = if first as u16 >= OpCode::SMALL_CODE_EXTENSION {
                Some(self.read_u8()?)
            } else {
                None
            };
            OpCode::from_small_code(first, second)
                .ok_or(VmError::UnknownOpcode { opcode: first as u16 + second.unwrap_or(0) as u16 })
        } else {
            let raw = self.read_i32()? as u32;
            OpCode::from_fixed_code(raw).ok_or(VmError::UnknownOpcode { opcode: raw as u16 })
        }
    }

    /// Resolves a script-var slot to its current value, routing through the active call frame's
    /// locals when one exists — consistently, for every script-var op family.
    fn script_var(&self, index: usize) -> i32 {
        if let Some(frame) = self.vm.call_stack.last() {
            frame.locals.get(index).copied().unwrap_or(0)
        } else {
            self.vm.instance(self.instance_id).vars.get(index).copied().unwrap_or(0)
        }
    }

    fn set_script_var(&mut self, index: usize, value: i32) {
        if let Some(frame) = self.vm.call_stack.last_mut() {
            if index < frame.locals.len() {
                frame.locals[index] = value;
            }
        } else {
            let id = self.instance_id;
            let instance = self.vm.instance_mut(id);
            if index < instance.vars.len() {
                instance.vars[index] = value;
            }
        }
    }

    fn map_var(&self, module: usize, index: usize) -> i32 {
        let (em, es) = self.vm.modules[module].map_var_indirection[index];
        self.vm.modules[em].vars[es].value
    }

    fn set_map_var(&mut self, module: usize, index: usize, value: i32) {
        let (em, es) = self.vm.modules[module].map_var_indirection[index];
        self.vm.modules[em].vars[es].value = value;
    }

    fn script_array_entry(&self, array_index: usize) -> (usize, i32) {
        if let Some(frame) = self.vm.call_stack.last() {
            let start = frame
                .arrays_table
                .entries
                .get(array_index)
                .map(|e| e.start)
                .unwrap_or(0);
            (array_index, start)
        } else {
            let instance = self.vm.instance(self.instance_id);
            let module = &self.vm.modules[instance.module_index];
            let script = module.find_script(instance.script_number);
            let start = script
                .and_then(|s| s.arrays.entries.get(array_index))
                .map(|e| e.start)
                .unwrap_or(0);
            (array_index, start)
        }
    }

    fn script_array_read(&self, array_index: usize, element: usize) -> i32 {
        let (_, start) = self.script_array_entry(array_index);
        let idx = (start as usize) + element;
        if let Some(frame) = self.vm.call_stack.last() {
            frame.arrays.get(idx).copied().unwrap_or(0)
        } else {
            self.vm.instance(self.instance_id).arrays.get(idx).copied().unwrap_or(0)
        }
    }

    fn script_array_write(&mut self, array_index: usize, element: usize, value: i32) {
        let (_, start) = self.script_array_entry(array_index);
        let idx = (start as usize) + element;
        if let Some(frame) = self.vm.call_stack.last_mut() {
            if idx < frame.arrays.len() {
                frame.arrays[idx] = value;
            }
        } else {
            let id = self.instance_id;
            let instance = self.vm.instance_mut(id);
            if idx < instance.arrays.len() {
                instance.arrays[idx] = value;
            }
        }
    }
}

/// Runs `id` (belonging to module `module_index`) until its turn ends, returning why.
pub fn run_turn(vm: &mut Vm, module_index: usize, id: InstanceId) -> Result<TurnOutcome, VmError> {
    let ip = vm.instance(id).ip;
    let call_depth_at_entry = vm.call_stack.len();
    let mut turn = Turn {
        vm,
        module_index,
        instance_id: id,
        stack: Vec::with_capacity(STACK_MIN_CAPACITY),
        ip,
        call_depth_at_entry,
    };

    loop {
        let op = turn.decode_opcode()?;
        match step(&mut turn, op)? {
            Some(outcome) => {
                turn.vm.call_stack.truncate(turn.call_depth_at_entry);
                turn.vm.instance_mut(id).ip = turn.ip;
                return Ok(outcome);
            }
            None => continue,
        }
    }
}

/// Executes one decoded instruction. Returns `Some(outcome)` if the turn ends here.
fn step(t: &mut Turn, op: OpCode) -> Result<Option<TurnOutcome>, VmError> {
    use OpCode::*;
    match op {
        Nop => {}
        Terminate => return Ok(Some(TurnOutcome::Terminated)),
        Suspend => return Ok(Some(TurnOutcome::Suspended)),
        Restart => {
            let id = t.instance_id;
            let instance = t.vm.instance(id);
            let start = t
                .vm
                .modules[instance.module_index]
                .find_script(instance.script_number)
                .map(|s| s.start)
                .unwrap_or(t.ip);
            t.ip = start;
        }

        PushNumber => {
            let v = t.read_i32()?;
            t.push(v);
        }
        PushByte => {
            let v = t.read_u8()? as i32;
            t.push(v);
        }
        PushBytes | Push2Bytes | Push3Bytes | Push4Bytes | Push5Bytes => {
            let count = match op {
                PushBytes => t.read_u8()? as usize,
                Push2Bytes => 2,
                Push3Bytes => 3,
                Push4Bytes => 4,
                Push5Bytes => 5,
                _ => unreachable!(),
            };
            for _ in 0..count {
                let v = t.read_u8()? as i32;
                t.push(v);
            }
        }
        Dup => {
            let v = t.pop()?;
            t.push(v);
            t.push(v);
        }
        Swap => {
            let b = t.pop()?;
            let a = t.pop()?;
            t.push(b);
            t.push(a);
        }
        Drop => {
            t.pop()?;
        }
        Goto => {
            let target = t.read_i32()? as usize;
            t.ip = target;
        }
        IfGoto => {
            let target = t.read_i32()? as usize;
            if t.pop()? != 0 {
                t.ip = target;
            }
        }
        IfNotGoto => {
            let target = t.read_i32()? as usize;
            if t.pop()? == 0 {
                t.ip = target;
            }
        }
        CaseGoto | CaseGotoSorted => {
            let value = t.read_i32()?;
            let target = t.read_i32()? as usize;
            let top = t.pop()?;
            if top == value {
                t.ip = target;
            } else {
                t.push(top);
            }
        }

        Delay | DelayDirect | DelayDirectB => {
            let amount = match op {
                DelayDirectB => t.read_u8()? as i32,
                DelayDirect => t.read_i32()?,
                _ => t.pop()?,
            };
            if amount > 0 {
                let id = t.instance_id;
                let instance = t.vm.instance_mut(id);
                instance.delay_amount = amount;
                instance.state = InstanceState::Delayed;
                instance.resume_time = t.vm.tics + amount as u64;
                return Ok(Some(TurnOutcome::Delayed));
            }
        }

        Add | Subtract | Multiply | Divide | Modulus | LShift | RShift | AndBitwise
        | OrBitwise | EorBitwise | AndLogical | OrLogical | EQ | NE | LT | GT | LE | GE => {
            let b = t.pop()?;
            let a = t.pop()?;
            let script_number = t.vm.instance(t.instance_id).script_number;
            let result = match op {
                Add => a.wrapping_add(b),
                Subtract => a.wrapping_sub(b),
                Multiply => a.wrapping_mul(b),
                Divide => {
                    if b == 0 {
                        return Err(VmError::DivideByZero { script: script_number });
                    }
                    a.wrapping_div(b)
                }
                Modulus => {
                    if b == 0 {
                        return Err(VmError::ModuloByZero { script: script_number });
                    }
                    a.wrapping_rem(b)
                }
                LShift => a.wrapping_shl(b as u32),
                RShift => a.wrapping_shr(b as u32),
                AndBitwise => a & b,
                OrBitwise => a | b,
                EorBitwise => a ^ b,
                AndLogical => ((a != 0) && (b != 0)) as i32,
                OrLogical => ((a != 0) || (b != 0)) as i32,
                EQ => (a == b) as i32,
                NE => (a != b) as i32,
                LT => (a < b) as i32,
                GT => (a > b) as i32,
                LE => (a <= b) as i32,
                GE => (a >= b) as i32,
                _ => unreachable!(),
            };
            t.push(result);
        }
        UnaryMinus => {
            let a = t.pop()?;
            t.push(a.wrapping_neg());
        }
        NegateLogical => {
            let a = t.pop()?;
            t.push((a == 0) as i32);
        }
        NegateBinary => {
            let a = t.pop()?;
            t.push(!a);
        }

        AssignScriptVar | AddScriptVar | SubScriptVar | MulScriptVar | DivScriptVar
        | ModScriptVar | IncScriptVar | DecScriptVar | PushScriptVar => {
            let index = t.read_index()?;
            compound_var(t, op, Var::Script(index))?;
        }
        AssignMapVar | AddMapVar | SubMapVar | MulMapVar | DivMapVar | ModMapVar
        | IncMapVar | DecMapVar | PushMapVar => {
            let index = t.read_index()?;
            compound_var(t, op, Var::Map(index))?;
        }
        AssignWorldVar | AddWorldVar | SubWorldVar | MulWorldVar | DivWorldVar
        | ModWorldVar | IncWorldVar | DecWorldVar | PushWorldVar => {
            let index = t.read_index()?;
            compound_var(t, op, Var::World(index))?;
        }
        AssignGlobalVar | AddGlobalVar | SubGlobalVar | MulGlobalVar | DivGlobalVar
        | ModGlobalVar | IncGlobalVar | DecGlobalVar | PushGlobalVar => {
            let index = t.read_index()?;
            compound_var(t, op, Var::Global(index))?;
        }

        PushMapArray | AssignMapArray | AddMapArray | SubMapArray | MulMapArray
        | DivMapArray | ModMapArray | IncMapArray | DecMapArray => {
            let slot = t.read_index()?;
            map_array_op(t, op, slot)?;
        }
        PushWorldArray | AssignWorldArray | AddWorldArray | SubWorldArray | MulWorldArray
        | DivWorldArray | ModWorldArray | IncWorldArray | DecWorldArray => {
            let slot = t.read_index()?;
            world_global_array_op(t, op, slot, true)?;
        }
        PushGlobalArray | AssignGlobalArray | AddGlobalArray | SubGlobalArray
        | MulGlobalArray | DivGlobalArray | ModGlobalArray | IncGlobalArray
        | DecGlobalArray => {
            let slot = t.read_index()?;
            world_global_array_op(t, op, slot, false)?;
        }
        PushScriptArray | AssignScriptArray | AddScriptArray | SubScriptArray
        | MulScriptArray | DivScriptArray | ModScriptArray | IncScriptArray
        | DecScriptArray => {
            let array_index = t.read_index()?;
            script_array_op(t, op, array_index)?;
        }

        LSpec1 | LSpec2 | LSpec3 | LSpec4 | LSpec5 | LSpec1Direct | LSpec2Direct
        | LSpec3Direct | LSpec4Direct | LSpec5Direct | LSpec1DirectB | LSpec2DirectB
        | LSpec3DirectB | LSpec4DirectB | LSpec5DirectB | LSpec5Result => {
            line_special(t, op)?;
        }

        Call | CallDiscard => {
            let func_index = t.read_index()?;
            call_function(t, func_index, op == CallDiscard)?;
        }
        ReturnVoid | ReturnVal => {
            return_from_function(t, op == ReturnVal)?;
        }

        CallFunc => {
            let num_args = t.read_u8()? as usize;
            let func_id = if t.small_code() {
                t.read_i32()? as i32 & 0xffff
            } else {
                t.read_i32()?
            };
            call_func(t, func_id, num_args)?;
        }

        ScriptWait | ScriptWaitDirect | ScriptWaitNamed => {
            let number = match op {
                ScriptWaitDirect => t.read_i32()?,
                _ => t.pop()?,
            };
            if let Some(target) = t.vm.find_instance_by_script_number(number) {
                let waiter = t.instance_id;
                t.vm.instance_mut(target).waiters.push(waiter);
                t.vm.instance_mut(waiter).state = InstanceState::Waiting;
                t.vm.instance_mut(waiter).ip = t.ip;
                return Ok(Some(TurnOutcome::Waiting));
            }
        }

        BeginPrint => {
            t.vm.print_buffer.clear();
        }
        PrintString => {
            let idx = t.pop()? as usize;
            let module = t.current_module();
            if let Some(s) = t.vm.modules[module].strings.get(idx) {
                t.vm.print_buffer.push_str(s);
            }
        }
        PrintNumber => {
            let v = t.pop()?;
            t.vm.print_buffer.push_str(&v.to_string());
        }
        PrintCharacter => {
            let v = t.pop()?;
            if let Some(c) = char::from_u32(v as u32) {
                t.vm.print_buffer.push(c);
            }
        }
        EndPrint | EndPrintBold => {
            let buffer = std::mem::take(&mut t.vm.print_buffer);
            diagnostics::flush_print(&buffer);
        }
        EndLog => {
            let buffer = std::mem::take(&mut t.vm.print_buffer);
            diagnostics::flush_log(&buffer);
        }
        TagString => {}

        PrintFixed | PrintLocalized | MoreHudMessage | OptHudMessage | EndHudMessage
        | EndHudMessageBold | PrintMapCharArray | PrintWorldCharArray
        | PrintGlobalCharArray | PrintScriptCharArray => {
            return Err(VmError::PrintNotImplemented { name: print_name(op) });
        }

        LineSide => {
            t.push(0);
        }
        ClearLineSpecial => {}

        _ => {
            dispatch_builtin(t, op)?;
        }
    }
    Ok(None)
}

fn print_name(op: OpCode) -> &'static str {
    use OpCode::*;
    match op {
        PrintFixed => "PrintFixed",
        PrintLocalized => "PrintLocalized",
        MoreHudMessage => "MoreHudMessage",
        OptHudMessage => "OptHudMessage",
        EndHudMessage => "EndHudMessage",
        EndHudMessageBold => "EndHudMessageBold",
        PrintMapCharArray => "PrintMapCharArray",
        PrintWorldCharArray => "PrintWorldCharArray",
        PrintGlobalCharArray => "PrintGlobalCharArray",
        PrintScriptCharArray => "PrintScriptCharArray",
        _ => "Print",
    }
}

enum Var {
    Script(usize),
    Map(usize),
    World(usize),
    Global(usize),
}

fn compound_var(t: &mut Turn, op: OpCode, var: Var) -> Result<(), VmError> {
    use OpCode::*;

    let current = match &var {
        Var::Script(i) => t.script_var(*i),
        Var::Map(i) => t.map_var(t.current_module(), *i),
        Var::World(i) => t.vm.world_vars.get(*i).copied().unwrap_or(0),
        Var::Global(i) => t.vm.global_vars.get(*i).copied().unwrap_or(0),
    };

    let is_push = matches!(op, PushScriptVar | PushMapVar | PushWorldVar | PushGlobalVar);
    let is_inc_dec = matches!(
        op,
        IncScriptVar | DecScriptVar | IncMapVar | DecMapVar | IncWorldVar | DecWorldVar
            | IncGlobalVar | DecGlobalVar
    );

    if is_push {
        t.push(current);
        return Ok(());
    }

    let delta_sign = if matches!(
        op,
        DecScriptVar | DecMapVar | DecWorldVar | DecGlobalVar
    ) {
        -1
    } else {
        1
    };

    let new_value = if is_inc_dec {
        current.wrapping_add(delta_sign)
    } else {
        let operand = t.pop()?;
        match op {
            AssignScriptVar | AssignMapVar | AssignWorldVar | AssignGlobalVar => operand,
            AddScriptVar | AddMapVar | AddWorldVar | AddGlobalVar => current.wrapping_add(operand),
            SubScriptVar | SubMapVar | SubWorldVar | SubGlobalVar => current.wrapping_sub(operand),
            MulScriptVar | MulMapVar | MulWorldVar | MulGlobalVar => current.wrapping_mul(operand),
            DivScriptVar | DivMapVar | DivWorldVar | DivGlobalVar => {
                let script = t.vm.instance(t.instance_id).script_number;
                if operand == 0 {
                    return Err(VmError::DivideByZero { script });
                }
                current.wrapping_div(operand)
            }
            ModScriptVar | ModMapVar | ModWorldVar | ModGlobalVar => {
                let script = t.vm.instance(t.instance_id).script_number;
                if operand == 0 {
                    return Err(VmError::ModuloByZero { script });
                }
                current.wrapping_rem(operand)
            }
            _ => unreachable!(),
        }
    };

    match var {
        Var::Script(i) => t.set_script_var(i, new_value),
        Var::Map(i) => {
            let module = t.current_module();
            t.set_map_var(module, i, new_value);
        }
        Var::World(i) => {
            if i < t.vm.world_vars.len() {
                t.vm.world_vars[i] = new_value;
            }
        }
        Var::Global(i) => {
            if i < t.vm.global_vars.len() {
                t.vm.global_vars[i] = new_value;
            }
        }
    }
    Ok(())
}

fn map_array_op(t: &mut Turn, op: OpCode, slot: usize) -> Result<(), VmError> {
    use OpCode::*;
    let module = t.current_module();
    let (exp_mod, exp_slot) = t.vm.modules[module].map_var_indirection[slot];

    if matches!(
        op,
        AddMapArray | SubMapArray | MulMapArray | DivMapArray | ModMapArray
    ) {
        return Err(VmError::MapArrayCompoundUnimplemented);
    }

    match op {
        PushMapArray => {
            let index = t.pop()? as usize;
            let value = t
                .vm
                .modules[exp_mod]
                .vars[exp_slot]
                .elements
                .get(index)
                .copied()
                .unwrap_or(0);
            t.push(value);
        }
        AssignMapArray => {
            let index = t.pop()? as usize;
            let value = t.pop()?;
            if let Some(slot) = t.vm.modules[exp_mod].vars[exp_slot].elements.get_mut(index) {
                *slot = value;
            }
        }
        IncMapArray | DecMapArray => {
            let index = t.pop()? as usize;
            let delta = if op == IncMapArray { 1 } else { -1 };
            if let Some(slot) = t.vm.modules[exp_mod].vars[exp_slot].elements.get_mut(index) {
                *slot = slot.wrapping_add(delta);
            }
        }
        _ => unreachable!(),
    }
    Ok(())
}

fn world_global_array_op(t: &mut Turn, op: OpCode, slot: usize, is_world: bool) -> Result<(), VmError> {
    use OpCode::*;
    let capacity = if is_world {
        crate::vm::MAX_WORLD_VARS
    } else {
        crate::vm::MAX_GLOBAL_VARS
    };
    if slot >= capacity {
        let id = t.instance_id;
        t.vm.instance_mut(id).state = InstanceState::Terminated;
        diagnostics::emit(Level::Error, &format!("array slot {} out of range", slot));
        return Ok(());
    }

    let is_push = matches!(op, PushWorldArray | PushGlobalArray);
    let is_inc_dec = matches!(
        op,
        IncWorldArray | DecWorldArray | IncGlobalArray | DecGlobalArray
    );

    if is_push {
        let index = t.pop()? as usize;
        let value = if is_world {
            t.vm.read_world_array(slot, index)
        } else {
            t.vm.read_global_array(slot, index)
        };
        t.push(value);
        return Ok(());
    }

    if is_inc_dec {
        let index = t.pop()? as usize;
        let delta = if matches!(op, IncWorldArray | IncGlobalArray) { 1 } else { -1 };
        let current = if is_world {
            t.vm.read_world_array(slot, index)
        } else {
            t.vm.read_global_array(slot, index)
        };
        let updated = current.wrapping_add(delta);
        if is_world {
            t.vm.write_world_array(slot, index, updated);
        } else {
            t.vm.write_global_array(slot, index, updated);
        }
        return Ok(());
    }

    let index = t.pop()? as usize;
    let operand = t.pop()?;
    let current = if is_world {
        t.vm.read_world_array(slot, index)
    } else {
        t.vm.read_global_array(slot, index)
    };
    let script = t.vm.instance(t.instance_id).script_number;
    let new_value = match op {
        AssignWorldArray | AssignGlobalArray => operand,
        AddWorldArray | AddGlobalArray => current.wrapping_add(operand),
        SubWorldArray | SubGlobalArray => current.wrapping_sub(operand),
        MulWorldArray | MulGlobalArray => current.wrapping_mul(operand),
        DivWorldArray | DivGlobalArray => {
            if operand == 0 {
                return Err(VmError::DivideByZero { script });
            }
            current.wrapping_div(operand)
        }
        ModWorldArray | ModGlobalArray => {
            if operand == 0 {
                return Err(VmError::ModuloByZero { script });
            }
            current.wrapping_rem(operand)
        }
        _ => unreachable!(),
    };
    if is_world {
        t.vm.write_world_array(slot, index, new_value);
    } else {
        t.vm.write_global_array(slot, index, new_value);
    }
    Ok(())
}

fn script_array_op(t: &mut Turn, op: OpCode, array_index: usize) -> Result<(), VmError> {
    use OpCode::*;
    let script = t.vm.instance(t.instance_id).script_number;
    match op {
        PushScriptArray => {
            let element = t.pop()? as usize;
            let v = t.script_array_read(array_index, element);
            t.push(v);
        }
        AssignScriptArray => {
            let element = t.pop()? as usize;
            let value = t.pop()?;
            t.script_array_write(array_index, element, value);
        }
        IncScriptArray | DecScriptArray => {
            let element = t.pop()? as usize;
            let delta = if op == IncScriptArray { 1 } else { -1 };
            let current = t.script_array_read(array_index, element);
            t.script_array_write(array_index, element, current.wrapping_add(delta));
        }
        AddScriptArray | SubScriptArray | MulScriptArray | DivScriptArray | ModScriptArray => {
            let element = t.pop()? as usize;
            let operand = t.pop()?;
            let current = t.script_array_read(array_index, element);
            let new_value = match op {
                AddScriptArray => current.wrapping_add(operand),
                SubScriptArray => current.wrapping_sub(operand),
                MulScriptArray => current.wrapping_mul(operand),
                DivScriptArray => {
                    if operand == 0 {
                        return Err(VmError::DivideByZero { script });
                    }
                    current.wrapping_div(operand)
                }
                ModScriptArray => {
                    if operand == 0 {
                        return Err(VmError::ModuloByZero { script });
                    }
                    current.wrapping_rem(operand)
                }
                _ => unreachable!(),
            };
            t.script_array_write(array_index, element, new_value);
        }
        _ => unreachable!(),
    }
    Ok(())
}

/// Only `ACS_Execute` (special id 80) actually runs; everything else is traced and, for
/// `RESULT` forms, pushes 0.
fn line_special(t: &mut Turn, op: OpCode) -> Result<(), VmError> {
    use OpCode::*;
    let arg_count = match op {
        LSpec1 | LSpec1Direct | LSpec1DirectB => 1,
        LSpec2 | LSpec2Direct | LSpec2DirectB => 2,
        LSpec3 | LSpec3Direct | LSpec3DirectB => 3,
        LSpec4 | LSpec4Direct | LSpec4DirectB => 4,
        LSpec5 | LSpec5Direct | LSpec5DirectB | LSpec5Result => 5,
        _ => unreachable!(),
    };
    let direct = matches!(
        op,
        LSpec1Direct | LSpec2Direct | LSpec3Direct | LSpec4Direct | LSpec5Direct
            | LSpec1DirectB | LSpec2DirectB | LSpec3DirectB | LSpec4DirectB | LSpec5DirectB
    );
    let byte_args = matches!(
        op,
        LSpec1DirectB | LSpec2DirectB | LSpec3DirectB | LSpec4DirectB | LSpec5DirectB
    );

    let id = t.read_special_id()?;

    let mut args = Vec::with_capacity(arg_count);
    if direct {
        for _ in 0..arg_count {
            let v = if byte_args { t.read_u8()? as i32 } else { t.read_i32()? };
            args.push(v);
        }
    } else {
        for _ in 0..arg_count {
            args.push(t.pop()?);
        }
        args.reverse();
    }

    const ACS_EXECUTE: i32 = 80;
    if id == ACS_EXECUTE {
        if let Some(&number) = args.first() {
            if let Some(pos) = t.vm.suspended.iter().position(|&s| t.vm.instance(s).script_number == number) {
                let instance_id = t.vm.suspended.remove(pos);
                let module_index = t.vm.instance(instance_id).module_index;
                t.vm.instance_mut(instance_id).state = InstanceState::Running;
                t.vm.enqueue_ready(module_index, instance_id);
            }
        }
    } else {
        diagnostics::emit(
            Level::Debug,
            &format!("line special {} {:?} (unimplemented)", id, args),
        );
    }

    if op == LSpec5Result {
        t.push(0);
    }
    Ok(())
}

fn call_function(t: &mut Turn, func_index: usize, discard: bool) -> Result<(), VmError> {
    let caller_module = t.current_module();
    let entries = &t.vm.modules[caller_module].func_table.linked_entries;
    let linked = entries.get(func_index).copied().ok_or(VmError::InvalidFunctionIndex {
        index: func_index as i32,
    })?;
    let (func_module, func_slot) = match linked {
        crate::module::LinkedFunction::Local(i) => (caller_module, i),
        crate::module::LinkedFunction::Imported { module, function } => (module, function),
    };
    let function = t
        .vm
        .modules[func_module]
        .func_table
        .entries
        .get(func_slot)
        .ok_or(VmError::InvalidFunctionIndex { index: func_index as i32 })?
        .clone();

    let num_params = function.num_params.max(0) as usize;
    let locals_base = t.stack.len().saturating_sub(num_params);
    let mut locals = vec![0i32; function.local_size.max(0) as usize];
    for i in 0..num_params.min(locals.len()) {
        locals[i] = t.stack[locals_base + i];
    }
    t.stack.truncate(locals_base);

    let frame = CallFrame {
        function_module: func_module,
        function_index: func_slot,
        return_module: caller_module,
        return_ip: t.ip,
        locals_base,
        locals,
        arrays: vec![0i32; function.arrays.total_size.max(0) as usize],
        arrays_table: function.arrays.clone(),
        discard_return_value: discard,
    };
    t.vm.call_stack.push(frame);
    t.ip = function.start;
    Ok(())
}

fn return_from_function(t: &mut Turn, has_value: bool) -> Result<(), VmError> {
    let frame = t.vm.call_stack.pop().ok_or(VmError::ReturnFromEmptyCallStack)?;
    let return_value = if has_value { Some(t.pop()?) } else { None };
    t.stack.truncate(frame.locals_base);
    if let (Some(value), false) = (return_value, frame.discard_return_value) {
        t.push(value);
    }
    t.ip = frame.return_ip;
    Ok(())
}

/// Extension-function dispatch. Ids 20000/20001 are the debug dump helpers; everything else is
/// traced by id via the symbolic-name table and its arguments are discarded.
fn call_func(t: &mut Turn, func_id: i32, num_args: usize) -> Result<(), VmError> {
    match func_id {
        20000 => {
            let number = t.pop()?;
            let module = t.current_module();
            if let Some(script) = t.vm.modules[module].find_script(number) {
                diagnostics::emit(
                    Level::Debug,
                    &format!(
                        "script {}: type={:?} flags={:?} arrays={}",
                        number, script.script_type, script.flags, script.arrays.entries.len()
                    ),
                );
                t.push(1);
            } else {
                t.push(0);
            }
        }
        20001 => {
            let instance = t.vm.instance(t.instance_id);
            diagnostics::emit(
                Level::Debug,
                &format!("script {} locals: {:?}", instance.script_number, instance.vars),
            );
            t.push(1);
        }
        _ => {
            let name = crate::builtin::extension_function_name(func_id);
            diagnostics::emit(Level::Debug, &format!("callfunc {} ({})", func_id, name));
            for _ in 0..num_args {
                t.pop().ok();
            }
            t.push(0);
        }
    }
    Ok(())
}

/// Generic host-builtin dispatch for the large tail of game-interaction opcodes: trace, consume
/// the declared argument count (inline for DIRECT forms, popped otherwise), push 0 if the
/// descriptor says the builtin returns a value.
fn dispatch_builtin(t: &mut Turn, op: OpCode) -> Result<(), VmError> {
    let desc = crate::builtin::descriptor(op);
    let mut args = Vec::with_capacity(desc.arg_count);
    if desc.direct {
        for _ in 0..desc.arg_count {
            args.push(t.read_i32()?);
        }
    } else {
        for _ in 0..desc.arg_count {
            args.push(t.pop()?);
        }
    }
    diagnostics::emit(Level::Debug, &format!("{} {:?} (unimplemented)", desc.name, args));
    if desc.returns_value {
        t.push(0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use crate::loader::load_module;
    use crate::script_builder::{CodeBuilder, ObjectBuilder};
    use std::time::Duration;

    #[test]
    fn acs_execute_reenqueues_a_suspended_instance() {
        let suspend_body = CodeBuilder::new().op(OpCode::Suspend).build();
        let object = ObjectBuilder::new().script(10, 0, suspend_body).build();
        let module = load_module("".into(), object, 0).unwrap();
        let start = module.find_script(10).unwrap().start;
        let mut vm = Vm::new(vec![module], Duration::from_millis(0), false);

        let instance = Instance::new(0, 10, 20, 0, start);
        let id = vm.alloc_instance(instance);
        let outcome = run_turn(&mut vm, 0, id).unwrap();
        assert_eq!(outcome, TurnOutcome::Suspended);
        vm.suspended.push(id);

        let special_body = CodeBuilder::new().lspec1_direct_byte(80, 10).op(OpCode::Terminate).build();
        let caller_object = ObjectBuilder::new().script(1, 1, special_body).build();
        let caller_module = load_module("CALLER".into(), caller_object, 1).unwrap();
        let caller_start = caller_module.find_script(1).unwrap().start;
        vm.modules.push(caller_module);
        vm.ready_queues.push(Vec::new());

        let caller = Instance::new(1, 1, 20, 0, caller_start);
        let caller_id = vm.alloc_instance(caller);
        run_turn(&mut vm, 1, caller_id).unwrap();

        assert!(vm.suspended.is_empty());
        assert_eq!(vm.instance(id).state, InstanceState::Running);
        assert!(vm.ready_queues[0].contains(&id));
    }

    #[test]
    fn push_number_then_drop_is_net_zero_on_the_stack() {
        // If Drop left anything behind, this second Drop would succeed instead of underflowing.
        let body = CodeBuilder::new()
            .push_number(77)
            .op(OpCode::Drop)
            .op(OpCode::Drop)
            .build();
        let object = ObjectBuilder::new().script(1, 1, body).build();
        let module = load_module("".into(), object, 0).unwrap();
        let start = module.find_script(1).unwrap().start;
        let mut vm = Vm::new(vec![module], Duration::from_millis(0), false);

        let instance = Instance::new(0, 1, 20, 0, start);
        let id = vm.alloc_instance(instance);
        let err = run_turn(&mut vm, 0, id).unwrap_err();
        assert!(matches!(err, VmError::StackUnderflow));
    }

    #[test]
    fn dup_then_eq_is_always_true() {
        let body = CodeBuilder::new()
            .push_number(42)
            .op(OpCode::Dup)
            .op(OpCode::EQ)
            .op(OpCode::BeginPrint)
            .op(OpCode::PrintNumber)
            .op(OpCode::EndPrint)
            .op(OpCode::Terminate)
            .build();
        let object = ObjectBuilder::new().script(1, 1, body).build();
        let module = load_module("".into(), object, 0).unwrap();
        let start = module.find_script(1).unwrap().start;
        let mut vm = Vm::new(vec![module], Duration::from_millis(0), false);

        let instance = Instance::new(0, 1, 20, 0, start);
        let id = vm.alloc_instance(instance);
        let outcome = run_turn(&mut vm, 0, id).unwrap();
        assert_eq!(outcome, TurnOutcome::Terminated);
    }

    #[test]
    fn suspending_inside_a_call_unwinds_the_call_stack() {
        // Function 0 suspends instead of returning; the CALL that invoked it must not leave its
        // frame behind on the VM-global call stack once the turn ends.
        let func_body = CodeBuilder::new().op(OpCode::Suspend).build();
        let script_body = CodeBuilder::new().call(0).op(OpCode::Terminate).build();
        let object = ObjectBuilder::new()
            .func(0, 0, func_body)
            .script(1, 1, script_body)
            .build();
        let module = load_module("".into(), object, 0).unwrap();
        let start = module.find_script(1).unwrap().start;
        let mut vm = Vm::new(vec![module], Duration::from_millis(0), false);

        let instance = Instance::new(0, 1, 20, 0, start);
        let id = vm.alloc_instance(instance);
        let outcome = run_turn(&mut vm, 0, id).unwrap();
        assert_eq!(outcome, TurnOutcome::Suspended);
        assert!(vm.call_stack.is_empty());
    }
}
