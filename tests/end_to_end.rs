//! End-to-end scenarios run against the public crate API.

use acsvm::op_code::OpCode;
use acsvm::script_builder::{CodeBuilder, ObjectBuilder};
use std::time::Duration;

fn zero_tics() -> Duration {
    Duration::from_millis(0)
}

#[test]
fn hello_world_open_script() {
    let body = CodeBuilder::new()
        .op(OpCode::BeginPrint)
        .push_number(5)
        .op(OpCode::PrintNumber)
        .op(OpCode::EndPrint)
        .op(OpCode::Terminate)
        .build();
    let object = ObjectBuilder::new().script(1, 1, body).build();

    let mut vm = acsvm::build_vm(vec![(String::new(), object)], zero_tics(), true).unwrap();
    acsvm::run(&mut vm).unwrap();
    assert_eq!(vm.tics, 0);
}

#[test]
fn delay_then_resume() {
    let body = CodeBuilder::new()
        .delay_direct_byte(1)
        .push_number(42)
        .op(OpCode::PrintNumber)
        .op(OpCode::EndPrint)
        .op(OpCode::Terminate)
        .build();
    let object = ObjectBuilder::new().script(1, 1, body).build();

    let mut vm = acsvm::build_vm(vec![(String::new(), object)], zero_tics(), false).unwrap();
    acsvm::run(&mut vm).unwrap();
    assert_eq!(vm.active_scripts, 0);
    assert!(vm.tics >= 1);
}

#[test]
fn divide_by_zero_is_fatal() {
    let body = CodeBuilder::new()
        .push_number(1)
        .push_number(0)
        .op(OpCode::Divide)
        .build();
    let object = ObjectBuilder::new().script(1, 1, body).build();

    let mut vm = acsvm::build_vm(vec![(String::new(), object)], zero_tics(), false).unwrap();
    let result = acsvm::run(&mut vm);
    assert!(result.is_err());
    let message = result.unwrap_err().to_string();
    assert!(message.contains("division by zero"));
}

#[test]
fn world_array_autogrows_and_reads_back() {
    let body = CodeBuilder::new()
        .push_number(99) // value
        .push_number(5000) // index
        .op(OpCode::AssignWorldArray)
        .u8(0) // slot
        .op(OpCode::BeginPrint)
        .push_number(5000)
        .op(OpCode::PushWorldArray)
        .u8(0)
        .op(OpCode::PrintNumber)
        .op(OpCode::EndPrint)
        .op(OpCode::Terminate)
        .build();
    let object = ObjectBuilder::new().script(1, 1, body).build();

    let mut vm = acsvm::build_vm(vec![(String::new(), object)], zero_tics(), false).unwrap();
    acsvm::run(&mut vm).unwrap();
    assert!(vm.world_arrays[0].len() >= 6001);
    assert_eq!(vm.world_arrays[0][5000], 99);
    assert_eq!(vm.read_world_array(0, 6000), 0);
}

#[test]
fn cross_module_import_aliases_exporter() {
    let lib_code = CodeBuilder::new().build();
    let mut lib_object = ObjectBuilder::new().script(100, 0, lib_code).build();
    // Append MINI/MEXP chunks by hand: exported var 0 = 13, named "X".
    append_lib_exports(&mut lib_object);

    let main_body = CodeBuilder::new()
        .op(OpCode::BeginPrint)
        .op(OpCode::PushMapVar)
        .u8(0)
        .op(OpCode::PrintNumber)
        .op(OpCode::EndPrint)
        .op(OpCode::Terminate)
        .build();
    let mut main_object = ObjectBuilder::new().script(1, 1, main_body).build();
    append_main_import(&mut main_object);

    let mut vm = acsvm::build_vm(
        vec![
            ("LIB".to_string(), lib_object),
            (String::new(), main_object),
        ],
        zero_tics(),
        false,
    )
    .unwrap();
    acsvm::run(&mut vm).unwrap();
    assert_eq!(vm.modules[0].vars[0].value, 13);
}

fn append_lib_exports(data: &mut Vec<u8>) {
    // Patch directory offset to just past the pre-existing SPTR chunk boundary is unnecessary —
    // ChunkIter reads chunks back-to-back from chunk_offset to EOF, so it is enough to append.
    let mut mini_payload = Vec::new();
    mini_payload.extend_from_slice(&0i32.to_le_bytes());
    mini_payload.extend_from_slice(&13i32.to_le_bytes());
    data.extend_from_slice(b"MINI");
    data.extend_from_slice(&(mini_payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&mini_payload);

    let name = b"X\0";
    let mut mexp_payload = Vec::new();
    mexp_payload.extend_from_slice(&1i32.to_le_bytes());
    mexp_payload.extend_from_slice(&8u32.to_le_bytes());
    mexp_payload.extend_from_slice(name);
    data.extend_from_slice(b"MEXP");
    data.extend_from_slice(&(mexp_payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&mexp_payload);
}

fn append_main_import(data: &mut Vec<u8>) {
    let mut mimp_payload = Vec::new();
    mimp_payload.extend_from_slice(&0i32.to_le_bytes());
    mimp_payload.extend_from_slice(b"X\0");
    data.extend_from_slice(b"MIMP");
    data.extend_from_slice(&(mimp_payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&mimp_payload);

    let mut load_payload = Vec::new();
    load_payload.extend_from_slice(b"LIB\0");
    data.extend_from_slice(b"LOAD");
    data.extend_from_slice(&(load_payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&load_payload);
}
