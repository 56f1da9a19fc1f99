//! Test helper for hand-assembling ACS object byte buffers: a fluent builder that emits
//! object chunks and small-code bytecode directly.

use crate::op_code::OpCode;

/// Builds one script's bytecode body, byte by byte, via small-code opcodes.
#[derive(Default)]
pub struct CodeBuilder {
    bytes: Vec<u8>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: OpCode) -> Self {
        let raw = op as u16;
        if raw >= OpCode::SMALL_CODE_EXTENSION {
            self.bytes.push(OpCode::SMALL_CODE_EXTENSION as u8);
            self.bytes.push((raw - OpCode::SMALL_CODE_EXTENSION) as u8);
        } else {
            self.bytes.push(raw as u8);
        }
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.bytes.push(v);
        self
    }

    pub fn push_number(self, v: i32) -> Self {
        self.op(OpCode::PushNumber).i32(v)
    }

    pub fn delay_direct_byte(self, amount: u8) -> Self {
        self.op(OpCode::DelayDirectB).u8(amount)
    }

    pub fn lspec1_direct_byte(self, special: u8, arg0: u8) -> Self {
        self.op(OpCode::LSpec1DirectB).u8(special).u8(arg0)
    }

    pub fn call(self, func_index: u8) -> Self {
        self.op(OpCode::Call).u8(func_index)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Assembles a complete little-endian small-code `"ACSe"` object from one or more script bodies.
pub struct ObjectBuilder {
    scripts: Vec<(i32, u8, Vec<u8>)>,
    funcs: Vec<(u8, u8, Vec<u8>)>,
    strings: Vec<String>,
}

impl ObjectBuilder {
    pub fn new() -> Self {
        ObjectBuilder {
            scripts: Vec::new(),
            funcs: Vec::new(),
            strings: Vec::new(),
        }
    }

    /// Appends a script's bytecode, recording its start offset, number, and type code (1 = open).
    pub fn script(mut self, number: i32, type_code: u8, body: Vec<u8>) -> Self {
        self.scripts.push((number, type_code, body));
        self
    }

    /// Appends a function's bytecode, recording its param count and local-var frame size. The
    /// function's index is its position in the order `func` was called (matching a `FUNC` chunk's
    /// record order).
    pub fn func(mut self, num_params: u8, local_size: u8, body: Vec<u8>) -> Self {
        self.funcs.push((num_params, local_size, body));
        self
    }

    pub fn string(mut self, s: &str) -> Self {
        self.strings.push(s.to_string());
        self
    }

    /// Serializes the accumulated code and an `SPTR`/`STRL` chunk directory into a full object
    /// buffer, header-first (little-E / small-code format).
    pub fn build(self) -> Vec<u8> {
        let mut data = b"ACSe".to_vec();
        data.extend_from_slice(&0i32.to_le_bytes()); // placeholder directory offset

        let mut offset = data.len() as i32;
        let mut sptr_records = Vec::new();
        for (number, type_code, body) in &self.scripts {
            sptr_records.push((*number, *type_code, offset));
            data.extend_from_slice(body);
            offset += body.len() as i32;
        }

        let mut func_records = Vec::new();
        for (num_params, local_size, body) in &self.funcs {
            func_records.push((*num_params, *local_size, offset));
            data.extend_from_slice(body);
            offset += body.len() as i32;
        }

        let directory_offset = data.len() as u32;

        let mut sptr_payload = Vec::new();
        for (number, type_code, start) in &sptr_records {
            sptr_payload.extend_from_slice(&(*number as i16).to_le_bytes());
            sptr_payload.push(*type_code);
            sptr_payload.push(0); // num_param
            sptr_payload.extend_from_slice(&start.to_le_bytes());
        }
        data.extend_from_slice(b"SPTR");
        data.extend_from_slice(&(sptr_payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&sptr_payload);

        if !self.funcs.is_empty() {
            let mut func_payload = Vec::new();
            for (num_params, local_size, start) in &func_records {
                func_payload.push(*num_params);
                func_payload.push(*local_size);
                func_payload.push(0); // has_return, unused by the loader
                func_payload.push(0); // pad
                func_payload.extend_from_slice(&start.to_le_bytes());
            }
            data.extend_from_slice(b"FUNC");
            data.extend_from_slice(&(func_payload.len() as u32).to_le_bytes());
            data.extend_from_slice(&func_payload);
        }

        if !self.strings.is_empty() {
            let mut strl_payload = Vec::new();
            strl_payload.extend_from_slice(&0i32.to_le_bytes());
            strl_payload.extend_from_slice(&(self.strings.len() as i32).to_le_bytes());
            strl_payload.extend_from_slice(&0i32.to_le_bytes());
            let header_len = strl_payload.len() + self.strings.len() * 4;
            let mut table = Vec::new();
            let mut running = header_len as u32;
            for s in &self.strings {
                table.extend_from_slice(&running.to_le_bytes());
                running += s.len() as u32 + 1;
            }
            strl_payload.extend_from_slice(&table);
            for s in &self.strings {
                strl_payload.extend_from_slice(s.as_bytes());
                strl_payload.push(0);
            }
            data.extend_from_slice(b"STRL");
            data.extend_from_slice(&(strl_payload.len() as u32).to_le_bytes());
            data.extend_from_slice(&strl_payload);
        }

        data[4..8].copy_from_slice(&directory_offset.to_le_bytes());
        data
    }
}

impl Default for ObjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}
