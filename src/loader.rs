//! Module Loader: walks a chunk directory in two passes and populates a [`Module`].
//!
//! Pass 1 builds the chunk-independent tables (scripts, strings, array shapes, function stubs,
//! imports); pass 2 fills in everything that references those tables by index (initializers,
//! local-array sizes, flags, names).

use crate::chunk::{Chunk, ChunkIter, ChunkType};
use crate::error::LoadError;
use crate::module::{
    Function, Import, LinkedFunction, LocalArrayTable, MapVar, Module, Script, ScriptFlags,
    ScriptType, DEFAULT_SCRIPT_VARS,
};
use crate::object::Object;

/// The XOR keystream constant used to decode `STRE` chunk strings.
const STRE_KEY: i32 = 157135;

pub fn load_module(name: String, data: Vec<u8>, self_index: usize) -> Result<Module, LoadError> {
    let object = Object::parse(data)?;
    match object.format {
        crate::object::Format::Unknown => return Err(LoadError::UnknownFormat),
        _ => {}
    }

    let mut module = Module::new(name, object, self_index);

    let chunks: Vec<Chunk> = ChunkIter::new(
        &module.object.data,
        module.object.chunk_offset,
        module.object.chunk_end,
    )
    .collect();

    // Pass 1: independent chunks.
    for chunk in &chunks {
        match chunk.chunk_type {
            ChunkType::Sptr => load_sptr(&mut module, chunk)?,
            ChunkType::Strl | ChunkType::Stre => load_strl(&mut module, chunk)?,
            ChunkType::Aray => load_aray(&mut module, chunk)?,
            ChunkType::Func => load_func(&mut module, chunk)?,
            ChunkType::Load => load_load(&mut module, chunk)?,
            _ => {}
        }
    }

    // Pass 2: chunks that reference scripts/functions/vars created above.
    for chunk in &chunks {
        match chunk.chunk_type {
            ChunkType::Mini => load_mini(&mut module, chunk)?,
            ChunkType::Aini => load_aini(&mut module, chunk)?,
            ChunkType::Sary => load_sary_fary(&mut module, chunk, true)?,
            ChunkType::Fary => load_sary_fary(&mut module, chunk, false)?,
            ChunkType::Sflg => load_sflg(&mut module, chunk)?,
            ChunkType::Svct => load_svct(&mut module, chunk)?,
            ChunkType::Snam => load_snam(&mut module, chunk)?,
            ChunkType::Mexp => load_mexp(&mut module, chunk)?,
            ChunkType::Mimp => load_mimp(&mut module, chunk)?,
            ChunkType::Aimp => load_aimp(&mut module, chunk)?,
            ChunkType::Fnam => load_fnam(&mut module, chunk)?,
            _ => {}
        }
    }

    Ok(module)
}

fn payload<'a>(module: &'a Module, chunk: &Chunk) -> Result<&'a [u8], LoadError> {
    let range = chunk.payload_range(module.object.data.len())?;
    Ok(&module.object.data[range])
}

fn read_nul_terminated<'a>(
    data: &'a [u8],
    at: usize,
    limit: usize,
    chunk_name: &'static str,
) -> Result<&'a str, LoadError> {
    let bytes = crate::object::Cursor::read_nul_terminated_at(data, at, limit)
        .ok_or(LoadError::UnterminatedString {
            chunk: chunk_name,
            offset: at,
        })?;
    Ok(std::str::from_utf8(bytes).unwrap_or(""))
}

fn load_sptr(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    const RECORD_SIZE: usize = 8; // i16 number, u8 type, u8 num_param, i32 offset
    if chunk.size % RECORD_SIZE != 0 {
        return Err(LoadError::MisalignedChunk {
            size: chunk.size,
            record_size: RECORD_SIZE,
        });
    }
    let data = payload(module, chunk)?.to_vec();
    for rec in data.chunks_exact(RECORD_SIZE) {
        let number = i16::from_le_bytes([rec[0], rec[1]]) as i32;
        let type_code = rec[2];
        let _num_param = rec[3];
        let offset = i32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]) as usize;
        module.scripts.push(Script {
            name: None,
            number,
            script_type: ScriptType::from_code(type_code),
            flags: ScriptFlags::empty(),
            start: offset,
            arrays: LocalArrayTable::default(),
            num_vars: DEFAULT_SCRIPT_VARS,
        });
    }
    Ok(())
}

fn load_strl(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    let data = payload(module, chunk)?;
    if data.len() < 12 {
        return Ok(());
    }
    let count = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let is_stre = chunk.chunk_type == ChunkType::Stre;
    for k in 0..count {
        let off_pos = 12 + k * 4;
        if off_pos + 4 > data.len() {
            break;
        }
        let offset = u32::from_le_bytes([
            data[off_pos],
            data[off_pos + 1],
            data[off_pos + 2],
            data[off_pos + 3],
        ]) as usize;
        let string = decode_string_at(data, offset, is_stre)?;
        module.strings.push(string);
    }
    Ok(())
}

fn decode_string_at(data: &[u8], offset: usize, is_stre: bool) -> Result<String, LoadError> {
    let mut out = Vec::new();
    let mut pos = offset;
    let mut i: i32 = 0;
    loop {
        if pos >= data.len() {
            return Err(LoadError::UnterminatedString {
                chunk: "STRL/STRE",
                offset,
            });
        }
        let raw = data[pos];
        let decoded = if is_stre {
            (raw as i32 ^ (offset as i32).wrapping_mul(STRE_KEY).wrapping_add(i / 2)) as u8
        } else {
            raw
        };
        if decoded == 0 {
            break;
        }
        out.push(decoded);
        pos += 1;
        i += 1;
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn load_aray(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    const RECORD_SIZE: usize = 8;
    if chunk.size % RECORD_SIZE != 0 {
        return Err(LoadError::MisalignedChunk {
            size: chunk.size,
            record_size: RECORD_SIZE,
        });
    }
    let data = payload(module, chunk)?.to_vec();
    for rec in data.chunks_exact(RECORD_SIZE) {
        let index = i32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]) as usize;
        let size = i32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]) as usize;
        if let Some(var) = module.vars.get_mut(index) {
            var.is_array = true;
            var.elements = vec![0; size];
        }
    }
    Ok(())
}

fn load_func(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    const RECORD_SIZE: usize = 8; // u8 num_param, u8 size, u8 has_return, u8 pad, i32 offset
    if chunk.size % RECORD_SIZE != 0 {
        log::warn!(
            "FUNC chunk size {} is not a multiple of {}",
            chunk.size,
            RECORD_SIZE
        );
    }
    let data = payload(module, chunk)?.to_vec();
    for rec in data.chunks(RECORD_SIZE) {
        if rec.len() < RECORD_SIZE {
            break;
        }
        let num_param = rec[0] as i32;
        let size = rec[1] as i32;
        let offset = i32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]) as usize;
        module.func_table.entries.push(Function {
            name: None,
            num_params: num_param,
            local_size: size,
            start: offset,
            arrays: LocalArrayTable::default(),
            imported: offset == 0,
        });
    }
    module.func_table.linked_entries = (0..module.func_table.entries.len())
        .map(LinkedFunction::Local)
        .collect();
    Ok(())
}

fn load_load(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    let data = payload(module, chunk)?;
    let mut pos = 0usize;
    while pos < data.len() {
        let end = data[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(LoadError::UnterminatedLibraryName {
                offset: chunk.offset + 8 + pos,
            })?;
        if end > 0 {
            let name = String::from_utf8_lossy(&data[pos..pos + end]).into_owned();
            module.imports.push(Import {
                module_name: name,
                resolved_module: None,
            });
        }
        pos += end + 1;
    }
    Ok(())
}

fn load_mini(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    let data = payload(module, chunk)?;
    if data.len() < 4 {
        return Ok(());
    }
    let first_var = i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    for (k, word) in data[4..].chunks_exact(4).enumerate() {
        let value = i32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        if let Some(var) = module.vars.get_mut(first_var + k) {
            var.value = value;
        }
    }
    Ok(())
}

fn load_aini(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    let data = payload(module, chunk)?;
    if data.len() < 4 {
        return Ok(());
    }
    let index = i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if let Some(var) = module.vars.get_mut(index) {
        for (k, word) in data[4..].chunks_exact(4).enumerate() {
            if k >= var.elements.len() {
                break;
            }
            var.elements[k] = i32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        }
    }
    Ok(())
}

fn load_sary_fary(module: &mut Module, chunk: &Chunk, is_script: bool) -> Result<(), LoadError> {
    let data = payload(module, chunk)?.to_vec();
    if data.len() < 2 {
        return Ok(());
    }
    let index = i16::from_le_bytes([data[0], data[1]]) as i32;
    let sizes: Vec<i32> = data[2..]
        .chunks_exact(4)
        .map(|w| i32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect();
    let table = LocalArrayTable::from_sizes(&sizes);
    if is_script {
        if let Some(script) = module.find_script_mut(index) {
            script.arrays = table;
        }
    } else if let Some(func) = module.func_table.entries.get_mut(index as usize) {
        func.arrays = table;
    }
    Ok(())
}

fn load_sflg(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    const RECORD_SIZE: usize = 4;
    let data = payload(module, chunk)?.to_vec();
    for rec in data.chunks_exact(RECORD_SIZE) {
        let number = i16::from_le_bytes([rec[0], rec[1]]) as i32;
        let flags_raw = u16::from_le_bytes([rec[2], rec[3]]);
        let recognized = ScriptFlags::from_bits_truncate(flags_raw);
        if recognized.bits() != flags_raw {
            log::warn!(
                "script {} has unrecognized flag bits {:#06x}",
                number,
                flags_raw & !recognized.bits()
            );
        }
        if let Some(script) = module.find_script_mut(number) {
            script.flags = recognized;
        }
    }
    Ok(())
}

fn load_svct(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    const RECORD_SIZE: usize = 4;
    let data = payload(module, chunk)?.to_vec();
    for rec in data.chunks_exact(RECORD_SIZE) {
        let number = i16::from_le_bytes([rec[0], rec[1]]) as i32;
        let size = i16::from_le_bytes([rec[2], rec[3]]) as i32;
        if let Some(script) = module.find_script_mut(number) {
            script.num_vars = size;
        }
    }
    Ok(())
}

fn load_snam(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    let data = payload(module, chunk)?.to_vec();
    if data.len() < 4 {
        return Ok(());
    }
    let count = i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    for k in 0..count {
        let off_pos = 4 + k * 4;
        if off_pos + 4 > data.len() {
            break;
        }
        let offset = u32::from_le_bytes([
            data[off_pos],
            data[off_pos + 1],
            data[off_pos + 2],
            data[off_pos + 3],
        ]) as usize;
        let name = read_nul_terminated(&data, offset, data.len(), "SNAM")?;
        let number = -1 - k as i32;
        if let Some(script) = module.find_script_mut(number) {
            script.name = Some(name.to_string());
        }
    }
    Ok(())
}

fn load_mexp(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    let data = payload(module, chunk)?.to_vec();
    if data.len() < 4 {
        return Ok(());
    }
    let count = i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    for k in 0..count {
        let off_pos = 4 + k * 4;
        if off_pos + 4 > data.len() {
            break;
        }
        let offset = u32::from_le_bytes([
            data[off_pos],
            data[off_pos + 1],
            data[off_pos + 2],
            data[off_pos + 3],
        ]) as usize;
        let name = read_nul_terminated(&data, offset, data.len(), "MEXP")?;
        if let Some(var) = module.vars.get_mut(k) {
            var.name = Some(name.to_string());
        }
    }
    Ok(())
}

fn load_mimp(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    let data = payload(module, chunk)?.to_vec();
    let mut pos = 0usize;
    while pos + 4 <= data.len() {
        let index =
            i32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;
        let end = match data[pos..].iter().position(|&b| b == 0) {
            Some(e) => e,
            None => return Ok(()), // tolerant truncation, as the reference does
        };
        let name = String::from_utf8_lossy(&data[pos..pos + end]).into_owned();
        pos += end + 1;
        if let Some(var) = module.vars.get_mut(index) {
            var.name = Some(name);
            var.imported = true;
        }
    }
    Ok(())
}

fn load_aimp(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    let data = payload(module, chunk)?.to_vec();
    if data.len() < 4 {
        return Ok(());
    }
    let count = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let mut pos = 4usize;
    for _ in 0..count {
        if pos + 8 > data.len() {
            break;
        }
        let index =
            u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let _size = u32::from_le_bytes([
            data[pos + 4],
            data[pos + 5],
            data[pos + 6],
            data[pos + 7],
        ]);
        pos += 8;
        let end = match data[pos..].iter().position(|&b| b == 0) {
            Some(e) => e,
            None => return Ok(()),
        };
        let name = String::from_utf8_lossy(&data[pos..pos + end]).into_owned();
        pos += end + 1;
        if let Some(var) = module.vars.get_mut(index) {
            var.name = Some(name);
            var.imported = true;
            var.is_array = true;
        }
    }
    Ok(())
}

fn load_fnam(module: &mut Module, chunk: &Chunk) -> Result<(), LoadError> {
    let data = payload(module, chunk)?.to_vec();
    if data.len() < 4 {
        return Ok(());
    }
    let count = i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    for k in 0..count {
        let off_pos = 4 + k * 4;
        if off_pos + 4 > data.len() {
            break;
        }
        let offset = u32::from_le_bytes([
            data[off_pos],
            data[off_pos + 1],
            data[off_pos + 2],
            data[off_pos + 3],
        ]) as usize;
        let name = match crate::object::Cursor::read_nul_terminated_at(&data, offset, data.len())
        {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => {
                log::warn!("FNAM name at offset {} is not NUL-terminated", offset);
                continue;
            }
        };
        if let Some(func) = module.func_table.entries.get_mut(k) {
            func.name = Some(name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_header(chunk_offset: u32) -> Vec<u8> {
        let mut data = b"ACSE".to_vec();
        data.extend_from_slice(&chunk_offset.to_le_bytes());
        data
    }

    #[test]
    fn loads_single_open_script() {
        let mut data = object_header(8);
        data.extend_from_slice(b"SPTR");
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&1i16.to_le_bytes()); // number
        data.push(1); // type = open
        data.push(0); // num_param
        data.extend_from_slice(&100i32.to_le_bytes()); // offset

        let module = load_module("".into(), data, 0).unwrap();
        assert_eq!(module.scripts.len(), 1);
        assert_eq!(module.scripts[0].script_type, ScriptType::Open);
        assert_eq!(module.scripts[0].start, 100);
    }

    #[test]
    fn empty_load_chunk_adds_no_imports() {
        let mut data = object_header(8);
        data.extend_from_slice(b"LOAD");
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[0, 0]);
        let module = load_module("".into(), data, 0).unwrap();
        assert!(module.imports.is_empty());
    }

    #[test]
    fn stre_decode_is_self_inverse_with_encode() {
        let offset = 4usize;
        let plain = b"hi\0";
        let mut encoded = vec![0u8; offset];
        for (i, &b) in plain.iter().enumerate() {
            let k = (offset as i32).wrapping_mul(STRE_KEY).wrapping_add(i as i32 / 2);
            encoded.push((b as i32 ^ k) as u8);
        }
        let decoded = decode_string_at(&encoded, offset, true).unwrap();
        assert_eq!(decoded, "hi");
    }
}
