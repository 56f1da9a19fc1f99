//! Linker: resolves each module's imports, imported variables, and imported functions against
//! the set of already-loaded modules, in that order — matching the reference's `link_modules`.

use crate::error::LinkError;
use crate::module::{LinkedFunction, Module};

/// Links every module in `modules` in place. Must run once, after all modules are loaded.
pub fn link_modules(modules: &mut [Module]) -> Result<(), LinkError> {
    for i in 0..modules.len() {
        resolve_imports(modules, i)?;
    }
    for i in 0..modules.len() {
        resolve_vars(modules, i)?;
    }
    for i in 0..modules.len() {
        resolve_funcs(modules, i)?;
    }
    Ok(())
}

fn find_module_by_name(modules: &[Module], name: &str) -> Option<usize> {
    modules.iter().position(|m| m.name == name)
}

fn resolve_imports(modules: &mut [Module], index: usize) -> Result<(), LinkError> {
    let names: Vec<String> = modules[index]
        .imports
        .iter()
        .map(|i| i.module_name.clone())
        .collect();
    let mut resolved = Vec::with_capacity(names.len());
    for name in &names {
        let found = find_module_by_name(modules, name).ok_or_else(|| LinkError::UnknownModule {
            importer: modules[index].name.clone(),
            imported: name.clone(),
        })?;
        resolved.push(found);
    }
    for (import, found) in modules[index].imports.iter_mut().zip(resolved) {
        import.resolved_module = Some(found);
    }
    Ok(())
}

fn resolve_vars(modules: &mut [Module], index: usize) -> Result<(), LinkError> {
    let imported_modules: Vec<usize> = modules[index]
        .imports
        .iter()
        .filter_map(|i| i.resolved_module)
        .collect();

    let mut updates = Vec::new();
    for slot in 0..modules[index].vars.len() {
        if !modules[index].vars[slot].imported {
            continue;
        }
        let name = modules[index].vars[slot].name.clone().unwrap_or_default();
        let mut found = None;
        for &exporter_idx in &imported_modules {
            if let Some(exporter_slot) = modules[exporter_idx].find_var_by_name(&name) {
                found = Some((exporter_idx, exporter_slot));
                break;
            }
        }
        let (exporter_idx, exporter_slot) =
            found.ok_or_else(|| LinkError::VariableNotFound { name: name.clone() })?;
        updates.push((slot, exporter_idx, exporter_slot));
    }
    for (slot, exporter_idx, exporter_slot) in updates {
        modules[index].map_var_indirection[slot] = (exporter_idx, exporter_slot);
    }
    Ok(())
}

fn resolve_funcs(modules: &mut [Module], index: usize) -> Result<(), LinkError> {
    let imported_modules: Vec<usize> = modules[index]
        .imports
        .iter()
        .filter_map(|i| i.resolved_module)
        .collect();

    let entry_count = modules[index].func_table.entries.len();
    let mut linked = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let entry = &modules[index].func_table.entries[i];
        if !entry.imported {
            linked.push(LinkedFunction::Local(i));
            continue;
        }
        let name = entry.name.clone().unwrap_or_default();
        let mut found = None;
        for &exporter_idx in &imported_modules {
            if let Some(exporter_fn) = modules[exporter_idx].find_func_by_name(&name) {
                found = Some((exporter_idx, exporter_fn));
                break;
            }
        }
        let (exporter_idx, exporter_fn) =
            found.ok_or_else(|| LinkError::FunctionNotFound { name: name.clone() })?;
        linked.push(LinkedFunction::Imported {
            module: exporter_idx,
            function: exporter_fn,
        });
    }
    modules[index].func_table.linked_entries = linked;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_module;

    fn object_header(chunk_offset: u32) -> Vec<u8> {
        let mut data = b"ACSE".to_vec();
        data.extend_from_slice(&chunk_offset.to_le_bytes());
        data
    }

    fn mexp_module(var_name: &str, value: i32) -> Vec<u8> {
        let mut data = object_header(8);
        let mini_start = data.len();
        data.extend_from_slice(b"MINI");
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(&value.to_le_bytes());

        let mexp_start = data.len();
        let name_offset_in_chunk = 8usize; // [count:4][offset:4] then name bytes
        let mut mexp_payload = Vec::new();
        mexp_payload.extend_from_slice(&1i32.to_le_bytes());
        mexp_payload.extend_from_slice(&(name_offset_in_chunk as u32).to_le_bytes());
        mexp_payload.extend_from_slice(var_name.as_bytes());
        mexp_payload.push(0);
        data.extend_from_slice(b"MEXP");
        data.extend_from_slice(&(mexp_payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&mexp_payload);

        let _ = (mini_start, mexp_start);
        // fix header chunk_offset to point at MINI start (8)
        data
    }

    fn mimp_module(var_name: &str) -> Vec<u8> {
        let mut data = object_header(8);
        let mut payload = Vec::new();
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(var_name.as_bytes());
        payload.push(0);
        data.extend_from_slice(b"MIMP");
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&payload);

        let mut load_payload = Vec::new();
        load_payload.extend_from_slice(b"LIB\0");
        data.extend_from_slice(b"LOAD");
        data.extend_from_slice(&(load_payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&load_payload);
        data
    }

    #[test]
    fn imported_var_aliases_exporter_storage() {
        let lib_data = mexp_module("X", 13);
        let main_data = mimp_module("X");

        let mut modules = vec![
            load_module("LIB".into(), lib_data, 0).unwrap(),
            load_module("MAIN".into(), main_data, 1).unwrap(),
        ];
        link_modules(&mut modules).unwrap();

        let (exp_mod, exp_slot) = modules[1].map_var_indirection[0];
        assert_eq!(exp_mod, 0);
        assert_eq!(modules[0].vars[exp_slot].value, 13);
    }
}
