//! Static, load-time data: modules, map variables, script descriptors, and function tables.
//! Nothing here is mutated once linking completes, except through the indirection tables the
//! linker fills in.

use crate::object::Object;
use bitflags::bitflags;

pub const MAX_MAP_VARS: usize = 128;

bitflags! {
    /// Recognized script flag bits; unrecognized bits are tolerated with a load warning.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScriptFlags: u16 {
        const NET = 0x1;
        const CLIENTSIDE = 0x2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    Unknown,
    Closed,
    Open,
    Respawn,
    Death,
    Enter,
    Pickup,
    BlueReturn,
    RedReturn,
    WhiteReturn,
    Lightning,
    Unloading,
    Disconnect,
    Return,
    Event,
    Kill,
    Reopen,
}

impl ScriptType {
    /// Maps a raw type byte to a known variant, defaulting to `Unknown` for unrecognized codes.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ScriptType::Closed,
            1 => ScriptType::Open,
            2 => ScriptType::Respawn,
            3 => ScriptType::Death,
            4 => ScriptType::Enter,
            5 => ScriptType::Pickup,
            6 => ScriptType::BlueReturn,
            7 => ScriptType::RedReturn,
            8 => ScriptType::WhiteReturn,
            12 => ScriptType::Lightning,
            13 => ScriptType::Unloading,
            14 => ScriptType::Disconnect,
            15 => ScriptType::Return,
            16 => ScriptType::Event,
            17 => ScriptType::Kill,
            18 => ScriptType::Reopen,
            _ => ScriptType::Unknown,
        }
    }
}

/// One entry in a local-array table: a running start offset into the owner's flat local-array
/// storage plus the array's element count.
#[derive(Debug, Clone, Copy)]
pub struct LocalArrayEntry {
    pub start: i32,
    pub size: i32,
}

#[derive(Debug, Clone, Default)]
pub struct LocalArrayTable {
    pub entries: Vec<LocalArrayEntry>,
    pub total_size: i32,
}

impl LocalArrayTable {
    /// Packs `sizes` into entries with running start offsets, as SARY/FARY chunks do.
    pub fn from_sizes(sizes: &[i32]) -> Self {
        let mut entries = Vec::with_capacity(sizes.len());
        let mut start = 0;
        for &size in sizes {
            entries.push(LocalArrayEntry { start, size });
            start += size;
        }
        LocalArrayTable {
            entries,
            total_size: start,
        }
    }
}

/// Static script descriptor: everything known about a script before it is ever run.
#[derive(Debug, Clone)]
pub struct Script {
    pub name: Option<String>,
    pub number: i32,
    pub script_type: ScriptType,
    pub flags: ScriptFlags,
    pub start: usize,
    pub arrays: LocalArrayTable,
    pub num_vars: i32,
}

pub const DEFAULT_SCRIPT_VARS: i32 = 20;

/// One map-var slot: either a plain scalar or an array descriptor.
#[derive(Debug, Clone, Default)]
pub struct MapVar {
    pub name: Option<String>,
    pub value: i32,
    pub elements: Vec<i32>,
    pub is_array: bool,
    pub imported: bool,
}

impl MapVar {
    pub fn scalar(value: i32) -> Self {
        MapVar {
            value,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Option<String>,
    pub num_params: i32,
    pub local_size: i32,
    pub start: usize,
    pub arrays: LocalArrayTable,
    pub imported: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    pub entries: Vec<Function>,
    /// Filled in by the linker: each slot points at either the local entry (by index) or, for an
    /// imported function, the `(module_index, function_index)` of the resolved exporter.
    pub linked_entries: Vec<LinkedFunction>,
}

#[derive(Debug, Clone, Copy)]
pub enum LinkedFunction {
    Local(usize),
    Imported { module: usize, function: usize },
}

/// One `LOAD` record: the library name, resolved during linking to a module index.
#[derive(Debug, Clone)]
pub struct Import {
    pub module_name: String,
    pub resolved_module: Option<usize>,
}

/// A loaded module: its object bytes, derived static tables, and — after linking — the
/// indirection table that lets imported map-var slots alias an exporter's storage.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub object: Object,
    pub imports: Vec<Import>,
    pub scripts: Vec<Script>,
    pub strings: Vec<String>,
    pub vars: Vec<MapVar>,
    /// `map_var_indirection[i] = (module_index, slot_index)` the effective storage for slot `i`;
    /// defaults to `(self, i)` and is only redirected for imported slots during linking.
    pub map_var_indirection: Vec<(usize, usize)>,
    pub func_table: FunctionTable,
    pub self_index: usize,
}

impl Module {
    pub fn new(name: String, object: Object, self_index: usize) -> Self {
        let vars = (0..MAX_MAP_VARS).map(|_| MapVar::default()).collect();
        let map_var_indirection = (0..MAX_MAP_VARS).map(|i| (self_index, i)).collect();
        Module {
            name,
            object,
            imports: Vec::new(),
            scripts: Vec::new(),
            strings: Vec::new(),
            vars,
            map_var_indirection,
            func_table: FunctionTable::default(),
            self_index,
        }
    }

    pub fn find_script(&self, number: i32) -> Option<&Script> {
        self.scripts.iter().find(|s| s.number == number)
    }

    pub fn find_script_mut(&mut self, number: i32) -> Option<&mut Script> {
        self.scripts.iter_mut().find(|s| s.number == number)
    }

    pub fn find_var_by_name(&self, name: &str) -> Option<usize> {
        self.vars
            .iter()
            .position(|v| v.name.as_deref() == Some(name))
    }

    pub fn find_func_by_name(&self, name: &str) -> Option<usize> {
        self.func_table
            .entries
            .iter()
            .position(|f| f.name.as_deref() == Some(name))
    }
}
