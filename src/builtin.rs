//! Static descriptor tables for the host-interaction opcodes the interpreter cannot actually
//! execute (there is no game world to act on) and for `CALLFUNC` extension-function ids. Every
//! entry here is trace-and-stub: arguments are consumed, a placeholder value is pushed if the
//! real builtin would return one.

use crate::op_code::OpCode;

pub struct BuiltinDescriptor {
    pub name: &'static str,
    pub arg_count: usize,
    pub direct: bool,
    pub returns_value: bool,
}

/// Looks up (or synthesizes) a descriptor for any opcode that reaches the generic builtin path.
/// DIRECT variants are translated to their indirect counterpart's name before lookup, per the
/// original source's convention of sharing one descriptor between direct/indirect forms.
pub fn descriptor(op: OpCode) -> BuiltinDescriptor {
    use OpCode::*;
    let (name, arg_count, returns_value): (&'static str, usize, bool) = match op {
        ThingCount => ("ThingCount", 2, true),
        ThingCountDirect => ("ThingCount", 2, true),
        TagWait => ("TagWait", 1, false),
        TagWaitDirect => ("TagWait", 1, false),
        PolyWait => ("PolyWait", 1, false),
        PolyWaitDirect => ("PolyWait", 1, false),
        ChangeFloor => ("ChangeFloor", 2, false),
        ChangeFloorDirect => ("ChangeFloor", 2, false),
        ChangeCeiling => ("ChangeCeiling", 2, false),
        ChangeCeilingDirect => ("ChangeCeiling", 2, false),
        Random => ("Random", 2, true),
        RandomDirect | RandomDirectB => ("Random", 2, true),
        PlayerCount => ("PlayerCount", 0, true),
        GameType => ("GameType", 0, true),
        GameSkill => ("GameSkill", 0, true),
        Timer => ("Timer", 0, true),
        Sigil => ("Sigil", 0, true),
        ActivatorHealth => ("ActivatorHealth", 0, true),
        ActivatorArmor => ("ActivatorArmor", 0, true),
        ActivatorFrags => ("ActivatorFrags", 0, true),
        ActivatorTid | ActivatorTid2 => ("ActivatorTID", 0, true),
        PlayerBlueSkull => ("PlayerBlueSkull", 0, true),
        PlayerRedSkull => ("PlayerRedSkull", 0, true),
        PlayerGoldSkull | PlayerGoldSkull2 => ("PlayerGoldSkull", 0, true),
        PlayerBlueCard => ("PlayerBlueCard", 0, true),
        PlayerRedCard => ("PlayerRedCard", 0, true),
        PlayerGoldCard => ("PlayerGoldCard", 0, true),
        PlayerBlackSkull => ("PlayerBlackSkull", 0, true),
        PlayerSilverSkull => ("PlayerSilverSkull", 0, true),
        PlayerBlackCard => ("PlayerBlackCard", 0, true),
        PlayerSilverCard => ("PlayerSilverCard", 0, true),
        IsNetworkGame => ("IsNetworkGame", 0, true),
        PlayerTeam => ("PlayerTeam", 0, true),
        PlayerRating => ("PlayerRating", 0, true),
        PlayerOnTeam => ("PlayerOnTeam", 0, true),
        PlayerNumber | PlayerNumber2 => ("PlayerNumber", 0, true),
        WriteToIni => ("WriteToIni", 3, false),
        GetFromIni => ("GetFromIni", 2, true),
        Sin => ("Sin", 1, true),
        Cos => ("Cos", 1, true),
        VectorAngle => ("VectorAngle", 2, true),
        CheckWeapon => ("CheckWeapon", 1, true),
        SetWeapon => ("SetWeapon", 1, true),
        StrLen => ("StrLen", 1, true),
        SetHudSize => ("SetHudSize", 3, false),
        GetCvar => ("GetCvar", 1, true),
        SetResultValue => ("SetResultValue", 1, false),
        GetLineRowOffset => ("GetLineRowOffset", 0, true),
        GetActorFloorZ => ("GetActorFloorZ", 1, true),
        GetActorAngle => ("GetActorAngle", 1, true),
        GetSectorFloorZ => ("GetSectorFloorZ", 2, true),
        GetSectorCeilingZ => ("GetSectorCeilingZ", 2, true),
        GetSigilPieces => ("GetSigilPieces", 0, true),
        GetLevelInfo => ("GetLevelInfo", 1, true),
        ChangeSky => ("ChangeSky", 2, false),
        PlayerInGame => ("PlayerInGame", 1, true),
        PlayerIsBot => ("PlayerIsBot", 1, true),
        SetCameraToTexture => ("SetCameraToTexture", 3, false),
        GetAmmoCapacity => ("GetAmmoCapacity", 1, true),
        SetAmmoCapacity => ("SetAmmoCapacity", 2, false),
        SpawnForced => ("SpawnForced", 6, true),
        ConsoleCommand => ("ConsoleCommand", 3, false),
        SinglePlayer => ("SinglePlayer", 0, true),
        FixedMul => ("FixedMul", 2, true),
        FixedDiv => ("FixedDiv", 2, true),
        SetGravity => ("SetGravity", 1, false),
        SetAirControl => ("SetAirControl", 1, false),
        ClearInventory => ("ClearInventory", 0, false),
        GiveInventory => ("GiveInventory", 2, false),
        GiveInventoryDirect => ("GiveInventory", 2, false),
        TakeInventory => ("TakeInventory", 2, false),
        TakeInventoryDirect => ("TakeInventory", 2, false),
        CheckInventory => ("CheckInventory", 1, true),
        CheckInventoryDirect => ("CheckInventory", 1, true),
        Spawn => ("Spawn", 6, true),
        SpawnDirect => ("Spawn", 6, true),
        SpawnSpot => ("SpawnSpot", 4, true),
        SpawnSpotDirect => ("SpawnSpot", 4, true),
        SetMusic => ("SetMusic", 3, false),
        SetMusicDirect => ("SetMusic", 3, false),
        LocalSetMusic => ("LocalSetMusic", 3, false),
        LocalSetMusicDirect => ("LocalSetMusic", 3, false),
        SetStyle => ("SetStyle", 1, false),
        SetStyleDirect => ("SetStyle", 1, false),
        SetFont => ("SetFont", 1, false),
        SetFontDirect => ("SetFont", 1, false),
        SetMarineWeapon => ("SetMarineWeapon", 2, false),
        SetMarineSprite => ("SetMarineSprite", 2, false),
        GetScreenWidth => ("GetScreenWidth", 0, true),
        GetScreenHeight => ("GetScreenHeight", 0, true),
        ThingProjectile2 => ("ThingProjectile2", 7, false),
        SetActorProperty => ("SetActorProperty", 3, false),
        GetActorProperty => ("GetActorProperty", 2, true),
        SetThingSpecial => ("SetThingSpecial", 7, false),
        _ => ("UnknownBuiltin", 0, true),
    };
    BuiltinDescriptor {
        name,
        arg_count,
        direct: is_direct(op),
        returns_value,
    }
}

fn is_direct(op: OpCode) -> bool {
    use OpCode::*;
    matches!(
        op,
        ThingCountDirect
            | RandomDirect
            | RandomDirectB
            | TagWaitDirect
            | PolyWaitDirect
            | ChangeFloorDirect
            | ChangeCeilingDirect
            | GiveInventoryDirect
            | TakeInventoryDirect
            | CheckInventoryDirect
            | SpawnDirect
            | SpawnSpotDirect
            | SetMusicDirect
            | LocalSetMusicDirect
            | SetStyleDirect
            | SetFontDirect
    )
}

/// Symbolic names for the documented `CALLFUNC` extension-function id ranges. Ids outside every
/// documented range return `"?"`.
pub fn extension_function_name(id: i32) -> &'static str {
    match id {
        1..=99 => "zdoom-ext",
        100..=125 | 200..=211 => "zandronum-ext",
        300..=301 => "eternity-ext",
        400..=401 => "gzdoom-ext",
        19620..=19621 => "zdaemon-ext",
        _ => "?",
    }
}
