use std::borrow::Cow;

// UTF-16LE "PIPL", the resource type name that precedes the property list.
pub const PIPL_MARKER: &[u8; 8] = b"P\x00I\x00P\x00L\x00";

// Vendor code '8BIM' as it appears on disk in little-endian order.
pub const RECORD_SENTINEL: &[u8; 4] = b"MIB8";

pub const PIPL_OVERRIDE_FLAG: i32 = 1 << 23;
pub const MFR_FLAG: i32 = 1 << 27;

/// Lowest AE_Effect_Spec_Version (major, minor) that understands
/// multi-frame rendering.
pub const MIN_SPEC_VERSION: (u16, u16) = (13, 25);

pub const FIELD_KIND: &str = "Kind";
pub const FIELD_SPEC_VERSION: &str = "AE_Effect_Spec_Version";
pub const FIELD_OUT_FLAGS: &str = "AE_Effect_Global_OutFlags";
pub const FIELD_OUT_FLAGS_2: &str = "AE_Effect_Global_OutFlags_2";
pub const FIELD_RESERVED_INFO: &str = "AE_Reserved_Info";

pub(crate) const TEXT_FIELDS: &[&str] = &[
    "Name",
    "Category",
    "Code68k",
    "Code68kFPU",
    "CodePowerPC",
    "CodeCarbonPowerPC",
    "CodeMachOPowerPC",
    "CodeMacIntel32",
    "CodeMacIntel64",
    "CodeMacARM64",
    "CodeWin32X86",
    "CodeWin64X86",
    "AE_Effect_Match_Name",
];

pub(crate) const INT_FIELDS: &[&str] = &[
    "AE_PiPL_Version",
    "AE_Effect_Version",
    "AE_Effect_Info_Flags",
];

pub fn lookup_key(code: &str) -> Option<&'static str> {
    let name = match code {
        "kind" => "Kind",
        "vers" => "Version",
        "prty" => "Priority",
        "host" => "RequiredHost",
        "name" => "Name",
        "catg" => "Category",
        "m68k" => "Code68k",
        "68fp" => "Code68kFPU",
        "pwpc" => "CodePowerPC",
        "ppcb" => "CodeCarbonPowerPC",
        "mach" => "CodeMachOPowerPC",
        "mi32" => "CodeMacIntel32",
        "mi64" => "CodeMacIntel64",
        "ma64" => "CodeMacARM64",
        "wx86" => "CodeWin32X86",
        "8664" => "CodeWin64X86",
        "mode" => "SupportedModes",
        "fici" => "FilterCaseInfo",
        "expf" => "ExportFlags",
        "fxio" => "SupportsPOSIXIO",
        "fmTC" => "FmtFileType",
        "RdTy" => "ReadTypes",
        "WrTy" => "WriteTypes",
        "fftT" => "FilteredTypes",
        "RdEx" => "ReadExtensions",
        "WrEx" => "WriteExtensions",
        "fftE" => "FilteredExtensions",
        "fmtf" => "FormatFlags",
        "fmip" => "FormatICCFlags",
        "mxsz" => "FormatMaxSize",
        "mxch" => "FormatMaxChannels",
        "ePVR" => "AE_PiPL_Version",
        "eSVR" => FIELD_SPEC_VERSION,
        "eVER" => "AE_Effect_Version",
        "eINF" => "AE_Effect_Info_Flags",
        "eGLO" => FIELD_OUT_FLAGS,
        "eGL2" => FIELD_OUT_FLAGS_2,
        "eMNA" => "AE_Effect_Match_Name",
        "FXMF" => "AE_ImageFormat_Extension_Info",
        "aeRD" => "AE_Reserved",
        "aeFL" => FIELD_RESERVED_INFO,
        _ => return None,
    };
    Some(name)
}

/// Keys are stored byte-reversed on disk. Unknown codes come back as the
/// un-reversed literal so newer keys still show up in the report.
pub fn decode_key(raw: [u8; 4]) -> Cow<'static, str> {
    let mut bytes = raw;
    bytes.reverse();
    let code = String::from_utf8_lossy(&bytes).into_owned();
    match lookup_key(&code) {
        Some(name) => Cow::Borrowed(name),
        None => Cow::Owned(code),
    }
}

/// Kind tags are compared exactly as stored, without reversing.
pub fn lookup_kind(raw: [u8; 4]) -> &'static str {
    match &raw {
        b"TKFe" => "AEEffect",
        b"FIXF" => "AEImageFormat",
        b"TSFe" => "AEAccelerator",
        b"pgEA" => "AEGeneral",
        b"xgEA" => "AEGP",
        b"FPFe" => "AEForeignProjectFormat",
        _ => "Unknown",
    }
}
