use serde::{Deserialize, Serialize};
use std::fmt;

/// LibreDWG error bitmask as returned by a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DwgStatus(pub u32);

impl DwgStatus {
    pub const NOERR: DwgStatus = DwgStatus(0);
    pub const WRONGCRC: DwgStatus = DwgStatus(1);
    pub const NOTYETSUPPORTED: DwgStatus = DwgStatus(1 << 1);
    pub const UNHANDLEDCLASS: DwgStatus = DwgStatus(1 << 2);
    pub const INVALIDTYPE: DwgStatus = DwgStatus(1 << 3);
    pub const INVALIDHANDLE: DwgStatus = DwgStatus(1 << 4);
    pub const INVALIDEED: DwgStatus = DwgStatus(1 << 5);
    pub const VALUEOUTOFBOUNDS: DwgStatus = DwgStatus(1 << 6);
    pub const CLASSESNOTFOUND: DwgStatus = DwgStatus(1 << 7);
    pub const SECTIONNOTFOUND: DwgStatus = DwgStatus(1 << 8);
    pub const PAGENOTFOUND: DwgStatus = DwgStatus(1 << 9);
    pub const INTERNALERROR: DwgStatus = DwgStatus(1 << 10);
    pub const INVALIDDWG: DwgStatus = DwgStatus(1 << 11);
    pub const IOERROR: DwgStatus = DwgStatus(1 << 12);
    pub const OUTOFMEM: DwgStatus = DwgStatus(1 << 13);

    const NAMES: [(&'static str, DwgStatus); 14] = [
        ("WRONGCRC", Self::WRONGCRC),
        ("NOTYETSUPPORTED", Self::NOTYETSUPPORTED),
        ("UNHANDLEDCLASS", Self::UNHANDLEDCLASS),
        ("INVALIDTYPE", Self::INVALIDTYPE),
        ("INVALIDHANDLE", Self::INVALIDHANDLE),
        ("INVALIDEED", Self::INVALIDEED),
        ("VALUEOUTOFBOUNDS", Self::VALUEOUTOFBOUNDS),
        ("CLASSESNOTFOUND", Self::CLASSESNOTFOUND),
        ("SECTIONNOTFOUND", Self::SECTIONNOTFOUND),
        ("PAGENOTFOUND", Self::PAGENOTFOUND),
        ("INTERNALERROR", Self::INTERNALERROR),
        ("INVALIDDWG", Self::INVALIDDWG),
        ("IOERROR", Self::IOERROR),
        ("OUTOFMEM", Self::OUTOFMEM),
    ];

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub fn is_fatal(self, threshold: u32) -> bool {
        self.0 > threshold
    }

    pub fn contains(self, other: DwgStatus) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Names of the set bits, lowest first.
    pub fn flag_names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl std::ops::BitOr for DwgStatus {
    type Output = DwgStatus;

    fn bitor(self, rhs: DwgStatus) -> DwgStatus {
        DwgStatus(self.0 | rhs.0)
    }
}

impl fmt::Display for DwgStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.flag_names();
        if names.is_empty() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{} ({})", self.0, names.join("|"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Supertype {
    Entity,
    Object,
    Unknown,
}

impl fmt::Display for Supertype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Supertype::Entity => "entity",
            Supertype::Object => "object",
            Supertype::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub supertype: Supertype,
    pub type_code: u32,
    pub type_name: String,
}

/// Metadata of one loaded drawing. Objects keep file storage order.
///
/// The layer-control entry count is deliberately absent: the library's
/// LAYER_CONTROL object does not expose its entries in a consistent shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawingHandle {
    version: String,
    objects: Vec<ObjectRecord>,
}

impl DrawingHandle {
    pub fn new(version: impl Into<String>, objects: Vec<ObjectRecord>) -> Self {
        Self {
            version: version.into(),
            objects,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_at(&self, i: usize) -> Option<&ObjectRecord> {
        self.objects.get(i)
    }

    pub fn objects(&self) -> &[ObjectRecord] {
        &self.objects
    }
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub status: DwgStatus,
    pub drawing: DrawingHandle,
}
