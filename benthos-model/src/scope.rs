use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Capability attached to an API key.
///
/// Each scope maps to one boolean column in the key store; the wire names are
/// the camelCase forms used by the admin endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "doDiscovery")]
    DoDiscovery,
    #[serde(rename = "doLabelStudioSync")]
    DoLabelStudioSync,
    #[serde(rename = "getRawFile")]
    GetRawFile,
    #[serde(rename = "putPreprocessedFrame")]
    PutPreprocessedFrame,
    #[serde(rename = "getLaserLabel")]
    GetLaserLabel,
    #[serde(rename = "getLaserFrame")]
    GetLaserFrame,
    #[serde(rename = "putLaserFrame")]
    PutLaserFrame,
    #[serde(rename = "putDebugBlob")]
    PutDebugBlob,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "getMetadata")]
    GetMetadata,
}

impl Scope {
    /// Every scope, in key-store column order.
    pub const ALL: [Scope; 10] = [
        Scope::DoDiscovery,
        Scope::DoLabelStudioSync,
        Scope::GetRawFile,
        Scope::PutPreprocessedFrame,
        Scope::GetLaserLabel,
        Scope::GetLaserFrame,
        Scope::PutLaserFrame,
        Scope::PutDebugBlob,
        Scope::Admin,
        Scope::GetMetadata,
    ];

    /// Wire name used in requests and responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::DoDiscovery => "doDiscovery",
            Scope::DoLabelStudioSync => "doLabelStudioSync",
            Scope::GetRawFile => "getRawFile",
            Scope::PutPreprocessedFrame => "putPreprocessedFrame",
            Scope::GetLaserLabel => "getLaserLabel",
            Scope::GetLaserFrame => "getLaserFrame",
            Scope::PutLaserFrame => "putLaserFrame",
            Scope::PutDebugBlob => "putDebugBlob",
            Scope::Admin => "admin",
            Scope::GetMetadata => "getMetadata",
        }
    }

    /// Key-store column holding this scope's boolean.
    pub fn column(self) -> &'static str {
        match self {
            Scope::DoDiscovery => "do_discovery",
            Scope::DoLabelStudioSync => "do_label_studio_sync",
            Scope::GetRawFile => "get_raw_file",
            Scope::PutPreprocessedFrame => "put_preprocessed_frame",
            Scope::GetLaserLabel => "get_laser_label",
            Scope::GetLaserFrame => "get_laser_frame",
            Scope::PutLaserFrame => "put_laser_frame",
            Scope::PutDebugBlob => "put_debug_blob",
            Scope::Admin => "admin",
            Scope::GetMetadata => "get_metadata",
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| format!("unknown scope: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for scope in Scope::ALL {
            assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
        }
        assert!("getEverything".parse::<Scope>().is_err());
    }

    #[test]
    fn columns_are_distinct() {
        let mut columns: Vec<_> = Scope::ALL.iter().map(|s| s.column()).collect();
        columns.sort_unstable();
        columns.dedup();
        assert_eq!(columns.len(), Scope::ALL.len());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Scope::GetRawFile).unwrap();
        assert_eq!(json, "\"getRawFile\"");
        let parsed: Scope = serde_json::from_str("\"doDiscovery\"").unwrap();
        assert_eq!(parsed, Scope::DoDiscovery);
    }
}
