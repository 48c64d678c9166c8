use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a remote module.
///
/// Older servers report a plain boolean; `true` maps to `Running` and `false`
/// to `Stopped`, so the boolean form is a subset of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleStatus {
    #[default]
    Stopped,
    Starting,
    Running,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Stopped => "stopped",
            ModuleStatus::Starting => "starting",
            ModuleStatus::Running => "running",
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ModuleStatus::Stopped => 0,
            ModuleStatus::Starting => 1,
            ModuleStatus::Running => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(ModuleStatus::Stopped),
            1 => Some(ModuleStatus::Starting),
            2 => Some(ModuleStatus::Running),
            _ => None,
        }
    }

    /// Interprets any of the wire representations the servers have used.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(true) => Ok(ModuleStatus::Running),
            Value::Bool(false) => Ok(ModuleStatus::Stopped),
            Value::Number(n) => n
                .as_u64()
                .and_then(Self::from_code)
                .ok_or_else(|| format!("status code out of range: {n}")),
            Value::String(s) => s.parse(),
            other => Err(format!("unsupported status value: {other}")),
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "stopped" | "0" | "false" => Ok(ModuleStatus::Stopped),
            "starting" | "pending" | "resetting" | "1" => Ok(ModuleStatus::Starting),
            "running" | "started" | "2" | "true" => Ok(ModuleStatus::Running),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

impl Serialize for ModuleStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ModuleStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        ModuleStatus::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_integer_boolean_and_named_forms() {
        let cases = [
            (json!(0), ModuleStatus::Stopped),
            (json!(1), ModuleStatus::Starting),
            (json!(2), ModuleStatus::Running),
            (json!(true), ModuleStatus::Running),
            (json!(false), ModuleStatus::Stopped),
            (json!("started"), ModuleStatus::Running),
            (json!("Pending"), ModuleStatus::Starting),
        ];
        for (raw, expected) in cases {
            let status: ModuleStatus = serde_json::from_value(raw.clone()).expect("status");
            assert_eq!(status, expected, "decoding {raw}");
        }
    }

    #[test]
    fn rejects_out_of_range_codes() {
        assert!(serde_json::from_value::<ModuleStatus>(json!(3)).is_err());
        assert!(serde_json::from_value::<ModuleStatus>(json!(null)).is_err());
        assert!("paused".parse::<ModuleStatus>().is_err());
    }

    #[test]
    fn serializes_as_code() {
        let encoded = serde_json::to_string(&ModuleStatus::Starting).expect("encode");
        assert_eq!(encoded, "1");
    }
}
