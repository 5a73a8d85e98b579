/// Process-wide calibration settings
///
/// A single `Settings` value lives in the store. It is serialized to JSON
/// under its own storage key, wrapped with a schema version so later
/// releases can migrate old records.
use serde::{Deserialize, Serialize};

use crate::calibration::Archetype;
use crate::error::RecordError;

/// Current on-disk schema version for both persisted records
pub const SCHEMA_VERSION: u32 = 1;

/// Calibration settings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Filter curve family
    pub archetype: Archetype,

    /// Completed calibration refinements
    #[serde(alias = "iterations")]
    pub iteration_count: u32,

    /// Gates whether the calibration flow is shown again.
    /// Only `complete_onboarding` sets it and only `reset_all` clears it.
    #[serde(alias = "hasCompletedOnboarding")]
    pub onboarding_complete: bool,
}

impl Default for Settings {
    /// natural / 0 iterations / onboarding not done
    fn default() -> Self {
        Self {
            archetype: Archetype::Natural,
            iteration_count: 0,
            onboarding_complete: false,
        }
    }
}

impl Settings {
    /// Shallow merge: fields absent from the patch are left untouched
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            archetype: patch.archetype.unwrap_or(self.archetype),
            iteration_count: patch.iteration_count.unwrap_or(self.iteration_count),
            onboarding_complete: self.onboarding_complete,
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Partial settings update
///
/// Onboarding is intentionally absent; it has its own one-way transition.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<Archetype>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_count: Option<u32>,
}

impl SettingsPatch {
    pub fn archetype(mut self, archetype: Archetype) -> Self {
        self.archetype = Some(archetype);
        self
    }

    pub fn iteration_count(mut self, iteration_count: u32) -> Self {
        self.iteration_count = Some(iteration_count);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.archetype.is_none() && self.iteration_count.is_none()
    }
}

/// Versioned envelope for the settings record
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsRecord<'a> {
    schema_version: u32,
    #[serde(flatten)]
    settings: &'a Settings,
}

/// Encode settings as the persisted JSON record
pub(crate) fn encode(settings: &Settings) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&SettingsRecord {
        schema_version: SCHEMA_VERSION,
        settings,
    })
}

/// Decode a persisted settings record
///
/// Fields missing from the record keep their defaults. Records written
/// before versioning existed carry no version and are read as version 1.
pub(crate) fn decode(bytes: &[u8]) -> Result<Settings, RecordError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    check_version(&value)?;
    Ok(serde_json::from_value(value)?)
}

/// Reject records written by a newer schema than this build understands
pub(crate) fn check_version(value: &serde_json::Value) -> Result<(), RecordError> {
    match value.get("schemaVersion") {
        None => Ok(()),
        Some(version) => match version.as_u64() {
            Some(v) if v <= u64::from(SCHEMA_VERSION) => Ok(()),
            Some(v) => Err(RecordError::UnsupportedVersion(v)),
            None => Err(RecordError::MalformedVersion),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.archetype, Archetype::Natural);
        assert_eq!(settings.iteration_count, 0);
        assert!(!settings.onboarding_complete);
        assert!(settings.is_default());
    }

    #[test]
    fn test_shallow_merge() {
        let settings = Settings {
            onboarding_complete: true,
            ..Settings::default()
        };

        let merged = settings.merged(&SettingsPatch::default().iteration_count(3));
        assert_eq!(merged.archetype, Archetype::Natural);
        assert_eq!(merged.iteration_count, 3);
        assert!(merged.onboarding_complete);

        let merged = merged.merged(&SettingsPatch::default().archetype(Archetype::Classic));
        assert_eq!(merged.archetype, Archetype::Classic);
        assert_eq!(merged.iteration_count, 3);
    }

    #[test]
    fn test_record_layout() {
        let bytes = encode(&Settings {
            archetype: Archetype::Editorial,
            iteration_count: 4,
            onboarding_complete: true,
        })
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(json["archetype"], "editorial");
        assert_eq!(json["iterationCount"], 4);
        assert_eq!(json["onboardingComplete"], true);
    }

    #[test]
    fn test_partial_record_fills_defaults() {
        let settings = decode(br#"{"archetype":"classic"}"#).unwrap();
        assert_eq!(settings.archetype, Archetype::Classic);
        assert_eq!(settings.iteration_count, 0);
        assert!(!settings.onboarding_complete);
    }

    #[test]
    fn test_legacy_record_names() {
        let settings =
            decode(br#"{"archetype":"editorial","iterations":2,"hasCompletedOnboarding":true}"#)
                .unwrap();
        assert_eq!(settings.iteration_count, 2);
        assert!(settings.onboarding_complete);
    }

    #[test]
    fn test_rejects_invalid_records() {
        assert!(decode(br#"{"iterationCount":-2}"#).is_err());
        assert!(decode(br#"{"archetype":"vintage"}"#).is_err());
        assert!(decode(b"not json").is_err());
        assert!(matches!(
            decode(br#"{"schemaVersion":99,"archetype":"classic"}"#),
            Err(RecordError::UnsupportedVersion(99))
        ));
    }
}
