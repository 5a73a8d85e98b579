/// Shared data structures for the photo archive
///
/// These structs represent the records that flow between
/// the store, its storage backend and the capture/gallery screens.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::calibration::{compute_filter_parameters, Archetype, FilterParameters};
use crate::error::RecordError;
use crate::state::settings::{check_version, SCHEMA_VERSION};

/// Unique photo identifier (UUID v4, generated at creation)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PhotoId(String);

impl PhotoId {
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PhotoId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PhotoId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque captured image content (usually a `data:` URL)
///
/// The store never looks inside; only the capture boundary produces it
/// and only the rendering layer consumes it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct ImageData(String);

impl ImageData {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageData {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ImageData {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Caller-supplied part of a photo, before the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoDraft {
    pub image_data: ImageData,
    pub archetype: Archetype,
    pub iteration_count: u32,
    pub filter_enabled: bool,
}

/// A captured photo with the settings snapshot active at capture time
///
/// Immutable after creation: fields are only readable, and the store hands
/// out shared references or clones. Later settings changes never touch it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    id: PhotoId,
    #[serde(alias = "originalUrl")]
    image_data: ImageData,
    #[serde(with = "chrono::serde::ts_milliseconds", alias = "timestamp")]
    captured_at: DateTime<Utc>,
    archetype: Archetype,
    #[serde(alias = "iterations")]
    iteration_count: u32,
    #[serde(alias = "eidosMode")]
    filter_enabled: bool,
}

impl Photo {
    /// Materialize a draft with a fresh id and the given capture time
    pub(crate) fn from_draft(draft: PhotoDraft, id: PhotoId, captured_at: DateTime<Utc>) -> Self {
        Self {
            id,
            image_data: draft.image_data,
            captured_at,
            archetype: draft.archetype,
            iteration_count: draft.iteration_count,
            filter_enabled: draft.filter_enabled,
        }
    }

    pub fn id(&self) -> &PhotoId {
        &self.id
    }

    pub fn image_data(&self) -> &ImageData {
        &self.image_data
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn filter_enabled(&self) -> bool {
        self.filter_enabled
    }

    /// Display parameters derived from this photo's own snapshot
    ///
    /// `None` when the filter was off at capture time.
    pub fn filter_parameters(&self) -> Option<FilterParameters> {
        self.filter_enabled
            .then(|| compute_filter_parameters(self.archetype, self.iteration_count))
    }
}

/// Versioned envelope for the photo collection record
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PhotosRecord<'a> {
    schema_version: u32,
    photos: &'a [Photo],
}

/// Encode the photo collection as the persisted JSON record
pub(crate) fn encode_photos(photos: &[Photo]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&PhotosRecord {
        schema_version: SCHEMA_VERSION,
        photos,
    })
}

/// Decode a persisted photo collection
///
/// Accepts both the versioned envelope and a bare legacy array.
pub(crate) fn decode_photos(bytes: &[u8]) -> Result<Vec<Photo>, RecordError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;

    if value.is_array() {
        return Ok(serde_json::from_value(value)?);
    }

    check_version(&value)?;
    match value {
        serde_json::Value::Object(mut record) => {
            let photos = record.remove("photos").ok_or(RecordError::Shape)?;
            Ok(serde_json::from_value(photos)?)
        }
        _ => Err(RecordError::Shape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(filter_enabled: bool) -> Photo {
        let draft = PhotoDraft {
            image_data: ImageData::from("data:image/jpeg;base64,AAAA"),
            archetype: Archetype::Classic,
            iteration_count: 2,
            filter_enabled,
        };
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        Photo::from_draft(draft, PhotoId::from("photo-1"), at)
    }

    #[test]
    fn test_json_layout() {
        let json = serde_json::to_value(sample(true)).unwrap();

        assert_eq!(json["id"], "photo-1");
        assert_eq!(json["imageData"], "data:image/jpeg;base64,AAAA");
        assert_eq!(json["capturedAt"], 1_700_000_000_123i64);
        assert_eq!(json["archetype"], "classic");
        assert_eq!(json["iterationCount"], 2);
        assert_eq!(json["filterEnabled"], true);
    }

    #[test]
    fn test_reads_legacy_field_names() {
        let legacy = r#"{
            "id": "abc",
            "originalUrl": "x",
            "timestamp": 1700000000000,
            "archetype": "editorial",
            "iterations": 3,
            "eidosMode": false
        }"#;

        let photo: Photo = serde_json::from_str(legacy).unwrap();
        assert_eq!(photo.id().as_str(), "abc");
        assert_eq!(photo.image_data().as_str(), "x");
        assert_eq!(photo.archetype(), Archetype::Editorial);
        assert_eq!(photo.iteration_count(), 3);
        assert!(!photo.filter_enabled());
    }

    #[test]
    fn test_filter_parameters_follow_snapshot() {
        let on = sample(true);
        assert_eq!(
            on.filter_parameters(),
            Some(compute_filter_parameters(Archetype::Classic, 2))
        );
        assert_eq!(sample(false).filter_parameters(), None);
    }

    #[test]
    fn test_photos_record_envelope() {
        let photos = vec![sample(true), sample(false)];
        let bytes = encode_photos(&photos).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(json["photos"].as_array().unwrap().len(), 2);

        assert_eq!(decode_photos(&bytes).unwrap(), photos);
    }

    #[test]
    fn test_photos_record_accepts_bare_array() {
        let legacy = r#"[{"id":"a","imageData":"x","capturedAt":1,"archetype":"natural","iterationCount":0,"filterEnabled":true}]"#;
        let photos = decode_photos(legacy.as_bytes()).unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].id().as_str(), "a");
    }

    #[test]
    fn test_photos_record_rejects_garbage() {
        assert!(decode_photos(b"{\"schemaVersion\":1}").is_err());
        assert!(decode_photos(b"42").is_err());
        assert!(decode_photos(b"{\"schemaVersion\":7,\"photos\":[]}").is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = PhotoId::generate();
        let b = PhotoId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }
}
