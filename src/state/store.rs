/// The local store owns the calibration settings and the photo archive.
///
/// Every mutation is applied to memory first, queued, and then replayed on
/// top of the record currently in storage inside one `Storage::update`, so
/// another store on the same storage (a second window, another process on
/// the same database file) never has its writes overwritten. After a
/// successful write memory holds what storage holds.
///
/// When a write fails the mutation stays in memory and in the queue, the
/// error is returned and `sync` retries it later.
use chrono::{SubsecRound, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::data::{decode_photos, encode_photos, Photo, PhotoDraft, PhotoId};
use super::settings::{self, Settings, SettingsPatch};
use super::storage::Storage;
use crate::error::{RecordError, StoreError};

/// Storage key for the settings record
pub const SETTINGS_KEY: &str = "eidos_settings";
/// Storage key for the photo collection record
pub const PHOTOS_KEY: &str = "eidos_photos";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsChange {
    Patch(SettingsPatch),
    Advance,
    Restart,
    CompleteOnboarding,
}

impl SettingsChange {
    fn apply(&self, settings: &mut Settings) {
        match self {
            SettingsChange::Patch(patch) => {
                let iteration_count = settings.iteration_count;
                *settings = settings.merged(patch);
                // Never below what another context already reached
                settings.iteration_count = settings.iteration_count.max(iteration_count);
            }
            SettingsChange::Advance => {
                settings.iteration_count = settings.iteration_count.saturating_add(1);
            }
            SettingsChange::Restart => settings.iteration_count = 0,
            SettingsChange::CompleteOnboarding => settings.onboarding_complete = true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PhotoChange {
    Add(Photo),
    Delete(PhotoId),
}

impl PhotoChange {
    fn apply(&self, photos: &mut Vec<Photo>) {
        match self {
            PhotoChange::Add(photo) => {
                if !photos.iter().any(|existing| existing.id() == photo.id()) {
                    photos.insert(0, photo.clone());
                }
            }
            PhotoChange::Delete(id) => photos.retain(|photo| photo.id() != id),
        }
    }
}

/// Changes made in memory that have not reached storage yet
#[derive(Debug, Clone, Default, PartialEq)]
struct Pending {
    /// Both records go back to their defaults before anything below
    reset: bool,
    settings: Vec<SettingsChange>,
    photos: Vec<PhotoChange>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        !self.reset && self.settings.is_empty() && self.photos.is_empty()
    }
}

/// Settings + photo collection backed by a `Storage`
#[derive(Debug)]
pub struct Store<S: Storage> {
    storage: S,
    settings: Settings,
    /// Newest first
    photos: Vec<Photo>,
    pending: Pending,
}

impl<S: Storage> Store<S> {
    /// Read persisted state from `storage`.
    ///
    /// Never fails: a missing, unreadable or corrupt record is replaced by
    /// its default (default settings, empty collection) and logged. Writes
    /// always start from the record in storage, so a record that could not
    /// be read here is merged into, not overwritten.
    pub fn load(storage: S) -> Self {
        let mut store = Store {
            storage,
            settings: Settings::default(),
            photos: Vec::new(),
            pending: Pending::default(),
        };
        store.reload();
        store
    }

    /// Discard in-memory state, unsynced changes included, and read it
    /// again from storage
    pub fn reload(&mut self) {
        if !self.pending.is_empty() {
            log::warn!("⚠️  Reload discards changes that were never persisted");
        }

        self.settings = load_record(&self.storage, SETTINGS_KEY, settings::decode);
        self.photos = load_record(&self.storage, PHOTOS_KEY, decode_photos);
        self.pending = Pending::default();

        log::info!(
            "📷 Store loaded: {} photos, archetype {}, {} iterations",
            self.photos.len(),
            self.settings.archetype,
            self.settings.iteration_count
        );
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Photos, most recent capture first
    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    /// Photos ordered by capture time, oldest first
    pub fn photos_by_capture_time(&self) -> Vec<&Photo> {
        let mut photos: Vec<&Photo> = self.photos.iter().collect();
        photos.sort_by_key(|photo| photo.captured_at());
        photos
    }

    pub fn photo(&self, id: &PhotoId) -> Option<&Photo> {
        self.photos.iter().find(|photo| photo.id() == id)
    }

    /// True while some in-memory change has not been persisted
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Store a new photo at the head of the collection.
    ///
    /// The store assigns a fresh id and the current time, truncated to the
    /// millisecond precision it is persisted with. On a failed write the
    /// photo stays in memory (see `is_dirty` / `sync`).
    pub fn add_photo(&mut self, draft: PhotoDraft) -> Result<Photo, StoreError> {
        let mut id = PhotoId::generate();
        while self.photo(&id).is_some() {
            id = PhotoId::generate();
        }

        let photo = Photo::from_draft(draft, id, Utc::now().trunc_subsecs(3));
        log::debug!("Adding photo {}", photo.id());

        self.change_photos(PhotoChange::Add(photo.clone()))?;
        Ok(photo)
    }

    /// Remove a photo by id.
    ///
    /// Returns `false` (and writes nothing) when the id is unknown.
    pub fn delete_photo(&mut self, id: &PhotoId) -> Result<bool, StoreError> {
        if self.photo(id).is_none() {
            log::debug!("Delete ignored, no photo with id {}", id);
            return Ok(false);
        }

        log::debug!("Deleting photo {}", id);
        self.change_photos(PhotoChange::Delete(id.clone()))?;
        Ok(true)
    }

    /// Shallow-merge `patch` into the settings and persist them.
    ///
    /// The iteration count never goes down through a patch; starting a new
    /// session is `begin_calibration`.
    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<(), StoreError> {
        if let Some(requested) = patch.iteration_count {
            let current = self.settings.iteration_count;
            if requested < current {
                return Err(StoreError::IterationRegression { current, requested });
            }
        }

        log::debug!("Updating settings with {:?}", patch);
        self.change_settings(SettingsChange::Patch(patch))
    }

    /// One refinement step: bump the iteration count and return the new settings
    pub fn advance_calibration(&mut self) -> Result<Settings, StoreError> {
        self.change_settings(SettingsChange::Advance)?;
        log::debug!("Calibration iteration {}", self.settings.iteration_count);
        Ok(self.settings)
    }

    /// Start a new calibration session at iteration 0
    pub fn begin_calibration(&mut self) -> Result<(), StoreError> {
        log::debug!("Calibration session restarted");
        self.change_settings(SettingsChange::Restart)
    }

    /// Mark onboarding as done. One-way; calling it again is a no-op.
    pub fn complete_onboarding(&mut self) -> Result<(), StoreError> {
        if self.settings.onboarding_complete {
            return Ok(());
        }

        log::debug!("Onboarding complete");
        self.change_settings(SettingsChange::CompleteOnboarding)
    }

    /// Clear every photo and restore default settings.
    ///
    /// Both records are written in one atomic batch. Unsynced earlier
    /// changes are dropped.
    pub fn reset_all(&mut self) -> Result<(), StoreError> {
        self.settings = Settings::default();
        self.photos.clear();
        self.pending = Pending {
            reset: true,
            ..Pending::default()
        };
        log::info!("🔄 Resetting settings and photo archive");

        self.sync()
    }

    /// Write every pending change.
    ///
    /// A pending reset goes first as one atomic batch. Settings and photo
    /// changes are then replayed on the stored records. Whatever fails stays
    /// pending for the next call.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.sync_reset().map_err(log_failure)?;
        self.sync_settings().map_err(log_failure)?;
        self.sync_photos().map_err(log_failure)
    }

    fn sync_reset(&mut self) -> Result<(), StoreError> {
        if !self.pending.reset {
            return Ok(());
        }

        let settings_bytes = settings::encode(&Settings::default())?;
        let photos_bytes = encode_photos(&[])?;
        self.storage.save_all(&[
            (SETTINGS_KEY, settings_bytes.as_slice()),
            (PHOTOS_KEY, photos_bytes.as_slice()),
        ])?;

        self.pending.reset = false;
        Ok(())
    }

    fn sync_settings(&mut self) -> Result<(), StoreError> {
        if self.pending.settings.is_empty() {
            return Ok(());
        }

        let changes = &self.pending.settings;
        let mut stored = None;
        self.storage.update(SETTINGS_KEY, |current| {
            let mut record: Settings = decode_record(SETTINGS_KEY, current, settings::decode);
            for change in changes {
                change.apply(&mut record);
            }
            let bytes = settings::encode(&record)?;
            stored = Some(record);
            Ok::<_, StoreError>(Some(bytes))
        })?;

        if let Some(settings) = stored {
            self.settings = settings;
        }
        self.pending.settings.clear();
        Ok(())
    }

    fn sync_photos(&mut self) -> Result<(), StoreError> {
        if self.pending.photos.is_empty() {
            return Ok(());
        }

        let changes = &self.pending.photos;
        let mut stored = None;
        self.storage.update(PHOTOS_KEY, |current| {
            let mut record: Vec<Photo> = decode_record(PHOTOS_KEY, current, decode_photos);
            for change in changes {
                change.apply(&mut record);
            }
            let bytes = encode_photos(&record)?;
            stored = Some(record);
            Ok::<_, StoreError>(Some(bytes))
        })?;

        if let Some(photos) = stored {
            self.photos = photos;
        }
        self.pending.photos.clear();
        Ok(())
    }

    fn change_settings(&mut self, change: SettingsChange) -> Result<(), StoreError> {
        change.apply(&mut self.settings);
        self.pending.settings.push(change);
        self.sync()
    }

    fn change_photos(&mut self, change: PhotoChange) -> Result<(), StoreError> {
        change.apply(&mut self.photos);
        self.pending.photos.push(change);
        self.sync()
    }
}

fn log_failure(e: StoreError) -> StoreError {
    log::error!("❌ Failed to persist store: {}", e);
    e
}

/// Anything that can come out of a stored record
trait Record: Default {
    fn normalize(self) -> Self {
        self
    }
}

impl Record for Settings {}

impl Record for Vec<Photo> {
    fn normalize(self) -> Self {
        dedup_photos(self)
    }
}

/// Load and decode one record, logging whatever goes wrong
fn load_record<S, T>(
    storage: &S,
    key: &str,
    decode: impl Fn(&[u8]) -> Result<T, RecordError>,
) -> T
where
    S: Storage,
    T: Record,
{
    match storage.load(key) {
        Ok(current) => decode_record(key, current, decode),
        Err(e) => {
            log::warn!("⚠️  Could not read record `{}` ({}), showing defaults", key, e);
            T::default()
        }
    }
}

/// Decode a stored blob, falling back to the default when missing or corrupt
fn decode_record<T>(
    key: &str,
    current: Option<Vec<u8>>,
    decode: impl Fn(&[u8]) -> Result<T, RecordError>,
) -> T
where
    T: Record,
{
    match current {
        Some(bytes) => match decode(&bytes) {
            Ok(value) => value.normalize(),
            Err(e) => {
                log::warn!("⚠️  Corrupt record `{}` ({}), using defaults", key, e);
                T::default()
            }
        },
        None => {
            log::debug!("No record `{}` yet, using defaults", key);
            T::default()
        }
    }
}

/// Drop photos whose id already appeared earlier in the collection
fn dedup_photos(photos: Vec<Photo>) -> Vec<Photo> {
    let total = photos.len();
    let mut seen = HashSet::with_capacity(total);
    let photos: Vec<Photo> = photos
        .into_iter()
        .filter(|photo| seen.insert(photo.id().clone()))
        .collect();

    if photos.len() < total {
        log::warn!("⚠️  Dropped {} photos with duplicate ids", total - photos.len());
    }
    photos
}

/// A store shared between execution contexts
///
/// Each operation holds one lock for its whole modify-persist cycle, so
/// threads sharing one store see each other's changes in order. Separate
/// stores on the same storage are kept apart by `Storage::update`.
#[derive(Debug)]
pub struct SharedStore<S: Storage> {
    inner: Arc<Mutex<Store<S>>>,
}

impl<S: Storage> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Storage> SharedStore<S> {
    pub fn new(store: Store<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `f` with exclusive access to the store
    pub fn with<R>(&self, f: impl FnOnce(&mut Store<S>) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn settings(&self) -> Settings {
        *self.lock().settings()
    }

    pub fn photos(&self) -> Vec<Photo> {
        self.lock().photos().to_vec()
    }

    pub fn photo(&self, id: &PhotoId) -> Option<Photo> {
        self.lock().photo(id).cloned()
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().is_dirty()
    }

    pub fn add_photo(&self, draft: PhotoDraft) -> Result<Photo, StoreError> {
        self.lock().add_photo(draft)
    }

    pub fn delete_photo(&self, id: &PhotoId) -> Result<bool, StoreError> {
        self.lock().delete_photo(id)
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Result<(), StoreError> {
        self.lock().update_settings(patch)
    }

    pub fn advance_calibration(&self) -> Result<Settings, StoreError> {
        self.lock().advance_calibration()
    }

    pub fn begin_calibration(&self) -> Result<(), StoreError> {
        self.lock().begin_calibration()
    }

    pub fn complete_onboarding(&self) -> Result<(), StoreError> {
        self.lock().complete_onboarding()
    }

    pub fn reset_all(&self) -> Result<(), StoreError> {
        self.lock().reset_all()
    }

    pub fn sync(&self) -> Result<(), StoreError> {
        self.lock().sync()
    }

    // Every mutation leaves the store valid, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Store<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
