use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dish::ValidationError;
use crate::{AppError, AppResult};

pub const KEY_FIRST_NAME: &str = "UserName";
pub const KEY_LAST_NAME: &str = "UserLastName";
pub const KEY_EMAIL: &str = "UserEmail";
pub const KEY_PHONE: &str = "UserPhoneNumber";
pub const KEY_IMAGE: &str = "UserImage";
pub const KEY_NOTIFICATIONS: &str = "UserCheckboxes";

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z]+$").expect("valid name regex"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("valid email regex")
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\+1\s?)?(\([0-9]{3}\)\s?)?[0-9]{3}[\s.-]?[0-9]{4}$").expect("valid phone regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPrefs {
    #[serde(default)]
    pub order_status: bool,
    #[serde(default)]
    pub password_change: bool,
    #[serde(default)]
    pub special_offers: bool,
    #[serde(default)]
    pub newsletter: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub image: Option<String>,
    pub notifications: NotificationPrefs,
}

impl Profile {
    pub fn initials(&self) -> String {
        self.first_name
            .chars()
            .next()
            .into_iter()
            .chain(self.last_name.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }

    /// Every field check, collected rather than stopping at the first.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Err(err) = validate_name("first_name", &self.first_name) {
            errors.push(err);
        }
        if let Err(err) = validate_name("last_name", &self.last_name) {
            errors.push(err);
        }
        if let Err(err) = validate_email(&self.email) {
            errors.push(err);
        }
        if let Err(err) = validate_phone(&self.phone_number) {
            errors.push(err);
        }
        errors
    }
}

pub fn validate_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    if !NAME_RE.is_match(value) {
        return Err(ValidationError::InvalidField {
            field,
            reason: "letters only",
        });
    }
    Ok(())
}

pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "email" });
    }
    if !EMAIL_RE.is_match(value) {
        return Err(ValidationError::InvalidField {
            field: "email",
            reason: "not an email address",
        });
    }
    Ok(())
}

pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "phone_number",
        });
    }
    if !PHONE_RE.is_match(value) {
        return Err(ValidationError::InvalidField {
            field: "phone_number",
            reason: "not a US phone number",
        });
    }
    Ok(())
}

fn first_error(mut errors: Vec<ValidationError>) -> AppResult<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let first = errors.remove(0);
    let mut err = AppError::from(first);
    for (index, extra) in errors.into_iter().enumerate() {
        err = err.with_context(format!("also_{index}"), extra.field());
    }
    Err(err)
}

trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn clear(&self);
    fn snapshot(&self) -> BTreeMap<String, String>;
    fn restore(&self, entries: BTreeMap<String, String>);
    fn save(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
struct MemoryStore {
    data: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock().clone()
    }

    fn restore(&self, entries: BTreeMap<String, String>) {
        *self.lock() = entries;
    }

    fn save(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Key-value pairs kept in memory and flushed to one JSON file on `save`.
struct JsonFileStore {
    path: PathBuf,
    data: MemoryStore,
}

impl JsonFileStore {
    fn open(path: &Path) -> anyhow::Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<BTreeMap<String, String>>(&raw)
                .with_context(|| format!("parse profile store {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("read profile store {}", path.display()))
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            data: MemoryStore {
                data: Mutex::new(data),
            },
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.get(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.data.set(key, value);
    }

    fn remove(&self, key: &str) {
        self.data.remove(key);
    }

    fn clear(&self) {
        self.data.clear();
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.data.snapshot()
    }

    fn restore(&self, entries: BTreeMap<String, String>) {
        self.data.restore(entries);
    }

    fn save(&self) -> anyhow::Result<()> {
        let snapshot = self.data.snapshot();
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create profile dir {}", parent.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("create temp file in {}", parent.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &snapshot).context("serialize profile store")?;
        tmp.flush().context("flush profile store")?;
        tmp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("persist profile store {}", self.path.display()))?;
        Ok(())
    }
}

/// Handle to the persisted profile fields.
#[derive(Clone)]
pub struct ProfileStore {
    inner: Arc<dyn KeyValueStore>,
}

impl ProfileStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(MemoryStore::default()),
        }
    }

    pub fn open(path: &Path) -> AppResult<Self> {
        let store = JsonFileStore::open(path).map_err(|err| {
            AppError::from(err).with_context("profile_path", path.display().to_string())
        })?;
        Ok(Self {
            inner: Arc::new(store),
        })
    }

    /// Onboarding is complete once a first name has been stored.
    pub fn is_onboarded(&self) -> bool {
        self.inner
            .get(KEY_FIRST_NAME)
            .is_some_and(|name| !name.trim().is_empty())
    }

    pub fn load(&self) -> Profile {
        let notifications = self
            .inner
            .get(KEY_NOTIFICATIONS)
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(prefs) => Some(prefs),
                Err(err) => {
                    warn!(
                        target: "littlelemon",
                        event = "profile_notifications_unreadable",
                        error = %err
                    );
                    None
                }
            })
            .unwrap_or_default();

        Profile {
            first_name: self.inner.get(KEY_FIRST_NAME).unwrap_or_default(),
            last_name: self.inner.get(KEY_LAST_NAME).unwrap_or_default(),
            email: self.inner.get(KEY_EMAIL).unwrap_or_default(),
            phone_number: self.inner.get(KEY_PHONE).unwrap_or_default(),
            image: self
                .inner
                .get(KEY_IMAGE)
                .filter(|value| !value.is_empty()),
            notifications,
        }
    }

    /// Stores the onboarding pair after validating both fields.
    pub fn onboard(&self, first_name: &str, email: &str) -> AppResult<()> {
        let mut errors = Vec::new();
        if let Err(err) = validate_name("first_name", first_name) {
            errors.push(err);
        }
        if let Err(err) = validate_email(email) {
            errors.push(err);
        }
        first_error(errors)?;

        self.write(|store| {
            store.set(KEY_FIRST_NAME, first_name);
            store.set(KEY_EMAIL, email);
        })?;
        info!(target: "littlelemon", event = "profile_onboarded");
        Ok(())
    }

    /// Validates and stores the full profile. Nothing is written when any
    /// field is rejected.
    pub fn save(&self, profile: &Profile) -> AppResult<()> {
        first_error(profile.validate())?;

        let notifications =
            serde_json::to_string(&profile.notifications).map_err(AppError::from)?;
        self.write(|store| {
            store.set(KEY_FIRST_NAME, &profile.first_name);
            store.set(KEY_LAST_NAME, &profile.last_name);
            store.set(KEY_EMAIL, &profile.email);
            store.set(KEY_PHONE, &profile.phone_number);
            match profile.image.as_deref() {
                Some(image) => store.set(KEY_IMAGE, image),
                None => store.remove(KEY_IMAGE),
            }
            store.set(KEY_NOTIFICATIONS, &notifications);
        })?;
        info!(target: "littlelemon", event = "profile_saved");
        Ok(())
    }

    /// Clears every stored field.
    pub fn logout(&self) -> AppResult<()> {
        self.write(|store| store.clear())?;
        info!(target: "littlelemon", event = "profile_cleared");
        Ok(())
    }

    /// Applies `update` and persists it. When persisting fails the
    /// in-memory fields are put back so they keep matching the file.
    fn write<F>(&self, update: F) -> AppResult<()>
    where
        F: FnOnce(&dyn KeyValueStore),
    {
        let before = self.inner.snapshot();
        update(&*self.inner);
        if let Err(err) = self.inner.save() {
            self.inner.restore(before);
            warn!(target: "littlelemon", event = "profile_persist_failed", error = %err);
            return Err(AppError::from(err));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_profile() -> Profile {
        Profile {
            first_name: "Tilly".into(),
            last_name: "Doe".into(),
            email: "tilly@example.com".into(),
            phone_number: "(312) 555-0100".into(),
            image: None,
            notifications: NotificationPrefs {
                newsletter: true,
                ..NotificationPrefs::default()
            },
        }
    }

    #[test]
    fn name_rules() {
        assert!(validate_name("first_name", "Tilly").is_ok());
        assert!(validate_name("first_name", "").is_err());
        assert!(validate_name("first_name", "Tilly2").is_err());
        assert!(validate_name("first_name", "Mary Ann").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("tilly@example.com").is_ok());
        assert!(validate_email("first.last@sub.example.co").is_ok());
        assert!(validate_email("tilly@").is_err());
        assert!(validate_email("no-at-sign.com").is_err());
    }

    #[test]
    fn phone_rules() {
        for ok in ["5550100", "555-0100", "(312) 555-0100", "+1 (312)555.0100"] {
            assert!(validate_phone(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in ["", "555-01000", "phone", "+44 20 7946 0958"] {
            assert!(validate_phone(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn initials_use_first_letters() {
        let profile = Profile {
            first_name: "tilly".into(),
            last_name: "doe".into(),
            ..Profile::default()
        };
        assert_eq!(profile.initials(), "TD");
        assert_eq!(Profile::default().initials(), "");
    }

    #[test]
    fn onboarding_marks_user_onboarded() {
        let store = ProfileStore::in_memory();
        assert!(!store.is_onboarded());
        store.onboard("Tilly", "tilly@example.com").unwrap();
        assert!(store.is_onboarded());
        let profile = store.load();
        assert_eq!(profile.first_name, "Tilly");
        assert_eq!(profile.email, "tilly@example.com");
    }

    #[test]
    fn invalid_onboarding_writes_nothing() {
        let store = ProfileStore::in_memory();
        let err = store.onboard("", "bad").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.context().get("field").map(String::as_str), Some("first_name"));
        assert!(!store.is_onboarded());
    }

    #[test]
    fn save_and_load_round_trip_with_prefs() {
        let store = ProfileStore::in_memory();
        store.save(&valid_profile()).unwrap();
        assert_eq!(store.load(), valid_profile());
    }

    #[test]
    fn file_store_survives_reopen_and_logout_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("profile.json");
        let store = ProfileStore::open(&path).unwrap();
        store.save(&valid_profile()).unwrap();

        let reopened = ProfileStore::open(&path).unwrap();
        assert_eq!(reopened.load(), valid_profile());

        reopened.logout().unwrap();
        let after = ProfileStore::open(&path).unwrap();
        assert!(!after.is_onboarded());
        assert_eq!(after.load(), Profile::default());
    }

    #[test]
    fn failed_persist_leaves_fields_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("profile");
        let store = ProfileStore::open(&blocked.join("profile.json")).unwrap();
        std::fs::write(&blocked, b"not a directory").unwrap();

        assert!(store.onboard("Tilly", "tilly@example.com").is_err());
        assert!(!store.is_onboarded());
        assert_eq!(store.load(), Profile::default());

        assert!(store.save(&valid_profile()).is_err());
        assert_eq!(store.load(), Profile::default());
    }

    #[test]
    fn memory_store_recovers_from_poisoned_lock() {
        let store = Arc::new(MemoryStore::default());
        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.data.lock().unwrap();
            panic!("poison the profile lock");
        })
        .join();

        store.set(KEY_EMAIL, "tilly@example.com");
        assert_eq!(store.get(KEY_EMAIL).as_deref(), Some("tilly@example.com"));
        store.clear();
        assert!(store.snapshot().is_empty());
    }
}
