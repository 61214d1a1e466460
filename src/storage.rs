use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::models::{
    CategoriesFile, Category, NewCategory, RecordId, Setting, SettingsFile, Snapshot, Task,
    TaskDraft, TaskPatch, TasksFile, DEFAULT_CATEGORIES,
};

const TASKS_FILE: &str = "tasks.json";
const CATEGORIES_FILE: &str = "categories.json";
const SETTINGS_FILE: &str = "settings.json";
const BACKUP_DIR: &str = "backups";
const BACKUP_LIMIT: usize = 5;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
    NotFound(RecordId),
    DuplicateId(RecordId),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "io error: {err}"),
            StoreError::Json(err) => write!(f, "json error: {err}"),
            StoreError::NotFound(id) => write!(f, "record {id} not found"),
            StoreError::DuplicateId(id) => write!(f, "duplicate record id {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        StoreError::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Json(value)
    }
}

/// Keyed record storage for tasks, categories and settings.
///
/// Ids are assigned by the store and never reused while the record exists.
pub trait TaskStore: Send + Sync {
    fn create_task(&self, draft: TaskDraft) -> Result<Task, StoreError>;
    fn update_task(&self, id: RecordId, patch: &TaskPatch) -> Result<Task, StoreError>;
    /// Returns whether a record was removed; deleting a missing id is not an error.
    fn delete_task(&self, id: RecordId) -> Result<bool, StoreError>;
    fn get_task(&self, id: RecordId) -> Result<Option<Task>, StoreError>;
    fn list_tasks_for_date(&self, date: &str) -> Result<Vec<Task>, StoreError>;
    fn list_tasks_in_category(&self, category_id: RecordId) -> Result<Vec<Task>, StoreError>;
    fn list_all_tasks(&self) -> Result<Vec<Task>, StoreError>;

    fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
    fn add_category(&self, category: NewCategory) -> Result<Category, StoreError>;
    fn update_category(&self, category: Category) -> Result<Category, StoreError>;
    /// Tasks pointing at the category keep their (now dangling) id.
    fn delete_category(&self, id: RecordId) -> Result<bool, StoreError>;
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError>;

    fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set_setting(&self, key: &str, value: Value) -> Result<(), StoreError>;

    fn export_all(&self) -> Result<Snapshot, StoreError>;
    /// Replaces all three collections with the snapshot's content.
    fn import_all(&self, snapshot: Snapshot) -> Result<(), StoreError>;

    /// Picks up changes made behind the store's back. Returns whether anything changed.
    fn reload(&self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct StoreData {
    tasks: Vec<Task>,
    categories: Vec<Category>,
    settings: Vec<Setting>,
}

/// `TaskStore` backed by three JSON files in one directory.
pub struct JsonStore {
    root: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonStore {
    /// Opens (creating if needed) the store at `root`. An unreadable or
    /// corrupted collection file is an error, never silently reset.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(BACKUP_DIR))?;
        let store = Self {
            root,
            data: Mutex::new(StoreData::default()),
        };
        let mut data = store.read_files()?;
        if data.categories.is_empty() {
            data.categories = store.seed_categories()?;
        }
        log::info!(
            "storage: opened {} tasks={} categories={} settings={}",
            store.root.display(),
            data.tasks.len(),
            data.categories.len(),
            data.settings.len()
        );
        *store.lock() = data;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pre-import backups, oldest first.
    pub fn list_backups(&self) -> Result<Vec<String>, StoreError> {
        let mut entries: Vec<_> = fs::read_dir(self.root.join(BACKUP_DIR))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| name.ends_with(".json"))
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().expect("store poisoned")
    }

    fn seed_categories(&self) -> Result<Vec<Category>, StoreError> {
        let categories: Vec<Category> = DEFAULT_CATEGORIES
            .iter()
            .zip(1..)
            .map(|((name, color, icon), id)| Category {
                id,
                name: name.to_string(),
                color: color.to_string(),
                icon: icon.to_string(),
            })
            .collect();
        let file = CategoriesFile {
            schema_version: SCHEMA_VERSION,
            categories,
        };
        self.write_atomic(CATEGORIES_FILE, &file)?;
        log::info!("storage: seeded {} default categories", file.categories.len());
        Ok(file.categories)
    }

    fn read_files(&self) -> Result<StoreData, StoreError> {
        let tasks = self
            .load_optional::<TasksFile>(TASKS_FILE)?
            .map(|file| file.tasks)
            .unwrap_or_default();
        let categories = self
            .load_optional::<CategoriesFile>(CATEGORIES_FILE)?
            .map(|file| file.categories)
            .unwrap_or_default();
        let settings = self
            .load_optional::<SettingsFile>(SETTINGS_FILE)?
            .map(|file| file.settings)
            .unwrap_or_default();
        Ok(StoreData {
            tasks,
            categories,
            settings,
        })
    }

    fn load_optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(Some(serde_json::from_str(&buf)?))
    }

    fn write_atomic<T: Serialize>(&self, name: &str, data: &T) -> Result<(), StoreError> {
        let staged = self.write_temp(name, data)?;
        fs::rename(staged, self.root.join(name))?;
        Ok(())
    }

    /// Writes and syncs `<name>.tmp` next to the target, returning its path.
    fn write_temp<T: Serialize>(&self, name: &str, data: &T) -> Result<PathBuf, StoreError> {
        let temp_path = self.root.join(name).with_extension("tmp");
        let json = serde_json::to_vec_pretty(data)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        Ok(temp_path)
    }

    /// Stages every file before renaming any, so a failed write leaves the
    /// previous collections on disk.
    fn save_all(&self, data: &StoreData) -> Result<(), StoreError> {
        let tasks = TasksFile {
            schema_version: SCHEMA_VERSION,
            tasks: data.tasks.clone(),
        };
        let categories = CategoriesFile {
            schema_version: SCHEMA_VERSION,
            categories: data.categories.clone(),
        };
        let settings = SettingsFile {
            schema_version: SCHEMA_VERSION,
            settings: data.settings.clone(),
        };
        let files: [(&str, Value); 3] = [
            (TASKS_FILE, serde_json::to_value(tasks)?),
            (CATEGORIES_FILE, serde_json::to_value(categories)?),
            (SETTINGS_FILE, serde_json::to_value(settings)?),
        ];

        let mut staged = Vec::with_capacity(files.len());
        for (name, value) in &files {
            match self.write_temp(name, value) {
                Ok(temp_path) => staged.push((temp_path, self.root.join(name))),
                Err(error) => {
                    for (temp_path, _) in &staged {
                        let _ = fs::remove_file(temp_path);
                    }
                    log::warn!("storage: staging {name} failed, nothing replaced: {error}");
                    return Err(error);
                }
            }
        }
        for (temp_path, path) in staged {
            fs::rename(temp_path, path)?;
        }
        Ok(())
    }

    /// Persists `tasks` and hands them back for committing to memory.
    fn save_tasks(&self, tasks: Vec<Task>) -> Result<Vec<Task>, StoreError> {
        let file = TasksFile {
            schema_version: SCHEMA_VERSION,
            tasks,
        };
        self.write_atomic(TASKS_FILE, &file)?;
        Ok(file.tasks)
    }

    fn save_categories(&self, categories: Vec<Category>) -> Result<Vec<Category>, StoreError> {
        let file = CategoriesFile {
            schema_version: SCHEMA_VERSION,
            categories,
        };
        self.write_atomic(CATEGORIES_FILE, &file)?;
        Ok(file.categories)
    }

    fn save_settings(&self, settings: Vec<Setting>) -> Result<Vec<Setting>, StoreError> {
        let file = SettingsFile {
            schema_version: SCHEMA_VERSION,
            settings,
        };
        self.write_atomic(SETTINGS_FILE, &file)?;
        Ok(file.settings)
    }

    fn create_backup(&self, data: &StoreData) -> Result<(), StoreError> {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f").to_string();
        let snapshot = snapshot_of(data);
        let path = self
            .root
            .join(BACKUP_DIR)
            .join(format!("snapshot-{timestamp}.json"));
        let json = serde_json::to_vec_pretty(&snapshot)?;
        fs::write(path, json)?;
        self.trim_backups()
    }

    fn trim_backups(&self) -> Result<(), StoreError> {
        let backups = self.list_backups()?;
        let to_remove = backups.len().saturating_sub(BACKUP_LIMIT);
        for name in backups.into_iter().take(to_remove) {
            let _ = fs::remove_file(self.root.join(BACKUP_DIR).join(name));
        }
        Ok(())
    }
}

impl TaskStore for JsonStore {
    fn create_task(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let mut guard = self.lock();
        let id = next_id(guard.tasks.iter().map(|task| task.id));
        let task = draft.into_task(id, Some(now_rfc3339()));
        let mut tasks = guard.tasks.clone();
        tasks.push(task.clone());
        guard.tasks = self.save_tasks(tasks)?;
        log::debug!("storage: created task_id={id} date={}", task.date);
        Ok(task)
    }

    fn update_task(&self, id: RecordId, patch: &TaskPatch) -> Result<Task, StoreError> {
        let mut guard = self.lock();
        let mut tasks = guard.tasks.clone();
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(StoreError::NotFound(id))?;
        patch.apply(task);
        let updated = task.clone();
        guard.tasks = self.save_tasks(tasks)?;
        Ok(updated)
    }

    fn delete_task(&self, id: RecordId) -> Result<bool, StoreError> {
        let mut guard = self.lock();
        if !guard.tasks.iter().any(|task| task.id == id) {
            return Ok(false);
        }
        let tasks = guard.tasks.iter().filter(|task| task.id != id).cloned().collect();
        guard.tasks = self.save_tasks(tasks)?;
        log::debug!("storage: deleted task_id={id}");
        Ok(true)
    }

    fn get_task(&self, id: RecordId) -> Result<Option<Task>, StoreError> {
        Ok(self.lock().tasks.iter().find(|task| task.id == id).cloned())
    }

    fn list_tasks_for_date(&self, date: &str) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|task| task.date == date)
            .cloned()
            .collect())
    }

    fn list_tasks_in_category(&self, category_id: RecordId) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|task| task.category_id == Some(category_id))
            .cloned()
            .collect())
    }

    fn list_all_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.lock().tasks.clone())
    }

    fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.lock().categories.clone())
    }

    fn add_category(&self, category: NewCategory) -> Result<Category, StoreError> {
        let mut guard = self.lock();
        let id = next_id(guard.categories.iter().map(|category| category.id));
        let category = category.into_category(id);
        let mut categories = guard.categories.clone();
        categories.push(category.clone());
        guard.categories = self.save_categories(categories)?;
        Ok(category)
    }

    fn update_category(&self, category: Category) -> Result<Category, StoreError> {
        let mut guard = self.lock();
        let mut categories = guard.categories.clone();
        let slot = categories
            .iter_mut()
            .find(|existing| existing.id == category.id)
            .ok_or(StoreError::NotFound(category.id))?;
        *slot = category.clone();
        guard.categories = self.save_categories(categories)?;
        Ok(category)
    }

    fn delete_category(&self, id: RecordId) -> Result<bool, StoreError> {
        let mut guard = self.lock();
        if !guard.categories.iter().any(|category| category.id == id) {
            return Ok(false);
        }
        let categories = guard
            .categories
            .iter()
            .filter(|category| category.id != id)
            .cloned()
            .collect();
        guard.categories = self.save_categories(categories)?;
        Ok(true)
    }

    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        Ok(self
            .lock()
            .categories
            .iter()
            .find(|category| category.name == name)
            .cloned())
    }

    fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .lock()
            .settings
            .iter()
            .find(|setting| setting.key == key)
            .map(|setting| setting.value.clone()))
    }

    fn set_setting(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let mut settings = guard.settings.clone();
        match settings.iter_mut().find(|setting| setting.key == key) {
            Some(setting) => setting.value = value,
            None => settings.push(Setting {
                key: key.to_string(),
                value,
            }),
        }
        guard.settings = self.save_settings(settings)?;
        Ok(())
    }

    fn export_all(&self) -> Result<Snapshot, StoreError> {
        Ok(snapshot_of(&self.lock()))
    }

    fn import_all(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        ensure_unique(snapshot.tasks.iter().map(|task| task.id))?;
        ensure_unique(snapshot.categories.iter().map(|category| category.id))?;

        let mut guard = self.lock();
        self.create_backup(&guard)?;

        // Later entries win for a repeated settings key.
        let mut settings: Vec<Setting> = Vec::new();
        for setting in snapshot.settings {
            match settings.iter_mut().find(|existing| existing.key == setting.key) {
                Some(existing) => existing.value = setting.value,
                None => settings.push(setting),
            }
        }

        let imported = StoreData {
            tasks: snapshot.tasks,
            categories: snapshot.categories,
            settings,
        };
        self.save_all(&imported)?;
        log::info!(
            "storage: imported tasks={} categories={} settings={}",
            imported.tasks.len(),
            imported.categories.len(),
            imported.settings.len()
        );
        *guard = imported;
        Ok(())
    }

    fn reload(&self) -> Result<bool, StoreError> {
        let fresh = self.read_files()?;
        let mut guard = self.lock();
        if *guard == fresh {
            return Ok(false);
        }
        log::info!("storage: collections changed on disk, reloaded");
        *guard = fresh;
        Ok(true)
    }
}

fn snapshot_of(data: &StoreData) -> Snapshot {
    Snapshot {
        tasks: data.tasks.clone(),
        categories: data.categories.clone(),
        settings: data.settings.clone(),
        export_date: now_rfc3339(),
    }
}

fn next_id(ids: impl Iterator<Item = RecordId>) -> RecordId {
    ids.max().unwrap_or(0) + 1
}

fn ensure_unique(ids: impl Iterator<Item = RecordId>) -> Result<(), StoreError> {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(StoreError::DuplicateId(id));
        }
    }
    Ok(())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
