use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::sync::{Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{
    COUNTY_LINKS_COLLECTION, ClassifiedResult, CountyLink, ResultType, results_collection_name,
};
use crate::error::EraError;

/// A persisted [`ClassifiedResult`] with its record id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub id: String,
    #[serde(flatten)]
    pub result: ClassifiedResult,
    pub created_at: DateTime<Utc>,
}

/// Per-county results collections. Writes append; nothing is deduplicated.
pub trait ResultsStore: Send + Sync {
    fn ensure_collection(&self, county_id: &str) -> Result<(), EraError>;
    fn upsert(&self, county_id: &str, result: &ClassifiedResult) -> Result<(), EraError>;
    fn query(
        &self,
        county_id: &str,
        filter: Option<ResultType>,
    ) -> Result<Vec<StoredResult>, EraError>;
    fn list_collections(&self) -> Result<Vec<String>, EraError>;
    /// Refuses to delete [`COUNTY_LINKS_COLLECTION`].
    fn delete_collection(&self, name: &str) -> Result<(), EraError>;
}

pub trait CountyLinkStore: Send + Sync {
    fn save_link(&self, link: &CountyLink) -> Result<CountyLink, EraError>;
    fn get_link(&self, id: &str) -> Result<CountyLink, EraError>;
    fn list_links(&self) -> Result<Vec<CountyLink>, EraError>;
    fn update_link(&self, id: &str, link: &CountyLink) -> Result<CountyLink, EraError>;
    fn delete_link(&self, id: &str) -> Result<(), EraError>;
}

fn refuse_links_collection(name: &str) -> Result<(), EraError> {
    if name == COUNTY_LINKS_COLLECTION {
        return Err(EraError::Validation(format!(
            "refusing to delete {COUNTY_LINKS_COLLECTION}"
        )));
    }
    Ok(())
}

fn matches_filter(result: &StoredResult, filter: Option<ResultType>) -> bool {
    filter.is_none_or(|wanted| result.result.result_type == wanted)
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, EraError> {
    mutex
        .lock()
        .map_err(|_| EraError::Persistence("store lock poisoned".to_string()))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LinkTable {
    next_id: u64,
    links: Vec<CountyLink>,
}

impl LinkTable {
    fn insert(&mut self, link: &CountyLink) -> CountyLink {
        self.next_id += 1;
        let mut saved = link.clone();
        saved.id = Some(format!("link-{}", self.next_id));
        self.links.push(saved.clone());
        saved
    }

    fn get(&self, id: &str) -> Result<CountyLink, EraError> {
        self.links
            .iter()
            .find(|link| link.id.as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| EraError::NotFound(format!("county link {id}")))
    }

    fn update(&mut self, id: &str, link: &CountyLink) -> Result<CountyLink, EraError> {
        let slot = self
            .links
            .iter_mut()
            .find(|existing| existing.id.as_deref() == Some(id))
            .ok_or_else(|| EraError::NotFound(format!("county link {id}")))?;
        let mut updated = link.clone();
        updated.id = Some(id.to_string());
        *slot = updated.clone();
        Ok(updated)
    }

    fn remove(&mut self, id: &str) -> Result<(), EraError> {
        let before = self.links.len();
        self.links.retain(|link| link.id.as_deref() != Some(id));
        if self.links.len() == before {
            return Err(EraError::NotFound(format!("county link {id}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<String, Vec<StoredResult>>,
    links: LinkTable,
}

/// Process-local store, used by tests and one-off runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultsStore for MemoryStore {
    fn ensure_collection(&self, county_id: &str) -> Result<(), EraError> {
        let mut state = lock(&self.state)?;
        state
            .collections
            .entry(results_collection_name(county_id))
            .or_default();
        Ok(())
    }

    fn upsert(&self, county_id: &str, result: &ClassifiedResult) -> Result<(), EraError> {
        let name = results_collection_name(county_id);
        let mut state = lock(&self.state)?;
        let records = state
            .collections
            .get_mut(&name)
            .ok_or_else(|| EraError::Persistence(format!("collection {name} does not exist")))?;
        records.push(StoredResult {
            id: format!("{:08}", records.len() + 1),
            result: result.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn query(
        &self,
        county_id: &str,
        filter: Option<ResultType>,
    ) -> Result<Vec<StoredResult>, EraError> {
        let name = results_collection_name(county_id);
        let state = lock(&self.state)?;
        let records = state
            .collections
            .get(&name)
            .ok_or_else(|| EraError::NotFound(format!("collection {name}")))?;
        Ok(records
            .iter()
            .filter(|record| matches_filter(record, filter))
            .cloned()
            .collect())
    }

    fn list_collections(&self) -> Result<Vec<String>, EraError> {
        let state = lock(&self.state)?;
        let mut names = vec![COUNTY_LINKS_COLLECTION.to_string()];
        names.extend(state.collections.keys().cloned());
        Ok(names)
    }

    fn delete_collection(&self, name: &str) -> Result<(), EraError> {
        refuse_links_collection(name)?;
        let mut state = lock(&self.state)?;
        state
            .collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EraError::NotFound(format!("collection {name}")))
    }
}

impl CountyLinkStore for MemoryStore {
    fn save_link(&self, link: &CountyLink) -> Result<CountyLink, EraError> {
        Ok(lock(&self.state)?.links.insert(link))
    }

    fn get_link(&self, id: &str) -> Result<CountyLink, EraError> {
        lock(&self.state)?.links.get(id)
    }

    fn list_links(&self) -> Result<Vec<CountyLink>, EraError> {
        Ok(lock(&self.state)?.links.links.clone())
    }

    fn update_link(&self, id: &str, link: &CountyLink) -> Result<CountyLink, EraError> {
        lock(&self.state)?.links.update(id, link)
    }

    fn delete_link(&self, id: &str) -> Result<(), EraError> {
        lock(&self.state)?.links.remove(id)
    }
}

/// Directory-backed store: one JSON Lines file per results collection and a
/// `county_links.json` table, all under `root`.
#[derive(Debug)]
pub struct JsonFileStore {
    root: Utf8PathBuf,
    // next record number per collection, loaded lazily
    sequences: Mutex<HashMap<String, u64>>,
    links: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            sequences: Mutex::new(HashMap::new()),
            links: Mutex::new(()),
        }
    }

    pub fn default_root() -> Result<Utf8PathBuf, EraError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("era-results")).ok()
            })
            .ok_or_else(|| EraError::Filesystem("unable to resolve data directory".to_string()))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), EraError> {
        fs::create_dir_all(self.collections_dir().as_std_path())
            .map_err(|err| EraError::Filesystem(err.to_string()))
    }

    fn collections_dir(&self) -> Utf8PathBuf {
        self.root.join("collections")
    }

    fn collection_path(&self, name: &str) -> Utf8PathBuf {
        self.collections_dir().join(format!("{name}.jsonl"))
    }

    fn links_path(&self) -> Utf8PathBuf {
        self.root.join(format!("{COUNTY_LINKS_COLLECTION}.json"))
    }

    fn read_collection(&self, path: &Utf8Path) -> Result<Vec<StoredResult>, EraError> {
        let file = fs::File::open(path.as_std_path())
            .map_err(|err| EraError::Persistence(format!("open {path}: {err}")))?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| EraError::Persistence(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: StoredResult = serde_json::from_str(&line)
                .map_err(|err| EraError::Persistence(format!("{path}: {err}")))?;
            records.push(record);
        }
        Ok(records)
    }

    fn read_links(&self) -> Result<LinkTable, EraError> {
        let path = self.links_path();
        if !path.as_std_path().exists() {
            return Ok(LinkTable::default());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| EraError::Persistence(err.to_string()))
    }

    fn write_links(&self, table: &LinkTable) -> Result<(), EraError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        let path = self.links_path();
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(table)
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        Ok(())
    }

    fn with_links<T>(
        &self,
        change: impl FnOnce(&mut LinkTable) -> Result<T, EraError>,
    ) -> Result<T, EraError> {
        let _guard = lock(&self.links)?;
        let mut table = self.read_links()?;
        let value = change(&mut table)?;
        self.write_links(&table)?;
        Ok(value)
    }
}

impl ResultsStore for JsonFileStore {
    fn ensure_collection(&self, county_id: &str) -> Result<(), EraError> {
        let path = self.collection_path(&results_collection_name(county_id));
        if path.as_std_path().exists() {
            return Ok(());
        }
        fs::create_dir_all(self.collections_dir().as_std_path())
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_std_path())
            .map_err(|err| EraError::Persistence(format!("create {path}: {err}")))?;
        Ok(())
    }

    fn upsert(&self, county_id: &str, result: &ClassifiedResult) -> Result<(), EraError> {
        let name = results_collection_name(county_id);
        let path = self.collection_path(&name);
        if !path.as_std_path().exists() {
            return Err(EraError::Persistence(format!(
                "collection {name} does not exist"
            )));
        }

        let mut sequences = lock(&self.sequences)?;
        let next = match sequences.get(&name) {
            Some(seq) => *seq,
            None => self.read_collection(&path)?.len() as u64,
        } + 1;

        let record = StoredResult {
            id: format!("{next:08}"),
            result: result.clone(),
            created_at: Utc::now(),
        };
        let mut line = serde_json::to_vec(&record)
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .append(true)
            .open(path.as_std_path())
            .map_err(|err| EraError::Persistence(format!("open {path}: {err}")))?;
        file.write_all(&line)
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        sequences.insert(name, next);
        Ok(())
    }

    fn query(
        &self,
        county_id: &str,
        filter: Option<ResultType>,
    ) -> Result<Vec<StoredResult>, EraError> {
        let name = results_collection_name(county_id);
        let path = self.collection_path(&name);
        if !path.as_std_path().exists() {
            return Err(EraError::NotFound(format!("collection {name}")));
        }
        Ok(self
            .read_collection(&path)?
            .into_iter()
            .filter(|record| matches_filter(record, filter))
            .collect())
    }

    fn list_collections(&self) -> Result<Vec<String>, EraError> {
        let mut names = Vec::new();
        if self.links_path().as_std_path().exists() {
            names.push(COUNTY_LINKS_COLLECTION.to_string());
        }
        let dir = self.collections_dir();
        if !dir.as_std_path().exists() {
            return Ok(names);
        }
        let mut collections = Vec::new();
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| EraError::Persistence(err.to_string()))?;
            let path = entry.path();
            if path.extension().map(|ext| ext == "jsonl").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    collections.push(stem.to_string());
                }
            }
        }
        collections.sort();
        names.extend(collections);
        Ok(names)
    }

    fn delete_collection(&self, name: &str) -> Result<(), EraError> {
        refuse_links_collection(name)?;
        let path = self.collection_path(name);
        if !path.as_std_path().exists() {
            return Err(EraError::NotFound(format!("collection {name}")));
        }
        let mut sequences = lock(&self.sequences)?;
        fs::remove_file(path.as_std_path())
            .map_err(|err| EraError::Persistence(err.to_string()))?;
        sequences.remove(name);
        Ok(())
    }
}

impl CountyLinkStore for JsonFileStore {
    fn save_link(&self, link: &CountyLink) -> Result<CountyLink, EraError> {
        self.with_links(|table| Ok(table.insert(link)))
    }

    fn get_link(&self, id: &str) -> Result<CountyLink, EraError> {
        let _guard = lock(&self.links)?;
        self.read_links()?.get(id)
    }

    fn list_links(&self) -> Result<Vec<CountyLink>, EraError> {
        let _guard = lock(&self.links)?;
        Ok(self.read_links()?.links)
    }

    fn update_link(&self, id: &str, link: &CountyLink) -> Result<CountyLink, EraError> {
        self.with_links(|table| table.update(id, link))
    }

    fn delete_link(&self, id: &str) -> Result<(), EraError> {
        self.with_links(|table| table.remove(id))
    }
}
