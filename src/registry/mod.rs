//! Module registry for loading and caching compiled modules.
//!
//! Module sources (JSON text or already-parsed definitions) and lookup
//! tables are registered up front. A module is parsed and compiled the
//! first time it is requested and the result (success or failure) is
//! cached for the registry's lifetime. Concurrent first requests for the
//! same key compile it exactly once.

use ahash::AHashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use crate::core::config::EngineConfig;
use crate::lookup::{parse_csv, CsvTable};
use crate::module::{compile, LoadError, Module, ModuleDefinition, TableSource};

/// Outcome of compiling one module key, shared by every caller
type Slot = Arc<OnceLock<Result<Arc<Module>, LoadError>>>;

#[derive(Debug, Clone)]
enum Source {
    Json(String),
    Definition(ModuleDefinition),
}

/// Registry of module sources, lookup tables and compiled modules
pub struct ModuleRegistry {
    config: EngineConfig,
    sources: RwLock<AHashMap<String, Source>>,
    tables: RwLock<AHashMap<String, Arc<CsvTable>>>,
    compiled: Mutex<AHashMap<String, Slot>>,
    compiles: AtomicUsize,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.keys())
            .field("compiles", &self.compile_count())
            .finish()
    }
}

/// Keys of sub-modules live in a sub-directory: `"medications/insulin"`
pub fn is_submodule_key(key: &str) -> bool {
    key.contains('/')
}

impl ModuleRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            sources: RwLock::new(AHashMap::new()),
            tables: RwLock::new(AHashMap::new()),
            compiled: Mutex::new(AHashMap::new()),
            compiles: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn insert_source(&self, key: &str, source: Source) -> Result<(), LoadError> {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        if sources.contains_key(key) {
            return Err(LoadError::Duplicate(key.to_string()));
        }
        sources.insert(key.to_string(), source);
        Ok(())
    }

    /// Register module JSON under `key`. Parsing is deferred to first use.
    pub fn register_json(&self, key: &str, json: impl Into<String>) -> Result<(), LoadError> {
        self.insert_source(key, Source::Json(json.into()))
    }

    pub fn register_definition(
        &self,
        key: &str,
        definition: ModuleDefinition,
    ) -> Result<(), LoadError> {
        self.insert_source(key, Source::Definition(definition))
    }

    /// Register a lookup table by file name (e.g. `"risk.csv"`).
    ///
    /// Tables must be registered before any module that uses them is
    /// first requested.
    pub fn register_lookup_table_csv(&self, name: &str, csv: &str) -> Result<(), LoadError> {
        let table = parse_csv(csv).map_err(|e| LoadError::Parse {
            key: name.to_string(),
            message: e.to_string(),
        })?;
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if tables.contains_key(name) {
            return Err(LoadError::Duplicate(name.to_string()));
        }
        tables.insert(name.to_string(), Arc::new(table));
        tracing::debug!("Registered lookup table {}", name);
        Ok(())
    }

    /// Register every `.json` file under `root` recursively. Keys are the
    /// path relative to `root` without extension, `/`-separated.
    pub fn load_directory(&self, root: &Path) -> Result<Vec<String>, LoadError> {
        let mut keys = Vec::new();
        self.load_directory_recursive(root, root, &mut keys)?;
        keys.sort();
        tracing::info!("Registered {} modules from {}", keys.len(), root.display());
        Ok(keys)
    }

    fn load_directory_recursive(
        &self,
        root: &Path,
        path: &Path,
        keys: &mut Vec<String>,
    ) -> Result<(), LoadError> {
        for entry in std::fs::read_dir(path).map_err(|e| io_error(path, e))? {
            let entry_path = entry.map_err(|e| io_error(path, e))?.path();

            if entry_path.is_dir() {
                self.load_directory_recursive(root, &entry_path, keys)?;
            } else if entry_path.extension().map_or(false, |ext| ext == "json") {
                let key = module_key(root, &entry_path);
                let json = std::fs::read_to_string(&entry_path)
                    .map_err(|e| io_error(&entry_path, e))?;
                self.register_json(&key, json)?;
                keys.push(key);
            }
        }
        Ok(())
    }

    /// Register every `.csv` file directly inside `dir`, keyed by file name
    pub fn load_lookup_tables(&self, dir: &Path) -> Result<Vec<String>, LoadError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "csv") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let csv = std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            self.register_lookup_table_csv(name, &csv)?;
            names.push(name.to_string());
        }
        names.sort();
        tracing::info!("Registered {} lookup tables from {}", names.len(), dir.display());
        Ok(names)
    }

    /// All registered module keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = sources.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Registered keys that are not sub-modules, sorted
    pub fn top_level_keys(&self) -> Vec<String> {
        self.keys()
            .into_iter()
            .filter(|k| !is_submodule_key(k))
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of compilations performed so far (successful or not)
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    /// Fetch the compiled module for `key`, compiling it on first use.
    pub fn get(&self, key: &str) -> Result<Arc<Module>, LoadError> {
        if !self.contains(key) {
            return Err(LoadError::NotFound(key.to_string()));
        }
        let slot = {
            let mut compiled = self.compiled.lock().unwrap_or_else(PoisonError::into_inner);
            compiled.entry(key.to_string()).or_default().clone()
        };
        slot.get_or_init(|| self.compile(key)).clone()
    }

    /// Fetch the sub-module called from `caller`'s `state`, attributing a
    /// failure to the calling state
    pub fn submodule(
        &self,
        caller: &Module,
        state: &str,
        key: &str,
    ) -> Result<Arc<Module>, LoadError> {
        self.get(key).map_err(|source| LoadError::Submodule {
            module: caller.key().to_string(),
            state: state.to_string(),
            submodule: key.to_string(),
            source: Box::new(source),
        })
    }

    /// Compile `key` and every sub-module reachable from it
    pub fn get_with_submodules(&self, key: &str) -> Result<Arc<Module>, LoadError> {
        let root = self.get(key)?;
        let mut seen = vec![key.to_string()];
        let mut pending = vec![Arc::clone(&root)];
        while let Some(module) = pending.pop() {
            for (state, submodule) in module.submodule_calls() {
                if seen.iter().any(|k| k == submodule) {
                    continue;
                }
                seen.push(submodule.to_string());
                pending.push(self.submodule(&module, state, submodule)?);
            }
        }
        Ok(root)
    }

    /// Compile every registered module and check every sub-module
    /// reference, returning the first failure.
    pub fn preload(&self) -> Result<Vec<Arc<Module>>, LoadError> {
        let modules = self
            .keys()
            .iter()
            .map(|key| self.get_with_submodules(key))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!("Preloaded {} modules", modules.len());
        Ok(modules)
    }

    fn compile(&self, key: &str) -> Result<Arc<Module>, LoadError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);

        let source = self
            .sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(key.to_string()))?;
        let definition = match source {
            Source::Json(json) => {
                ModuleDefinition::from_json(&json).map_err(|e| LoadError::Parse {
                    key: key.to_string(),
                    message: e.to_string(),
                })?
            }
            Source::Definition(definition) => definition,
        };

        let result = compile(
            key,
            &definition,
            is_submodule_key(key),
            self,
            self.config.probability_tolerance,
        );
        match &result {
            Ok(module) => tracing::info!(
                "Loaded module {} ('{}', {} states)",
                key,
                module.name(),
                module.len()
            ),
            Err(e) => tracing::warn!("Failed to load module {}: {}", key, e),
        }
        result.map(Arc::new)
    }
}

impl TableSource for ModuleRegistry {
    fn csv_table(&self, name: &str) -> Option<Arc<CsvTable>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

fn io_error(path: &Path, e: std::io::Error) -> LoadError {
    LoadError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn module_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
