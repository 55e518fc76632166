//! Output record: an autovivifying JSON tree addressed by key-paths, plus the
//! prefix stack that scopes relative writes and the optional debug log that
//! mirrors every save line by line.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Selects (or creates) a map entry.
    Name(String),
    /// Selects (or creates) a sequence slot.
    Index(usize),
}

impl Segment {
    fn empty_container(&self) -> Value {
        match self {
            Segment::Name(_) => Value::Object(Map::new()),
            Segment::Index(_) => Value::Array(Vec::new()),
        }
    }
}

impl From<&str> for Segment {
    fn from(name: &str) -> Self {
        Segment::Name(name.to_string())
    }
}

impl From<String> for Segment {
    fn from(name: String) -> Self {
        Segment::Name(name)
    }
}

impl From<&String> for Segment {
    fn from(name: &String) -> Self {
        Segment::Name(name.clone())
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(name) => write!(f, "{name:?}"),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Ordered sequence of segments identifying a datum ("dkey").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPath(Vec<Segment>);

impl KeyPath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `self ++ other`.
    pub fn join(&self, other: impl Into<KeyPath>) -> KeyPath {
        let mut segments = self.0.clone();
        segments.extend(other.into().0);
        KeyPath(segments)
    }

    /// `self ++ [segment]`.
    pub fn child(&self, segment: impl Into<Segment>) -> KeyPath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        KeyPath(segments)
    }
}

impl From<Vec<Segment>> for KeyPath {
    fn from(segments: Vec<Segment>) -> Self {
        KeyPath(segments)
    }
}

impl From<Segment> for KeyPath {
    fn from(segment: Segment) -> Self {
        KeyPath(vec![segment])
    }
}

impl From<&str> for KeyPath {
    fn from(name: &str) -> Self {
        KeyPath(vec![name.into()])
    }
}

impl From<String> for KeyPath {
    fn from(name: String) -> Self {
        KeyPath(vec![name.into()])
    }
}

impl From<usize> for KeyPath {
    fn from(index: usize) -> Self {
        KeyPath(vec![index.into()])
    }
}

impl From<&KeyPath> for KeyPath {
    fn from(path: &KeyPath) -> Self {
        path.clone()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{segment}")?;
        }
        write!(f, ")")
    }
}

/// Builds a [`KeyPath`] from mixed name/index segments: `path!["a", 5, "b"]`.
#[macro_export]
macro_rules! path {
    ($($segment:expr),* $(,)?) => {
        $crate::record::KeyPath::from(::std::vec![$($crate::record::Segment::from($segment)),*])
    };
}

/// The record tree. The root is always a map.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: Value,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Writes `value` at the absolute `path`, creating intermediate containers
    /// on demand and padding sequences with nulls.
    ///
    /// A leaf that already holds a non-null value is left untouched; the
    /// return value tells whether the write took effect.
    pub fn insert(&mut self, path: &KeyPath, value: Value) -> Result<bool> {
        let segments = path.segments();
        if segments.is_empty() {
            return Err(Error::StructuralConflict {
                path: path.clone(),
                reason: "empty key path",
            });
        }

        let mut slot = &mut self.root;
        for (i, segment) in segments.iter().enumerate() {
            slot = child_slot(slot, segment, path)?;
            match segments.get(i + 1) {
                Some(next) => {
                    if slot.is_null() {
                        *slot = next.empty_container();
                    }
                }
                None => {
                    if slot.is_null() {
                        *slot = value;
                        return Ok(true);
                    }
                    return Ok(false);
                }
            }
        }
        Ok(false)
    }

    pub fn get(&self, path: &KeyPath) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = match (node, segment) {
                (Value::Object(map), Segment::Name(name)) => map.get(name)?,
                (Value::Array(items), Segment::Index(i)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Direct access to a top-level map entry, bypassing first-write-wins.
    /// Used when finalising the record.
    pub fn top_level_mut(&mut self, name: &str) -> &mut Value {
        &mut self.root[name]
    }
}

fn child_slot<'a>(container: &'a mut Value, segment: &Segment, path: &KeyPath) -> Result<&'a mut Value> {
    match (container, segment) {
        (Value::Object(map), Segment::Name(name)) => Ok(map.entry(name.clone()).or_insert(Value::Null)),
        (Value::Array(items), Segment::Index(i)) => {
            if items.len() <= *i {
                items.resize(*i + 1, Value::Null);
            }
            Ok(&mut items[*i])
        }
        (Value::Object(_), Segment::Index(_)) => Err(Error::StructuralConflict {
            path: path.clone(),
            reason: "index segment addresses a map",
        }),
        (Value::Array(_), Segment::Name(_)) => Err(Error::StructuralConflict {
            path: path.clone(),
            reason: "name segment addresses a sequence",
        }),
        _ => Err(Error::StructuralConflict {
            path: path.clone(),
            reason: "scalar value where a container is required",
        }),
    }
}

/// Segments prepended to every relative write.
///
/// Entering a scope puts its segments in front of the current stack, so the
/// most recently entered scope becomes the outermost path component.
#[derive(Debug, Clone, Default)]
pub struct PrefixStack {
    current: Vec<Segment>,
    saved: Vec<Vec<Segment>>,
}

impl PrefixStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &[Segment] {
        &self.current
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn enter(&mut self, prefix: &KeyPath) {
        let mut next = prefix.segments().to_vec();
        next.extend(self.current.iter().cloned());
        self.saved.push(std::mem::replace(&mut self.current, next));
    }

    /// Restores the stack as it was before the matching [`enter`](Self::enter).
    /// Returns false if no scope is open.
    pub fn exit(&mut self) -> bool {
        match self.saved.pop() {
            Some(previous) => {
                self.current = previous;
                true
            }
            None => false,
        }
    }

    pub fn resolve(&self, path: &KeyPath) -> KeyPath {
        let mut segments = self.current.clone();
        segments.extend(path.segments().iter().cloned());
        KeyPath(segments)
    }
}

/// Append-only mirror of every save, readable if the run crashes.
#[derive(Debug)]
pub struct DebugLog {
    file: File,
    path: PathBuf,
}

impl DebugLog {
    pub fn create(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let name = format!("debuglog-{}.txt", Utc::now().format("%Y-%m-%d-%H-%M-%S-%6f"));
        let path = dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, path: &KeyPath, value: &Value) -> io::Result<()> {
        writeln!(self.file, "Saved {path} ||| {value}")?;
        self.file.flush()
    }
}

/// Data store, prefix stack and debug log bundled behind one `save`.
#[derive(Debug, Default)]
pub struct Recorder {
    store: DataStore,
    prefix: PrefixStack,
    debug_log: Option<DebugLog>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug_log(dir: &Path) -> Result<Self> {
        let log = DebugLog::create(dir)?;
        debug!("Debug log at {}", log.path().display());
        Ok(Self {
            debug_log: Some(log),
            ..Self::default()
        })
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DataStore {
        &mut self.store
    }

    pub fn into_store(self) -> DataStore {
        self.store
    }

    pub fn prefix(&self) -> &PrefixStack {
        &self.prefix
    }

    pub fn debug_log_path(&self) -> Option<&Path> {
        self.debug_log.as_ref().map(DebugLog::path)
    }

    pub fn enter_scope(&mut self, prefix: impl Into<KeyPath>) {
        self.prefix.enter(&prefix.into());
    }

    pub fn exit_scope(&mut self) -> bool {
        self.prefix.exit()
    }

    /// Saves `value` at `prefix ++ path`.
    pub fn save(&mut self, path: impl Into<KeyPath>, value: impl Into<Value>) -> Result<()> {
        let resolved = self.prefix.resolve(&path.into());
        let value = value.into();
        let logged = self.debug_log.as_ref().map(|_| value.clone());

        if !self.store.insert(&resolved, value)? {
            debug!("Ignoring repeated save to {resolved}");
        }

        if let (Some(log), Some(value)) = (self.debug_log.as_mut(), logged) {
            if let Err(e) = log.append(&resolved, &value) {
                warn!("{}", Error::DebugLog(e));
            }
        }
        Ok(())
    }

    pub fn get(&self, path: impl Into<KeyPath>) -> Option<&Value> {
        self.store.get(&path.into())
    }
}
