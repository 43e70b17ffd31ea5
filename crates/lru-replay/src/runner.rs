//! Executes replay commands against an LruDict

use std::fmt;
use std::sync::Arc;

use lrudict::{Error, LruDict};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::script::Command;

/// Evicted pairs observed by the callback, oldest first
type EvictionLog = Arc<Mutex<Vec<(String, String)>>>;

/// Result of one command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Value(String),
    Nil,
    Integer(i64),
    Pair(String, String),
    List(Vec<String>),
    Pairs(Vec<(String, String)>),
    Error(String),
}

impl Reply {
    /// Whether the command failed
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    fn from_error(err: Error) -> Self {
        Reply::Error(format!("ERR {}", err))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Value(v) => write!(f, "{:?}", v),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Integer(i) => write!(f, "(integer) {}", i),
            Reply::Pair(k, v) => write!(f, "{:?} => {:?}", k, v),
            Reply::List(items) if items.is_empty() => write!(f, "(empty list)"),
            Reply::List(items) => {
                let lines: Vec<String> = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| format!("{}) {:?}", i + 1, item))
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            Reply::Pairs(items) if items.is_empty() => write!(f, "(empty list)"),
            Reply::Pairs(items) => {
                let lines: Vec<String> = items
                    .iter()
                    .enumerate()
                    .map(|(i, (k, v))| format!("{}) {:?} => {:?}", i + 1, k, v))
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            Reply::Error(e) => write!(f, "(error) {}", e),
        }
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub commands: u64,
    pub errors: u64,
    pub len: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub evictions: u64,
    pub inserts: u64,
    pub callback_failures: u64,
    pub evictions_observed: u64,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "commands:  {} ({} errors)", self.commands, self.errors)?;
        writeln!(f, "entries:   {}/{}", self.len, self.capacity)?;
        writeln!(
            f,
            "hits:      {} / misses: {} (hit ratio {:.2}%)",
            self.hits,
            self.misses,
            self.hit_ratio * 100.0
        )?;
        writeln!(f, "inserts:   {}", self.inserts)?;
        write!(
            f,
            "evictions: {} ({} observed, {} callback failures)",
            self.evictions, self.evictions_observed, self.callback_failures
        )
    }
}

/// Drives a cache from parsed commands
pub struct Runner {
    cache: LruDict<String, String>,
    evicted: Option<EvictionLog>,
    evictions_observed: u64,
    commands: u64,
    errors: u64,
}

impl Runner {
    /// Create a runner over a fresh cache
    ///
    /// # Arguments
    /// * `capacity` - Cache capacity
    /// * `observe_evictions` - Install a callback recording every evicted pair
    pub fn new(capacity: usize, observe_evictions: bool) -> lrudict::Result<Self> {
        let evicted: Option<EvictionLog> = observe_evictions.then(|| Arc::new(Mutex::new(Vec::new())));

        let mut builder = LruDict::builder(capacity);
        if let Some(log) = &evicted {
            let sink = Arc::clone(log);
            builder = builder.on_evict(move |key: String, value: String| {
                sink.lock().push((key, value));
                Ok(())
            });
        }

        Ok(Self {
            cache: builder.build()?,
            evicted,
            evictions_observed: 0,
            commands: 0,
            errors: 0,
        })
    }

    /// Run one command
    pub fn execute(&mut self, command: &Command) -> Reply {
        self.commands += 1;
        debug!(?command, "executing");

        let reply = match command {
            Command::Set { key, value } => {
                self.cache.put(key.clone(), value.clone());
                Reply::Ok
            }
            Command::Get(key) => match self.cache.get(key) {
                Ok(value) => Reply::Value(value),
                Err(Error::NotFound) => Reply::Nil,
                Err(e) => Reply::from_error(e),
            },
            Command::Peek(key) => self.cache.peek(key).map_or(Reply::Nil, Reply::Value),
            Command::Del(key) => match self.cache.delete(key) {
                Ok(_) => Reply::Integer(1),
                Err(Error::NotFound) => Reply::Integer(0),
                Err(e) => Reply::from_error(e),
            },
            Command::Pop { key, default } => match default {
                Some(default) => Reply::Value(self.cache.pop_or(key, default.clone())),
                None => match self.cache.pop(key) {
                    Ok(value) => Reply::Value(value),
                    Err(e) => Reply::from_error(e),
                },
            },
            Command::SetDefault { key, value } => {
                Reply::Value(self.cache.set_default(key.clone(), value.clone()))
            }
            Command::PopItem { least_recent } => match self.cache.pop_item(*least_recent) {
                Ok((k, v)) => Reply::Pair(k, v),
                Err(e) => Reply::from_error(e),
            },
            Command::First => self.cache.peek_first().map_or(Reply::Nil, |(k, v)| Reply::Pair(k, v)),
            Command::Last => self.cache.peek_last().map_or(Reply::Nil, |(k, v)| Reply::Pair(k, v)),
            Command::Has(key) => Reply::Integer(self.cache.contains_key(key) as i64),
            Command::Resize(size) => match self.cache.resize(*size) {
                Ok(()) => Reply::Ok,
                Err(e) => Reply::from_error(e),
            },
            Command::Capacity => Reply::Integer(self.cache.capacity() as i64),
            Command::Len => Reply::Integer(self.cache.len() as i64),
            Command::Clear => {
                self.cache.clear();
                Reply::Ok
            }
            Command::Keys => Reply::List(self.cache.keys().collect()),
            Command::Values => Reply::List(self.cache.values().collect()),
            Command::Items => Reply::Pairs(self.cache.items().collect()),
            Command::Stats => {
                let stats = self.cache.stats();
                Reply::List(vec![
                    format!("hits={}", stats.hits),
                    format!("misses={}", stats.misses),
                    format!("evictions={}", stats.evictions),
                ])
            }
        };

        if reply.is_error() {
            self.errors += 1;
        }
        reply
    }

    /// Take the evictions observed since the last call
    pub fn drain_evictions(&mut self) -> Vec<(String, String)> {
        let drained = match &self.evicted {
            Some(log) => std::mem::take(&mut *log.lock()),
            None => Vec::new(),
        };
        self.evictions_observed += drained.len() as u64;
        drained
    }

    /// Summarize the run
    pub fn report(&self) -> Report {
        let stats = self.cache.stats();
        Report {
            commands: self.commands,
            errors: self.errors,
            len: self.cache.len(),
            capacity: self.cache.capacity(),
            hits: stats.hits,
            misses: stats.misses,
            hit_ratio: stats.hit_ratio(),
            evictions: stats.evictions,
            inserts: stats.inserts,
            callback_failures: stats.callback_failures,
            evictions_observed: self.evictions_observed,
        }
    }
}
