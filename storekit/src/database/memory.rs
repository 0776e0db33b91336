//! In-memory stand-ins for both stores, used by the handler tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::Value;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::command::{KvCommand, PipelineReplies};
use super::connection::{AnalyticsConnection, AnalyticsTransaction};
use super::factory::{KvBackend, Topology};
use super::query_builder::InsertStatement;
use crate::errors::{StoreError, TxStage};
use crate::types::{BoundRow, ColumnValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Ping,
    Begin,
    PrepareReturnsNothing,
    /// Fail the exec call for the row at this index.
    ExecRow(usize),
    Commit,
    Rollback,
    Query,
    /// Never answer queries.
    Stall,
}

#[derive(Default)]
struct AnalyticsState {
    tables: HashMap<String, Vec<BoundRow>>,
    faults: Vec<Fault>,
    transactions_opened: usize,
    rollbacks: usize,
}

#[derive(Clone, Default)]
pub struct MemoryAnalytics {
    state: Arc<Mutex<AnalyticsState>>,
}

impl MemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    pub fn committed_rows(&self, table: &str) -> Vec<BoundRow> {
        self.state.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn transactions_opened(&self) -> usize {
        self.state.lock().transactions_opened
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }

    fn has(&self, fault: Fault) -> bool {
        self.state.lock().faults.contains(&fault)
    }
}

/// Table name following `keyword` (`FROM`, `INTO`), e.g. `group.user_geo`.
fn table_after(sql: &str, keyword: &str) -> Option<String> {
    let upper = sql.to_ascii_uppercase();
    let at = upper.find(&format!("{} ", keyword))? + keyword.len();
    sql[at..]
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl AnalyticsConnection for MemoryAnalytics {
    type Transaction = MemoryTransaction;

    async fn ping(&self) -> Result<(), StoreError> {
        if self.has(Fault::Ping) {
            return Err(StoreError::ConnectionError("connection refused".to_string()));
        }
        Ok(())
    }

    async fn fetch_all<T>(&self, query: &str) -> Result<Vec<T>, StoreError>
    where
        T: clickhouse::Row + DeserializeOwned + Send + 'static,
    {
        if self.has(Fault::Stall) {
            tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        }
        if self.has(Fault::Query) {
            return Err(StoreError::QueryError("Code: 60. Unknown table".to_string()));
        }

        let table = table_after(query, "FROM")
            .ok_or_else(|| StoreError::QueryError(format!("no table in query: {}", query)))?;
        self.committed_rows(&table)
            .into_iter()
            .map(|row| {
                let json = serde_json::to_value(&row)
                    .map_err(|e| StoreError::QueryError(e.to_string()))?;
                serde_json::from_value(json).map_err(|e| StoreError::QueryError(e.to_string()))
            })
            .collect()
    }

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        let mut state = self.state.lock();
        state.transactions_opened += 1;
        if state.faults.contains(&Fault::Begin) {
            return Err(StoreError::transaction(TxStage::Begin, "too many open transactions"));
        }
        Ok(MemoryTransaction {
            store: self.clone(),
            table: String::new(),
            pending: Vec::new(),
            executed: 0,
        })
    }
}

pub struct MemoryTransaction {
    store: MemoryAnalytics,
    table: String,
    pending: Vec<BoundRow>,
    executed: usize,
}

#[async_trait]
impl AnalyticsTransaction for MemoryTransaction {
    async fn prepare(&mut self, query: &str) -> Result<Option<InsertStatement>, StoreError> {
        if self.store.has(Fault::PrepareReturnsNothing) {
            return Ok(None);
        }
        let statement = InsertStatement::parse(query)?;
        self.table = table_after(query, "INTO").unwrap_or_default();
        Ok(statement)
    }

    async fn exec(
        &mut self,
        statement: &InsertStatement,
        params: &[ColumnValue],
    ) -> Result<(), StoreError> {
        let index = self.executed;
        self.executed += 1;
        if self.store.has(Fault::ExecRow(index)) {
            return Err(StoreError::transaction(
                TxStage::Exec,
                format!("type mismatch in row {}", index),
            ));
        }
        statement.check_arity(params)?;
        self.pending.push(params.to_vec());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self.store.state.lock();
        if state.faults.contains(&Fault::Commit) {
            return Err(StoreError::transaction(TxStage::Commit, "connection reset"));
        }
        state.tables.entry(self.table).or_default().extend(self.pending);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        let mut state = self.store.state.lock();
        state.rollbacks += 1;
        if state.faults.contains(&Fault::Rollback) {
            return Err(StoreError::transaction(TxStage::Exec, "rollback on closed connection"));
        }
        Ok(())
    }
}

enum Data {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Bloom(HashSet<String>),
}

struct Entry {
    data: Data,
    expires_at: Option<Instant>,
}

/// Key-value store held in process memory, with the reply shapes Redis uses.
pub struct MemoryKv {
    topology: Topology,
    entries: Mutex<HashMap<String, Entry>>,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl MemoryKv {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            entries: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Make every call fail as if the store were unreachable.
    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionError("connection refused".to_string()));
        }
        Ok(())
    }

    fn apply(&self, command: &KvCommand) -> Result<Value, StoreError> {
        let mut entries = self.entries.lock();
        let key = command.key().to_string();
        if let Some(expires_at) = entries.get(&key).and_then(|entry| entry.expires_at) {
            if expires_at <= Instant::now() {
                entries.remove(&key);
            }
        }

        match command {
            KvCommand::Set { value, expiry, .. } => {
                let expires_at = expiry.map(|ttl| Instant::now() + ttl);
                entries.insert(key, Entry { data: Data::Str(value.clone()), expires_at });
                Ok(Value::Okay)
            }
            KvCommand::Get { .. } => match entries.get(&key).map(|e| &e.data) {
                None => Ok(Value::Nil),
                Some(Data::Str(s)) => Ok(bulk(s)),
                Some(_) => Err(wrong_type()),
            },
            KvCommand::HashSet { pairs, .. } | KvCommand::HashMultiSet { pairs, .. } => {
                let hash = hash_mut(&mut entries, key)?;
                let added = pairs
                    .iter()
                    .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
                    .count();
                if matches!(command, KvCommand::HashSet { .. }) {
                    Ok(Value::Int(added as i64))
                } else {
                    Ok(Value::Okay)
                }
            }
            KvCommand::HashGet { field, .. } => match entries.get(&key).map(|e| &e.data) {
                None => Ok(Value::Nil),
                Some(Data::Hash(hash)) => Ok(hash.get(field).map_or(Value::Nil, |v| bulk(v))),
                Some(_) => Err(wrong_type()),
            },
            KvCommand::HashMultiGet { fields, .. } => match entries.get(&key).map(|e| &e.data) {
                None => Ok(Value::Array(vec![Value::Nil; fields.len()])),
                Some(Data::Hash(hash)) => Ok(Value::Array(
                    fields
                        .iter()
                        .map(|field| hash.get(field).map_or(Value::Nil, |v| bulk(v)))
                        .collect(),
                )),
                Some(_) => Err(wrong_type()),
            },
            KvCommand::HashDelete { fields, .. } => {
                let removed = match entries.get_mut(&key).map(|e| &mut e.data) {
                    None => 0,
                    Some(Data::Hash(hash)) => {
                        fields.iter().filter(|field| hash.remove(*field).is_some()).count()
                    }
                    Some(_) => return Err(wrong_type()),
                };
                remove_if_empty(&mut entries, &key);
                Ok(Value::Int(removed as i64))
            }
            KvCommand::HashLength { .. } => match entries.get(&key).map(|e| &e.data) {
                None => Ok(Value::Int(0)),
                Some(Data::Hash(hash)) => Ok(Value::Int(hash.len() as i64)),
                Some(_) => Err(wrong_type()),
            },
            KvCommand::ListRange { start, stop, .. } => match entries.get(&key).map(|e| &e.data) {
                None => Ok(Value::Array(Vec::new())),
                Some(Data::List(list)) => {
                    let items = match range_bounds(list.len(), *start, *stop) {
                        Some((from, to)) => list.range(from..=to).map(|v| bulk(v)).collect(),
                        None => Vec::new(),
                    };
                    Ok(Value::Array(items))
                }
                Some(_) => Err(wrong_type()),
            },
            KvCommand::ListTrim { start, stop, .. } => {
                match entries.get_mut(&key).map(|e| &mut e.data) {
                    None => {}
                    Some(Data::List(list)) => {
                        *list = match range_bounds(list.len(), *start, *stop) {
                            Some((from, to)) => list.range(from..=to).cloned().collect(),
                            None => VecDeque::new(),
                        };
                    }
                    Some(_) => return Err(wrong_type()),
                }
                remove_if_empty(&mut entries, &key);
                Ok(Value::Okay)
            }
            KvCommand::ListPrepend { value, .. } => {
                let entry = entries.entry(key).or_insert_with(|| Entry {
                    data: Data::List(VecDeque::new()),
                    expires_at: None,
                });
                match &mut entry.data {
                    Data::List(list) => {
                        list.push_front(value.clone());
                        Ok(Value::Int(list.len() as i64))
                    }
                    _ => Err(wrong_type()),
                }
            }
            KvCommand::FilterAdd { value, .. } => {
                let entry = entries.entry(key).or_insert_with(|| Entry {
                    data: Data::Bloom(HashSet::new()),
                    expires_at: None,
                });
                match &mut entry.data {
                    Data::Bloom(set) => Ok(Value::Int(set.insert(value.clone()) as i64)),
                    _ => Err(wrong_type()),
                }
            }
            KvCommand::FilterExists { value, .. } => match entries.get(&key).map(|e| &e.data) {
                None => Ok(Value::Int(0)),
                Some(Data::Bloom(set)) => Ok(Value::Int(set.contains(value) as i64)),
                Some(_) => Err(wrong_type()),
            },
        }
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn execute(&self, command: &KvCommand) -> Result<Value, StoreError> {
        self.check()?;
        self.apply(command)
    }

    async fn execute_pipeline(&self, commands: &[KvCommand]) -> Result<PipelineReplies, StoreError> {
        self.check()?;
        if self.topology == Topology::Cluster {
            if let Some(first) = commands.first() {
                if commands.iter().any(|command| command.slot() != first.slot()) {
                    return Err(StoreError::CommandError(
                        "CROSSSLOT Keys in request don't hash to the same slot".to_string(),
                    ));
                }
            }
        }
        // Like a server, later commands still run after a failing one.
        Ok(commands.iter().map(|command| self.apply(command)).collect())
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn topology(&self) -> Topology {
        self.topology
    }
}

fn bulk(value: &str) -> Value {
    Value::BulkString(value.as_bytes().to_vec())
}

fn wrong_type() -> StoreError {
    StoreError::CommandError(
        "WRONGTYPE: Operation against a key holding the wrong kind of value".to_string(),
    )
}

fn hash_mut(
    entries: &mut HashMap<String, Entry>,
    key: String,
) -> Result<&mut HashMap<String, String>, StoreError> {
    let entry = entries.entry(key).or_insert_with(|| Entry {
        data: Data::Hash(HashMap::new()),
        expires_at: None,
    });
    match &mut entry.data {
        Data::Hash(hash) => Ok(hash),
        _ => Err(wrong_type()),
    }
}

fn remove_if_empty(entries: &mut HashMap<String, Entry>, key: &str) {
    let empty = match entries.get(key).map(|e| &e.data) {
        Some(Data::Hash(hash)) => hash.is_empty(),
        Some(Data::List(list)) => list.is_empty(),
        _ => false,
    };
    if empty {
        entries.remove(key);
    }
}

/// Inclusive index range with Redis' negative-index and clamping rules.
fn range_bounds(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds() {
        assert_eq!(range_bounds(3, 0, -1), Some((0, 2)));
        assert_eq!(range_bounds(3, -2, 10), Some((1, 2)));
        assert_eq!(range_bounds(3, -1, 0), None);
        assert_eq!(range_bounds(1, -1, 0), Some((0, 0)));
        assert_eq!(range_bounds(1, 1, 0), None);
        assert_eq!(range_bounds(0, 0, -1), None);
    }

    #[tokio::test]
    async fn test_cluster_pipeline_rejects_mixed_slots() {
        let kv = MemoryKv::new(Topology::Cluster);
        let mixed = vec![
            KvCommand::Get { key: "conf:p1".to_string() },
            KvCommand::Get { key: "conf:hash".to_string() },
        ];
        assert!(matches!(
            kv.execute_pipeline(&mixed).await,
            Err(StoreError::CommandError(ref m)) if m.starts_with("CROSSSLOT")
        ));
        assert_eq!(kv.execute_pipeline(&mixed[..1]).await.unwrap().len(), 1);

        let single = MemoryKv::new(Topology::Single);
        assert_eq!(single.execute_pipeline(&mixed).await.unwrap().len(), 2);
    }

    #[test]
    fn test_table_after_keyword() {
        assert_eq!(
            table_after("INSERT INTO group.user_geo (id) VALUES (?)", "INTO").as_deref(),
            Some("group.user_geo")
        );
        assert_eq!(table_after("select * from db.t where x", "FROM").as_deref(), Some("db.t"));
    }
}
