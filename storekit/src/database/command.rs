use redis::cluster_routing::get_slot;
use redis::{Cmd, Value};
use std::time::Duration;

use crate::errors::StoreError;

/// Per-command outcome of a flushed pipeline, in submission order.
pub type PipelineReplies = Vec<Result<Value, StoreError>>;

/// Key-value commands the handler issues, as plain data.
///
/// Rendering to [`redis::Cmd`] happens in one place so single commands and
/// pipelines speak the same wire form on both topologies.
#[derive(Debug, Clone, PartialEq)]
pub enum KvCommand {
    Set {
        key: String,
        value: String,
        expiry: Option<Duration>,
    },
    Get {
        key: String,
    },
    HashSet {
        key: String,
        pairs: Vec<(String, String)>,
    },
    HashGet {
        key: String,
        field: String,
    },
    HashMultiSet {
        key: String,
        pairs: Vec<(String, String)>,
    },
    HashMultiGet {
        key: String,
        fields: Vec<String>,
    },
    HashDelete {
        key: String,
        fields: Vec<String>,
    },
    HashLength {
        key: String,
    },
    ListRange {
        key: String,
        start: isize,
        stop: isize,
    },
    ListTrim {
        key: String,
        start: isize,
        stop: isize,
    },
    ListPrepend {
        key: String,
        value: String,
    },
    FilterAdd {
        key: String,
        value: String,
    },
    FilterExists {
        key: String,
        value: String,
    },
}

impl KvCommand {
    pub fn name(&self) -> &'static str {
        match self {
            KvCommand::Set { .. } => "SET",
            KvCommand::Get { .. } => "GET",
            KvCommand::HashSet { .. } => "HSET",
            KvCommand::HashGet { .. } => "HGET",
            KvCommand::HashMultiSet { .. } => "HMSET",
            KvCommand::HashMultiGet { .. } => "HMGET",
            KvCommand::HashDelete { .. } => "HDEL",
            KvCommand::HashLength { .. } => "HLEN",
            KvCommand::ListRange { .. } => "LRANGE",
            KvCommand::ListTrim { .. } => "LTRIM",
            KvCommand::ListPrepend { .. } => "LPUSH",
            KvCommand::FilterAdd { .. } => "BF.ADD",
            KvCommand::FilterExists { .. } => "BF.EXISTS",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            KvCommand::Set { key, .. }
            | KvCommand::Get { key }
            | KvCommand::HashSet { key, .. }
            | KvCommand::HashGet { key, .. }
            | KvCommand::HashMultiSet { key, .. }
            | KvCommand::HashMultiGet { key, .. }
            | KvCommand::HashDelete { key, .. }
            | KvCommand::HashLength { key }
            | KvCommand::ListRange { key, .. }
            | KvCommand::ListTrim { key, .. }
            | KvCommand::ListPrepend { key, .. }
            | KvCommand::FilterAdd { key, .. }
            | KvCommand::FilterExists { key, .. } => key,
        }
    }

    /// Cluster hash slot of the command's key (hash tags honoured).
    pub fn slot(&self) -> u16 {
        get_slot(self.key().as_bytes())
    }

    pub fn to_cmd(&self) -> Cmd {
        let mut cmd = redis::cmd(self.name());
        match self {
            KvCommand::Set { key, value, expiry } => {
                cmd.arg(key).arg(value);
                match expiry {
                    Some(ttl) if ttl.subsec_millis() == 0 && ttl.as_secs() > 0 => {
                        cmd.arg("EX").arg(ttl.as_secs());
                    }
                    Some(ttl) if !ttl.is_zero() => {
                        // Sub-millisecond remainders round up so the key still expires.
                        cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
                    }
                    _ => {}
                }
            }
            KvCommand::Get { key } | KvCommand::HashLength { key } => {
                cmd.arg(key);
            }
            KvCommand::HashSet { key, pairs } | KvCommand::HashMultiSet { key, pairs } => {
                cmd.arg(key);
                for (field, value) in pairs {
                    cmd.arg(field).arg(value);
                }
            }
            KvCommand::HashGet { key, field } => {
                cmd.arg(key).arg(field);
            }
            KvCommand::HashMultiGet { key, fields } | KvCommand::HashDelete { key, fields } => {
                cmd.arg(key).arg(fields);
            }
            KvCommand::ListRange { key, start, stop } | KvCommand::ListTrim { key, start, stop } => {
                cmd.arg(key).arg(*start).arg(*stop);
            }
            KvCommand::ListPrepend { key, value }
            | KvCommand::FilterAdd { key, value }
            | KvCommand::FilterExists { key, value } => {
                cmd.arg(key).arg(value);
            }
        }
        cmd
    }
}

/// Deferred batch of commands flushed in one round trip.
///
/// Results come back in submission order.
#[derive(Debug, Clone, Default)]
pub struct KvPipeline {
    commands: Vec<KvCommand>,
}

impl KvPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[KvCommand] {
        &self.commands
    }

    pub fn add(&mut self, command: KvCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn set(&mut self, key: &str, value: &str, expiry: Option<Duration>) -> &mut Self {
        self.add(KvCommand::Set {
            key: key.to_string(),
            value: value.to_string(),
            expiry,
        })
    }

    pub fn get(&mut self, key: &str) -> &mut Self {
        self.add(KvCommand::Get { key: key.to_string() })
    }

    pub fn hash_set(&mut self, key: &str, pairs: &[(&str, &str)]) -> &mut Self {
        self.add(KvCommand::HashSet {
            key: key.to_string(),
            pairs: owned_pairs(pairs),
        })
    }

    pub fn hash_get(&mut self, key: &str, field: &str) -> &mut Self {
        self.add(KvCommand::HashGet {
            key: key.to_string(),
            field: field.to_string(),
        })
    }

    pub fn hash_delete(&mut self, key: &str, fields: &[&str]) -> &mut Self {
        self.add(KvCommand::HashDelete {
            key: key.to_string(),
            fields: owned_fields(fields),
        })
    }

    pub fn list_prepend(&mut self, key: &str, value: &str) -> &mut Self {
        self.add(KvCommand::ListPrepend {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn filter_add(&mut self, key: &str, value: &str) -> &mut Self {
        self.add(KvCommand::FilterAdd {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

pub(crate) fn pack_pipeline(commands: &[KvCommand]) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    for command in commands {
        pipe.add_command(command.to_cmd());
    }
    pipe
}

/// Command indices grouped by hash slot, groups in order of first appearance.
///
/// A cluster only accepts a pipeline whose keys share one slot, so a mixed
/// pipeline is flushed as one sub-pipeline per group.
pub(crate) fn slot_batches(commands: &[KvCommand]) -> Vec<Vec<usize>> {
    let mut batches: Vec<(u16, Vec<usize>)> = Vec::new();
    for (index, command) in commands.iter().enumerate() {
        let slot = command.slot();
        match batches.iter_mut().find(|(s, _)| *s == slot) {
            Some((_, batch)) => batch.push(index),
            None => batches.push((slot, vec![index])),
        }
    }
    batches.into_iter().map(|(_, batch)| batch).collect()
}

pub(crate) fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
}

pub(crate) fn owned_fields(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|field| field.to_string()).collect()
}
