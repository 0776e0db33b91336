use redis::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, Span};

use super::command::{owned_fields, owned_pairs, slot_batches, KvCommand, KvPipeline, PipelineReplies};
use super::factory::{KvBackend, RedisFactory, Topology};
use crate::config::RedisConfig;
use crate::errors::StoreError;
use crate::metrics;

const BACKEND: &str = "redis";

/// Handler over a single-node or clustered key-value store.
///
/// The topology is fixed at construction. Failures are logged and reported
/// as `false`/`None`; a missing key or field is not a failure.
pub struct RedisHandler {
    config: RedisConfig,
    backend: Arc<dyn KvBackend>,
    span: Span,
}

impl RedisHandler {
    /// Connect and ping; a handler only exists once the store answered.
    pub async fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let backend = RedisFactory::create(config).await?;
        Self::with_backend(config, backend).await
    }

    pub async fn with_backend(
        config: &RedisConfig,
        backend: Arc<dyn KvBackend>,
    ) -> Result<Self, StoreError> {
        let topology = backend.topology();
        let span = info_span!("redis", mode = %topology);

        if let Err(e) = backend.ping().await {
            error!(parent: &span, "Redis connection failed ({} mode): {}", topology, e);
            return Err(e);
        }
        info!(parent: &span, "Redis connected, mode: {}", topology);
        metrics::handler_connected(BACKEND);

        Ok(Self {
            config: config.clone(),
            backend,
            span,
        })
    }

    /// Route this handler's log events through a caller-supplied span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn topology(&self) -> Topology {
        self.backend.topology()
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Store `value`; `Duration::ZERO` means no expiry.
    pub async fn set(&self, key: &str, value: &str, expiry: Duration) -> bool {
        let expiry = (!expiry.is_zero()).then_some(expiry);
        self.observe("SET", key, self.backend.set(key, value, expiry))
            .await
            .is_some()
    }

    /// `Some("")` when the key is absent; `None` only on failure.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.observe("GET", key, self.backend.get(key))
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn hash_set(&self, key: &str, pairs: &[(&str, &str)]) -> bool {
        self.observe("HSET", key, self.backend.hset(key, owned_pairs(pairs)))
            .await
            .is_some()
    }

    /// `Some("")` when the field is absent; `None` only on failure.
    pub async fn hash_get(&self, key: &str, field: &str) -> Option<String> {
        self.observe("HGET", key, self.backend.hget(key, field))
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn hash_multi_set(&self, key: &str, pairs: &[(&str, &str)]) -> bool {
        self.observe("HMSET", key, self.backend.hmset(key, owned_pairs(pairs)))
            .await
            .is_some()
    }

    /// One entry per requested field, in request order; unset fields are `None`.
    pub async fn hash_multi_get(&self, key: &str, fields: &[&str]) -> Option<Vec<Option<String>>> {
        self.observe("HMGET", key, self.backend.hmget(key, owned_fields(fields)))
            .await
    }

    pub async fn hash_delete(&self, key: &str, fields: &[&str]) -> bool {
        self.observe("HDEL", key, self.backend.hdel(key, owned_fields(fields)))
            .await
            .is_some()
    }

    pub async fn hash_length(&self, key: &str) -> Option<i64> {
        self.observe("HLEN", key, self.backend.hlen(key)).await
    }

    pub async fn list_range(&self, key: &str, start: isize, stop: isize) -> Option<Vec<String>> {
        self.observe("LRANGE", key, self.backend.lrange(key, start, stop))
            .await
    }

    /// Empty the list by trimming it to a range that is empty at any length.
    pub async fn list_clear(&self, key: &str) -> bool {
        self.observe("LTRIM", key, self.backend.ltrim(key, 1, 0))
            .await
            .is_some()
    }

    pub async fn list_prepend(&self, key: &str, value: &str) -> bool {
        self.observe("LPUSH", key, self.backend.lpush(key, value))
            .await
            .is_some()
    }

    /// `Some(true)` when the value was not in the filter yet.
    pub async fn filter_add(&self, key: &str, value: &str) -> Option<bool> {
        self.observe("BF.ADD", key, self.backend.bf_add(key, value)).await
    }

    pub async fn filter_exists(&self, key: &str, value: &str) -> bool {
        self.observe("BF.EXISTS", key, self.backend.bf_exists(key, value))
            .await
            .unwrap_or(false)
    }

    pub fn pipeline(&self) -> KvPipeline {
        KvPipeline::new()
    }

    /// Flush the pipeline; one outcome per command, in submission order.
    ///
    /// A failing command does not hide the replies of the others. The outer
    /// error means the pipeline could not be sent.
    pub async fn pipeline_execute(&self, pipeline: &KvPipeline) -> Result<PipelineReplies, StoreError> {
        let start = Instant::now();
        let result = self.flush(pipeline.commands()).await;
        match &result {
            Ok(replies) => {
                for (command, reply) in pipeline.commands().iter().zip(replies) {
                    if let Err(e) = reply {
                        error!(
                            parent: &self.span,
                            "Redis {} failed for key {} in pipeline ({} mode): {}",
                            command.name(),
                            command.key(),
                            self.topology(),
                            e
                        );
                    }
                }
            }
            Err(e) => error!(
                parent: &self.span,
                "Redis pipeline of {} commands failed: {}",
                pipeline.len(),
                e
            ),
        }
        let succeeded = matches!(&result, Ok(replies) if replies.iter().all(Result::is_ok));
        metrics::record_operation("PIPELINE", BACKEND, succeeded, start.elapsed().as_secs_f64());
        result
    }

    /// A cluster takes one sub-pipeline per hash slot; replies are put back in submission order.
    async fn flush(&self, commands: &[KvCommand]) -> Result<PipelineReplies, StoreError> {
        let batches = slot_batches(commands);
        if self.topology() == Topology::Single || batches.len() <= 1 {
            return self.backend.execute_pipeline(commands).await;
        }

        let mut slots: Vec<Option<Result<Value, StoreError>>> =
            std::iter::repeat_with(|| None).take(commands.len()).collect();
        for batch in batches {
            let group: Vec<KvCommand> = batch.iter().map(|&index| commands[index].clone()).collect();
            let replies = self.backend.execute_pipeline(&group).await?;
            for (index, reply) in batch.into_iter().zip(replies) {
                slots[index] = Some(reply);
            }
        }
        Ok(slots
            .into_iter()
            .map(|reply| {
                reply.unwrap_or_else(|| {
                    Err(StoreError::CommandError("no reply for pipelined command".to_string()))
                })
            })
            .collect())
    }

    /// Close the live client; every later call fails.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let result = self.backend.shutdown().await;
        match result {
            Ok(()) => {
                info!(parent: &self.span, "Redis handler closed");
                metrics::handler_released(BACKEND);
            }
            Err(ref e) => error!(parent: &self.span, "Redis shutdown failed: {}", e),
        }
        result
    }

    async fn observe<T>(
        &self,
        command: &str,
        key: &str,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Option<T> {
        let start = Instant::now();
        let result = operation.await;
        metrics::record_operation(command, BACKEND, result.is_ok(), start.elapsed().as_secs_f64());
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!(
                    parent: &self.span,
                    "Redis {} failed for key {} ({} mode): {}",
                    command,
                    key,
                    self.topology(),
                    e
                );
                None
            }
        }
    }
}
