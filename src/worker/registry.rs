// src/worker/registry.rs

//! Named callables a worker can execute.
//!
//! Closures cannot cross a process boundary, so a [`Task`] refers to its
//! function by name. Both the coordinator and the worker run the same
//! binary; the worker looks the name up here and decodes the JSON arguments
//! into the callable's own argument type.
//!
//! [`Task`]: super::protocol::Task

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::context::TaskContext;

/// Designated non-fatal error kind for initializer and finalizer hooks.
///
/// Returning (or wrapping) this from a hook makes the worker report the
/// message and carry on; any other hook error is fatal to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A task's return value, encoded only when the result envelope is built.
///
/// Keeping encoding late lets the worker substitute a transport-failure
/// envelope when a value cannot be represented on the wire.
pub trait TaskValue: Send {
    fn encode(&self) -> serde_json::Result<Value>;
    fn describe(&self) -> String;
}

impl<T> TaskValue for T
where
    T: Serialize + fmt::Debug + Send,
{
    fn encode(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

pub type TaskFn =
    Arc<dyn Fn(Value, &TaskContext) -> anyhow::Result<Box<dyn TaskValue>> + Send + Sync>;
pub type HookFn = Arc<dyn Fn(Value) -> anyhow::Result<()> + Send + Sync>;

/// Table of task functions and hooks available inside a worker.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskFn>,
    hooks: HashMap<String, HookFn>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tasks: Vec<_> = self.tasks.keys().collect();
        tasks.sort();
        let mut hooks: Vec<_> = self.hooks.keys().collect();
        hooks.sort();
        f.debug_struct("TaskRegistry")
            .field("tasks", &tasks)
            .field("hooks", &hooks)
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed task function under `name`.
    pub fn register<A, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: DeserializeOwned,
        R: Serialize + fmt::Debug + Send + 'static,
        F: Fn(A, &TaskContext) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let fn_name = name.to_string();
        let task: TaskFn = Arc::new(
            move |args: Value, ctx: &TaskContext| -> anyhow::Result<Box<dyn TaskValue>> {
                let args: A = serde_json::from_value(args).with_context(|| {
                    format!("decoding arguments for task function `{fn_name}`")
                })?;
                let value = f(args, ctx)?;
                Ok(Box::new(value))
            },
        );
        self.tasks.insert(name.to_string(), task);
        self
    }

    /// Register a typed initializer/finalizer hook under `name`.
    pub fn register_hook<A, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: DeserializeOwned,
        F: Fn(A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let fn_name = name.to_string();
        let hook: HookFn = Arc::new(move |args: Value| -> anyhow::Result<()> {
            let args: A = serde_json::from_value(args)
                .with_context(|| format!("decoding arguments for hook `{fn_name}`"))?;
            f(args)
        });
        self.hooks.insert(name.to_string(), hook);
        self
    }

    pub fn task(&self, name: &str) -> Option<TaskFn> {
        self.tasks.get(name).cloned()
    }

    pub fn hook(&self, name: &str) -> Option<HookFn> {
        self.hooks.get(name).cloned()
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }
}
