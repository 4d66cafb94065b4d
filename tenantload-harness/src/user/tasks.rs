//! Tasks and weighted task tables.

use async_trait::async_trait;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tenantload_core::{Error, Result};
use tracing::debug;

use super::session::UserSession;
use crate::timing::OperationDescriptor;

/// Operation recorded for `read-row`.
pub const READ_ROW: OperationDescriptor = OperationDescriptor::new("select", "read_row");

/// Operation recorded for `insert-row`.
pub const INSERT_ROW: OperationDescriptor = OperationDescriptor::new("insert", "insert_row");

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Work a virtual user can perform in one iteration
#[async_trait]
pub trait TaskAction: Send + Sync + fmt::Debug {
    /// Perform the task on the user's session.
    ///
    /// # Errors
    /// Any error is logged and counted by the user; the loop continues.
    async fn run(&self, session: &mut UserSession) -> Result<()>;
}

/// A named, weighted task
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    /// Task name used in logs
    pub name: Cow<'static, str>,
    /// Relative selection weight
    pub weight: u32,
    /// What the task does
    pub action: Arc<dyn TaskAction>,
}

impl TaskDescriptor {
    /// Create a task descriptor.
    pub fn new(name: impl Into<Cow<'static, str>>, weight: u32, action: impl TaskAction + 'static) -> Self {
        Self { name: name.into(), weight, action: Arc::new(action) }
    }
}

/// Ordered tasks with weighted random selection
#[derive(Debug, Clone)]
pub struct TaskTable {
    tasks: Vec<TaskDescriptor>,
    index: WeightedIndex<u32>,
}

impl TaskTable {
    /// Build a table.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an empty table or a zero weight.
    pub fn new(tasks: Vec<TaskDescriptor>) -> Result<Self> {
        if tasks.is_empty() {
            return Err(Error::configuration("Task table must contain at least one task"));
        }
        if let Some(task) = tasks.iter().find(|task| task.weight == 0) {
            return Err(Error::configuration(format!("Task {} has zero weight", task.name)));
        }
        let index = WeightedIndex::new(tasks.iter().map(|task| task.weight))
            .map_err(|e| Error::configuration(format!("Invalid task weights: {e}")))?;
        Ok(Self { tasks, index })
    }

    /// Draw a task with probability weight / sum of weights.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &TaskDescriptor {
        &self.tasks[self.index.sample(rng)]
    }

    /// Tasks in declaration order.
    #[must_use]
    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.tasks.iter().map(|task| u64::from(task.weight)).sum()
    }
}

/// Does nothing; the user just holds its connection
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

#[async_trait]
impl TaskAction for Noop {
    async fn run(&self, _session: &mut UserSession) -> Result<()> {
        Ok(())
    }
}

/// `SELECT count(*)` from a random resource of the bound tenant
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadRow;

#[async_trait]
impl TaskAction for ReadRow {
    async fn run(&self, session: &mut UserSession) -> Result<()> {
        let table = session.random_resource_name()?;
        let statement = format!("SELECT count(*) FROM {table}");
        let rows = session.query_scalar(&READ_ROW, &statement).await?;
        debug!("{} selected {} rows from {}", session.user_id(), rows, table);
        Ok(())
    }
}

/// Insert one random row into a random resource of the bound tenant
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertRow;

#[async_trait]
impl TaskAction for InsertRow {
    async fn run(&self, session: &mut UserSession) -> Result<()> {
        let table = session.random_resource_name()?;
        let rng = session.rng();
        let v1 = random_string(rng, 40);
        let v2: u32 = rng.gen_range(0..1_000);
        let v3 = random_string(rng, 100);
        let statement = format!("INSERT INTO {table} (v1, v2, v3) VALUES ('{v1}', {v2}, '{v3}')");
        session.execute(&INSERT_ROW, &statement).await?;
        debug!("{} inserted a row into {}", session.user_id(), table);
        Ok(())
    }
}

/// Move to another random tenant
///
/// With a single tenant and an open connection there is nowhere to move,
/// so the current connection is kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct SwitchTenant;

#[async_trait]
impl TaskAction for SwitchTenant {
    async fn run(&self, session: &mut UserSession) -> Result<()> {
        if session.is_connected() && session.context().tenant_count() == 1 {
            return Ok(());
        }
        session.connect_random().await
    }
}

fn random_string<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_empty_table_rejected() {
        assert!(matches!(TaskTable::new(Vec::new()), Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_zero_weight_rejected() {
        let tasks = vec![TaskDescriptor::new("read", 5, ReadRow), TaskDescriptor::new("noop", 0, Noop)];
        let err = TaskTable::new(tasks).unwrap_err();
        assert!(err.to_string().contains("noop"));
    }

    #[test]
    fn test_single_task_always_chosen() {
        let table = TaskTable::new(vec![TaskDescriptor::new("noop", 1, Noop)]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(table.choose(&mut rng).name, "noop");
        }
    }

    #[test]
    fn test_random_string_alphabet() {
        let mut rng = StdRng::seed_from_u64(9);
        let value = random_string(&mut rng, 40);
        assert_eq!(value.len(), 40);
        assert!(value.bytes().all(|b| b.is_ascii_lowercase()));
    }
}
