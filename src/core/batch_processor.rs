//! Command execution and user-based partitioning for batch processing
//!
//! This module provides the `BatchProcessor` struct, which runs operator
//! commands against a shared `ReconciliationEngine`, and partitions batches by
//! owning user so that different users' commands run concurrently while each
//! user's commands keep their input order.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     └── ReconciliationEngine  (cloneable, Arc-wrapped stores)
//! ```
//!
//! # Partitioning
//!
//! A submit row names its user directly. Approve and reject rows only name a
//! request, so their user is resolved from submits earlier in the same batch,
//! then from the request store. Rows whose request cannot be resolved go to a
//! separate partition; the engine reports them as not found.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use super::engine::ReconciliationEngine;
use crate::types::{Command, Decision, EngineError, TransactionRequest, UserId};

/// Successful outcome of a command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// A request was stored as pending
    Submitted(TransactionRequest),

    /// A request reached a terminal status
    Decided(Decision),
}

/// Result of processing a single command
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The command that was processed
    pub command: Command,

    /// The result of processing (success or error)
    pub result: Result<CommandOutcome, EngineError>,
}

/// Command runner with user-based partitioning
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    engine: ReconciliationEngine,
}

impl BatchProcessor {
    /// Create a new BatchProcessor over a shared engine
    pub fn new(engine: ReconciliationEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Run one command against the engine
    ///
    /// Failures are logged here: `PartialSuccess` and `Storage` at error level
    /// since they need operator attention, everything else at warn.
    pub async fn execute(&self, command: Command) -> ProcessingResult {
        let result = match &command {
            Command::Submit(new) => self
                .engine
                .submit(new.clone())
                .map(CommandOutcome::Submitted),
            Command::Approve {
                request_id,
                actor_id,
            } => self
                .engine
                .approve(request_id, actor_id)
                .await
                .map(CommandOutcome::Decided),
            Command::Reject {
                request_id,
                actor_id,
                reason,
            } => self
                .engine
                .reject(request_id, actor_id, reason.as_deref())
                .await
                .map(CommandOutcome::Decided),
        };

        if let Err(e) = &result {
            match e {
                EngineError::PartialSuccess { .. } | EngineError::Storage { .. } => error!(
                    action = command.action(),
                    request_id = command.request_id(),
                    error = %e,
                    "command needs attention"
                ),
                _ => warn!(
                    action = command.action(),
                    request_id = command.request_id(),
                    error = %e,
                    "command failed"
                ),
            }
        }

        ProcessingResult { command, result }
    }

    /// Partition a batch of commands by owning user
    ///
    /// # Arguments
    ///
    /// * `batch` - Commands in input order
    ///
    /// # Returns
    ///
    /// A HashMap where:
    /// - Keys are user ids, or `None` for commands whose request is unknown
    /// - Values are that user's commands (in original order)
    ///
    /// # Guarantees
    ///
    /// - Each command appears in exactly one partition
    /// - Commands for each user maintain their original order
    /// - Every command naming a request id lands in the same partition,
    ///   even when a duplicate submit names a different user
    pub fn partition_by_user(&self, batch: Vec<Command>) -> HashMap<Option<UserId>, Vec<Command>> {
        let mut owners: HashMap<String, UserId> = HashMap::new();
        let mut partitions: HashMap<Option<UserId>, Vec<Command>> = HashMap::new();

        for command in batch {
            let owner = match &command {
                // A repeated id runs with its first owner so the engine sees
                // the original submit before the duplicate.
                Command::Submit(new) => Some(
                    owners
                        .entry(new.id.clone())
                        .or_insert_with(|| {
                            self.stored_owner(&new.id)
                                .unwrap_or_else(|| new.user_id.clone())
                        })
                        .clone(),
                ),
                Command::Approve { request_id, .. } | Command::Reject { request_id, .. } => {
                    self.resolve_owner(request_id, &owners)
                }
            };
            partitions.entry(owner).or_default().push(command);
        }

        partitions
    }

    fn resolve_owner(&self, request_id: &str, owners: &HashMap<String, UserId>) -> Option<UserId> {
        if let Some(user_id) = owners.get(request_id) {
            return Some(user_id.clone());
        }
        self.stored_owner(request_id)
    }

    fn stored_owner(&self, request_id: &str) -> Option<UserId> {
        match self.engine.request(request_id) {
            Ok(request) => request.map(|r| r.user_id),
            Err(e) => {
                debug!(request_id, error = %e, "could not resolve request owner");
                None
            }
        }
    }

    /// Process all commands for a single user sequentially
    pub async fn process_user_commands(&self, commands: Vec<Command>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(commands.len());

        for command in commands {
            results.push(self.execute(command).await);
        }

        results
    }

    /// Process a batch of commands with user-based partitioning
    ///
    /// This method processes a batch of commands by:
    /// 1. Partitioning the batch by owning user
    /// 2. Spawning tokio tasks to process each user's commands concurrently
    /// 3. Waiting for all tasks to complete
    /// 4. Collecting and returning all results
    ///
    /// Results may be in a different order than the input.
    pub async fn process_batch(&self, batch: Vec<Command>) -> Vec<ProcessingResult> {
        let partitions = self.partition_by_user(batch);

        let mut tasks = Vec::with_capacity(partitions.len());
        for (_user, commands) in partitions {
            let processor = self.clone();
            tasks.push(tokio::spawn(async move {
                processor.process_user_commands(commands).await
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(user_results) => results.extend(user_results),
                Err(e) => error!(error = %e, "command task panicked"),
            }
        }

        results
    }
}
