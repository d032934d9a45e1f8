// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! The job context tracks the lifecycle of a single pipeline run. A run moves
//! through a strictly linear state machine, and a failure in any stage moves
//! it to the terminal `Failed` state with no partial commit.

use crate::error::{PloverError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The parameters a run is invoked with. All of them are required; the
/// process fails before any read if one is absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunParams {
    /// The job identifier.
    pub job_name:    String,
    /// The connection name that identifies the relational source's access
    /// credentials and endpoint.
    pub connection:  String,
    /// The catalog database the output table is registered in.
    pub database:    String,
    /// The storage path or prefix the output table is written under.
    pub target_path: String,
}

impl RunParams {
    /// Resolves the required run parameters from a key/value map, failing
    /// if any of them is absent or empty.
    pub fn resolve(args: &HashMap<String, String>) -> Result<RunParams> {
        let required = |key: &str| -> Result<String> {
            match args.get(key) {
                Some(v) if !v.is_empty() => Ok(v.clone()),
                _ => Err(PloverError::Internal(format!(
                    "Missing required run parameter: {}",
                    key
                ))),
            }
        };
        Ok(RunParams {
            job_name:    required("job_name")?,
            connection:  required("connection")?,
            database:    required("database")?,
            target_path: required("target_path")?,
        })
    }
}

/// The lifecycle states of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// The job context is initialized but no stage has started.
    Init,
    /// The source tables are being read.
    Reading,
    /// The join query is being evaluated.
    Joining,
    /// The joined record set is being written to the sink.
    Writing,
    /// The run finished and the catalog registration is committed.
    Committed,
    /// The run aborted. Terminal; no partial results were committed.
    Failed,
}

impl JobState {
    /// Returns true if `next` is a legal successor of this state.
    fn accepts(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Init, JobState::Reading)
                | (JobState::Reading, JobState::Joining)
                | (JobState::Joining, JobState::Writing)
                | (JobState::Writing, JobState::Committed)
        )
    }

    /// Returns true if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Committed | JobState::Failed)
    }
}

/// The context of a single pipeline run.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// The unique id of this run.
    pub run_id:     String,
    /// The resolved run parameters.
    pub params:     RunParams,
    /// The time the context was initialized.
    pub started_at: DateTime<Utc>,
    state:          JobState,
}

impl JobContext {
    /// Initializes a new job context for the given run parameters.
    pub fn init(params: RunParams) -> Self {
        let run_id = format!("{}", Uuid::new_v4());
        log::info!("[{}] job {} initialized", run_id, params.job_name);
        Self {
            run_id,
            params,
            started_at: Utc::now(),
            state: JobState::Init,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Moves the run to the next stage. Skipping a stage or re-entering a
    /// terminal state is an internal error.
    pub fn enter(&mut self, next: JobState) -> Result<()> {
        if !self.state.accepts(next) {
            return Err(PloverError::Internal(format!(
                "Illegal job state transition: {:?} -> {:?}",
                self.state, next
            )));
        }
        log::info!("[{}] {:?} -> {:?}", self.run_id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Commits the run. Only legal after a successful write.
    pub fn commit(&mut self) -> Result<()> {
        self.enter(JobState::Committed)?;
        log::info!(
            "[{}] job {} committed after {} ms",
            self.run_id,
            self.params.job_name,
            (Utc::now() - self.started_at).num_milliseconds()
        );
        Ok(())
    }

    /// Marks the run as failed. Legal from any non-terminal state.
    pub fn fail(&mut self, cause: &PloverError) {
        if !self.state.is_terminal() {
            log::error!(
                "[{}] job {} failed in state {:?}: {}",
                self.run_id,
                self.params.job_name,
                self.state,
                cause
            );
            self.state = JobState::Failed;
        }
    }
}
