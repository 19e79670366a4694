//! Query builders for visit stores and the job executor.
//!
//! Both builders evaluate in-process through `matches`, so any backend that
//! can list candidates can honour them. `JobQuery` also renders the
//! executor's comma-separated search string.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entities::{ContainerRef, Job, VisitRow};
use crate::enums::{JobState, SearchOp};
use crate::value::FieldValue;

// ---------------------------------------------------------------------------
// VisitQuery
// ---------------------------------------------------------------------------

/// `field <op> values` filter on a visit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub op: SearchOp,
    pub values: Vec<FieldValue>,
}

impl FieldFilter {
    #[must_use]
    pub fn new(field: impl Into<String>, op: SearchOp, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op,
            values: vec![value.into()],
        }
    }

    #[must_use]
    pub fn one_of(field: impl Into<String>, values: Vec<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op: SearchOp::OneOf,
            values,
        }
    }

    /// Evaluate the filter against a field value. Missing values never match.
    ///
    /// Two values that both parse as visit dates compare as dates, whatever
    /// layout each was written in.
    #[must_use]
    pub fn matches(&self, value: Option<&FieldValue>) -> bool {
        let Some(value) = value.filter(|v| !v.is_blank()) else {
            return false;
        };
        let Some(first) = self.values.first() else {
            return false;
        };
        let ord = compare(value, first);
        match self.op {
            SearchOp::Eq => ord.is_eq(),
            SearchOp::Ne => ord.is_ne(),
            SearchOp::Gt => ord.is_gt(),
            SearchOp::Lt => ord.is_lt(),
            SearchOp::Ge => ord.is_ge(),
            SearchOp::Le => ord.is_le(),
            SearchOp::OneOf => self.values.iter().any(|v| compare(value, v).is_eq()),
        }
    }
}

fn compare(value: &FieldValue, other: &FieldValue) -> Ordering {
    match (value.as_date(), other.as_date()) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => value.loose_cmp(other),
    }
}

/// Rows of one participant/module, optionally filtered on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitQuery {
    pub participant: String,
    pub module: String,
    pub filter: Option<FieldFilter>,
    /// Columns to return; empty means all.
    pub columns: Vec<String>,
    /// Only rows whose file passed this stage.
    pub passed_stage: Option<String>,
}

impl VisitQuery {
    #[must_use]
    pub fn new(participant: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            module: module.into(),
            filter: None,
            columns: Vec::new(),
            passed_stage: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn passed(mut self, stage: impl Into<String>) -> Self {
        self.passed_stage = Some(stage.into());
        self
    }

    /// Whether a row of the right participant/module satisfies the filter.
    #[must_use]
    pub fn matches(&self, row: &VisitRow) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|f| f.matches(row.get(&f.field)))
    }

    /// Restrict a row to the requested columns.
    #[must_use]
    pub fn project(&self, mut row: VisitRow) -> VisitRow {
        if !self.columns.is_empty() {
            row.columns.retain(|k, _| self.columns.iter().any(|c| c == k));
        }
        row
    }
}

// ---------------------------------------------------------------------------
// JobQuery
// ---------------------------------------------------------------------------

/// Filter over the job executor's jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQuery {
    /// Parent projects; a job matches when it belongs to any of them.
    pub projects: Vec<String>,
    pub destinations: Vec<ContainerRef>,
    pub stages: Vec<String>,
    pub states: Vec<JobState>,
    pub previous_job_id: Option<String>,
}

impl JobQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs anywhere under `project_id`, whatever their destination.
    #[must_use]
    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.projects.push(project_id.into());
        self
    }

    #[must_use]
    pub fn destination(mut self, destination: ContainerRef) -> Self {
        self.destinations.push(destination);
        self
    }

    #[must_use]
    pub fn stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages.extend(stages.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn states(mut self, states: impl IntoIterator<Item = JobState>) -> Self {
        self.states.extend(states);
        self
    }

    /// Jobs still queued or executing.
    #[must_use]
    pub fn active(self) -> Self {
        self.states([JobState::Pending, JobState::Running])
    }

    #[must_use]
    pub fn retry_of(mut self, job_id: impl Into<String>) -> Self {
        self.previous_job_id = Some(job_id.into());
        self
    }

    #[must_use]
    pub fn matches(&self, job: &Job) -> bool {
        (self.projects.is_empty()
            || job
                .project_id
                .as_ref()
                .is_some_and(|p| self.projects.contains(p)))
            && (self.destinations.is_empty() || self.destinations.contains(&job.destination))
            && (self.stages.is_empty() || self.stages.iter().any(|s| *s == job.stage))
            && (self.states.is_empty() || self.states.contains(&job.state))
            && self
                .previous_job_id
                .as_ref()
                .is_none_or(|id| job.previous_job_id.as_ref() == Some(id))
    }
}

impl fmt::Display for JobQuery {
    /// Renders the executor's search syntax, e.g.
    /// `parents.project=|[p1],gear_info.name=|[a,b],state=|[pending,running]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.projects.is_empty() {
            parts.push(format!("parents.project=|[{}]", self.projects.join(",")));
        }
        let mut kinds: Vec<&str> = self.destinations.iter().map(ContainerRef::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        for kind in kinds {
            let ids: Vec<&str> = self
                .destinations
                .iter()
                .filter(|d| d.kind() == kind)
                .map(ContainerRef::id)
                .collect();
            parts.push(format!("destination.{kind}=|[{}]", ids.join(",")));
        }
        if !self.stages.is_empty() {
            parts.push(format!("gear_info.name=|[{}]", self.stages.join(",")));
        }
        if !self.states.is_empty() {
            let states: Vec<&str> = self.states.iter().copied().map(JobState::as_str).collect();
            parts.push(format!("state=|[{}]", states.join(",")));
        }
        if let Some(prev) = &self.previous_job_id {
            parts.push(format!("previous_job_id=\"{prev}\""));
        }
        f.write_str(&parts.join(","))
    }
}
