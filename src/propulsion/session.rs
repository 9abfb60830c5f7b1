// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Manual tuning over one fitted dataset
//!
//! The fit is computed once when the session opens. Parameter overrides are
//! re-evaluated against it and the resulting reports are published
//! last-write-wins: every recomputation takes a ticket, and a report whose
//! ticket is older than the published one is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::fitter::FitOutcome;
use super::pipeline::{DatasetModel, DatasetReport, PreparedDataset};
use super::ModelError;
use crate::config::ModelConfig;
use crate::models::Dataset;

#[derive(Debug)]
struct Published {
    ticket: u64,
    report: Arc<DatasetReport>,
}

#[derive(Debug)]
pub struct TuningSession {
    model: DatasetModel,
    prepared: PreparedDataset,
    fit: FitOutcome,
    next_ticket: AtomicU64,
    published: RwLock<Option<Published>>,
}

impl TuningSession {
    /// Fit `dataset` and publish the initial report
    pub fn open(dataset: &Dataset, config: ModelConfig) -> Result<Self, ModelError> {
        let model = DatasetModel::new(config);
        let prepared = model.prepare(dataset);
        let fit = model.fit(&prepared)?;

        let session = Self {
            model,
            prepared,
            fit,
            next_ticket: AtomicU64::new(0),
            published: RwLock::new(None),
        };
        session.apply(&HashMap::new())?;
        info!(dataset.name = %dataset.name, "Tuning session opened");
        Ok(session)
    }

    /// Reserve the next recomputation ticket
    pub fn begin(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Re-evaluate the fitted dataset with extra overrides
    ///
    /// `overrides` are layered over the configured `[manual]` section.
    pub fn compute(&self, overrides: &HashMap<String, f64>) -> Result<DatasetReport, ModelError> {
        let mut config = self.model.config().clone();
        config
            .manual
            .extend(overrides.iter().map(|(key, value)| (key.clone(), *value)));
        DatasetModel::new(config).report(&self.prepared, &self.fit)
    }

    /// Publish a report unless a newer ticket already has
    ///
    /// Returns false when the report was stale and dropped.
    pub fn publish(&self, ticket: u64, report: DatasetReport) -> bool {
        let mut published = self
            .published
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(current) = published.as_ref() {
            if current.ticket > ticket {
                debug!(
                    session.ticket = ticket,
                    session.published = current.ticket,
                    "Discarding stale report"
                );
                return false;
            }
        }
        *published = Some(Published {
            ticket,
            report: Arc::new(report),
        });
        true
    }

    /// Compute and publish in one step
    pub fn apply(&self, overrides: &HashMap<String, f64>) -> Result<Option<Arc<DatasetReport>>, ModelError> {
        let ticket = self.begin();
        let report = self.compute(overrides)?;
        self.publish(ticket, report);
        Ok(self.current())
    }

    /// Most recently published report
    pub fn current(&self) -> Option<Arc<DatasetReport>> {
        self.published
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|published| Arc::clone(&published.report))
    }

    pub fn fit(&self) -> &FitOutcome {
        &self.fit
    }
}
