use async_trait::async_trait;
use tracing::info;

use super::{MacCheckProtocol, SpdzNativeProtocol};
use crate::{
    executor::{BatchContext, RoundSynchronization},
    fields::FieldDefinition,
    producer::ProtocolCollection,
    Error,
};

/// Reason for running a MAC check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacCheckTrigger {
    /// Next batch reveals values while earlier openings are unverified.
    BeforeOutput,
    /// Last batch revealed values to the application.
    AfterOutput,
    /// Too many gates were evaluated since the last check.
    Threshold,
    /// Evaluation finished with unverified openings.
    Final,
}

/// Gets notified about every MAC check that is run.
pub trait MacCheckObserver {
    fn on_mac_check(&mut self, trigger: MacCheckTrigger, openings: usize);
}

impl<T: FnMut(MacCheckTrigger, usize)> MacCheckObserver for T {
    fn on_mac_check(&mut self, trigger: MacCheckTrigger, openings: usize) {
        self(trigger, openings)
    }
}

/// When to verify opened values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacCheckSchedule {
    threshold: u64,
    gates_since_check: u64,
}

impl MacCheckSchedule {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            gates_since_check: 0,
        }
    }

    /// Whether a check must run now.
    pub fn should_check(
        pending_openings: usize,
        upcoming_has_output: bool,
        gates_since_check: u64,
        threshold: u64,
    ) -> bool {
        pending_openings > 0 && (upcoming_has_output || gates_since_check > threshold)
    }

    pub fn gates_since_check(&self) -> u64 {
        self.gates_since_check
    }

    fn before_batch(&self, pending_openings: usize, has_output: bool) -> Option<MacCheckTrigger> {
        (has_output && Self::should_check(pending_openings, true, 0, self.threshold))
            .then_some(MacCheckTrigger::BeforeOutput)
    }

    fn after_batch(
        &mut self,
        pending_openings: usize,
        gates: usize,
        had_output: bool,
    ) -> Option<MacCheckTrigger> {
        self.gates_since_check += gates as u64;
        if had_output && Self::should_check(pending_openings, true, 0, self.threshold) {
            Some(MacCheckTrigger::AfterOutput)
        } else if Self::should_check(
            pending_openings,
            false,
            self.gates_since_check,
            self.threshold,
        ) {
            Some(MacCheckTrigger::Threshold)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.gates_since_check = 0;
    }
}

/// Runs MAC checks between batches so that no unverified value reaches the
/// application and the number of unverified openings stays bounded.
pub struct SpdzRoundSynchronization {
    schedule: MacCheckSchedule,
    observer: Option<Box<dyn MacCheckObserver>>,
    checks: usize,
    output_in_batch: bool,
}

impl SpdzRoundSynchronization {
    pub fn new(threshold: u64) -> Self {
        Self {
            schedule: MacCheckSchedule::new(threshold),
            observer: None,
            checks: 0,
            output_in_batch: false,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn MacCheckObserver>) {
        self.observer = Some(observer);
    }

    /// Number of MAC checks run so far.
    pub fn checks(&self) -> usize {
        self.checks
    }

    pub fn schedule(&self) -> &MacCheckSchedule {
        &self.schedule
    }

    async fn run_mac_check<F: FieldDefinition>(
        &mut self,
        trigger: MacCheckTrigger,
        ctx: &mut BatchContext<'_, F>,
    ) -> Result<(), Error> {
        let opened = ctx.pool.take_openings();
        if opened.is_empty() {
            return Ok(());
        }

        info!(
            party_id = ctx.pool.party_id(),
            ?trigger,
            openings = opened.len(),
            "running MAC check"
        );
        if let Some(observer) = self.observer.as_mut() {
            observer.on_mac_check(trigger, opened.len());
        }
        self.checks += 1;
        self.schedule.reset();

        let mut batch = ProtocolCollection::new(1);
        batch.push(SpdzNativeProtocol::MacCheck(MacCheckProtocol::new(opened)));
        ctx.process_batch(&mut batch).await
    }
}

#[async_trait(?Send)]
impl<F: FieldDefinition> RoundSynchronization<F> for SpdzRoundSynchronization {
    async fn before_batch(
        &mut self,
        batch: &ProtocolCollection<F>,
        ctx: &mut BatchContext<'_, F>,
    ) -> Result<(), Error> {
        self.output_in_batch = batch.has_output();
        let pending = ctx.pool.pending_openings();
        match self.schedule.before_batch(pending, self.output_in_batch) {
            Some(trigger) => self.run_mac_check(trigger, ctx).await,
            None => Ok(()),
        }
    }

    async fn finished_batch(
        &mut self,
        gates: usize,
        ctx: &mut BatchContext<'_, F>,
    ) -> Result<(), Error> {
        let pending = ctx.pool.pending_openings();
        match self.schedule.after_batch(pending, gates, self.output_in_batch) {
            Some(trigger) => self.run_mac_check(trigger, ctx).await,
            None => Ok(()),
        }
    }

    async fn finished_eval(&mut self, ctx: &mut BatchContext<'_, F>) -> Result<(), Error> {
        self.output_in_batch = false;
        self.run_mac_check(MacCheckTrigger::Final, ctx).await
    }
}
