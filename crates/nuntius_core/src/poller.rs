use std::{fmt, ops::AddAssign};

use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::{DispatchOutcome, Dispatcher, HandleError, RawEnvelope, UnitOfWork};

/// What the poller does with a malformed record: one that is not JSON, fails
/// envelope validation, or lacks a field a trigger reads.
/// See [`HandleError::is_malformed`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Log and continue with the next record.
    Skip,
    /// Stop the batch and return the error.
    #[default]
    Abort,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub dispatched: usize,
    pub skipped: usize,
    pub not_triggered: usize,
    pub malformed: usize,
}

impl BatchReport {
    pub fn records(&self) -> usize {
        self.dispatched + self.skipped + self.not_triggered + self.malformed
    }

    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Dispatched { .. } => self.dispatched += 1,
            DispatchOutcome::Skipped(_) => self.skipped += 1,
            DispatchOutcome::NoConsumers | DispatchOutcome::NotTriggered => {
                self.not_triggered += 1
            }
        }
    }
}

impl AddAssign for BatchReport {
    fn add_assign(&mut self, rhs: Self) {
        self.dispatched += rhs.dispatched;
        self.skipped += rhs.skipped;
        self.not_triggered += rhs.not_triggered;
        self.malformed += rhs.malformed;
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dispatched, {} skipped, {} not triggered, {} malformed",
            self.dispatched, self.skipped, self.not_triggered, self.malformed
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("record {index} of the batch failed: {source}")]
pub struct PollError {
    pub index: usize,
    #[source]
    pub source: HandleError,
}

/// Drives parse and dispatch over batches of raw envelopes, one record at a
/// time and in arrival order.
pub struct Poller<U: UnitOfWork = ()> {
    dispatcher: Dispatcher<U>,
    policy: MalformedPolicy,
}

impl<U: UnitOfWork> Poller<U> {
    pub fn new(dispatcher: Dispatcher<U>) -> Self {
        Self {
            dispatcher,
            policy: MalformedPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher<U> {
        &self.dispatcher
    }

    pub fn process_batch<R: RawEnvelope>(&self, batch: &[R]) -> Result<BatchReport, PollError> {
        let mut report = BatchReport::default();

        for (index, envelope) in batch.iter().enumerate() {
            match self.dispatcher.handle_envelope(envelope) {
                Ok(outcome) => report.record(outcome),
                Err(error) if error.is_malformed() && self.policy == MalformedPolicy::Skip => {
                    warn!(index, %error, "skipping malformed record");
                    report.malformed += 1;
                }
                Err(source) => return Err(PollError { index, source }),
            }
        }

        debug!(records = batch.len(), %report, "processed batch");

        Ok(report)
    }

    /// Process batches until every sender is dropped. The first failing batch
    /// stops the loop.
    pub fn run<R: RawEnvelope>(
        &self,
        batches: &Receiver<Vec<R>>,
    ) -> Result<BatchReport, PollError> {
        let mut total = BatchReport::default();

        for batch in batches.iter() {
            total += self.process_batch(&batch)?;
        }

        debug!(%total, "feed closed");

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::entity::tests::Group;
    use crate::trigger::dsl::{after, before};
    use crate::{
        ConsumerDefinition, DispatchError, EnvelopeError, Operation, RegistryBuilder, Trigger,
        TriggerError,
    };

    fn poller(policy: MalformedPolicy) -> Poller {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ConsumerDefinition::builder::<Group>("groups")
                    .on(Operation::Create, Trigger::Always)
                    .consume(|group| match group.name.as_str() {
                        "boom" => Err("refused".into()),
                        _ => Ok(()),
                    })
                    .build(),
            )
            .unwrap()
            .register(
                ConsumerDefinition::builder::<Group>("renames")
                    .on(Operation::Update, before("name").ne(after("name")))
                    .consume(|_| Ok(()))
                    .build(),
            )
            .unwrap();

        Poller::new(Dispatcher::new(Arc::new(builder.freeze()))).with_policy(policy)
    }

    fn create(table: &str, name: &str) -> Value {
        json!({
            "payload": {
                "op": "c",
                "before": null,
                "after": {"id": 1, "name": name, "is_active": true},
                "source": {"table": table}
            }
        })
    }

    fn batch() -> Vec<Value> {
        vec![
            create("grp", "a"),
            json!({"schema": {"name": "io.debezium.connector.common.Heartbeat"}, "payload": {"ts_ms": 1}}),
            json!({"payload": {"op": "c"}}),
            create("other", "b"),
        ]
    }

    #[test]
    fn skip_policy_counts_malformed_records() {
        let report = poller(MalformedPolicy::Skip).process_batch(&batch()).unwrap();
        assert_eq!(
            report,
            BatchReport {
                dispatched: 1,
                skipped: 1,
                not_triggered: 1,
                malformed: 1,
            }
        );
        assert_eq!(report.records(), 4);
    }

    #[test]
    fn abort_policy_stops_at_the_malformed_record() {
        let error = poller(MalformedPolicy::Abort)
            .process_batch(&batch())
            .unwrap_err();
        assert_eq!(error.index, 2);
        assert!(matches!(
            error.source,
            HandleError::Envelope(EnvelopeError::MissingKey("payload.source"))
        ));
    }

    #[test]
    fn consumer_failures_abort_regardless_of_policy() {
        let error = poller(MalformedPolicy::Skip)
            .process_batch(&[create("grp", "a"), create("grp", "boom")])
            .unwrap_err();
        assert_eq!(error.index, 1);
        assert!(matches!(error.source, HandleError::Dispatch(_)));
    }

    #[test]
    fn run_drains_until_disconnected() {
        let (sender, receiver) = crossbeam_channel::bounded(2);
        sender.send(vec![create("grp", "a")]).unwrap();
        sender.send(vec![create("grp", "b"), create("other", "c")]).unwrap();
        drop(sender);

        let total = poller(MalformedPolicy::Abort).run(&receiver).unwrap();
        assert_eq!(total.dispatched, 2);
        assert_eq!(total.not_triggered, 1);
    }

    fn update_without_name() -> Value {
        json!({
            "payload": {
                "op": "u",
                "before": {"id": 1, "name": "a"},
                "after": {"id": 1},
                "source": {"table": "grp"}
            }
        })
    }

    #[test]
    fn missing_trigger_fields_follow_the_policy() {
        let report = poller(MalformedPolicy::Skip)
            .process_batch(&[update_without_name(), create("grp", "a")])
            .unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.dispatched, 1);

        let error = poller(MalformedPolicy::Abort)
            .process_batch(&[update_without_name()])
            .unwrap_err();
        assert!(matches!(
            error.source,
            HandleError::Dispatch(DispatchError::Trigger {
                source: TriggerError::MissingField { .. },
                ..
            })
        ));
    }

    #[test]
    fn raw_lines_that_are_not_json_follow_the_policy() {
        let lines = vec![
            create("grp", "a").to_string(),
            "{\"payload\": ".to_string(),
            create("grp", "b").to_string(),
        ];

        let report = poller(MalformedPolicy::Skip).process_batch(&lines).unwrap();
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.malformed, 1);

        let error = poller(MalformedPolicy::Abort)
            .process_batch(&lines)
            .unwrap_err();
        assert_eq!(error.index, 1);
        assert!(matches!(
            error.source,
            HandleError::Envelope(EnvelopeError::Json(_))
        ));
    }
}
