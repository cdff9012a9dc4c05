use std::{error::Error, sync::Arc};

use tracing::{debug, error, trace};

use crate::{
    ChangeEvent, ConsumeError, ConsumerDefinition, EnvelopeError, MaterializeError, Operation,
    Parsed, RawEnvelope, Registry, SkipReason, Trigger, TriggerError, UnitOfWork,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No consumer is bound to the event's table.
    NoConsumers,
    /// Consumers exist, but none of their triggers fired.
    NotTriggered,
    /// The unit of work committed. `skipped` counts consumers whose guard
    /// declined the instance.
    Dispatched { invoked: usize, skipped: usize },
    /// The envelope carried nothing to dispatch.
    Skipped(SkipReason),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("trigger of consumer `{consumer}` failed: {source}")]
    Trigger {
        consumer: String,
        #[source]
        source: TriggerError,
    },
    #[error("no entity type is registered for table `{table}`")]
    UnresolvedEntityType { table: String },
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
    #[error("consumer `{consumer}` failed: {message}")]
    Consumer {
        consumer: String,
        message: String,
        #[source]
        source: ConsumeError,
    },
    #[error("unit of work failed: {0}")]
    UnitOfWork(#[source] Box<dyn Error + Send + Sync>),
}

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl HandleError {
    /// Whether the record itself is at fault: it failed envelope validation, or
    /// a trigger read a field its images do not carry.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            HandleError::Envelope(_)
                | HandleError::Dispatch(DispatchError::Trigger {
                    source: TriggerError::MissingField { .. },
                    ..
                })
        )
    }
}

/// Routes change events to the consumers registered for their table.
pub struct Dispatcher<U: UnitOfWork = ()> {
    registry: Arc<Registry>,
    unit_of_work: U,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_unit_of_work(registry, ())
    }
}

impl<U: UnitOfWork> Dispatcher<U> {
    pub fn with_unit_of_work(registry: Arc<Registry>, unit_of_work: U) -> Self {
        Self {
            registry,
            unit_of_work,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn unit_of_work(&self) -> &U {
        &self.unit_of_work
    }

    /// Parse one raw envelope and dispatch it. Heartbeats, snapshot records and
    /// reads come back as [`DispatchOutcome::Skipped`].
    pub fn handle_envelope<R>(&self, envelope: &R) -> Result<DispatchOutcome, HandleError>
    where
        R: RawEnvelope + ?Sized,
    {
        let event = match envelope.decode()? {
            Parsed::Skip(reason) => return Ok(DispatchOutcome::Skipped(reason)),
            Parsed::Event(event) if event.operation == Operation::Read => {
                return Ok(DispatchOutcome::Skipped(SkipReason::Read));
            }
            Parsed::Event(event) => event,
        };

        Ok(self.dispatch(&event)?)
    }

    /// Invoke every consumer of `event.table` whose trigger fires, inside one
    /// unit of work. The first consumer failure rolls the whole unit back.
    pub fn dispatch(&self, event: &ChangeEvent) -> Result<DispatchOutcome, DispatchError> {
        let consumers = self.registry.consumers_for(&event.table);
        if consumers.is_empty() {
            debug!(table = %event.table, operation = %event.operation, "no consumers");
            return Ok(DispatchOutcome::NoConsumers);
        }

        let selected = self.select(consumers, event)?;
        if selected.is_empty() {
            debug!(table = %event.table, operation = %event.operation, "no trigger fired");
            return Ok(DispatchOutcome::NotTriggered);
        }

        let entity_type = self.registry.entity_type(&event.table).ok_or_else(|| {
            DispatchError::UnresolvedEntityType {
                table: event.table.clone(),
            }
        })?;
        let instance = entity_type.materialize(event.before(), event.after())?;

        self.unit_of_work
            .begin()
            .map_err(|e| DispatchError::UnitOfWork(Box::new(e)))?;

        let mut invoked = 0;
        let mut skipped = 0;

        for consumer in selected {
            let result = consumer
                .should_trigger(&*instance, event.operation)
                .and_then(|fire| {
                    if fire {
                        consumer.consume(&*instance).map(|()| true)
                    } else {
                        Ok(false)
                    }
                });

            match result {
                Ok(true) => invoked += 1,
                Ok(false) => {
                    debug!(consumer = %consumer.name(), "guard declined instance");
                    skipped += 1;
                }
                Err(source) => {
                    if let Err(rollback) = self.unit_of_work.rollback() {
                        error!(
                            table = %event.table,
                            consumer = %consumer.name(),
                            error = %rollback,
                            "rollback failed"
                        );
                    }

                    return Err(DispatchError::Consumer {
                        consumer: consumer.name().to_string(),
                        message: source.to_string(),
                        source,
                    });
                }
            }
        }

        self.unit_of_work
            .commit()
            .map_err(|e| DispatchError::UnitOfWork(Box::new(e)))?;

        debug!(
            table = %event.table,
            operation = %event.operation,
            ts_ms = ?event.ts_ms,
            invoked,
            skipped,
            "dispatched"
        );

        Ok(DispatchOutcome::Dispatched { invoked, skipped })
    }

    fn select<'r>(
        &self,
        consumers: &'r [ConsumerDefinition],
        event: &ChangeEvent,
    ) -> Result<Vec<&'r ConsumerDefinition>, DispatchError> {
        let mut selected = Vec::with_capacity(consumers.len());

        for consumer in consumers {
            let fired = match consumer.trigger(event.operation) {
                None => false,
                Some(Trigger::Always) => true,
                Some(Trigger::When(expr)) => expr
                    .matches(event.before(), event.after())
                    .map_err(|source| DispatchError::Trigger {
                        consumer: consumer.name().to_string(),
                        source,
                    })?,
            };

            trace!(consumer = %consumer.name(), fired, "evaluated trigger");

            if fired {
                selected.push(consumer);
            }
        }

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::{Arc, Mutex},
    };

    use serde_json::json;

    use super::*;
    use crate::entity::tests::{Group, image};
    use crate::trigger::dsl::*;
    use crate::{ConsumerBuilder, Datatype, RegistryBuilder};

    /// Records the unit-of-work calls it receives.
    #[derive(Default)]
    struct RecordingUnitOfWork {
        calls: Mutex<Vec<&'static str>>,
    }

    impl RecordingUnitOfWork {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &'static str) -> Result<(), Infallible> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl UnitOfWork for RecordingUnitOfWork {
        type Error = Infallible;

        fn begin(&self) -> Result<(), Self::Error> {
            self.record("begin")
        }

        fn commit(&self) -> Result<(), Self::Error> {
            self.record("commit")
        }

        fn rollback(&self) -> Result<(), Self::Error> {
            self.record("rollback")
        }
    }

    type Log = Arc<Mutex<Vec<(String, Group)>>>;

    fn logging_consumer(name: &str, log: &Log) -> ConsumerBuilder<Group> {
        let log = log.clone();
        let consumer = name.to_string();
        ConsumerDefinition::builder::<Group>(name).consume(move |group| {
            log.lock().unwrap().push((consumer.clone(), group.clone()));
            Ok(())
        })
    }

    fn dispatcher(
        consumers: Vec<ConsumerDefinition>,
    ) -> Dispatcher<Arc<RecordingUnitOfWork>> {
        let mut builder = RegistryBuilder::new();
        for consumer in consumers {
            builder.register(consumer).unwrap();
        }
        Dispatcher::with_unit_of_work(
            Arc::new(builder.freeze()),
            Arc::new(RecordingUnitOfWork::default()),
        )
    }

    fn rename(from: &str, to: &str) -> ChangeEvent {
        ChangeEvent::update(
            "grp",
            image(&[
                ("id", 1i64.into()),
                ("name", from.into()),
                ("is_active", true.into()),
            ]),
            image(&[
                ("id", 1i64.into()),
                ("name", to.into()),
                ("is_active", true.into()),
            ]),
        )
    }

    #[test]
    fn always_trigger_consumes_once_with_after_image() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            logging_consumer("c", &log)
                .on(Operation::Update, Trigger::Always)
                .build(),
        ]);

        let outcome = dispatcher.dispatch(&rename("a", "b")).unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched {
                invoked: 1,
                skipped: 0
            }
        );

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1.name, "b");
        assert_eq!(dispatcher.unit_of_work().calls(), ["begin", "commit"]);
    }

    #[test]
    fn declined_guard_skips_only_that_consumer() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            logging_consumer("first", &log)
                .on(Operation::Update, Trigger::Always)
                .build(),
            logging_consumer("second", &log)
                .on(Operation::Update, Trigger::Always)
                .should_trigger(|_, _| false)
                .build(),
        ]);

        let outcome = dispatcher.dispatch(&rename("a", "b")).unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched {
                invoked: 1,
                skipped: 1
            }
        );

        let names: Vec<_> = log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, ["first"]);
        assert_eq!(dispatcher.unit_of_work().calls(), ["begin", "commit"]);
    }

    #[test]
    fn failing_consumer_rolls_back_and_stops() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            ConsumerDefinition::builder::<Group>("first")
                .on(Operation::Update, Trigger::Always)
                .consume(|_| Err("cache unavailable".into()))
                .build(),
            logging_consumer("second", &log)
                .on(Operation::Update, Trigger::Always)
                .build(),
        ]);

        let error = dispatcher.dispatch(&rename("a", "b")).unwrap_err();
        match error {
            DispatchError::Consumer {
                consumer, message, ..
            } => {
                assert_eq!(consumer, "first");
                assert_eq!(message, "cache unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(dispatcher.unit_of_work().calls(), ["begin", "rollback"]);
    }

    #[test]
    fn failing_guard_rolls_back() {
        let dispatcher = dispatcher(vec![
            ConsumerDefinition::builder::<Group>("guarded")
                .on(Operation::Update, Trigger::Always)
                .try_should_trigger(|_, _| Err("lookup failed".into()))
                .consume(|_| Ok(()))
                .build(),
        ]);

        assert!(matches!(
            dispatcher.dispatch(&rename("a", "b")),
            Err(DispatchError::Consumer { .. })
        ));
        assert_eq!(dispatcher.unit_of_work().calls(), ["begin", "rollback"]);
    }

    #[test]
    fn expression_triggers_select_consumers() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            logging_consumer("renamed", &log)
                .on(Operation::Update, before("name").ne(after("name")))
                .build(),
            logging_consumer("deactivated", &log)
                .on(Operation::Update, after("is_active").eq(false))
                .build(),
        ]);

        dispatcher.dispatch(&rename("a", "b")).unwrap();
        let names: Vec<_> = log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, ["renamed"]);

        assert_eq!(
            dispatcher.dispatch(&rename("b", "b")).unwrap(),
            DispatchOutcome::NotTriggered
        );
    }

    #[test]
    fn nothing_happens_without_triggers() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            logging_consumer("creates", &log)
                .on(Operation::Create, Trigger::Always)
                .build(),
        ]);

        assert_eq!(
            dispatcher.dispatch(&rename("a", "b")).unwrap(),
            DispatchOutcome::NotTriggered
        );

        let other_table = ChangeEvent::create("elsewhere", image(&[("id", 1i64.into())]));
        assert_eq!(
            dispatcher.dispatch(&other_table).unwrap(),
            DispatchOutcome::NoConsumers
        );

        let read = ChangeEvent::new("grp", Operation::Read, None, Some(image(&[])));
        assert_eq!(
            dispatcher.dispatch(&read).unwrap(),
            DispatchOutcome::NotTriggered
        );

        assert!(dispatcher.unit_of_work().calls().is_empty());
    }

    #[test]
    fn trigger_errors_name_the_consumer() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            logging_consumer("counter", &log)
                .on(Operation::Update, after("count").gt(1))
                .build(),
        ]);

        assert!(matches!(
            dispatcher.dispatch(&rename("a", "b")),
            Err(DispatchError::Trigger { consumer, .. }) if consumer == "counter"
        ));
        assert!(dispatcher.unit_of_work().calls().is_empty());
    }

    #[test]
    fn materialization_errors_abort_before_the_unit_of_work() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            logging_consumer("c", &log)
                .on(Operation::Create, Trigger::Always)
                .build(),
        ]);

        let event = ChangeEvent::create("grp", image(&[("id", "not a number".into())]));
        assert!(matches!(
            dispatcher.dispatch(&event),
            Err(DispatchError::Materialize(_))
        ));
        assert!(dispatcher.unit_of_work().calls().is_empty());
    }

    #[test]
    fn handle_envelope_skips_non_dispatchable_records() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            logging_consumer("c", &log)
                .on(Operation::Create, Trigger::Always)
                .build(),
        ]);

        let read = json!({
            "payload": {"op": "r", "before": null, "after": {"id": 1}, "source": {"table": "grp"}}
        });
        assert_eq!(
            dispatcher.handle_envelope(&read).unwrap(),
            DispatchOutcome::Skipped(SkipReason::Read)
        );

        let create = json!({
            "payload": {
                "op": "c",
                "before": null,
                "after": {"id": "5", "name": "rust", "description": null, "is_active": "true"},
                "source": {"table": "grp"}
            }
        });
        assert_eq!(
            dispatcher.handle_envelope(&create).unwrap(),
            DispatchOutcome::Dispatched {
                invoked: 1,
                skipped: 0
            }
        );
        let log = log.lock().unwrap();
        assert_eq!(log[0].1.id, 5);
        assert_eq!(log[0].1.description, None);

        let malformed = json!({"payload": {"op": "u"}});
        assert!(matches!(
            dispatcher.handle_envelope(&malformed),
            Err(HandleError::Envelope(EnvelopeError::MissingKey(_)))
        ));
    }

    #[test]
    fn key_only_delete_images_materialize() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            logging_consumer("deletes", &log)
                .on(Operation::Delete, Trigger::Always)
                .build(),
        ]);

        let delete = json!({
            "payload": {
                "op": "d",
                "before": {"id": 1, "name": null, "description": null, "is_active": null},
                "after": null,
                "source": {"table": "grp"}
            }
        });
        assert_eq!(
            dispatcher.handle_envelope(&delete).unwrap(),
            DispatchOutcome::Dispatched {
                invoked: 1,
                skipped: 0
            }
        );
        assert_eq!(log.lock().unwrap()[0].1.id, 1);
    }

    #[test]
    fn missing_trigger_fields_count_as_malformed() {
        let log = Log::default();
        let dispatcher = dispatcher(vec![
            logging_consumer("counter", &log)
                .on(Operation::Update, after("count").gt(1))
                .build(),
        ]);

        let error = dispatcher
            .handle_envelope(&json!({
                "payload": {
                    "op": "u",
                    "before": {"id": 1},
                    "after": {"id": 1},
                    "source": {"table": "grp"}
                }
            }))
            .unwrap_err();
        assert!(error.is_malformed());
    }

    #[test]
    fn unit_dispatcher_needs_no_collaborator() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ConsumerDefinition::builder::<Group>("c")
                    .on(Operation::Delete, before("is_active").eq(Datatype::Bool(true)))
                    .consume(|_| Ok(()))
                    .build(),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(builder.freeze()));

        let event = ChangeEvent::delete("grp", image(&[("is_active", true.into())]));
        assert_eq!(
            dispatcher.dispatch(&event).unwrap(),
            DispatchOutcome::Dispatched {
                invoked: 1,
                skipped: 0
            }
        );
    }
}
