//! Change listeners and their per-kind registry.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use cloudrec_core::{Record, Scope};
use serde::Serialize;
use tracing::warn;

use crate::cache::Applied;

/// Downstream observer of one kind's changes.
///
/// Calls arrive after the cache swap, in the order added → updated → deleted.
/// `on_updated` is called once per changed key with the new and previous
/// item; listeners derive their own deltas from the pair.
pub trait Listener<R: Record>: Send + Sync {
    fn name(&self) -> &str;
    fn on_added(&self, items: &[R]) -> anyhow::Result<()>;
    fn on_updated(&self, new: &R, old: &R) -> anyhow::Result<()>;
    fn on_deleted(&self, keys: &[R::Key]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerFailure {
    pub listener: String,
    pub stage: Stage,
    pub error: String,
}

pub struct ListenerRegistry<R: Record> {
    listeners: RwLock<Vec<Arc<dyn Listener<R>>>>,
}

impl<R: Record> Default for ListenerRegistry<R> {
    fn default() -> Self { Self { listeners: RwLock::new(Vec::new()) } }
}

impl<R: Record> ListenerRegistry<R> {
    pub fn register(&self, listener: Arc<dyn Listener<R>>) {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner).push(listener);
    }

    pub fn len(&self) -> usize { self.listeners.read().unwrap_or_else(PoisonError::into_inner).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Fan an applied change set out to every listener in registration order.
    /// Empty change sets are not delivered. A failing or panicking call is
    /// recorded and the remaining calls still run.
    pub(crate) fn notify(&self, scope: Scope, applied: &Applied<R>) -> Vec<ListenerFailure> {
        let mut failures = Vec::new();
        if applied.is_empty() {
            return failures;
        }
        let listeners: Vec<Arc<dyn Listener<R>>> =
            self.listeners.read().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect();

        for l in listeners.iter() {
            let mut record = |stage: Stage, res: anyhow::Result<()>| {
                if let Err(e) = res {
                    warn!(kind = %scope.kind, org_id = %scope.org, listener = l.name(), stage = ?stage, error = %e, "listener failed");
                    metrics::counter!("recorder_listener_errors_total", 1u64, "kind" => scope.kind.as_str());
                    failures.push(ListenerFailure { listener: l.name().to_string(), stage, error: format!("{:#}", e) });
                }
            };
            if !applied.added.is_empty() {
                record(Stage::Added, guarded(|| l.on_added(&applied.added)));
            }
            for (new, old) in applied.updated.iter() {
                record(Stage::Updated, guarded(|| l.on_updated(new, old)));
            }
            if !applied.deleted.is_empty() {
                record(Stage::Deleted, guarded(|| l.on_deleted(&applied.deleted)));
            }
        }
        failures
    }
}

/// Run one listener call, turning a panic into an error.
fn guarded(call: impl FnOnce() -> anyhow::Result<()>) -> anyhow::Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(res) => res,
        Err(payload) => Err(anyhow::anyhow!("listener panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudrec_core::models::Vm;
    use cloudrec_core::{OrgId, ResourceKind};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tape {
        name: &'static str,
        fail_added: bool,
        log: Mutex<Vec<String>>,
    }

    impl Listener<Vm> for Tape {
        fn name(&self) -> &str { self.name }
        fn on_added(&self, items: &[Vm]) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("added:{}", items.len()));
            if self.fail_added {
                anyhow::bail!("downstream table locked");
            }
            Ok(())
        }
        fn on_updated(&self, new: &Vm, old: &Vm) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("updated:{}->{}", old.name, new.name));
            Ok(())
        }
        fn on_deleted(&self, keys: &[String]) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("deleted:{}", keys.join(",")));
            Ok(())
        }
    }

    fn vm(lcuuid: &str, name: &str) -> Vm { Vm { lcuuid: lcuuid.into(), name: name.into(), ..Default::default() } }

    fn scope() -> Scope { Scope { org: OrgId(1), kind: ResourceKind::Vm } }

    #[test]
    fn stages_run_in_order_and_failures_are_isolated() {
        let reg = ListenerRegistry::<Vm>::default();
        let first = Arc::new(Tape { name: "first", fail_added: true, ..Default::default() });
        let second = Arc::new(Tape { name: "second", ..Default::default() });
        reg.register(first.clone());
        reg.register(second.clone());

        let applied = Applied {
            epoch: 1,
            added: vec![vm("a", "web")],
            updated: vec![(vm("b", "db-2"), vm("b", "db"))],
            deleted: vec!["c".to_string()],
        };
        let failures = reg.notify(scope(), &applied);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].listener, "first");
        assert_eq!(failures[0].stage, Stage::Added);

        let expected = vec!["added:1".to_string(), "updated:db->db-2".to_string(), "deleted:c".to_string()];
        assert_eq!(*first.log.lock().unwrap(), expected);
        assert_eq!(*second.log.lock().unwrap(), expected);
    }

    struct Boom;

    impl Listener<Vm> for Boom {
        fn name(&self) -> &str { "boom" }
        fn on_added(&self, _items: &[Vm]) -> anyhow::Result<()> { panic!("index out of range") }
        fn on_updated(&self, _new: &Vm, _old: &Vm) -> anyhow::Result<()> { Ok(()) }
        fn on_deleted(&self, _keys: &[String]) -> anyhow::Result<()> { panic!("{} rows locked", 2) }
    }

    #[test]
    fn panicking_listener_is_recorded_and_later_listeners_still_run() {
        let reg = ListenerRegistry::<Vm>::default();
        let tape = Arc::new(Tape { name: "after", ..Default::default() });
        reg.register(Arc::new(Boom));
        reg.register(tape.clone());

        let applied = Applied { epoch: 1, added: vec![vm("a", "web")], updated: vec![], deleted: vec!["c".to_string()] };
        let failures = reg.notify(scope(), &applied);
        assert_eq!(failures.len(), 2);
        assert_eq!((failures[0].listener.as_str(), failures[0].stage), ("boom", Stage::Added));
        assert_eq!(failures[0].error, "listener panicked: index out of range");
        assert_eq!(failures[1].stage, Stage::Deleted);
        assert_eq!(failures[1].error, "listener panicked: 2 rows locked");
        assert_eq!(*tape.log.lock().unwrap(), vec!["added:1".to_string(), "deleted:c".to_string()]);
    }

    #[test]
    fn empty_change_sets_are_not_delivered() {
        let reg = ListenerRegistry::<Vm>::default();
        let tape = Arc::new(Tape { name: "t", ..Default::default() });
        reg.register(tape.clone());
        let applied = Applied::<Vm> { epoch: 3, added: vec![], updated: vec![], deleted: vec![] };
        assert!(reg.notify(scope(), &applied).is_empty());
        assert!(tape.log.lock().unwrap().is_empty());
    }
}
