use std::sync::Arc;

use fanout_core::logging::LIFECYCLE_TARGET;
use fanout_infrastructure::MetricsCollector;
use tracing::{error, info, warn};

/// 任务执行过程中的生命周期事件
///
/// 每个任务先发出一次 `Started`，随后恰好发出一次终止事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started {
        job_id: String,
        function: String,
    },
    Completed {
        job_id: String,
        result: String,
        run_time: i64,
    },
    Failed {
        job_id: String,
        detail: String,
    },
    TimedOut {
        job_id: String,
    },
}

impl LifecycleEvent {
    pub fn job_id(&self) -> &str {
        match self {
            LifecycleEvent::Started { job_id, .. }
            | LifecycleEvent::Completed { job_id, .. }
            | LifecycleEvent::Failed { job_id, .. }
            | LifecycleEvent::TimedOut { job_id } => job_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Started { .. } => "started",
            LifecycleEvent::Completed { .. } => "completed",
            LifecycleEvent::Failed { .. } => "failed",
            LifecycleEvent::TimedOut { .. } => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LifecycleEvent::Started { .. })
    }
}

/// 生命周期事件监听器
pub trait LifecycleListener: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

/// 写日志、计数，然后通知所有监听器
#[derive(Clone, Default)]
pub struct LifecycleEmitter {
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl LifecycleEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::Started { job_id, function } => {
                info!(target: LIFECYCLE_TARGET, job_id = %job_id, function = %function, "Job [{}] started", job_id)
            }
            LifecycleEvent::Completed {
                job_id,
                result,
                run_time,
            } => info!(
                target: LIFECYCLE_TARGET,
                job_id = %job_id,
                run_time = *run_time,
                "Job [{}] successfully complete with [{}] result",
                job_id,
                result
            ),
            LifecycleEvent::Failed { job_id, detail } => error!(
                target: LIFECYCLE_TARGET,
                job_id = %job_id,
                "Job [{}] failed [{}]",
                job_id,
                detail
            ),
            LifecycleEvent::TimedOut { job_id } => {
                warn!(target: LIFECYCLE_TARGET, job_id = %job_id, "Job [{}] timed out", job_id)
            }
        }
        MetricsCollector::record_job_event(event.name());

        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 记录收到的所有事件
    #[derive(Default)]
    pub(crate) struct RecordingListener {
        events: Mutex<Vec<LifecycleEvent>>,
    }

    impl RecordingListener {
        pub(crate) fn events(&self) -> Vec<LifecycleEvent> {
            self.events.lock().unwrap().clone()
        }

        pub(crate) fn terminal_events(&self, job_id: &str) -> Vec<LifecycleEvent> {
            self.events()
                .into_iter()
                .filter(|e| e.job_id() == job_id && e.is_terminal())
                .collect()
        }
    }

    impl LifecycleListener for RecordingListener {
        fn on_event(&self, event: &LifecycleEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_listeners_receive_events_in_order() {
        let listener = Arc::new(RecordingListener::default());
        let mut emitter = LifecycleEmitter::new();
        emitter.add_listener(listener.clone());

        emitter.emit(LifecycleEvent::Started {
            job_id: "j1".into(),
            function: "echo".into(),
        });
        emitter.emit(LifecycleEvent::TimedOut { job_id: "j1".into() });

        let names: Vec<_> = listener.events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["started", "timed_out"]);
        assert_eq!(listener.terminal_events("j1").len(), 1);
    }
}
