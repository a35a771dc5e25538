//! The guard service: subscribes to device changes and keeps blocked
//! microphones from staying default.

use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::audio::{AudioError, DeviceDirectory, EndpointSwitcher, NotificationSource};

use super::actuator::Enforcer;
use super::policy::SharedPolicy;
use super::scheduler::{DebounceScheduler, Phase};

/// Where enforcement results are surfaced to the user.
///
/// Called from a blocking worker thread, never from the UI thread.
pub trait Notifier: Send + Sync {
    /// A role was switched away from a blocked device.
    fn notice(&self, text: &str);

    /// A switch the user should know about failed.
    fn failure(&self, text: &str);
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notice(&self, text: &str) {
        info!(notice = text, "microphone guard");
    }

    fn failure(&self, text: &str) {
        error!(failure = text, "microphone guard");
    }
}

/// Long-lived reconciliation service.
pub struct MicGuard {
    policy: SharedPolicy,
    scheduler: DebounceScheduler,
    source: Option<Box<dyn NotificationSource>>,
}

impl MicGuard {
    pub fn new(
        policy: SharedPolicy,
        directory: Arc<dyn DeviceDirectory>,
        switcher: Arc<dyn EndpointSwitcher>,
        notifier: Arc<dyn Notifier>,
        runtime: Handle,
    ) -> Self {
        let enforcer = Enforcer::new(directory, switcher);
        let evaluation_policy = policy.clone();

        let reconciler = move |reason: &str| -> anyhow::Result<()> {
            let snapshot = evaluation_policy.snapshot();
            let decision = enforcer
                .enforce(&snapshot, reason)
                .with_context(|| format!("evaluation for '{reason}' aborted"))?;

            if let Some(notice) = decision.notice(reason) {
                notifier.notice(&notice);
            }
            if let Some(message) = decision.failure_message() {
                notifier.failure(&message);
            }
            Ok(())
        };

        let scheduler = DebounceScheduler::new(runtime, policy.clone(), Arc::new(reconciler));

        Self {
            policy,
            scheduler,
            source: None,
        }
    }

    /// Subscribe to device notifications and evaluate once right away.
    pub fn start(&mut self, mut source: Box<dyn NotificationSource>) -> Result<(), AudioError> {
        if self.scheduler.is_disposed() {
            warn!("guard already disposed, not starting");
            return Ok(());
        }

        if let Some(mut previous) = self.source.take() {
            previous.unsubscribe();
        }

        source.subscribe(Arc::new(self.scheduler.clone()))?;
        self.source = Some(source);
        info!("microphone guard started");

        self.scheduler.notify("startup", true);
        Ok(())
    }

    /// Evaluate without waiting for the quiet period.
    pub fn enforce_now(&self, reason: &str) {
        self.scheduler.notify(reason, true);
    }

    pub fn policy(&self) -> &SharedPolicy {
        &self.policy
    }

    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    /// Stop listening and drop pending work. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.unsubscribe();
        }
        if !self.scheduler.is_disposed() {
            self.scheduler.dispose();
            info!("microphone guard stopped");
        }
    }
}

impl Drop for MicGuard {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceRole;
    use crate::guard::policy::Policy;
    use crate::guard::testing::{FakeAudio, FakeSource, RecordingNotifier};
    use std::time::Duration;
    use tokio::time::sleep;

    struct Harness {
        audio: Arc<FakeAudio>,
        source: FakeSource,
        notifier: Arc<RecordingNotifier>,
        guard: MicGuard,
    }

    fn harness() -> Harness {
        let audio = Arc::new(FakeAudio::with_devices(&[
            ("{A}", "Realtek Mic"),
            ("{B}", "OnePlus Buds Pro 3"),
        ]));
        for role in DeviceRole::ALL {
            audio.set_default(role, "{B}");
        }
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = SharedPolicy::new(Policy {
            debounce_ms: 200,
            ..Policy::default()
        });
        let guard = MicGuard::new(
            policy,
            audio.clone(),
            audio.clone(),
            notifier.clone(),
            Handle::current(),
        );

        Harness {
            audio,
            source: FakeSource::default(),
            notifier,
            guard,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_subscribes_and_enforces_immediately() {
        let mut h = harness();
        h.guard.start(Box::new(h.source.clone())).unwrap();
        assert!(h.source.is_subscribed());

        sleep(Duration::from_millis(10)).await;

        for role in DeviceRole::ALL {
            assert_eq!(h.audio.default_id(role).as_deref(), Some("{A}"));
        }
        assert_eq!(
            *h.notifier.notices.lock().unwrap(),
            vec!["startup: switched default microphone to 'Realtek Mic' for Console, Multimedia, Communications.".to_string()]
        );
        assert!(h.notifier.failures.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_burst_reverts_default_once() {
        let mut h = harness();
        h.guard.start(Box::new(h.source.clone())).unwrap();
        sleep(Duration::from_millis(10)).await;
        let baseline = h.audio.set_calls().len();

        // The headset reconnects and grabs the communications role.
        h.audio.set_default(DeviceRole::Communications, "{B}");
        h.source.fire("state:Active");
        h.source.fire("added");
        h.source.fire("default:Communications");
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.audio.set_calls().len(), baseline);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(h.audio.set_calls().len(), baseline + 1);
        assert_eq!(h.audio.default_id(DeviceRole::Communications).as_deref(), Some("{A}"));

        let notices = h.notifier.notices.lock().unwrap();
        assert_eq!(
            notices.last().unwrap(),
            "default:Communications: switched default microphone to 'Realtek Mic' for Communications."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_changes_apply_to_next_evaluation() {
        let mut h = harness();
        h.guard.policy().update(|policy| policy.set_enabled(false));
        h.guard.start(Box::new(h.source.clone())).unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(h.audio.set_calls().is_empty());

        h.guard.policy().update(|policy| policy.set_enabled(true));
        h.guard.enforce_now("guard-enabled");
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.audio.set_calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_failures_reach_the_notifier() {
        let mut h = harness();
        h.audio.fail_switch(DeviceRole::Console);
        h.guard.start(Box::new(h.source.clone())).unwrap();
        sleep(Duration::from_millis(10)).await;

        let failures = h.notifier.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("Cannot set default microphone for Console:"));
        assert!(h.notifier.notices.lock().unwrap()[0].ends_with("for Multimedia, Communications."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enumeration_failure_is_not_shown_to_the_user() {
        let mut h = harness();
        h.audio.fail_enumeration();
        h.guard.start(Box::new(h.source.clone())).unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.audio.list_calls(), 1);
        assert!(h.notifier.notices.lock().unwrap().is_empty());
        assert!(h.notifier.failures.lock().unwrap().is_empty());
        assert_eq!(h.guard.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_unsubscribes_and_drops_pending_work() {
        let mut h = harness();
        h.guard.start(Box::new(h.source.clone())).unwrap();
        sleep(Duration::from_millis(10)).await;
        let baseline = h.audio.set_calls().len();

        h.audio.set_default(DeviceRole::Console, "{B}");
        h.source.fire("default:Console");
        h.guard.dispose();
        assert!(!h.source.is_subscribed());

        h.source.fire("removed");
        h.guard.enforce_now("manual-select");
        sleep(Duration::from_secs(2)).await;
        assert_eq!(h.audio.set_calls().len(), baseline);

        // Disposing twice is harmless.
        h.guard.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_unsubscribes() {
        let mut h = harness();
        h.guard.start(Box::new(h.source.clone())).unwrap();
        let source = h.source.clone();
        drop(h);
        assert!(!source.is_subscribed());
    }
}
