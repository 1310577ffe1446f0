// ── Command executor ──
//
// One send-and-verify cycle: claim the (target, property) key, write
// through the gateway, wait out the profile's initial window, then poll
// until the device reports the desired value or the retry budget is
// spent. A spent budget rolls the property back to its last confirmed
// value and marks it unknown.
//
// Every terminal outcome updates the reconciler exactly once:
// Confirmed -> optimistic update, RolledBack -> invalidate, Failed ->
// store untouched (nothing was ever applied).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::gateway::DeviceGateway;
use crate::inflight::InFlightRegistry;
use crate::model::{CommandKey, PropertyKey, PropertyValue, TargetId};
use crate::ratelimit::RateLimiter;
use crate::reconciler::StateReconciler;
use crate::tracker::{ErrorCategory, ErrorSeverity, ErrorTracker};
use crate::verify::{self, VerificationProfile};

/// Lifecycle of one command. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Pending,
    Sent,
    Confirmed,
    Failed,
    RolledBack,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::RolledBack)
    }
}

/// Internal record of a command moving through its lifecycle.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub id: Uuid,
    pub key: CommandKey,
    pub desired: PropertyValue,
    pub attempts: u32,
    pub status: CommandStatus,
    pub deadline: DateTime<Utc>,
}

impl PendingCommand {
    fn new(key: CommandKey, desired: PropertyValue, profile: &VerificationProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            desired,
            attempts: 0,
            status: CommandStatus::Pending,
            deadline: Utc::now()
                + chrono::Duration::from_std(profile.ceiling())
                    .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }
}

/// Result of one completed execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// Terminal status: Confirmed, Failed, or RolledBack.
    pub status: CommandStatus,
    /// Last value the device reported, when any poll succeeded.
    pub observed: Option<PropertyValue>,
    /// Gateway attempts spent (sends plus verification polls).
    pub attempts: u32,
}

impl CommandOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.status == CommandStatus::Confirmed
    }
}

/// Transport-class send failures are retried this many times.
const SEND_RETRIES: u32 = 2;
const SEND_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Orchestrates send-and-verify cycles against the gateway.
pub struct CommandExecutor {
    gateway: Arc<dyn DeviceGateway>,
    limiter: Arc<RateLimiter>,
    registry: Arc<InFlightRegistry>,
    reconciler: Arc<StateReconciler>,
    tracker: Arc<ErrorTracker>,
}

impl CommandExecutor {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        limiter: Arc<RateLimiter>,
        registry: Arc<InFlightRegistry>,
        reconciler: Arc<StateReconciler>,
        tracker: Arc<ErrorTracker>,
    ) -> Self {
        Self {
            gateway,
            limiter,
            registry,
            reconciler,
            tracker,
        }
    }

    /// Execute one state-changing command and verify it took effect.
    ///
    /// Fails fast with [`CoreError::Busy`] when another execution owns
    /// the same (target, property) key, and with [`CoreError::Throttled`]
    /// when the gateway rate-limits the write itself -- the command was
    /// not sent and may be retried after the backoff window.
    pub async fn execute(
        &self,
        target: &TargetId,
        property: PropertyKey,
        desired: PropertyValue,
    ) -> Result<CommandOutcome, CoreError> {
        let key = CommandKey::new(target.clone(), property);
        let _claim = self.registry.try_claim(key.clone())?;

        let profile = verify::classify(&key.property, &desired);
        let mut command = PendingCommand::new(key, desired, &profile);
        debug!(
            id = %command.id,
            key = %command.key,
            desired = %command.desired,
            volatility = ?profile.volatility,
            "executing command"
        );

        if !self.send(&mut command).await? {
            // Fatal send failure: terminal Failed, store untouched.
            return Ok(CommandOutcome {
                status: CommandStatus::Failed,
                observed: None,
                attempts: command.attempts,
            });
        }

        self.verify(&mut command, &profile).await
    }

    // ── Send phase ───────────────────────────────────────────────────

    /// Send the write. Returns `Ok(true)` when the gateway accepted it,
    /// `Ok(false)` on a fatal (terminal-Failed) error.
    async fn send(&self, command: &mut PendingCommand) -> Result<bool, CoreError> {
        let mut transport_retries = 0;
        loop {
            self.limiter.wait_ready().await;
            command.attempts += 1;

            match self
                .gateway
                .set_property(&command.key.target, &command.key.property, &command.desired)
                .await
            {
                Ok(()) => {
                    self.limiter.record_success();
                    command.status = CommandStatus::Sent;
                    return Ok(true);
                }
                Err(e) if e.is_throttled() => {
                    self.limiter.record_throttle();
                    return Err(e);
                }
                Err(e) if e.is_validation() => {
                    command.status = CommandStatus::Failed;
                    self.tracker.track(
                        ErrorCategory::Command,
                        ErrorSeverity::Error,
                        format!("gateway rejected {}: {e}", command.key),
                        Some("COMMAND_REJECTED"),
                        Some(serde_json::json!({
                            "key": command.key.to_string(),
                            "requested": command.desired.to_json(),
                        })),
                    );
                    return Ok(false);
                }
                Err(e) if e.is_transient() && transport_retries < SEND_RETRIES => {
                    transport_retries += 1;
                    warn!(
                        key = %command.key,
                        error = %e,
                        retry = transport_retries,
                        "transient send failure, retrying"
                    );
                    sleep(SEND_RETRY_DELAY).await;
                }
                Err(e) => {
                    command.status = CommandStatus::Failed;
                    self.tracker.track(
                        ErrorCategory::Command,
                        ErrorSeverity::Error,
                        format!("send failed for {}: {e}", command.key),
                        Some("COMMAND_SEND_FAILED"),
                        None,
                    );
                    return Ok(false);
                }
            }
        }
    }

    // ── Verify phase ─────────────────────────────────────────────────

    async fn verify(
        &self,
        command: &mut PendingCommand,
        profile: &VerificationProfile,
    ) -> Result<CommandOutcome, CoreError> {
        sleep(profile.initial_wait).await;

        let mut observed = None;
        for poll in 0..=profile.max_retries {
            command.attempts += 1;

            match self.poll(&command.key).await {
                Ok(Some(value)) => {
                    let matched = verify::matches(&command.desired, &value, profile.volatility);
                    observed = Some(value);
                    if matched {
                        command.status = CommandStatus::Confirmed;
                        self.reconciler
                            .confirm(&command.key, command.desired.clone());
                        info!(
                            id = %command.id,
                            key = %command.key,
                            attempts = command.attempts,
                            "command confirmed"
                        );
                        return Ok(CommandOutcome {
                            status: CommandStatus::Confirmed,
                            observed,
                            attempts: command.attempts,
                        });
                    }
                    debug!(
                        key = %command.key,
                        poll,
                        "observed value does not match yet"
                    );
                }
                // Property unobservable this poll (component list
                // dropped); treat as a mismatch and keep polling.
                Ok(None) => debug!(key = %command.key, poll, "property not observable"),
                Err(e) if e.is_throttled() => {
                    // Mid-verification we cannot abandon the command
                    // without a terminal status; absorb the backoff and
                    // spend a retry on it.
                    self.limiter.record_throttle();
                    self.limiter.wait_ready().await;
                }
                Err(e) => warn!(key = %command.key, error = %e, "verification poll failed"),
            }

            if poll < profile.max_retries {
                sleep(profile.retry_interval).await;
            }
        }

        self.rollback(command, observed).await
    }

    async fn rollback(
        &self,
        command: &mut PendingCommand,
        observed: Option<PropertyValue>,
    ) -> Result<CommandOutcome, CoreError> {
        let fallback = self.reconciler.fallback_for(&command.key);
        warn!(
            id = %command.id,
            key = %command.key,
            requested = %command.desired,
            fallback = %fallback,
            "verification deadline passed, rolling back"
        );

        // Best effort: a failed restore still leaves the property
        // marked unknown, and the next poll re-establishes truth.
        if fallback != command.desired {
            if let Err(e) = self
                .gateway
                .set_property(&command.key.target, &command.key.property, &fallback)
                .await
            {
                warn!(key = %command.key, error = %e, "rollback write failed");
            }
        }
        self.reconciler.invalidate(&command.key);
        command.status = CommandStatus::RolledBack;

        self.tracker.track(
            ErrorCategory::Verification,
            ErrorSeverity::Error,
            format!("verification timed out for {}", command.key),
            Some("VERIFY_TIMEOUT"),
            Some(serde_json::json!({
                "key": command.key.to_string(),
                "requested": command.desired.to_json(),
                "observed": observed.as_ref().map(PropertyValue::to_json),
                "attempts": command.attempts,
            })),
        );

        Ok(CommandOutcome {
            status: CommandStatus::RolledBack,
            observed,
            attempts: command.attempts,
        })
    }

    /// One verification poll through the rate-limit gate.
    async fn poll(&self, key: &CommandKey) -> Result<Option<PropertyValue>, CoreError> {
        self.limiter.wait_ready().await;
        let snapshot = self.gateway.snapshot(&key.target).await?;
        self.limiter.record_success();
        Ok(snapshot.property(&key.property))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{LightMode, LightSetting, SwitchState};
    use crate::testutil::{MockGateway, engine_parts};
    use tokio::time::Instant;

    fn light(zone: u8) -> PropertyKey {
        PropertyKey::LightSetting { zone }
    }

    fn setting(mode: LightMode, intensity: u8) -> PropertyValue {
        PropertyValue::Light(LightSetting::new(mode, intensity))
    }

    #[tokio::test(start_paused = true)]
    async fn static_command_confirms_on_first_poll() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let (executor, parts) = engine_parts(gateway.clone());

        let outcome = executor
            .execute(&parts.target, light(1), setting(LightMode::Red, 50))
            .await
            .unwrap();

        assert!(outcome.is_confirmed());
        // 1 send + 1 poll.
        assert_eq!(outcome.attempts, 2);
        assert_eq!(
            parts
                .reconciler
                .fallback_for(&CommandKey::new(parts.target.clone(), light(1))),
            setting(LightMode::Red, 50)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn static_mode_with_dropped_intensity_rolls_back() {
        // Gateway applies the mode but reports intensity 0: both fields
        // are checked for a static mode, so verification must fail.
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        gateway.zero_intensity_for(LightMode::Red);
        let (executor, parts) = engine_parts(gateway.clone());

        let outcome = executor
            .execute(&parts.target, light(1), setting(LightMode::Red, 50))
            .await
            .unwrap();

        assert_eq!(outcome.status, CommandStatus::RolledBack);
        assert_eq!(outcome.observed, Some(setting(LightMode::Red, 0)));
        // Rolled back -> property unknown until the next poll.
        assert_eq!(
            parts
                .reconciler
                .current_value(&CommandKey::new(parts.target.clone(), light(1))),
            Some(serde_json::Value::Null)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dynamic_mode_ignores_dropped_intensity() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        gateway.zero_intensity_for(LightMode::ColorWheel);
        let (executor, parts) = engine_parts(gateway.clone());

        let outcome = executor
            .execute(&parts.target, light(1), setting(LightMode::ColorWheel, 50))
            .await
            .unwrap();

        assert!(outcome.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn validation_rejection_is_terminal_failed_without_retry() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        gateway.reject_mode(LightMode::Party);
        let (executor, parts) = engine_parts(gateway.clone());

        let outcome = executor
            .execute(&parts.target, light(1), setting(LightMode::Party, 100))
            .await
            .unwrap();

        assert_eq!(outcome.status, CommandStatus::Failed);
        assert_eq!(gateway.set_calls(), 1);
        // Failed leaves the store untouched but lands in the tracker.
        assert_eq!(
            parts
                .reconciler
                .current_value(&CommandKey::new(parts.target.clone(), light(1))),
            None
        );
        assert_eq!(parts.tracker.count_for(ErrorCategory::Command), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_send_failures_are_retried() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        gateway.fail_transport(2);
        let (executor, parts) = engine_parts(gateway.clone());

        let outcome = executor
            .execute(&parts.target, light(1), setting(LightMode::Blue, 25))
            .await
            .unwrap();

        assert!(outcome.is_confirmed());
        // 2 failed sends + 1 good send.
        assert_eq!(gateway.set_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_send_surfaces_after_recording_backoff() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        gateway.throttle_next(1);
        let (executor, parts) = engine_parts(gateway.clone());

        let err = executor
            .execute(&parts.target, light(1), setting(LightMode::Blue, 25))
            .await
            .unwrap_err();

        assert!(err.is_throttled());
        assert_eq!(parts.limiter.consecutive_throttles(), 1);
        assert!(parts.limiter.remaining_backoff().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_execute_on_same_key_fails_fast() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        // Slow the apply down so the first execute holds the claim.
        gateway.set_apply_delay(Duration::from_secs(3));
        let (executor, parts) = engine_parts(gateway.clone());
        let executor = Arc::new(executor);

        let first = {
            let executor = Arc::clone(&executor);
            let target = parts.target.clone();
            tokio::spawn(async move {
                executor
                    .execute(&target, light(1), setting(LightMode::Green, 50))
                    .await
            })
        };
        // Let the first claim the key.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = executor
            .execute(&parts.target, light(1), setting(LightMode::Blue, 25))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Busy { .. }));

        // A different key proceeds concurrently.
        let gateway2 = Arc::new(MockGateway::with_zones(&[2]));
        let (executor2, parts2) = engine_parts(gateway2);
        assert!(
            executor2
                .execute(&parts2.target, light(2), setting(LightMode::Blue, 25))
                .await
                .unwrap()
                .is_confirmed()
        );

        assert!(first.await.unwrap().unwrap().is_confirmed());
        // Claims are RAII guards: every key was released.
        assert!(parts.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn static_failure_respects_time_ceiling() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        gateway.never_apply();
        let (executor, parts) = engine_parts(gateway.clone());

        let profile = crate::verify::STATIC_PROFILE;
        let start = Instant::now();
        let outcome = executor
            .execute(&parts.target, light(1), setting(LightMode::Red, 50))
            .await
            .unwrap();
        let elapsed = Instant::now() - start;

        assert_eq!(outcome.status, CommandStatus::RolledBack);
        // Total wait ≤ initial_wait + max_retries * retry_interval
        // (plus scheduling noise, which paused time keeps at zero).
        assert!(elapsed <= profile.ceiling() + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_restores_last_confirmed_value() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let (executor, parts) = engine_parts(gateway.clone());

        // Establish a confirmed baseline.
        executor
            .execute(&parts.target, light(1), setting(LightMode::Green, 75))
            .await
            .unwrap();

        // Next command never applies -> rollback writes GREEN@75 back.
        gateway.never_apply();
        let outcome = executor
            .execute(&parts.target, light(1), setting(LightMode::Purple, 25))
            .await
            .unwrap();

        assert_eq!(outcome.status, CommandStatus::RolledBack);
        let last = gateway.last_set_value().unwrap();
        assert_eq!(last, setting(LightMode::Green, 75));
    }

    #[tokio::test(start_paused = true)]
    async fn pump_commands_verify_via_switch_state() {
        let gateway = Arc::new(MockGateway::with_pumps(&["P1"]));
        let (executor, parts) = engine_parts(gateway.clone());

        let outcome = executor
            .execute(
                &parts.target,
                PropertyKey::PumpState {
                    pump_id: "P1".into(),
                },
                PropertyValue::Pump(SwitchState::On),
            )
            .await
            .unwrap();

        assert!(outcome.is_confirmed());
    }
}
