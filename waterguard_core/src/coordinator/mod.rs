//! Polling coordinator
//!
//! Owns one polling session per hub. Each cycle reads the hub through the
//! [`DeviceClient`], routes values into the [`EntityCache`], updates the
//! [`StateMachine`], decides on notifications and picks the next interval.
//!
//! Only one cycle runs at a time: the session state sits behind a mutex held
//! for the whole cycle. Cache, state machine and the published snapshot use
//! their own short-lived locks so queries stay responsive mid-cycle.

pub mod interval;
pub mod session;

pub use interval::{base_interval, compute_interval, should_reapply};
pub use session::{SessionState, connected_valves};

use crate::alarm::AlarmConditions;
use crate::cache::{EntityCache, Reading};
use crate::config::{HubConfig, NotificationConfig, PollConfig};
use crate::diagnostics::{DiagnosticsReport, WirelessDiagnostic, WirelessRun};
use crate::error::{Error, PollError, Result};
use crate::notify::{AlarmChange, AlarmEvent, Notifier, NullNotifier};
use crate::protocol::{DeviceClient, HubStatus};
use crate::state_machine::{StateMachine, StateMachineInfo, ValveMotion};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, watch};

/// Discovery attempts made during setup
pub const DISCOVERY_ATTEMPTS: u32 = 3;

/// Pause between discovery attempts
pub const DISCOVERY_RETRY_DELAY: Duration = Duration::from_secs(2);

/// What the coordinator publishes after every cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollSnapshot {
    pub status: Option<HubStatus>,
    pub last_success: Option<DateTime<Utc>>,
    pub interval: Duration,
    pub cycles: u64,
    pub alarm_active: bool,
    pub discovery_complete: bool,
    pub valve_motion: [ValveMotion; 2],
    pub active_alarms: Vec<AlarmEvent>,
}

/// Drives periodic polling of one hub
pub struct PollingCoordinator {
    client: Arc<DeviceClient>,
    hub: HubConfig,
    poll: RwLock<PollConfig>,
    notifications: RwLock<NotificationConfig>,
    cache: EntityCache,
    state: StateMachine,
    session: Mutex<SessionState>,
    wireless_diagnostic: Mutex<WirelessDiagnostic>,
    notifier: Arc<dyn Notifier>,
    discovery_delay: Duration,
    published: watch::Sender<PollSnapshot>,
    stopped: AtomicBool,
    /// Set while a cycle holds the session, not during setup or reconfiguration
    cycle_running: AtomicBool,
}

impl PollingCoordinator {
    pub fn new(
        client: Arc<DeviceClient>,
        hub: HubConfig,
        poll: PollConfig,
        notifications: NotificationConfig,
    ) -> Self {
        let poll = poll.validated();
        let interval = poll.scan_duration();
        let (published, _) = watch::channel(PollSnapshot {
            interval,
            ..PollSnapshot::default()
        });
        Self {
            client,
            hub,
            poll: RwLock::new(poll),
            notifications: RwLock::new(notifications),
            cache: EntityCache::default(),
            state: StateMachine::new(),
            session: Mutex::new(SessionState::new(interval)),
            wireless_diagnostic: Mutex::new(WirelessDiagnostic::new()),
            notifier: Arc::new(NullNotifier),
            discovery_delay: DISCOVERY_RETRY_DELAY,
            published,
            stopped: AtomicBool::new(false),
            cycle_running: AtomicBool::new(false),
        }
    }

    /// Build a coordinator talking UDP to the configured hub
    pub fn from_config(
        hub: HubConfig,
        poll: PollConfig,
        notifications: NotificationConfig,
    ) -> Result<Self> {
        hub.validate()?;
        let client = DeviceClient::with_udp(hub.transport_config(), hub.device_id);
        Ok(Self::new(Arc::new(client), hub, poll, notifications))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_discovery_delay(mut self, delay: Duration) -> Self {
        self.discovery_delay = delay;
        self
    }

    pub fn client(&self) -> &Arc<DeviceClient> {
        &self.client
    }

    pub fn hub(&self) -> &HubConfig {
        &self.hub
    }

    /// Discover wireless sensors before the first cycle.
    ///
    /// Sensors sleep most of the time, so discovery is retried a few times.
    /// Setup completes even when nothing is found.
    pub async fn setup(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if !self.poll.read().await.poll_wireless {
            debug!("Wireless polling disabled, skipping discovery");
            session.discovery_complete = true;
            self.publish(&session);
            return Ok(());
        }

        for attempt in 1..=DISCOVERY_ATTEMPTS {
            info!("Wireless discovery attempt {attempt}/{DISCOVERY_ATTEMPTS}");
            match self.client.discover_wireless_sensors().await {
                Ok(found) if !found.is_empty() => {
                    let values = found.values();
                    self.client.seed_wireless_data(values.clone()).await;
                    session.last_wireless = values;
                    break;
                }
                Ok(_) => debug!("Discovery attempt {attempt} found no sensors"),
                Err(e) => warn!("Discovery attempt {attempt} failed: {e}"),
            }
            if attempt < DISCOVERY_ATTEMPTS {
                tokio::time::sleep(self.discovery_delay).await;
            }
        }

        session.discovery_complete = true;
        self.publish(&session);
        Ok(())
    }

    /// Run one cycle, waiting for any cycle already in flight
    pub async fn refresh(&self) -> Result<HubStatus> {
        self.ensure_running()?;
        let mut session = self.session.lock().await;
        self.run_cycle(&mut session).await
    }

    /// Run a cycle now, or wait for the in-flight one and return its result.
    ///
    /// Only a running cycle is joined. While setup or `update_config` holds
    /// the session the request waits and then runs its own cycle.
    pub async fn request_refresh(&self) -> Result<HubStatus> {
        self.ensure_running()?;
        if !self.cycle_running.load(Ordering::SeqCst) {
            return self.refresh().await;
        }

        debug!("Refresh already in progress, waiting for it");
        let session = self.session.lock().await;
        session
            .last_snapshot
            .clone()
            .ok_or(Error::Poll(PollError::NoData))
    }

    /// Poll until `shutdown` flips to true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if !self.session.lock().await.discovery_complete {
            self.setup().await?;
        }

        while !*shutdown.borrow() {
            if let Err(e) = self.refresh().await {
                warn!("Poll cycle failed: {e}");
            }

            let interval = self.current_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Polling stopped for {}", self.hub.host);
        Ok(())
    }

    /// Refuse further cycles
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PollError::Stopped.into());
        }
        Ok(())
    }

    async fn run_cycle(&self, session: &mut SessionState) -> Result<HubStatus> {
        self.cycle_running.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.poll_once(session).await;
        session.last_cycle_duration = started.elapsed();
        session.cycles += 1;

        let result = match result {
            Ok(status) => Ok(status),
            Err(e) if matches!(e, Error::Poll(PollError::NoData)) || e.is_transient_network() => {
                match session.last_snapshot.clone() {
                    Some(previous) => {
                        warn!("Cycle failed ({e}), keeping previous snapshot");
                        Ok(previous)
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        self.reschedule(session).await;
        self.publish(session);
        self.cycle_running.store(false, Ordering::SeqCst);
        result
    }

    async fn poll_once(&self, session: &mut SessionState) -> Result<HubStatus> {
        let poll = self.poll.read().await.clone();
        let now = Utc::now();

        let force_wireless =
            poll.poll_wireless && session.wireless_due(Instant::now(), poll.wireless_poll_duration());

        let mut status = HubStatus {
            water: self.client.read_water_status().await?,
            valve: self.client.read_valve_status().await?,
            device: self.client.read_device_info().await?,
            ..HubStatus::default()
        };
        if poll.poll_wireless {
            // Unforced reads may return the client's cached values, so an
            // offline hub can take a couple of cycles to show up as NoData.
            status.wireless = self.client.read_wireless_sensors(force_wireless).await?;
            if force_wireless {
                session.last_wireless_poll = Some(Instant::now());
            }
        }

        if status.is_empty() {
            warn!("Hub returned no data");
            self.notify(session, &status, &[], now).await;
            return Err(PollError::NoData.into());
        }

        session.merge_wireless(&mut status);
        self.cache_status(&status, now).await;

        let conditions = AlarmConditions::evaluate(&status);
        self.state.update_alarm(conditions.any(), now).await;

        let disconnects = session.track_valve_connections(&status.valve);
        for valve in &disconnects {
            warn!("Valve {valve} disconnected");
        }

        self.state.update_valve(status.valve.status1, now).await;
        if self.state.should_force_resync().await {
            debug!("Valve state stale, re-reading valve status");
            let valve = self.client.read_valve_status().await?;
            self.state.update_valve(valve.status1, now).await;
        }

        session.observe_motion(&status.valve);
        self.notify(session, &status, &disconnects, now).await;

        if conditions.any() != session.alarm_active {
            if conditions.any() {
                warn!("Alarm condition detected, switching to fast polling: {conditions:?}");
            } else {
                info!("Alarm condition cleared, returning to normal polling");
            }
            session.alarm_active = conditions.any();
        }

        session.last_snapshot = Some(status.clone());
        session.last_success = Some(now);
        Ok(status)
    }

    async fn cache_status(&self, status: &HubStatus, now: DateTime<Utc>) {
        let water = status.water.entries().into_iter().map(|(k, v)| (format!("water_{k}"), v));
        let valve = status.valve.entries().into_iter().map(|(k, v)| (format!("valve_{k}"), v));
        let wireless = status
            .wireless
            .entries()
            .into_iter()
            .map(|(k, v)| (format!("wireless_{k}"), v));

        for (key, value) in water.chain(valve).chain(wireless) {
            if value.is_some() {
                self.cache.add_reading(key, value, now).await;
            }
        }
    }

    /// Update the alarm tracker and hand new transitions to the notifier.
    ///
    /// Debounced valve disconnects join the valve alarm, so one disconnect
    /// yields at most one delivery.
    async fn notify(
        &self,
        session: &mut SessionState,
        status: &HubStatus,
        disconnects: &[u8],
        now: DateTime<Utc>,
    ) {
        let config = self.notifications.read().await.clone();
        if !config.enabled {
            return;
        }
        let settings = config.settings();
        let mut changes = session.alarms.check(status, now);
        for valve in disconnects {
            if let Some(event) = session.alarms.valve_disconnected(*valve, now) {
                changes.push(AlarmChange::Raised(event));
            }
        }
        if !settings.delivers() {
            return;
        }
        for change in changes {
            match change {
                AlarmChange::Raised(event) => self.notifier.alarm_raised(&event, &settings).await,
                AlarmChange::Cleared(kind) => self.notifier.alarm_cleared(kind, &settings).await,
            }
        }
    }

    async fn reschedule(&self, session: &mut SessionState) {
        let poll = self.poll.read().await;
        let base = base_interval(&poll, session.alarm_active);
        let next = compute_interval(base, session.last_cycle_duration);
        if should_reapply(session.current_interval, next) {
            info!(
                "Poll interval {:.1}s -> {:.1}s",
                session.current_interval.as_secs_f64(),
                next.as_secs_f64()
            );
            session.current_interval = next;
        }
    }

    fn publish(&self, session: &SessionState) {
        self.published.send_replace(PollSnapshot {
            status: session.last_snapshot.clone(),
            last_success: session.last_success,
            interval: session.current_interval,
            cycles: session.cycles,
            alarm_active: session.alarm_active,
            discovery_complete: session.discovery_complete,
            valve_motion: session.motion(),
            active_alarms: session.alarms.active(),
        });
    }

    /// Replace polling and notification settings
    ///
    /// The interval is recomputed right away; the fast interval stays in
    /// effect while an alarm is active.
    pub async fn update_config(&self, poll: PollConfig, notifications: NotificationConfig) {
        let poll = poll.validated();
        let mut session = self.session.lock().await;
        let base = base_interval(&poll, session.alarm_active);
        session.current_interval = compute_interval(base, session.last_cycle_duration);
        info!(
            "Configuration updated, poll interval now {:.1}s",
            session.current_interval.as_secs_f64()
        );
        *self.poll.write().await = poll;
        *self.notifications.write().await = notifications;
        self.publish(&session);
    }

    pub async fn poll_config(&self) -> PollConfig {
        self.poll.read().await.clone()
    }

    pub async fn cache_stats(&self) -> BTreeMap<String, usize> {
        self.cache.stats().await
    }

    pub async fn state_machine_info(&self) -> StateMachineInfo {
        self.state.info().await
    }

    pub async fn latest_reading(&self, key: &str) -> Option<Reading> {
        self.cache.latest(key).await
    }

    pub async fn has_cached_data(&self, key: &str) -> bool {
        self.cache.has_data(key).await
    }

    pub fn current_interval(&self) -> Duration {
        self.published.borrow().interval
    }

    pub fn last_snapshot(&self) -> Option<HubStatus> {
        self.published.borrow().status.clone()
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.published.borrow().clone()
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.published.subscribe()
    }

    /// Probe each wireless object directly and record the run
    pub async fn diagnose_wireless(&self) -> Result<WirelessRun> {
        let mut diagnostic = self.wireless_diagnostic.lock().await;
        Ok(diagnostic.run(&self.client).await?)
    }

    pub async fn wireless_trend(&self) -> crate::diagnostics::Trend {
        self.wireless_diagnostic.lock().await.trend()
    }

    pub async fn diagnostics(&self) -> DiagnosticsReport {
        let stats = self.cache.stats().await;
        let mut latest = BTreeMap::new();
        for key in stats.keys() {
            if let Some(reading) = self.cache.latest(key).await {
                latest.insert(key.clone(), reading);
            }
        }

        DiagnosticsReport {
            generated_at: Utc::now(),
            hub: self.hub.clone(),
            poll: self.poll.read().await.clone(),
            snapshot: self.snapshot(),
            cache: stats,
            latest,
            state_machine: self.state.info().await,
            transport: self.client.transport_stats().await,
            wireless_sensors: self.client.wireless_sensor_status().await,
        }
    }
}
