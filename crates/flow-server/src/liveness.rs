//! Per-connection liveness state machine.
//!
//! `Connecting -> Open -> Closing -> Closed`. While open, any client traffic
//! resets the read-idle deadline. When the deadline passes the connection
//! first issues a probe; if the probe also goes unanswered it moves to
//! `Closing`. The machine holds no timers itself: the connection task asks
//! it for the next deadline and reports what happened.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::LivenessConfig;

/// Timer and queue settings for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessSettings {
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
    pub probe_timeout: Duration,
    pub outbound_buffer: usize,
}

impl From<&LivenessConfig> for LivenessSettings {
    fn from(config: &LivenessConfig) -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs.max(1)),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs.max(1)),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs.max(1)),
            outbound_buffer: config.outbound_buffer.max(1),
        }
    }
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self::from(&LivenessConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// What the connection should do when its idle deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    /// Send a liveness probe and wait up to the probe timeout.
    Probe,
    /// The probe went unanswered; close the connection.
    Close,
}

#[derive(Debug)]
pub struct Liveness {
    settings: LivenessSettings,
    state: ConnectionState,
    last_traffic: Instant,
    probe_sent_at: Option<Instant>,
}

impl Liveness {
    pub fn new(settings: LivenessSettings, now: Instant) -> Self {
        Self {
            settings,
            state: ConnectionState::Connecting,
            last_traffic: now,
            probe_sent_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// `Connecting -> Open`. Starts the idle clock.
    pub fn open(&mut self, now: Instant) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
            self.last_traffic = now;
        }
    }

    /// Any frame from the client, including a probe reply.
    pub fn record_traffic(&mut self, now: Instant) {
        self.last_traffic = now;
        self.probe_sent_at = None;
    }

    /// When the idle timer next fires.
    pub fn deadline(&self) -> Instant {
        match self.probe_sent_at {
            Some(sent) => sent + self.settings.probe_timeout,
            None => self.last_traffic + self.settings.idle_timeout,
        }
    }

    /// Called when [`Liveness::deadline`] passes.
    pub fn on_deadline(&mut self, now: Instant) -> IdleAction {
        if self.state != ConnectionState::Open {
            return IdleAction::Close;
        }
        if self.probe_sent_at.is_some() {
            self.begin_close();
            return IdleAction::Close;
        }
        self.probe_sent_at = Some(now);
        IdleAction::Probe
    }

    /// `Open | Connecting -> Closing`. Returns `false` if already closing.
    pub fn begin_close(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.state = ConnectionState::Closing;
                true
            }
            ConnectionState::Closing | ConnectionState::Closed => false,
        }
    }

    /// `Closing -> Closed`, after registry cleanup.
    pub fn finish_close(&mut self) {
        self.begin_close();
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LivenessSettings {
        LivenessSettings {
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            probe_timeout: Duration::from_secs(10),
            outbound_buffer: 8,
        }
    }

    #[test]
    fn starts_connecting_then_opens() {
        let t0 = Instant::now();
        let mut l = Liveness::new(settings(), t0);
        assert_eq!(l.state(), ConnectionState::Connecting);
        l.open(t0);
        assert!(l.is_open());
        assert_eq!(l.deadline(), t0 + Duration::from_secs(90));
    }

    #[test]
    fn traffic_pushes_deadline_forward() {
        let t0 = Instant::now();
        let mut l = Liveness::new(settings(), t0);
        l.open(t0);
        l.record_traffic(t0 + Duration::from_secs(60));
        assert_eq!(l.deadline(), t0 + Duration::from_secs(150));
    }

    #[test]
    fn idle_probes_once_then_closes() {
        let t0 = Instant::now();
        let mut l = Liveness::new(settings(), t0);
        l.open(t0);

        let t1 = t0 + Duration::from_secs(90);
        assert_eq!(l.on_deadline(t1), IdleAction::Probe);
        assert_eq!(l.deadline(), t1 + Duration::from_secs(10));

        assert_eq!(l.on_deadline(t1 + Duration::from_secs(10)), IdleAction::Close);
        assert_eq!(l.state(), ConnectionState::Closing);
    }

    #[test]
    fn answered_probe_returns_to_idle_timing() {
        let t0 = Instant::now();
        let mut l = Liveness::new(settings(), t0);
        l.open(t0);
        let t1 = t0 + Duration::from_secs(90);
        l.on_deadline(t1);

        let t2 = t1 + Duration::from_secs(2);
        l.record_traffic(t2);
        assert_eq!(l.deadline(), t2 + Duration::from_secs(90));
        assert_eq!(l.on_deadline(l.deadline()), IdleAction::Probe);
        assert!(l.is_open());
    }

    #[test]
    fn close_is_terminal() {
        let t0 = Instant::now();
        let mut l = Liveness::new(settings(), t0);
        l.open(t0);
        assert!(l.begin_close());
        assert!(!l.begin_close());
        l.finish_close();
        assert_eq!(l.state(), ConnectionState::Closed);

        l.open(t0);
        assert_eq!(l.state(), ConnectionState::Closed);
        assert_eq!(l.on_deadline(t0), IdleAction::Close);
    }

    #[test]
    fn zero_second_config_is_raised_to_one() {
        let config = LivenessConfig {
            heartbeat_interval_secs: 0,
            idle_timeout_secs: 0,
            probe_timeout_secs: 0,
            outbound_buffer: 0,
        };
        let s = LivenessSettings::from(&config);
        assert_eq!(s.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(s.outbound_buffer, 1);
    }
}
