//! Per-DJ connection state (C4).

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::entity::AudioFrame;
use crate::protocol::DjOutbound;
use crate::protocol_constants::{
    LATENCY_CLAMP_MAX_MS, LATENCY_EMA_ALPHA, RATE_LIMIT_CAPACITY, RATE_LIMIT_COST_PER_FRAME,
    RATE_LIMIT_REFILL_PER_SEC,
};
use crate::utils::now_secs;

/// Token-bucket rate limiter: capacity 120 tokens, refill 120/s, 1 token
/// per inbound audio frame. Never exceeds capacity.
#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: f64,
}

impl TokenBucket {
    pub fn new() -> Self {
        Self {
            tokens: RATE_LIMIT_CAPACITY,
            capacity: RATE_LIMIT_CAPACITY,
            refill_per_sec: RATE_LIMIT_REFILL_PER_SEC,
            last_refill: now_secs(),
        }
    }

    /// Attempts to consume one frame's worth of tokens. Returns `true` if
    /// there were enough tokens (and consumes them), `false` if the frame
    /// should be dropped.
    pub fn try_consume(&mut self) -> bool {
        let now = now_secs();
        let elapsed = (now - self.last_refill).max(0.0);
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if self.tokens >= RATE_LIMIT_COST_PER_FRAME {
            self.tokens -= RATE_LIMIT_COST_PER_FRAME;
            true
        } else {
            false
        }
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential moving average, clamped to the documented latency bound.
fn ema_latency(prev: f64, sample: f64) -> f64 {
    let sample = sample.clamp(0.0, LATENCY_CLAMP_MAX_MS);
    ((1.0 - LATENCY_EMA_ALPHA) * prev + LATENCY_EMA_ALPHA * sample).clamp(0.0, LATENCY_CLAMP_MAX_MS)
}

/// A connected DJ's full server-side state.
pub struct DjConnection {
    pub dj_id: String,
    pub dj_name: String,
    pub priority: i64,
    pub direct_mode: bool,
    pub mc_connected: bool,
    pub voice_streaming: bool,

    pub latest_frame: AudioFrame,
    pub frame_count: u64,
    fps_samples: VecDeque<f64>,

    pub network_rtt_ms: f64,
    pub pipeline_latency_ms: f64,

    pub clock_offset_secs: f64,
    pub clock_sync_done: bool,

    pub phase_assist_last_time: f64,
    pub stabilized_bpm: f64,

    rate_limiter: TokenBucket,

    /// Channel used by the broadcast loop / control plane to push
    /// messages to this DJ's socket task without holding the roster lock
    /// across an await.
    pub sender: mpsc::UnboundedSender<DjOutbound>,
}

impl DjConnection {
    pub fn new(
        dj_id: String,
        dj_name: String,
        priority: i64,
        direct_mode: bool,
        sender: mpsc::UnboundedSender<DjOutbound>,
    ) -> Self {
        Self {
            dj_id,
            dj_name,
            priority,
            direct_mode,
            mc_connected: false,
            voice_streaming: false,
            latest_frame: AudioFrame::default(),
            frame_count: 0,
            fps_samples: VecDeque::with_capacity(64),
            network_rtt_ms: 0.0,
            pipeline_latency_ms: 0.0,
            clock_offset_secs: 0.0,
            clock_sync_done: false,
            phase_assist_last_time: 0.0,
            stabilized_bpm: 120.0,
            rate_limiter: TokenBucket::new(),
            sender,
        }
    }

    /// Preferred display latency: network RTT if available, else pipeline latency.
    pub fn latency_ms(&self) -> f64 {
        if self.network_rtt_ms > 0.0 {
            self.network_rtt_ms
        } else {
            self.pipeline_latency_ms
        }
    }

    /// Returns `true` if the frame should be accepted (tokens available),
    /// consuming a token as a side effect.
    pub fn check_rate_limit(&mut self) -> bool {
        self.rate_limiter.try_consume()
    }

    /// Records an accepted audio frame and updates FPS sampling.
    pub fn accept_audio_frame(&mut self, frame: AudioFrame) {
        self.latest_frame = frame;
        self.frame_count += 1;
        self.update_fps();
    }

    /// Updates the rolling-second FPS sample ring.
    pub fn update_fps(&mut self) {
        let now = now_secs();
        self.fps_samples.push_back(now);
        while let Some(&front) = self.fps_samples.front() {
            if now - front > 1.0 {
                self.fps_samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Frames received in roughly the last second.
    pub fn fps(&self) -> f64 {
        self.fps_samples.len() as f64
    }

    /// Blends a new heartbeat RTT sample into `network_rtt_ms` (EMA α=0.2).
    pub fn record_heartbeat_rtt(&mut self, rtt_ms: f64) {
        self.network_rtt_ms = ema_latency(self.network_rtt_ms, rtt_ms);
    }

    /// Blends a new pipeline-latency sample (producer ts → server receive).
    pub fn record_pipeline_latency(&mut self, latency_ms: f64) {
        self.pipeline_latency_ms = ema_latency(self.pipeline_latency_ms, latency_ms);
    }

    /// Sends a message to this DJ's socket task. Errors (socket gone) are
    /// swallowed — the roster's disconnect handling will clean up shortly.
    pub fn send(&self, message: DjOutbound) {
        let _ = self.sender.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn make_conn(id: &str) -> DjConnection {
        let (tx, _rx) = unbounded_channel();
        DjConnection::new(id.to_string(), id.to_string(), 10, false, tx)
    }

    #[test]
    fn rate_limiter_starts_full_and_drains() {
        let mut bucket = TokenBucket::new();
        for _ in 0..120 {
            assert!(bucket.try_consume());
        }
        assert!(!bucket.try_consume());
    }

    #[test]
    fn latency_prefers_network_rtt() {
        let mut conn = make_conn("alice");
        conn.pipeline_latency_ms = 50.0;
        assert_eq!(conn.latency_ms(), 50.0);
        conn.network_rtt_ms = 20.0;
        assert_eq!(conn.latency_ms(), 20.0);
    }

    #[test]
    fn latency_samples_clamp_to_max() {
        let mut conn = make_conn("bob");
        conn.record_heartbeat_rtt(1_000_000.0);
        assert!(conn.network_rtt_ms <= 60_000.0);
    }

    #[test]
    fn accept_audio_frame_tracks_fps() {
        let mut conn = make_conn("carol");
        for _ in 0..10 {
            conn.accept_audio_frame(AudioFrame::default());
        }
        assert_eq!(conn.frame_count, 10);
        assert_eq!(conn.fps(), 10.0);
    }
}
