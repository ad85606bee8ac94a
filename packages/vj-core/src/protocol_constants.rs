//! Fixed protocol and tuning constants that should not be changed casually.
//!
//! Several of these values are defined by the wire protocol this server
//! shares with its DJ clients and its renderer, and changing them would
//! break compatibility. Others are tuning constants carried over from the
//! reference implementation's behavior.

// ─────────────────────────────────────────────────────────────────────────────
// Socket limits
// ─────────────────────────────────────────────────────────────────────────────

/// Default port for the DJ-facing WebSocket.
pub const DEFAULT_DJ_PORT: u16 = 9000;

/// Default port for the browser/admin WebSocket.
pub const DEFAULT_BROWSER_PORT: u16 = 8766;

/// Default port for the admin panel / preview static HTTP server.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default port for the standalone health/metrics HTTP listener.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Default outbound renderer ("Minecraft") WebSocket port.
pub const DEFAULT_RENDERER_PORT: u16 = 8765;

/// Default outbound renderer host.
pub const DEFAULT_RENDERER_HOST: &str = "localhost";

/// Maximum inbound message size accepted on the DJ WebSocket (bytes).
pub const DJ_MESSAGE_MAX_BYTES: usize = 64 * 1024;

/// Maximum inbound message size accepted on the browser/admin WebSocket (bytes).
pub const BROWSER_MESSAGE_MAX_BYTES: usize = 256 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Auth / connect-code timing
// ─────────────────────────────────────────────────────────────────────────────

/// Deadline for a newly opened DJ socket to complete `dj_auth` or `code_auth`.
pub const AUTH_DEADLINE_SECS: u64 = 10;

/// Deadline for the clock-sync round trip after successful auth.
pub const CLOCK_SYNC_DEADLINE_SECS: u64 = 5;

/// Clock-sync timestamps further apart than this from "now" are rejected.
pub const CLOCK_SYNC_MAX_SKEW_SECS: f64 = 3600.0;

/// Clock-sync measured round-trip time must fall within this bound to be accepted.
pub const CLOCK_SYNC_MAX_RTT_SECS: f64 = 30.0;

/// Default connect-code time-to-live (minutes).
pub const CONNECT_CODE_DEFAULT_TTL_MINUTES: i64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Rate limiting
// ─────────────────────────────────────────────────────────────────────────────

/// Token-bucket capacity for inbound DJ audio frames.
pub const RATE_LIMIT_CAPACITY: f64 = 120.0;

/// Token-bucket refill rate (tokens/second) for inbound DJ audio frames.
pub const RATE_LIMIT_REFILL_PER_SEC: f64 = 120.0;

/// Tokens consumed per accepted `dj_audio_frame`.
pub const RATE_LIMIT_COST_PER_FRAME: f64 = 1.0;

// ─────────────────────────────────────────────────────────────────────────────
// Latency metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Upper clamp for every latency measurement (milliseconds).
pub const LATENCY_CLAMP_MAX_MS: f64 = 60_000.0;

/// EMA smoothing factor applied to network RTT and pipeline latency.
pub const LATENCY_EMA_ALPHA: f64 = 0.2;

// ─────────────────────────────────────────────────────────────────────────────
// Broadcast loop
// ─────────────────────────────────────────────────────────────────────────────

/// Nominal broadcast loop tick interval (milliseconds), ~60 Hz.
pub const BROADCAST_TICK_MS: u64 = 16;

/// Per-observer send timeout during browser fan-out (milliseconds).
pub const BROWSER_SEND_TIMEOUT_MS: u64 = 500;

/// Decay factor applied to fallback audio (no active DJ) per tick.
pub const FALLBACK_AUDIO_DECAY: f64 = 0.95;

/// Number of consecutive broadcast-loop errors before backing off.
pub const BROADCAST_ERROR_BACKOFF_THRESHOLD: u64 = 50;

/// Sleep duration once the error backoff threshold is reached (milliseconds).
pub const BROADCAST_ERROR_BACKOFF_MS: u64 = 1000;

/// Interval between health-summary log lines (seconds).
pub const HEALTH_LOG_INTERVAL_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Renderer client (C9)
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for request/response operations against the renderer.
pub const RENDERER_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Timeout for establishing the renderer connection.
pub const RENDERER_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Initial reconnect backoff (seconds).
pub const RENDERER_BACKOFF_INITIAL_SECS: f64 = 5.0;

/// Reconnect backoff multiplier applied after each failed attempt.
pub const RENDERER_BACKOFF_MULTIPLIER: f64 = 1.5;

/// Reconnect backoff ceiling (seconds).
pub const RENDERER_BACKOFF_MAX_SECS: f64 = 10.0;

/// Interval between renderer connectivity polls (seconds).
pub const RENDERER_POLL_INTERVAL_SECS: u64 = 5;

/// Beat intensity threshold above which a particle burst is sent alongside entities.
pub const BEAT_PARTICLE_INTENSITY_THRESHOLD: f64 = 0.2;

// ─────────────────────────────────────────────────────────────────────────────
// Browser heartbeat supervisor (C12)
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between browser heartbeat pings (seconds).
pub const BROWSER_HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Number of missed pongs before a browser socket is force-closed.
pub const BROWSER_HEARTBEAT_MAX_MISSED: u32 = 2;

/// Close code used when a browser socket misses too many heartbeats.
pub const CLOSE_CODE_HEARTBEAT_TIMEOUT: u16 = 4100;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket close codes (server-initiated, DJ socket)
// ─────────────────────────────────────────────────────────────────────────────

/// DJ socket did not complete auth within [`AUTH_DEADLINE_SECS`].
pub const CLOSE_CODE_AUTH_TIMEOUT: u16 = 4001;
/// DJ socket sent invalid JSON.
pub const CLOSE_CODE_INVALID_JSON: u16 = 4002;
/// DJ socket sent a non-auth message before authenticating.
pub const CLOSE_CODE_EXPECTED_AUTH: u16 = 4003;
/// DJ authentication or connect-code validation failed or expired.
pub const CLOSE_CODE_AUTH_FAILED: u16 = 4004;
/// A DJ with this id is already connected.
pub const CLOSE_CODE_DUPLICATE_CONNECTION: u16 = 4005;
/// An operator denied this DJ's pending application.
pub const CLOSE_CODE_DENIED: u16 = 4006;
/// An operator kicked this DJ.
pub const CLOSE_CODE_KICKED: u16 = 4010;

// ─────────────────────────────────────────────────────────────────────────────
// Pattern / entity bounds
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum allowed `entity_count`.
pub const ENTITY_COUNT_MIN: u32 = 1;

/// Maximum allowed `entity_count`.
pub const ENTITY_COUNT_MAX: u32 = 256;

/// Number of audio bands carried on every `AudioFrame`/`AudioState`.
pub const BAND_COUNT: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Capacity
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the internal broadcast channel used to fan events out to
/// browser observer tasks.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
