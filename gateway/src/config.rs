use std::env;
use std::time::Duration;

/// Resolved configuration for one gateway process, loaded from environment
/// variables (with `.env` support via `dotenvy`) with typed defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub room_url: Option<String>,
    pub room_token: Option<String>,

    pub local_stop_enabled: bool,
    pub local_stop_guard_ms: u32,
    pub local_stop_min_rms: f32,
    pub local_stop_require_interim: bool,
    pub local_stop_interim_window_ms: u32,
    pub local_stop_min_interim_len: usize,

    pub worker_vad_aggressiveness: u8,
    pub worker_vad_hangover_ms: u32,
    pub worker_vad_max_utterance_ms: u32,
    pub worker_vad_min_start_frames_while_tts: u32,

    pub stt_enabled: bool,
    pub stt_continuous: bool,
    pub stt_min_rms: f32,
    pub stt_suppression_cooldown_ms: u32,
    pub stt_batch_ms: u32,

    pub ring_buffer_ms: u32,
    pub ring_buffer_hard_cap_ms: u32,

    pub tts_prebuffer_frames: u32,
    pub tts_prebuffer_timeout_secs: u64,
    pub tts_read_timeout_sec: f64,
    pub tts_total_timeout_sec: f64,
    pub tts_max_bytes: usize,

    pub audio_input_gain: f32,

    pub orch_feature_interval_sec: f64,
    pub tts_llm_accum_debounce_ms: u32,

    pub bot_participant_timeout_seconds: u64,
    pub bot_idle_exit_seconds: u64,
    /// Hard cap on how long the bot stays connected while idle, regardless
    /// of `bot_idle_exit_seconds`. Unset means no additional cap.
    pub bot_stay_connected_seconds: Option<u64>,

    pub orch_addr: String,
    pub stt_uds_path: String,
    pub tts_addr: String,
    pub observer_url: Option<String>,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    /// Loads configuration from the process environment, calling
    /// `dotenvy::dotenv()` first so a local `.env` file is picked up.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Self {
            room_url: env_opt_string("ROOM_URL"),
            room_token: env_opt_string("ROOM_TOKEN"),

            local_stop_enabled: env_bool("LOCAL_STOP_ENABLED", true),
            local_stop_guard_ms: env_parsed("LOCAL_STOP_GUARD_MS", 1200),
            local_stop_min_rms: env_parsed("LOCAL_STOP_MIN_RMS", 1200.0),
            local_stop_require_interim: env_bool("LOCAL_STOP_REQUIRE_INTERIM", true),
            local_stop_interim_window_ms: env_parsed("LOCAL_STOP_INTERIM_WINDOW_MS", 600),
            local_stop_min_interim_len: env_parsed("LOCAL_STOP_MIN_INTERIM_LEN", 10),

            worker_vad_aggressiveness: env_parsed("WORKER_VAD_AGGRESSIVENESS", 2),
            worker_vad_hangover_ms: env_parsed("WORKER_VAD_HANGOVER_MS", 400),
            worker_vad_max_utterance_ms: env_parsed("WORKER_VAD_MAX_UTTERANCE_MS", 30_000),
            worker_vad_min_start_frames_while_tts: env_parsed(
                "WORKER_VAD_MIN_START_FRAMES_WHILE_TTS",
                10,
            ),

            stt_enabled: env_bool("STT_ENABLED", true),
            stt_continuous: env_bool("STT_CONTINUOUS", false),
            stt_min_rms: env_parsed("STT_MIN_RMS", 50.0),
            stt_suppression_cooldown_ms: env_parsed("STT_SUPPRESSION_COOLDOWN_MS", 200),
            stt_batch_ms: env_parsed("STT_BATCH_MS", 100),

            ring_buffer_ms: env_parsed("RING_BUFFER_MS", 300),
            ring_buffer_hard_cap_ms: env_parsed("RING_BUFFER_HARD_CAP_MS", 500),

            tts_prebuffer_frames: env_parsed("TTS_PREBUFFER_FRAMES", 15),
            tts_prebuffer_timeout_secs: env_parsed("TTS_PREBUFFER_TIMEOUT_SECS", 30),
            tts_read_timeout_sec: env_parsed("TTS_READ_TIMEOUT_SEC", 5.0),
            tts_total_timeout_sec: env_parsed("TTS_TOTAL_TIMEOUT_SEC", 30.0),
            tts_max_bytes: env_parsed("TTS_MAX_BYTES", 10 * 1024 * 1024),

            audio_input_gain: env_parsed("AUDIO_INPUT_GAIN", 1.0),

            orch_feature_interval_sec: env_parsed("ORCH_FEATURE_INTERVAL_SEC", 0.1),
            tts_llm_accum_debounce_ms: env_parsed("TTS_LLM_ACCUM_DEBOUNCE_MS", 200),

            bot_participant_timeout_seconds: env_parsed("BOT_PARTICIPANT_TIMEOUT_SECONDS", 120),
            bot_idle_exit_seconds: env_parsed("BOT_IDLE_EXIT_SECONDS", 60),
            bot_stay_connected_seconds: env::var("BOT_STAY_CONNECTED_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok()),

            orch_addr: env_string("ORCH_ADDR", "localhost:9090"),
            stt_uds_path: env_string("STT_UDS_PATH", "/run/app/stt.sock"),
            tts_addr: env_string("TTS_ADDR", "localhost:9093"),
            observer_url: env_opt_string("OBSERVER_URL"),
        }
    }

    pub fn tts_read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.tts_read_timeout_sec.max(0.0))
    }

    pub fn tts_total_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.tts_total_timeout_sec.max(0.0))
    }

    pub fn tts_prebuffer_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_prebuffer_timeout_secs)
    }

    pub fn orch_feature_interval(&self) -> Duration {
        Duration::from_secs_f64(self.orch_feature_interval_sec.max(0.01))
    }
}
