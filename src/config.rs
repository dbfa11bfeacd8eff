//! Process configuration from environment variables

use crate::llm::LlmConfig;
use crate::runtime::CallSettings;
use crate::session::SweepPolicy;
use crate::state_machine::{CallPolicy, Prompts};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How spoken text and capture are rendered for the telephony provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    pub language: String,
    pub voice: String,
    /// Longest recording per utterance, in seconds
    pub record_max_secs: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: "hi-IN".to_string(),
            voice: "Manvi".to_string(),
            record_max_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Host used in callback URLs; falls back to the request's Host header
    pub public_base_url: Option<String>,
    pub llm: LlmConfig,
    pub call: CallSettings,
    pub sweep: SweepPolicy,
    pub sweep_interval: Duration,
    pub voice: VoiceConfig,
    /// Cap on buffered inbound audio per stream connection
    pub audio_buffer_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = CallPolicy::default();
        let policy = CallPolicy {
            max_turns: setting(&get, "MAX_TURNS").unwrap_or(defaults.max_turns),
            history_window: setting(&get, "HISTORY_WINDOW")
                .unwrap_or(defaults.history_window),
            hangup_grace: setting(&get, "HANGUP_GRACE_SECS")
                .map_or(defaults.hangup_grace, Duration::from_secs),
        };

        let prompt_defaults = Prompts::default();
        let prompts = Prompts {
            greeting: get("PROMPT_GREETING").unwrap_or(prompt_defaults.greeting),
            reprompt: get("PROMPT_REPROMPT").unwrap_or(prompt_defaults.reprompt),
            wait: get("PROMPT_WAIT").unwrap_or(prompt_defaults.wait),
            closing: get("PROMPT_CLOSING").unwrap_or(prompt_defaults.closing),
            apology: get("PROMPT_APOLOGY").unwrap_or(prompt_defaults.apology),
        };

        let call_defaults = CallSettings::default();
        let call = CallSettings {
            policy,
            prompts: Arc::new(prompts),
            system_prompt: get("SYSTEM_PROMPT").unwrap_or(call_defaults.system_prompt),
        };

        let sweep_defaults = SweepPolicy::default();
        let sweep = SweepPolicy {
            max_idle: setting(&get, "SESSION_IDLE_SECS")
                .map_or(sweep_defaults.max_idle, Duration::from_secs),
            max_sessions: setting(&get, "MAX_SESSIONS").unwrap_or(sweep_defaults.max_sessions),
        };

        let voice_defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            language: get("SAY_LANGUAGE").unwrap_or(voice_defaults.language),
            voice: get("SAY_VOICE").unwrap_or(voice_defaults.voice),
            record_max_secs: setting(&get, "RECORD_MAX_SECS")
                .unwrap_or(voice_defaults.record_max_secs),
        };

        let sweep_secs: u64 = setting(&get, "SWEEP_INTERVAL_SECS").unwrap_or(1800);

        Self {
            port: setting(&get, "PORT").unwrap_or(3000),
            public_base_url: get("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            llm: LlmConfig {
                openai_api_key: get("OPENAI_API_KEY"),
                gateway: get("LLM_GATEWAY"),
                default_model: get("DEFAULT_MODEL"),
            },
            call,
            sweep,
            sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            voice,
            audio_buffer_bytes: setting(&get, "AUDIO_BUFFER_BYTES").unwrap_or(1024 * 1024),
        }
    }
}

fn setting<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = get(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "Ignoring unparsable setting, using default");
            None
        }
    }
}
