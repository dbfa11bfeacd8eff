//! Exotel call-flow XML

use crate::config::VoiceConfig;
use crate::instruction::{FollowUp, Instruction};
use reqwest::Url;
use std::fmt::Write as _;

/// Route the provider posts recordings back to
pub const VOICEBOT_PATH: &str = "/exotel/voicebot";

/// Escape text for use in XML content and attribute values
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Callback URL carrying the call id, absolute when a base is known
pub fn callback_url(base: Option<&str>, call_id: &str) -> String {
    let absolute = base.and_then(|base| {
        // Appended segment by segment so a base path prefix survives
        let mut url = Url::parse(base).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(VOICEBOT_PATH.split('/').filter(|segment| !segment.is_empty()));
        url.set_query(None);
        url.query_pairs_mut().append_pair("callSid", call_id);
        Some(url.to_string())
    });
    if let Some(url) = absolute {
        return url;
    }

    tracing::warn!(call_id, "No usable public base URL; using a relative callback");
    Url::parse_with_params(&format!("http://localhost{VOICEBOT_PATH}"), &[("callSid", call_id)])
        .map_or_else(
            |_| format!("{VOICEBOT_PATH}?callSid={call_id}"),
            |url| format!("{}?{}", url.path(), url.query().unwrap_or_default()),
        )
}

/// Render one instruction as an Exotel response document
pub fn render(instruction: &Instruction, voice: &VoiceConfig, callback: &str) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n");
    let _ = writeln!(
        xml,
        "  <Say language=\"{}\" voice=\"{}\">{}</Say>",
        escape_xml(&voice.language),
        escape_xml(&voice.voice),
        escape_xml(&instruction.text)
    );
    match instruction.then {
        FollowUp::Capture => {
            let _ = writeln!(
                xml,
                "  <Record maxLength=\"{}\" finishOnKey=\"#\" transcriptionEnabled=\"true\" callbackUrl=\"{}\" method=\"POST\"/>",
                voice.record_max_secs,
                escape_xml(callback)
            );
        }
        FollowUp::Hangup => xml.push_str("  <Hangup/>\n"),
    }
    xml.push_str("</Response>\n");
    xml
}
