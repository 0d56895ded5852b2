//! Voice catalog
//!
//! Danish voices offered by the cloud synthesis service. Index 0 is the default.

use crate::types::{Gender, VoiceProfile};

/// Language tag shared by every voice in the default catalog
pub const DANISH: &str = "da-DK";

const DANISH_VOICES: &[(&str, Gender)] = &[
    ("da-DK-Wavenet-A", Gender::Female),
    ("da-DK-Wavenet-C", Gender::Male),
    ("da-DK-Wavenet-D", Gender::Female),
    ("da-DK-Wavenet-E", Gender::Female),
    ("da-DK-Neural2-D", Gender::Female),
    ("da-DK-Standard-A", Gender::Female),
    ("da-DK-Standard-C", Gender::Male),
];

/// The default voice catalog
pub fn danish_catalog() -> Vec<VoiceProfile> {
    DANISH_VOICES
        .iter()
        .map(|(voice_id, gender)| VoiceProfile::new(DANISH, *voice_id, *gender))
        .collect()
}

/// Find a voice in `catalog` by its service-side id, ignoring case
pub fn find_voice<'a>(catalog: &'a [VoiceProfile], voice_id: &str) -> Option<&'a VoiceProfile> {
    catalog
        .iter()
        .find(|voice| voice.voice_id.eq_ignore_ascii_case(voice_id))
}
