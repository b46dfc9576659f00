//! JSON wire frame shapes for the media WebSocket (spec §6).
//!
//! Inbound frames use a lowercase `kind` discriminator with camelCase
//! bodies (the telephony provider's convention); outbound frames use a
//! capitalized `Kind` discriminator with PascalCase bodies. This asymmetry
//! is the provider's, not ours, and is preserved verbatim.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct AudioMetadataBody {
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    pub channels: u32,
    pub encoding: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundAudioDataBody {
    pub data: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, rename = "participantRawID")]
    pub participant_raw_id: Option<String>,
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopAudioBody {}

/// A frame received from the client or telephony provider (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum InboundFrame {
    AudioMetadata {
        #[serde(rename = "audioMetadata")]
        audio_metadata: AudioMetadataBody,
    },
    AudioData {
        #[serde(rename = "audioData")]
        audio_data: InboundAudioDataBody,
    },
    StopAudio {
        #[serde(default, rename = "stopAudio")]
        stop_audio: StopAudioBody,
    },
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundAudioDataBody {
    #[serde(rename = "Data")]
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OutboundStopAudioBody {}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptBody {
    pub text: String,
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// A frame sent to the client or telephony provider (spec §6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "Kind")]
pub enum OutboundFrame {
    AudioData {
        #[serde(rename = "AudioData")]
        audio_data: OutboundAudioDataBody,
    },
    StopAudio {
        #[serde(rename = "AudioData")]
        audio_data: Option<()>,
        #[serde(rename = "StopAudio")]
        stop_audio: OutboundStopAudioBody,
    },
    Transcript {
        #[serde(rename = "Transcript")]
        transcript: TranscriptBody,
    },
}

impl OutboundFrame {
    pub fn audio(base64_data: String) -> Self {
        OutboundFrame::AudioData { audio_data: OutboundAudioDataBody { data: base64_data } }
    }

    pub fn stop_audio() -> Self {
        OutboundFrame::StopAudio { audio_data: None, stop_audio: OutboundStopAudioBody::default() }
    }

    pub fn transcript(text: impl Into<String>, is_final: bool) -> Self {
        OutboundFrame::Transcript { transcript: TranscriptBody { text: text.into(), is_final } }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("OutboundFrame always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audio_metadata() {
        let json = r#"{"kind":"AudioMetadata","audioMetadata":{"sampleRate":16000,"channels":1,"encoding":"PCM16"}}"#;
        let frame = InboundFrame::parse(json).unwrap();
        match frame {
            InboundFrame::AudioMetadata { audio_metadata } => {
                assert_eq!(audio_metadata.sample_rate, 16000);
                assert_eq!(audio_metadata.encoding, "PCM16");
            }
            _ => panic!("expected AudioMetadata"),
        }
    }

    #[test]
    fn parses_audio_data_with_optional_fields() {
        let json = r#"{"kind":"AudioData","audioData":{"data":"AAA=","silent":false}}"#;
        let frame = InboundFrame::parse(json).unwrap();
        match frame {
            InboundFrame::AudioData { audio_data } => {
                assert_eq!(audio_data.data, "AAA=");
                assert!(!audio_data.silent);
            }
            _ => panic!("expected AudioData"),
        }
    }

    #[test]
    fn parses_stop_audio() {
        let json = r#"{"kind":"StopAudio","stopAudio":{}}"#;
        assert!(matches!(InboundFrame::parse(json).unwrap(), InboundFrame::StopAudio { .. }));
    }

    #[test]
    fn serializes_outbound_audio_frame() {
        let json = OutboundFrame::audio("AAA=".into()).to_json();
        assert_eq!(json, r#"{"Kind":"AudioData","AudioData":{"Data":"AAA="}}"#);
    }

    #[test]
    fn serializes_outbound_stop_audio_with_null_audio_data() {
        let json = OutboundFrame::stop_audio().to_json();
        assert_eq!(json, r#"{"Kind":"StopAudio","AudioData":null,"StopAudio":{}}"#);
    }

    #[test]
    fn serializes_transcript_with_lowercase_final() {
        let json = OutboundFrame::transcript("hello", true).to_json();
        assert_eq!(json, r#"{"Kind":"Transcript","Transcript":{"text":"hello","final":true}}"#);
    }
}
