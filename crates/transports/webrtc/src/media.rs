//! Media track mapping between session tracks and webrtc-rs tracks

use std::sync::Arc;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use peerpaste_core::{MediaTrack, TrackKind};

/// Opus at 48kHz stereo for audio, VP8 at 90kHz for video
pub fn codec_capability(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
    }
}

/// Outgoing webrtc-rs track for a session track
pub fn local_track(track: &MediaTrack) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        codec_capability(track.kind()),
        track.id().to_owned(),
        track.stream_id().to_owned(),
    ))
}

pub fn track_kind(codec_type: RTPCodecType) -> Option<TrackKind> {
    match codec_type {
        RTPCodecType::Audio => Some(TrackKind::Audio),
        RTPCodecType::Video => Some(TrackKind::Video),
        _ => None,
    }
}

/// Session view of a track the peer added
pub fn remote_track(track: &TrackRemote) -> Option<MediaTrack> {
    let kind = track_kind(track.kind())?;
    Some(MediaTrack::new(track.id(), kind, track.stream_id()))
}
