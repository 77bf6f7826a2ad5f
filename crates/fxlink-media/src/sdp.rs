//! SDP post-processing
//!
//! Line-oriented text transforms over `\r\n`-delimited session descriptions.
//! Each transform only touches the lines it matches, every other line is kept
//! byte-for-byte, and applying a transform twice gives the same text as
//! applying it once.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

const LINE_BREAK: &str = "\r\n";

/// Payload type browsers assign to Opus when no rtpmap line says otherwise
const DEFAULT_OPUS_PAYLOAD_TYPE: &str = "111";

pub const TRANSPORT_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";

const MSID_SEMANTIC_LINE: &str = "a=msid-semantic: WMS";

/// Which interoperability fixes to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdpFixes {
    /// Force `stereo=0` on the Opus parameters of our answer
    pub prefer_mono: bool,
    /// Declare the transport-wide congestion control header extension
    pub transport_cc: bool,
    /// Add `a=msid-semantic` after the bundle group of the remote offer
    pub bundle_msid_semantic: bool,
}

impl Default for SdpFixes {
    fn default() -> Self {
        Self {
            prefer_mono: true,
            transport_cc: false,
            bundle_msid_semantic: false,
        }
    }
}

impl SdpFixes {
    /// Applied to the remote offer before it is set
    pub fn process_offer(&self, sdp: &str) -> String {
        if self.bundle_msid_semantic {
            add_msid_semantic(sdp)
        } else {
            sdp.to_string()
        }
    }

    /// Applied to the local answer before it is set and sent
    pub fn process_answer(&self, sdp: &str) -> String {
        let mut output = Cow::Borrowed(sdp);
        if self.prefer_mono {
            output = Cow::Owned(prefer_mono(&output));
        }
        if self.transport_cc {
            output = Cow::Owned(add_transport_cc(&output));
        }
        output.into_owned()
    }
}

fn map_lines<'a, F>(sdp: &'a str, mut f: F) -> String
where
    F: FnMut(&'a str) -> Cow<'a, str>,
{
    sdp.split(LINE_BREAK)
        .map(|line| f(line))
        .collect::<Vec<_>>()
        .join(LINE_BREAK)
}

/// Payload types mapped to Opus by `a=rtpmap` lines
fn opus_payload_types(sdp: &str) -> Vec<&str> {
    let types: Vec<&str> = sdp
        .split(LINE_BREAK)
        .filter_map(|line| line.strip_prefix("a=rtpmap:"))
        .filter_map(|rest| rest.split_once(' '))
        .filter(|(_, codec)| codec.to_ascii_lowercase().starts_with("opus/"))
        .map(|(pt, _)| pt)
        .collect();

    if types.is_empty() {
        vec![DEFAULT_OPUS_PAYLOAD_TYPE]
    } else {
        types
    }
}

/// Disable stereo on every Opus `a=fmtp` line, appending the flag when it is absent
pub fn prefer_mono(sdp: &str) -> String {
    let prefixes: Vec<String> = opus_payload_types(sdp)
        .into_iter()
        .map(|pt| format!("a=fmtp:{} ", pt))
        .collect();

    map_lines(sdp, |line| {
        let Some(prefix) = prefixes.iter().find(|p| line.starts_with(p.as_str())) else {
            return Cow::Borrowed(line);
        };
        if line.contains("stereo=") {
            Cow::Owned(line.replace("stereo=1", "stereo=0"))
        } else if line.len() == prefix.len() {
            Cow::Owned(format!("{}stereo=0", line))
        } else {
            Cow::Owned(format!("{};stereo=0", line))
        }
    })
}

/// Declare transport-wide congestion control next to the existing `a=extmap:2` line
pub fn add_transport_cc(sdp: &str) -> String {
    if sdp.contains(TRANSPORT_CC_URI) {
        return sdp.to_string();
    }
    map_lines(sdp, |line| {
        if line.starts_with("a=extmap:2 ") {
            Cow::Owned(format!("{}{}a=extmap:3 {}", line, LINE_BREAK, TRANSPORT_CC_URI))
        } else {
            Cow::Borrowed(line)
        }
    })
}

/// Insert `a=msid-semantic: WMS` right after the bundle group line
pub fn add_msid_semantic(sdp: &str) -> String {
    let lines: Vec<&str> = sdp.split(LINE_BREAK).collect();
    let mut output = Vec::with_capacity(lines.len() + 1);
    for (i, line) in lines.iter().enumerate() {
        output.push(*line);
        let already_present = lines
            .get(i + 1)
            .is_some_and(|next| next.starts_with("a=msid-semantic"));
        if line.starts_with("a=group:BUNDLE") && !already_present {
            output.push(MSID_SEMANTIC_LINE);
        }
    }
    output.join(LINE_BREAK)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "v=0\r\n\
o=- 4215775240449105457 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=extmap:1 urn:ietf:params:rtp-hdrext:ssrc-audio-level\r\n\
a=extmap:2 http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=fmtp:111 minptime=10;useinbandfec=1\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=rtpmap:96 VP8/90000\r\n";

    #[test]
    fn test_prefer_mono_appends_flag() {
        let out = prefer_mono(ANSWER);
        assert!(out.contains("a=fmtp:111 minptime=10;useinbandfec=1;stereo=0\r\n"));
    }

    #[test]
    fn test_prefer_mono_replaces_stereo() {
        let sdp = ANSWER.replace("useinbandfec=1", "useinbandfec=1;stereo=1");
        let out = prefer_mono(&sdp);
        assert!(out.contains("a=fmtp:111 minptime=10;useinbandfec=1;stereo=0\r\n"));
        assert!(!out.contains("stereo=1"));
    }

    #[test]
    fn test_prefer_mono_is_idempotent() {
        let once = prefer_mono(ANSWER);
        assert_eq!(prefer_mono(&once), once);
    }

    #[test]
    fn test_prefer_mono_follows_rtpmap_payload_type() {
        let sdp = "m=audio 9 UDP/TLS/RTP/SAVPF 109\r\na=rtpmap:109 opus/48000/2\r\na=fmtp:109 useinbandfec=1\r\na=fmtp:111 useinbandfec=1\r\n";
        let out = prefer_mono(sdp);
        assert!(out.contains("a=fmtp:109 useinbandfec=1;stereo=0"));
        assert!(out.contains("a=fmtp:111 useinbandfec=1\r\n"));
    }

    #[test]
    fn test_unrelated_lines_untouched() {
        let out = prefer_mono(ANSWER);
        let before: Vec<&str> = ANSWER.split("\r\n").collect();
        let after: Vec<&str> = out.split("\r\n").collect();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            if !b.starts_with("a=fmtp:111") {
                assert_eq!(b, a);
            }
        }
        assert!(out.ends_with("\r\n"));
    }

    #[test]
    fn test_transport_cc_added_once() {
        let once = add_transport_cc(ANSWER);
        assert!(once.contains(&format!(
            "abs-send-time\r\na=extmap:3 {}\r\na=rtpmap:111",
            TRANSPORT_CC_URI
        )));
        assert_eq!(add_transport_cc(&once), once);
    }

    #[test]
    fn test_msid_semantic_after_bundle() {
        let once = add_msid_semantic(ANSWER);
        assert!(once.contains("a=group:BUNDLE 0 1\r\na=msid-semantic: WMS\r\nm=audio"));
        assert_eq!(add_msid_semantic(&once), once);
    }

    #[test]
    fn test_default_fixes() {
        let fixes = SdpFixes::default();
        assert_eq!(fixes.process_offer(ANSWER), ANSWER);
        let answer = fixes.process_answer(ANSWER);
        assert!(answer.contains("stereo=0"));
        assert!(!answer.contains(TRANSPORT_CC_URI));
    }
}
