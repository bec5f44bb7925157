//! Quality labels and their format-selection expressions

use crate::core::media::FormatDescriptor;
use std::fmt;

/// Quality a user can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityLabel {
    Uhd2160,
    Fhd1080,
    Hd720,
    Sd480,
    Sd360,
    AudioBest,
    AudioMp3,
    Unspecified,
}

/// Work the extractor performs after the download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Postprocess {
    /// Transcode the audio stream
    ExtractAudio {
        codec: &'static str,
        bitrate_kbps: u32,
    },
}

impl QualityLabel {
    /// All labels, highest video quality first
    pub const ALL: [QualityLabel; 8] = [
        QualityLabel::Uhd2160,
        QualityLabel::Fhd1080,
        QualityLabel::Hd720,
        QualityLabel::Sd480,
        QualityLabel::Sd360,
        QualityLabel::AudioBest,
        QualityLabel::AudioMp3,
        QualityLabel::Unspecified,
    ];

    /// Parse a user supplied label; anything unrecognized is `Unspecified`
    pub fn parse(label: &str) -> Self {
        Self::recognize(label).unwrap_or(QualityLabel::Unspecified)
    }

    /// Parse a label, returning `None` when it is not a known spelling
    pub fn recognize(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase();
        let label = match normalized.as_str() {
            "4k" | "2160p" | "2160" | "uhd" => QualityLabel::Uhd2160,
            "1080p" | "1080" | "fhd" | "full hd" => QualityLabel::Fhd1080,
            "720p" | "720" | "hd" => QualityLabel::Hd720,
            "480p" | "480" => QualityLabel::Sd480,
            "360p" | "360" => QualityLabel::Sd360,
            "audio" | "audio-best" | "audio_best" | "bestaudio" | "audio only (best)" => {
                QualityLabel::AudioBest
            }
            "mp3" | "audio-mp3" | "audio_mp3" | "audio only (mp3)" => QualityLabel::AudioMp3,
            "best" | "default" | "auto" | "unspecified" => QualityLabel::Unspecified,
            _ => return None,
        };
        Some(label)
    }

    /// Maximum video height for video labels
    pub fn height_ceiling(&self) -> Option<u32> {
        match self {
            QualityLabel::Uhd2160 => Some(2160),
            QualityLabel::Fhd1080 => Some(1080),
            QualityLabel::Hd720 => Some(720),
            QualityLabel::Sd480 => Some(480),
            QualityLabel::Sd360 => Some(360),
            _ => None,
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, QualityLabel::AudioBest | QualityLabel::AudioMp3)
    }

    /// Post-download step required by the label
    pub fn postprocess(&self) -> Option<Postprocess> {
        match self {
            QualityLabel::AudioMp3 => Some(Postprocess::ExtractAudio {
                codec: "mp3",
                bitrate_kbps: 192,
            }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Uhd2160 => "4K",
            QualityLabel::Fhd1080 => "1080p",
            QualityLabel::Hd720 => "720p",
            QualityLabel::Sd480 => "480p",
            QualityLabel::Sd360 => "360p",
            QualityLabel::AudioBest => "audio-best",
            QualityLabel::AudioMp3 => "audio-mp3",
            QualityLabel::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expression handed to the extractor to pick streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatExpression(String);

impl FormatExpression {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormatExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Map a quality label to its format expression
pub fn select_format(label: QualityLabel) -> FormatExpression {
    let expression = match label.height_ceiling() {
        Some(height) => format!(
            "bestvideo[ext=mp4][height<={h}]+bestaudio[ext=m4a]/best[height<={h}]/best",
            h = height
        ),
        None => match label {
            QualityLabel::AudioBest => "bestaudio[ext=m4a]/bestaudio/best".to_string(),
            QualityLabel::AudioMp3 => "bestaudio/best".to_string(),
            _ => "best[ext=mp4]/best".to_string(),
        },
    };
    FormatExpression(expression)
}

/// Resolved choice for one download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    pub expression: FormatExpression,
    /// Label the expression came from; `None` for an explicit format id
    pub label: Option<QualityLabel>,
    pub postprocess: Option<Postprocess>,
}

impl FormatSelection {
    /// Resolve a user hint against the formats a source offers.
    ///
    /// A hint equal to an available format id passes through verbatim,
    /// anything else is read as a quality label.
    pub fn resolve(hint: Option<&str>, available: &[FormatDescriptor]) -> Self {
        let hint = hint.map(str::trim).filter(|h| !h.is_empty());

        if let Some(id) = hint {
            if available.iter().any(|f| f.format_id == id) {
                return Self {
                    expression: FormatExpression(id.to_string()),
                    label: None,
                    postprocess: None,
                };
            }
        }

        Self::from_label(hint.map(QualityLabel::parse).unwrap_or(QualityLabel::Unspecified))
    }

    pub fn from_label(label: QualityLabel) -> Self {
        Self {
            expression: select_format(label),
            label: Some(label),
            postprocess: label.postprocess(),
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.label.is_none()
    }
}

/// Pick the concrete track a label resolves to on a known format list.
///
/// Video labels take the tallest video track within the height ceiling,
/// preferring mp4 and then larger files on ties. Audio labels take the
/// audio-only track with the highest bitrate.
pub fn pick_video_track(formats: &[FormatDescriptor], label: QualityLabel) -> Option<&FormatDescriptor> {
    if label.is_audio_only() {
        return formats
            .iter()
            .filter(|f| f.is_audio_only())
            .max_by(|a, b| {
                let a_rate = a.tbr.unwrap_or(0.0);
                let b_rate = b.tbr.unwrap_or(0.0);
                a_rate
                    .total_cmp(&b_rate)
                    .then_with(|| a.filesize.unwrap_or(0).cmp(&b.filesize.unwrap_or(0)))
            });
    }

    let ceiling = label.height_ceiling().unwrap_or(u32::MAX);
    formats
        .iter()
        .filter(|f| f.has_video())
        .filter(|f| f.height.map_or(false, |h| h <= ceiling))
        .max_by(|a, b| {
            a.height
                .cmp(&b.height)
                .then_with(|| (a.ext == "mp4").cmp(&(b.ext == "mp4")))
                .then_with(|| a.filesize.unwrap_or(0).cmp(&b.filesize.unwrap_or(0)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, height: u32, ext: &str) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.to_string(),
            ext: ext.to_string(),
            height: Some(height),
            width: Some(height * 16 / 9),
            vcodec: Some("avc1".to_string()),
            acodec: Some("none".to_string()),
            ..FormatDescriptor::default()
        }
    }

    fn audio(id: &str, tbr: f64) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.to_string(),
            ext: "m4a".to_string(),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            tbr: Some(tbr),
            ..FormatDescriptor::default()
        }
    }

    #[test]
    fn test_select_format_expressions() {
        assert_eq!(
            select_format(QualityLabel::Hd720).as_str(),
            "bestvideo[ext=mp4][height<=720]+bestaudio[ext=m4a]/best[height<=720]/best"
        );
        assert_eq!(
            select_format(QualityLabel::Uhd2160).as_str(),
            "bestvideo[ext=mp4][height<=2160]+bestaudio[ext=m4a]/best[height<=2160]/best"
        );
        assert_eq!(
            select_format(QualityLabel::AudioBest).as_str(),
            "bestaudio[ext=m4a]/bestaudio/best"
        );
        assert_eq!(select_format(QualityLabel::AudioMp3).as_str(), "bestaudio/best");
        assert_eq!(
            select_format(QualityLabel::Unspecified).as_str(),
            "best[ext=mp4]/best"
        );
    }

    #[test]
    fn test_select_format_total_and_deterministic() {
        for label in QualityLabel::ALL {
            let first = select_format(label);
            assert!(!first.as_str().is_empty());
            assert_eq!(first, select_format(label));
        }
    }

    #[test]
    fn test_only_mp3_has_postprocess() {
        for label in QualityLabel::ALL {
            assert_eq!(label.postprocess().is_some(), label == QualityLabel::AudioMp3);
        }
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(QualityLabel::parse("4K"), QualityLabel::Uhd2160);
        assert_eq!(QualityLabel::parse("1080p"), QualityLabel::Fhd1080);
        assert_eq!(QualityLabel::parse("Audio Only (MP3)"), QualityLabel::AudioMp3);
        assert_eq!(QualityLabel::parse("Audio Only (Best)"), QualityLabel::AudioBest);
        assert_eq!(QualityLabel::parse("8K"), QualityLabel::Unspecified);
        assert_eq!(QualityLabel::recognize("8K"), None);
    }

    #[test]
    fn test_resolve_explicit_format_id() {
        let formats = vec![video("136", 720, "mp4"), audio("140", 128.0)];
        let selection = FormatSelection::resolve(Some("140"), &formats);
        assert!(selection.is_explicit());
        assert_eq!(selection.expression.as_str(), "140");
        assert_eq!(selection.postprocess, None);
    }

    #[test]
    fn test_resolve_label_and_fallback() {
        let formats = vec![video("136", 720, "mp4")];

        let selection = FormatSelection::resolve(Some("mp3"), &formats);
        assert_eq!(selection.label, Some(QualityLabel::AudioMp3));
        assert!(selection.postprocess.is_some());

        let selection = FormatSelection::resolve(Some("not-a-label"), &formats);
        assert_eq!(selection.expression.as_str(), "best[ext=mp4]/best");

        let selection = FormatSelection::resolve(None, &formats);
        assert_eq!(selection.label, Some(QualityLabel::Unspecified));
    }

    #[test]
    fn test_pick_720p_from_ladder() {
        let formats = vec![
            video("134", 360, "mp4"),
            video("135", 480, "mp4"),
            video("136", 720, "mp4"),
            video("137", 1080, "mp4"),
        ];
        let picked = pick_video_track(&formats, QualityLabel::Hd720).unwrap();
        assert_eq!(picked.height, Some(720));
    }

    #[test]
    fn test_pick_prefers_mp4_on_equal_height() {
        let formats = vec![video("247", 720, "webm"), video("136", 720, "mp4")];
        let picked = pick_video_track(&formats, QualityLabel::Fhd1080).unwrap();
        assert_eq!(picked.format_id, "136");
    }

    #[test]
    fn test_pick_audio_and_missing_ceiling() {
        let formats = vec![audio("139", 48.0), audio("140", 129.0), video("137", 1080, "mp4")];
        assert_eq!(
            pick_video_track(&formats, QualityLabel::AudioBest).unwrap().format_id,
            "140"
        );
        assert!(pick_video_track(&formats, QualityLabel::Sd360).is_none());
    }
}
