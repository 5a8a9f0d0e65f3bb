//! Output verification via the transcoder's metadata tool.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::RenderError;
use crate::transcoder::{RunOptions, Transcoder};

/// What the metadata tool reported about a produced file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration_sec: f64,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pix_fmt: Option<String>,
}

#[derive(Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    sample_rate: Option<String>,
    #[serde(default)]
    channels: Option<u32>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    pix_fmt: Option<String>,
}

/// Ask the metadata tool about a file.
pub async fn probe_media(
    transcoder: &Transcoder,
    path: &Path,
) -> Result<MediaInfo, RenderError> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().into_owned(),
    ];

    let output = transcoder
        .run_probe_tool(&args, RunOptions::with_timeout(Duration::from_secs(30)))
        .await?;

    let doc: ProbeDocument = serde_json::from_slice(&output.stdout).map_err(|_| {
        RenderError::AssetNotProduced {
            path: path.to_path_buf(),
        }
    })?;

    Ok(parse_document(doc))
}

fn parse_document(doc: ProbeDocument) -> MediaInfo {
    let mut info = MediaInfo {
        duration_sec: doc
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0),
        ..Default::default()
    };

    for stream in doc.streams {
        match stream.codec_type.as_deref() {
            Some("audio") => {
                info.sample_rate = stream.sample_rate.and_then(|s| s.parse().ok());
                info.channels = stream.channels;
            }
            Some("video") => {
                info.width = stream.width;
                info.height = stream.height;
                info.pix_fmt = stream.pix_fmt;
            }
            _ => {}
        }
    }

    info
}

/// Validate a stage output: the file exists, is non-empty, and the metadata
/// tool reports a positive duration.
pub async fn verify_output(
    transcoder: &Transcoder,
    path: &Path,
) -> Result<MediaInfo, RenderError> {
    let missing = || RenderError::AssetNotProduced {
        path: path.to_path_buf(),
    };

    let meta = tokio::fs::metadata(path).await.map_err(|_| missing())?;
    if meta.len() == 0 {
        return Err(missing());
    }

    let info = probe_media(transcoder, path).await?;
    if info.duration_sec <= 0.0 {
        return Err(missing());
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_probe_json() {
        let doc: ProbeDocument = serde_json::from_str(
            r#"{
                "format": {"duration": "60.032000"},
                "streams": [
                    {"codec_type": "audio", "sample_rate": "44100", "channels": 2},
                    {"codec_type": "video", "width": 1280, "height": 720, "pix_fmt": "yuv420p"}
                ]
            }"#,
        )
        .unwrap();

        let info = parse_document(doc);
        assert!((info.duration_sec - 60.032).abs() < 1e-9);
        assert_eq!(info.sample_rate, Some(44100));
        assert_eq!(info.channels, Some(2));
        assert_eq!(info.width, Some(1280));
        assert_eq!(info.height, Some(720));
        assert_eq!(info.pix_fmt.as_deref(), Some("yuv420p"));
    }

    #[test]
    fn missing_fields_default() {
        let doc: ProbeDocument = serde_json::from_str(r#"{"streams": []}"#).unwrap();
        let info = parse_document(doc);
        assert_eq!(info.duration_sec, 0.0);
        assert_eq!(info.sample_rate, None);
    }

    #[tokio::test]
    async fn verify_rejects_missing_files() {
        let t = Transcoder::new("true", "true");
        let err = verify_output(&t, Path::new("/nonexistent/out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::AssetNotProduced { .. }));
    }

    #[tokio::test]
    async fn verify_rejects_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        tokio::fs::write(&path, b"").await.unwrap();

        let t = Transcoder::new("true", "true");
        let err = verify_output(&t, &path).await.unwrap_err();
        assert!(matches!(err, RenderError::AssetNotProduced { .. }));
    }
}
