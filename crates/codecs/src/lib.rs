use anyhow::{anyhow, Result};
use qrcode::{render::svg, QrCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Text to image. Used to render attendance codes.
pub trait QrEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<EncodedImage>;
}

/// Image to text. `Ok(None)` means the image holds no readable symbol.
pub trait QrDecoder: Send + Sync {
    fn decode(&self, image: &[u8]) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentScores {
    pub neutral: Option<f64>,
    pub negative: Option<f64>,
    pub positive: Option<f64>,
}

/// Scores each message independently; the output has one entry per input.
pub trait SentimentModel: Send + Sync {
    fn classify(&self, messages: &[String]) -> Result<Vec<SentimentScores>>;
}

pub struct SvgQrEncoder {
    pub min_size: u32,
}

impl Default for SvgQrEncoder {
    fn default() -> Self {
        Self { min_size: 256 }
    }
}

impl QrEncoder for SvgQrEncoder {
    fn encode(&self, text: &str) -> Result<EncodedImage> {
        let code = QrCode::new(text.as_bytes()).map_err(|e| anyhow!("QR generation failed: {e}"))?;
        let image = code
            .render::<svg::Color>()
            .min_dimensions(self.min_size, self.min_size)
            .build();
        Ok(EncodedImage {
            mime_type: "image/svg+xml".into(),
            bytes: image.into_bytes(),
        })
    }
}

pub struct MissingQrDecoder;

impl QrDecoder for MissingQrDecoder {
    fn decode(&self, _image: &[u8]) -> Result<Option<String>> {
        Err(anyhow!("QR decoder is unavailable"))
    }
}

pub struct MissingSentimentModel;

impl SentimentModel for MissingSentimentModel {
    fn classify(&self, _messages: &[String]) -> Result<Vec<SentimentScores>> {
        Err(anyhow!("sentiment model is unavailable"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub messages: usize,
    pub neutral: Option<f64>,
    pub negative: Option<f64>,
    pub positive: Option<f64>,
}

/// Averages each label over the messages that received a score for it.
pub fn summarize(scores: &[SentimentScores]) -> SentimentSummary {
    fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
        let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    SentimentSummary {
        messages: scores.len(),
        neutral: mean(scores.iter().filter_map(|s| s.neutral)),
        negative: mean(scores.iter().filter_map(|s| s.negative)),
        positive: mean(scores.iter().filter_map(|s| s.positive)),
    }
}
