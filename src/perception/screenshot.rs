use std::io::Cursor;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::DeskPilotResult;
use crate::perception::types::FrameMeta;
use crate::sandbox::backend::Desktop;

pub const PNG_MIME: &str = "image/png";

/// One captured frame of the remote display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    #[serde(with = "crate::agent_engine::conversation::base64_bytes")]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// `None` when the header could not be decoded.
    pub meta: Option<FrameMeta>,
}

impl Screenshot {
    pub fn from_png(bytes: Vec<u8>) -> Self {
        let meta = match read_dimensions(&bytes) {
            Ok((width, height)) => Some(FrameMeta { width, height }),
            Err(e) => {
                tracing::debug!(error = %e, len = bytes.len(), "could not decode frame header");
                None
            }
        };
        Self {
            bytes,
            mime_type: PNG_MIME.to_string(),
            meta,
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

fn read_dimensions(bytes: &[u8]) -> DeskPilotResult<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

/// Captures the current frame of `desktop`.
pub async fn capture(desktop: &dyn Desktop) -> DeskPilotResult<Screenshot> {
    let bytes = desktop.screenshot().await?;
    tracing::debug!(session = %desktop.id(), len = bytes.len(), "frame captured");
    Ok(Screenshot::from_png(bytes))
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_dimensions() {
        let shot = Screenshot::from_png(png_fixture(800, 600));
        assert_eq!(shot.meta, Some(FrameMeta { width: 800, height: 600 }));
        assert!(shot.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn undecodable_bytes_keep_payload_without_meta() {
        let shot = Screenshot::from_png(b"not a png".to_vec());
        assert!(shot.meta.is_none());
        assert_eq!(shot.bytes, b"not a png");
    }
}
