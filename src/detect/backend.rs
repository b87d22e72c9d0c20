use anyhow::Result;

use crate::Detection;

/// Detector backend trait.
///
/// The model behind this seam is a black box: implementations own model
/// loading and inference, and the sorting core only consumes their
/// detections. Implementations must emit confidences in [0, 1], pixel-space
/// bounding boxes with ordered corners, and class ids drawn from the space
/// the deployed catalog registers.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one RGB frame.
    ///
    /// Implementations must treat the pixel slice as read-only and ephemeral.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
