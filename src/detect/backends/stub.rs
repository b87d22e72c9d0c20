use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::{BoundingBox, Detection};

/// Stub backend for demos and tests.
///
/// Emits a deterministic rotation over the configured class ids driven by a
/// frame counter, ignoring pixel content: an empty frame, a single confident
/// item, a single low-confidence item (below the usual threshold), then a
/// confident pair. Feeding the same frame count always reproduces the same
/// detection sequence.
pub struct StubBackend {
    class_ids: Vec<u32>,
    frame: u64,
}

impl StubBackend {
    pub fn new(class_ids: Vec<u32>) -> Self {
        Self {
            class_ids,
            frame: 0,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frame
    }

    fn class_at(&self, position: u64) -> u32 {
        self.class_ids[(position as usize) % self.class_ids.len()]
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let frame = self.frame;
        self.frame += 1;

        if self.class_ids.is_empty() {
            return Ok(Vec::new());
        }

        let w = width as f32;
        let h = height as f32;
        let left = BoundingBox {
            x1: w * 0.10,
            y1: h * 0.20,
            x2: w * 0.45,
            y2: h * 0.80,
        };
        let right = BoundingBox {
            x1: w * 0.55,
            y1: h * 0.25,
            x2: w * 0.90,
            y2: h * 0.75,
        };

        let detections = match frame % 4 {
            0 => Vec::new(),
            1 => vec![Detection {
                class_id: self.class_at(frame),
                confidence: 0.90,
                bbox: left,
            }],
            2 => vec![Detection {
                class_id: self.class_at(frame),
                confidence: 0.45,
                bbox: left,
            }],
            _ => vec![
                Detection {
                    class_id: self.class_at(frame),
                    confidence: 0.92,
                    bbox: left,
                },
                Detection {
                    class_id: self.class_at(frame + 1),
                    confidence: 0.81,
                    bbox: right,
                },
            ],
        };
        Ok(detections)
    }
}
