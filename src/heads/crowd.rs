// src/heads/crowd.rs
//
// Person centers on a 0–100 grid, unit weight each. Rendering the heatmap
// is a consumer concern.

use super::{CrowdPoint, HeadMetrics, HeadOutput, IntelligenceHead};
use crate::error::PipelineError;
use crate::pipeline::frame_context::FrameContext;

#[derive(Default)]
pub struct CrowdHead;

impl CrowdHead {
    pub fn new() -> Self {
        Self
    }
}

impl IntelligenceHead for CrowdHead {
    fn name(&self) -> &'static str {
        "crowd"
    }

    fn process(&mut self, ctx: &FrameContext<'_>) -> Result<HeadOutput, PipelineError> {
        let frame = ctx.frame;
        if frame.width == 0 || frame.height == 0 {
            return Err(PipelineError::Head {
                head: self.name(),
                reason: format!("cannot normalize against a {}x{} frame", frame.width, frame.height),
            });
        }
        let (w, h) = (frame.width_f32(), frame.height_f32());

        let points = frame
            .detections
            .iter()
            .filter(|d| d.is_person() && d.has_valid_bbox())
            .map(|d| {
                let [cx, cy] = d.center();
                CrowdPoint {
                    x: cx / w * 100.0,
                    y: cy / h * 100.0,
                    z: 1.0,
                }
            })
            .collect();

        Ok(HeadOutput {
            events: Vec::new(),
            metrics: HeadMetrics {
                crowd_density: Some(points),
                ..HeadMetrics::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SpeedEstimator;
    use crate::config::SpeedConfig;
    use crate::types::{Detection, DetectionFrame, ObjectClass};

    #[test]
    fn test_person_centers_are_normalized() {
        let frame = DetectionFrame::new(
            0,
            0.0,
            1000,
            500,
            vec![
                Detection {
                    track_id: None,
                    class: ObjectClass::Person,
                    bbox: [240.0, 100.0, 260.0, 150.0],
                    confidence: 0.6,
                },
                Detection {
                    track_id: Some(1),
                    class: ObjectClass::Car,
                    bbox: [0.0, 0.0, 100.0, 100.0],
                    confidence: 0.9,
                },
            ],
        );
        let speeds = SpeedEstimator::new(SpeedConfig::default(), 30.0);
        let ctx = FrameContext::new(&frame, &[], &speeds);

        let points = CrowdHead::new().process(&ctx).unwrap().metrics.crowd_density.unwrap();
        assert_eq!(points.len(), 1);
        assert!((points[0].x - 25.0).abs() < 1e-4);
        assert!((points[0].y - 25.0).abs() < 1e-4);
        assert_eq!(points[0].z, 1.0);
    }

    #[test]
    fn test_zero_sized_frame_is_a_head_error() {
        let frame = DetectionFrame::new(0, 0.0, 0, 0, Vec::new());
        let speeds = SpeedEstimator::new(SpeedConfig::default(), 30.0);
        let ctx = FrameContext::new(&frame, &[], &speeds);
        assert!(matches!(
            CrowdHead::new().process(&ctx),
            Err(PipelineError::Head { head: "crowd", .. })
        ));
    }
}
