// src/storage/renderer.rs
//
// Turns an accepted event into the bytes handed to the evidence store.
// Image encoding (crops, overlays) belongs to an external renderer; the
// bundled one writes a JSON document with the event and the frame's boxes.

use crate::error::StoreError;
use crate::pipeline::event::Event;
use crate::types::{Detection, DetectionFrame};
use serde::Serialize;

pub trait EvidenceRenderer: Send {
    fn render(&self, event: &Event, frame: &DetectionFrame) -> Result<Vec<u8>, StoreError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataRenderer;

#[derive(Serialize)]
struct EvidenceDocument<'a> {
    event: &'a Event,
    frame_index: u64,
    timestamp_ms: f64,
    width: u32,
    height: u32,
    detections: &'a [Detection],
}

impl EvidenceRenderer for MetadataRenderer {
    fn render(&self, event: &Event, frame: &DetectionFrame) -> Result<Vec<u8>, StoreError> {
        let doc = EvidenceDocument {
            event,
            frame_index: frame.frame_index,
            timestamp_ms: frame.timestamp_ms,
            width: frame.width,
            height: frame.height,
            detections: &frame.detections,
        };
        serde_json::to_vec(&doc).map_err(|e| StoreError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::event::{EntityId, EventType};
    use crate::types::ObjectClass;

    #[test]
    fn test_metadata_document() {
        let frame = DetectionFrame::new(
            12,
            1_000.0,
            640,
            480,
            vec![Detection {
                track_id: Some(4),
                class: ObjectClass::Truck,
                bbox: [1.0, 2.0, 3.0, 4.0],
                confidence: 0.5,
            }],
        );
        let event = Event::start(EventType::WrongWay, EntityId::Track(4), Some([1.0, 2.0, 3.0, 4.0]), "wrong way");

        let bytes = MetadataRenderer.render(&event, &frame).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["frame_index"], 12);
        assert_eq!(json["event"]["entity_id"], "id_4");
        assert_eq!(json["event"]["status"], "START");
        assert_eq!(json["detections"][0]["class"], "truck");
    }
}
