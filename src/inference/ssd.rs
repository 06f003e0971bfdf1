use crate::inference::{BoundingBox, Detection};

const SSD_ROW: usize = 7;

/// Decode an SSD detection blob shaped `[1, 1, N, 7]`
///
/// Each row is `[image_id, class_id, confidence, x_min, y_min, x_max, y_max]`;
/// a negative image id terminates the list.
pub fn parse_ssd_output(data: &[f32]) -> Vec<Detection> {
    data.chunks_exact(SSD_ROW)
        .take_while(|row| row[0] >= 0.0)
        .filter(|row| row[1] >= 0.0)
        .map(|row| Detection {
            class_id: row[1] as usize,
            confidence: row[2],
            bbox: BoundingBox {
                x_min: row[3],
                y_min: row[4],
                x_max: row[5],
                y_max: row[6],
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stops_at_terminator() {
        let data = [
            0.0, 15.0, 0.9, 0.1, 0.2, 0.3, 0.4, //
            0.0, 7.0, 0.4, 0.5, 0.5, 0.6, 0.6, //
            -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
            0.0, 15.0, 0.99, 0.0, 0.0, 1.0, 1.0,
        ];

        let detections = parse_ssd_output(&data);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 15);
        assert_eq!(detections[0].confidence, 0.9);
        assert_eq!(detections[0].bbox.x_max, 0.3);
        assert_eq!(detections[1].class_id, 7);
    }

    #[test]
    fn test_parse_ignores_partial_rows() {
        let data = [0.0, 1.0, 0.8, 0.0, 0.0, 0.5, 0.5, 0.0, 2.0];
        assert_eq!(parse_ssd_output(&data).len(), 1);
        assert!(parse_ssd_output(&[]).is_empty());
    }
}
