use serde::{Deserialize, Serialize};

use crate::postprocess::DetectionSet;

/// Class names of the egg detector, indexed by class id.
pub const EGG_LABELS: &[&str] = &["egg"];

pub const NO_EGGS_INFO: &str = "No eggs detected";

/// Name for a class id, or the id itself when it is outside `labels`.
pub fn label_for(labels: &[&str], class_id: i64) -> String {
    usize::try_from(class_id)
        .ok()
        .and_then(|i| labels.get(i))
        .map_or_else(|| class_id.to_string(), |name| (*name).to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EggDetection {
    pub egg_id: usize,
    pub bounding_box: [f32; 4],
    pub confidence: f32,
}

/// Response body of a count request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EggReport {
    pub egg_count: usize,
    pub detections: Vec<EggDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl EggReport {
    pub fn empty() -> Self {
        Self {
            egg_count: 0,
            detections: Vec::new(),
            info: Some(NO_EGGS_INFO.to_string()),
        }
    }
}

/// Turn the final detections into a count and 1-based records.
pub fn assemble(set: Option<&DetectionSet>) -> EggReport {
    let Some(set) = set.filter(|s| !s.is_empty()) else {
        return EggReport::empty();
    };
    let scores = set.scores();
    let detections: Vec<EggDetection> = set
        .boxes()
        .outer_iter()
        .enumerate()
        .map(|(i, b)| EggDetection {
            egg_id: i + 1,
            bounding_box: [b[0], b[1], b[2], b[3]],
            confidence: scores.get(i).copied().unwrap_or(1.0),
        })
        .collect();
    EggReport {
        egg_count: detections.len(),
        detections,
        info: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn none_is_zero_count_with_info() {
        let report = assemble(None);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"egg_count": 0, "detections": [], "info": "No eggs detected"})
        );
    }

    #[test]
    fn records_are_one_based_and_ordered() {
        let set = DetectionSet::new(
            array![[1.0, 2.0, 3.0, 4.0], [10.0, 20.0, 30.0, 40.0]],
            array![0.5, 0.75],
            None,
        )
        .unwrap();
        let report = assemble(Some(&set));

        assert_eq!(report.egg_count, 2);
        assert_eq!(report.info, None);
        assert_eq!(
            report.detections[1],
            EggDetection {
                egg_id: 2,
                bounding_box: [10.0, 20.0, 30.0, 40.0],
                confidence: 0.75
            }
        );
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("info").is_none());
        assert_eq!(value["detections"][0]["egg_id"], 1);
    }

    #[test]
    fn labels() {
        assert_eq!(EGG_LABELS, ["egg"]);
        assert_eq!(label_for(EGG_LABELS, 0), "egg");
        assert_eq!(label_for(EGG_LABELS, 3), "3");
        assert_eq!(label_for(EGG_LABELS, -1), "-1");
        assert_eq!(label_for(&["egg", "cracked"], 1), "cracked");
    }
}
