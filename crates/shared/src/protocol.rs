use serde::{Deserialize, Serialize};

use crate::domain::JobId;

/// Response body of `POST /upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: JobId,
}

/// Job status as reported by the analysis service.
///
/// Unlike [`crate::domain::JobState`] there is no `idle`: the service only
/// knows about jobs that exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Processing,
    Completed,
    Error,
}

/// Response body of `GET /status/{job_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
    /// Server-relative locator of the annotated result video; present once
    /// the job has completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// One detected violation, as returned by `GET /report/{job_id}`.
///
/// Field casing follows the service's report schema. `plate` being absent is
/// distinct from an empty string: absent means the module produced no decoded
/// text for this record. The evidence image locators are individually
/// optional; the service usually sends both or neither but nothing enforces
/// that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    #[serde(rename = "Frame")]
    pub frame: u64,
    #[serde(rename = "VehicleID")]
    pub vehicle_id: String,
    #[serde(rename = "Type")]
    pub violation_type: String,
    #[serde(rename = "Plate", default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    #[serde(rename = "CropImgUrl", default, skip_serializing_if = "Option::is_none")]
    pub crop_img_url: Option<String>,
    #[serde(rename = "FullImgUrl", default, skip_serializing_if = "Option::is_none")]
    pub full_img_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_record_parses_the_service_report_schema() {
        let raw = r#"{
            "Frame": 10,
            "VehicleID": "V1",
            "Type": "helmet",
            "Plate": "KA01AB1234",
            "CropImgUrl": "/media/crops/v1.jpg",
            "FullImgUrl": "/media/frames/v1.jpg"
        }"#;
        let record: ViolationRecord = serde_json::from_str(raw).expect("parse");
        assert_eq!(record.frame, 10);
        assert_eq!(record.vehicle_id, "V1");
        assert_eq!(record.violation_type, "helmet");
        assert_eq!(record.plate.as_deref(), Some("KA01AB1234"));
        assert_eq!(record.crop_img_url.as_deref(), Some("/media/crops/v1.jpg"));
        assert_eq!(record.full_img_url.as_deref(), Some("/media/frames/v1.jpg"));
    }

    #[test]
    fn absent_plate_and_evidence_fields_deserialize_to_none() {
        let raw = r#"{"Frame": 3, "VehicleID": "V9", "Type": "wrong_side"}"#;
        let record: ViolationRecord = serde_json::from_str(raw).expect("parse");
        assert_eq!(record.plate, None);
        assert_eq!(record.crop_img_url, None);
        assert_eq!(record.full_img_url, None);
    }

    #[test]
    fn status_response_without_video_url() {
        let response: StatusResponse =
            serde_json::from_str(r#"{"status": "processing"}"#).expect("parse");
        assert_eq!(response.status, RemoteStatus::Processing);
        assert_eq!(response.video_url, None);
    }

    #[test]
    fn completed_status_carries_the_result_locator() {
        let response: StatusResponse =
            serde_json::from_str(r#"{"status": "completed", "video_url": "/media/out1.mp4"}"#)
                .expect("parse");
        assert_eq!(response.status, RemoteStatus::Completed);
        assert_eq!(response.video_url.as_deref(), Some("/media/out1.mp4"));
    }

    #[test]
    fn upload_response_parses() {
        let response: UploadResponse =
            serde_json::from_str(r#"{"job_id": "8f2c"}"#).expect("parse");
        assert_eq!(response.job_id, JobId::new("8f2c"));
    }
}
