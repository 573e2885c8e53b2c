//! The six kinds of queued work.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Job type; each has its own queue and dedicated worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Generate,
    Merge,
    Upscale,
    Interpolate,
    Export,
    LongVideo,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::Generate,
        JobType::Merge,
        JobType::Upscale,
        JobType::Interpolate,
        JobType::Export,
        JobType::LongVideo,
    ];

    /// Value stored in `jobs.job_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Generate => "generate",
            JobType::Merge => "merge",
            JobType::Upscale => "upscale",
            JobType::Interpolate => "interpolate",
            JobType::Export => "export",
            JobType::LongVideo => "long_video",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| CoreError::Validation(format!("Unknown job type '{value}'")))
    }

    /// Whether jobs of this type occupy the inference service.
    pub fn uses_gpu(self) -> bool {
        matches!(self, JobType::Generate | JobType::LongVideo)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_types_parse_from_stored_value() {
        for t in JobType::ALL {
            assert_eq!(JobType::parse(t.as_str()).unwrap(), t);
        }
        assert!(JobType::parse("longVideo").is_err());
    }

    #[test]
    fn serde_matches_stored_value() {
        let json = serde_json::to_string(&JobType::LongVideo).unwrap();
        assert_eq!(json, "\"long_video\"");
    }
}
