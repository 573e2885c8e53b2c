use std::time::Duration;

use reelforge_core::job_type::JobType;

/// Worker pool configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Fallback wake-up for each queue when no enqueue notification arrives.
    pub poll_interval: Duration,
    /// Queues this process serves.
    pub job_types: Vec<JobType>,
    /// How long shutdown waits for in-flight jobs.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            job_types: JobType::ALL.to_vec(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env var                  | Default            |
    /// |--------------------------|--------------------|
    /// | `WORKER_POLL_INTERVAL_MS`| `2000`             |
    /// | `WORKER_JOB_TYPES`       | every job type     |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`               |
    ///
    /// `WORKER_JOB_TYPES` is a comma-separated list such as
    /// `generate,long_video`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_interval = std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .map(|v| {
                v.parse::<u64>()
                    .expect("WORKER_POLL_INTERVAL_MS must be a valid u64")
            })
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let job_types = match std::env::var("WORKER_JOB_TYPES") {
            Ok(list) => parse_job_types(&list).expect("WORKER_JOB_TYPES must list known job types"),
            Err(_) => defaults.job_types,
        };

        let shutdown_timeout = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .ok()
            .map(|v| {
                v.parse::<u64>()
                    .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64")
            })
            .map(Duration::from_secs)
            .unwrap_or(defaults.shutdown_timeout);

        Self {
            poll_interval,
            job_types,
            shutdown_timeout,
        }
    }
}

fn parse_job_types(list: &str) -> Result<Vec<JobType>, reelforge_core::error::CoreError> {
    let mut types = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let job_type = JobType::parse(name)?;
        if !types.contains(&job_type) {
            types.push(job_type);
        }
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_list_is_parsed_and_deduplicated() {
        let types = parse_job_types("generate, long_video,generate,").unwrap();
        assert_eq!(types, vec![JobType::Generate, JobType::LongVideo]);
    }

    #[test]
    fn unknown_job_type_is_rejected() {
        assert!(parse_job_types("generate,render").is_err());
    }

    #[test]
    fn defaults_serve_every_queue() {
        let config = WorkerConfig::default();
        assert_eq!(config.job_types.len(), JobType::ALL.len());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }
}
