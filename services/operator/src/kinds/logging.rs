//! Log throughput generator.

use kperf_api::{OcpLogtestSpec, PodConfigurationSpec};

use super::{require_positive, JobKind, JobRecipe, RecipeContext};
use crate::plan::NormalizeError;
use crate::validation::ValidationError;

impl JobKind for OcpLogtestSpec {
    fn pod_config(&self) -> &PodConfigurationSpec {
        &self.pod_config
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_positive("lineLength", self.line_length.into())?;
        require_positive("numLines", self.num_lines.into())?;
        require_positive("rate", self.rate.into())
    }

    fn recipe(&self, _ctx: &RecipeContext<'_>) -> Result<JobRecipe, NormalizeError> {
        let mut args = vec![
            "/ocp_logtest.py".to_string(),
            format!("--line-length={}", self.line_length),
            format!("--num-lines={}", self.num_lines),
            format!("--rate={}", self.rate),
        ];
        if self.fixed_line {
            args.push("--fixed-line".to_string());
        }

        Ok(JobRecipe {
            command: vec!["python".to_string()],
            args,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_logtest() {
        let spec = OcpLogtestSpec {
            line_length: 1024,
            num_lines: 300000,
            rate: 60000,
            fixed_line: true,
            ..Default::default()
        };
        assert!(spec.validate().is_ok());

        let recipe = spec
            .recipe(&RecipeContext {
                name: "logs-1",
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(recipe.args.last().map(String::as_str), Some("--fixed-line"));
        assert!(recipe.args.contains(&"--rate=60000".to_string()));

        let zero_rate = OcpLogtestSpec { rate: 0, ..spec };
        assert!(zero_rate.validate().is_err());
    }
}
