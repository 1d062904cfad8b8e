//! Database and system benchmarks: sysbench, pgbench and YCSB.

use kperf_api::{PgbenchSpec, PodConfigurationSpec, SysbenchSpec, YcsbSpec};

use super::{require, require_positive, InitRecipe, JobKind, JobRecipe, RecipeContext};
use crate::plan::{split_args, EnvPlan, NormalizeError};
use crate::validation::ValidationError;

impl JobKind for SysbenchSpec {
    fn pod_config(&self) -> &PodConfigurationSpec {
        &self.pod_config
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require("testName", &self.test_name)
    }

    fn recipe(&self, _ctx: &RecipeContext<'_>) -> Result<JobRecipe, NormalizeError> {
        let mut args = split_args("sysbench.options", &self.options)?;
        args.push(self.test_name.clone());
        args.push("run".to_string());

        Ok(JobRecipe {
            command: vec!["sysbench".to_string()],
            args,
            ..Default::default()
        })
    }
}

impl JobKind for PgbenchSpec {
    fn pod_config(&self) -> &PodConfigurationSpec {
        &self.pod_config
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require("postgres.host", &self.postgres.host)?;
        require("postgres.user", &self.postgres.user)?;
        require("postgres.database", &self.postgres.database)?;
        if let Some(secret) = &self.postgres.password_secret {
            if !self.postgres.password.is_empty() {
                return Err(ValidationError::invalid(
                    "postgres.password",
                    "must not be set together with postgres.passwordSecret",
                ));
            }
            require("postgres.passwordSecret.name", &secret.name)?;
            require("postgres.passwordSecret.key", &secret.key)?;
        }
        if !(1..=65535).contains(&self.postgres.port) {
            return Err(ValidationError::invalid(
                "postgres.port",
                format!("must be within 1..=65535, got {}", self.postgres.port),
            ));
        }
        Ok(())
    }

    fn recipe(&self, _ctx: &RecipeContext<'_>) -> Result<JobRecipe, NormalizeError> {
        let postgres = &self.postgres;
        let mut env = vec![
            EnvPlan::new("PGHOST", postgres.host.as_str()),
            EnvPlan::new("PGPORT", postgres.port.to_string()),
            EnvPlan::new("PGUSER", postgres.user.as_str()),
            EnvPlan::new("PGDATABASE", postgres.database.as_str()),
        ];
        match &postgres.password_secret {
            Some(secret) => env.push(EnvPlan::from_secret("PGPASSWORD", secret)),
            None if !postgres.password.is_empty() => {
                env.push(EnvPlan::new("PGPASSWORD", postgres.password.as_str()))
            }
            None => {}
        }

        let init = if self.init_args.trim().is_empty() {
            None
        } else {
            let mut args = vec!["-i".to_string()];
            args.extend(split_args("pgbench.initArgs", &self.init_args)?);
            Some(InitRecipe {
                command: vec!["pgbench".to_string()],
                args,
            })
        };

        Ok(JobRecipe {
            command: vec!["pgbench".to_string()],
            args: split_args("pgbench.args", &self.args)?,
            env,
            init,
            ..Default::default()
        })
    }
}

/// Arguments shared by the YCSB load and run phases.
fn phase_args(spec: &YcsbSpec) -> Vec<String> {
    let mut args = vec![
        spec.database.clone(),
        "-s".to_string(),
        "-P".to_string(),
        format!("workloads/{}", spec.workload),
    ];

    let options = &spec.options;
    if let Some(records) = options.record_count {
        args.extend(["-p".to_string(), format!("recordcount={records}")]);
    }
    if let Some(operations) = options.operation_count {
        args.extend(["-p".to_string(), format!("operationcount={operations}")]);
    }
    if let Some(threads) = options.thread_count {
        args.extend(["-threads".to_string(), threads.to_string()]);
    }
    if let Some(target) = options.target {
        args.extend(["-target".to_string(), target.to_string()]);
    }
    for (key, value) in &spec.properties {
        args.extend(["-p".to_string(), format!("{key}={value}")]);
    }
    args
}

impl JobKind for YcsbSpec {
    fn pod_config(&self) -> &PodConfigurationSpec {
        &self.pod_config
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require("database", &self.database)?;
        require("workload", &self.workload)?;

        let options = &self.options;
        if let Some(records) = options.record_count {
            require_positive("options.recordCount", records)?;
        }
        if let Some(operations) = options.operation_count {
            require_positive("options.operationCount", operations)?;
        }
        if let Some(threads) = options.thread_count {
            require_positive("options.threadCount", threads.into())?;
        }
        if let Some(target) = options.target {
            require_positive("options.target", target.into())?;
        }

        if self.properties.keys().any(|key| key.trim().is_empty()) {
            return Err(ValidationError::invalid(
                "properties",
                "must not contain an empty key",
            ));
        }
        Ok(())
    }

    fn recipe(&self, _ctx: &RecipeContext<'_>) -> Result<JobRecipe, NormalizeError> {
        let command = vec!["./bin/ycsb".to_string()];

        let mut load = vec!["load".to_string()];
        load.extend(phase_args(self));
        let mut run = vec!["run".to_string()];
        run.extend(phase_args(self));

        Ok(JobRecipe {
            command: command.clone(),
            args: run,
            init: Some(InitRecipe {
                command,
                args: load,
            }),
            ..Default::default()
        })
    }
}
