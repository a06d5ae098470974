//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::{RunOptions, RunResult};
use crate::sources::{self, list_builtin, require_builtin, PipelineDef};
use serde_json::{json, Value};
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run {
                pipeline,
                partition_key,
            } => self.run_pipeline(pipeline, partition_key.clone()).await,
            Commands::List => {
                self.list_pipelines();
                Ok(())
            }
        }
    }

    /// Config file plus environment, with the pipeline's token variable
    pub fn config_for<F>(&self, def: &PipelineDef, lookup: F) -> Result<PipelineConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.cli.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        config.apply_env(&lookup)?;
        if let Some(var) = def.token_env {
            config.apply_token_env(var, &lookup);
        }
        Ok(config)
    }

    async fn run_pipeline(&self, name: &str, partition_key: Option<String>) -> Result<()> {
        let def = require_builtin(name)?;
        let config = self.config_for(def, |key| std::env::var(key).ok())?;

        info!(
            pipeline = def.name,
            config = ?self.cli.config,
            token = config.token().is_some(),
            "Running pipeline"
        );
        let result = sources::run_pipeline(
            def,
            &config,
            RunOptions::default().with_partition_key(partition_key),
        )
        .await?;

        self.output_result(&result);
        Ok(())
    }

    fn output_result(&self, result: &RunResult) {
        match self.cli.format {
            OutputFormat::Text => println!("Pipeline completed: {result}"),
            OutputFormat::Json => self.output_message(&json!({
                "type": "RESULT",
                "result": result,
            })),
        }
    }

    fn list_pipelines(&self) {
        match self.cli.format {
            OutputFormat::Text => {
                for def in list_builtin() {
                    println!(
                        "{:<18} {:<9} {}",
                        def.name,
                        def.destination.to_string(),
                        def.description
                    );
                }
            }
            OutputFormat::Json => self.output_message(&pipeline_list()),
        }
    }

    fn output_message(&self, msg: &Value) {
        println!("{}", serde_json::to_string(msg).unwrap_or_default());
    }
}

/// `PIPELINES` message describing every built-in pipeline
pub fn pipeline_list() -> Value {
    let pipelines: Vec<Value> = list_builtin()
        .map(|def| {
            json!({
                "name": def.name,
                "description": def.description,
                "destination": def.destination,
                "file_format": def.file_format,
                "token_env": def.token_env,
            })
        })
        .collect();

    json!({
        "type": "PIPELINES",
        "pipelines": pipelines,
    })
}
