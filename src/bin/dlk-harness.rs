use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use dlk_harness::{prelude::*, remote::RemoteTarget};

#[derive(Parser)]
#[command(name = "dlk-harness")]
#[command(about = "Builds generated inference projects and checks them against golden outputs")]
#[command(version)]
struct Cli {
    /// Extra config file, applied after the discovered ones
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every case of a suite
    Run(RunArgs),

    /// Print the enumerated configurations of a suite
    List { suite: String },

    /// Print the merged configuration
    ShowConfig,
}

#[derive(Args)]
struct RunArgs {
    /// x86_64, aarch64 or arm_fpga
    suite: String,

    /// Cases at or above this level are skipped
    #[arg(short, long, value_name = "N")]
    level: Option<u32>,

    /// Board used for remote validation
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    #[arg(long, value_name = "DIR")]
    build_root: Option<PathBuf>,

    /// Remove the suite directory after the run (off unless `[run] cleanup` is set)
    #[arg(long, conflicts_with = "no_cleanup")]
    cleanup: bool,

    /// Keep the suite directory even when `[run] cleanup = true`
    #[arg(long)]
    no_cleanup: bool,

    /// Keep capture files of passing tool runs
    #[arg(long)]
    keep_outputs: bool,
}

impl RunArgs {
    /// Command line flags override the config files.
    fn run_context(&self, config: &HarnessConfig) -> Result<RunContext> {
        let mut builder = RunContext::builder_from_config(config);
        if let Some(level) = self.level {
            builder = builder.current_test_level(level);
        }
        if let Some(host) = &self.host {
            builder =
                builder.remote(RemoteTarget::from_section(&config.remote).with_host(host.clone()));
        }
        if let Some(root) = &self.build_root {
            builder = builder.build_root(root.clone());
        }
        if self.cleanup {
            builder = builder.cleanup(true);
        }
        if self.no_cleanup {
            builder = builder.cleanup(false);
        }
        if self.keep_outputs {
            builder = builder.keep_outputs(true);
        }
        builder.build().context("Invalid run configuration")
    }
}

fn load_config(extra: Option<&PathBuf>) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::discover().context("Failed to read config files")?;
    if let Some(path) = extra {
        config.update(
            HarnessConfig::from_file(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }
    Ok(config)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run(args) => {
            let suite: Suite = args.suite.parse()?;
            let ctx = args.run_context(&config)?;

            let generator = ScriptCodeGenerator::from_context(&ctx);
            let provisioner = CommandProvisioner;
            let report = Harness::new(&ctx, &generator, &provisioner)
                .run_suite(suite)
                .with_context(|| format!("Suite {suite} could not start"))?;

            report.dump_failures();
            println!("{}", report.summary());
            Ok(if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::List { suite } => {
            let suite: Suite = suite.parse()?;
            for case in suite.configurations()? {
                println!("{:>3} {:?}", case.index, case.configuration);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::ShowConfig => {
            println!(
                "{}",
                toml::to_string_pretty(&config).context("Config is not representable as TOML")?
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            _ => panic!("expected the run subcommand"),
        }
    }

    #[test]
    fn cleanup_flags_override_the_config() {
        let mut config = HarnessConfig::default();
        let ctx = run_args(&["dlk-harness", "run", "x86_64"])
            .run_context(&config)
            .unwrap();
        assert!(!ctx.cleanup);

        let ctx = run_args(&["dlk-harness", "run", "x86_64", "--cleanup"])
            .run_context(&config)
            .unwrap();
        assert!(ctx.cleanup);

        config.run.cleanup = Some(true);
        let ctx = run_args(&["dlk-harness", "run", "x86_64", "--no-cleanup"])
            .run_context(&config)
            .unwrap();
        assert!(!ctx.cleanup);

        let both = ["dlk-harness", "run", "x86_64", "--cleanup", "--no-cleanup"];
        assert!(Cli::try_parse_from(both).is_err());
    }

    #[test]
    fn level_and_host_are_applied() {
        let ctx = run_args(&["dlk-harness", "run", "arm_fpga", "-l", "3", "--host", "10.0.0.2"])
            .run_context(&HarnessConfig::default())
            .unwrap();
        assert_eq!(ctx.current_test_level, 3);
        assert_eq!(ctx.remote.login().unwrap(), "root@10.0.0.2");
    }
}
