use std::path::PathBuf;

use anyhow::{Context, Result};

use almanac_core::{Bucket, MonthDay};
use almanac_etl::output::{self, OutputFormat, OutputTarget};
use almanac_etl::{BackendKind, Config, Harvester};

#[derive(Debug, Clone, Default, clap::Args)]
pub struct HarvestArgs {
    /// Day to harvest, YYYY-MM-DD or MM-DD (default: today in UTC)
    #[arg(long)]
    pub date: Option<MonthDay>,

    /// Feed bucket to fetch; repeat for several (default: buckets from config)
    #[arg(long = "bucket", value_name = "BUCKET")]
    pub buckets: Vec<Bucket>,

    /// Directory for the output file (default: output_dir from config)
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Output file name inside the output directory (default: MM-DD.<ext>)
    #[arg(long, value_name = "NAME", conflicts_with = "stdout")]
    pub output: Option<PathBuf>,

    /// Write records to standard output instead of a file
    #[arg(long)]
    pub stdout: bool,

    /// Output format: json or csv
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Classification backend: sparql or entity
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Entity ids per classification request
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,
}

impl HarvestArgs {
    /// Layer command-line flags over the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if !self.buckets.is_empty() {
            config.buckets.clone_from(&self.buckets);
        }
        if let Some(dir) = &self.out_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(size) = self.batch_size {
            config.max_batch_size = size;
        }
    }

    pub fn target(&self, config: &Config, day: MonthDay) -> OutputTarget {
        if self.stdout {
            return OutputTarget::Stdout;
        }
        match &self.output {
            Some(name) => OutputTarget::File(config.output_dir.join(name)),
            None => OutputTarget::File(output::default_path(&config.output_dir, day, config.format)),
        }
    }
}

pub async fn run_harvest(mut config: Config, args: &HarvestArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let day = args.date.unwrap_or_else(MonthDay::today_utc);
    let target = args.target(&config, day);

    let harvester = Harvester::from_config(&config).context("Failed to set up harvester")?;
    log::info!(
        "Classifying with {} (batches of {})",
        harvester.classifier().backend_name(),
        harvester.classifier().max_batch_size()
    );

    let harvest = harvester
        .run(day, &config.buckets)
        .await
        .with_context(|| format!("Harvest for {day} failed"))?;

    output::write_output(&harvest.records, config.format, &target)
        .with_context(|| format!("Failed to write {target}"))?;

    let summary = format!("✓ {} records for {} written to {}", harvest.records.len(), day, target);
    if target == OutputTarget::Stdout {
        eprintln!("{summary}");
    } else {
        println!("{summary}");
    }

    if !harvest.report.dropped_ids.is_empty() {
        eprintln!(
            "  {} ids could not be classified and were left out",
            harvest.report.dropped_ids.len()
        );
    }
    if harvest.report.used_fallback && !harvest.records.is_empty() {
        eprintln!("  Wikidata classified nothing; records come from keyword matching");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        args: HarvestArgs,
    }

    fn parse(argv: &[&str]) -> HarvestArgs {
        let mut full = vec!["almanac"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "--bucket",
            "births",
            "--bucket",
            "deaths",
            "--format",
            "csv",
            "--backend",
            "entity",
            "--batch-size",
            "10",
            "--out-dir",
            "/tmp/otd",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.buckets, vec![Bucket::Births, Bucket::Deaths]);
        assert_eq!(config.format, OutputFormat::Csv);
        assert_eq!(config.backend, BackendKind::Entity);
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/otd"));
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut config = Config::default();
        parse(&[]).apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_targets() {
        let config = Config::default();
        let day = MonthDay::new(7, 4).unwrap();

        assert_eq!(
            parse(&[]).target(&config, day),
            OutputTarget::File(config.output_dir.join("07-04.json"))
        );
        assert_eq!(
            parse(&["--output", "today.json"]).target(&config, day),
            OutputTarget::File(config.output_dir.join("today.json"))
        );
        assert_eq!(parse(&["--stdout"]).target(&config, day), OutputTarget::Stdout);
    }

    #[test]
    fn test_date_accepts_full_and_short_forms() {
        assert_eq!(
            parse(&["--date", "2024-02-29"]).date,
            Some(MonthDay::new(2, 29).unwrap())
        );
        assert_eq!(parse(&["--date", "12-25"]).date, Some(MonthDay::new(12, 25).unwrap()));
        assert!(TestCli::try_parse_from(["almanac", "--date", "02-30"]).is_err());
    }

    #[test]
    fn test_output_conflicts_with_stdout() {
        assert!(TestCli::try_parse_from(["almanac", "--stdout", "--output", "x.json"]).is_err());
    }
}
