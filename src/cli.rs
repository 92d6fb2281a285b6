//! Command-line interface definitions and argument parsing

use chrono::NaiveDateTime;
use clap::Parser;

use crate::data::parse_timestamp;
use crate::metrics::NegativeRecencyPolicy;
use crate::pipeline::RfmConfig;
use crate::segment::Segment;

/// Customer segmentation CLI using RFM quantile scoring
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input transactions CSV file
    #[arg(short, long, default_value = "online_retail_II.csv")]
    pub input: String,

    /// Reference date for recency, at or after the last invoice
    /// Example: --analysis-date 2011-12-11
    #[arg(short = 'd', long, env = "RFM_ANALYSIS_DATE")]
    pub analysis_date: String,

    /// Optional path for the per-customer segment CSV export
    #[arg(short, long)]
    pub output: Option<String>,

    /// List the customer ids of one segment, e.g. "need_attention"
    #[arg(short, long)]
    pub segment: Option<String>,

    /// Fewest customers accepted for quantile scoring
    #[arg(long, default_value = "5")]
    pub min_customers: usize,

    /// Handling of purchases dated after the analysis date
    #[arg(long, value_enum, default_value_t = NegativeRecencyPolicy::Reject)]
    pub negative_recency: NegativeRecencyPolicy,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "RFM_LOG_LEVEL")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the analysis date
    /// Accepted: "YYYY-MM-DD", "YYYY-MM-DD HH:MM[:SS]", "YYYY-MM-DDTHH:MM[:SS]" or RFC 3339
    pub fn parse_analysis_date(&self) -> crate::Result<NaiveDateTime> {
        parse_timestamp(&self.analysis_date)
            .ok_or_else(|| anyhow::anyhow!("Invalid analysis date: {}", self.analysis_date))
    }

    /// Parse the optional segment filter
    pub fn parse_segment(&self) -> crate::Result<Option<Segment>> {
        self.segment.as_deref().map(str::parse).transpose()
    }

    /// Build the pipeline configuration
    pub fn rfm_config(&self) -> crate::Result<RfmConfig> {
        let config = RfmConfig::new(self.parse_analysis_date()?)
            .with_min_customers(self.min_customers)
            .with_negative_recency(self.negative_recency);
        config.validate()?;
        Ok(config)
    }

    /// Effective tracing filter directive
    pub fn log_filter(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            input: "test.csv".to_string(),
            analysis_date: "2011-12-11".to_string(),
            output: None,
            segment: None,
            min_customers: 5,
            negative_recency: NegativeRecencyPolicy::Reject,
            log_level: "info".to_string(),
            verbose: false,
        }
    }

    #[test]
    fn test_parse_analysis_date() {
        let mut args = args();
        let date = args.parse_analysis_date().unwrap();
        assert_eq!(date.to_string(), "2011-12-11 00:00:00");

        args.analysis_date = "2011-12-11T08:30:00".to_string();
        assert_eq!(
            args.parse_analysis_date().unwrap().to_string(),
            "2011-12-11 08:30:00"
        );

        args.analysis_date = "invalid".to_string();
        assert!(args.parse_analysis_date().is_err());
    }

    #[test]
    fn test_parse_segment() {
        let mut args = args();
        assert_eq!(args.parse_segment().unwrap(), None);

        args.segment = Some("need_attention".to_string());
        assert_eq!(args.parse_segment().unwrap(), Some(Segment::NeedAttention));

        args.segment = Some("whales".to_string());
        assert!(args.parse_segment().is_err());
    }

    #[test]
    fn test_rfm_config() {
        let mut args = args();
        args.negative_recency = NegativeRecencyPolicy::Clamp;
        let config = args.rfm_config().unwrap();
        assert_eq!(config.min_customers, 5);
        assert_eq!(config.negative_recency, NegativeRecencyPolicy::Clamp);

        args.min_customers = 0;
        assert!(args.rfm_config().is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let args = Args::try_parse_from([
            "rfmforge",
            "--input",
            "retail.csv",
            "--analysis-date",
            "2010-12-11",
            "--negative-recency",
            "clamp",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.input, "retail.csv");
        assert_eq!(args.negative_recency, NegativeRecencyPolicy::Clamp);
        assert_eq!(args.log_filter(), "debug");
    }
}
