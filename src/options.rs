//! Parsing Options.
//! `pn-ss <NET> [-c config.toml] [-p eliminate|keep] [-w N] [--no-cache] [--states FILE] [--records FILE] [--summary]`

use clap::{Arg, ArgAction, Command, value_parser};
use std::error::Error;
use std::path::PathBuf;

use crate::analysis::vanishing::VanishingPolicy;
use crate::config::ExplorerConfig;

fn make_options_parser() -> clap::Command {
    let parser = Command::new("pn-ss")
        .no_binary_name(true)
        .version("v0.1.0")
        .about("Generates the reachable state space of a stochastic Petri net")
        .args_override_self(true)
        .arg(
            Arg::new("net")
                .value_name("NET")
                .help("Net description (.json, .ron or .toml)")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Explorer configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("policy")
                .short('p')
                .long("policy")
                .help("How vanishing markings are handled")
                .value_parser(["eliminate", "keep"]),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .help("Worker threads, 0 explores sequentially")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("no-cache")
                .long("no-cache")
                .help("Recompute successors instead of caching them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("states")
                .long("states")
                .value_name("FILE")
                .help("Where the state mapping stream is written")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("records")
                .long("records")
                .value_name("FILE")
                .help("Where the record stream is written")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .help("Reload the written streams and print a summary")
                .action(ArgAction::SetTrue),
        );
    parser
}

/// Command line flags. Everything except `net` overrides the configuration file.
#[derive(Debug, Default, PartialEq)]
pub struct Options {
    pub net: PathBuf,
    pub config: Option<PathBuf>,
    pub policy: Option<VanishingPolicy>,
    pub workers: Option<usize>,
    pub no_cache: bool,
    pub states: Option<PathBuf>,
    pub records: Option<PathBuf>,
    pub summary: bool,
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;

        let policy = match matches.get_one::<String>("policy").map(String::as_str) {
            None => None,
            Some("eliminate") => Some(VanishingPolicy::Eliminate),
            Some("keep") => Some(VanishingPolicy::Keep),
            Some(_) => return Err("UnsupportedVanishingPolicy")?,
        };
        let net = matches
            .get_one::<PathBuf>("net")
            .cloned()
            .ok_or("MissingNetPath")?;

        Ok(Options {
            net,
            config: matches.get_one::<PathBuf>("config").cloned(),
            policy,
            workers: matches.get_one::<usize>("workers").copied(),
            no_cache: matches.get_flag("no-cache"),
            states: matches.get_one::<PathBuf>("states").cloned(),
            records: matches.get_one::<PathBuf>("records").cloned(),
            summary: matches.get_flag("summary"),
        })
    }

    /// Layers the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut ExplorerConfig) {
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.no_cache {
            config.cache_successors = false;
        }
        if let Some(states) = &self.states {
            config.states_path = states.clone();
        }
        if let Some(records) = &self.records {
            config.records_path = records.clone();
        }
    }
}
