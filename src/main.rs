#![warn(non_snake_case)]

use anyhow::{Context, Result, anyhow};
use log::debug;

use pn_statespace::analysis::state::StateKind;
use pn_statespace::config::ExplorerConfig;
use pn_statespace::net::io::read_net;
use pn_statespace::options::Options;
use pn_statespace::state_io::{generate_to_files, load_files};

fn main() -> Result<()> {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let mut flags = shellwords::split(&std::env::var("PN_FLAGS").unwrap_or_default())
        .map_err(|err| anyhow!("invalid PN_FLAGS: {err}"))?;
    for (i, arg) in std::env::args_os().enumerate().skip(1) {
        let arg = arg
            .into_string()
            .map_err(|arg| anyhow!("Argument {i} is not valid Unicode: {arg:?}"))?;
        flags.push(arg);
    }

    let options = Options::parse_from_args(&flags).map_err(|err| anyhow!("{err}"))?;
    debug!("PN options: {:?}", options);

    let mut config = match &options.config {
        Some(path) => ExplorerConfig::load_from_file(path)?,
        None => ExplorerConfig::default(),
    };
    options.apply(&mut config);
    debug!("explorer config: {:?}", config);

    let net = read_net(&options.net)
        .with_context(|| format!("Failed to load net {:?}", options.net))?;
    let stats = generate_to_files(&net, &config).context("State space generation failed")?;

    println!(
        "{} states, {} edges, {} deadlocks",
        stats.state_count, stats.edge_count, stats.deadlock_count
    );

    if options.summary {
        let space = load_files(&config.states_path, &config.records_path)
            .context("Failed to reload written state space")?;
        let vanishing = space
            .states
            .values()
            .filter(|state| state.kind == StateKind::Vanishing)
            .count();
        println!(
            "reloaded {} states ({} tangible, {} vanishing) from {:?} and {:?}",
            space.states.len(),
            space.states.len() - vanishing,
            vanishing,
            config.states_path,
            config.records_path
        );
        for (id, state) in &space.states {
            let record = space.record(*id);
            let out = record.map_or(0, |record| record.successors.len());
            let total = record.map_or(0.0, |record| record.total_rate());
            println!("  {id} {state} -> {out} successors, total rate {total}");
        }
    }

    Ok(())
}
