//! 状态空间的持久化：状态映射流与转移记录流的写出、读回，以及面向使用方的生成/加载入口。

pub mod codec;
pub mod processor;
pub mod reader;
pub mod writer;

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::analysis::explorer::{
    ExplorationError, ExplorationMode, ExplorationStats, StateSpaceExplorer,
};
use crate::analysis::explorer_utils::{
    CachingExplorerUtilities, ExplorerUtilities, ModelQueryError, NetExplorerUtilities,
};
use crate::analysis::state::ClassifiedState;
use crate::analysis::vanishing::VanishingPolicy;
use crate::config::ExplorerConfig;
use crate::net::Net;

pub use codec::DecodeError;
pub use processor::{CollectingProcessor, StateIOProcessor, StateProcessor};
pub use reader::{StateGraph, StateReader, StateSpace};
pub use writer::{BinaryStateIo, StateWriter};

/// Explores from `initial` and encodes the result into the two writers, which are handed
/// back on success.
pub fn generate_streams<U, W1, W2>(
    utils: &U,
    initial: &ClassifiedState,
    policy: VanishingPolicy,
    mode: ExplorationMode,
    states: W1,
    records: W2,
) -> Result<(W1, W2, ExplorationStats), ExplorationError>
where
    U: ExplorerUtilities + Sync,
    W1: Write + Send,
    W2: Write + Send,
{
    let mut processor = StateIOProcessor::new(BinaryStateIo, states, records);
    let stats = StateSpaceExplorer::new(utils, policy)
        .with_mode(mode)
        .generate(initial, &mut processor)?;
    processor.flush()?;
    let (states, records) = processor.into_inner();
    Ok((states, records, stats))
}

/// Generates the state space of `net` into `config.states_path` / `config.records_path`.
///
/// Output goes to `.partial` siblings first and is moved into place only when the whole run
/// succeeds; after a failure neither destination is touched.
pub fn generate_to_files(
    net: &Net,
    config: &ExplorerConfig,
) -> Result<ExplorationStats, ExplorationError> {
    net.validate().map_err(ModelQueryError::from)?;
    net.log_diagnostics();

    let states_tmp = partial_path(&config.states_path);
    let records_tmp = partial_path(&config.records_path);

    let outcome = write_partial(net, config, &states_tmp, &records_tmp);
    match outcome {
        Ok(stats) => {
            fs::rename(&states_tmp, &config.states_path)?;
            fs::rename(&records_tmp, &config.records_path)?;
            info!(
                "wrote {} states to {:?} and one record per state to {:?}",
                stats.state_count, config.states_path, config.records_path
            );
            Ok(stats)
        }
        Err(err) => {
            for path in [&states_tmp, &records_tmp] {
                if let Err(remove_err) = fs::remove_file(path) {
                    warn!("could not remove partial output {:?}: {}", path, remove_err);
                }
            }
            Err(err)
        }
    }
}

fn write_partial(
    net: &Net,
    config: &ExplorerConfig,
    states_path: &Path,
    records_path: &Path,
) -> Result<ExplorationStats, ExplorationError> {
    for path in [states_path, records_path] {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }
    let states = BufWriter::new(File::create(states_path)?);
    let records = BufWriter::new(File::create(records_path)?);
    let plain = NetExplorerUtilities::new(net);
    let initial = plain.current_state();

    let (states, records, stats) = if config.cache_successors {
        let cached = CachingExplorerUtilities::new(plain);
        let result = generate_streams(
            &cached,
            &initial,
            config.policy,
            config.mode(),
            states,
            records,
        )?;
        info!("successor cache held {} markings", cached.cached_len());
        result
    } else {
        generate_streams(
            &plain,
            &initial,
            config.policy,
            config.mode(),
            states,
            records,
        )?
    };

    states.into_inner().map_err(|err| err.into_error())?.sync_all()?;
    records.into_inner().map_err(|err| err.into_error())?.sync_all()?;
    Ok(stats)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Reloads a state space from two in-memory or on-disk streams.
pub fn load<R1: Read, R2: Read>(states: R1, records: R2) -> Result<StateSpace, DecodeError> {
    let mut states = BufReader::new(states);
    let mut records = BufReader::new(records);
    reader::load(&BinaryStateIo, &mut states, &mut records)
}

pub fn load_files<P1, P2>(states_path: P1, records_path: P2) -> Result<StateSpace, DecodeError>
where
    P1: AsRef<Path>,
    P2: AsRef<Path>,
{
    load(File::open(states_path)?, File::open(records_path)?)
}
