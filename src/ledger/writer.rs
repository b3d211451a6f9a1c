// CSV outputs
//
// Every output file is owned by exactly one workflow and fully replaced on
// each run. The distribution ledger is additionally appended to row by row
// while the run is in progress so a crash never loses a confirmed transfer.
//
// Rows keep the historical `a, b, c,` layout: the header is written as-is,
// each value after the first carries a leading space and every row ends with
// an empty field. Values are escaped by the csv writer.

use csv::WriterBuilder;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::ledger::models::{CompletedTransfer, OvenRecord};

pub const LEDGER_HEADER: &str = "address, amount (mutez), operation hash,";
pub const VOTERS_HEADER: &str = "baker address,";
pub const OVENS_HEADER: &str = "oven address, owner address, balance (mutez),";

const STAGING_SUFFIX: &str = "tmp";

/// Append-only record of confirmed transfers
pub struct LedgerWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl LedgerWriter {
    /// Start a fresh ledger: any existing file is replaced by the header.
    pub fn create(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        remove_if_exists(&path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| AppError::io(&path, e))?;
        writeln!(file, "{}", LEDGER_HEADER).map_err(|e| AppError::io(&path, e))?;
        file.sync_data().map_err(|e| AppError::io(&path, e))?;

        debug!("📒 Ledger opened at {}", path.display());
        Ok(Self {
            path,
            writer: WriterBuilder::new().has_headers(false).from_writer(file),
            rows: 0,
        })
    }

    /// Append one confirmed transfer and sync it to disk before returning.
    pub fn append(&mut self, transfer: &CompletedTransfer) -> AppResult<()> {
        self.writer
            .write_record(ledger_record(transfer))
            .map_err(|e| AppError::io(&self.path, e.into()))?;
        self.writer
            .flush()
            .map_err(|e| AppError::io(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| AppError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Rewrite the ledger from scratch with the full completed list.
    ///
    /// Consumes the writer so nothing appends after the final rewrite.
    pub fn finish(self, completed: &[CompletedTransfer]) -> AppResult<PathBuf> {
        let LedgerWriter { path, writer, rows } = self;
        drop(writer);
        if rows != completed.len() {
            warn!(
                "⚠️ Ledger had {} appended rows, rewriting with {}",
                rows,
                completed.len()
            );
        }
        write_ledger(&path, completed)?;
        Ok(path)
    }
}

/// Replace `path` with the header plus one row per completed transfer.
pub fn write_ledger(path: impl AsRef<Path>, completed: &[CompletedTransfer]) -> AppResult<()> {
    replace_file(path.as_ref(), LEDGER_HEADER, completed.iter().map(ledger_record))
}

pub fn write_voters(path: impl AsRef<Path>, voters: &[String]) -> AppResult<()> {
    replace_file(
        path.as_ref(),
        VOTERS_HEADER,
        voters.iter().map(|voter| vec![voter.clone(), String::new()]),
    )
}

pub fn write_ovens(path: impl AsRef<Path>, ovens: &[OvenRecord]) -> AppResult<()> {
    replace_file(
        path.as_ref(),
        OVENS_HEADER,
        ovens.iter().map(|oven| {
            vec![
                oven.oven_address.clone(),
                format!(" {}", oven.owner_address),
                format!(" {}", oven.balance),
                String::new(),
            ]
        }),
    )
}

/// Write both reconciliation outputs, or neither.
///
/// Each file is written next to its target under a staging name and only
/// renamed into place once both are complete.
pub fn write_reconciliation(
    voters_path: impl AsRef<Path>,
    voters: &[String],
    ovens_path: impl AsRef<Path>,
    ovens: &[OvenRecord],
) -> AppResult<()> {
    let voters_path = voters_path.as_ref();
    let ovens_path = ovens_path.as_ref();
    let voters_staged = staging_path(voters_path);
    let ovens_staged = staging_path(ovens_path);

    let staged = write_voters(&voters_staged, voters)
        .and_then(|()| write_ovens(&ovens_staged, ovens));
    if let Err(e) = staged {
        discard(&voters_staged);
        discard(&ovens_staged);
        return Err(e);
    }

    if let Err(e) = fs::rename(&voters_staged, voters_path) {
        discard(&voters_staged);
        discard(&ovens_staged);
        return Err(AppError::io(voters_path, e));
    }
    if let Err(e) = fs::rename(&ovens_staged, ovens_path) {
        discard(voters_path);
        discard(&ovens_staged);
        return Err(AppError::io(ovens_path, e));
    }
    Ok(())
}

fn ledger_record(transfer: &CompletedTransfer) -> Vec<String> {
    vec![
        transfer.address.clone(),
        format!(" {}", transfer.amount),
        format!(" {}", transfer.operation_hash),
        String::new(),
    ]
}

fn replace_file<I>(path: &Path, header: &str, records: I) -> AppResult<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    remove_if_exists(path)?;

    let mut file = File::create(path).map_err(|e| AppError::io(path, e))?;
    writeln!(file, "{}", header).map_err(|e| AppError::io(path, e))?;

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    let mut count = 0usize;
    for record in records {
        writer
            .write_record(&record)
            .map_err(|e| AppError::io(path, e.into()))?;
        count += 1;
    }

    let file = writer
        .into_inner()
        .map_err(|e| AppError::io(path, e.into_error()))?;
    file.sync_all().map_err(|e| AppError::io(path, e))?;

    info!("📝 Written {} rows to {}", count, path.display());
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

fn discard(path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        warn!("⚠️ Could not remove {}: {}", path.display(), e);
    }
}

fn remove_if_exists(path: &Path) -> AppResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::io(path, e)),
    }
}
