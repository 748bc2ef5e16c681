//! Record imports
//!
//! Imports take already-split rows whose first record is the header. Rows are
//! buffered and flushed with one `insert_batch` every `batch_size` rows, inside
//! the unit of work of the import, so a failing row discards the earlier
//! flushes too.

use crate::core::entity::{Entity, Record};
use crate::core::error::{AppError, Result};
use crate::core::store::Repository;
use crate::entities::Profile;
use uuid::Uuid;

pub const DEVICE_HEADER: &[&str] = &["MAC Address"];

pub const PARAMETER_HEADER: &[&str] = &["Path", "Data Type", "Description"];

pub const PROFILE_HEADER: &[&str] = &[
    "Name",
    "Msg Type",
    "Tags",
    "Max Depth",
    "Allow Partial",
    "First Level Only",
    "Return Commands",
    "Return Events",
    "Return Params",
    "Return Unique Key Sets",
    "Send Resp",
    "Parameters IDs",
];

/// Split off the header and check that it starts with `expected`
///
/// Cells are compared trimmed and ignoring case; extra trailing header
/// columns are allowed.
pub(super) fn data_rows<'a>(records: &'a [Vec<String>], expected: &[&str]) -> Result<&'a [Vec<String>]> {
    let (header, rows) = records
        .split_first()
        .ok_or_else(|| AppError::invalid("headers", "invalid csv header"))?;
    let matches = header.len() >= expected.len()
        && expected
            .iter()
            .zip(header)
            .all(|(want, got)| got.trim().eq_ignore_ascii_case(want));
    if !matches {
        tracing::warn!(?header, ?expected, "import header mismatch");
        return Err(AppError::invalid("headers", "invalid csv header"));
    }
    Ok(rows)
}

/// Rows waiting for the next flush
pub(super) struct Batch<E: Record> {
    pending: Vec<E>,
    size: usize,
    ids: Vec<Uuid>,
}

impl<E: Record> Batch<E> {
    pub(super) fn new(size: usize) -> Self {
        Self {
            pending: Vec::with_capacity(size.max(1)),
            size: size.max(1),
            ids: Vec::new(),
        }
    }

    pub(super) fn pending(&self) -> &[E] {
        &self.pending
    }

    /// Buffer a row without flushing
    pub(super) fn buffer(&mut self, record: E) {
        self.pending.push(record);
    }

    pub(super) fn is_full(&self) -> bool {
        self.pending.len() >= self.size
    }

    /// Buffer a row, flushing when the batch is full
    pub(super) async fn push<R: Repository>(&mut self, repo: &mut R, record: E) -> Result<()> {
        self.buffer(record);
        if self.is_full() {
            self.flush(repo).await?;
        }
        Ok(())
    }

    pub(super) async fn flush<R: Repository>(&mut self, repo: &mut R) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        repo.insert_batch(&mut self.pending).await?;
        tracing::debug!(entity = E::ENTITY_NAME, rows = self.pending.len(), "batch flushed");
        self.ids.extend(self.pending.iter().map(Entity::id));
        self.pending.clear();
        Ok(())
    }

    /// Flush the remainder and return every inserted id
    pub(super) async fn finish<R: Repository>(mut self, repo: &mut R) -> Result<Vec<Uuid>> {
        self.flush(repo).await?;
        Ok(self.ids)
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(|value| value.trim()).unwrap_or_default()
}

fn flag(row: &[String], index: usize) -> bool {
    cell(row, index).eq_ignore_ascii_case("true")
}

/// One profile row: the profile and the ids of its parameters
pub(super) fn profile_row(row: &[String], updated_by: &str) -> Result<(Profile, Vec<Uuid>)> {
    if row.len() < PROFILE_HEADER.len() {
        return Err(AppError::invalid(
            "headers",
            format!(
                "profile row has {} columns, expected {}",
                row.len(),
                PROFILE_HEADER.len()
            ),
        ));
    }

    let mut profile = Profile::new(cell(row, 0), updated_by);
    profile.msg_type = cell(row, 1)
        .parse()
        .map_err(|_| AppError::invalid("msg_type", "invalid msg_type"))?;
    let tags = cell(row, 2);
    if !tags.is_empty() {
        profile.tags = tags.split(';').map(|tag| tag.trim().to_string()).collect();
    }
    profile.max_depth = cell(row, 3)
        .parse()
        .map_err(|_| AppError::invalid("max_depth", "invalid max_depth"))?;
    profile.allow_partial = flag(row, 4);
    profile.first_level_only = flag(row, 5);
    profile.return_commands = flag(row, 6);
    profile.return_events = flag(row, 7);
    profile.return_params = flag(row, 8);
    profile.return_unique_key_sets = flag(row, 9);
    profile.send_resp = flag(row, 10);

    let parameter_ids = cell(row, 11)
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            Uuid::parse_str(id).map_err(|_| {
                AppError::invalid("parameters", format!("invalid parameter id: {}", id))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((profile, parameter_ids))
}
