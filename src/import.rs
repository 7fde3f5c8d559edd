use crate::phone::{normalize_phone, DEFAULT_COUNTRY_CODE};
use crate::roster_csv::{self, ColumnMap, FileError, ImportRow};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub name: String,
    pub group_name: String,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
}

impl From<&ImportRow> for NewStudent {
    fn from(row: &ImportRow) -> Self {
        NewStudent {
            name: row.name.clone(),
            group_name: row.group_name.clone(),
            guardian_name: row.guardian_name.clone(),
            guardian_phone: row.guardian_phone.clone(),
        }
    }
}

pub trait GroupRepository {
    fn list_group_names(&self) -> anyhow::Result<Vec<String>>;
    fn insert_groups(&mut self, names: &[String]) -> anyhow::Result<()>;
}

pub trait StudentRepository {
    fn list_guardian_phones(&self) -> anyhow::Result<Vec<String>>;
    /// One call is one chunk; implementations insert all rows or none.
    fn insert_students(&mut self, rows: &[NewStudent]) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    File(#[from] FileError),
    #[error("failed to create missing halaqah: {0:#}")]
    GroupSync(anyhow::Error),
    #[error("failed to read existing records: {0:#}")]
    Lookup(anyhow::Error),
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::File(e) => e.code(),
            ImportError::GroupSync(_) => "group_sync_failed",
            ImportError::Lookup(_) => "db_query_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub country_code: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            batch_size: DEFAULT_BATCH_SIZE,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub rows_total: usize,
    pub invalid: usize,
    pub groups_created: Vec<String>,
    pub inserted: usize,
    pub failed: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    New,
    Duplicate,
    Invalid,
}

/// Distinct group names of valid rows, in first-seen order.
pub fn referenced_groups(rows: &[ImportRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|r| r.is_valid)
        .filter(|r| seen.insert(r.group_name.as_str()))
        .map(|r| r.group_name.clone())
        .collect()
}

/// Creates the groups `wanted` that storage does not have yet, returning
/// the names inserted.
pub fn sync_groups<G: GroupRepository>(
    store: &mut G,
    wanted: &[String],
) -> Result<Vec<String>, ImportError> {
    let existing = store
        .list_group_names()
        .map_err(ImportError::GroupSync)?
        .into_iter()
        .collect::<HashSet<_>>();
    let missing = wanted
        .iter()
        .filter(|name| !existing.contains(name.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        return Ok(missing);
    }
    store.insert_groups(&missing).map_err(ImportError::GroupSync)?;
    Ok(missing)
}

pub struct DuplicateFilter {
    seen: HashSet<String>,
    country_code: String,
}

impl DuplicateFilter {
    pub fn new<I, S>(existing: I, country_code: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seen = existing
            .into_iter()
            .map(|p| normalize_phone(p.as_ref(), country_code))
            .filter(|p| !p.is_empty())
            .collect();
        DuplicateFilter {
            seen,
            country_code: country_code.to_string(),
        }
    }

    pub fn is_duplicate(&self, phone: Option<&str>) -> bool {
        let normalized = normalize_phone(phone.unwrap_or(""), &self.country_code);
        !normalized.is_empty() && self.seen.contains(&normalized)
    }

    /// Returns false when the phone was already taken. Empty phones are
    /// always accepted and never remembered.
    pub fn accept(&mut self, phone: Option<&str>) -> bool {
        let normalized = normalize_phone(phone.unwrap_or(""), &self.country_code);
        if normalized.is_empty() {
            return true;
        }
        self.seen.insert(normalized)
    }
}

/// Returns `(succeeded, failed)`. A failed chunk counts all of its rows as
/// failed and the next chunk is still attempted.
pub fn insert_in_batches<S: StudentRepository>(
    store: &mut S,
    rows: &[NewStudent],
    batch_size: usize,
) -> (usize, usize) {
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for (i, chunk) in rows.chunks(batch_size.max(1)).enumerate() {
        match store.insert_students(chunk) {
            Ok(()) => succeeded += chunk.len(),
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(chunk = i, rows = chunk.len(), %error, "student chunk insert failed");
                failed += chunk.len();
            }
        }
    }
    (succeeded, failed)
}

/// Per-row status against current storage, with no writes.
pub fn preview_statuses<S: StudentRepository>(
    store: &S,
    rows: &[ImportRow],
    settings: &ImportSettings,
) -> Result<Vec<RowStatus>, ImportError> {
    let phones = store.list_guardian_phones().map_err(ImportError::Lookup)?;
    let mut filter = DuplicateFilter::new(phones, &settings.country_code);
    Ok(rows
        .iter()
        .map(|row| {
            if !row.is_valid {
                RowStatus::Invalid
            } else if filter.accept(row.guardian_phone.as_deref()) {
                RowStatus::New
            } else {
                RowStatus::Duplicate
            }
        })
        .collect())
}

pub fn read_file(text: &str) -> Result<(ColumnMap, Vec<ImportRow>), ImportError> {
    Ok(roster_csv::read_roster(text)?)
}

/// Full import: validate, create missing halaqah, drop duplicate guardian
/// phones, insert the rest in chunks.
pub fn run_import<S>(
    store: &mut S,
    text: &str,
    settings: &ImportSettings,
) -> Result<ImportReport, ImportError>
where
    S: GroupRepository + StudentRepository,
{
    let (_, rows) = read_file(text)?;
    let invalid = rows.iter().filter(|r| !r.is_valid).count();

    let groups_created = match sync_groups(store, &referenced_groups(&rows)) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "import aborted before inserting students");
            return Err(e);
        }
    };

    let phones = store.list_guardian_phones().map_err(ImportError::Lookup)?;
    let mut filter = DuplicateFilter::new(phones, &settings.country_code);
    let mut duplicates = 0usize;
    let mut pending = Vec::new();
    for row in rows.iter().filter(|r| r.is_valid) {
        if filter.accept(row.guardian_phone.as_deref()) {
            pending.push(NewStudent::from(row));
        } else {
            duplicates += 1;
        }
    }

    let (inserted, failed) = insert_in_batches(store, &pending, settings.batch_size);
    let report = ImportReport {
        rows_total: rows.len(),
        invalid,
        groups_created,
        inserted,
        failed,
        duplicates,
    };
    tracing::info!(
        rows = report.rows_total,
        invalid = report.invalid,
        groups_created = report.groups_created.len(),
        inserted = report.inserted,
        failed = report.failed,
        duplicates = report.duplicates,
        "student import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[derive(Default)]
    struct MemoryStore {
        groups: Vec<String>,
        students: Vec<NewStudent>,
        fail_group_insert: bool,
        fail_chunks: Vec<usize>,
        chunk_calls: usize,
        group_insert_calls: usize,
    }

    impl GroupRepository for MemoryStore {
        fn list_group_names(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.groups.clone())
        }

        fn insert_groups(&mut self, names: &[String]) -> anyhow::Result<()> {
            self.group_insert_calls += 1;
            if self.fail_group_insert {
                return Err(anyhow!("groups table is read-only"));
            }
            self.groups.extend(names.iter().cloned());
            Ok(())
        }
    }

    impl StudentRepository for MemoryStore {
        fn list_guardian_phones(&self) -> anyhow::Result<Vec<String>> {
            Ok(self
                .students
                .iter()
                .filter_map(|s| s.guardian_phone.clone())
                .collect())
        }

        fn insert_students(&mut self, rows: &[NewStudent]) -> anyhow::Result<()> {
            let call = self.chunk_calls;
            self.chunk_calls += 1;
            if self.fail_chunks.contains(&call) {
                return Err(anyhow!("chunk {call} rejected"));
            }
            self.students.extend(rows.iter().cloned());
            Ok(())
        }
    }

    const SAMPLE: &str = "Nama Lengkap,Halaqah,Nama Wali,No HP Wali
Ahmad Fauzi,Halaqah Al-Fatihah,Budi Santoso,6281234567890
Muhammad Rizki,Halaqah Al-Ikhlas,Siti Aminah,085712345678
";

    fn roster(n: usize) -> String {
        let mut text = String::from("Nama,Halaqah,No HP\n");
        for i in 0..n {
            text.push_str(&format!("Santri {i},Halaqah A,0812{i:06}\n"));
        }
        text
    }

    #[test]
    fn fresh_import_creates_groups_and_students() {
        let mut store = MemoryStore::default();
        let report = run_import(&mut store, SAMPLE, &ImportSettings::default()).expect("import");
        assert_eq!(
            report.groups_created,
            vec!["Halaqah Al-Fatihah".to_string(), "Halaqah Al-Ikhlas".to_string()]
        );
        assert_eq!(report.inserted, 2);
        assert_eq!(report.duplicates, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(store.students.len(), 2);
    }

    #[test]
    fn rerun_is_all_duplicates_and_no_new_groups() {
        let mut store = MemoryStore::default();
        run_import(&mut store, SAMPLE, &ImportSettings::default()).expect("first");
        let report = run_import(&mut store, SAMPLE, &ImportSettings::default()).expect("second");
        assert!(report.groups_created.is_empty());
        assert_eq!(report.inserted, 0);
        assert_eq!(report.duplicates, 2);
        assert_eq!(store.groups.len(), 2);
        assert_eq!(store.group_insert_calls, 1);
    }

    #[test]
    fn sync_inserts_only_the_difference() {
        let mut store = MemoryStore {
            groups: vec!["Halaqah A".to_string()],
            ..Default::default()
        };
        let text = "Nama,Halaqah,No HP\nA,Halaqah A,1\nB,Halaqah B,2\nC,Halaqah B,3\nD,Halaqah A,4\n";
        let report = run_import(&mut store, text, &ImportSettings::default()).expect("import");
        assert_eq!(report.groups_created, vec!["Halaqah B".to_string()]);
        assert_eq!(store.groups, vec!["Halaqah A".to_string(), "Halaqah B".to_string()]);
    }

    #[test]
    fn groups_of_invalid_rows_are_not_created() {
        let mut store = MemoryStore::default();
        let text = "Nama,Halaqah,No HP\nA,Halaqah A,1\nB,Halaqah B,\n";
        let report = run_import(&mut store, text, &ImportSettings::default()).expect("import");
        assert_eq!(report.groups_created, vec!["Halaqah A".to_string()]);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn local_prefix_matches_existing_international_number() {
        let mut store = MemoryStore {
            groups: vec!["G".to_string()],
            students: vec![NewStudent {
                name: "Existing".into(),
                group_name: "G".into(),
                guardian_name: None,
                guardian_phone: Some("6281234567890".into()),
            }],
            ..Default::default()
        };
        let text = "Nama,Halaqah,No HP\nNew,G,081234567890\n";
        let report = run_import(&mut store, text, &ImportSettings::default()).expect("import");
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.inserted, 0);
    }

    #[test]
    fn same_phone_twice_in_one_file_keeps_the_first() {
        let mut store = MemoryStore::default();
        let text = "Nama,Halaqah,No HP\nA,G,081234567890\nB,G,6281234567890\n";
        let report = run_import(&mut store, text, &ImportSettings::default()).expect("import");
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(store.students[0].name, "A");
    }

    #[test]
    fn empty_phone_is_never_a_duplicate() {
        let filter = DuplicateFilter::new(vec![String::new(), "0812".to_string()], "62");
        assert!(!filter.is_duplicate(None));
        assert!(!filter.is_duplicate(Some("")));
        assert!(filter.is_duplicate(Some("62812")));
    }

    #[test]
    fn group_sync_failure_aborts_before_students() {
        let mut store = MemoryStore {
            fail_group_insert: true,
            ..Default::default()
        };
        let err = run_import(&mut store, SAMPLE, &ImportSettings::default()).expect_err("abort");
        assert_eq!(err.code(), "group_sync_failed");
        assert!(err.to_string().contains("read-only"));
        assert_eq!(store.chunk_calls, 0);
        assert!(store.students.is_empty());
    }

    #[test]
    fn failed_chunk_is_counted_and_later_chunks_continue() {
        let mut store = MemoryStore {
            fail_chunks: vec![1],
            ..Default::default()
        };
        let settings = ImportSettings {
            batch_size: 50,
            ..Default::default()
        };
        let report = run_import(&mut store, &roster(120), &settings).expect("import");
        assert_eq!(store.chunk_calls, 3);
        assert_eq!(report.failed, 50);
        assert_eq!(report.inserted, 70);
        assert_eq!(store.students.len(), 70);
    }

    #[test]
    fn structural_errors_surface_with_codes() {
        let mut store = MemoryStore::default();
        let err = run_import(&mut store, "Nama,Halaqah\n", &ImportSettings::default())
            .expect_err("header only");
        assert_eq!(err.code(), "bad_file");
        let err = run_import(&mut store, "Nama,No HP\nA,1\n", &ImportSettings::default())
            .expect_err("no group column");
        assert_eq!(err.code(), "missing_columns");
        assert_eq!(store.group_insert_calls, 0);
    }

    #[test]
    fn preview_marks_rows_without_writing() {
        let store = MemoryStore {
            students: vec![NewStudent {
                name: "Existing".into(),
                group_name: "G".into(),
                guardian_name: None,
                guardian_phone: Some("085712345678".into()),
            }],
            ..Default::default()
        };
        let (_, rows) = read_file(&format!("{SAMPLE}Tanpa HP,G,,\n")).expect("read");
        let statuses = preview_statuses(&store, &rows, &ImportSettings::default()).expect("preview");
        assert_eq!(
            statuses,
            vec![RowStatus::New, RowStatus::Duplicate, RowStatus::Invalid]
        );
        assert_eq!(store.students.len(), 1);
    }
}
