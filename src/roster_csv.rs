use serde::Serialize;
use thiserror::Error;

pub const TEMPLATE_FILE_NAME: &str = "template_import_santri.csv";

pub const TEMPLATE_CSV: &str = "Nama Lengkap,Halaqah,Nama Wali,No HP Wali
Ahmad Fauzi,Halaqah Al-Fatihah,Budi Santoso,6281234567890
Muhammad Rizki,Halaqah Al-Ikhlas,Siti Aminah,085712345678
Abdullah Hakim,Halaqah Al-Fatihah,Hasan Basri,081298765432
Umar Faruq,Halaqah An-Nas,Aisyah Rahma,6289876543210
";

const GUARDIAN_TOKENS: [&str; 5] = ["wali", "guardian", "parent", "ortu", "orang tua"];
const NAME_TOKENS: [&str; 2] = ["nama", "name"];
const GROUP_TOKENS: [&str; 4] = ["halaqah", "halaqoh", "kelompok", "group"];
const PHONE_TOKENS: [&str; 5] = ["hp", "whatsapp", "telp", "telepon", "phone"];

/// Structural problems that reject a file before any row is looked at.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("file must contain a header row and at least one data row")]
    TooFewLines,
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
    #[error("could not read CSV: {0}")]
    Csv(#[from] csv::Error),
}

impl FileError {
    pub fn code(&self) -> &'static str {
        match self {
            FileError::MissingColumns(_) => "missing_columns",
            FileError::TooFewLines | FileError::Csv(_) => "bad_file",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvLine {
    /// 1-based line in the source text.
    pub line: u64,
    pub fields: Vec<String>,
}

impl CsvLine {
    fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.is_empty())
    }

    fn value(&self, col: Option<usize>) -> String {
        col.and_then(|i| self.fields.get(i))
            .cloned()
            .unwrap_or_default()
    }
}

pub fn detect_delimiter(text: &str) -> u8 {
    let first = text.lines().next().unwrap_or("");
    if first.contains(';') {
        b';'
    } else {
        b','
    }
}

/// Splits the whole file on the delimiter found in its header line. Quoted
/// spans keep embedded delimiters and `""` collapses to `"`. The header is
/// returned as the first element.
pub fn parse_delimited(text: &str) -> Result<Vec<CsvLine>, FileError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(detect_delimiter(text))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut lines = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        lines.push(CsvLine {
            line,
            fields: record.iter().map(str::to_string).collect(),
        });
    }

    let data_rows = lines.iter().skip(1).filter(|l| !l.is_blank()).count();
    if data_rows == 0 {
        return Err(FileError::TooFewLines);
    }
    Ok(lines)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMap {
    pub name: Option<usize>,
    pub group: Option<usize>,
    pub guardian_name: Option<usize>,
    pub guardian_phone: Option<usize>,
}

impl ColumnMap {
    pub fn require(&self) -> Result<(), FileError> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.group.is_none() {
            missing.push("group");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FileError::MissingColumns(missing))
        }
    }
}

fn contains_any(header: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| header.contains(t))
}

fn is_guardian(header: &str) -> bool {
    contains_any(header, &GUARDIAN_TOKENS)
}

fn is_name_header(header: &str) -> bool {
    contains_any(header, &NAME_TOKENS) && !is_guardian(header)
}

fn is_group_header(header: &str) -> bool {
    contains_any(header, &GROUP_TOKENS)
}

fn is_guardian_name_header(header: &str) -> bool {
    is_guardian(header) && contains_any(header, &NAME_TOKENS)
}

fn is_phone_header(header: &str) -> bool {
    contains_any(header, &PHONE_TOKENS)
        || header
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token == "wa")
}

pub fn map_headers(header: &[String]) -> ColumnMap {
    let lowered = header
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect::<Vec<_>>();
    let find = |pred: fn(&str) -> bool| lowered.iter().position(|h| pred(h));
    ColumnMap {
        name: find(is_name_header),
        group: find(is_group_header),
        guardian_name: find(is_guardian_name_header),
        guardian_phone: find(is_phone_header),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowProblem {
    MissingName,
    MissingGroup,
    MissingPhone,
}

impl RowProblem {
    pub fn code(self) -> &'static str {
        match self {
            RowProblem::MissingName => "missing_name",
            RowProblem::MissingGroup => "missing_group",
            RowProblem::MissingPhone => "missing_phone",
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            RowProblem::MissingName => "student name is empty",
            RowProblem::MissingGroup => "halaqah is empty",
            RowProblem::MissingPhone => "guardian phone number is empty",
        }
    }
}

impl Serialize for RowProblem {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    pub line: u64,
    pub name: String,
    pub group_name: String,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub is_valid: bool,
    pub error_code: Option<RowProblem>,
    pub error_reason: Option<&'static str>,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Field presence check in the fixed order name, group, phone.
pub fn check_row(name: &str, group: &str, phone: &str) -> Option<RowProblem> {
    if name.is_empty() {
        Some(RowProblem::MissingName)
    } else if group.is_empty() {
        Some(RowProblem::MissingGroup)
    } else if phone.is_empty() {
        Some(RowProblem::MissingPhone)
    } else {
        None
    }
}

pub fn validate_rows(data: &[CsvLine], cols: &ColumnMap) -> Vec<ImportRow> {
    data.iter()
        .filter(|l| !l.is_blank())
        .map(|l| {
            let name = l.value(cols.name);
            let group_name = l.value(cols.group);
            let guardian_name = l.value(cols.guardian_name);
            let guardian_phone = l.value(cols.guardian_phone);
            let problem = check_row(&name, &group_name, &guardian_phone);
            ImportRow {
                line: l.line,
                name,
                group_name,
                guardian_name: non_empty(guardian_name),
                guardian_phone: non_empty(guardian_phone),
                is_valid: problem.is_none(),
                error_code: problem,
                error_reason: problem.map(RowProblem::reason),
            }
        })
        .collect()
}

/// Parse, map headers and validate in one pass. Structural problems come
/// back as `Err`; row problems are flagged on the rows.
pub fn read_roster(text: &str) -> Result<(ColumnMap, Vec<ImportRow>), FileError> {
    let lines = parse_delimited(text)?;
    let cols = map_headers(&lines[0].fields);
    cols.require()?;
    let rows = validate_rows(&lines[1..], &cols);
    Ok((cols, rows))
}
