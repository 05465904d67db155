use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use clap::ArgAction;
use clap::Parser;
use glob::Pattern;
use sheet_json::convert;
use sheet_json::output_file_name;
use sheet_json::render_records;
use sheet_json::Conversion;
use sheet_json::ExcelData;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "sheet-json",
    version,
    about = "Convert CSV and Excel workbooks into normalized JSON records"
)]
pub struct Cli {
    /// A .csv, .xlsx, .xlsm or .xls file
    pub input: PathBuf,

    /// Write the JSON document to this path instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the JSON document next to the input as <name>.json
    #[arg(long, default_value_t = false, conflicts_with = "output")]
    pub save: bool,

    /// Glob pattern selecting worksheets; repeatable, default is every sheet
    #[arg(short = 's', long = "sheet")]
    pub sheets: Vec<String>,

    /// Print sheet names and record counts instead of JSON
    #[arg(long, default_value_t = false)]
    pub list_sheets: bool,

    /// Raise the log level (warn, info, debug, trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

pub fn run(cli: &Cli, stdout: &mut impl Write) -> Result<()> {
    let file_name = cli
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("not a file path: {}", cli.input.display()))?;
    let bytes = fs::read(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;
    let conversion = convert(&file_name, bytes).map_err(|error| anyhow!(error.user_message()))?;

    if cli.list_sheets {
        return list_sheets(&conversion, stdout);
    }

    let json = match &conversion {
        Conversion::Table(records) => {
            if !cli.sheets.is_empty() {
                warn!(file = %file_name, "sheet patterns ignored for csv input");
            }
            render_records(records)
        }
        Conversion::Workbook(data) => {
            let selected = select_sheets(data, &cli.sheets)?;
            data.render(&selected)
        }
    }
    .map_err(|error| anyhow!(error.user_message()))?;

    match output_path(cli, &file_name) {
        Some(path) => {
            fs::write(&path, format!("{json}\n")).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = json.len(), "wrote json");
        }
        None => writeln!(stdout, "{json}")?,
    }
    Ok(())
}

/// Sheets whose name matches any pattern; every sheet without patterns.
pub fn select_sheets(data: &ExcelData, patterns: &[String]) -> Result<HashSet<String>> {
    if patterns.is_empty() {
        return Ok(data.sheet_names().map(str::to_owned).collect());
    }
    let mut selected = HashSet::new();
    for pattern in patterns {
        let compiled = Pattern::new(pattern).with_context(|| format!("invalid sheet pattern '{pattern}'"))?;
        let before = selected.len();
        let mut matched = false;
        for name in data.sheet_names().filter(|name| compiled.matches(name)) {
            matched = true;
            selected.insert(name.to_owned());
        }
        if !matched {
            warn!(pattern = %pattern, "sheet pattern matches no sheet with records");
        } else {
            info!(pattern = %pattern, added = selected.len() - before, "selected sheets");
        }
    }
    Ok(selected)
}

fn output_path(cli: &Cli, file_name: &str) -> Option<PathBuf> {
    if let Some(path) = &cli.output {
        return Some(path.clone());
    }
    cli.save.then(|| {
        let directory = cli.input.parent().unwrap_or(Path::new(""));
        directory.join(output_file_name(file_name))
    })
}

fn list_sheets(conversion: &Conversion, stdout: &mut impl Write) -> Result<()> {
    match conversion {
        Conversion::Table(records) => writeln!(stdout, "total\t{}", records.len())?,
        Conversion::Workbook(data) => {
            for sheet in &data.sheets {
                writeln!(stdout, "{}\t{}", sheet.name, sheet.records.len())?;
            }
            writeln!(stdout, "total\t{}", data.total_records)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serde_json::Value;
    use sheet_json::Record;
    use sheet_json::SheetRecords;
    use tempfile::tempdir;

    const PEOPLE: &str = "name,skills[1],skills[0],yearsExperience\nJane,Go,SQL,3.4\n";

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("sheet-json").chain(args.iter().copied()))
    }

    #[test]
    fn prints_json_to_stdout() {
        let directory = tempdir().unwrap();
        let input = directory.path().join("people.csv");
        fs::write(&input, PEOPLE).unwrap();

        let mut stdout = Vec::new();
        run(&cli(&[input.to_str().unwrap()]), &mut stdout).unwrap();
        let value: Value = serde_json::from_slice(&stdout).unwrap();
        assert_eq!(value, json!([{"name": "Jane", "yearsExperience": 3, "skills": ["SQL", "Go"]}]));
    }

    #[test]
    fn save_writes_next_to_input() {
        let directory = tempdir().unwrap();
        let input = directory.path().join("People.CSV");
        fs::write(&input, PEOPLE).unwrap();

        let mut stdout = Vec::new();
        run(&cli(&[input.to_str().unwrap(), "--save"]), &mut stdout).unwrap();
        assert!(stdout.is_empty());
        let saved = fs::read_to_string(directory.path().join("People.json")).unwrap();
        assert!(saved.starts_with("[\n  {\n    \"name\": \"Jane\""));
    }

    #[test]
    fn output_path_and_list_sheets() {
        let directory = tempdir().unwrap();
        let input = directory.path().join("people.csv");
        let output = directory.path().join("out.json");
        fs::write(&input, PEOPLE).unwrap();

        let mut stdout = Vec::new();
        run(&cli(&[input.to_str().unwrap(), "-o", output.to_str().unwrap()]), &mut stdout).unwrap();
        assert!(output.exists());

        run(&cli(&[input.to_str().unwrap(), "--list-sheets"]), &mut stdout).unwrap();
        assert_eq!(String::from_utf8(stdout).unwrap(), "total\t1\n");
    }

    #[test]
    fn failures_carry_user_message() {
        let directory = tempdir().unwrap();
        let input = directory.path().join("notes.txt");
        fs::write(&input, "hello").unwrap();
        let error = run(&cli(&[input.to_str().unwrap()]), &mut Vec::new()).unwrap_err();
        assert_eq!(error.to_string(), "Please select a CSV or Excel file (.csv, .xlsx, .xls)");

        let missing = directory.path().join("missing.csv");
        let error = run(&cli(&[missing.to_str().unwrap()]), &mut Vec::new()).unwrap_err();
        assert!(error.to_string().starts_with("failed to read"));
    }

    #[test]
    fn sheet_patterns() {
        let data = ExcelData {
            sheets: ["Q1 Sales", "Q2 Sales", "Notes"]
                .map(|name| SheetRecords { name: name.to_owned(), records: vec![Record::new()] })
                .into(),
            total_records: 3,
        };
        let selected = select_sheets(&data, &["Q? Sales".to_owned(), "Archive*".to_owned()]).unwrap();
        assert_eq!(selected, HashSet::from(["Q1 Sales".to_owned(), "Q2 Sales".to_owned()]));
        assert_eq!(select_sheets(&data, &[]).unwrap().len(), 3);
        assert!(select_sheets(&data, &["[".to_owned()]).is_err());
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(cli(&["a.csv"]).log_level(), "warn");
        assert_eq!(cli(&["a.csv", "-vv"]).log_level(), "debug");
        assert_eq!(cli(&["a.csv", "-v", "-v", "-v", "-v"]).log_level(), "trace");
        assert!(Cli::try_parse_from(["sheet-json", "a.csv", "--save", "-o", "b.json"]).is_err());
    }
}
