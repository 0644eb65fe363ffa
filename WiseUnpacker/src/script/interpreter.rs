//! Script replay
//!
//! Replays the decoded states against the output directory. Only the
//! actions that materialize files or directories have an effect; everything
//! that would touch the host system (registry, ODBC, program execution) is
//! logged and skipped.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::environment::Environment;
use super::opcodes::{ActionPayload, DeflateEntry, MachineState};
use crate::compression::ExtractionStatus;
use crate::error::{Error, Result};
use crate::overlay::record::{RecordReader, read_record_to_vec};
use crate::utils::path::{sanitize_relative, strip_placeholders, strip_wildcard};

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub states_executed: usize,
}

/// Executes a state machine against one output directory.
#[derive(Debug)]
pub struct Interpreter {
    output_dir: PathBuf,
    data_start: u64,
    reader: RecordReader,
    environment: Environment,
}

impl Interpreter {
    /// `data_start` is the anchor script offsets are relative to.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        data_start: u64,
        reader: RecordReader,
        environment: Environment,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            data_start,
            reader,
            environment,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn into_environment(self) -> Environment {
        self.environment
    }

    /// Run every state in order.
    ///
    /// Failing to create a directory or copy a local file is logged and the
    /// run continues. A record that fails to extract, or a state whose
    /// payload does not belong to its opcode, ends the run.
    ///
    /// # Errors
    /// Returns [`Error::PayloadMismatch`], [`Error::ExtractionFailed`] or
    /// [`Error::Io`].
    pub fn process_state_machine<S, F>(
        &mut self,
        source: &mut S,
        states: &[MachineState],
        mut on_state: F,
    ) -> Result<RunSummary>
    where
        S: Read + Seek + ?Sized,
        F: FnMut(usize, usize, &MachineState),
    {
        let mut summary = RunSummary::default();
        for (index, state) in states.iter().enumerate() {
            if !state.is_consistent() {
                return Err(Error::PayloadMismatch {
                    index,
                    opcode: state.opcode.to_string(),
                });
            }
            on_state(index, states.len(), state);
            self.execute(source, index, state, &mut summary)?;
            summary.states_executed += 1;
        }
        Ok(summary)
    }

    fn execute<S: Read + Seek + ?Sized>(
        &mut self,
        source: &mut S,
        index: usize,
        state: &MachineState,
        summary: &mut RunSummary,
    ) -> Result<()> {
        match &state.data {
            ActionPayload::InstallFile(install) => {
                let mut relative =
                    sanitize_relative(&strip_placeholders(&install.destination_pathname));
                if relative.as_os_str().is_empty() {
                    relative = PathBuf::from(format!("FILE{index:04X}"));
                }
                let name = relative.to_string_lossy().into_owned();
                let path = self.extract_entry(source, &install.entry, &name, &relative)?;
                summary.files.push(path);
            }
            ActionPayload::CustomDialogSet(dialog) => {
                let name = format!("CustomDialogSet_{index:04X}.bin");
                let path = self.extract_entry(source, &dialog.entry, &name, Path::new(&name))?;
                summary.files.push(path);
            }
            ActionPayload::DisplayBillboard(billboard) => {
                for (language, entry) in billboard.entries.iter().enumerate() {
                    if entry.is_empty() {
                        continue;
                    }
                    let name = format!("CustomBillboardSet_{index:04X}-{language:02}.bin");
                    let path = self.extract_entry(source, entry, &name, Path::new(&name))?;
                    summary.files.push(path);
                }
            }
            ActionPayload::CreateDirectory(create) => {
                let resolved = self.environment.substitute(&create.pathname);
                let path = self.output_dir.join(sanitize_relative(strip_wildcard(&resolved)));
                match fs::create_dir_all(&path) {
                    Ok(()) => {
                        tracing::debug!("Created directory {}", path.display());
                        summary.directories.push(path);
                    }
                    Err(e) => tracing::warn!("Failed to create {}: {e}", path.display()),
                }
            }
            ActionPayload::CopyLocalFile(copy) => {
                let source_path = self.resolve_local(&self.environment.substitute(&copy.source));
                let destination = self
                    .output_dir
                    .join(sanitize_relative(&self.environment.substitute(&copy.destination)));
                match source_path {
                    Some(from) => match copy_file(&from, &destination) {
                        Ok(()) => summary.files.push(destination),
                        Err(e) => tracing::warn!("Failed to copy {}: {e}", from.display()),
                    },
                    None => tracing::warn!("Local file {} does not exist; skipping", copy.source),
                }
            }
            ActionPayload::EditIniFile(ini) => {
                let path = self
                    .output_dir
                    .join(sanitize_relative(&strip_placeholders(&ini.pathname)));
                append_ini_section(&path, &ini.section, &ini.values)?;
                tracing::debug!("Appended [{}] to {}", ini.section, path.display());
            }
            ActionPayload::GetTemporaryFilename(temp) => {
                let token = format!("{{{}}}", Uuid::new_v4()).to_uppercase();
                tracing::debug!("{} = {token}", temp.variable);
                self.environment.set(temp.variable.clone(), token);
            }
            ActionPayload::DeleteFile(delete) => {
                tracing::info!("Delete file: {}", delete.pathname);
            }
            ActionPayload::AddTextToInstallLog(log) => {
                tracing::info!("Install log: {}", log.text);
            }
            ActionPayload::EditRegistry(edit) => {
                tracing::info!(
                    "Registry edit not applied: {} {} = {}",
                    edit.key,
                    edit.value_name,
                    edit.new_value
                );
            }
            ActionPayload::ExecuteProgram(exec) => {
                tracing::info!("Program not executed: {} {}", exec.pathname, exec.command_line);
            }
            ActionPayload::CallDllFunction(call) => {
                tracing::debug!("DLL call not made: {}!{}", call.dll_path, call.function_name);
            }
            ActionPayload::RenameFileDirectory(rename) => {
                tracing::info!("Rename {} to {}", rename.old_pathname, rename.new_filename);
            }
            _ => tracing::trace!("{}: no effect", state.opcode),
        }
        Ok(())
    }

    /// Extract the record an entry points to and write it under the output
    /// directory.
    fn extract_entry<S: Read + Seek + ?Sized>(
        &self,
        source: &mut S,
        entry: &DeflateEntry,
        name: &str,
        relative: &Path,
    ) -> Result<PathBuf> {
        let expectation = entry.expectation().ok_or_else(|| Error::ExtractionFailed {
            name: name.to_string(),
            status: ExtractionStatus::Invalid,
            source: None,
        })?;
        let start = self.data_start + u64::from(entry.deflate_start);

        let (outcome, data) = read_record_to_vec(&self.reader, source, start, &expectation)?;
        let Some(data) = data else {
            return Err(outcome.into_error(name));
        };

        let path = self.output_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &data)?;
        tracing::info!("Installed {name} ({} bytes)", data.len());
        Ok(path)
    }

    /// Local sources are only ever read from inside the output directory.
    /// Drive letters, roots and `..` in the script's path are dropped.
    fn resolve_local(&self, path: &str) -> Option<PathBuf> {
        let extracted = self.output_dir.join(sanitize_relative(path));
        extracted.is_file().then_some(extracted)
    }
}

fn copy_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to).map(|_| ())
}

fn append_ini_section(path: &Path, section: &str, values: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "[{section}]")?;
    file.write_all(values.as_bytes())?;
    if !values.ends_with('\n') {
        writeln!(file)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use tempfile::TempDir;

    use super::*;
    use crate::compression::crc;
    use crate::script::opcodes::{
        CopyLocalFile, CreateDirectory, CustomDialogSet, DisplayBillboard, EditIniFile,
        GetTemporaryFilename, InstallFile, OperationCode,
    };

    fn raw_record(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        let mut out = encoder.finish().unwrap();
        out.extend_from_slice(&crc::checksum(data).to_le_bytes());
        out
    }

    fn interpreter(dir: &Path, data_start: u64) -> Interpreter {
        Interpreter::new(
            dir,
            data_start,
            RecordReader::raw(),
            Environment::with_source_directory("/src"),
        )
    }

    fn run(
        interp: &mut Interpreter,
        source: &mut Cursor<Vec<u8>>,
        states: &[MachineState],
    ) -> Result<RunSummary> {
        interp.process_state_machine(source, states, |_, _, _| {})
    }

    fn install_state(entry: DeflateEntry, destination: &str) -> MachineState {
        MachineState {
            opcode: OperationCode::InstallFile,
            data: ActionPayload::InstallFile(InstallFile {
                flags: 0,
                entry,
                date: 0,
                time: 0,
                operand_7: [0; 20],
                destination_pathname: destination.into(),
                descriptions: vec![String::new()],
                source_pathname: String::new(),
            }),
        }
    }

    fn entry_for(offset: u32, record: &[u8], data: &[u8]) -> DeflateEntry {
        DeflateEntry {
            deflate_start: offset,
            deflate_end: offset + record.len() as u32,
            inflated_size: data.len() as u32,
            crc32: crc::checksum(data),
        }
    }

    #[test]
    fn test_create_directory_with_wildcard() {
        let dir = TempDir::new().unwrap();
        let mut interp = interpreter(dir.path(), 0);
        let states = [MachineState {
            opcode: OperationCode::CreateDirectory,
            data: ActionPayload::CreateDirectory(CreateDirectory {
                pathname: "%INST%\\sub\\*.*".into(),
            }),
        }];
        let summary = run(&mut interp, &mut Cursor::new(Vec::new()), &states).unwrap();

        let expected = dir.path().join("src").join("sub");
        assert!(expected.is_dir());
        assert_eq!(summary.directories, vec![expected]);
    }

    #[test]
    fn test_install_files_relative_to_anchor() {
        let readme = b"Thank you for installing.\r\n".repeat(10);
        let dialog = vec![0x42u8; 300];
        let readme_record = raw_record(&readme);
        let dialog_record = raw_record(&dialog);

        let anchor = 16u64;
        let mut bytes = vec![0xAA; anchor as usize];
        bytes.extend(&readme_record);
        bytes.extend(&dialog_record);

        let states = [
            install_state(entry_for(0, &readme_record, &readme), "%MAINDIR%\\docs\\readme.txt"),
            MachineState {
                opcode: OperationCode::CustomDialogSet,
                data: ActionPayload::CustomDialogSet(CustomDialogSet {
                    entry: entry_for(readme_record.len() as u32, &dialog_record, &dialog),
                    operand_5: 0,
                    display_variable: "DISPLAY".into(),
                    name: "Welcome".into(),
                }),
            },
        ];

        let dir = TempDir::new().unwrap();
        let mut interp = interpreter(dir.path(), anchor);
        let summary = run(&mut interp, &mut Cursor::new(bytes), &states).unwrap();

        let readme_path = dir.path().join("MAINDIR").join("docs").join("readme.txt");
        assert_eq!(fs::read(&readme_path).unwrap(), readme);
        assert_eq!(
            fs::read(dir.path().join("CustomDialogSet_0001.bin")).unwrap(),
            dialog
        );
        assert_eq!(summary.files.len(), 2);
        assert_eq!(summary.states_executed, 2);
    }

    #[test]
    fn test_bad_record_aborts_run() {
        let data = b"payload".repeat(20);
        let record = raw_record(&data);
        let mut entry = entry_for(0, &record, &data);
        entry.crc32 ^= 1;

        let dir = TempDir::new().unwrap();
        let mut interp = interpreter(dir.path(), 0);
        let result = run(&mut interp, &mut Cursor::new(record), &[install_state(entry, "a.txt")]);
        match result {
            Err(Error::ExtractionFailed {
                status: ExtractionStatus::Fail,
                source: Some(cause),
                ..
            }) => match *cause {
                Error::CrcMismatch { expected, actual } => {
                    assert_eq!(expected, crc::checksum(&data) ^ 1);
                    assert_eq!(actual, crc::checksum(&data));
                }
                other => panic!("expected a CRC mismatch, got {other:?}"),
            },
            other => panic!("expected ExtractionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_payload_mismatch_aborts_run() {
        let dir = TempDir::new().unwrap();
        let mut interp = interpreter(dir.path(), 0);
        let states = [
            MachineState {
                opcode: OperationCode::NoOp,
                data: ActionPayload::None,
            },
            MachineState {
                opcode: OperationCode::CreateDirectory,
                data: ActionPayload::None,
            },
        ];
        let result = run(&mut interp, &mut Cursor::new(Vec::new()), &states);
        assert!(matches!(result, Err(Error::PayloadMismatch { index: 1, .. })));
    }

    #[test]
    fn test_temporary_filename_and_ini() {
        let dir = TempDir::new().unwrap();
        let mut interp = interpreter(dir.path(), 0);
        let states = [
            MachineState {
                opcode: OperationCode::GetTemporaryFilename,
                data: ActionPayload::GetTemporaryFilename(GetTemporaryFilename {
                    variable: "TEMPFILE".into(),
                }),
            },
            MachineState {
                opcode: OperationCode::EditIniFile,
                data: ActionPayload::EditIniFile(EditIniFile {
                    pathname: "%WIN%\\app.ini".into(),
                    section: "Settings".into(),
                    values: "Path=%MAINDIR%".into(),
                }),
            },
        ];
        run(&mut interp, &mut Cursor::new(Vec::new()), &states).unwrap();

        let token = interp.environment().get("TEMPFILE").unwrap();
        assert_eq!(token.len(), 38);
        assert!(token.starts_with('{') && token.ends_with('}'));

        let ini = fs::read_to_string(dir.path().join("WIN").join("app.ini")).unwrap();
        assert_eq!(ini, "[Settings]\nPath=%MAINDIR%\n");
    }

    fn edit_ini(pathname: &str, section: &str, values: &str) -> MachineState {
        MachineState {
            opcode: OperationCode::EditIniFile,
            data: ActionPayload::EditIniFile(EditIniFile {
                pathname: pathname.into(),
                section: section.into(),
                values: values.into(),
            }),
        }
    }

    fn copy_local(source: &str, destination: &str) -> MachineState {
        MachineState {
            opcode: OperationCode::CopyLocalFile,
            data: ActionPayload::CopyLocalFile(CopyLocalFile {
                flags: 0,
                padding: [0; 40],
                destination: destination.into(),
                descriptions: vec![String::new()],
                source: source.into(),
            }),
        }
    }

    #[test]
    fn test_ini_edit_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let ini_path = dir.path().join("WIN").join("app.ini");
        fs::create_dir_all(ini_path.parent().unwrap()).unwrap();
        fs::write(&ini_path, "[Existing]\nKey=1\n").unwrap();

        let states = [
            edit_ini("%WIN%\\app.ini", "Settings", "Path=C:\\App\n"),
            edit_ini("%WIN%\\app.ini", "More", "Flag=yes"),
        ];
        let mut interp = interpreter(dir.path(), 0);
        run(&mut interp, &mut Cursor::new(Vec::new()), &states).unwrap();

        assert_eq!(
            fs::read_to_string(&ini_path).unwrap(),
            "[Existing]\nKey=1\n[Settings]\nPath=C:\\App\n[More]\nFlag=yes\n"
        );
    }

    #[test]
    fn test_billboards_are_named_by_state_and_language() {
        let first = vec![0x10u8; 120];
        let third = b"billboard bitmap".repeat(12);
        let first_record = raw_record(&first);
        let third_record = raw_record(&third);
        let mut bytes = first_record.clone();
        bytes.extend(&third_record);

        let unused = DeflateEntry {
            deflate_start: 0,
            deflate_end: 0,
            inflated_size: 0,
            crc32: 0,
        };
        let states = [
            MachineState {
                opcode: OperationCode::NoOp,
                data: ActionPayload::None,
            },
            MachineState {
                opcode: OperationCode::DisplayBillboard,
                data: ActionPayload::DisplayBillboard(DisplayBillboard {
                    flags: 0,
                    operand_2: 0,
                    operand_3: 0,
                    entries: vec![
                        entry_for(0, &first_record, &first),
                        unused,
                        entry_for(first_record.len() as u32, &third_record, &third),
                    ],
                }),
            },
        ];

        let dir = TempDir::new().unwrap();
        let mut interp = interpreter(dir.path(), 0);
        let summary = run(&mut interp, &mut Cursor::new(bytes), &states).unwrap();

        let expected = vec![
            dir.path().join("CustomBillboardSet_0001-00.bin"),
            dir.path().join("CustomBillboardSet_0001-02.bin"),
        ];
        assert_eq!(summary.files, expected);
        assert_eq!(fs::read(&expected[0]).unwrap(), first);
        assert_eq!(fs::read(&expected[1]).unwrap(), third);
        assert!(!dir.path().join("CustomBillboardSet_0001-01.bin").exists());
    }

    #[test]
    fn test_replay_is_deterministic() {
        let readme = b"Read me first.\r\n".repeat(30);
        let record = raw_record(&readme);
        let states = [
            MachineState {
                opcode: OperationCode::CreateDirectory,
                data: ActionPayload::CreateDirectory(CreateDirectory {
                    pathname: "%INST%\\bin\\*.*".into(),
                }),
            },
            install_state(entry_for(0, &record, &readme), "%MAINDIR%\\readme.txt"),
            copy_local("MAINDIR\\readme.txt", "%INST%\\bin\\readme.bak"),
            edit_ini("%WIN%\\app.ini", "Paths", "Home=%INST%"),
        ];

        let replay = || {
            let dir = TempDir::new().unwrap();
            let mut interp = interpreter(dir.path(), 0);
            let summary = run(&mut interp, &mut Cursor::new(record.clone()), &states).unwrap();
            let relative = |paths: &[PathBuf]| -> Vec<PathBuf> {
                paths
                    .iter()
                    .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
                    .collect()
            };
            let files = relative(&summary.files);
            let contents: Vec<Vec<u8>> =
                summary.files.iter().map(|p| fs::read(p).unwrap()).collect();
            let ini = fs::read_to_string(dir.path().join("WIN").join("app.ini")).unwrap();
            (
                files,
                relative(&summary.directories),
                contents,
                ini,
                interp.into_environment(),
            )
        };

        let first = replay();
        let second = replay();
        assert_eq!(first, second);
        assert_eq!(
            first.0,
            vec![
                PathBuf::from("MAINDIR").join("readme.txt"),
                PathBuf::from("src").join("bin").join("readme.bak"),
            ]
        );
        assert_eq!(first.2[1], readme);
    }

    #[test]
    fn test_copy_local_file_never_reads_host_paths() {
        let host = TempDir::new().unwrap();
        let secret = host.path().join("secret.txt");
        fs::write(&secret, b"host only").unwrap();

        let dir = TempDir::new().unwrap();
        let states = [copy_local(&secret.to_string_lossy(), "out\\stolen.txt")];
        let mut interp = interpreter(dir.path(), 0);
        let summary = run(&mut interp, &mut Cursor::new(Vec::new()), &states).unwrap();

        assert!(summary.files.is_empty());
        assert!(!dir.path().join("out").join("stolen.txt").exists());
    }

    #[test]
    fn test_copy_local_file_skips_missing_source() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("present.txt"), b"here").unwrap();

        let states = [
            copy_local("%MISSING%\\gone.txt", "out\\gone.txt"),
            copy_local("present.txt", "out\\copy.txt"),
        ];
        let mut interp = interpreter(dir.path(), 0);
        let summary = run(&mut interp, &mut Cursor::new(Vec::new()), &states).unwrap();

        assert_eq!(summary.files, vec![dir.path().join("out").join("copy.txt")]);
        assert!(!dir.path().join("out").join("gone.txt").exists());
    }
}
