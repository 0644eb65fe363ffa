//! State decoding
//!
//! Two payload layouts are not self-describing. `EditRegistry` gained a data
//! type byte in the DLL-routed builds; the first registry edit decides which
//! layout the whole script uses. `CallDllFunction` comes in a long form with
//! per-language argument lists and a short form with a single argument; the
//! caller parses once assuming the long form and retries with the short form
//! if that fails.

use super::cursor::ScriptCursor;
use super::opcodes::{
    ActionPayload, AddTextToInstallLog, CallDllFunction, Conditional, ConfigOdbcDataSource,
    CopyLocalFile, CreateDirectory, CustomDialogSet, DeflateEntry, DeleteFile, DisplayBillboard,
    DisplayMessage, DllArguments, EditIniFile, EditRegistry, EndBlock, ExecuteProgram,
    GetSystemInformation, GetTemporaryFilename, InstallFile, InstallOdbcDriver, LocalizedMessage,
    MachineState, OpenCloseInstallLog, OperationCode, PlayMultimediaFile, RenameFileDirectory,
    UserDefinedActionStep,
};
use crate::error::{Error, Result};

/// Which `CallDllFunction` encoding to assume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DllCallForm {
    PerLanguage,
    Single,
}

/// Decisions that carry from one state to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserState {
    /// Settled by the first `EditRegistry`; `Some(true)` = DLL-routed layout.
    pub registry_dll: Option<bool>,
    pub dll_call_form: DllCallForm,
}

impl ParserState {
    #[must_use]
    pub fn new(dll_call_form: DllCallForm) -> Self {
        Self {
            registry_dll: None,
            dll_call_form,
        }
    }
}

/// Decode every state until the data runs out.
///
/// # Errors
/// Returns [`Error::UnknownOpcode`] or [`Error::ScriptTruncated`] on
/// malformed input.
pub fn parse_states(
    cursor: &mut ScriptCursor<'_>,
    languages: usize,
    mut state: ParserState,
) -> Result<Vec<MachineState>> {
    let mut states = Vec::new();
    while !cursor.is_at_end() {
        let (machine_state, next) = parse_state(cursor, languages, state)?;
        states.push(machine_state);
        state = next;
    }
    Ok(states)
}

/// Decode one state, returning the parser state for the next one.
///
/// # Errors
/// Returns [`Error::UnknownOpcode`] or [`Error::ScriptTruncated`] on
/// malformed input.
pub fn parse_state(
    cursor: &mut ScriptCursor<'_>,
    languages: usize,
    state: ParserState,
) -> Result<(MachineState, ParserState)> {
    let offset = cursor.position();
    let byte = cursor.read_u8()?;
    let opcode =
        OperationCode::from_byte(byte).ok_or(Error::UnknownOpcode { opcode: byte, offset })?;

    let mut next = state;
    let data = match opcode {
        OperationCode::InstallFile => {
            ActionPayload::InstallFile(read_install_file(cursor, languages)?)
        }
        OperationCode::DisplayMessage => ActionPayload::DisplayMessage(DisplayMessage {
            flags: cursor.read_u8()?,
            messages: (0..languages)
                .map(|_| {
                    Ok(LocalizedMessage {
                        title: cursor.read_string()?,
                        text: cursor.read_string()?,
                    })
                })
                .collect::<Result<_>>()?,
        }),
        OperationCode::UserDefinedActionStep => {
            ActionPayload::UserDefinedActionStep(UserDefinedActionStep {
                flags: cursor.read_u8()?,
                script_line: cursor.read_string()?,
            })
        }
        OperationCode::EditIniFile => ActionPayload::EditIniFile(EditIniFile {
            pathname: cursor.read_string()?,
            section: cursor.read_string()?,
            values: cursor.read_string()?,
        }),
        OperationCode::DisplayBillboard => ActionPayload::DisplayBillboard(DisplayBillboard {
            flags: cursor.read_u16()?,
            operand_2: cursor.read_u16()?,
            operand_3: cursor.read_u16()?,
            entries: (0..languages)
                .map(|_| read_deflate_entry(cursor))
                .collect::<Result<_>>()?,
        }),
        OperationCode::ExecuteProgram => ActionPayload::ExecuteProgram(ExecuteProgram {
            flags: cursor.read_u8()?,
            pathname: cursor.read_string()?,
            command_line: cursor.read_string()?,
            default_directory: cursor.read_string()?,
        }),
        OperationCode::EndBlock => ActionPayload::EndBlock(EndBlock {
            operand_1: cursor.read_u8()?,
        }),
        OperationCode::CallDllFunction => {
            ActionPayload::CallDllFunction(read_dll_call(cursor, languages, state.dll_call_form)?)
        }
        OperationCode::EditRegistry => {
            let flags = cursor.read_u8()?;
            let dll = *next
                .registry_dll
                .get_or_insert_with(|| looks_like_dll_registry(cursor.remaining()));
            ActionPayload::EditRegistry(EditRegistry {
                flags,
                data_type: if dll { Some(cursor.read_u8()?) } else { None },
                key: cursor.read_string()?,
                new_value: cursor.read_string()?,
                value_name: cursor.read_string()?,
            })
        }
        OperationCode::DeleteFile => ActionPayload::DeleteFile(DeleteFile {
            flags: cursor.read_u8()?,
            pathname: cursor.read_string()?,
        }),
        OperationCode::IfWhileStatement => {
            ActionPayload::IfWhileStatement(read_conditional(cursor)?)
        }
        OperationCode::ElseIfStatement => ActionPayload::ElseIfStatement(read_conditional(cursor)?),
        OperationCode::CreateDirectory => ActionPayload::CreateDirectory(CreateDirectory {
            pathname: cursor.read_string()?,
        }),
        OperationCode::CopyLocalFile => ActionPayload::CopyLocalFile(CopyLocalFile {
            flags: cursor.read_u16()?,
            padding: cursor.read_bytes::<40>()?,
            destination: cursor.read_string()?,
            descriptions: cursor.read_strings(languages)?,
            source: cursor.read_string()?,
        }),
        OperationCode::CustomDialogSet => ActionPayload::CustomDialogSet(CustomDialogSet {
            entry: read_deflate_entry(cursor)?,
            operand_5: cursor.read_u16()?,
            display_variable: cursor.read_string()?,
            name: cursor.read_string()?,
        }),
        OperationCode::GetSystemInformation => {
            ActionPayload::GetSystemInformation(GetSystemInformation {
                flags: cursor.read_u8()?,
                variable: cursor.read_string()?,
                pathname: cursor.read_string()?,
            })
        }
        OperationCode::GetTemporaryFilename => {
            ActionPayload::GetTemporaryFilename(GetTemporaryFilename {
                variable: cursor.read_string()?,
            })
        }
        OperationCode::PlayMultimediaFile => ActionPayload::PlayMultimediaFile(PlayMultimediaFile {
            flags: cursor.read_u8()?,
            x: cursor.read_u16()?,
            y: cursor.read_u16()?,
            pathname: cursor.read_string()?,
        }),
        OperationCode::InstallOdbcDriver => ActionPayload::InstallOdbcDriver(InstallOdbcDriver {
            flags: cursor.read_u8()?,
            driver_name: cursor.read_string()?,
            ini_pathname: cursor.read_string()?,
        }),
        OperationCode::ConfigOdbcDataSource => {
            ActionPayload::ConfigOdbcDataSource(ConfigOdbcDataSource {
                flags: cursor.read_u8()?,
                file_format: cursor.read_string()?,
                connection_string: cursor.read_string()?,
            })
        }
        OperationCode::AddTextToInstallLog => {
            ActionPayload::AddTextToInstallLog(AddTextToInstallLog {
                text: cursor.read_string()?,
            })
        }
        OperationCode::RenameFileDirectory => {
            ActionPayload::RenameFileDirectory(RenameFileDirectory {
                old_pathname: cursor.read_string()?,
                new_filename: cursor.read_string()?,
            })
        }
        OperationCode::OpenCloseInstallLog => {
            ActionPayload::OpenCloseInstallLog(OpenCloseInstallLog {
                flags: cursor.read_u8()?,
                log_pathname: cursor.read_string()?,
            })
        }
        OperationCode::NoOp
        | OperationCode::ElseStatement
        | OperationCode::StartUserDefinedAction
        | OperationCode::EndUserDefinedAction
        | OperationCode::NewEvent
        | OperationCode::IncludeScript
        | OperationCode::Skip0x24
        | OperationCode::Skip0x25 => ActionPayload::None,
    };

    Ok((MachineState { opcode, data }, next))
}

fn read_install_file(cursor: &mut ScriptCursor<'_>, languages: usize) -> Result<InstallFile> {
    let flags = cursor.read_u16()?;
    let deflate_start = cursor.read_u32()?;
    let deflate_end = cursor.read_u32()?;
    let date = cursor.read_u16()?;
    let time = cursor.read_u16()?;
    let inflated_size = cursor.read_u32()?;
    let operand_7 = cursor.read_bytes::<20>()?;
    let crc32 = cursor.read_u32()?;
    Ok(InstallFile {
        flags,
        entry: DeflateEntry {
            deflate_start,
            deflate_end,
            inflated_size,
            crc32,
        },
        date,
        time,
        operand_7,
        destination_pathname: cursor.read_string()?,
        descriptions: cursor.read_strings(languages)?,
        source_pathname: cursor.read_string()?,
    })
}

fn read_deflate_entry(cursor: &mut ScriptCursor<'_>) -> Result<DeflateEntry> {
    Ok(DeflateEntry {
        deflate_start: cursor.read_u32()?,
        deflate_end: cursor.read_u32()?,
        inflated_size: cursor.read_u32()?,
        crc32: cursor.read_u32()?,
    })
}

fn read_conditional(cursor: &mut ScriptCursor<'_>) -> Result<Conditional> {
    Ok(Conditional {
        flags: cursor.read_u8()?,
        variable: cursor.read_string()?,
        value: cursor.read_string()?,
    })
}

fn read_dll_call(
    cursor: &mut ScriptCursor<'_>,
    languages: usize,
    form: DllCallForm,
) -> Result<CallDllFunction> {
    let flags = cursor.read_u8()?;
    let dll_path = cursor.read_string()?;
    let function_name = cursor.read_string()?;
    let operand_4 = cursor.read_string()?;
    let return_variable = cursor.read_string()?;
    let arguments = match form {
        DllCallForm::PerLanguage => DllArguments::PerLanguage(
            (0..languages)
                .map(|_| {
                    let count = cursor.read_u8()?;
                    cursor.read_strings(usize::from(count))
                })
                .collect::<Result<_>>()?,
        ),
        DllCallForm::Single => DllArguments::Single(cursor.read_string()?),
    };
    Ok(CallDllFunction {
        flags,
        dll_path,
        function_name,
        operand_4,
        return_variable,
        arguments,
    })
}

/// The DLL-routed registry layout puts a small data type byte before the
/// key string.
fn looks_like_dll_registry(rest: &[u8]) -> bool {
    matches!(rest, [data_type, next, ..] if *data_type <= 0x04 && (0x20..0x7F).contains(next))
}
