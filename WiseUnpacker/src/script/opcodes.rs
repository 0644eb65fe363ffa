//! Script opcodes and their payloads

use std::fmt;

use crate::compression::DeflateExpectation;

/// One instruction of the compiled script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationCode {
    InstallFile = 0x00,
    NoOp = 0x02,
    DisplayMessage = 0x03,
    UserDefinedActionStep = 0x04,
    EditIniFile = 0x05,
    DisplayBillboard = 0x06,
    ExecuteProgram = 0x07,
    EndBlock = 0x08,
    CallDllFunction = 0x09,
    EditRegistry = 0x0A,
    DeleteFile = 0x0B,
    IfWhileStatement = 0x0C,
    ElseStatement = 0x0D,
    StartUserDefinedAction = 0x0F,
    EndUserDefinedAction = 0x10,
    CreateDirectory = 0x11,
    CopyLocalFile = 0x12,
    CustomDialogSet = 0x14,
    GetSystemInformation = 0x15,
    GetTemporaryFilename = 0x16,
    PlayMultimediaFile = 0x17,
    NewEvent = 0x18,
    InstallOdbcDriver = 0x19,
    ConfigOdbcDataSource = 0x1A,
    IncludeScript = 0x1B,
    AddTextToInstallLog = 0x1C,
    RenameFileDirectory = 0x1D,
    OpenCloseInstallLog = 0x1E,
    ElseIfStatement = 0x23,
    Skip0x24 = 0x24,
    Skip0x25 = 0x25,
}

impl OperationCode {
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        let op = match byte {
            0x00 => Self::InstallFile,
            0x02 => Self::NoOp,
            0x03 => Self::DisplayMessage,
            0x04 => Self::UserDefinedActionStep,
            0x05 => Self::EditIniFile,
            0x06 => Self::DisplayBillboard,
            0x07 => Self::ExecuteProgram,
            0x08 => Self::EndBlock,
            0x09 => Self::CallDllFunction,
            0x0A => Self::EditRegistry,
            0x0B => Self::DeleteFile,
            0x0C => Self::IfWhileStatement,
            0x0D => Self::ElseStatement,
            0x0F => Self::StartUserDefinedAction,
            0x10 => Self::EndUserDefinedAction,
            0x11 => Self::CreateDirectory,
            0x12 => Self::CopyLocalFile,
            0x14 => Self::CustomDialogSet,
            0x15 => Self::GetSystemInformation,
            0x16 => Self::GetTemporaryFilename,
            0x17 => Self::PlayMultimediaFile,
            0x18 => Self::NewEvent,
            0x19 => Self::InstallOdbcDriver,
            0x1A => Self::ConfigOdbcDataSource,
            0x1B => Self::IncludeScript,
            0x1C => Self::AddTextToInstallLog,
            0x1D => Self::RenameFileDirectory,
            0x1E => Self::OpenCloseInstallLog,
            0x23 => Self::ElseIfStatement,
            0x24 => Self::Skip0x24,
            0x25 => Self::Skip0x25,
            _ => return None,
        };
        Some(op)
    }

    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} (0x{:02X})", self.as_byte())
    }
}

/// Location of a deflate record relative to the data anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeflateEntry {
    pub deflate_start: u32,
    pub deflate_end: u32,
    pub inflated_size: u32,
    pub crc32: u32,
}

impl DeflateEntry {
    /// `None` when the end lies before the start.
    #[must_use]
    pub fn input_size(&self) -> Option<u32> {
        self.deflate_end.checked_sub(self.deflate_start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deflate_start == self.deflate_end
    }

    #[must_use]
    pub fn expectation(&self) -> Option<DeflateExpectation> {
        let input = self.input_size()?;
        Some(DeflateExpectation::from_sizes(input, self.inflated_size).with_crc32(self.crc32))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallFile {
    pub flags: u16,
    pub entry: DeflateEntry,
    pub date: u16,
    pub time: u16,
    pub operand_7: [u8; 20],
    pub destination_pathname: String,
    pub descriptions: Vec<String>,
    pub source_pathname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedMessage {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub flags: u8,
    pub messages: Vec<LocalizedMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDefinedActionStep {
    pub flags: u8,
    pub script_line: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditIniFile {
    pub pathname: String,
    pub section: String,
    pub values: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayBillboard {
    pub flags: u16,
    pub operand_2: u16,
    pub operand_3: u16,
    pub entries: Vec<DeflateEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteProgram {
    pub flags: u8,
    pub pathname: String,
    pub command_line: String,
    pub default_directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndBlock {
    pub operand_1: u8,
}

/// Arguments of a DLL call in one of the two encodings compilers used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DllArguments {
    /// One argument list per language.
    PerLanguage(Vec<Vec<String>>),
    /// A single argument string shared by every language.
    Single(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDllFunction {
    pub flags: u8,
    pub dll_path: String,
    pub function_name: String,
    pub operand_4: String,
    pub return_variable: String,
    pub arguments: DllArguments,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRegistry {
    pub flags: u8,
    /// Value type byte, present in the DLL-routed layout only.
    pub data_type: Option<u8>,
    pub key: String,
    pub new_value: String,
    pub value_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFile {
    pub flags: u8,
    pub pathname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional {
    pub flags: u8,
    pub variable: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDirectory {
    pub pathname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyLocalFile {
    pub flags: u16,
    pub padding: [u8; 40],
    pub destination: String,
    pub descriptions: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomDialogSet {
    pub entry: DeflateEntry,
    pub operand_5: u16,
    pub display_variable: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSystemInformation {
    pub flags: u8,
    pub variable: String,
    pub pathname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetTemporaryFilename {
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayMultimediaFile {
    pub flags: u8,
    pub x: u16,
    pub y: u16,
    pub pathname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOdbcDriver {
    pub flags: u8,
    pub driver_name: String,
    pub ini_pathname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOdbcDataSource {
    pub flags: u8,
    pub file_format: String,
    pub connection_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTextToInstallLog {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameFileDirectory {
    pub old_pathname: String,
    pub new_filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCloseInstallLog {
    pub flags: u8,
    pub log_pathname: String,
}

/// Decoded payload of a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPayload {
    None,
    InstallFile(InstallFile),
    DisplayMessage(DisplayMessage),
    UserDefinedActionStep(UserDefinedActionStep),
    EditIniFile(EditIniFile),
    DisplayBillboard(DisplayBillboard),
    ExecuteProgram(ExecuteProgram),
    EndBlock(EndBlock),
    CallDllFunction(CallDllFunction),
    EditRegistry(EditRegistry),
    DeleteFile(DeleteFile),
    IfWhileStatement(Conditional),
    ElseIfStatement(Conditional),
    CreateDirectory(CreateDirectory),
    CopyLocalFile(CopyLocalFile),
    CustomDialogSet(CustomDialogSet),
    GetSystemInformation(GetSystemInformation),
    GetTemporaryFilename(GetTemporaryFilename),
    PlayMultimediaFile(PlayMultimediaFile),
    InstallOdbcDriver(InstallOdbcDriver),
    ConfigOdbcDataSource(ConfigOdbcDataSource),
    AddTextToInstallLog(AddTextToInstallLog),
    RenameFileDirectory(RenameFileDirectory),
    OpenCloseInstallLog(OpenCloseInstallLog),
}

/// An opcode together with its decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineState {
    pub opcode: OperationCode,
    pub data: ActionPayload,
}

impl MachineState {
    /// True when the payload variant is the one `opcode` decodes to.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        use ActionPayload as P;
        use OperationCode as Op;
        matches!(
            (self.opcode, &self.data),
            (Op::InstallFile, P::InstallFile(_))
                | (Op::DisplayMessage, P::DisplayMessage(_))
                | (Op::UserDefinedActionStep, P::UserDefinedActionStep(_))
                | (Op::EditIniFile, P::EditIniFile(_))
                | (Op::DisplayBillboard, P::DisplayBillboard(_))
                | (Op::ExecuteProgram, P::ExecuteProgram(_))
                | (Op::EndBlock, P::EndBlock(_))
                | (Op::CallDllFunction, P::CallDllFunction(_))
                | (Op::EditRegistry, P::EditRegistry(_))
                | (Op::DeleteFile, P::DeleteFile(_))
                | (Op::IfWhileStatement, P::IfWhileStatement(_))
                | (Op::ElseIfStatement, P::ElseIfStatement(_))
                | (Op::CreateDirectory, P::CreateDirectory(_))
                | (Op::CopyLocalFile, P::CopyLocalFile(_))
                | (Op::CustomDialogSet, P::CustomDialogSet(_))
                | (Op::GetSystemInformation, P::GetSystemInformation(_))
                | (Op::GetTemporaryFilename, P::GetTemporaryFilename(_))
                | (Op::PlayMultimediaFile, P::PlayMultimediaFile(_))
                | (Op::InstallOdbcDriver, P::InstallOdbcDriver(_))
                | (Op::ConfigOdbcDataSource, P::ConfigOdbcDataSource(_))
                | (Op::AddTextToInstallLog, P::AddTextToInstallLog(_))
                | (Op::RenameFileDirectory, P::RenameFileDirectory(_))
                | (Op::OpenCloseInstallLog, P::OpenCloseInstallLog(_))
                | (
                    Op::NoOp
                        | Op::ElseStatement
                        | Op::StartUserDefinedAction
                        | Op::EndUserDefinedAction
                        | Op::NewEvent
                        | Op::IncludeScript
                        | Op::Skip0x24
                        | Op::Skip0x25,
                    P::None
                )
        )
    }
}
