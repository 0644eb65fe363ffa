//! Compiled installer scripts
//!
//! `WiseScript.bin` holds a header followed by a flat list of states, each an
//! opcode byte and a payload. Parsing produces a [`WiseScript`]; replaying it
//! with an [`Interpreter`] materializes the files the installer would have
//! written.

pub mod cursor;
pub mod environment;
pub mod header;
pub mod interpreter;
pub mod opcodes;
pub mod parser;

pub use cursor::ScriptCursor;
pub use environment::Environment;
pub use header::{HeaderLayout, ScriptHeader};
pub use interpreter::{Interpreter, RunSummary};
pub use opcodes::{ActionPayload, DeflateEntry, MachineState, OperationCode};
pub use parser::{DllCallForm, ParserState};

use crate::error::{Error, Result};

/// A parsed script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiseScript {
    pub header: ScriptHeader,
    pub states: Vec<MachineState>,
    /// The `CallDllFunction` encoding that parsed successfully.
    pub dll_call_form: DllCallForm,
}

impl WiseScript {
    /// Parse a decoded `WiseScript.bin`.
    ///
    /// The state list is parsed assuming per-language DLL call arguments.
    /// If that fails anywhere, the whole list is parsed again with single
    /// argument strings.
    ///
    /// # Errors
    /// Returns [`Error::InvalidScriptHeader`] if the header cannot be read,
    /// or [`Error::ScriptUnparseable`] carrying both failures if neither
    /// parse succeeds.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ScriptCursor::new(data);
        let header = ScriptHeader::parse(&mut cursor)?;
        let body = cursor.position();
        let languages = header.languages();

        let attempt = |form| {
            let mut cursor = cursor.clone();
            cursor.set_position(body);
            parser::parse_states(&mut cursor, languages, ParserState::new(form))
        };

        let first = match attempt(DllCallForm::PerLanguage) {
            Ok(states) => {
                return Ok(Self {
                    header,
                    states,
                    dll_call_form: DllCallForm::PerLanguage,
                });
            }
            Err(e) => e,
        };
        tracing::debug!("Script parse failed ({first}); retrying with single DLL arguments");

        match attempt(DllCallForm::Single) {
            Ok(states) => Ok(Self {
                header,
                states,
                dll_call_form: DllCallForm::Single,
            }),
            Err(second) => Err(Error::ScriptUnparseable {
                first: Box::new(first),
                second: Box::new(second),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(body: &[u8]) -> Vec<u8> {
        let mut bytes = header::encode_header(HeaderLayout::Standard, 1);
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_parse_simple_script() {
        let bytes = script(b"\x11%MAINDIR%\0\x1CDone\0\x02");
        let parsed = WiseScript::parse(&bytes).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.states[0].opcode, OperationCode::CreateDirectory);
        assert_eq!(parsed.dll_call_form, DllCallForm::PerLanguage);
    }

    #[test]
    fn test_retry_with_single_dll_arguments() {
        let bytes = script(b"\x09\x00setup.dll\0Init\0\0RESULT\0args\0\x02");
        let parsed = WiseScript::parse(&bytes).unwrap();
        assert_eq!(parsed.dll_call_form, DllCallForm::Single);
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_both_strategies_fail() {
        let bytes = script(b"\x02\xFF");
        match WiseScript::parse(&bytes) {
            Err(Error::ScriptUnparseable { first, second }) => {
                assert!(matches!(*first, Error::UnknownOpcode { opcode: 0xFF, .. }));
                assert!(matches!(*second, Error::UnknownOpcode { opcode: 0xFF, .. }));
            }
            other => panic!("expected ScriptUnparseable, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_is_deterministic() {
        let bytes = script(b"\x0A\x02\x01Software\0v\0n\0\x16TEMP\0");
        let a = WiseScript::parse(&bytes).unwrap();
        let b = WiseScript::parse(&bytes).unwrap();
        assert_eq!(a, b);
    }
}
