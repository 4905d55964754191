// src/delegate/protocol.rs
//! Wire shapes of the four delegate verbs
//!
//! | verb        | stdin                   | stdout                   |
//! |-------------|-------------------------|--------------------------|
//! | `init`      | none                    | diagnostic text          |
//! | `mechanism` | none                    | JSON array of mechanisms |
//! | `request`   | JSON connection request | diagnostic text          |
//! | `close`     | JSON connection         | diagnostic text          |

use crate::model::Mechanism;
use crate::utils::errors::{ForwarderError, Result};
use serde::Serialize;
use std::fmt;

/// Delegate verb, passed as the program's only argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Init,
    Mechanism,
    Request,
    Close,
}

impl Verb {
    pub const ALL: [Verb; 4] = [Verb::Init, Verb::Mechanism, Verb::Request, Verb::Close];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Init => "init",
            Verb::Mechanism => "mechanism",
            Verb::Request => "request",
            Verb::Close => "close",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured output of one delegate invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl DelegateOutput {
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self { stdout, stderr }
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// stdout followed by stderr, for log lines and error messages
    pub fn combined(&self) -> String {
        let stdout = String::from_utf8_lossy(&self.stdout);
        let stderr = String::from_utf8_lossy(&self.stderr);

        match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
            (_, true) => stdout.trim_end().to_string(),
            (true, false) => stderr.trim_end().to_string(),
            (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
        }
    }
}

/// Encode a payload for `verb`
pub fn encode_payload<T: Serialize>(verb: Verb, payload: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(payload)
        .map_err(|source| ForwarderError::DelegateProtocolFailure { verb, source })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse the stdout of the `mechanism` verb
pub fn decode_mechanisms(stdout: &[u8]) -> Result<Vec<Mechanism>> {
    serde_json::from_slice(stdout).map_err(|source| ForwarderError::DelegateProtocolFailure {
        verb: Verb::Mechanism,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Connection, MechanismClass};

    #[test]
    fn test_verb_names() {
        let names: Vec<&str> = Verb::ALL.iter().map(|verb| verb.as_str()).collect();
        assert_eq!(names, vec!["init", "mechanism", "request", "close"]);
        assert_eq!(Verb::Close.to_string(), "close");
    }

    #[test]
    fn test_encode_is_newline_terminated_json() {
        let bytes = encode_payload(Verb::Close, &Connection::new("c-1")).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["id"], "c-1");
    }

    #[test]
    fn test_decode_mechanisms() {
        let out = br#"[{"cls":"REMOTE","type":"kernel","parameters":{}}]"#;
        let mechanisms = decode_mechanisms(out).unwrap();
        assert_eq!(mechanisms.len(), 1);
        assert_eq!(mechanisms[0].class, MechanismClass::Remote);
    }

    #[test]
    fn test_decode_garbage_is_protocol_failure() {
        let err = decode_mechanisms(b"kernel please").unwrap_err();
        assert!(matches!(
            err,
            ForwarderError::DelegateProtocolFailure {
                verb: Verb::Mechanism,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_empty_stdout_is_protocol_failure() {
        assert!(decode_mechanisms(b"").is_err());
    }

    #[test]
    fn test_combined_output() {
        let output = DelegateOutput::new(b"created veth\n".to_vec(), b"warning: mtu\n".to_vec());
        assert_eq!(output.combined(), "created veth\nwarning: mtu");

        let only_stderr = DelegateOutput::new(Vec::new(), b"boom\n".to_vec());
        assert_eq!(only_stderr.combined(), "boom");
    }
}
