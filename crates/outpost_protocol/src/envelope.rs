//! Binary framing: `cbor(payload) || command_byte`.

use crate::command::Command;
use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A framed command with its still-encoded payload.
///
/// The payload is decoded lazily, once the receiver knows which shape to
/// expect for the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    command: Command,
    payload: Vec<u8>,
}

impl Envelope {
    /// Serializes `payload` and appends the command byte.
    pub fn encode<T: Serialize + ?Sized>(command: Command, payload: &T) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(payload, &mut bytes).map_err(|e| ProtocolError::Encode {
            command,
            message: e.to_string(),
        })?;
        bytes.push(command.code());
        Ok(bytes)
    }

    /// Splits a frame into command and raw payload.
    pub fn decode(mut bytes: Vec<u8>) -> ProtocolResult<Self> {
        let code = bytes.pop().ok_or(ProtocolError::EmptyFrame)?;
        let command = Command::try_from(code)?;
        Ok(Self {
            command,
            payload: bytes,
        })
    }

    /// Returns the command of this envelope.
    pub fn command(&self) -> Command {
        self.command
    }

    /// Returns the raw payload bytes.
    pub fn raw_payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decodes the payload into the shape expected for the command.
    pub fn payload<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        ciborium::from_reader(self.payload.as_slice()).map_err(|e| ProtocolError::Decode {
            command: self.command,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn command_byte_is_last() {
        let bytes = Envelope::encode(Command::SyncRoles, &()).unwrap();
        assert_eq!(*bytes.last().unwrap(), Command::SyncRoles.code());
    }

    #[test]
    fn payload_decoded_lazily() {
        let sample = Sample {
            name: "eu".into(),
            count: 3,
        };
        let bytes = Envelope::encode(Command::UpdateUser, &sample).unwrap();
        let envelope = Envelope::decode(bytes).unwrap();

        assert_eq!(envelope.command(), Command::UpdateUser);
        assert_eq!(envelope.payload::<Sample>().unwrap(), sample);
    }

    #[test]
    fn empty_frame_rejected() {
        assert_eq!(Envelope::decode(Vec::new()), Err(ProtocolError::EmptyFrame));
    }

    #[test]
    fn unknown_command_rejected() {
        assert_eq!(
            Envelope::decode(vec![0xa0, 99]),
            Err(ProtocolError::UnknownCommand(99))
        );
    }

    #[test]
    fn wrong_shape_is_decode_error() {
        let bytes = Envelope::encode(Command::UpdateSpace, &"just a string").unwrap();
        let envelope = Envelope::decode(bytes).unwrap();
        let err = envelope.payload::<Sample>().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Decode {
                command: Command::UpdateSpace,
                ..
            }
        ));
    }

    #[test]
    fn bare_command_byte_decodes_unit() {
        let envelope = Envelope::decode(vec![Command::None.code()]).unwrap();
        assert_eq!(envelope.command(), Command::None);
        assert!(envelope.raw_payload().is_empty());
    }
}
