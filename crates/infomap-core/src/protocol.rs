//! IPC protocol messages for Infomap workers.
//!
//! Uses length-prefixed JSON messages over stdin/stdout.
//! Format: 4-byte length (u32 LE) + JSON-encoded message.
//!
//! The parent sends exactly one [`JobPayload`]; the worker answers with
//! zero or more `data` messages and exactly one terminal message
//! (`error` or `finished`).

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::job::JobId;

/// Largest frame accepted from either side (256MB).
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Job sent from the orchestrator to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub id: JobId,
    /// Engine image bytes, shared by every job of a provisioned context.
    #[serde(with = "image_bytes")]
    pub mem_buffer: Arc<[u8]>,
    pub input_filename: String,
    pub input_data: String,
    pub arguments: Vec<String>,
    pub out_name: String,
    pub files: BTreeMap<String, String>,
}

/// Message sent from a worker to the orchestrator.
///
/// `type` is kept as a raw string so an unknown kind reaches the dispatcher
/// intact instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub id: JobId,
}

impl WorkerMessage {
    pub fn data(id: JobId, content: impl Into<String>) -> Self {
        Self::new(MessageKind::Data, id, content)
    }

    pub fn error(id: JobId, content: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, id, content)
    }

    pub fn finished(id: JobId, content: impl Into<String>) -> Self {
        Self::new(MessageKind::Finished, id, content)
    }

    fn new(kind: MessageKind, id: JobId, content: impl Into<String>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            content: content.into(),
            id,
        }
    }

    /// Parse the message kind, failing on anything outside the protocol.
    pub fn parse_kind(&self) -> Result<MessageKind> {
        MessageKind::parse(&self.kind).ok_or_else(|| {
            let raw = serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self));
            Error::Protocol(format!("Unknown message type from worker: {}", raw))
        })
    }
}

/// Kinds of worker messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Incremental output; the job stays live.
    Data,
    /// The job failed. Terminal.
    Error,
    /// The job completed. Terminal.
    Finished,
}

impl MessageKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "data" => Some(Self::Data),
            "error" => Some(Self::Error),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Error => "error",
            Self::Finished => "finished",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Data)
    }
}

/// Encode the output files of a finished job as message content.
pub fn encode_output_files(files: &BTreeMap<String, String>) -> Result<String> {
    serde_json::to_string(files)
        .map_err(|e| Error::Serialization(format!("Failed to encode output files: {}", e)))
}

/// Decode the content of a `finished` message into output files.
pub fn decode_output_files(content: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(content)
        .map_err(|e| Error::Deserialization(format!("Failed to decode output files: {}", e)))
}

fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode IPC message: {}", e)))?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(Error::Ipc(format!(
            "IPC message too large: {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::Deserialization(format!("Failed to decode IPC message: {}", e)))
}

fn frame_len(len_bytes: [u8; 4]) -> Result<usize> {
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::Ipc(format!("IPC message too large: {} bytes", len)));
    }
    Ok(len)
}

/// Write a length-prefixed message to a blocking writer.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let bytes = encode(message)?;
    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;
    Ok(())
}

/// Read a length-prefixed message from a blocking reader.
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message length: {}", e)))?;
    let len = frame_len(len_bytes)?;

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;
    decode(&bytes)
}

/// Write a length-prefixed message to an async writer.
pub async fn write_message_async<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = encode(message)?;
    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;
    Ok(())
}

/// Read a length-prefixed message from an async reader.
///
/// Returns `Ok(None)` on a clean end of stream before a new frame starts.
pub async fn read_message_async<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(Error::Ipc(format!(
                "Failed to read IPC message length: {}",
                e
            )));
        }
    }
    let len = frame_len(len_bytes)?;

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;
    decode(&bytes).map(Some)
}

/// Base64 encoding for the engine image inside JSON payloads.
mod image_bytes {
    use std::sync::Arc;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Arc<[u8]>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Arc<[u8]>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Arc::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn payload() -> JobPayload {
        JobPayload {
            id: JobId::new(7),
            mem_buffer: Arc::from(&b"\x7fELF engine"[..]),
            input_filename: "mynetwork.txt".to_string(),
            input_data: "1 2\n2 3".to_string(),
            arguments: vec!["-N".to_string(), "3".to_string()],
            out_name: "mynetwork".to_string(),
            files: BTreeMap::from([("clusters.clu".to_string(), "1 1".to_string())]),
        }
    }

    #[test]
    fn test_payload_uses_camel_case_fields() {
        let json = serde_json::to_value(payload()).unwrap();
        for field in ["id", "memBuffer", "inputFilename", "inputData", "arguments", "outName", "files"] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn test_payload_survives_framing() {
        let mut buf = Vec::new();
        write_message(&mut buf, &payload()).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded: JobPayload = read_message(&mut cursor).unwrap();
        assert_eq!(&decoded.mem_buffer[..], b"\x7fELF engine");
        assert_eq!(decoded.arguments, vec!["-N", "3"]);
        assert_eq!(decoded.files["clusters.clu"], "1 1");
    }

    #[test]
    fn test_worker_message_wire_shape() {
        let msg = WorkerMessage::data(JobId::new(1), "Trial 1/1");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "data", "content": "Trial 1/1", "id": 1 }));
    }

    #[test]
    fn test_unknown_kind_is_protocol_violation() {
        let msg: WorkerMessage =
            serde_json::from_str(r#"{"type":"progress","content":"50%","id":3}"#).unwrap();
        let err = msg.parse_kind().unwrap_err();
        match err {
            Error::Protocol(text) => assert!(text.contains("progress")),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN as u32 + 1).to_le_bytes());
        let mut cursor = Cursor::new(buf);
        let result: Result<WorkerMessage> = read_message(&mut cursor);
        assert!(matches!(result, Err(Error::Ipc(_))));
    }

    #[tokio::test]
    async fn test_async_reader_reports_clean_eof() {
        let mut buf = Vec::new();
        write_message(&mut buf, &WorkerMessage::finished(JobId::new(0), "{}")).unwrap();

        let mut reader = Cursor::new(buf);
        let first: Option<WorkerMessage> = read_message_async(&mut reader).await.unwrap();
        assert_eq!(first.unwrap().kind, "finished");
        let second: Option<WorkerMessage> = read_message_async(&mut reader).await.unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_output_files_content() {
        let files = BTreeMap::from([("network.tree".to_string(), "# tree".to_string())]);
        let content = encode_output_files(&files).unwrap();
        assert_eq!(decode_output_files(&content).unwrap(), files);
    }
}
